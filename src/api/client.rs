use serde::Serialize;
use snafu::prelude::*;

use super::error::variant::*;
use super::event::{ChatEvent, QueryEvent, ResearchEvent};
use super::types::{ChatRequest, QueryRequest, ResearchRequest};
use super::Result;
use crate::{
    config::{SessionConfig, Settings},
    sse::{HttpTransport, StreamEvent, StreamSession},
    store::Credentials,
};

static QUERY_PATH: &str = "api/query";
static RESEARCH_PATH: &str = "api/research";
static CHAT_PATH: &str = "api/inspiration/chat";

/// Research assistant streaming API client
///
/// Each call creates its own [`StreamSession`], sessions never share state.
#[derive(Debug, Clone)]
pub struct Client {
    base: url::Url,
    transport: HttpTransport,
}

impl Client {
    /// create a client for `settings.api_url`, authorized with the stored token
    pub fn new(settings: &Settings, credentials: &Credentials) -> Result<Self> {
        let transport =
            HttpTransport::new(credentials.bearer_token()).context(ClientCreateFailed)?;

        let mut base = settings.api_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        log::debug!("Create api client for {}", base);

        Ok(Self { base, transport })
    }

    fn endpoint(&self, path: &str) -> Result<String> {
        let url = self.base.join(path).with_context(|_| InvalidEndpoint {
            base: self.base.as_str(),
            path,
        })?;
        Ok(url.into())
    }

    fn session(&self, config: SessionConfig) -> Result<StreamSession> {
        StreamSession::new(config, self.transport.clone()).context(InvalidConfig)
    }

    /// idle session for `POST /api/query`, one attempt without retry
    pub fn query_session(&self) -> Result<StreamSession> {
        self.session(SessionConfig::query(self.endpoint(QUERY_PATH)?))
    }

    /// idle session for `POST /api/research`
    pub fn research_session(&self) -> Result<StreamSession> {
        self.session(SessionConfig::research(self.endpoint(RESEARCH_PATH)?))
    }

    /// idle session for `POST /api/inspiration/chat`
    pub fn chat_session(&self) -> Result<StreamSession> {
        self.session(SessionConfig::chat(self.endpoint(CHAT_PATH)?))
    }

    /// Start a query analysis, `on_event` gets typed events.
    pub fn query<F>(&self, request: &QueryRequest, on_event: F) -> Result<StreamSession>
    where
        F: FnMut(QueryEvent) + Send + 'static,
    {
        let session = self.query_session()?;
        start::<_, QueryEvent, _>(session, request, on_event)
    }

    /// Start a research run, `on_event` gets typed events.
    pub fn research<F>(&self, request: &ResearchRequest, on_event: F) -> Result<StreamSession>
    where
        F: FnMut(ResearchEvent) + Send + 'static,
    {
        let session = self.research_session()?;
        start::<_, ResearchEvent, _>(session, request, on_event)
    }

    /// Start a chat answer, `on_event` gets typed events.
    pub fn chat<F>(&self, request: &ChatRequest, on_event: F) -> Result<StreamSession>
    where
        F: FnMut(ChatEvent) + Send + 'static,
    {
        let session = self.chat_session()?;
        start::<_, ChatEvent, _>(session, request, on_event)
    }
}

fn start<R, E, F>(mut session: StreamSession, request: &R, mut on_event: F) -> Result<StreamSession>
where
    R: Serialize + 'static,
    E: From<StreamEvent> + 'static,
    F: FnMut(E) + Send + 'static,
{
    let payload = serde_json::to_value(request).context(SerializeBodyFailed)?;
    session.connect(payload, move |event: StreamEvent| on_event(E::from(event)));
    Ok(session)
}

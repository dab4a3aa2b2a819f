use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream::BoxStream, StreamExt};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use snafu::prelude::*;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

static EVENT_STREAM_MIME: &str = "text/event-stream";

/// Raw body chunks of an open stream.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Error when open or read an event stream
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(transport_error), context(suffix(false)))]
pub enum TransportError {
    /// token contains characters that can't be sent in a HTTP header
    #[snafu(display("token {token:?} is invalid"))]
    TokenInvalid {
        /// input token
        token: String,
    },

    /// create HTTP client failed
    #[snafu(display("create http client failed: {source}"))]
    ClientCreateFailed {
        /// source error
        source: reqwest::Error,
    },

    /// send stream request failed
    #[snafu(display("POST url {url} failed: {source}"))]
    RequestFailed {
        /// target url
        url: String,
        /// source http error
        source: reqwest::Error,
    },

    /// http response status is not 2xx
    #[snafu(display("POST url {url} got http status code {status_code}"))]
    HTTPStatusNotOK {
        /// request url
        url: String,
        /// received http status code
        status_code: reqwest::StatusCode,
    },

    /// response is not an event stream
    #[snafu(display("POST url {url} got content type {content_type:?}, expect text/event-stream"))]
    ContentTypeMismatch {
        /// request url
        url: String,
        /// received content type
        content_type: String,
    },

    /// reading the response body failed after open
    #[snafu(display("event stream body broken: {source}"))]
    BodyBroken {
        /// source error
        #[snafu(source(from(reqwest::Error, Box::new)))]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// What to open: endpoint and json body.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// endpoint url
    pub url: String,
    /// json request body, sent again on every reconnect
    pub payload: serde_json::Value,
}

/// Opens event streams.
///
/// A successful `open` means the server accepted the request with a 2xx
/// status and an event stream content type.
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// Send `request`, resolve once the response head is checked.
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError>;
}

/// [`Transport`] over HTTP POST, using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport that sends `Authorization: Bearer <token>`.
    ///
    /// An empty token is sent as is, the server decides what it allows.
    pub fn new<S: AsRef<str> + ?Sized>(token: &S) -> Result<Self, TransportError> {
        let token = token.as_ref();
        let auth_header_value = format!("Bearer {}", token).parse().map_err(|_| {
            transport_error::TokenInvalid {
                token: token.to_string(),
            }
            .build()
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth_header_value);

        let client = reqwest::Client::builder()
            .gzip(true)
            .deflate(true)
            .user_agent(APP_USER_AGENT)
            .default_headers(headers)
            .build()
            .context(transport_error::ClientCreateFailed)?;

        Ok(Self::from_client(client))
    }

    /// Use a prepared client, its default headers are kept.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError> {
        let url = request.url.as_str();

        log::trace!("POST {} with {}", url, request.payload);

        let resp = self
            .client
            .post(url)
            .header(ACCEPT, EVENT_STREAM_MIME)
            .json(&request.payload)
            .send()
            .await
            .context(transport_error::RequestFailed { url })?;

        let status_code = resp.status();
        if !status_code.is_success() {
            if let Ok(body) = resp.text().await {
                log::debug!("Error response body: {:?}", body);
            }
            return transport_error::HTTPStatusNotOK { url, status_code }.fail();
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        ensure!(
            content_type.contains(EVENT_STREAM_MIME),
            transport_error::ContentTypeMismatch { url, content_type }
        );

        log::trace!("Response head of {} ok, start reading body", url);

        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.context(transport_error::BodyBroken));

        Ok(body.boxed())
    }
}

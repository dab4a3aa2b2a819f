//! Session and environment configuration.

use std::{path::PathBuf, time::Duration};

use snafu::prelude::*;

/// Default api base url, used when `API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Event type given to records that carry no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "chunk";

/// Invalid configuration
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(config_error), context(suffix(false)))]
pub enum ConfigError {
    /// session url is empty
    #[snafu(display("session url is empty"))]
    EmptyUrl,

    /// a duration that must be positive is zero
    #[snafu(display("{name} must be greater than zero"))]
    ZeroDuration {
        /// config field name
        name: &'static str,
    },

    /// max backoff is smaller than the base backoff
    #[snafu(display("max reconnect interval {max:?} is smaller than base interval {base:?}"))]
    BackoffRange {
        /// base reconnect interval
        base: Duration,
        /// max reconnect interval
        max: Duration,
    },

    /// `API_URL` is not a valid url
    #[snafu(display("invalid api url {url}: {source}"))]
    InvalidApiUrl {
        /// received url
        url: String,
        /// source error
        source: url::ParseError,
    },

    /// `API_URL` is not http(s)
    #[snafu(display("api url {url} has scheme {scheme}, only http or https is ok"))]
    InvalidScheme {
        /// received url
        url: String,
        /// url scheme
        scheme: String,
    },
}

/// Immutable settings of one [`StreamSession`](crate::sse::StreamSession).
///
/// Build one per session, a running session never sees changes. The presets
/// carry the defaults each endpoint was tuned with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// endpoint url
    pub url: String,
    /// failed attempts in a row before the session gives up
    pub max_reconnect_attempts: u32,
    /// backoff for the first retry
    pub base_reconnect_interval: Duration,
    /// backoff cap, before jitter
    pub max_reconnect_interval: Duration,
    /// upper bound of random jitter added to every backoff
    pub jitter: Duration,
    /// period of the heartbeat check
    pub heartbeat_interval: Duration,
    /// time allowed from request to open
    pub connection_timeout: Duration,
    /// longest silence tolerated on an open stream
    pub message_timeout: Duration,
    /// event type for records without `event:`
    pub default_event_type: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 5,
            base_reconnect_interval: Duration::from_secs(1),
            max_reconnect_interval: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            message_timeout: Duration::from_secs(60),
            default_event_type: DEFAULT_EVENT_TYPE.to_string(),
        }
    }
}

impl SessionConfig {
    /// Config with default values for `url`.
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Long running research workflow stream.
    pub fn research<S: Into<String>>(url: S) -> Self {
        Self::new(url)
    }

    /// Query analysis stream, a single attempt without retry.
    pub fn query<S: Into<String>>(url: S) -> Self {
        Self::new(url).max_reconnect_attempts(1)
    }

    /// Inspiration chat stream.
    pub fn chat<S: Into<String>>(url: S) -> Self {
        Self::new(url)
            .max_reconnect_attempts(3)
            .base_reconnect_interval(Duration::from_secs(2))
    }

    /// Set max failed attempts in a row.
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the first backoff delay.
    pub fn base_reconnect_interval(mut self, interval: Duration) -> Self {
        self.base_reconnect_interval = interval;
        self
    }

    /// Set the backoff cap.
    pub fn max_reconnect_interval(mut self, interval: Duration) -> Self {
        self.max_reconnect_interval = interval;
        self
    }

    /// Set the jitter upper bound.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the heartbeat check period.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the open timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the in-stream silence timeout.
    pub fn message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }

    /// Set the event type used when a record has no `event:` field.
    pub fn default_event_type<S: Into<String>>(mut self, event_type: S) -> Self {
        self.default_event_type = event_type.into();
        self
    }

    /// Check the config can drive a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.url.is_empty(), config_error::EmptyUrl);

        for (name, value) in [
            ("base_reconnect_interval", self.base_reconnect_interval),
            ("heartbeat_interval", self.heartbeat_interval),
            ("connection_timeout", self.connection_timeout),
            ("message_timeout", self.message_timeout),
        ] {
            ensure!(!value.is_zero(), config_error::ZeroDuration { name });
        }

        ensure!(
            self.max_reconnect_interval >= self.base_reconnect_interval,
            config_error::BackoffRange {
                base: self.base_reconnect_interval,
                max: self.max_reconnect_interval,
            }
        );

        Ok(())
    }
}

/// Process level settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// base url of all api endpoints
    pub api_url: url::Url,
    /// credential file, see [`Credentials`](crate::store::Credentials)
    pub store_path: Option<PathBuf>,
}

impl Settings {
    /// env var holding the api base url
    pub const API_URL_VAR: &'static str = "API_URL";
    /// env var holding the credential file path
    pub const STORE_VAR: &'static str = "RIPPLE_STORE";

    /// Build settings from an explicit base url.
    pub fn new<S: AsRef<str> + ?Sized>(api_url: &S) -> Result<Self, ConfigError> {
        let raw = api_url.as_ref();
        let api_url = url::Url::parse(raw)
            .with_context(|_| config_error::InvalidApiUrl { url: raw })?;

        ensure!(
            api_url.scheme() == "http" || api_url.scheme() == "https",
            config_error::InvalidScheme {
                url: raw,
                scheme: api_url.scheme(),
            }
        );

        Ok(Self {
            api_url,
            store_path: None,
        })
    }

    /// Read `API_URL` and `RIPPLE_STORE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url =
            std::env::var(Self::API_URL_VAR).unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        log::debug!("Using api url {}", api_url);

        let mut settings = Self::new(&api_url)?;
        settings.store_path = std::env::var_os(Self::STORE_VAR).map(PathBuf::from);
        Ok(settings)
    }

    /// Set the credential file.
    pub fn store_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.store_path = Some(path.into());
        self
    }
}

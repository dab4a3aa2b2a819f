use snafu::prelude::*;

use crate::{config::ConfigError, sse::TransportError};

/// API Error
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(variant), context(suffix(false)))]
pub enum Error {
    /// create the http transport failed
    #[snafu(display("create api client failed: {source}"))]
    ClientCreateFailed {
        /// source error
        source: TransportError,
    },

    /// endpoint path can't be joined to the base url
    #[snafu(display("invalid endpoint {path} for base url {base}: {source}"))]
    InvalidEndpoint {
        /// base url
        base: String,
        /// endpoint path
        path: String,
        /// source error
        source: url::ParseError,
    },

    /// session config rejected
    #[snafu(display("invalid session config: {source}"))]
    InvalidConfig {
        /// source error
        source: ConfigError,
    },

    /// request body can't be serialized
    #[snafu(display("serialize request body failed: {source}"))]
    SerializeBodyFailed {
        /// source error
        source: serde_json::Error,
    },
}

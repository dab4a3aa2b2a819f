//! crate error types

use snafu::prelude::*;

use super::api::Error as APIError;
use super::config::ConfigError;
use super::store::StoreError;

/// crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// crate error type
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    /// Read settings from environment failed
    #[snafu(display("load settings failed: {source}"))]
    LoadSettingsFailed {
        /// source error
        source: ConfigError,
    },

    /// Read credential file failed
    #[snafu(display("load credentials failed: {source}"))]
    LoadCredentialsFailed {
        /// source error
        source: StoreError,
    },

    /// Create api client failed
    #[snafu(display("create api client failed: {source}"))]
    CreateClientFailed {
        /// source error
        source: APIError,
    },
}

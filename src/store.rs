//! Persisted user credentials.
//!
//! A flat json object of string values, keyed the same way the web client
//! keeps them in local storage (`token`, `email`, `id`, `api_key` ...).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Error when read or write the credential file
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(store_error), context(suffix(false)))]
pub enum StoreError {
    /// read or write file failed
    #[snafu(display("access credential file {} failed: {source}", path.display()))]
    Io {
        /// file path
        path: PathBuf,
        /// source error
        source: std::io::Error,
    },

    /// file content is not a credential object
    #[snafu(display("parse credential file {} failed: {source}", path.display()))]
    Parse {
        /// file path
        path: PathBuf,
        /// source error
        source: serde_json::Error,
    },
}

/// Logged in user data.
///
/// Only `token` is used by the stream client, the llm settings are forwarded
/// to the backend by other callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// bearer token
    pub token: Option<String>,
    /// user email
    pub email: Option<String>,
    /// user id
    pub id: Option<String>,
    /// display name
    pub name: Option<String>,
    /// account type
    pub user_type: Option<String>,
    /// llm api key
    pub api_key: Option<String>,
    /// llm api base url
    pub api_url: Option<String>,
    /// llm model name
    pub model_name: Option<String>,
}

impl Credentials {
    /// Read credentials from `path`, a missing file means logged out.
    pub fn load<P: AsRef<Path> + ?Sized>(path: &P) -> Result<Self, StoreError> {
        let path = path.as_ref();

        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No credential file at {}, use empty credentials", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(err).context(store_error::Io { path }),
        };

        serde_json::from_slice(&content).context(store_error::Parse { path })
    }

    /// Write credentials to `path`.
    pub fn save<P: AsRef<Path> + ?Sized>(&self, path: &P) -> Result<(), StoreError> {
        let path = path.as_ref();
        let content = serde_json::to_vec_pretty(self).context(store_error::Parse { path })?;
        std::fs::write(path, content).context(store_error::Io { path })
    }

    /// Token for the `Authorization` header, empty when logged out.
    pub fn bearer_token(&self) -> &str {
        self.token.as_deref().unwrap_or_default()
    }
}

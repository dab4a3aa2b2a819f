//! # Ripple
//!
//! A reconnecting Server-Sent-Events client for the research assistant API.
//!
//! [`sse::StreamSession`] opens a streaming POST request, decodes the
//! `text/event-stream` body into [`sse::StreamEvent`]s and hands them to a
//! handler. Failed or stalled streams are retried with exponential backoff
//! until the stream ends or the attempts run out, the current
//! [`sse::ConnectionState`] is published through a watch channel.
//!
//! [`api::Client`] creates pre-configured sessions for the query, research and
//! chat endpoints and decodes their events into typed enums.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod sse;
pub mod store;

mod error;
pub use error::{Error, Result};

use snafu::prelude::*;

use config::Settings;
use store::Credentials;

/// Create an api client from `API_URL` and the credential file in `RIPPLE_STORE`.
///
/// Without a credential file requests are sent with an empty bearer token.
pub fn client_from_env() -> Result<api::Client> {
    let settings = Settings::from_env().context(error::LoadSettingsFailed)?;
    client_from_settings(&settings)
}

/// Create an api client for `settings`, loading the credential file if one is set.
pub fn client_from_settings(settings: &Settings) -> Result<api::Client> {
    let credentials = match settings.store_path {
        Some(ref path) => Credentials::load(path).context(error::LoadCredentialsFailed)?,
        None => {
            log::info!("No credential file configured, requests are not authorized");
            Credentials::default()
        }
    };

    let client = api::Client::new(settings, &credentials).context(error::CreateClientFailed)?;

    log::info!("Create api client for {} success", settings.api_url);

    Ok(client)
}

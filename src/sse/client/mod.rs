//! Reconnecting event stream client.
//!
//! A [`StreamSession`] drives one stream at a time through the phases of
//! [`Phase`]: it opens the request with a [`Transport`], decodes the body with
//! an [`EventStreamParser`](super::EventStreamParser), watches for silence
//! with a [`LivenessMonitor`] and retries with a [`RetryScheduler`] until the
//! stream closes or the attempts run out.

mod liveness;
mod retry;
mod session;
mod state;
mod transport;

pub use liveness::{Liveness, LivenessMonitor};
pub use retry::{PendingRetry, RetryScheduler};
pub use session::{EventHandler, StreamError, StreamSession};
pub use state::{ConnectionState, ConnectionStatus, Phase};
pub use transport::{ByteStream, HttpTransport, StreamRequest, Transport, TransportError};

//! Server-sent events: decoding and the reconnecting client.

pub mod client;
mod event;
mod parser;
mod relaxed;

pub use client::{
    ConnectionState, ConnectionStatus, EventHandler, HttpTransport, Phase, StreamError,
    StreamSession, Transport, TransportError,
};
pub use event::{Payload, StreamEvent, DONE_MARKER, TERMINAL_EVENT_TYPES};
pub use parser::EventStreamParser;
pub use relaxed::parse as parse_relaxed_json;

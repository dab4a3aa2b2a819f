//! Incremental `text/event-stream` parser.
//!
//! Records may be split anywhere across network chunks, so bytes are buffered
//! until a full line is available. Lines are decoded as UTF-8 lossily once
//! complete, which keeps multi-byte characters split across chunks intact.

use std::time::Duration;

use bytes::{Buf, BytesMut};

use super::event::{Payload, StreamEvent};

const LF: u8 = b'\n';
const CR: u8 = b'\r';
const BOM: &[u8] = "\u{FEFF}".as_bytes();

/// Turns raw body chunks into [`StreamEvent`]s. Create one per connection.
#[derive(Debug)]
pub struct EventStreamParser {
    default_event_type: String,
    buffer: BytesMut,
    bom_checked: bool,
    event_type: Option<String>,
    data: Option<String>,
    last_id: String,
    retry: Option<Duration>,
}

impl EventStreamParser {
    /// Create a parser, records without `event:` get `default_event_type`.
    pub fn new<S: Into<String>>(default_event_type: S) -> Self {
        Self {
            default_event_type: default_event_type.into(),
            buffer: BytesMut::new(),
            bom_checked: false,
            event_type: None,
            data: None,
            last_id: String::new(),
            retry: None,
        }
    }

    /// Reconnection delay last advertised by the server with `retry:`.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Last event id seen on this stream.
    pub fn last_id(&self) -> &str {
        &self.last_id
    }

    /// Feed one chunk, returning every event completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        if !self.bom_checked {
            if self.buffer.len() < BOM.len() && BOM.starts_with(&self.buffer) {
                return Vec::new();
            }
            if self.buffer.starts_with(BOM) {
                self.buffer.advance(BOM.len());
            }
            self.bom_checked = true;
        }

        let mut events = Vec::new();
        while let Some(line) = self.next_line(false) {
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush at end of stream.
    ///
    /// A record the server didn't terminate with a blank line is still
    /// dispatched if it carries data.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let mut last = None;
        while let Some(line) = self.next_line(true) {
            if let Some(event) = self.process_line(&line) {
                last = Some(event);
            }
        }
        if !self.buffer.is_empty() {
            let rest = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            if let Some(event) = self.process_line(&rest) {
                last = Some(event);
            }
        }

        if self.data.is_some() {
            log::debug!("Stream ended inside a record, dispatch it anyway");
            return self.dispatch();
        }
        last
    }

    /// Pop the next complete line off the buffer.
    ///
    /// A trailing lone CR may be the first half of a CRLF, so it only ends a
    /// line when `eof` is set.
    fn next_line(&mut self, eof: bool) -> Option<String> {
        let pos = self.buffer.iter().position(|b| *b == CR || *b == LF)?;

        let skip = match self.buffer[pos] {
            CR if pos + 1 == self.buffer.len() && !eof => return None,
            CR if self.buffer.get(pos + 1) == Some(&LF) => 2,
            _ => 1,
        };

        let line = self.buffer.split_to(pos);
        self.buffer.advance(skip);

        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            log::trace!("Skip comment line");
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => match self.data {
                Some(ref mut data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "id" if !value.contains('\0') => self.last_id = value.to_string(),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => log::trace!("Ignore unknown field {:?}", field),
        }

        None
    }

    fn dispatch(&mut self) -> Option<StreamEvent> {
        let event_type = self.event_type.take();
        let data = self.data.take()?;

        let event_type = match event_type {
            Some(t) if !t.is_empty() => t,
            _ => self.default_event_type.clone(),
        };

        Some(StreamEvent {
            event_type,
            data: Payload::decode(&data),
            id: self.last_id.clone(),
        })
    }
}

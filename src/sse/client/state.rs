use std::fmt::Display;

use tokio::{sync::watch, time::Instant};
use tokio_util::sync::CancellationToken;

/// Lifecycle phase of a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// nothing running
    #[default]
    Idle,
    /// request sent, waiting for open
    Connecting,
    /// stream open
    Connected,
    /// last attempt failed, deciding whether to retry
    Erroring,
    /// waiting for the backoff delay
    Reconnecting,
    /// finished, normally or because attempts ran out
    Closed,
}

impl Phase {
    /// Whether the state machine allows moving from `self` to `to`.
    pub fn can_transition_to(self, to: Phase) -> bool {
        use Phase::*;

        matches!(
            (self, to),
            (_, Idle)
                | (_, Connecting) // a new connect() tears down whatever runs
                | (Connecting, Connected)
                | (Connecting, Erroring)
                | (Connected, Closed)
                | (Connected, Erroring)
                | (Erroring, Reconnecting)
                | (Erroring, Closed)
        )
    }

    fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Erroring => "erroring",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Observable connection state of a session.
///
/// `is_connected` and `is_connecting` are derived from one [`Phase`], so they
/// can never both be true.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    /// current phase
    pub phase: Phase,
    /// failed attempts in a row, reset on a successful open
    pub reconnect_attempts: u32,
    /// time of the last received event, `None` before the first open
    pub last_activity: Option<Instant>,
    /// why the last attempt failed, never set by a manual disconnect
    pub error: Option<String>,
}

impl ConnectionState {
    /// stream is open
    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    /// an attempt is running or scheduled
    pub fn is_connecting(&self) -> bool {
        matches!(
            self.phase,
            Phase::Connecting | Phase::Erroring | Phase::Reconnecting
        )
    }

    /// closed after running out of attempts
    pub fn is_failed(&self) -> bool {
        self.phase == Phase::Closed && self.error.is_some()
    }

    /// Status for display, `max_attempts` is the session's retry cap.
    pub fn status(&self, max_attempts: u32) -> ConnectionStatus {
        match self.phase {
            Phase::Idle => ConnectionStatus::Idle,
            Phase::Connecting if self.reconnect_attempts == 0 => ConnectionStatus::Connecting,
            Phase::Connecting | Phase::Erroring | Phase::Reconnecting => {
                ConnectionStatus::Reconnecting {
                    attempt: self.reconnect_attempts,
                    max_attempts,
                }
            }
            Phase::Connected => ConnectionStatus::Connected,
            Phase::Closed if self.error.is_some() => ConnectionStatus::Failed,
            Phase::Closed => ConnectionStatus::Closed,
        }
    }
}

/// What a user facing indicator should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// not started or stopped by the user
    Idle,
    /// first attempt in progress
    Connecting,
    /// stream open
    Connected,
    /// retrying after a failure
    Reconnecting {
        /// failed attempts so far
        attempt: u32,
        /// retry cap
        max_attempts: u32,
    },
    /// finished normally
    Closed,
    /// gave up after running out of attempts
    Failed,
}

impl Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting {
                attempt,
                max_attempts,
            } => write!(f, "reconnecting (attempt {} of {})", attempt, max_attempts),
            Self::Closed => f.write_str("closed"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Writer side of a session's [`ConnectionState`].
///
/// Each connect gets its own machine bound to the attempt's cancel token.
/// Once the token is cancelled every write is dropped, checked inside the
/// watch lock, so a torn down driver can't touch its successor's state.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionStateMachine {
    tx: std::sync::Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
}

impl ConnectionStateMachine {
    pub fn new(
        tx: std::sync::Arc<watch::Sender<ConnectionState>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { tx, cancel }
    }

    /// Move to `to` and apply `update`, returns false if refused.
    fn transition<F>(&self, to: Phase, update: F) -> bool
    where
        F: FnOnce(&mut ConnectionState),
    {
        let cancel = &self.cancel;
        let mut refused = None;

        let applied = self.tx.send_if_modified(|state| {
            if cancel.is_cancelled() {
                return false;
            }
            if !state.phase.can_transition_to(to) {
                refused = Some(state.phase);
                return false;
            }
            state.phase = to;
            update(state);
            true
        });

        if let Some(from) = refused {
            log::error!("Refuse illegal state transition {} -> {}", from, to);
        } else if applied {
            log::debug!("Move to {} state", to);
        }

        applied
    }

    /// `* -> Connecting`, keeps the attempt counter.
    pub fn connecting(&self) -> bool {
        self.transition(Phase::Connecting, |state| state.error = None)
    }

    /// `Connecting -> Connected`, resets the attempt counter.
    pub fn opened(&self, now: Instant) -> bool {
        self.transition(Phase::Connected, |state| {
            state.reconnect_attempts = 0;
            state.error = None;
            state.last_activity = Some(now);
        })
    }

    /// Record an inbound event.
    pub fn touch(&self, now: Instant) -> bool {
        let cancel = &self.cancel;
        self.tx.send_if_modified(|state| {
            if cancel.is_cancelled() || state.phase != Phase::Connected {
                return false;
            }
            state.last_activity = Some(now);
            true
        })
    }

    /// `Connecting|Connected -> Erroring`, counts the failure and returns the
    /// new number of failed attempts in a row.
    pub fn failed(&self, reason: String) -> Option<u32> {
        let mut attempts = None;
        self.transition(Phase::Erroring, |state| {
            state.reconnect_attempts = state.reconnect_attempts.saturating_add(1);
            state.error = Some(reason);
            attempts = Some(state.reconnect_attempts);
        });
        attempts
    }

    /// `Erroring -> Reconnecting`
    pub fn reconnecting(&self) -> bool {
        self.transition(Phase::Reconnecting, |_| {})
    }

    /// `Connected|Erroring -> Closed`, `error` is `None` for a normal close.
    pub fn closed(&self, error: Option<String>) -> bool {
        self.transition(Phase::Closed, |state| state.error = error)
    }
}

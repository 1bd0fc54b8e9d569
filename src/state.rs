//! Connection lifecycle.
//!
//! ```text
//!   Closed ──open──▶ Connecting ──101──▶ Open ──close()──▶ Closing
//!     ▲                  │                 │                  │
//!     └──────────────────┴─────────────────┴──────────────────┘
//!        handshake failure / transport loss / close handshake
//! ```

use std::fmt;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    #[default]
    Closed,
}

impl ReadyState {
    /// Whether moving from `self` to `to` is a legal transition.
    pub const fn can_transition(self, to: ReadyState) -> bool {
        use ReadyState::*;
        matches!(
            (self, to),
            (Closed, Connecting)
                | (Connecting, Open)
                | (Connecting, Closed)
                | (Open, Closing)
                | (Open, Closed)
                | (Closing, Closed)
        )
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadyState::Connecting => "connecting",
            ReadyState::Open => "open",
            ReadyState::Closing => "closing",
            ReadyState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid state transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ReadyState,
    pub to: ReadyState,
}

/// Enforces the legal transitions between [`ReadyState`]s.
#[derive(Debug, Default)]
pub struct StateMachine {
    state: ReadyState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReadyState {
        self.state
    }

    pub fn transition(&mut self, to: ReadyState) -> Result<ReadyState, InvalidTransition> {
        let from = self.state;
        if !from.can_transition(to) {
            return Err(InvalidTransition { from, to });
        }
        self.state = to;
        tracing::debug!(%from, %to, "websocket state transition");
        Ok(from)
    }

    /// Move to `Closed` from wherever we are. Returns the previous state, or
    /// `None` if already closed.
    pub fn force_closed(&mut self) -> Option<ReadyState> {
        match self.state {
            ReadyState::Closed => None,
            from => {
                self.state = ReadyState::Closed;
                tracing::debug!(%from, "websocket forced closed");
                Some(from)
            }
        }
    }
}

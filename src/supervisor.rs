//! Connection state machine.
//!
//! `idle -> connecting -> connected`, `connecting -> error`,
//! `connected -> error`, `error -> connecting`. The event-stream attachment
//! is tracked separately from the base connection.

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Snapshot exposed to readers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Banner text for the last failure, until dismissed.
    pub last_error: Option<String>,
    pub stream_attached: bool,
}

/// Follow-up the caller must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    None,
    /// Re-fetch the active session's history and replace it wholesale.
    ReloadActive,
}

#[derive(Debug, Default)]
pub struct ConnectionSupervisor {
    status: ConnectionStatus,
    ever_connected: bool,
    ever_attached: bool,
    recovering: bool,
}

impl ConnectionSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status.state
    }

    /// `idle | error -> connecting`. Ignored from other states; returns
    /// whether the transition happened.
    pub fn begin_connect(&mut self) -> bool {
        match self.status.state {
            ConnectionState::Idle | ConnectionState::Error => {
                self.recovering = self.status.state == ConnectionState::Error;
                self.status.state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Connecting | ConnectionState::Connected => false,
        }
    }

    /// `connecting -> connected`. Recovering from an error after an earlier
    /// successful connection requests a reload.
    pub fn mark_connected(&mut self) -> Directive {
        if self.status.state != ConnectionState::Connecting {
            return Directive::None;
        }

        let reload = self.recovering && self.ever_connected;
        self.status.state = ConnectionState::Connected;
        self.ever_connected = true;
        self.recovering = false;

        if reload {
            Directive::ReloadActive
        } else {
            Directive::None
        }
    }

    /// `connecting | connected -> error`, recording the banner message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status.last_error = Some(message.into());
        if matches!(
            self.status.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            self.status.state = ConnectionState::Error;
        }
    }

    /// The event stream delivered its first item. A re-attach after an
    /// earlier attachment requests a reload, since events may have been
    /// missed while detached.
    pub fn stream_attached(&mut self) -> Directive {
        if self.status.stream_attached {
            return Directive::None;
        }
        self.status.stream_attached = true;

        let reload = self.ever_attached && self.ever_connected;
        self.ever_attached = true;
        if reload {
            Directive::ReloadActive
        } else {
            Directive::None
        }
    }

    pub fn stream_detached(&mut self) {
        self.status.stream_attached = false;
    }

    /// Clears the banner. The state itself is unchanged.
    pub fn dismiss_error(&mut self) {
        self.status.last_error = None;
    }

    /// Back to `idle`, keeping history so a later reconnect still reloads.
    pub fn reset(&mut self) {
        self.status.state = ConnectionState::Idle;
        self.status.stream_attached = false;
        self.recovering = false;
    }
}

/// Exponential backoff delay for stream re-subscription `attempt`
/// (0-based), capped at `max`.
#[must_use]
pub fn reconnect_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.min(30);
    let factor = 2u32.saturating_pow(exponent);
    base.saturating_mul(factor).min(max.max(base))
}

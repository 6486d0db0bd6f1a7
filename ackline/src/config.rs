//! Configuration for sessions and connections.

use std::time::Duration;

use crate::error::SessionError;

/// Default port for plain connections.
pub const DEFAULT_PORT: u16 = 9010;

/// Default port for secure connections.
pub const DEFAULT_SECURE_PORT: u16 = 9011;

/// Deadline for a call that has not been acknowledged.
pub const OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for a call once the peer has acknowledged it.
pub const ACKED_TIMEOUT: Duration = Duration::from_secs(180);

/// Outer wall-clock bound on a blocked `call`.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(190);

/// Inactivity after which a transport may reclaim the connection.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Timing parameters of a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Deadline armed when a call is issued.
    pub op_timeout: Duration,

    /// Deadline re-armed when the peer Acks a call.
    pub acked_timeout: Duration,

    /// Bound on how long `call` waits, independent of the protocol timers.
    ///
    /// Must exceed `acked_timeout` so the protocol timers normally win.
    pub call_timeout: Duration,

    /// First transaction id handed out by the session.
    pub initial_transaction_id: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            op_timeout: OP_TIMEOUT,
            acked_timeout: ACKED_TIMEOUT,
            call_timeout: CALL_TIMEOUT,
            initial_transaction_id: 1,
        }
    }
}

impl SessionConfig {
    /// Override both protocol deadlines.
    pub fn with_timeouts(mut self, op_timeout: Duration, acked_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self.acked_timeout = acked_timeout;
        self
    }

    /// Override the outer bound on `call`.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Start transaction ids at `seed`.
    pub fn with_initial_transaction_id(mut self, seed: u64) -> Self {
        self.initial_transaction_id = seed;
        self
    }

    /// Short deadlines for local loopback testing.
    pub fn local_network() -> Self {
        Self {
            op_timeout: Duration::from_millis(500),
            acked_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(11),
            initial_transaction_id: 1,
        }
    }

    /// Check the ordering `op_timeout < acked_timeout < call_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] when the deadlines are out of order.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.op_timeout.is_zero() {
            return Err(SessionError::InvalidConfig {
                message: "op_timeout must be non-zero".to_string(),
            });
        }
        if self.acked_timeout < self.op_timeout {
            return Err(SessionError::InvalidConfig {
                message: format!(
                    "acked_timeout {:?} is shorter than op_timeout {:?}",
                    self.acked_timeout, self.op_timeout
                ),
            });
        }
        if self.call_timeout <= self.acked_timeout {
            return Err(SessionError::InvalidConfig {
                message: format!(
                    "call_timeout {:?} must exceed acked_timeout {:?}",
                    self.call_timeout, self.acked_timeout
                ),
            });
        }
        Ok(())
    }
}

/// How a connector reaches the peer.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    /// Use the secure transport.
    pub secure: bool,

    /// Explicit port; `None` selects the default for `secure`.
    pub port: Option<u16>,

    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,

    /// Inactivity after which the transport may drop the connection.
    pub idle_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            secure: false,
            port: None,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: IDLE_TIMEOUT,
        }
    }
}

impl ConnectOptions {
    /// Connect to an explicit port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Request the secure transport.
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Port to dial.
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.secure) {
            (Some(port), _) => port,
            (None, false) => DEFAULT_PORT,
            (None, true) => DEFAULT_SECURE_PORT,
        }
    }
}

//! Public session surface.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use super::actor::{Command, SessionActor, SessionStatus};
use super::dispatcher::RequestHandler;
use super::state::{Lifecycle, SessionState};
use crate::config::{ConnectOptions, SessionConfig};
use crate::error::{CloseReason, ReplyError, SessionError};
use crate::registry::{SessionKey, SessionRegistry};
use crate::transport::{Connection, Connector};
use crate::wire::{
    CORE_CLASS, JsonCodec, LOGIN_COMMAND, PING_COMMAND, Payload, RemoteError, TransactionId,
    WireCodec,
};

#[derive(Debug)]
struct SessionInner {
    key: SessionKey,
    remote_address: String,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
    call_timeout: Duration,
}

/// Handle to a live session.
///
/// Cheap to clone. Every operation is queued to the session actor and
/// processed in order with inbound frames and timer events.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Issue a request and wait for its terminal Response.
    ///
    /// Resolves with the reply payload, or with the peer's `{code, message}`
    /// as [`ReplyError::Remote`]. A call that sees no Ack within the
    /// operation timeout, or no Response within the acknowledged timeout,
    /// fails with [`ReplyError::Timeout`] and the session closes. The wait
    /// is additionally bounded by [`SessionConfig::call_timeout`].
    ///
    /// # Errors
    ///
    /// [`ReplyError::SessionClosed`] if the session was already closed,
    /// [`ReplyError::Cancelled`] if it closes while the call is pending.
    pub async fn call(
        &self,
        class: impl Into<String>,
        command: impl Into<String>,
        payload: Payload,
    ) -> Result<Payload, ReplyError> {
        if self.state() != Lifecycle::Active {
            return Err(ReplyError::SessionClosed);
        }
        let (reply, receiver) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Call {
                class: class.into(),
                command: command.into(),
                payload,
                reply,
            })
            .map_err(|_| ReplyError::SessionClosed)?;

        match tokio::time::timeout(self.inner.call_timeout, receiver).await {
            Ok(Ok(result)) => result,
            // The actor exited without reaching the call.
            Ok(Err(_)) => Err(ReplyError::Cancelled),
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.inner.call_timeout,
                    "call exceeded its outer bound"
                );
                Err(ReplyError::Timeout)
            }
        }
    }

    /// Ping the peer.
    ///
    /// # Errors
    ///
    /// Same as [`Session::call`].
    pub async fn ping(&self) -> Result<(), ReplyError> {
        self.call(CORE_CLASS, PING_COMMAND, Payload::new())
            .await
            .map(|_| ())
    }

    /// Answer a peer request the handler Acked.
    ///
    /// Ignored, with a warning, if the id is not awaiting an answer.
    pub fn reply_ok(&self, transaction_id: TransactionId, payload: Payload) {
        self.send_reply(transaction_id, Ok(payload));
    }

    /// Fail a peer request the handler Acked.
    ///
    /// Ignored, with a warning, if the id is not awaiting an answer.
    pub fn reply_error(&self, transaction_id: TransactionId, error: impl Into<RemoteError>) {
        self.send_reply(transaction_id, Err(error.into()));
    }

    fn send_reply(&self, transaction_id: TransactionId, result: Result<Payload, RemoteError>) {
        let command = Command::Reply {
            transaction_id,
            result,
        };
        if self.inner.commands.send(command).is_err() {
            tracing::warn!(
                tid = transaction_id,
                session = %self.inner.key,
                "reply on a closed session, dropping"
            );
        }
    }

    /// Ask the session to close. Pending calls fail with
    /// [`ReplyError::Cancelled`]. Idempotent.
    pub fn stop(&self) {
        let _ = self.inner.commands.send(Command::Stop);
    }

    /// Wait until the actor has exited and report why.
    pub async fn closed(&self) -> CloseReason {
        let mut status = self.inner.status.clone();
        let reason = match status
            .wait_for(|status| status.lifecycle == Lifecycle::Closed)
            .await
        {
            Ok(status) => status.reason.clone(),
            // The actor is gone; whatever it last published is final.
            Err(_) => self.inner.status.borrow().reason.clone(),
        };
        reason.unwrap_or(CloseReason::Stopped)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> Lifecycle {
        self.inner.status.borrow().lifecycle
    }

    /// Lifecycle state plus the close reason, once there is one.
    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }

    /// Registry key.
    pub fn key(&self) -> &SessionKey {
        &self.inner.key
    }

    /// Identifier of the owning service.
    pub fn service_id(&self) -> &str {
        &self.inner.key.service_id
    }

    /// Remote address, for diagnostics.
    pub fn remote_address(&self) -> &str {
        &self.inner.remote_address
    }

    /// A handle with no actor behind it.
    #[cfg(test)]
    pub(crate) fn detached(key: SessionKey, remote_address: &str) -> Self {
        let (commands, _) = mpsc::unbounded_channel();
        let (_, status) = watch::channel(SessionStatus::active());
        Self {
            inner: Arc::new(SessionInner {
                key,
                remote_address: remote_address.to_string(),
                commands,
                status,
                call_timeout: SessionConfig::default().call_timeout,
            }),
        }
    }
}

/// Login credentials for [`SessionBuilder::start`].
#[derive(Clone)]
pub struct Credentials {
    /// User name.
    pub user: String,
    /// Password.
    pub pass: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

/// Builds and starts sessions.
///
/// # Example
///
/// ```no_run
/// use ackline::{ConnectOptions, Credentials, RejectingHandler, SessionBuilder, TcpConnector};
///
/// # async fn run() -> Result<(), ackline::SessionError> {
/// let (session, session_id) = SessionBuilder::new("inventory", RejectingHandler)
///     .start(
///         &TcpConnector,
///         "10.0.0.5",
///         &ConnectOptions::default(),
///         &Credentials::new("admin", "secret"),
///     )
///     .await?;
/// println!("logged in as {session_id}");
/// let reply = session.call("stock", "count", Default::default()).await?;
/// println!("{reply:?}");
/// session.stop();
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder<H, C = JsonCodec> {
    service_id: String,
    handler: H,
    codec: C,
    config: SessionConfig,
    registry: SessionRegistry,
}

impl<H: RequestHandler> SessionBuilder<H> {
    /// Start building a session for `service_id` whose peer requests go to
    /// `handler`. Registers in [`SessionRegistry::global`] unless
    /// [`registry`](Self::registry) overrides it.
    pub fn new(service_id: impl Into<String>, handler: H) -> Self {
        Self {
            service_id: service_id.into(),
            handler,
            codec: JsonCodec,
            config: SessionConfig::default(),
            registry: SessionRegistry::global(),
        }
    }
}

impl<H: RequestHandler, C: WireCodec> SessionBuilder<H, C> {
    /// Use `config` for timeouts and the transaction id seed.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the session in `registry`.
    pub fn registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use a different wire codec.
    pub fn codec<C2: WireCodec>(self, codec: C2) -> SessionBuilder<H, C2> {
        SessionBuilder {
            service_id: self.service_id,
            handler: self.handler,
            codec,
            config: self.config,
            registry: self.registry,
        }
    }

    /// Spawn the session actor over an established connection.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidConfig`] if the configuration is inconsistent.
    pub fn open(self, connection: Connection) -> Result<Session, SessionError> {
        self.config.validate()?;

        let key = self.registry.allocate_key(&self.service_id);
        let remote_address = connection.remote_address.clone();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (expirations_tx, expirations_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::active());

        let session = Session {
            inner: Arc::new(SessionInner {
                key: key.clone(),
                remote_address: remote_address.clone(),
                commands: commands_tx,
                status: status_rx,
                call_timeout: self.config.call_timeout,
            }),
        };
        let state = SessionState::open(
            key.clone(),
            remote_address.clone(),
            &self.config,
            expirations_tx,
        );
        let actor = SessionActor::new(
            state,
            self.handler,
            self.codec,
            connection,
            commands_rx,
            expirations_rx,
            status_tx,
            session.clone(),
            self.registry.clone(),
        );

        self.registry.insert(session.clone());
        let span = tracing::info_span!(
            "session",
            service = %key.service_id,
            remote = %remote_address,
            key = %key,
        );
        tokio::spawn(actor.run().instrument(span));
        tracing::info!(session = %key, remote = %remote_address, "session opened");
        Ok(session)
    }

    /// Connect, open the session and log in.
    ///
    /// Issues `core`/`login` with `{user, pass}` and returns the session with
    /// the `session_id` from the reply. Any failure stops the session.
    ///
    /// # Errors
    ///
    /// Connect failures, a failed login call, or a reply without a
    /// `session_id`.
    pub async fn start(
        self,
        connector: &dyn Connector,
        host: &str,
        options: &ConnectOptions,
        credentials: &Credentials,
    ) -> Result<(Session, String), SessionError> {
        self.config.validate()?;
        let connection = connector.connect(host, options).await?;
        let session = self.open(connection)?;

        let mut payload = Payload::new();
        payload.insert("user".to_string(), Value::from(credentials.user.clone()));
        payload.insert("pass".to_string(), Value::from(credentials.pass.clone()));

        let reply = match session.call(CORE_CLASS, LOGIN_COMMAND, payload).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(session = %session.key(), error = %e, "login failed");
                session.stop();
                return Err(e.into());
            }
        };
        match session_id(&reply) {
            Some(id) => {
                tracing::info!(session = %session.key(), session_id = %id, "logged in");
                Ok((session, id))
            }
            None => {
                tracing::warn!(session = %session.key(), "login reply has no session_id");
                session.stop();
                Err(SessionError::MissingSessionId)
            }
        }
    }
}

fn session_id(reply: &Payload) -> Option<String> {
    match reply.get("session_id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

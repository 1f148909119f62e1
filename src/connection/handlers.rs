//! The session handler chain.
//!
//! A connection routes every received frame to its current handler.
//! Handlers advance the session through its states: the pre-dial
//! [`ConnectionHandler`] (no frame is legal yet), the [`LoginHandler`]
//! (identity, challenge, status), and the terminal [`MessageHandler`]
//! which answers heartbeats and hands everything else up to the agent
//! loop.

use std::collections::HashMap;

use async_trait::async_trait;
use prost::Message as _;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::Connection;
use crate::defaults;
use crate::error::OefError;
use crate::proto::{agent, server};

/// Invoked once when the login completes: `(connection, url, name)`.
pub type SuccessCallback = Box<dyn FnOnce(&Connection, &str, &str) + Send>;

/// Invoked once when the dial or login fails:
/// `(connection, url, error, name)`.
pub type FailureCallback = Box<dyn FnOnce(&Connection, &str, OefError, &str) + Send>;

/// A session handler. `incoming` consumes one frame and reports
/// whether it was fully handled; `handle_failure` surfaces an error to
/// the user's failure callback and tears the connection down.
#[async_trait]
pub trait FrameHandler: Send {
    async fn incoming(
        &mut self,
        data: Vec<u8>,
        connection_name: &str,
        conn: &Connection,
    ) -> Result<bool, OefError>;

    fn handle_failure(&mut self, error: OefError, conn: &Connection);
}

/// Pre-dial handler: surfaces dial errors; any frame is premature.
pub struct ConnectionHandler {
    failure: Option<FailureCallback>,
}

impl ConnectionHandler {
    pub fn new(failure: Option<FailureCallback>) -> Self {
        Self { failure }
    }
}

#[async_trait]
impl FrameHandler for ConnectionHandler {
    async fn incoming(
        &mut self,
        _data: Vec<u8>,
        _connection_name: &str,
        _conn: &Connection,
    ) -> Result<bool, OefError> {
        Err(OefError::PrematureMessage)
    }

    fn handle_failure(&mut self, error: OefError, conn: &Connection) {
        if let Some(failure) = self.failure.take() {
            failure(conn, &conn.url().unwrap_or_default(), error, conn.name());
        }
        conn.close();
    }
}

enum LoginPhase {
    WaitPhrase,
    WaitStatus,
}

/// Drives the login choreography.
///
/// The challenge answer is the byte-wise reversal of the server's
/// phrase; it demonstrates liveness only and must not be treated as
/// authentication.
pub struct LoginHandler {
    phase: LoginPhase,
    success: Option<SuccessCallback>,
    failure: Option<FailureCallback>,
    forward: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl LoginHandler {
    pub fn new(
        success: Option<SuccessCallback>,
        failure: Option<FailureCallback>,
        forward: Option<mpsc::UnboundedSender<Vec<u8>>>,
    ) -> Self {
        Self {
            phase: LoginPhase::WaitPhrase,
            success,
            failure,
            forward,
        }
    }

    /// Login step 1: announce the agent's public key.
    pub fn send_identity(conn: &Connection, public_key: &str) {
        let id = agent::handshake::Id {
            public_key: public_key.to_string(),
        };
        conn.send(id.encode_to_vec());
    }

    fn answer(phrase: &[u8]) -> agent::handshake::Answer {
        agent::handshake::Answer {
            answer: phrase.iter().rev().copied().collect(),
            capability_bits: Some(agent::handshake::CapabilityBits {
                will_heartbeat: true,
            }),
        }
    }
}

#[async_trait]
impl FrameHandler for LoginHandler {
    async fn incoming(
        &mut self,
        data: Vec<u8>,
        connection_name: &str,
        conn: &Connection,
    ) -> Result<bool, OefError> {
        match self.phase {
            LoginPhase::WaitPhrase => {
                let phrase = server::Phrase::decode(data.as_slice())?;
                match phrase.payload {
                    Some(server::phrase::Payload::Phrase(challenge)) => {
                        debug!("{}: answering login challenge", connection_name);
                        conn.send(Self::answer(&challenge).encode_to_vec());
                        self.phase = LoginPhase::WaitStatus;
                        conn.set_state(super::ConnectionState::LoginWaitStatus);
                        Ok(true)
                    }
                    Some(server::phrase::Payload::Failure(failure)) => {
                        Err(OefError::LoginRejected(if failure.cause.is_empty() {
                            "rejected before challenge".to_string()
                        } else {
                            failure.cause
                        }))
                    }
                    None => Err(OefError::Protocol(
                        "bad login message from server".to_string(),
                    )),
                }
            }
            LoginPhase::WaitStatus => {
                let connected = server::Connected::decode(data.as_slice())?;
                if connected.status {
                    debug!("{}: login accepted", connection_name);
                    conn.set_message_handler(MessageHandler::new(self.forward.take()));
                    conn.set_state(super::ConnectionState::Ready);
                    if let Some(success) = self.success.take() {
                        success(conn, &conn.url().unwrap_or_default(), connection_name);
                    }
                    Ok(true)
                } else {
                    Err(OefError::LoginRejected("bad challenge/response".to_string()))
                }
            }
        }
    }

    fn handle_failure(&mut self, error: OefError, conn: &Connection) {
        if let Some(failure) = self.failure.take() {
            failure(conn, &conn.url().unwrap_or_default(), error, conn.name());
        }
        conn.close();
    }
}

/// The steady-state handler: answers server pings, forwards every
/// other frame to the agent loop.
pub struct MessageHandler {
    forward: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl MessageHandler {
    pub fn new(forward: Option<mpsc::UnboundedSender<Vec<u8>>>) -> Self {
        Self { forward }
    }

    fn pong() -> agent::Envelope {
        agent::Envelope {
            msg_id: 0,
            agent_uri: String::new(),
            payload: Some(agent::envelope::Payload::Pong(agent::Pong {
                dummy: defaults::PONG_DUMMY,
            })),
        }
    }

    async fn consume(
        &mut self,
        data: Vec<u8>,
        connection_name: &str,
        conn: &Connection,
    ) -> Result<bool, OefError> {
        if let Ok(msg) = server::AgentMessage::decode(data.as_slice()) {
            if matches!(
                msg.payload,
                Some(server::agent_message::Payload::Ping(_))
            ) {
                debug!("{}: ping, answering pong", connection_name);
                conn.send(Self::pong().encode_to_vec());
                return Ok(true);
            }
        }
        // Undecodable frames are forwarded too; the agent loop is the
        // layer that reports bad messages and keeps running.
        match &self.forward {
            Some(forward) => {
                let _ = forward.send(data);
            }
            None => debug!("{}: no consumer for frame, dropping", connection_name),
        }
        Ok(false)
    }
}

#[async_trait]
impl FrameHandler for MessageHandler {
    async fn incoming(
        &mut self,
        data: Vec<u8>,
        connection_name: &str,
        conn: &Connection,
    ) -> Result<bool, OefError> {
        self.consume(data, connection_name, conn).await
    }

    fn handle_failure(&mut self, error: OefError, conn: &Connection) {
        warn!("{}: failure in steady state: {}", conn.name(), error);
        conn.close();
    }
}

/// Steady-state handler shared across several connections. Tracks the
/// live set and keeps a url-to-connection map pointed at the most
/// recent connection for each url.
pub struct MultipleConnectionMessageHandler {
    base: MessageHandler,
    conns: Vec<Connection>,
    url_to_conn: HashMap<String, Connection>,
}

impl MultipleConnectionMessageHandler {
    pub fn new(forward: Option<mpsc::UnboundedSender<Vec<u8>>>) -> Self {
        Self {
            base: MessageHandler::new(forward),
            conns: Vec::new(),
            url_to_conn: HashMap::new(),
        }
    }

    fn register(&mut self, conn: &Connection) {
        let Some(url) = conn.url() else { return };
        if !self.conns.iter().any(|c| c.same_as(conn)) {
            self.conns.push(conn.clone());
            self.url_to_conn.insert(url.clone(), conn.clone());
        }
        let current = self.url_to_conn.get(&url);
        if !current.is_some_and(|c| c.same_as(conn)) {
            // The connection moved to a new url, or a newer connection
            // took over this url: drop stale mappings for it.
            self.url_to_conn.retain(|_, c| !c.same_as(conn));
            self.url_to_conn.insert(url, conn.clone());
        }
    }

    /// Send a payload over the connection registered for `url`.
    pub fn send_to(&self, url: &str, payload: Vec<u8>) -> Result<(), OefError> {
        match self.url_to_conn.get(url) {
            Some(conn) => {
                conn.send(payload);
                Ok(())
            }
            None => Err(OefError::Connection(format!(
                "no connection for url {:?}",
                url
            ))),
        }
    }

    pub fn connections(&self) -> &[Connection] {
        &self.conns
    }
}

#[async_trait]
impl FrameHandler for MultipleConnectionMessageHandler {
    async fn incoming(
        &mut self,
        data: Vec<u8>,
        connection_name: &str,
        conn: &Connection,
    ) -> Result<bool, OefError> {
        self.register(conn);
        let handled = self.base.consume(data, connection_name, conn).await?;
        if !handled {
            debug!("{}: frame left for the agent loop", connection_name);
        }
        Ok(handled)
    }

    fn handle_failure(&mut self, error: OefError, conn: &Connection) {
        self.base.handle_failure(error, conn);
    }
}

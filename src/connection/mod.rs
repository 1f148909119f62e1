//! The connection engine.
//!
//! A [`Connection`] owns one TCP stream and an outbound queue, and
//! runs two cooperative tasks on the scheduler core: a send pump that
//! drains the queue onto the wire, and a receive pump that routes
//! inbound frames to the current [`FrameHandler`]. `connect` installs
//! the login handler chain; once the handshake completes the terminal
//! handler forwards frames to the agent loop.

pub mod handlers;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::{Core, TaskHandle};
use crate::error::OefError;
use crate::transport::{self, FrameReader, FrameWriter};
use crate::utils::split_host_port;
use handlers::{ConnectionHandler, FailureCallback, FrameHandler, LoginHandler, SuccessCallback};

/// Session state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    LoginWaitPhrase,
    LoginWaitStatus,
    Ready,
    Closing,
    Closed,
}

/// Parameters for [`Connection::connect`].
pub struct ConnectOptions {
    pub url: String,
    pub public_key: String,
    pub success: Option<SuccessCallback>,
    pub failure: Option<FailureCallback>,
    /// Receives the frames the terminal handler does not consume.
    pub forward: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl ConnectOptions {
    pub fn new(url: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            public_key: public_key.into(),
            success: None,
            failure: None,
            forward: None,
        }
    }

    pub fn on_success(mut self, callback: SuccessCallback) -> Self {
        self.success = Some(callback);
        self
    }

    pub fn on_failure(mut self, callback: FailureCallback) -> Self {
        self.failure = Some(callback);
        self
    }

    pub fn forward_to(mut self, sender: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        self.forward = Some(sender);
        self
    }
}

// Payloads queued for the send pump; `None` is the shutdown sentinel.
type Outbound = mpsc::UnboundedSender<Option<Vec<u8>>>;

/// A handler shared between the receive pump and, optionally, several
/// connections (see
/// [`handlers::MultipleConnectionMessageHandler`]).
pub type SharedHandler = Arc<tokio::sync::Mutex<dyn FrameHandler>>;

struct State {
    url: Option<String>,
    phase: ConnectionState,
    outq: Option<Outbound>,
    send_pump: Option<TaskHandle>,
    recv_pump: Option<TaskHandle>,
}

struct Inner {
    core: Core,
    name: String,
    state: Mutex<State>,
    handler: Mutex<Option<SharedHandler>>,
}

/// One client connection to an OEF node.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create a connection and register it with the core. The name is
    /// used in callbacks and logging; a random one is generated when
    /// not supplied.
    pub fn new(core: &Core, name: Option<String>) -> Self {
        let connection = Self {
            inner: Arc::new(Inner {
                core: core.clone(),
                name: name.unwrap_or_else(|| format!("conn-{}", Uuid::new_v4())),
                state: Mutex::new(State {
                    url: None,
                    phase: ConnectionState::Idle,
                    outq: None,
                    send_pump: None,
                    recv_pump: None,
                }),
                handler: Mutex::new(None),
            }),
        };
        core.register_connection(&connection);
        connection
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn url(&self) -> Option<String> {
        self.inner.state.lock().url.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().phase
    }

    /// Identity comparison; connections are handles to shared state.
    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_state(&self, phase: ConnectionState) {
        self.inner.state.lock().phase = phase;
    }

    /// Install a new handler; subsequent frames are routed to it.
    pub fn set_message_handler<H: FrameHandler + 'static>(&self, handler: H) {
        *self.inner.handler.lock() = Some(Arc::new(tokio::sync::Mutex::new(handler)));
    }

    /// Install an existing handler, possibly shared with other
    /// connections.
    pub fn set_shared_message_handler(&self, handler: SharedHandler) {
        *self.inner.handler.lock() = Some(handler);
    }

    fn current_handler(&self) -> Option<SharedHandler> {
        self.inner.handler.lock().clone()
    }

    /// Dial and log in. Idempotent against a connection already open
    /// to the same url; the work itself happens on the scheduler
    /// thread and this call returns immediately.
    pub fn connect(&self, options: ConnectOptions) -> Result<(), OefError> {
        {
            let state = self.inner.state.lock();
            if state.url.as_deref() == Some(options.url.as_str()) {
                debug!("{}: already connected to {}", self.name(), options.url);
                return Ok(());
            }
        }
        let conn = self.clone();
        self.inner
            .core
            .call_soon_async(async move { conn.do_connect(options).await })?;
        Ok(())
    }

    /// Queue a payload for transmission. Payloads are framed and sent
    /// in the order they are queued. Before a successful dial there is
    /// no queue and the payload is dropped.
    pub fn send(&self, payload: Vec<u8>) {
        let state = self.inner.state.lock();
        if let Some(outq) = &state.outq {
            let _ = outq.send(Some(payload));
        }
    }

    /// Deregister from the core and schedule teardown.
    pub fn close(&self) {
        self.inner.core.deregister_connection(self);
        let conn = self.clone();
        if self
            .inner
            .core
            .call_soon_async(async move { conn.do_stop().await })
            .is_err()
        {
            // Core already gone; nothing left to tear down.
            self.set_state(ConnectionState::Closed);
        }
    }

    async fn do_connect(self, options: ConnectOptions) {
        let ConnectOptions {
            url,
            public_key,
            success,
            mut failure,
            forward,
        } = options;

        self.set_state(ConnectionState::Connecting);
        self.inner.state.lock().url = Some(url.clone());
        // No frame is legal until the login chain is installed.
        self.set_message_handler(ConnectionHandler::new(None));

        let dialed = match split_host_port(&url) {
            Ok((host, port)) => TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|e| OefError::Connection(format!("dial {} failed: {}", url, e))),
            Err(e) => Err(e),
        };
        let stream = match dialed {
            Ok(stream) => stream,
            Err(error) => {
                warn!("{}: {}", self.name(), error);
                ConnectionHandler::new(failure.take()).handle_failure(error, &self);
                return;
            }
        };
        let _ = stream.set_nodelay(true);
        let (reader, writer) = transport::split(stream);

        let (outq_tx, outq_rx) = mpsc::unbounded_channel();
        {
            let mut state = self.inner.state.lock();
            state.outq = Some(outq_tx);
            state.phase = ConnectionState::LoginWaitPhrase;
        }

        self.set_message_handler(LoginHandler::new(success, failure, forward));
        LoginHandler::send_identity(&self, &public_key);

        let send_conn = self.clone();
        let recv_conn = self.clone();
        let send_pump = self
            .inner
            .core
            .call_soon_async(async move { run_send_pump(send_conn, outq_rx, writer).await });
        let recv_pump = self
            .inner
            .core
            .call_soon_async(async move { run_recv_pump(recv_conn, reader).await });
        match (send_pump, recv_pump) {
            (Ok(send_pump), Ok(recv_pump)) => {
                let mut state = self.inner.state.lock();
                state.send_pump = Some(send_pump);
                state.recv_pump = Some(recv_pump);
            }
            _ => {
                warn!("{}: failed to start pumps", self.name());
                self.close();
            }
        }
    }

    async fn do_stop(self) {
        self.set_state(ConnectionState::Closing);
        let (outq, send_pump, recv_pump) = {
            let mut state = self.inner.state.lock();
            (
                state.outq.take(),
                state.send_pump.take(),
                state.recv_pump.take(),
            )
        };
        if let Some(outq) = outq {
            // Wake the send pump so it exits before the abort lands.
            let _ = outq.send(None);
        }
        if let Some(pump) = send_pump {
            pump.cancel();
        }
        if let Some(pump) = recv_pump {
            pump.cancel();
        }
        *self.inner.handler.lock() = None;
        self.set_state(ConnectionState::Closed);
        debug!("{}: closed", self.name());
    }
}

async fn run_send_pump(
    conn: Connection,
    mut outq: mpsc::UnboundedReceiver<Option<Vec<u8>>>,
    mut writer: FrameWriter,
) {
    while let Some(Some(payload)) = outq.recv().await {
        if let Err(error) = writer.send(&payload).await {
            debug!("{}: send failed: {}", conn.name(), error);
            break;
        }
    }
    debug!("{}: send pump finished", conn.name());
}

async fn run_recv_pump(conn: Connection, mut reader: FrameReader) {
    loop {
        match reader.receive().await {
            Ok(frame) => {
                let Some(handler) = conn.current_handler() else {
                    warn!("{}: frame arrived with no handler installed", conn.name());
                    continue;
                };
                let name = conn.name().to_string();
                let outcome = {
                    let mut guard = handler.lock().await;
                    guard.incoming(frame, &name, &conn).await
                };
                if let Err(error) = outcome {
                    let mut guard = handler.lock().await;
                    guard.handle_failure(error, &conn);
                    break;
                }
            }
            // Orderly remote close; shutting down is the owner's call.
            Err(OefError::EndOfStream) => {
                debug!("{}: end of stream", conn.name());
                break;
            }
            Err(error) => {
                warn!("{}: receive failed: {}", conn.name(), error);
                if let Some(handler) = conn.current_handler() {
                    handler.lock().await.handle_failure(error, &conn);
                }
                break;
            }
        }
    }
}

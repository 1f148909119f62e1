//! The network proxy: the agent-facing face of one OEF session.
//!
//! `OefNetworkProxy` dials through the connection engine, waits for
//! the login chain to finish, and then exposes the directory, search
//! and dialogue operations as typed envelope sends. Its event loop
//! pulls the frames the terminal handler forwarded, decodes them and
//! dispatches to the user's [`AgentHandler`] callbacks, tracking a
//! per-dialogue [`Context`] for the duration of each callback.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use prost::Message as _;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, warn};

use crate::agent::{AgentHandler, SearchResultItem};
use crate::connection::{ConnectOptions, Connection};
use crate::core::Core;
use crate::error::OefError;
use crate::messages::{
    Accept, AgentMessage, Cfp, CfpPayload, Decline, OefErrorOperation, Proposals, Propose,
    RegisterDescription, RegisterService, SearchAgents, SearchServices, SearchServicesWide,
    UnregisterDescription, UnregisterService,
};
use crate::proto::{fipa, server};
use crate::query::Query;
use crate::schema::Description;
use crate::uri::{Context, OefUri};

/// The cause and detail the node attached to an error frame, kept for
/// the duration of the `on_oef_error` callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OefErrorDetail {
    pub cause: String,
    pub detail: String,
}

type ContextKey = (u32, u32, String);
type ContextStore = Arc<Mutex<HashMap<ContextKey, Context>>>;
type DetailStore = Arc<Mutex<HashMap<u32, OefErrorDetail>>>;

// Release-on-drop entries: the callback sees the record, and it is
// gone once the callback returns, whether it returned or panicked.
struct ContextGuard {
    store: ContextStore,
    key: ContextKey,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.store.lock().remove(&self.key);
    }
}

struct DetailGuard {
    store: DetailStore,
    key: u32,
}

impl Drop for DetailGuard {
    fn drop(&mut self) {
        self.store.lock().remove(&self.key);
    }
}

/// Cloneable read access to the per-dialogue context store, for
/// handler implementations that cannot borrow the agent during a
/// callback.
#[derive(Clone)]
pub struct ContextLookup {
    store: ContextStore,
}

impl ContextLookup {
    /// The context of the frame currently being dispatched under this
    /// key, or an empty context outside its callback.
    pub fn get(&self, message_id: u32, dialogue_id: u32, origin: &str) -> Context {
        self.store
            .lock()
            .get(&(message_id, dialogue_id, origin.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

/// Cloneable read access to the error-detail store; see
/// [`ContextLookup`].
#[derive(Clone)]
pub struct ErrorDetailLookup {
    store: DetailStore,
}

impl ErrorDetailLookup {
    pub fn get(&self, answer_id: u32) -> OefErrorDetail {
        self.store
            .lock()
            .get(&answer_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Proxy to one OEF node session.
pub struct OefNetworkProxy {
    public_key: String,
    oef_addr: String,
    port: u16,
    core: Core,
    connection: Option<Connection>,
    incoming: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    contexts: ContextStore,
    error_details: DetailStore,
    shutdown: Arc<Notify>,
}

impl OefNetworkProxy {
    pub fn new(public_key: &str, oef_addr: &str, port: u16, core: &Core) -> Self {
        Self {
            public_key: public_key.to_string(),
            oef_addr: oef_addr.to_string(),
            port,
            core: core.clone(),
            connection: None,
            incoming: None,
            contexts: Arc::new(Mutex::new(HashMap::new())),
            error_details: Arc::new(Mutex::new(HashMap::new())),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub(crate) fn core(&self) -> &Core {
        &self.core
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub(crate) fn stop_signal(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Dial the node and run the login handshake; resolves when the
    /// server accepts or rejects the session.
    pub async fn connect(&mut self) -> Result<(), OefError> {
        if self.is_connected() {
            return Ok(());
        }
        let url = format!("{}:{}", self.oef_addr, self.port);
        let connection = Connection::new(&self.core, Some(format!("agent-{}", self.public_key)));

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel::<Result<(), OefError>>();
        let done = Arc::new(Mutex::new(Some(done_tx)));
        let done_on_success = done.clone();

        let options = ConnectOptions::new(&url, &self.public_key)
            .on_success(Box::new(move |_conn, url, name| {
                debug!("{}: session established to {}", name, url);
                if let Some(tx) = done_on_success.lock().take() {
                    let _ = tx.send(Ok(()));
                }
            }))
            .on_failure(Box::new(move |_conn, url, error, name| {
                warn!("{}: connection to {} failed: {}", name, url, error);
                if let Some(tx) = done.lock().take() {
                    let _ = tx.send(Err(error));
                }
            }))
            .forward_to(frame_tx);

        connection.connect(options)?;
        match done_rx.await {
            Ok(Ok(())) => {
                self.connection = Some(connection);
                self.incoming = Some(frame_rx);
                Ok(())
            }
            Ok(Err(error)) => Err(error),
            Err(_) => Err(OefError::Connection(
                "connection closed during login".to_string(),
            )),
        }
    }

    fn send_envelope(&self, envelope: crate::proto::agent::Envelope) -> Result<(), OefError> {
        let connection = self.connection.as_ref().ok_or_else(|| {
            OefError::Connection("connection not established yet, call connect() first".to_string())
        })?;
        connection.send(envelope.encode_to_vec());
        Ok(())
    }

    fn service_uri(&self, service_id: &str) -> OefUri {
        OefUri::builder()
            .agent_key(&self.public_key)
            .agent_alias(service_id)
            .build()
    }

    pub fn register_agent(&self, msg_id: u32, description: &Description) -> Result<(), OefError> {
        self.send_envelope(RegisterDescription::new(msg_id, description.clone()).to_envelope())
    }

    pub fn unregister_agent(&self, msg_id: u32) -> Result<(), OefError> {
        self.send_envelope(UnregisterDescription::new(msg_id).to_envelope())
    }

    pub fn register_service(
        &self,
        msg_id: u32,
        description: &Description,
        service_id: &str,
    ) -> Result<(), OefError> {
        let message =
            RegisterService::new(msg_id, description.clone(), self.service_uri(service_id));
        self.send_envelope(message.to_envelope())
    }

    pub fn unregister_service(
        &self,
        msg_id: u32,
        description: &Description,
        service_id: &str,
    ) -> Result<(), OefError> {
        let message =
            UnregisterService::new(msg_id, description.clone(), self.service_uri(service_id));
        self.send_envelope(message.to_envelope())
    }

    pub fn search_agents(&self, search_id: u32, query: &Query) -> Result<(), OefError> {
        self.send_envelope(SearchAgents::new(search_id, query.clone()).to_envelope()?)
    }

    pub fn search_services(&self, search_id: u32, query: &Query) -> Result<(), OefError> {
        self.send_envelope(SearchServices::new(search_id, query.clone()).to_envelope()?)
    }

    pub fn search_services_wide(&self, search_id: u32, query: &Query) -> Result<(), OefError> {
        self.send_envelope(SearchServicesWide::new(search_id, query.clone()).to_envelope()?)
    }

    pub fn send_message(
        &self,
        msg_id: u32,
        dialogue_id: u32,
        destination: &str,
        content: Vec<u8>,
        context: Context,
    ) -> Result<(), OefError> {
        let message = AgentMessage::new(msg_id, dialogue_id, destination, content, context);
        self.send_envelope(message.to_envelope())
    }

    pub fn send_cfp(
        &self,
        msg_id: u32,
        dialogue_id: u32,
        destination: &str,
        target: u32,
        payload: CfpPayload,
        context: Context,
    ) -> Result<(), OefError> {
        let message = Cfp::new(msg_id, dialogue_id, destination, target, payload, context);
        self.send_envelope(message.to_envelope()?)
    }

    pub fn send_propose(
        &self,
        msg_id: u32,
        dialogue_id: u32,
        destination: &str,
        target: u32,
        proposals: Proposals,
        context: Context,
    ) -> Result<(), OefError> {
        let message = Propose::new(msg_id, dialogue_id, destination, target, proposals, context);
        self.send_envelope(message.to_envelope())
    }

    pub fn send_accept(
        &self,
        msg_id: u32,
        dialogue_id: u32,
        destination: &str,
        target: u32,
        context: Context,
    ) -> Result<(), OefError> {
        self.send_envelope(Accept::new(msg_id, dialogue_id, destination, target, context).to_envelope())
    }

    pub fn send_decline(
        &self,
        msg_id: u32,
        dialogue_id: u32,
        destination: &str,
        target: u32,
        context: Context,
    ) -> Result<(), OefError> {
        self.send_envelope(Decline::new(msg_id, dialogue_id, destination, target, context).to_envelope())
    }

    /// The routing context of the frame currently being dispatched,
    /// or an empty context outside a dispatch.
    pub fn get_context(&self, message_id: u32, dialogue_id: u32, origin: &str) -> Context {
        self.contexts
            .lock()
            .get(&(message_id, dialogue_id, origin.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn context_lookup(&self) -> ContextLookup {
        ContextLookup {
            store: self.contexts.clone(),
        }
    }

    pub fn error_detail_lookup(&self) -> ErrorDetailLookup {
        ErrorDetailLookup {
            store: self.error_details.clone(),
        }
    }

    /// Cause and detail of the error currently surfacing through
    /// `on_oef_error`, or an empty record outside that callback.
    pub fn error_detail(&self, answer_id: u32) -> OefErrorDetail {
        self.error_details
            .lock()
            .get(&answer_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Dispatch server frames to the handler until stopped or the
    /// connection goes away.
    pub async fn run_loop(&mut self, agent: &mut dyn AgentHandler) -> Result<(), OefError> {
        let mut incoming = self.incoming.take().ok_or_else(|| {
            OefError::Connection("connection not established yet, call connect() first".to_string())
        })?;
        let shutdown = self.shutdown.clone();
        let contexts = self.contexts.clone();
        let error_details = self.error_details.clone();

        loop {
            let frame = tokio::select! {
                _ = shutdown.notified() => break,
                frame = incoming.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        debug!("{}: frame stream ended", self.public_key);
                        break;
                    }
                },
            };
            dispatch_frame(&contexts, &error_details, agent, frame).await;
        }
        self.incoming = Some(incoming);
        Ok(())
    }

    /// Tear the session down. The event loop, if running, exits at
    /// its next iteration.
    pub async fn stop(&mut self) {
        self.shutdown.notify_one();
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        self.incoming = None;
    }
}

enum ContentEvent {
    Raw(Vec<u8>),
    Cfp { target: u32, payload: CfpPayload },
    Propose { target: u32, proposals: Proposals },
    Accept { target: u32 },
    Decline { target: u32 },
}

fn decode_content(content: server::Content) -> Result<ContentEvent, OefError> {
    match content.payload {
        Some(server::content::Payload::Content(bytes)) => Ok(ContentEvent::Raw(bytes)),
        Some(server::content::Payload::Fipa(message)) => {
            let target = message.target;
            match message.msg {
                Some(fipa::message::Msg::Cfp(cfp)) => {
                    let payload = match cfp.payload {
                        Some(fipa::cfp::Payload::Nothing(_)) | None => CfpPayload::Nothing,
                        Some(fipa::cfp::Payload::Content(bytes)) => CfpPayload::Raw(bytes),
                        Some(fipa::cfp::Payload::Query(tree)) => {
                            CfpPayload::Query(Query::from_pb(&tree)?)
                        }
                    };
                    Ok(ContentEvent::Cfp { target, payload })
                }
                Some(fipa::message::Msg::Propose(propose)) => {
                    let proposals = match propose.payload {
                        Some(fipa::propose::Payload::Content(bytes)) => Proposals::Raw(bytes),
                        Some(fipa::propose::Payload::Proposals(list)) => Proposals::Descriptions(
                            list.objects
                                .iter()
                                .map(Description::from_pb)
                                .collect::<Result<Vec<_>, _>>()?,
                        ),
                        None => Proposals::Raw(Vec::new()),
                    };
                    Ok(ContentEvent::Propose { target, proposals })
                }
                Some(fipa::message::Msg::Accept(_)) => Ok(ContentEvent::Accept { target }),
                Some(fipa::message::Msg::Decline(_)) => Ok(ContentEvent::Decline { target }),
                None => Err(OefError::Protocol("empty fipa message".to_string())),
            }
        }
        None => Err(OefError::Protocol("empty content frame".to_string())),
    }
}

async fn dispatch_frame(
    contexts: &ContextStore,
    error_details: &DetailStore,
    agent: &mut dyn AgentHandler,
    data: Vec<u8>,
) {
    let msg = match server::AgentMessage::decode(data.as_slice()) {
        Ok(msg) => msg,
        Err(error) => {
            warn!("undecodable server frame: {}", error);
            agent.on_oef_error(0, OefErrorOperation::BadMessage).await;
            return;
        }
    };
    let answer_id = msg.answer_id;
    let Some(payload) = msg.payload else {
        warn!("server frame {} carries no payload", answer_id);
        agent
            .on_oef_error(answer_id, OefErrorOperation::BadMessage)
            .await;
        return;
    };

    match payload {
        server::agent_message::Payload::Agents(list) => {
            agent.on_search_result(answer_id, list.agents).await;
        }
        server::agent_message::Payload::AgentsWide(wide) => {
            let mut items = Vec::new();
            for result in wide.result {
                let core_key = String::from_utf8_lossy(&result.key).into_owned();
                for found in result.agents {
                    items.push(SearchResultItem {
                        agent_key: String::from_utf8_lossy(&found.key).into_owned(),
                        core_key: core_key.clone(),
                        core_addr: result.ip.clone(),
                        core_port: result.port,
                        distance: result.distance,
                    });
                }
            }
            agent.on_search_result_wide(answer_id, items).await;
        }
        server::agent_message::Payload::OefError(error) => {
            error_details.lock().insert(
                answer_id,
                OefErrorDetail {
                    cause: error.cause,
                    detail: error.detail,
                },
            );
            let _details = DetailGuard {
                store: error_details.clone(),
                key: answer_id,
            };
            agent
                .on_oef_error(answer_id, OefErrorOperation::from_code(error.operation))
                .await;
        }
        server::agent_message::Payload::DialogueError(error) => {
            agent
                .on_dialogue_error(answer_id, error.dialogue_id, &error.origin)
                .await;
        }
        // Heartbeats are answered by the connection's handler chain.
        server::agent_message::Payload::Ping(_) => {
            debug!("ping frame reached the agent loop, ignoring");
        }
        server::agent_message::Payload::Content(content) => {
            let dialogue_id = content.dialogue_id;
            let origin = content.origin.clone();
            let key = (answer_id, dialogue_id, origin.clone());
            let mut context = Context::default();
            context.update(&msg.target_uri, &msg.source_uri);
            contexts.lock().insert(key.clone(), context);
            let _context = ContextGuard {
                store: contexts.clone(),
                key,
            };
            match decode_content(content) {
                Ok(ContentEvent::Raw(bytes)) => {
                    agent.on_message(answer_id, dialogue_id, &origin, bytes).await;
                }
                Ok(ContentEvent::Cfp { target, payload }) => {
                    agent
                        .on_cfp(answer_id, dialogue_id, &origin, target, payload)
                        .await;
                }
                Ok(ContentEvent::Propose { target, proposals }) => {
                    agent
                        .on_propose(answer_id, dialogue_id, &origin, target, proposals)
                        .await;
                }
                Ok(ContentEvent::Accept { target }) => {
                    agent.on_accept(answer_id, dialogue_id, &origin, target).await;
                }
                Ok(ContentEvent::Decline { target }) => {
                    agent
                        .on_decline(answer_id, dialogue_id, &origin, target)
                        .await;
                }
                Err(error) => {
                    warn!("bad content frame {}: {}", answer_id, error);
                    agent
                        .on_oef_error(answer_id, OefErrorOperation::BadMessage)
                        .await;
                }
            }
        }
    }
}

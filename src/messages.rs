//! Typed builders for the wire envelopes.
//!
//! Every outbound request is built by a small constructor that owns
//! the `msg_id` and fills exactly one envelope case. The server-frame
//! builders at the bottom are the node-side counterparts; the crate
//! uses them to script test servers.

use crate::error::OefError;
use crate::proto::{agent, fipa, server};
use crate::query::Query;
use crate::schema::Description;
use crate::uri::{Context, OefUri};

/// Operation codes carried by OEF error frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OefErrorOperation {
    RegisterService,
    UnregisterService,
    RegisterDescription,
    UnregisterDescription,
    SearchServices,
    SearchServicesWide,
    SearchAgents,
    SendMessage,
    Other,
    BadMessage,
    BadOperation,
    Karma,
}

impl OefErrorOperation {
    pub fn code(self) -> u32 {
        match self {
            OefErrorOperation::RegisterService => 0,
            OefErrorOperation::UnregisterService => 1,
            OefErrorOperation::RegisterDescription => 2,
            OefErrorOperation::UnregisterDescription => 3,
            OefErrorOperation::SearchServices => 0x4,
            OefErrorOperation::SearchServicesWide => 0x5,
            OefErrorOperation::SearchAgents => 0x6,
            OefErrorOperation::SendMessage => 0x7,
            OefErrorOperation::Other => 0x99,
            OefErrorOperation::BadMessage => 0x100,
            OefErrorOperation::BadOperation => 0x101,
            OefErrorOperation::Karma => 0x200,
        }
    }

    /// Unknown codes collapse to `Other`.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => OefErrorOperation::RegisterService,
            1 => OefErrorOperation::UnregisterService,
            2 => OefErrorOperation::RegisterDescription,
            3 => OefErrorOperation::UnregisterDescription,
            0x4 => OefErrorOperation::SearchServices,
            0x5 => OefErrorOperation::SearchServicesWide,
            0x6 => OefErrorOperation::SearchAgents,
            0x7 => OefErrorOperation::SendMessage,
            0x100 => OefErrorOperation::BadMessage,
            0x101 => OefErrorOperation::BadOperation,
            0x200 => OefErrorOperation::Karma,
            _ => OefErrorOperation::Other,
        }
    }
}

/// Payload of a CFP.
#[derive(Debug, Clone, PartialEq)]
pub enum CfpPayload {
    Nothing,
    Raw(Vec<u8>),
    Query(Query),
}

/// Payload of a Propose.
#[derive(Debug, Clone, PartialEq)]
pub enum Proposals {
    Raw(Vec<u8>),
    Descriptions(Vec<Description>),
}

/// Register an agent description in the agent directory.
pub struct RegisterDescription {
    pub msg_id: u32,
    pub description: Description,
}

impl RegisterDescription {
    pub fn new(msg_id: u32, description: Description) -> Self {
        Self {
            msg_id,
            description,
        }
    }

    pub fn to_envelope(&self) -> agent::Envelope {
        agent::Envelope {
            msg_id: self.msg_id,
            agent_uri: String::new(),
            payload: Some(agent::envelope::Payload::RegisterDescription(
                self.description.to_agent_description_pb(),
            )),
        }
    }
}

/// Register a service description in the service directory. The URI
/// names the registering agent and the service alias.
pub struct RegisterService {
    pub msg_id: u32,
    pub description: Description,
    pub uri: OefUri,
}

impl RegisterService {
    pub fn new(msg_id: u32, description: Description, uri: OefUri) -> Self {
        Self {
            msg_id,
            description,
            uri,
        }
    }

    pub fn to_envelope(&self) -> agent::Envelope {
        agent::Envelope {
            msg_id: self.msg_id,
            agent_uri: self.uri.to_string(),
            payload: Some(agent::envelope::Payload::RegisterService(
                self.description.to_agent_description_pb(),
            )),
        }
    }
}

/// Remove this agent's description from the agent directory.
pub struct UnregisterDescription {
    pub msg_id: u32,
}

impl UnregisterDescription {
    pub fn new(msg_id: u32) -> Self {
        Self { msg_id }
    }

    pub fn to_envelope(&self) -> agent::Envelope {
        agent::Envelope {
            msg_id: self.msg_id,
            agent_uri: String::new(),
            payload: Some(agent::envelope::Payload::UnregisterDescription(
                agent::Nothing {},
            )),
        }
    }
}

/// Remove a service registration.
pub struct UnregisterService {
    pub msg_id: u32,
    pub description: Description,
    pub uri: OefUri,
}

impl UnregisterService {
    pub fn new(msg_id: u32, description: Description, uri: OefUri) -> Self {
        Self {
            msg_id,
            description,
            uri,
        }
    }

    pub fn to_envelope(&self) -> agent::Envelope {
        agent::Envelope {
            msg_id: self.msg_id,
            agent_uri: self.uri.to_string(),
            payload: Some(agent::envelope::Payload::UnregisterService(
                self.description.to_agent_description_pb(),
            )),
        }
    }
}

fn search_payload(query: &Query) -> Result<agent::AgentSearch, OefError> {
    Ok(agent::AgentSearch {
        query_v2: Some(query.to_pb()?),
    })
}

/// Search the agent directory.
pub struct SearchAgents {
    pub msg_id: u32,
    pub query: Query,
}

impl SearchAgents {
    pub fn new(msg_id: u32, query: Query) -> Self {
        Self { msg_id, query }
    }

    pub fn to_envelope(&self) -> Result<agent::Envelope, OefError> {
        Ok(agent::Envelope {
            msg_id: self.msg_id,
            agent_uri: String::new(),
            payload: Some(agent::envelope::Payload::SearchAgents(search_payload(
                &self.query,
            )?)),
        })
    }
}

/// Search the service directory of the connected core.
pub struct SearchServices {
    pub msg_id: u32,
    pub query: Query,
}

impl SearchServices {
    pub fn new(msg_id: u32, query: Query) -> Self {
        Self { msg_id, query }
    }

    pub fn to_envelope(&self) -> Result<agent::Envelope, OefError> {
        Ok(agent::Envelope {
            msg_id: self.msg_id,
            agent_uri: String::new(),
            payload: Some(agent::envelope::Payload::SearchServices(search_payload(
                &self.query,
            )?)),
        })
    }
}

/// Federated search across cores; results name the originating core.
pub struct SearchServicesWide {
    pub msg_id: u32,
    pub query: Query,
}

impl SearchServicesWide {
    pub fn new(msg_id: u32, query: Query) -> Self {
        Self { msg_id, query }
    }

    pub fn to_envelope(&self) -> Result<agent::Envelope, OefError> {
        Ok(agent::Envelope {
            msg_id: self.msg_id,
            agent_uri: String::new(),
            payload: Some(agent::envelope::Payload::SearchServicesWide(
                search_payload(&self.query)?,
            )),
        })
    }
}

fn send_message_envelope(
    msg_id: u32,
    dialogue_id: u32,
    destination: &str,
    context: &Context,
    payload: agent::message::Payload,
) -> agent::Envelope {
    agent::Envelope {
        msg_id,
        agent_uri: String::new(),
        payload: Some(agent::envelope::Payload::SendMessage(agent::Message {
            dialogue_id,
            destination: destination.to_string(),
            source_uri: context.source_uri.to_string(),
            target_uri: context.target_uri.to_string(),
            payload: Some(payload),
        })),
    }
}

fn fipa_payload(target: u32, msg: fipa::message::Msg) -> agent::message::Payload {
    agent::message::Payload::Fipa(fipa::Message {
        target,
        msg: Some(msg),
    })
}

/// A raw peer-to-peer message within a dialogue.
pub struct AgentMessage {
    pub msg_id: u32,
    pub dialogue_id: u32,
    pub destination: String,
    pub content: Vec<u8>,
    pub context: Context,
}

impl AgentMessage {
    pub fn new(
        msg_id: u32,
        dialogue_id: u32,
        destination: impl Into<String>,
        content: Vec<u8>,
        context: Context,
    ) -> Self {
        Self {
            msg_id,
            dialogue_id,
            destination: destination.into(),
            content,
            context,
        }
    }

    pub fn to_envelope(&self) -> agent::Envelope {
        send_message_envelope(
            self.msg_id,
            self.dialogue_id,
            &self.destination,
            &self.context,
            agent::message::Payload::Content(self.content.clone()),
        )
    }
}

/// A call for proposals within a dialogue.
pub struct Cfp {
    pub msg_id: u32,
    pub dialogue_id: u32,
    pub destination: String,
    pub target: u32,
    pub payload: CfpPayload,
    pub context: Context,
}

impl Cfp {
    pub fn new(
        msg_id: u32,
        dialogue_id: u32,
        destination: impl Into<String>,
        target: u32,
        payload: CfpPayload,
        context: Context,
    ) -> Self {
        Self {
            msg_id,
            dialogue_id,
            destination: destination.into(),
            target,
            payload,
            context,
        }
    }

    pub fn to_envelope(&self) -> Result<agent::Envelope, OefError> {
        let payload = match &self.payload {
            CfpPayload::Nothing => fipa::cfp::Payload::Nothing(fipa::Nothing {}),
            CfpPayload::Raw(content) => fipa::cfp::Payload::Content(content.clone()),
            CfpPayload::Query(query) => fipa::cfp::Payload::Query(query.to_pb()?),
        };
        Ok(send_message_envelope(
            self.msg_id,
            self.dialogue_id,
            &self.destination,
            &self.context,
            fipa_payload(
                self.target,
                fipa::message::Msg::Cfp(fipa::Cfp {
                    payload: Some(payload),
                }),
            ),
        ))
    }
}

/// A proposal within a dialogue.
pub struct Propose {
    pub msg_id: u32,
    pub dialogue_id: u32,
    pub destination: String,
    pub target: u32,
    pub proposals: Proposals,
    pub context: Context,
}

impl Propose {
    pub fn new(
        msg_id: u32,
        dialogue_id: u32,
        destination: impl Into<String>,
        target: u32,
        proposals: Proposals,
        context: Context,
    ) -> Self {
        Self {
            msg_id,
            dialogue_id,
            destination: destination.into(),
            target,
            proposals,
            context,
        }
    }

    pub fn to_envelope(&self) -> agent::Envelope {
        let payload = match &self.proposals {
            Proposals::Raw(content) => fipa::propose::Payload::Content(content.clone()),
            Proposals::Descriptions(descriptions) => {
                fipa::propose::Payload::Proposals(fipa::propose::Proposals {
                    objects: descriptions.iter().map(Description::to_pb).collect(),
                })
            }
        };
        send_message_envelope(
            self.msg_id,
            self.dialogue_id,
            &self.destination,
            &self.context,
            fipa_payload(
                self.target,
                fipa::message::Msg::Propose(fipa::Propose {
                    payload: Some(payload),
                }),
            ),
        )
    }
}

/// Accept the proposal identified by `target`.
pub struct Accept {
    pub msg_id: u32,
    pub dialogue_id: u32,
    pub destination: String,
    pub target: u32,
    pub context: Context,
}

impl Accept {
    pub fn new(
        msg_id: u32,
        dialogue_id: u32,
        destination: impl Into<String>,
        target: u32,
        context: Context,
    ) -> Self {
        Self {
            msg_id,
            dialogue_id,
            destination: destination.into(),
            target,
            context,
        }
    }

    pub fn to_envelope(&self) -> agent::Envelope {
        send_message_envelope(
            self.msg_id,
            self.dialogue_id,
            &self.destination,
            &self.context,
            fipa_payload(self.target, fipa::message::Msg::Accept(fipa::Accept {})),
        )
    }
}

/// Decline the negotiation step identified by `target`.
pub struct Decline {
    pub msg_id: u32,
    pub dialogue_id: u32,
    pub destination: String,
    pub target: u32,
    pub context: Context,
}

impl Decline {
    pub fn new(
        msg_id: u32,
        dialogue_id: u32,
        destination: impl Into<String>,
        target: u32,
        context: Context,
    ) -> Self {
        Self {
            msg_id,
            dialogue_id,
            destination: destination.into(),
            target,
            context,
        }
    }

    pub fn to_envelope(&self) -> agent::Envelope {
        send_message_envelope(
            self.msg_id,
            self.dialogue_id,
            &self.destination,
            &self.context,
            fipa_payload(self.target, fipa::message::Msg::Decline(fipa::Decline {})),
        )
    }
}

// Node-side frames. The node emits these; the crate builds them when
// scripting a server in tests.

/// An error frame answering `answer_id`.
pub struct OefErrorMessage {
    pub answer_id: u32,
    pub operation: OefErrorOperation,
    pub cause: String,
    pub detail: String,
}

impl OefErrorMessage {
    pub fn new(answer_id: u32, operation: OefErrorOperation) -> Self {
        Self {
            answer_id,
            operation,
            cause: String::new(),
            detail: String::new(),
        }
    }

    pub fn to_agent_message(&self) -> server::AgentMessage {
        server::AgentMessage {
            answer_id: self.answer_id,
            source_uri: String::new(),
            target_uri: String::new(),
            payload: Some(server::agent_message::Payload::OefError(server::Error {
                operation: self.operation.code(),
                cause: self.cause.clone(),
                detail: self.detail.clone(),
            })),
        }
    }
}

/// A dialogue-level delivery failure.
pub struct DialogueErrorMessage {
    pub answer_id: u32,
    pub dialogue_id: u32,
    pub origin: String,
}

impl DialogueErrorMessage {
    pub fn new(answer_id: u32, dialogue_id: u32, origin: impl Into<String>) -> Self {
        Self {
            answer_id,
            dialogue_id,
            origin: origin.into(),
        }
    }

    pub fn to_agent_message(&self) -> server::AgentMessage {
        server::AgentMessage {
            answer_id: self.answer_id,
            source_uri: String::new(),
            target_uri: String::new(),
            payload: Some(server::agent_message::Payload::DialogueError(
                server::DialogueError {
                    dialogue_id: self.dialogue_id,
                    origin: self.origin.clone(),
                },
            )),
        }
    }
}

/// A search result answering `answer_id`.
pub struct SearchResultMessage {
    pub answer_id: u32,
    pub agents: Vec<String>,
}

impl SearchResultMessage {
    pub fn new(answer_id: u32, agents: Vec<String>) -> Self {
        Self { answer_id, agents }
    }

    pub fn to_agent_message(&self) -> server::AgentMessage {
        server::AgentMessage {
            answer_id: self.answer_id,
            source_uri: String::new(),
            target_uri: String::new(),
            payload: Some(server::agent_message::Payload::Agents(server::Agents {
                agents: self.agents.clone(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ConstraintExpr, ConstraintType};
    use crate::schema::AttributeValue;
    use prost::Message as _;
    use std::collections::BTreeMap;

    fn description() -> Description {
        let mut values = BTreeMap::new();
        values.insert("title".to_string(), AttributeValue::String("It".into()));
        Description::new(values).unwrap()
    }

    #[test]
    fn test_register_description_envelope() {
        let envelope = RegisterDescription::new(7, description()).to_envelope();
        assert_eq!(envelope.msg_id, 7);
        assert!(matches!(
            envelope.payload,
            Some(agent::envelope::Payload::RegisterDescription(_))
        ));
    }

    #[test]
    fn test_register_service_carries_agent_uri() {
        let uri = OefUri::builder().agent_key("2A7gH9p").agent_alias("books").build();
        let envelope = RegisterService::new(1, description(), uri).to_envelope();
        assert!(envelope.agent_uri.contains("2A7gH9p"));
        assert!(envelope.agent_uri.ends_with("/books"));
    }

    #[test]
    fn test_search_embeds_query_tree() {
        let query = Query::new(
            vec![ConstraintExpr::constraint("title", ConstraintType::Eq("It".into())).unwrap()],
            None,
        )
        .unwrap();
        let envelope = SearchServices::new(3, query).to_envelope().unwrap();
        match envelope.payload {
            Some(agent::envelope::Payload::SearchServices(search)) => {
                let tree = search.query_v2.expect("query tree");
                assert_eq!(tree.operator, "all");
                assert_eq!(tree.constraints.len(), 1);
            }
            other => panic!("unexpected payload: {:?}", other.is_some()),
        }
    }

    /// Envelopes survive an encode/decode cycle with the payload case
    /// intact.
    #[test]
    fn test_cfp_envelope_round_trip() {
        let cfp = Cfp::new(
            5,
            1,
            "destination-key",
            0,
            CfpPayload::Raw(b"terms".to_vec()),
            Context::default(),
        );
        let bytes = cfp.to_envelope().unwrap().encode_to_vec();
        let decoded = agent::Envelope::decode(bytes.as_slice()).unwrap();
        let Some(agent::envelope::Payload::SendMessage(message)) = decoded.payload else {
            panic!("expected a send_message envelope");
        };
        assert_eq!(message.destination, "destination-key");
        let Some(agent::message::Payload::Fipa(fipa_msg)) = message.payload else {
            panic!("expected a fipa payload");
        };
        assert!(matches!(
            fipa_msg.msg,
            Some(fipa::message::Msg::Cfp(fipa::Cfp {
                payload: Some(fipa::cfp::Payload::Content(_)),
            }))
        ));
    }

    /// Proposal descriptions are embedded directly as instances.
    #[test]
    fn test_propose_embeds_instances() {
        let propose = Propose::new(
            6,
            1,
            "destination-key",
            5,
            Proposals::Descriptions(vec![description()]),
            Context::default(),
        );
        let envelope = propose.to_envelope();
        let Some(agent::envelope::Payload::SendMessage(message)) = envelope.payload else {
            panic!("expected a send_message envelope");
        };
        let Some(agent::message::Payload::Fipa(fipa_msg)) = message.payload else {
            panic!("expected a fipa payload");
        };
        let Some(fipa::message::Msg::Propose(p)) = fipa_msg.msg else {
            panic!("expected a propose");
        };
        let Some(fipa::propose::Payload::Proposals(proposals)) = p.payload else {
            panic!("expected embedded proposals");
        };
        assert_eq!(proposals.objects.len(), 1);
        let decoded = Description::from_pb(&proposals.objects[0]).unwrap();
        assert_eq!(decoded, description());
    }

    #[test]
    fn test_error_operation_codes() {
        assert_eq!(OefErrorOperation::SendMessage.code(), 0x7);
        assert_eq!(
            OefErrorOperation::from_code(0x100),
            OefErrorOperation::BadMessage
        );
        assert_eq!(OefErrorOperation::from_code(0xdead), OefErrorOperation::Other);
    }
}

//! Client-to-server wire messages.

/// Handshake messages sent by the agent during login.
pub mod handshake {
    /// Login step 1: the agent announces its public key.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Id {
        #[prost(string, tag = "1")]
        pub public_key: String,
    }

    /// Login step 3: the agent answers the server's challenge phrase.
    ///
    /// The answer is the byte-wise reversal of the phrase; it proves
    /// liveness, not identity.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Answer {
        #[prost(bytes = "vec", tag = "1")]
        pub answer: Vec<u8>,
        #[prost(message, optional, tag = "2")]
        pub capability_bits: Option<CapabilityBits>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CapabilityBits {
        #[prost(bool, tag = "1")]
        pub will_heartbeat: bool,
    }
}

/// A peer-to-peer message relayed through the node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    #[prost(uint32, tag = "1")]
    pub dialogue_id: u32,
    /// Public key of the recipient agent.
    #[prost(string, tag = "2")]
    pub destination: String,
    #[prost(string, tag = "5")]
    pub source_uri: String,
    #[prost(string, tag = "6")]
    pub target_uri: String,
    #[prost(oneof = "message::Payload", tags = "3, 4")]
    pub payload: Option<message::Payload>,
}

pub mod message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        /// Raw application bytes.
        #[prost(bytes, tag = "3")]
        Content(Vec<u8>),
        /// A FIPA negotiation submessage.
        #[prost(message, tag = "4")]
        Fipa(super::super::fipa::Message),
    }
}

/// Placeholder body for envelope cases that carry no data.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Nothing {}

/// Heartbeat reply to a server ping.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Pong {
    #[prost(int32, tag = "1")]
    pub dummy: i32,
}

/// An agent or service description as registered in the directory.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentDescription {
    #[prost(message, optional, tag = "1")]
    pub description: Option<super::instance::Instance>,
}

/// A search request carrying the structured query tree.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentSearch {
    #[prost(message, optional, tag = "1")]
    pub query_v2: Option<super::dap::ConstructQueryObjectRequest>,
}

/// The steady-state client-to-server frame. Exactly one payload case
/// is set; `msg_id` is chosen by the sender and echoed back as the
/// `answer_id` of any response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    #[prost(uint32, tag = "1")]
    pub msg_id: u32,
    /// URI of the registering agent, set on service operations.
    #[prost(string, tag = "11")]
    pub agent_uri: String,
    #[prost(oneof = "envelope::Payload", tags = "2, 3, 4, 5, 6, 7, 8, 9, 10")]
    pub payload: Option<envelope::Payload>,
}

pub mod envelope {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "2")]
        RegisterService(super::AgentDescription),
        #[prost(message, tag = "3")]
        UnregisterService(super::AgentDescription),
        #[prost(message, tag = "4")]
        RegisterDescription(super::AgentDescription),
        #[prost(message, tag = "5")]
        UnregisterDescription(super::Nothing),
        #[prost(message, tag = "6")]
        SearchAgents(super::AgentSearch),
        #[prost(message, tag = "7")]
        SearchServices(super::AgentSearch),
        #[prost(message, tag = "8")]
        SearchServicesWide(super::AgentSearch),
        #[prost(message, tag = "9")]
        SendMessage(super::Message),
        #[prost(message, tag = "10")]
        Pong(super::Pong),
    }
}

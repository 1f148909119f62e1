//! Server-to-client wire messages.

/// Login step 2: the server's challenge, or an early rejection.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Phrase {
    #[prost(oneof = "phrase::Payload", tags = "1, 2")]
    pub payload: Option<phrase::Payload>,
}

pub mod phrase {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(bytes, tag = "1")]
        Phrase(Vec<u8>),
        #[prost(message, tag = "2")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Failure {
    #[prost(string, tag = "1")]
    pub cause: String,
}

/// Login step 4: whether the session was accepted.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Connected {
    #[prost(bool, tag = "1")]
    pub status: bool,
}

/// The steady-state server-to-client frame. `answer_id` echoes the
/// `msg_id` of the client message it answers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentMessage {
    #[prost(uint32, tag = "1")]
    pub answer_id: u32,
    #[prost(string, tag = "8")]
    pub source_uri: String,
    #[prost(string, tag = "9")]
    pub target_uri: String,
    #[prost(oneof = "agent_message::Payload", tags = "2, 3, 4, 5, 6, 7")]
    pub payload: Option<agent_message::Payload>,
}

pub mod agent_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        /// Search result: the matching agent identifiers.
        #[prost(message, tag = "2")]
        Agents(super::Agents),
        /// Wide (federated) search result, grouped by core.
        #[prost(message, tag = "3")]
        AgentsWide(super::AgentsWide),
        #[prost(message, tag = "4")]
        OefError(super::Error),
        #[prost(message, tag = "5")]
        DialogueError(super::DialogueError),
        /// A peer-to-peer delivery.
        #[prost(message, tag = "6")]
        Content(super::Content),
        #[prost(message, tag = "7")]
        Ping(super::Ping),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Agents {
    #[prost(string, repeated, tag = "1")]
    pub agents: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentsWide {
    #[prost(message, repeated, tag = "1")]
    pub result: Vec<agents_wide::Item>,
}

pub mod agents_wide {
    /// One originating core and the agents found there.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Item {
        #[prost(bytes = "vec", tag = "1")]
        pub key: Vec<u8>,
        #[prost(string, tag = "2")]
        pub ip: String,
        #[prost(uint32, tag = "3")]
        pub port: u32,
        #[prost(uint32, tag = "4")]
        pub distance: u32,
        #[prost(message, repeated, tag = "5")]
        pub agents: Vec<AgentInfo>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AgentInfo {
        #[prost(bytes = "vec", tag = "1")]
        pub key: Vec<u8>,
    }
}

/// A node-side failure while handling a client operation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(uint32, tag = "1")]
    pub operation: u32,
    #[prost(string, tag = "2")]
    pub cause: String,
    #[prost(string, tag = "3")]
    pub detail: String,
}

/// A failure in relaying a message within a dialogue.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DialogueError {
    #[prost(uint32, tag = "1")]
    pub dialogue_id: u32,
    #[prost(string, tag = "2")]
    pub origin: String,
}

/// A peer-to-peer delivery from another agent.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Content {
    #[prost(uint32, tag = "1")]
    pub dialogue_id: u32,
    /// Public key of the sending agent.
    #[prost(string, tag = "2")]
    pub origin: String,
    #[prost(oneof = "content::Payload", tags = "3, 4")]
    pub payload: Option<content::Payload>,
}

pub mod content {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(bytes, tag = "3")]
        Content(Vec<u8>),
        #[prost(message, tag = "4")]
        Fipa(super::super::fipa::Message),
    }
}

/// Heartbeat probe; answered with `Envelope{pong}`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ping {
    #[prost(int32, tag = "1")]
    pub dummy: i32,
}

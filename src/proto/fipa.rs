//! FIPA negotiation submessages, carried inside agent messages.

/// One FIPA message within a dialogue. `target` is the id of the
/// message this one answers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    #[prost(uint32, tag = "1")]
    pub target: u32,
    #[prost(oneof = "message::Msg", tags = "2, 3, 4, 5")]
    pub msg: Option<message::Msg>,
}

pub mod message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Msg {
        #[prost(message, tag = "2")]
        Cfp(super::Cfp),
        #[prost(message, tag = "3")]
        Propose(super::Propose),
        #[prost(message, tag = "4")]
        Accept(super::Accept),
        #[prost(message, tag = "5")]
        Decline(super::Decline),
    }
}

/// Call for proposals. The payload is a structured query, raw bytes,
/// or nothing at all.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Cfp {
    #[prost(oneof = "cfp::Payload", tags = "1, 2, 3")]
    pub payload: Option<cfp::Payload>,
}

pub mod cfp {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        Nothing(super::Nothing),
        #[prost(message, tag = "2")]
        Query(super::super::dap::ConstructQueryObjectRequest),
        #[prost(bytes, tag = "3")]
        Content(Vec<u8>),
    }
}

/// A proposal: raw bytes or a list of described instances.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Propose {
    #[prost(oneof = "propose::Payload", tags = "1, 2")]
    pub payload: Option<propose::Payload>,
}

pub mod propose {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        Proposals(Proposals),
        #[prost(bytes, tag = "2")]
        Content(Vec<u8>),
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Proposals {
        #[prost(message, repeated, tag = "1")]
        pub objects: Vec<super::super::instance::Instance>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Accept {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Decline {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Nothing {}

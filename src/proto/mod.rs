//! Wire messages exchanged with an OEF node.
//!
//! Every frame on the socket is one protobuf-encoded message from the
//! namespaces below. The structs are maintained by hand with fixed
//! field tags rather than generated at build time, so the crate has no
//! protoc dependency; the tags are part of the wire contract and must
//! not be renumbered.
//!
//! - [`agent`]: client-to-server messages (handshake identity and
//!   answer, the steady-state `Envelope`).
//! - [`server`]: server-to-client messages (challenge phrase,
//!   connection status, `AgentMessage` frames).
//! - [`fipa`]: the negotiation submessages carried inside agent
//!   messages (CFP, Propose, Accept, Decline).
//! - [`dap`]: typed constraint values and the structured query tree
//!   consumed by directory back-ends.
//! - [`instance`]: data-model instances (descriptions) as key/value
//!   records with their schema.

pub mod agent;
pub mod dap;
pub mod fipa;
pub mod instance;
pub mod server;

//! # OEF Agent SDK
//!
//! An agent-side client for the Open Economic Framework network. The
//! crate provides the framed TCP transport and login handshake, the
//! connection engine with its handler chain, typed wire messages, the
//! constraint-query model over data models, and the callback-driven
//! agent event loop.

pub mod agent;
pub mod connection;
pub mod core;
pub mod error;
pub mod logging;
pub mod messages;
pub mod proto;
pub mod proxy;
pub mod query;
pub mod schema;
pub mod transport;
pub mod uri;
pub mod utils;

pub use agent::{AgentHandler, OefAgent, SearchResultItem, StopHandle};
pub use connection::{ConnectOptions, Connection, ConnectionState};
pub use self::core::Core;
pub use error::OefError;
pub use messages::{CfpPayload, OefErrorOperation, Proposals};
pub use proxy::{OefErrorDetail, OefNetworkProxy};
pub use query::{Constraint, ConstraintExpr, ConstraintType, Query};
pub use schema::{
    AttributeSchema, AttributeType, AttributeValue, DataModel, Description, Location,
};
pub use uri::{Context, OefUri, UriBuilder};

/// The current version of the SDK.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default protocol and runtime parameters.
pub mod defaults {
    use std::time::Duration;

    /// Default port of an OEF node.
    pub const OEF_PORT: u16 = 3333;

    /// Largest frame the transport will accept.
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

    /// Fixed filler value carried by heartbeat pong replies.
    pub const PONG_DUMMY: i32 = 77;

    /// How often `Core::stop` polls for outstanding tasks to drain.
    pub const SHUTDOWN_DRAIN_POLLS: usize = 10;

    /// Interval between shutdown drain polls.
    pub const SHUTDOWN_DRAIN_INTERVAL: Duration = Duration::from_millis(300);
}

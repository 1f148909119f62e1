//! The user-facing agent API.
//!
//! Implement [`AgentHandler`] for the callbacks you care about; every
//! method has a default that logs a warning, so a minimal agent only
//! overrides what it uses. [`OefAgent`] ties a handler to a node
//! session: connect, issue directory and search operations, run the
//! event loop, exchange dialogue messages.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::warn;

use crate::core::Core;
use crate::error::OefError;
use crate::messages::{CfpPayload, OefErrorOperation, Proposals};
use crate::proxy::{ContextLookup, ErrorDetailLookup, OefErrorDetail, OefNetworkProxy};
use crate::query::Query;
use crate::schema::Description;
use crate::uri::Context;

/// One agent found by a wide search, with the core it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultItem {
    pub agent_key: String,
    pub core_key: String,
    pub core_addr: String,
    pub core_port: u32,
    pub distance: u32,
}

fn warn_not_implemented(method: &str) {
    warn!("you should implement {} in your agent handler", method);
}

/// Callbacks delivered by the agent event loop.
///
/// Dialogue callbacks identify their conversation by
/// `(msg_id, dialogue_id, origin)`; the matching routing context is
/// available through [`OefAgent::get_context`] for the duration of
/// the callback.
#[async_trait]
pub trait AgentHandler: Send {
    /// A raw message from another agent.
    async fn on_message(&mut self, msg_id: u32, dialogue_id: u32, origin: &str, content: Vec<u8>) {
        let _ = (msg_id, dialogue_id, origin, content);
        warn_not_implemented("on_message");
    }

    /// A call for proposals from another agent.
    async fn on_cfp(
        &mut self,
        msg_id: u32,
        dialogue_id: u32,
        origin: &str,
        target: u32,
        payload: CfpPayload,
    ) {
        let _ = (msg_id, dialogue_id, origin, target, payload);
        warn_not_implemented("on_cfp");
    }

    /// A proposal from another agent.
    async fn on_propose(
        &mut self,
        msg_id: u32,
        dialogue_id: u32,
        origin: &str,
        target: u32,
        proposals: Proposals,
    ) {
        let _ = (msg_id, dialogue_id, origin, target, proposals);
        warn_not_implemented("on_propose");
    }

    async fn on_accept(&mut self, msg_id: u32, dialogue_id: u32, origin: &str, target: u32) {
        let _ = (msg_id, dialogue_id, origin, target);
        warn_not_implemented("on_accept");
    }

    async fn on_decline(&mut self, msg_id: u32, dialogue_id: u32, origin: &str, target: u32) {
        let _ = (msg_id, dialogue_id, origin, target);
        warn_not_implemented("on_decline");
    }

    /// The node failed to handle the operation sent as `answer_id`.
    async fn on_oef_error(&mut self, answer_id: u32, operation: OefErrorOperation) {
        let _ = (answer_id, operation);
        warn_not_implemented("on_oef_error");
    }

    /// The node could not relay a message within a dialogue.
    async fn on_dialogue_error(&mut self, answer_id: u32, dialogue_id: u32, origin: &str) {
        let _ = (answer_id, dialogue_id, origin);
        warn_not_implemented("on_dialogue_error");
    }

    async fn on_search_result(&mut self, search_id: u32, agents: Vec<String>) {
        let _ = (search_id, agents);
        warn_not_implemented("on_search_result");
    }

    async fn on_search_result_wide(&mut self, search_id: u32, items: Vec<SearchResultItem>) {
        let _ = (search_id, items);
        warn_not_implemented("on_search_result_wide");
    }
}

/// Whether a string is a plausible agent identity: non-empty, over
/// the Base58 alphabet (alphanumerics minus `0`, `O`, `I` and `l`).
pub fn validate_public_key(public_key: &str) -> bool {
    !public_key.is_empty()
        && public_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() && !"0OIl".contains(c))
}

/// Lets a running event loop be stopped from a callback or another
/// task.
#[derive(Clone)]
pub struct StopHandle {
    signal: Arc<Notify>,
}

impl StopHandle {
    /// Ask the event loop to exit at its next iteration. A no-op when
    /// the loop is idle.
    pub fn stop(&self) {
        self.signal.notify_one();
    }
}

/// An agent connected to an OEF node over the network.
pub struct OefAgent {
    proxy: OefNetworkProxy,
}

impl OefAgent {
    /// Create an agent. The public key is validated here; the core
    /// must be started (or be started before `connect`).
    pub fn new(
        public_key: &str,
        oef_addr: &str,
        oef_port: u16,
        core: &Core,
    ) -> Result<Self, OefError> {
        if !validate_public_key(public_key) {
            return Err(OefError::InvalidIdentity(public_key.to_string()));
        }
        Ok(Self {
            proxy: OefNetworkProxy::new(public_key, oef_addr, oef_port, core),
        })
    }

    pub fn public_key(&self) -> &str {
        self.proxy.public_key()
    }

    pub fn is_connected(&self) -> bool {
        self.proxy.is_connected()
    }

    /// A handle that can stop [`OefAgent::run`] from elsewhere.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            signal: self.proxy.stop_signal(),
        }
    }

    /// Connect and log in to the node.
    pub async fn connect(&mut self) -> Result<(), OefError> {
        self.proxy.connect().await
    }

    /// Disconnect from the node, stopping the event loop if running.
    pub async fn disconnect(&mut self) {
        self.proxy.stop().await;
    }

    /// Run the event loop, dispatching server frames to `handler`
    /// until stopped.
    pub async fn run(&mut self, handler: &mut dyn AgentHandler) -> Result<(), OefError> {
        self.proxy.run_loop(handler).await
    }

    /// Blocking [`OefAgent::connect`], for synchronous callers. Must
    /// not be invoked from async context.
    pub fn connect_blocking(&mut self) -> Result<(), OefError> {
        let core = self.proxy.core().clone();
        core.block_on(self.connect())?
    }

    /// Blocking [`OefAgent::run`].
    pub fn run_blocking(&mut self, handler: &mut dyn AgentHandler) -> Result<(), OefError> {
        let core = self.proxy.core().clone();
        core.block_on(self.run(handler))?
    }

    /// Blocking [`OefAgent::disconnect`].
    pub fn disconnect_blocking(&mut self) -> Result<(), OefError> {
        let core = self.proxy.core().clone();
        core.block_on(self.disconnect())
    }

    pub fn register_agent(&self, msg_id: u32, description: &Description) -> Result<(), OefError> {
        self.proxy.register_agent(msg_id, description)
    }

    pub fn unregister_agent(&self, msg_id: u32) -> Result<(), OefError> {
        self.proxy.unregister_agent(msg_id)
    }

    pub fn register_service(
        &self,
        msg_id: u32,
        description: &Description,
        service_id: &str,
    ) -> Result<(), OefError> {
        self.proxy.register_service(msg_id, description, service_id)
    }

    pub fn unregister_service(
        &self,
        msg_id: u32,
        description: &Description,
        service_id: &str,
    ) -> Result<(), OefError> {
        self.proxy.unregister_service(msg_id, description, service_id)
    }

    pub fn search_agents(&self, search_id: u32, query: &Query) -> Result<(), OefError> {
        self.proxy.search_agents(search_id, query)
    }

    pub fn search_services(&self, search_id: u32, query: &Query) -> Result<(), OefError> {
        self.proxy.search_services(search_id, query)
    }

    pub fn search_services_wide(&self, search_id: u32, query: &Query) -> Result<(), OefError> {
        self.proxy.search_services_wide(search_id, query)
    }

    pub fn send_message(
        &self,
        msg_id: u32,
        dialogue_id: u32,
        destination: &str,
        content: Vec<u8>,
        context: Context,
    ) -> Result<(), OefError> {
        self.proxy
            .send_message(msg_id, dialogue_id, destination, content, context)
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
        self.proxy
            .send_cfp(msg_id, dialogue_id, destination, target, payload, context)
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
        self.proxy
            .send_propose(msg_id, dialogue_id, destination, target, proposals, context)
    }

    pub fn send_accept(
        &self,
        msg_id: u32,
        dialogue_id: u32,
        destination: &str,
        target: u32,
        context: Context,
    ) -> Result<(), OefError> {
        self.proxy
            .send_accept(msg_id, dialogue_id, destination, target, context)
    }

    pub fn send_decline(
        &self,
        msg_id: u32,
        dialogue_id: u32,
        destination: &str,
        target: u32,
        context: Context,
    ) -> Result<(), OefError> {
        self.proxy
            .send_decline(msg_id, dialogue_id, destination, target, context)
    }

    /// Routing context of the frame currently being dispatched.
    pub fn get_context(&self, message_id: u32, dialogue_id: u32, origin: &str) -> Context {
        self.proxy.get_context(message_id, dialogue_id, origin)
    }

    /// A cloneable context accessor for handler implementations.
    pub fn context_lookup(&self) -> ContextLookup {
        self.proxy.context_lookup()
    }

    /// A cloneable error-detail accessor for handler implementations.
    pub fn error_detail_lookup(&self) -> ErrorDetailLookup {
        self.proxy.error_detail_lookup()
    }

    /// Cause and detail of the OEF error currently being dispatched.
    pub fn error_detail(&self, answer_id: u32) -> OefErrorDetail {
        self.proxy.error_detail(answer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_alphabet() {
        assert!(validate_public_key("2A7gH9p"));
        assert!(validate_public_key("abcXYZ123"));
        assert!(!validate_public_key(""));
        // The four characters Base58 leaves out.
        assert!(!validate_public_key("agent0"));
        assert!(!validate_public_key("agentO"));
        assert!(!validate_public_key("agentI"));
        assert!(!validate_public_key("agentl"));
        assert!(!validate_public_key("agent-key"));
    }

    #[test]
    fn test_new_rejects_invalid_identity() {
        let core = Core::new();
        assert!(matches!(
            OefAgent::new("bad key!", "127.0.0.1", 3333, &core),
            Err(OefError::InvalidIdentity(_))
        ));
        assert!(OefAgent::new("2A7gH9p", "127.0.0.1", 3333, &core).is_ok());
    }
}

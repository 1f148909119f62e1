//! Agent URIs and per-message context.
//!
//! An OEF URI names an agent through the core it is registered at:
//! `protocol://coreURI/coreKey/<namespaces...>/agentKey/agentAlias`.
//! Anything with fewer than seven slash-separated tokens is
//! unparseable and yields the empty URI, a valid sentinel that
//! renders as `""`.

use std::fmt;

/// A parsed agent URI. The default value is the empty sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OefUri {
    pub protocol: String,
    pub core_uri: String,
    pub core_key: String,
    pub namespaces: Vec<String>,
    pub agent_key: String,
    pub agent_alias: String,
    pub empty: bool,
}

impl Default for OefUri {
    fn default() -> Self {
        Self {
            protocol: "tcp".to_string(),
            core_uri: String::new(),
            core_key: String::new(),
            namespaces: Vec::new(),
            agent_key: String::new(),
            agent_alias: String::new(),
            empty: true,
        }
    }
}

impl OefUri {
    /// Parse a full URI. Anything with fewer than seven tokens leaves
    /// the empty sentinel untouched.
    pub fn parse(text: &str) -> Self {
        let mut uri = Self::default();
        let parts: Vec<&str> = text.split('/').collect();
        if parts.len() < 7 {
            return uri;
        }
        uri.empty = false;
        uri.protocol = parts[0].replace(':', "");
        uri.core_uri = parts[2].to_string();
        uri.core_key = parts[3].to_string();
        uri.agent_alias = parts[parts.len() - 1].to_string();
        uri.agent_key = parts[parts.len() - 2].to_string();
        for part in &parts[4..parts.len() - 2] {
            uri.namespaces.push(part.to_string());
        }
        uri
    }

    /// Parse an agent fragment: `"<key>"` or `"<key>/<alias>"`.
    /// Anything else yields the empty sentinel.
    pub fn parse_agent(fragment: &str) -> Self {
        let mut uri = Self::default();
        uri.empty = false;
        match fragment.split('/').collect::<Vec<_>>().as_slice() {
            [key] => uri.agent_key = key.to_string(),
            [key, alias] => {
                uri.agent_key = key.to_string();
                uri.agent_alias = alias.to_string();
            }
            _ => uri.empty = true,
        }
        uri
    }

    pub fn builder() -> UriBuilder {
        UriBuilder::new()
    }
}

impl fmt::Display for OefUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.empty {
            return Ok(());
        }
        write!(
            f,
            "{}://{}/{}/{}/{}/{}",
            self.protocol,
            self.core_uri,
            self.core_key,
            self.namespaces.join("/"),
            self.agent_key,
            self.agent_alias
        )
    }
}

/// Field-by-field construction of a (non-empty) URI.
#[derive(Debug)]
pub struct UriBuilder {
    uri: OefUri,
}

impl Default for UriBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UriBuilder {
    pub fn new() -> Self {
        Self {
            uri: OefUri {
                empty: false,
                ..OefUri::default()
            },
        }
    }

    pub fn protocol(mut self, protocol: &str) -> Self {
        self.uri.protocol = protocol.to_string();
        self
    }

    pub fn core_address(mut self, address: &str, port: u16) -> Self {
        self.uri.core_uri = format!("{}:{}", address, port);
        self
    }

    pub fn core_key(mut self, key: &str) -> Self {
        self.uri.core_key = key.to_string();
        self
    }

    pub fn agent_key(mut self, key: &str) -> Self {
        self.uri.agent_key = key.to_string();
        self
    }

    pub fn agent_alias(mut self, alias: &str) -> Self {
        self.uri.agent_alias = alias.to_string();
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.uri.namespaces.push(namespace.to_string());
        self
    }

    pub fn build(self) -> OefUri {
        self.uri
    }
}

/// Per-message routing context: where a frame came from and where a
/// reply should go.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Context {
    pub target_uri: OefUri,
    pub source_uri: OefUri,
    /// Alias of the addressed service (the target's agent alias).
    pub service_id: String,
    pub agent_alias: String,
}

impl Context {
    /// Populate from the URI strings carried by an inbound frame.
    pub fn update(&mut self, target: &str, source: &str) {
        self.target_uri = OefUri::parse(target);
        self.source_uri = OefUri::parse(source);
        self.service_id = self.target_uri.agent_alias.clone();
        self.agent_alias = self.target_uri.agent_alias.clone();
    }

    /// Populate from bare agent fragments (`key` or `key/alias`).
    /// With `same_alias`, the source inherits the target's alias.
    pub fn for_agent(&mut self, target: &str, source: &str, same_alias: bool) {
        self.target_uri = OefUri::parse_agent(target);
        self.source_uri = OefUri::parse_agent(source);
        if same_alias {
            self.source_uri.agent_alias = self.target_uri.agent_alias.clone();
        }
        self.service_id = self.target_uri.agent_alias.clone();
    }

    /// Exchange source and target, e.g. to address a reply.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.target_uri, &mut self.source_uri);
    }
}

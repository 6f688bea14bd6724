use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use url::Url;

/// Errors that can occur during node registration
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Invalid node address: {0}")]
    InvalidAddress(String),
}

/// Known peers, keyed by authority (`host` or `host:port`), with the
/// instant each was last registered or successfully fetched from
///
/// Fork resolution only iterates this; it never mutates it.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: DashMap<String, DateTime<Utc>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer from a full URL or a bare `host:port`
    ///
    /// Unparseable input fails fast; it is never coerced into a guess.
    pub fn register(&self, node_url: &str) -> Result<String, NodeError> {
        let authority = Self::parse_authority(node_url)?;
        self.nodes.insert(authority.clone(), Utc::now());
        Ok(authority)
    }

    /// Refreshes the last-seen instant after a successful peer exchange
    pub fn mark_seen(&self, authority: &str) {
        if let Some(mut entry) = self.nodes.get_mut(authority) {
            *entry.value_mut() = Utc::now();
        }
    }

    /// Peer authorities, in no particular order
    pub fn peers(&self) -> Vec<String> {
        self.nodes.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Peers paired with their last-seen instants
    pub fn entries(&self) -> Vec<(String, DateTime<Utc>)> {
        self.nodes
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn parse_authority(node_url: &str) -> Result<String, NodeError> {
        // A bare "localhost:5001" parses as a URL with scheme "localhost"
        // and no host, so scheme-less input gets an http prefix first
        let parsed = if node_url.contains("://") {
            Url::parse(node_url)
        } else {
            Url::parse(&format!("http://{}", node_url))
        }
        .map_err(|_| NodeError::InvalidAddress(node_url.to_string()))?;

        let host = parsed
            .host_str()
            .ok_or_else(|| NodeError::InvalidAddress(node_url.to_string()))?;

        Ok(match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }
}

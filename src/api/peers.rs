use std::time::Duration;

use awc::Client;
use futures::stream::{self, StreamExt};
use log::warn;

use super::handlers::ChainResponse;
use crate::blockchain::{Block, NodeRegistry};

/// Per-peer budget for one chain fetch
const FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Concurrent fetch bound; a slow peer holds one slot, not the pass
const MAX_CONCURRENT_FETCHES: usize = 8;

/// Fetches the chain of every registered peer
///
/// This is the I/O half of fork resolution; the comparison itself is
/// `Blockchain::resolve_conflicts`, which never touches the network. Any
/// non-success here (unreachable peer, non-2xx status, malformed body,
/// timeout) means that peer contributes nothing to the pass.
pub async fn fetch_chains(registry: &NodeRegistry) -> Vec<(usize, Vec<Block>)> {
    let client = Client::default();

    stream::iter(registry.peers())
        .map(|peer| fetch_one(&client, registry, peer))
        .buffer_unordered(MAX_CONCURRENT_FETCHES)
        .filter_map(|result| async move { result })
        .collect()
        .await
}

async fn fetch_one(
    client: &Client,
    registry: &NodeRegistry,
    peer: String,
) -> Option<(usize, Vec<Block>)> {
    let url = format!("http://{}/api/v1/chain", peer);

    let mut response = match client.get(&url).timeout(FETCH_TIMEOUT).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!("Peer {} unreachable: {}", peer, err);
            return None;
        }
    };

    if !response.status().is_success() {
        warn!("Peer {} answered with status {}", peer, response.status());
        return None;
    }

    match response.json::<ChainResponse>().await {
        Ok(body) => {
            registry.mark_seen(&peer);
            Some((body.length, body.chain))
        }
        Err(err) => {
            warn!("Peer {} returned a malformed chain: {}", peer, err);
            None
        }
    }
}

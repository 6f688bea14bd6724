use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Previous-hash sentinel carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "00";

/// A sealed block in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// 1-based position in the chain
    pub block_number: u64,

    /// Timestamp when the block was sealed
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Transactions in insertion order; the final one is the miner's
    /// reward, appended after the nonce search
    pub transactions: Vec<Transaction>,

    /// Nonce satisfying the proof-of-work predicate
    pub nonce: u64,

    /// Hash of the previous block, or [`GENESIS_PREVIOUS_HASH`]
    pub previous_hash: String,
}

impl Block {
    pub fn new(
        block_number: u64,
        transactions: Vec<Transaction>,
        nonce: u64,
        previous_hash: String,
    ) -> Self {
        Block {
            block_number,
            timestamp: Utc::now(),
            transactions,
            nonce,
            previous_hash,
        }
    }

    /// The fixed first block of every chain: no transactions, nonce 0,
    /// sentinel previous hash. Not itself proof-of-work-validated.
    pub fn genesis() -> Self {
        Block::new(1, Vec::new(), 0, GENESIS_PREVIOUS_HASH.to_string())
    }

    /// SHA-256 of the block's canonical encoding as lowercase hex
    ///
    /// The encoding is a `serde_json::Value`, whose map sorts keys, so the
    /// emitted bytes do not depend on field declaration order. Transactions
    /// contribute their canonical records only.
    pub fn hash(&self) -> String {
        let transactions: Vec<serde_json::Value> = self
            .transactions
            .iter()
            .map(Transaction::canonical_record)
            .collect();

        let block_data = serde_json::json!({
            "block_number": self.block_number,
            "timestamp": self.timestamp,
            "transactions": transactions,
            "nonce": self.nonce,
            "previous_hash": self.previous_hash,
        });

        let mut hasher = Sha256::new();
        hasher.update(block_data.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

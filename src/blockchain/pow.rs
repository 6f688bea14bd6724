use sha2::{Digest, Sha256};

use super::transaction::Transaction;

/// Encodes a transaction set for the proof-of-work guess
///
/// Search and validation both go through here; the two sides must hash
/// byte-identical input or revalidation will disagree with sealing.
fn encode_transactions(transactions: &[Transaction]) -> String {
    let records: Vec<serde_json::Value> = transactions
        .iter()
        .map(Transaction::canonical_record)
        .collect();

    serde_json::Value::Array(records).to_string()
}

/// Checks whether a nonce satisfies the difficulty predicate
///
/// The guess is SHA-256 over `encode(transactions) || previous_hash ||
/// nonce`; it qualifies when its first `difficulty` hex characters are
/// all `'0'`.
pub fn is_valid_proof(
    transactions: &[Transaction],
    previous_hash: &str,
    nonce: u64,
    difficulty: usize,
) -> bool {
    let guess = format!(
        "{}{}{}",
        encode_transactions(transactions),
        previous_hash,
        nonce
    );

    let mut hasher = Sha256::new();
    hasher.update(guess.as_bytes());
    let guess_hash = format!("{:x}", hasher.finalize());

    guess_hash.chars().take(difficulty).all(|c| c == '0')
}

/// Searches for the first qualifying nonce, trying 0, 1, 2, ...
///
/// Unbounded by design: the expected cost (~16^difficulty attempts) is
/// the admission-control mechanism. Run this outside any lock on the
/// pending buffer; it only reads the snapshot it was handed.
pub fn find_nonce(transactions: &[Transaction], previous_hash: &str, difficulty: usize) -> u64 {
    let mut nonce = 0u64;
    while !is_valid_proof(transactions, previous_hash, nonce, difficulty) {
        nonce += 1;
    }
    nonce
}

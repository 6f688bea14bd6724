use super::block::Block;
use super::pow;

/// Validates a candidate chain received from a peer
///
/// Pure: walks the chain from index 1 (genesis is trusted structurally)
/// and checks, for every block, that `previous_hash` matches the hash of
/// the block before it and that the nonce satisfies the proof-of-work
/// predicate. The block's final transaction is the reward payout appended
/// after the nonce search, so it is excluded from the proof recomputation.
/// Returns false on the first failing block.
pub fn is_valid_chain(chain: &[Block], difficulty: usize) -> bool {
    for index in 1..chain.len() {
        let block = &chain[index];

        if block.previous_hash != chain[index - 1].hash() {
            return false;
        }

        let searched = &block.transactions[..block.transactions.len().saturating_sub(1)];
        if !pow::is_valid_proof(searched, &block.previous_hash, block.nonce, difficulty) {
            return false;
        }
    }

    true
}

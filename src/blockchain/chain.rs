use std::sync::{Arc, Mutex};

use log::{info, warn};
use thiserror::Error;
use uuid::Uuid;

use super::block::{Block, GENESIS_PREVIOUS_HASH};
use super::crypto::{Address, DigitalSignature};
use super::pow;
use super::transaction::{Transaction, TransactionError};
use super::validator;

/// Leading zero hex characters required of a qualifying block hash
pub const MINING_DIFFICULTY: usize = 2;

/// Amount minted to the miner per sealed block
pub const MINING_REWARD: f64 = 0.25;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Stale proof: the pending buffer or chain tip changed since the nonce search")]
    StaleProof,

    #[error("Corrupt chain: {0}")]
    CorruptChain(String),
}

/// The chain and the pending-transaction buffer, guarded together
///
/// Submission, sealing and fork adoption are all critical sections over
/// this struct; one mutex gives them the single-writer discipline the
/// buffer needs.
#[derive(Debug, Default)]
struct LedgerState {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
}

/// The ledger: an append-only chain of blocks plus the buffer of
/// transactions waiting to be sealed into the next one
#[derive(Debug, Clone)]
pub struct Blockchain {
    state: Arc<Mutex<LedgerState>>,

    /// Random identity of this node, used as the default reward recipient
    node_id: String,

    /// Difficulty is fixed at construction, not dynamically adjusted
    difficulty: usize,

    mining_reward: f64,
}

impl Blockchain {
    /// Creates a ledger holding only the genesis block
    pub fn new() -> Self {
        Self::with_difficulty(MINING_DIFFICULTY)
    }

    /// Creates a ledger with a non-default difficulty (tests mostly)
    pub fn with_difficulty(difficulty: usize) -> Self {
        Blockchain {
            state: Arc::new(Mutex::new(LedgerState {
                chain: vec![Block::genesis()],
                pending: Vec::new(),
            })),
            node_id: Uuid::new_v4().simple().to_string(),
            difficulty,
            mining_reward: MINING_REWARD,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// The tail of the chain; genesis guarantees the chain is never empty
    pub fn last_block(&self) -> Block {
        let state = self.state.lock().unwrap();
        state.chain.last().unwrap().clone()
    }

    pub fn chain(&self) -> Vec<Block> {
        self.state.lock().unwrap().chain.clone()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().pending.clone()
    }

    /// Admits a transaction into the pending buffer
    ///
    /// A transaction from the mint identity is trusted by construction and
    /// admitted unconditionally. Anything else is verified over a
    /// transaction built from exactly the three submitted fields; a bad
    /// signature is an `InvalidSignature` rejection that leaves the buffer
    /// untouched. On success returns the number of the block that will
    /// include the transaction.
    pub fn submit_transaction(
        &self,
        sender: Address,
        recipient: Address,
        amount: f64,
        signature: Option<DigitalSignature>,
    ) -> Result<u64, BlockchainError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(TransactionError::InvalidAmount(amount).into());
        }

        let mut transaction = Transaction::new(sender, recipient, amount);

        if !transaction.is_reward() {
            transaction.signature = signature;

            if transaction.signature.is_none() {
                return Err(TransactionError::NotSigned.into());
            }

            if !transaction.verify()? {
                return Err(TransactionError::InvalidSignature.into());
            }
        }

        let mut state = self.state.lock().unwrap();
        state.pending.push(transaction);

        Ok(state.chain.len() as u64 + 1)
    }

    /// Seals the pending buffer into a new block
    ///
    /// Only meaningful after a nonce search over the buffer's non-reward
    /// prefix; the proof is re-validated against the live buffer and the
    /// live tip, so a search that raced with new submissions or a fork
    /// adoption comes back as `StaleProof` and its result is discarded
    /// instead of appended. On success the buffer is cleared atomically
    /// with the append.
    pub fn seal_block(&self, nonce: u64, previous_hash: String) -> Result<Block, BlockchainError> {
        let mut state = self.state.lock().unwrap();

        if state.chain.last().unwrap().hash() != previous_hash {
            warn!("Discarding proof computed against a replaced chain tip");
            return Err(BlockchainError::StaleProof);
        }

        let searched = &state.pending[..state.pending.len().saturating_sub(1)];
        if !pow::is_valid_proof(searched, &previous_hash, nonce, self.difficulty) {
            warn!("Discarding proof computed over an already-changed buffer");
            return Err(BlockchainError::StaleProof);
        }

        let block_number = state.chain.len() as u64 + 1;
        let transactions = std::mem::take(&mut state.pending);
        let block = Block::new(block_number, transactions, nonce, previous_hash);

        state.chain.push(block.clone());
        info!(
            "Sealed block {} with {} transactions",
            block.block_number,
            block.transactions.len()
        );

        Ok(block)
    }

    /// Mines and seals one block, paying the reward to `miner`
    ///
    /// Snapshots the buffer and tip hash, runs the nonce search outside
    /// the lock, then re-takes the lock and restarts the search if either
    /// changed mid-search. The reward transaction is appended after the
    /// search, so it lands as the block's final transaction and is
    /// excluded when the proof is later re-checked.
    pub fn mine_block(&self, miner: &Address) -> Result<Block, BlockchainError> {
        loop {
            let (snapshot, previous_hash, block_number) = {
                let state = self.state.lock().unwrap();
                (
                    state.pending.clone(),
                    state.chain.last().unwrap().hash(),
                    state.chain.len() as u64 + 1,
                )
            };

            let nonce = pow::find_nonce(&snapshot, &previous_hash, self.difficulty);

            let mut state = self.state.lock().unwrap();
            if state.pending != snapshot || state.chain.last().unwrap().hash() != previous_hash {
                info!("Buffer or tip changed during nonce search, restarting");
                continue;
            }

            let mut transactions = std::mem::take(&mut state.pending);
            transactions.push(Transaction::new_reward(miner.clone(), self.mining_reward));

            let block = Block::new(block_number, transactions, nonce, previous_hash);
            state.chain.push(block.clone());

            info!(
                "Mined block {} (nonce {}) with {} transactions",
                block.block_number,
                block.nonce,
                block.transactions.len()
            );

            return Ok(block);
        }
    }

    /// Longest-valid-chain fork resolution over peer-supplied candidates
    ///
    /// Adopts the longest valid candidate strictly longer than the local
    /// chain; equal length never displaces the local chain. A pair whose
    /// advertised length disagrees with the chain it carries is malformed
    /// and skipped. Returns whether the local chain was replaced.
    pub fn resolve_conflicts<I>(&self, peer_chains: I) -> bool
    where
        I: IntoIterator<Item = (usize, Vec<Block>)>,
    {
        let mut max_length = self.state.lock().unwrap().chain.len();
        let mut best: Option<Vec<Block>> = None;

        for (length, chain) in peer_chains {
            if length != chain.len() {
                warn!(
                    "Skipping peer chain with mismatched length ({} advertised, {} actual)",
                    length,
                    chain.len()
                );
                continue;
            }

            if length > max_length && validator::is_valid_chain(&chain, self.difficulty) {
                max_length = length;
                best = Some(chain);
            }
        }

        match best {
            Some(chain) => {
                let mut state = self.state.lock().unwrap();
                // The local chain may have grown while candidates were
                // being validated; only a still-longer candidate wins
                if chain.len() > state.chain.len() {
                    info!(
                        "Replacing local chain ({} blocks) with peer chain ({} blocks)",
                        state.chain.len(),
                        chain.len()
                    );
                    state.chain = chain;
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Validates the local chain with the same rules applied to candidates
    pub fn is_valid(&self) -> bool {
        validator::is_valid_chain(&self.state.lock().unwrap().chain, self.difficulty)
    }

    /// Structural invariants of the local chain
    ///
    /// A violation here means local corruption, not untrusted input; it is
    /// surfaced as an unrecoverable error and never silently patched.
    pub fn integrity_check(&self) -> Result<(), BlockchainError> {
        let state = self.state.lock().unwrap();

        let genesis = state
            .chain
            .first()
            .ok_or_else(|| BlockchainError::CorruptChain("chain is empty".to_string()))?;

        if genesis.block_number != 1
            || genesis.nonce != 0
            || genesis.previous_hash != GENESIS_PREVIOUS_HASH
        {
            return Err(BlockchainError::CorruptChain(
                "genesis block does not match the fixed sentinel".to_string(),
            ));
        }

        for (index, block) in state.chain.iter().enumerate() {
            if block.block_number != index as u64 + 1 {
                return Err(BlockchainError::CorruptChain(format!(
                    "block at index {} has sequence number {}",
                    index, block.block_number
                )));
            }
        }

        Ok(())
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::transaction::MINING_SENDER;
    use crate::blockchain::Wallet;

    fn mint() -> Address {
        Address(MINING_SENDER.to_string())
    }

    #[test]
    fn test_new_ledger_holds_genesis() {
        let blockchain = Blockchain::new();
        let chain = blockchain.chain();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].block_number, 1);
        assert_eq!(chain[0].previous_hash, GENESIS_PREVIOUS_HASH);
        assert!(blockchain.integrity_check().is_ok());
    }

    #[test]
    fn test_reward_submission_is_unconditional() {
        let blockchain = Blockchain::new();
        let miner = Wallet::new();

        let block_number = blockchain
            .submit_transaction(mint(), miner.address().clone(), MINING_REWARD, None)
            .unwrap();

        assert_eq!(block_number, 2);
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_signed_submission_is_admitted() {
        let blockchain = Blockchain::new();
        let sender = Wallet::new();
        let recipient = Wallet::new();

        let mut transaction =
            Transaction::new(sender.address().clone(), recipient.address().clone(), 5.0);
        transaction.sign(&sender).unwrap();

        let block_number = blockchain
            .submit_transaction(
                transaction.sender,
                transaction.recipient,
                transaction.amount,
                transaction.signature,
            )
            .unwrap();

        assert_eq!(block_number, 2);
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let blockchain = Blockchain::new();
        let sender = Wallet::new();
        let recipient = Wallet::new();

        let result = blockchain.submit_transaction(
            sender.address().clone(),
            recipient.address().clone(),
            -1.0,
            None,
        );

        assert!(matches!(
            result,
            Err(BlockchainError::Transaction(
                TransactionError::InvalidAmount(_)
            ))
        ));
    }

    #[test]
    fn test_end_to_end_mint_mine_seal_then_forged_rejection() {
        let blockchain = Blockchain::with_difficulty(2);
        let genesis_hash = blockchain.last_block().hash();

        // Reward submitted before the search; the search runs over the
        // buffer's non-reward prefix, which is empty here
        blockchain
            .submit_transaction(mint(), Address(blockchain.node_id().to_string()), 0.25, None)
            .unwrap();

        let nonce = pow::find_nonce(&[], &genesis_hash, 2);
        let block = blockchain.seal_block(nonce, genesis_hash.clone()).unwrap();

        assert_eq!(blockchain.chain().len(), 2);
        assert_eq!(block.previous_hash, genesis_hash);
        assert!(blockchain.pending_transactions().is_empty());
        assert!(blockchain.is_valid());

        // A forged signature must be rejected without touching the buffer
        let sender = Wallet::new();
        let forger = Wallet::new();
        let mut forged =
            Transaction::new(sender.address().clone(), forger.address().clone(), 9.0);
        forged.signature = Some(forger.sign(&forged.canonical_bytes().unwrap()));

        let result = blockchain.submit_transaction(
            forged.sender,
            forged.recipient,
            forged.amount,
            forged.signature,
        );

        assert!(matches!(
            result,
            Err(BlockchainError::Transaction(
                TransactionError::InvalidSignature
            ))
        ));
        assert!(blockchain.pending_transactions().is_empty());
    }

    #[test]
    fn test_mine_block_appends_reward_and_clears_buffer() {
        let blockchain = Blockchain::with_difficulty(2);
        let miner = Wallet::new();

        blockchain
            .submit_transaction(mint(), miner.address().clone(), 0.25, None)
            .unwrap();

        let block = blockchain.mine_block(miner.address()).unwrap();

        assert_eq!(block.block_number, 2);
        assert_eq!(block.transactions.len(), 2);
        assert!(block.transactions.last().unwrap().is_reward());
        assert!(blockchain.pending_transactions().is_empty());
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_seal_with_stale_tip_is_rejected() {
        let blockchain = Blockchain::with_difficulty(2);
        let miner = Wallet::new();

        let old_tip = blockchain.last_block().hash();
        blockchain.mine_block(miner.address()).unwrap();

        let nonce = pow::find_nonce(&[], &old_tip, 2);
        assert!(matches!(
            blockchain.seal_block(nonce, old_tip),
            Err(BlockchainError::StaleProof)
        ));
        assert_eq!(blockchain.chain().len(), 2);
    }

    #[test]
    fn test_seal_with_invalid_proof_is_rejected() {
        let blockchain = Blockchain::with_difficulty(2);
        let tip = blockchain.last_block().hash();

        let mut bad_nonce = 0;
        while pow::is_valid_proof(&[], &tip, bad_nonce, 2) {
            bad_nonce += 1;
        }

        assert!(matches!(
            blockchain.seal_block(bad_nonce, tip),
            Err(BlockchainError::StaleProof)
        ));
        assert_eq!(blockchain.chain().len(), 1);
    }

    #[test]
    fn test_resolve_adopts_strictly_longer_valid_chain() {
        let local = Blockchain::with_difficulty(2);
        let remote = Blockchain::with_difficulty(2);
        let miner = Wallet::new();

        remote.mine_block(miner.address()).unwrap();
        remote.mine_block(miner.address()).unwrap();

        let candidate = remote.chain();
        let replaced = local.resolve_conflicts(vec![(candidate.len(), candidate.clone())]);

        assert!(replaced);
        assert_eq!(local.chain(), candidate);
    }

    #[test]
    fn test_resolve_never_adopts_equal_length() {
        let local = Blockchain::with_difficulty(2);
        let remote = Blockchain::with_difficulty(2);
        let miner = Wallet::new();

        local.mine_block(miner.address()).unwrap();
        remote.mine_block(miner.address()).unwrap();

        let before = local.chain();
        let candidate = remote.chain();
        assert_eq!(before.len(), candidate.len());

        assert!(!local.resolve_conflicts(vec![(candidate.len(), candidate)]));
        assert_eq!(local.chain(), before);
    }

    #[test]
    fn test_resolve_skips_invalid_and_malformed_candidates() {
        let local = Blockchain::with_difficulty(2);
        let remote = Blockchain::with_difficulty(2);
        let miner = Wallet::new();

        remote.mine_block(miner.address()).unwrap();
        remote.mine_block(miner.address()).unwrap();

        let mut tampered = remote.chain();
        tampered[1].previous_hash = "ff".repeat(32);

        let short = remote.chain();
        let before = local.chain();

        let replaced = local.resolve_conflicts(vec![
            (tampered.len(), tampered),
            // Advertised length disagrees with the carried chain
            (short.len() + 5, short),
        ]);

        assert!(!replaced);
        assert_eq!(local.chain(), before);
    }

    #[test]
    fn test_resolve_picks_the_longest_among_valid_candidates() {
        let local = Blockchain::with_difficulty(2);
        let shorter = Blockchain::with_difficulty(2);
        let longer = Blockchain::with_difficulty(2);
        let miner = Wallet::new();

        shorter.mine_block(miner.address()).unwrap();
        longer.mine_block(miner.address()).unwrap();
        longer.mine_block(miner.address()).unwrap();

        let replaced = local.resolve_conflicts(vec![
            (shorter.chain().len(), shorter.chain()),
            (longer.chain().len(), longer.chain()),
        ]);

        assert!(replaced);
        assert_eq!(local.chain(), longer.chain());
    }

    #[test]
    fn test_integrity_check_flags_corruption() {
        let blockchain = Blockchain::with_difficulty(2);
        let miner = Wallet::new();
        blockchain.mine_block(miner.address()).unwrap();

        {
            let mut state = blockchain.state.lock().unwrap();
            state.chain[1].block_number = 7;
        }

        assert!(matches!(
            blockchain.integrity_check(),
            Err(BlockchainError::CorruptChain(_))
        ));
    }
}

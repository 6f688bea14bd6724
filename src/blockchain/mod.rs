// Core ledger module
//
// This module contains the consensus-critical pieces:
// - Transaction and Block records with their canonical encodings
// - Cryptographic signing and verification
// - Proof-of-work search and validation
// - The ledger state machine (admission, sealing, fork adoption)
// - The pure chain validator
// - The node registry consumed by fork resolution

pub mod block;
pub mod chain;
pub mod crypto;
pub mod nodes;
pub mod pow;
pub mod transaction;
pub mod validator;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, BlockchainError};
pub use crypto::{Address, DigitalSignature, Wallet};
pub use nodes::NodeRegistry;
pub use transaction::Transaction;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature, Wallet};

/// Privileged sender identity for system-minted reward transactions
pub const MINING_SENDER: &str = "VOIDCOIN";

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Transaction is not signed")]
    NotSigned,

    #[error("Transaction already signed")]
    AlreadySigned,

    #[error("Wallet address does not match sender address")]
    SenderMismatch,

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// A value transfer between two addresses
///
/// The canonical encoding covers exactly `{amount, recipient, sender}` in
/// lexicographic key order; that byte sequence is what gets signed and
/// what block hashing and proof-of-work consume, so the field set and key
/// names are part of the wire contract. Changing either invalidates every
/// existing signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address, or [`MINING_SENDER`] for a reward
    pub sender: Address,

    /// Recipient's address
    pub recipient: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Timestamp when the transaction was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Signature over the canonical encoding; absent on reward transactions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<DigitalSignature>,
}

impl Transaction {
    /// Creates a new unsigned transaction
    pub fn new(sender: Address, recipient: Address, amount: f64) -> Self {
        Transaction {
            sender,
            recipient,
            amount,
            timestamp: Utc::now(),
            signature: None,
        }
    }

    /// Creates a system-minted reward transaction (no signature)
    pub fn new_reward(recipient: Address, amount: f64) -> Self {
        Transaction {
            sender: Address(MINING_SENDER.to_string()),
            recipient,
            amount,
            timestamp: Utc::now(),
            signature: None,
        }
    }

    /// Whether this is a system-minted reward transaction
    pub fn is_reward(&self) -> bool {
        self.sender.0 == MINING_SENDER
    }

    /// The canonical record: the fixed-order field set shared by signing,
    /// block hashing and proof-of-work
    ///
    /// `serde_json`'s map is a `BTreeMap`, so serializing this value always
    /// emits keys in lexicographic order regardless of how the in-memory
    /// struct is laid out.
    pub fn canonical_record(&self) -> serde_json::Value {
        serde_json::json!({
            "sender": self.sender.0,
            "recipient": self.recipient.0,
            "amount": self.amount,
        })
    }

    /// Canonical bytes for signing and verification
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        serde_json::to_vec(&self.canonical_record())
            .map_err(|e| TransactionError::Encoding(e.to_string()))
    }

    /// Signs the transaction with the sender's wallet
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        if self.signature.is_some() {
            return Err(TransactionError::AlreadySigned);
        }

        if wallet.address() != &self.sender {
            return Err(TransactionError::SenderMismatch);
        }

        let message = self.canonical_bytes()?;
        self.signature = Some(wallet.sign(&message));

        Ok(())
    }

    /// Verifies the transaction's signature against the sender address
    ///
    /// Reward transactions are trusted by construction and always verify.
    /// A bad or undecodable signature is `Ok(false)`; only a structurally
    /// invalid sender key is an error.
    pub fn verify(&self) -> Result<bool, TransactionError> {
        if self.is_reward() {
            return Ok(true);
        }

        let signature = match &self.signature {
            Some(signature) => signature,
            None => return Err(TransactionError::NotSigned),
        };

        let public_key = self.sender.to_public_key()?;
        let message = self.canonical_bytes()?;

        Ok(verify_signature(&message, signature, &public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction() {
        let sender = Wallet::new();
        let recipient = Wallet::new();

        let transaction =
            Transaction::new(sender.address().clone(), recipient.address().clone(), 10.5);

        assert_eq!(transaction.sender, *sender.address());
        assert_eq!(transaction.recipient, *recipient.address());
        assert_eq!(transaction.amount, 10.5);
        assert!(transaction.signature.is_none());
        assert!(!transaction.is_reward());
    }

    #[test]
    fn test_sign_and_verify() {
        let sender = Wallet::new();
        let recipient = Wallet::new();

        let mut transaction =
            Transaction::new(sender.address().clone(), recipient.address().clone(), 10.5);
        transaction.sign(&sender).unwrap();

        assert!(transaction.signature.is_some());
        assert!(transaction.verify().unwrap());
    }

    #[test]
    fn test_tampered_amount_fails_verification() {
        let sender = Wallet::new();
        let recipient = Wallet::new();

        let mut transaction =
            Transaction::new(sender.address().clone(), recipient.address().clone(), 10.5);
        transaction.sign(&sender).unwrap();

        transaction.amount = 10.6;
        assert!(!transaction.verify().unwrap());
    }

    #[test]
    fn test_sign_with_wrong_wallet() {
        let sender = Wallet::new();
        let other = Wallet::new();

        let mut transaction =
            Transaction::new(sender.address().clone(), other.address().clone(), 1.0);

        assert!(matches!(
            transaction.sign(&other),
            Err(TransactionError::SenderMismatch)
        ));
    }

    #[test]
    fn test_reward_transaction_is_trusted() {
        let miner = Wallet::new();
        let transaction = Transaction::new_reward(miner.address().clone(), 0.25);

        assert_eq!(transaction.sender.0, MINING_SENDER);
        assert!(transaction.is_reward());
        assert!(transaction.verify().unwrap());
    }

    #[test]
    fn test_canonical_record_key_order_is_stable() {
        let sender = Wallet::new();
        let recipient = Wallet::new();

        let transaction =
            Transaction::new(sender.address().clone(), recipient.address().clone(), 3.0);

        let encoded = String::from_utf8(transaction.canonical_bytes().unwrap()).unwrap();
        let amount = encoded.find("\"amount\"").unwrap();
        let recipient_pos = encoded.find("\"recipient\"").unwrap();
        let sender_pos = encoded.find("\"sender\"").unwrap();

        assert!(amount < recipient_pos && recipient_pos < sender_pos);
    }
}

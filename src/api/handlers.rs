use actix_web::{web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{Address, Block, Blockchain, DigitalSignature, NodeRegistry, Transaction};

use super::peers;

/// Shared ledger state
pub type BlockchainData = web::Data<Blockchain>;

/// Shared peer registry
pub type RegistryData = web::Data<NodeRegistry>;

/// Response for the chain endpoint; also the wire shape peers consume
/// during fork resolution
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's address
    pub sender: String,

    /// The recipient's address
    pub recipient: String,

    /// The amount to transfer
    pub amount: f64,

    /// Signature over the transaction's canonical encoding, produced by
    /// the sender's wallet; omitted for mint transactions
    pub signature: Option<String>,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub message: String,

    /// The number of the block that will include this transaction
    pub block_number: u64,
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// Reward recipient; defaults to the node's own identity
    pub miner_address: Option<String>,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    pub message: String,

    /// The newly sealed block
    pub block: Block,
}

/// Request for the node registration endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesRequest {
    /// Peer URLs or bare `host:port` authorities
    pub nodes: Vec<String>,
}

/// One entry of the node registry
#[derive(Serialize, Deserialize, ToSchema)]
pub struct NodeEntry {
    pub address: String,

    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub last_seen: DateTime<Utc>,
}

/// Response for the conflict-resolution endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    pub message: String,

    /// Whether the local chain was replaced by a peer's
    pub replaced: bool,

    /// Length of the chain after the pass
    pub length: usize,
}

/// Response for the create wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// The wallet's address
    pub address: String,

    /// The wallet's private key (hex encoded); store it yourself
    pub private_key: String,
}

/// Get the full chain
///
/// Returns the chain in the export format peers validate against
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(blockchain: BlockchainData) -> impl Responder {
    let chain = blockchain.chain();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
    })
}

/// Get all pending transactions
///
/// Returns the transactions waiting to be sealed into the next block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(blockchain.pending_transactions())
}

/// Submit a new transaction
///
/// Verifies the signature and adds the transaction to the pending buffer
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction admitted", body = TransactionResponse),
        (status = 400, description = "Transaction rejected")
    )
)]
pub async fn new_transaction(
    blockchain: BlockchainData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    let transaction_req = transaction_req.into_inner();

    let signature = transaction_req.signature.map(DigitalSignature);

    match blockchain.submit_transaction(
        Address(transaction_req.sender),
        Address(transaction_req.recipient),
        transaction_req.amount,
        signature,
    ) {
        Ok(block_number) => HttpResponse::Created().json(TransactionResponse {
            message: format!("Transaction will be added to block {}", block_number),
            block_number,
        }),
        Err(err) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Transaction rejected: {}", err)
        })),
    }
}

/// Mine a new block
///
/// Runs the proof-of-work search over the pending buffer and seals the
/// result, paying the reward to the requested address
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 500, description = "Mining failed")
    )
)]
pub async fn mine_block(
    blockchain: BlockchainData,
    mine_req: web::Json<MineRequest>,
) -> impl Responder {
    let miner = Address(
        mine_req
            .into_inner()
            .miner_address
            .unwrap_or_else(|| blockchain.node_id().to_string()),
    );

    // The nonce search is CPU-bound; keep it off the async workers
    let ledger = blockchain.clone();
    let result = web::block(move || ledger.mine_block(&miner)).await;

    match result {
        Ok(Ok(block)) => HttpResponse::Ok().json(MineResponse {
            message: "New block sealed".to_string(),
            block,
        }),
        Ok(Err(err)) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to mine block: {}", err)
        })),
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Mining task failed: {}", err)
        })),
    }
}

/// Validate the local chain
///
/// Runs the structural integrity check and the full consensus validation
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Chain validation status"),
        (status = 500, description = "Local chain is corrupt")
    )
)]
pub async fn validate_chain(blockchain: BlockchainData) -> impl Responder {
    match blockchain.integrity_check() {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "valid": blockchain.is_valid()
        })),
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Unrecoverable chain state: {}", err)
        })),
    }
}

/// Register peer nodes
///
/// Adds peers to the registry consumed by conflict resolution
#[utoipa::path(
    post,
    path = "/api/v1/nodes/register",
    request_body = RegisterNodesRequest,
    responses(
        (status = 201, description = "Nodes registered"),
        (status = 400, description = "A node address is malformed")
    )
)]
pub async fn register_nodes(
    registry: RegistryData,
    register_req: web::Json<RegisterNodesRequest>,
) -> impl Responder {
    for node in &register_req.nodes {
        if let Err(err) = registry.register(node) {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": err.to_string()
            }));
        }
    }

    HttpResponse::Created().json(serde_json::json!({
        "message": "Nodes registered",
        "total_nodes": registry.len()
    }))
}

/// List registered peer nodes
#[utoipa::path(
    get,
    path = "/api/v1/nodes",
    responses(
        (status = 200, description = "Registered nodes", body = Vec<NodeEntry>)
    )
)]
pub async fn list_nodes(registry: RegistryData) -> impl Responder {
    let nodes: Vec<NodeEntry> = registry
        .entries()
        .into_iter()
        .map(|(address, last_seen)| NodeEntry { address, last_seen })
        .collect();

    HttpResponse::Ok().json(nodes)
}

/// Resolve forks against registered peers
///
/// Fetches every registered peer's chain and adopts the longest valid one
/// if it is strictly longer than the local chain
#[utoipa::path(
    get,
    path = "/api/v1/nodes/resolve",
    responses(
        (status = 200, description = "Resolution pass completed", body = ResolveResponse)
    )
)]
pub async fn resolve_conflicts(
    blockchain: BlockchainData,
    registry: RegistryData,
) -> impl Responder {
    let peer_chains = peers::fetch_chains(&registry).await;
    let replaced = blockchain.resolve_conflicts(peer_chains);

    let message = if replaced {
        "Local chain was replaced"
    } else {
        "Local chain is authoritative"
    };

    HttpResponse::Ok().json(ResolveResponse {
        message: message.to_string(),
        replaced,
        length: blockchain.chain().len(),
    })
}

/// Create a new wallet
///
/// Generates a keypair for clients that sign transactions themselves
#[utoipa::path(
    post,
    path = "/api/v1/wallet/new",
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse)
    )
)]
pub async fn create_wallet() -> impl Responder {
    let wallet = crate::blockchain::Wallet::new();

    HttpResponse::Created().json(WalletResponse {
        address: wallet.address().0.clone(),
        private_key: hex::encode(wallet.export_secret_key()),
    })
}

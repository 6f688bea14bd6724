// HTTP transport layer
//
// Thin collaborator around the core ledger: REST handlers and the peer
// chain fetch used by fork resolution.

pub mod handlers;
pub mod peers;
pub mod routes;

pub use routes::configure_routes;

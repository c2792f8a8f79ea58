//! Known-peer bookkeeping and the gossip server.

pub mod node;
pub mod server;

pub use node::{Node, Nodes};
pub use server::{send_tx, OpType, Server, CENTRAL_NODE, TRANSACTION_THRESHOLD};

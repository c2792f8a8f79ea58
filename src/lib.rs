//! A minimal UTXO-based blockchain node.
//!
//! The ledger is an append-only chain of proof-of-work-sealed blocks of
//! ECDSA-signed transactions, persisted in sled and replicated over a
//! small TCP gossip protocol.
//!
//! - `core/`: blocks, transactions, the chain store, Merkle roots and the
//!   proof of work
//! - `wallet/`: key pairs, Base58Check addresses, the on-disk wallet file
//! - `storage/`: the UTXO index (`chainstate`), mempool and in-transit
//!   block tracking
//! - `network/`: known peers and the message server (version handshake,
//!   inventory gossip, block download, mempool mining)
//! - `config/`: `NODE_ID`-derived per-node settings
//! - `cli/`: clap command definitions

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use crate::core::{
    Block, Blockchain, MerkleTree, ProofOfWork, TXInput, TXOutput, Transaction, SUBSIDY,
};
pub use error::{BlockchainError, Result};
pub use network::{send_tx, Node, Nodes, Server, CENTRAL_NODE, TRANSACTION_THRESHOLD};
pub use storage::{BlockInTransit, MemoryPool, UTXOSet};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    convert_address, hash_pub_key, validate_address, Wallet, Wallets, ADDRESS_CHECK_SUM_LEN,
};

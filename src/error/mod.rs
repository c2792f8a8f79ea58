//! Error types shared across the node.

use std::fmt;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Every failure the node surfaces to a caller
#[derive(Debug, Clone)]
pub enum BlockchainError {
    /// A chain database already exists where `createblockchain` would put one
    ChainAlreadyExists,
    /// No chain database exists yet
    ChainMissing,
    /// Address failed Base58/checksum/version validation
    InvalidAddress(String),
    /// The UTXO scan could not cover the requested amount
    InsufficientFunds { required: u64, available: u64 },
    /// A transaction input references a transaction that is not on the chain
    UnknownPrevTx,
    /// Signature verification failed for at least one input
    BadSignature,
    /// The nonce space was exhausted without meeting the target
    PowCeilingReached,
    /// Underlying key-value store failure
    Storage(String),
    /// Encode/decode failure of a persisted or wire-carried value
    Serialization(String),
    /// Dial or write to a peer failed
    PeerUnreachable(String),
    /// An incoming message could not be decoded
    MalformedMessage(String),
    /// Key generation or signing failure
    Crypto(String),
    /// Wallet lookup or wallet-file failure
    Wallet(String),
    /// Block-level validation failure
    InvalidBlock(String),
    /// Transaction-level validation failure
    Transaction(String),
    /// File I/O failure
    Io(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::ChainAlreadyExists => write!(f, "Blockchain already exists"),
            BlockchainError::ChainMissing => {
                write!(f, "No existing blockchain found. Create one first.")
            }
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            BlockchainError::UnknownPrevTx => {
                write!(f, "Referenced input transaction not found on chain")
            }
            BlockchainError::BadSignature => write!(f, "Transaction signature is not valid"),
            BlockchainError::PowCeilingReached => {
                write!(f, "Proof-of-work nonce space exhausted")
            }
            BlockchainError::Storage(msg) => write!(f, "Storage error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::PeerUnreachable(addr) => write!(f, "Peer unreachable: {addr}"),
            BlockchainError::MalformedMessage(msg) => write!(f, "Malformed message: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            BlockchainError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Storage(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

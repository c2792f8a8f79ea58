//! Blocks, transactions, the chain store, Merkle roots and proof of work.

pub mod block;
pub mod blockchain;
pub mod merkle;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{Blockchain, BlockchainIterator};
pub use merkle::MerkleTree;
pub use proof_of_work::ProofOfWork;
pub use transaction::{TXInput, TXOutput, Transaction, SUBSIDY};

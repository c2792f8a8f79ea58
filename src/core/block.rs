use crate::core::{MerkleTree, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, deserialize, serialize};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};

/// A sealed unit of the chain. `pre_block_hash` is empty for the genesis
/// block; `hash` is the SHA-256 of the proof-of-work preimage and is fixed
/// once mining succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    timestamp: i64,
    pre_block_hash: Vec<u8>,
    hash: Vec<u8>,
    transactions: Vec<Transaction>,
    nonce: i64,
    height: usize,
}

impl Block {
    /// Assemble and mine a block. Fails with `PowCeilingReached` if the
    /// nonce space is exhausted before the target is met.
    pub fn new_block(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        height: usize,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let mut block = Block {
            timestamp: current_timestamp()?,
            pre_block_hash,
            hash: vec![],
            transactions: transactions.to_vec(),
            nonce: 0,
            height,
        };

        let pow = ProofOfWork::new_proof_of_work(block.clone());
        let (nonce, hash) = pow.run()?;
        block.nonce = nonce;
        block.hash = hash;
        info!(
            "Sealed block at height {height}: {}",
            HEXLOWER.encode(&block.hash)
        );

        Ok(block)
    }

    pub fn generate_genesis_block(transaction: &Transaction) -> Result<Block> {
        let transactions = vec![transaction.clone()];
        Block::new_block(vec![], &transactions, 0)
    }

    /// Merkle root over this block's transaction ids
    pub fn hash_transactions(&self) -> Result<Vec<u8>> {
        let tx_ids: Vec<Vec<u8>> = self
            .transactions
            .iter()
            .map(|tx| tx.get_id().to_vec())
            .collect();
        MerkleTree::calculate_root(&tx_ids)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_bytes(&self) -> Vec<u8> {
        self.hash.clone()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_height(&self) -> usize {
        self.height
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    /// Test-only constructor that skips mining
    #[cfg(test)]
    pub fn new_unsealed(
        timestamp: i64,
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        nonce: i64,
        height: usize,
    ) -> Block {
        Block {
            timestamp,
            pre_block_hash,
            hash: vec![0u8; 32],
            transactions: transactions.to_vec(),
            nonce,
            height,
        }
    }

    #[cfg(test)]
    pub fn set_nonce_for_test(&mut self, nonce: i64) {
        self.nonce = nonce;
    }
}

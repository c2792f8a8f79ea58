use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::info;
use num_bigint::{BigInt, Sign};
use std::borrow::Borrow;
use std::ops::ShlAssign;

// Fixed difficulty: the top TARGET_BITS bits of a valid hash are zero.
const TARGET_BITS: u32 = 24;

const MAX_NONCE: i64 = i64::MAX;

/// Single-threaded nonce search over a block's proof-of-work preimage
pub struct ProofOfWork {
    block: Block,
    target: BigInt,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block) -> ProofOfWork {
        let mut target = BigInt::from(1);
        target.shl_assign(256 - TARGET_BITS);
        ProofOfWork { block, target }
    }

    /// Re-hash the block with its recorded nonce and check the target
    /// inequality. No search happens here.
    pub fn validate(block: &Block) -> bool {
        let pow = ProofOfWork::new_proof_of_work(block.clone());
        let data = match pow.prepare_data(block.get_nonce()) {
            Ok(data) => data,
            Err(_) => return false,
        };
        let hash = sha256_digest(data.as_slice());
        if hash != block.get_hash() {
            return false;
        }
        let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
        hash_int < pow.target
    }

    // prev hash ‖ Merkle root ‖ hex(timestamp) ‖ hex(nonce)
    fn prepare_data(&self, nonce: i64) -> Result<Vec<u8>> {
        let merkle_root = self.block.hash_transactions()?;
        let mut data_bytes = vec![];
        data_bytes.extend(self.block.get_pre_block_hash());
        data_bytes.extend(merkle_root);
        data_bytes.extend(format!("{:x}", self.block.get_timestamp()).into_bytes());
        data_bytes.extend(format!("{nonce:x}").into_bytes());
        Ok(data_bytes)
    }

    /// Search nonces from zero upward until the hash, read big-endian,
    /// is strictly below the target. Exhausting the nonce space is an
    /// error, not an answer.
    pub fn run(&self) -> Result<(i64, Vec<u8>)> {
        let mut nonce = 0;
        info!("Mining block at height {}", self.block.get_height());
        while nonce < MAX_NONCE {
            let data = self.prepare_data(nonce)?;
            let hash = sha256_digest(data.as_slice());
            let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());

            if hash_int.lt(self.target.borrow()) {
                info!("Found nonce {nonce}: {}", HEXLOWER.encode(hash.as_slice()));
                return Ok((nonce, hash));
            }
            nonce += 1;
        }
        Err(BlockchainError::PowCeilingReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use crate::wallet::Wallet;

    fn mined_block() -> Block {
        let wallet = Wallet::new().unwrap();
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();
        Block::new_block(vec![], &[coinbase], 0).unwrap()
    }

    #[test]
    fn test_target_has_leading_zero_bits() {
        let block = mined_block();
        let hash = block.get_hash();
        // 24 zero bits means the first three bytes are zero
        assert_eq!(&hash[..3], &[0u8, 0u8, 0u8]);
    }

    #[test]
    fn test_mined_block_validates() {
        let block = mined_block();
        assert!(ProofOfWork::validate(&block));
    }

    #[test]
    fn test_tampered_nonce_fails_validation() {
        let mut block = mined_block();
        let nonce = block.get_nonce();
        block.set_nonce_for_test(nonce ^ 1);
        assert!(!ProofOfWork::validate(&block));
    }

    #[test]
    fn test_prepare_data_is_deterministic() {
        let block = mined_block();
        let pow = ProofOfWork::new_proof_of_work(block);

        let data1 = pow.prepare_data(12345).unwrap();
        let data2 = pow.prepare_data(12345).unwrap();
        assert_eq!(data1, data2);

        let data3 = pow.prepare_data(54321).unwrap();
        assert_ne!(data1, data3);
    }
}

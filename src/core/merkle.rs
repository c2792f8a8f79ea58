use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;

/// Merkle tree over the transaction ids of a block.
///
/// Leaves are `SHA-256(txid)`; internal nodes are `SHA-256(left ‖ right)`.
/// A level of odd cardinality duplicates its last node before pairing.
/// The tree is never persisted: the root is recomputed from block contents
/// whenever it is needed for hashing or validation.
pub struct MerkleTree;

impl MerkleTree {
    pub fn calculate_root(tx_ids: &[Vec<u8>]) -> Result<Vec<u8>> {
        if tx_ids.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Cannot compute a Merkle root over zero transactions".to_string(),
            ));
        }

        let mut level: Vec<Vec<u8>> = tx_ids.iter().map(|id| sha256_digest(id)).collect();

        loop {
            if level.len() % 2 != 0 {
                let last = level[level.len() - 1].clone();
                level.push(last);
            }

            let mut parents = Vec::with_capacity(level.len() / 2);
            for pair in level.chunks(2) {
                let mut combined = Vec::with_capacity(pair[0].len() + pair[1].len());
                combined.extend_from_slice(&pair[0]);
                combined.extend_from_slice(&pair[1]);
                parents.push(sha256_digest(&combined));
            }

            if parents.len() == 1 {
                return Ok(parents.remove(0));
            }
            level = parents;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
        let mut combined = left.to_vec();
        combined.extend_from_slice(right);
        sha256_digest(&combined)
    }

    #[test]
    fn test_empty_list_is_an_error() {
        assert!(MerkleTree::calculate_root(&[]).is_err());
    }

    #[test]
    fn test_single_transaction_pairs_the_leaf_with_itself() {
        let id = vec![1u8; 32];
        let leaf = sha256_digest(&id);
        let expected = hash_pair(&leaf, &leaf);
        assert_eq!(MerkleTree::calculate_root(&[id]).unwrap(), expected);
    }

    #[test]
    fn test_two_transactions() {
        let ids = vec![vec![1u8; 32], vec![2u8; 32]];
        let left = sha256_digest(&ids[0]);
        let right = sha256_digest(&ids[1]);
        let expected = hash_pair(&left, &right);
        assert_eq!(MerkleTree::calculate_root(&ids).unwrap(), expected);
    }

    #[test]
    fn test_odd_level_duplicates_last_node() {
        let ids = vec![vec![1u8; 32], vec![2u8; 32], vec![3u8; 32]];
        let a = sha256_digest(&ids[0]);
        let b = sha256_digest(&ids[1]);
        let c = sha256_digest(&ids[2]);
        let ab = hash_pair(&a, &b);
        let cc = hash_pair(&c, &c);
        let expected = hash_pair(&ab, &cc);
        assert_eq!(MerkleTree::calculate_root(&ids).unwrap(), expected);
    }

    #[test]
    fn test_root_depends_on_order() {
        let ids = vec![vec![1u8; 32], vec![2u8; 32]];
        let swapped = vec![ids[1].clone(), ids[0].clone()];
        assert_ne!(
            MerkleTree::calculate_root(&ids).unwrap(),
            MerkleTree::calculate_root(&swapped).unwrap()
        );
    }
}

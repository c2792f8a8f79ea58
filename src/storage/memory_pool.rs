use crate::core::Transaction;
use data_encoding::HEXLOWER;
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-local pool of verified but unmined transactions, keyed by
/// lowercase hex txid. Not persisted.
pub struct MemoryPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, txid_hex: &str) -> Option<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool.get(txid_hex).cloned(),
            Err(_) => {
                log::error!("Failed to acquire read lock on memory pool");
                None
            }
        }
    }

    pub fn add(&self, tx: Transaction) {
        match self.inner.write() {
            Ok(mut pool) => {
                pool.insert(HEXLOWER.encode(tx.get_id()), tx);
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on memory pool");
            }
        }
    }

    pub fn contains(&self, txid_hex: &str) -> bool {
        match self.inner.read() {
            Ok(pool) => pool.contains_key(txid_hex),
            Err(_) => {
                log::error!("Failed to acquire read lock on memory pool");
                false
            }
        }
    }

    pub fn remove(&self, txid_hex: &str) {
        match self.inner.write() {
            Ok(mut pool) => {
                pool.remove(txid_hex);
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on memory pool");
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(pool) => pool.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on memory pool");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool.values().cloned().collect(),
            Err(_) => {
                log::error!("Failed to acquire read lock on memory pool");
                Vec::new()
            }
        }
    }
}

/// Block hashes announced via `inv` but not yet downloaded
pub struct BlockInTransit {
    inner: RwLock<Vec<Vec<u8>>>,
}

impl Default for BlockInTransit {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockInTransit {
    pub fn new() -> BlockInTransit {
        BlockInTransit {
            inner: RwLock::new(vec![]),
        }
    }

    pub fn add_blocks(&self, blocks: &[Vec<u8>]) {
        match self.inner.write() {
            Ok(mut inner) => {
                for hash in blocks {
                    inner.push(hash.to_vec());
                }
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on blocks in transit");
            }
        }
    }

    pub fn first(&self) -> Option<Vec<u8>> {
        match self.inner.read() {
            Ok(inner) => inner.first().map(|h| h.to_vec()),
            Err(_) => {
                log::error!("Failed to acquire read lock on blocks in transit");
                None
            }
        }
    }

    pub fn remove(&self, block_hash: &[u8]) {
        match self.inner.write() {
            Ok(mut inner) => {
                if let Some(idx) = inner.iter().position(|x| x.eq(block_hash)) {
                    inner.remove(idx);
                }
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on blocks in transit");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self.inner.read() {
            Ok(inner) => inner.is_empty(),
            Err(_) => {
                log::error!("Failed to acquire read lock on blocks in transit");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    #[test]
    fn test_pool_add_get_remove() {
        let pool = MemoryPool::new();
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();
        let txid_hex = HEXLOWER.encode(tx.get_id());

        assert!(pool.is_empty());
        pool.add(tx);
        assert!(pool.contains(&txid_hex));
        assert_eq!(pool.len(), 1);
        assert!(pool.get(&txid_hex).is_some());

        pool.remove(&txid_hex);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_blocks_in_transit_order() {
        let transit = BlockInTransit::new();
        transit.add_blocks(&[vec![1], vec![2], vec![3]]);

        assert_eq!(transit.first(), Some(vec![1]));
        transit.remove(&[1]);
        assert_eq!(transit.first(), Some(vec![2]));
        transit.remove(&[2]);
        transit.remove(&[3]);
        assert!(transit.is_empty());
    }
}

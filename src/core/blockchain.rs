use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, Transaction, TXOutput};
use crate::error::{BlockchainError, Result};
use data_encoding::HEXLOWER;
use log::info;
use sled::{Db, Tree};
use std::collections::HashMap;
use std::env::current_dir;
use std::sync::{Arc, RwLock};

// Sentinel key holding the tip hash; every other key in the tree is a
// 32-byte block hash.
const TIP_KEY: &str = "l";
const BLOCKS_TREE: &str = "blocks";

/// The chain store: ordered persistence of blocks keyed by hash, with the
/// `l` pointer naming the tip. All mutation goes through sled transactions.
#[derive(Clone)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<Vec<u8>>>,
    db: Db,
}

impl Blockchain {
    /// Create a new chain whose genesis coinbase pays `genesis_address`.
    /// Fails with `ChainAlreadyExists` when the database already holds one.
    pub fn create_blockchain(genesis_address: &str) -> Result<Blockchain> {
        Self::create_blockchain_with_path(genesis_address, &Self::default_db_path()?)
    }

    /// Open an existing chain, failing with `ChainMissing` when none exists
    pub fn open_blockchain() -> Result<Blockchain> {
        Self::open_blockchain_with_path(&Self::default_db_path()?)
    }

    fn default_db_path() -> Result<String> {
        let node_id = GLOBAL_CONFIG.get_node_id();
        Ok(current_dir()?
            .join(format!("blockchain_{node_id}.db"))
            .to_string_lossy()
            .to_string())
    }

    pub fn create_blockchain_with_path(genesis_address: &str, db_path: &str) -> Result<Blockchain> {
        let db = sled::open(db_path)?;
        let blocks_tree = db.open_tree(BLOCKS_TREE)?;

        if blocks_tree.get(TIP_KEY)?.is_some() {
            return Err(BlockchainError::ChainAlreadyExists);
        }

        info!("Creating genesis block for address: {genesis_address}");
        let coinbase_tx = Transaction::new_coinbase_tx(genesis_address)?;
        let genesis = Block::generate_genesis_block(&coinbase_tx)?;
        Self::update_blocks_tree(&blocks_tree, &genesis)?;

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(genesis.get_hash_bytes())),
            db,
        })
    }

    pub fn open_blockchain_with_path(db_path: &str) -> Result<Blockchain> {
        let db = sled::open(db_path)?;
        let blocks_tree = db.open_tree(BLOCKS_TREE)?;

        let tip_bytes = blocks_tree
            .get(TIP_KEY)?
            .ok_or(BlockchainError::ChainMissing)?;

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_bytes.to_vec())),
            db,
        })
    }

    // Atomically store a block under its hash and move the tip pointer.
    fn update_blocks_tree(blocks_tree: &Tree, block: &Block) -> Result<()> {
        let block_data = block.serialize()?;

        blocks_tree
            .transaction(|tx_db| {
                tx_db.insert(block.get_hash(), block_data.as_slice())?;
                tx_db.insert(TIP_KEY, block.get_hash())?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError| {
                BlockchainError::Storage(format!("Failed to update blocks tree: {e}"))
            })?;

        Ok(())
    }

    pub fn get_db(&self) -> &Db {
        &self.db
    }

    pub fn get_tip_hash(&self) -> Vec<u8> {
        self.tip_hash
            .read()
            .expect("Failed to acquire read lock on tip_hash - this should never happen")
            .clone()
    }

    fn set_tip_hash(&self, new_tip_hash: &[u8]) {
        let mut tip_hash = self
            .tip_hash
            .write()
            .expect("Failed to acquire write lock on tip_hash - this should never happen");
        *tip_hash = new_tip_hash.to_vec();
    }

    /// Verify the candidate transactions, seal them into a block on top of
    /// the current tip and append it
    pub fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        for tx in transactions {
            if !tx.verify(self)? {
                return Err(BlockchainError::BadSignature);
            }
        }
        self.check_for_double_spending(transactions)?;

        let best_height = self.get_best_height()?;
        let block = Block::new_block(self.get_tip_hash(), transactions, best_height + 1)?;

        let blocks_tree = self.db.open_tree(BLOCKS_TREE)?;
        Self::update_blocks_tree(&blocks_tree, &block)?;
        self.set_tip_hash(block.get_hash());

        info!("Mined block {}", HEXLOWER.encode(block.get_hash()));
        Ok(block)
    }

    // Two inputs in one candidate set must never consume the same
    // (txid, vout) pair.
    fn check_for_double_spending(&self, transactions: &[Transaction]) -> Result<()> {
        use std::collections::HashSet;
        let mut spent_outputs: HashSet<(Vec<u8>, i64)> = HashSet::new();

        for transaction in transactions {
            if transaction.is_coinbase() {
                continue;
            }
            for input in transaction.get_vin() {
                let output_reference = (input.get_txid().to_vec(), input.get_vout());
                if !spent_outputs.insert(output_reference) {
                    return Err(BlockchainError::Transaction(format!(
                        "Double spend of {}:{} within one block",
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Store a peer-supplied block. Duplicates are ignored; the tip only
    /// moves when the new block's height exceeds the stored tip's height.
    pub fn add_block(&self, block: &Block) -> Result<()> {
        let block_tree = self.db.open_tree(BLOCKS_TREE)?;

        if block_tree.get(block.get_hash())?.is_some() {
            return Ok(());
        }

        let block_data = block.serialize()?;
        let tip_hash = self.get_tip_hash();

        let tip_updated = block_tree
            .transaction(|tx_db| {
                tx_db.insert(block.get_hash(), block_data.as_slice())?;

                let tip_block_bytes = tx_db.get(tip_hash.as_slice())?.ok_or_else(|| {
                    sled::Error::ReportableBug("tip hash does not name a stored block".to_string())
                })?;
                let tip_block = Block::deserialize(tip_block_bytes.as_ref()).map_err(|_| {
                    sled::Error::ReportableBug("stored tip block failed to decode".to_string())
                })?;

                if block.get_height() > tip_block.get_height() {
                    tx_db.insert(TIP_KEY, block.get_hash())?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            })
            .map_err(|e: sled::transaction::TransactionError| {
                BlockchainError::Storage(format!("Failed to add block: {e}"))
            })?;

        if tip_updated {
            self.set_tip_hash(block.get_hash());
        }
        Ok(())
    }

    pub fn get_best_height(&self) -> Result<usize> {
        let block_tree = self.db.open_tree(BLOCKS_TREE)?;
        let tip_block_bytes = block_tree
            .get(self.get_tip_hash())?
            .ok_or_else(|| BlockchainError::Storage("Tip hash not found".to_string()))?;
        let tip_block = Block::deserialize(tip_block_bytes.as_ref())?;
        Ok(tip_block.get_height())
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        let block_tree = self.db.open_tree(BLOCKS_TREE)?;
        match block_tree.get(block_hash)? {
            Some(block_bytes) => Ok(Some(Block::deserialize(block_bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    /// All block hashes, tip first
    pub fn get_block_hashes(&self) -> Vec<Vec<u8>> {
        self.iterator().map(|block| block.get_hash_bytes()).collect()
    }

    pub fn find_transaction(&self, txid: &[u8]) -> Option<Transaction> {
        for block in self.iterator() {
            for transaction in block.get_transactions() {
                if txid.eq(transaction.get_id()) {
                    return Some(transaction.clone());
                }
            }
        }
        None
    }

    /// Walk the whole chain once, folding spent references so that only
    /// surviving outputs remain. Keys are lowercase hex txids.
    pub fn find_utxo(&self) -> HashMap<String, Vec<TXOutput>> {
        let mut utxo: HashMap<String, Vec<TXOutput>> = HashMap::new();
        let mut spent_txos: HashMap<String, Vec<i64>> = HashMap::new();

        for block in self.iterator() {
            'outer: for tx in block.get_transactions() {
                let txid_hex = HEXLOWER.encode(tx.get_id());
                for (idx, out) in tx.get_vout().iter().enumerate() {
                    if let Some(outs) = spent_txos.get(txid_hex.as_str()) {
                        if outs.contains(&(idx as i64)) {
                            continue 'outer;
                        }
                    }
                    utxo.entry(txid_hex.clone()).or_default().push(out.clone());
                }
                if tx.is_coinbase() {
                    continue;
                }

                for txin in tx.get_vin() {
                    let in_txid_hex = HEXLOWER.encode(txin.get_txid());
                    spent_txos
                        .entry(in_txid_hex)
                        .or_default()
                        .push(txin.get_vout());
                }
            }
        }
        utxo
    }

    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.get_tip_hash(), self.db.clone())
    }
}

/// Walks the chain from the tip back to genesis by following prev-hash
/// pointers; stops once a block with an empty prev-hash has been yielded.
pub struct BlockchainIterator {
    db: Db,
    current_hash: Vec<u8>,
}

impl BlockchainIterator {
    fn new(tip_hash: Vec<u8>, db: Db) -> BlockchainIterator {
        BlockchainIterator {
            current_hash: tip_hash,
            db,
        }
    }
}

impl Iterator for BlockchainIterator {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_hash.is_empty() {
            return None;
        }
        let block_tree = self.db.open_tree(BLOCKS_TREE).ok()?;
        let data = block_tree.get(self.current_hash.as_slice()).ok()??;
        let block = Block::deserialize(data.as_ref()).ok()?;
        self.current_hash = block.get_pre_block_hash().to_vec();
        Some(block)
    }
}

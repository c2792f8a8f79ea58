use crate::core::{Block, Blockchain, TXOutput};
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use data_encoding::HEXLOWER;
use std::collections::HashMap;

const UTXO_TREE: &str = "chainstate";

/// Secondary projection of the chain: txid → the transaction's surviving
/// outputs. Always rebuildable from the chain store and never the source
/// of truth.
pub struct UTXOSet {
    blockchain: Blockchain,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    /// Greedily accumulate outputs locked to `pub_key_hash` until `amount`
    /// is covered. Returns the accumulated sum and a txid-hex → output
    /// indices map; the sum may fall short of `amount`.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, HashMap<String, Vec<usize>>)> {
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0;
        let db = self.blockchain.get_db();
        let utxo_tree = db.open_tree(UTXO_TREE)?;

        for item in utxo_tree.iter() {
            let (k, v) = item?;
            let txid_hex = HEXLOWER.encode(k.as_ref());
            let outs: Vec<TXOutput> = deserialize(v.as_ref())?;

            for (idx, out) in outs.iter().enumerate() {
                if out.is_locked_with_key(pub_key_hash) && accumulated < amount {
                    accumulated += out.get_value();
                    unspent_outputs
                        .entry(txid_hex.clone())
                        .or_default()
                        .push(idx);
                }
            }
        }
        Ok((accumulated, unspent_outputs))
    }

    /// All surviving outputs locked to `pub_key_hash`
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let db = self.blockchain.get_db();
        let utxo_tree = db.open_tree(UTXO_TREE)?;
        let mut utxos = vec![];

        for item in utxo_tree.iter() {
            let (_, v) = item?;
            let outs: Vec<TXOutput> = deserialize(v.as_ref())?;
            for out in outs.iter() {
                if out.is_locked_with_key(pub_key_hash) {
                    utxos.push(out.clone())
                }
            }
        }
        Ok(utxos)
    }

    pub fn count_transactions(&self) -> Result<u64> {
        let db = self.blockchain.get_db();
        let utxo_tree = db.open_tree(UTXO_TREE)?;
        let mut counter = 0;
        for item in utxo_tree.iter() {
            item?;
            counter += 1;
        }
        Ok(counter)
    }

    /// Drop and rebuild the whole index from a single walk of the chain
    pub fn reindex(&self) -> Result<()> {
        let db = self.blockchain.get_db();
        let utxo_tree = db.open_tree(UTXO_TREE)?;
        utxo_tree.clear()?;

        let utxo_map = self.blockchain.find_utxo();
        for (txid_hex, outs) in &utxo_map {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                BlockchainError::Serialization(format!("Failed to decode transaction id: {e}"))
            })?;
            let value = serialize(outs)?;
            utxo_tree.insert(txid.as_slice(), value)?;
        }
        Ok(())
    }

    /// Fold one new block into the index: inputs consume their referenced
    /// outputs (entries with no survivors are deleted), then every
    /// transaction of the block is inserted with all its outputs.
    pub fn update(&self, block: &Block) -> Result<()> {
        let db = self.blockchain.get_db();
        let utxo_tree = db.open_tree(UTXO_TREE)?;

        for tx in block.get_transactions() {
            if !tx.is_coinbase() {
                for vin in tx.get_vin() {
                    let mut updated_outs = vec![];

                    let outs_bytes = utxo_tree
                        .get(vin.get_txid())?
                        .ok_or_else(|| BlockchainError::Storage("UTXO not found".to_string()))?;
                    let outs: Vec<TXOutput> = deserialize(outs_bytes.as_ref())?;

                    for (idx, out) in outs.iter().enumerate() {
                        if idx as i64 != vin.get_vout() {
                            updated_outs.push(out.clone())
                        }
                    }

                    if updated_outs.is_empty() {
                        utxo_tree.remove(vin.get_txid())?;
                    } else {
                        utxo_tree.insert(vin.get_txid(), serialize(&updated_outs)?)?;
                    }
                }
            }

            let new_outputs: Vec<TXOutput> = tx.get_vout().to_vec();
            utxo_tree.insert(tx.get_id(), serialize(&new_outputs)?)?;
        }
        Ok(())
    }

    /// Raw `chainstate` contents, for comparing index states
    #[cfg(test)]
    pub fn dump(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let db = self.blockchain.get_db();
        let utxo_tree = db.open_tree(UTXO_TREE)?;
        let mut entries = vec![];
        for item in utxo_tree.iter() {
            let (k, v) = item?;
            entries.push((k.to_vec(), v.to_vec()));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use crate::wallet::Wallet;
    use tempfile::tempdir;

    fn chain_with_utxo(dir: &std::path::Path) -> (Blockchain, Wallet) {
        let wallet = Wallet::new().unwrap();
        let db_path = dir.join("chain");
        let blockchain = Blockchain::create_blockchain_with_path(
            &wallet.get_address(),
            db_path.to_str().unwrap(),
        )
        .unwrap();
        (blockchain, wallet)
    }

    #[test]
    fn test_reindex_counts_genesis_coinbase() {
        let temp_dir = tempdir().unwrap();
        let (blockchain, wallet) = chain_with_utxo(temp_dir.path());
        let utxo_set = UTXOSet::new(blockchain);
        utxo_set.reindex().unwrap();

        assert_eq!(utxo_set.count_transactions().unwrap(), 1);

        let pub_key_hash = crate::wallet::hash_pub_key(wallet.get_public_key());
        let utxos = utxo_set.find_utxo(&pub_key_hash).unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].get_value(), crate::core::SUBSIDY);
    }

    #[test]
    fn test_find_spendable_outputs_reports_shortfall() {
        let temp_dir = tempdir().unwrap();
        let (blockchain, wallet) = chain_with_utxo(temp_dir.path());
        let utxo_set = UTXOSet::new(blockchain);
        utxo_set.reindex().unwrap();

        let pub_key_hash = crate::wallet::hash_pub_key(wallet.get_public_key());
        let (accumulated, outputs) = utxo_set
            .find_spendable_outputs(&pub_key_hash, 999)
            .unwrap();
        assert_eq!(accumulated, crate::core::SUBSIDY);
        assert_eq!(outputs.len(), 1);
    }

    #[test]
    fn test_incremental_update_matches_full_reindex() {
        let temp_dir = tempdir().unwrap();
        let (blockchain, wallet) = chain_with_utxo(temp_dir.path());
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().unwrap();

        // Spend the genesis coinbase to a second wallet, with change
        let recipient = Wallet::new().unwrap();
        let tx = Transaction::new_utxo_transaction(&wallet, &recipient.get_address(), 3, &utxo_set)
            .unwrap();
        let block = blockchain.mine_block(&[tx]).unwrap();
        utxo_set.update(&block).unwrap();

        let mut incremental = utxo_set.dump().unwrap();
        incremental.sort();

        utxo_set.reindex().unwrap();
        let mut rebuilt = utxo_set.dump().unwrap();
        rebuilt.sort();

        assert_eq!(incremental, rebuilt);
    }

    #[test]
    fn test_spent_entry_is_removed() {
        let temp_dir = tempdir().unwrap();
        let (blockchain, wallet) = chain_with_utxo(temp_dir.path());
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().unwrap();

        let genesis_txid = blockchain
            .iterator()
            .last()
            .unwrap()
            .get_transactions()[0]
            .get_id_bytes();

        // Spend the whole subsidy so no change output survives for the sender
        let recipient = Wallet::new().unwrap();
        let tx = Transaction::new_utxo_transaction(
            &wallet,
            &recipient.get_address(),
            crate::core::SUBSIDY,
            &utxo_set,
        )
        .unwrap();
        let block = blockchain.mine_block(&[tx]).unwrap();
        utxo_set.update(&block).unwrap();

        let entries = utxo_set.dump().unwrap();
        assert!(entries.iter().all(|(k, _)| k != &genesis_txid));
    }
}

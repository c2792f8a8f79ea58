use crate::core::Blockchain;
use crate::error::{BlockchainError, Result};
use crate::storage::UTXOSet;
use crate::utils::{
    deserialize, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, serialize,
    sha256_digest,
};
use crate::wallet::{hash_pub_key, validate_address, Wallet, ADDRESS_CHECK_SUM_LEN};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coins minted by a coinbase transaction
pub const SUBSIDY: u64 = 10;

// The sentinel output index of a coinbase input.
const COINBASE_VOUT: i64 = -1;

/// A reference to an output of a previous transaction, plus the material
/// proving the spender may consume it. A coinbase input references nothing:
/// its txid is empty, its vout is -1 and its signature field carries
/// arbitrary data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: i64,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: i64) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }
}

/// An amount locked to a public-key hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        if value == 0 {
            return Err(BlockchainError::Transaction(
                "Output value must be positive".to_string(),
            ));
        }

        let mut output = TXOutput {
            value,
            pub_key_hash: vec![],
        };
        output.lock(address)?;
        Ok(output)
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    fn lock(&mut self, address: &str) -> Result<()> {
        if !validate_address(address) {
            return Err(BlockchainError::InvalidAddress(address.to_string()));
        }

        let payload = crate::utils::base58_decode(address)?;
        let pub_key_hash = payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec();
        self.pub_key_hash = pub_key_hash;
        Ok(())
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

/// A signed transfer of value: inputs consume previous outputs, outputs
/// lock new amounts to recipients. The id is the SHA-256 of the serialized
/// transaction with the id field cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Mint the block subsidy to `to`. The input carries random data so
    /// two coinbases paying the same address never share an id.
    pub fn new_coinbase_tx(to: &str) -> Result<Transaction> {
        let txout = TXOutput::new(SUBSIDY, to)?;
        let txin = TXInput {
            txid: vec![],
            vout: COINBASE_VOUT,
            signature: Uuid::new_v4().as_bytes().to_vec(),
            pub_key: vec![],
        };

        let mut tx = Transaction {
            id: vec![],
            vin: vec![txin],
            vout: vec![txout],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Build and sign a spend of `amount` from `wallet` to `to`, selecting
    /// inputs from the UTXO index and returning change to the sender.
    pub fn new_utxo_transaction(
        wallet: &Wallet,
        to: &str,
        amount: u64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::Transaction(
                "Amount must be positive".to_string(),
            ));
        }
        if !validate_address(to) {
            return Err(BlockchainError::InvalidAddress(to.to_string()));
        }

        let public_key_hash = hash_pub_key(wallet.get_public_key());
        let (accumulated, valid_outputs) =
            utxo_set.find_spendable_outputs(public_key_hash.as_slice(), amount)?;

        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                BlockchainError::Transaction(format!("Invalid transaction id: {e}"))
            })?;
            for out in outs {
                let input = TXInput {
                    txid: txid.clone(),
                    vout: out as i64,
                    signature: vec![],
                    pub_key: wallet.get_public_key().to_vec(),
                };
                inputs.push(input);
            }
        }

        let mut outputs = vec![TXOutput::new(amount, to)?];
        let change = accumulated - amount;
        if change > 0 {
            outputs.push(TXOutput::new(change, &wallet.get_address())?);
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;
        tx.sign(utxo_set.get_blockchain(), wallet.get_pkcs8())?;
        Ok(tx)
    }

    /// The signing preimage: signatures and public keys cleared, outputs
    /// copied verbatim
    fn trimmed_copy(&self) -> Transaction {
        let mut inputs = vec![];
        for input in &self.vin {
            inputs.push(TXInput::new(input.get_txid(), input.get_vout()));
        }
        Transaction {
            id: self.id.clone(),
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    fn sign(&mut self, blockchain: &Blockchain, pkcs8: &[u8]) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut tx_copy = self.trimmed_copy();

        for (idx, vin) in self.vin.iter_mut().enumerate() {
            let prev_tx = blockchain
                .find_transaction(vin.get_txid())
                .ok_or(BlockchainError::UnknownPrevTx)?;
            let out_idx = referenced_output_index(vin.get_vout(), &prev_tx)?;

            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_tx.vout[out_idx].pub_key_hash.clone();
            tx_copy.id = tx_copy.hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            vin.signature = ecdsa_p256_sha256_sign_digest(pkcs8, tx_copy.get_id())?;
        }
        Ok(())
    }

    /// Re-derive each input's signing id and check its signature against
    /// the embedded public key. A single failing input rejects the whole
    /// transaction; coinbase transactions always verify.
    pub fn verify(&self, blockchain: &Blockchain) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_tx = blockchain
                .find_transaction(vin.get_txid())
                .ok_or(BlockchainError::UnknownPrevTx)?;
            let out_idx = referenced_output_index(vin.get_vout(), &prev_tx)?;

            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_tx.vout[out_idx].pub_key_hash.clone();
            tx_copy.id = tx_copy.hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            if !ecdsa_p256_sha256_sign_verify(
                vin.pub_key.as_slice(),
                vin.signature.as_slice(),
                tx_copy.get_id(),
            ) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(&tx_copy.serialize()?))
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_id_bytes(&self) -> Vec<u8> {
        self.id.clone()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }
}

fn referenced_output_index(vout: i64, prev_tx: &Transaction) -> Result<usize> {
    if vout < 0 || vout as usize >= prev_tx.vout.len() {
        return Err(BlockchainError::Transaction(format!(
            "Referenced output index {vout} out of range"
        )));
    }
    Ok(vout as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coinbase_shape() {
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();

        assert!(tx.is_coinbase());
        assert_eq!(tx.get_vin().len(), 1);
        assert!(tx.get_vin()[0].get_txid().is_empty());
        assert_eq!(tx.get_vin()[0].get_vout(), -1);
        assert_eq!(tx.get_vout().len(), 1);
        assert_eq!(tx.get_vout()[0].get_value(), SUBSIDY);
        assert_eq!(tx.get_id().len(), 32);
    }

    #[test]
    fn test_coinbase_ids_are_unique() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();
        let a = Transaction::new_coinbase_tx(&address).unwrap();
        let b = Transaction::new_coinbase_tx(&address).unwrap();
        assert_ne!(a.get_id(), b.get_id());
    }

    #[test]
    fn test_serialize_round_trip() {
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();

        let bytes = tx.serialize().unwrap();
        let decoded = Transaction::deserialize(&bytes).unwrap();
        assert_eq!(tx.get_id(), decoded.get_id());
        assert_eq!(tx.get_vout()[0].get_value(), decoded.get_vout()[0].get_value());
    }

    #[test]
    fn test_output_locking() {
        let wallet = Wallet::new().unwrap();
        let output = TXOutput::new(5, &wallet.get_address()).unwrap();
        let pub_key_hash = hash_pub_key(wallet.get_public_key());

        assert!(output.is_locked_with_key(&pub_key_hash));
        assert!(!output.is_locked_with_key(&[0u8; 20]));
    }

    #[test]
    fn test_zero_value_output_rejected() {
        let wallet = Wallet::new().unwrap();
        assert!(TXOutput::new(0, &wallet.get_address()).is_err());
    }

    #[test]
    fn test_non_coinbase_detection() {
        let tx = Transaction {
            id: vec![],
            vin: vec![TXInput::new(&[1u8; 32], 0)],
            vout: vec![],
        };
        assert!(!tx.is_coinbase());
    }

    fn spend_on_fresh_chain() -> (
        crate::core::Blockchain,
        crate::storage::UTXOSet,
        Wallet,
        Wallet,
        Transaction,
        tempfile::TempDir,
    ) {
        let temp_dir = tempfile::tempdir().unwrap();
        let sender = Wallet::new().unwrap();
        let recipient = Wallet::new().unwrap();

        let db_path = temp_dir.path().join("chain");
        let blockchain = crate::core::Blockchain::create_blockchain_with_path(
            &sender.get_address(),
            db_path.to_str().unwrap(),
        )
        .unwrap();
        let utxo_set = crate::storage::UTXOSet::new(blockchain.clone());
        utxo_set.reindex().unwrap();

        let tx =
            Transaction::new_utxo_transaction(&sender, &recipient.get_address(), 3, &utxo_set)
                .unwrap();
        (blockchain, utxo_set, sender, recipient, tx, temp_dir)
    }

    #[test]
    fn test_signed_spend_verifies() {
        let (blockchain, _utxo_set, _sender, _recipient, tx, _dir) = spend_on_fresh_chain();
        assert!(tx.verify(&blockchain).unwrap());
    }

    #[test]
    fn test_mutated_output_value_fails_verification() {
        let (blockchain, _utxo_set, _sender, _recipient, tx, _dir) = spend_on_fresh_chain();

        let mut tampered = tx.clone();
        tampered.vout[0].value += 1;
        assert!(!tampered.verify(&blockchain).unwrap());
    }

    #[test]
    fn test_mutated_recipient_fails_verification() {
        let (blockchain, _utxo_set, _sender, _recipient, tx, _dir) = spend_on_fresh_chain();

        let thief = Wallet::new().unwrap();
        let mut tampered = tx.clone();
        tampered.vout[0].pub_key_hash = hash_pub_key(thief.get_public_key());
        assert!(!tampered.verify(&blockchain).unwrap());
    }

    #[test]
    fn test_unknown_prev_tx_is_an_error() {
        let (blockchain, _utxo_set, sender, _recipient, tx, _dir) = spend_on_fresh_chain();

        let mut tampered = tx.clone();
        tampered.vin[0].txid = vec![0xABu8; 32];
        tampered.vin[0].pub_key = sender.get_public_key().to_vec();
        let result = tampered.verify(&blockchain);
        assert!(matches!(result, Err(BlockchainError::UnknownPrevTx)));
    }

    #[test]
    fn test_insufficient_funds_reports_amounts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let sender = Wallet::new().unwrap();
        let recipient = Wallet::new().unwrap();

        let db_path = temp_dir.path().join("chain");
        let blockchain = crate::core::Blockchain::create_blockchain_with_path(
            &sender.get_address(),
            db_path.to_str().unwrap(),
        )
        .unwrap();
        let utxo_set = crate::storage::UTXOSet::new(blockchain);
        utxo_set.reindex().unwrap();

        let result =
            Transaction::new_utxo_transaction(&sender, &recipient.get_address(), 999, &utxo_set);
        assert!(matches!(
            result,
            Err(BlockchainError::InsufficientFunds {
                required: 999,
                available: SUBSIDY,
            })
        ));
    }
}

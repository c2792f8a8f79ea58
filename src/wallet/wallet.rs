use crate::error::{BlockchainError, Result};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

// version byte + 20-byte RIPEMD-160 hash + 4-byte checksum
const ADDRESS_PAYLOAD_LEN: usize = 25;

/// An ECDSA P-256 key pair. The private key is kept as a PKCS#8 document,
/// the public key as ring's raw point encoding.
#[derive(Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::utils::new_key_pair()?;
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
                })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Wallet { pkcs8, public_key })
    }

    /// Base58( version ‖ pub_key_hash ‖ checksum )
    pub fn get_address(&self) -> String {
        let pub_key_hash = hash_pub_key(self.public_key.as_slice());
        let mut payload: Vec<u8> = vec![];
        payload.push(VERSION);
        payload.extend(pub_key_hash.as_slice());
        let checksum = checksum(payload.as_slice());
        payload.extend(checksum.as_slice());
        crate::utils::base58_encode(payload.as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

/// RIPEMD-160 of SHA-256 of the raw public key
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = crate::utils::sha256_digest(pub_key);
    crate::utils::ripemd160_digest(pub_key_sha256.as_slice())
}

// First four bytes of the double SHA-256 of the versioned payload.
fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = crate::utils::sha256_digest(payload);
    let second_sha = crate::utils::sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

/// An address is valid when it decodes to 25 bytes, carries the known
/// version byte and its checksum recomputes bit for bit.
pub fn validate_address(address: &str) -> bool {
    let payload = match crate::utils::base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    if payload.len() < ADDRESS_PAYLOAD_LEN {
        return false;
    }

    let version = payload[0];
    if version != VERSION {
        return false;
    }

    let actual_checksum = &payload[payload.len() - ADDRESS_CHECK_SUM_LEN..];
    let target_checksum = checksum(&payload[..payload.len() - ADDRESS_CHECK_SUM_LEN]);
    actual_checksum.eq(target_checksum.as_slice())
}

/// Rebuild the printable address for a known public-key hash
pub fn convert_address(pub_key_hash: &[u8]) -> String {
    let mut payload: Vec<u8> = vec![];
    payload.push(VERSION);
    payload.extend(pub_key_hash);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum.as_slice());
    crate::utils::base58_encode(payload.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_wallet_address_validates() {
        for _ in 0..4 {
            let wallet = Wallet::new().unwrap();
            assert!(validate_address(&wallet.get_address()));
        }
    }

    #[test]
    fn test_corrupted_address_fails() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();

        // Swap one character for another alphabet member
        let mut chars: Vec<char> = address.chars().collect();
        let replacement = if chars[3] == '2' { '3' } else { '2' };
        chars[3] = replacement;
        let corrupted: String = chars.into_iter().collect();
        assert!(!validate_address(&corrupted));
    }

    #[test]
    fn test_short_address_fails() {
        assert!(!validate_address("1abc"));
        assert!(!validate_address(""));
    }

    #[test]
    fn test_wrong_version_byte_fails() {
        let wallet = Wallet::new().unwrap();
        let pub_key_hash = hash_pub_key(wallet.get_public_key());

        let mut payload: Vec<u8> = vec![0x05];
        payload.extend(&pub_key_hash);
        let checksum = checksum(payload.as_slice());
        payload.extend(checksum);
        let address = crate::utils::base58_encode(&payload);
        assert!(!validate_address(&address));
    }

    #[test]
    fn test_convert_address_round_trip() {
        let wallet = Wallet::new().unwrap();
        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        assert_eq!(convert_address(&pub_key_hash), wallet.get_address());
    }

    #[test]
    fn test_pub_key_hash_is_20_bytes() {
        let wallet = Wallet::new().unwrap();
        assert_eq!(hash_pub_key(wallet.get_public_key()).len(), 20);
    }
}

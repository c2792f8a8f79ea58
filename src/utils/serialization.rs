// Bincode glue shared by the chain store, the UTXO index, the wallet file
// and the wire payload bodies. The standard configuration is the stable
// encoding both endpoints of a connection agree on.
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
    struct Sample {
        id: u64,
        label: String,
        payload: Vec<u8>,
    }

    #[test]
    fn test_round_trip() {
        let original = Sample {
            id: 7,
            label: "utxo".to_string(),
            payload: vec![0, 1, 2, 255],
        };

        let bytes = serialize(&original).unwrap();
        let decoded: Sample = deserialize(&bytes).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_empty_vec_round_trip() {
        let empty: Vec<u8> = vec![];
        let bytes = serialize(&empty).unwrap();
        let decoded: Vec<u8> = deserialize(&bytes).unwrap();
        assert_eq!(empty, decoded);
    }

    #[test]
    fn test_garbage_input_is_an_error() {
        let garbage = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let result: Result<Sample> = deserialize(&garbage);
        assert!(result.is_err());
    }
}

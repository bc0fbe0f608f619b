use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Compact binary encoding used for stored records.
pub fn encode_record<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::Codec(format!("Record encoding failed: {}", e)))
}

pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Codec(format!("Record decoding failed: {}", e)))
}

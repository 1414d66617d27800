//! CBOR codec for protocol payloads.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out)
        .map_err(|e| ProtocolError::encoding_failed(e.to_string()))?;
    Ok(out)
}

/// Decodes a value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR or do not match `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn map_roundtrip() {
        let mut value = BTreeMap::new();
        value.insert("cpu".to_string(), "0.4".to_string());
        let bytes = encode(&value).unwrap();
        let decoded: BTreeMap<String, String> = decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = decode::<BTreeMap<String, String>>(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, ProtocolError::DecodingFailed { .. }));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = encode(&vec!["a".to_string(), "b".to_string()]).unwrap();
        assert!(decode::<Vec<String>>(&bytes[..bytes.len() - 1]).is_err());
    }
}

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

/// Abstracts away the selection of the serialization format used for typed values and for
/// records written by file-backed stores.
pub trait Codec: Send + Sync + 'static {
    fn encode_into<T: Serialize, W: Write>(writer: W, value: &T) -> Result<(), CodecError>;

    fn decode_from<T: DeserializeOwned, R: Read>(reader: R) -> Result<T, CodecError>;

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
        let mut buffer = Vec::new();
        Self::encode_into(&mut buffer, value)?;
        Ok(buffer)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
        Self::decode_from(bytes)
    }
}

/// Human readable; the default for cached application values.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_into<T: Serialize, W: Write>(writer: W, value: &T) -> Result<(), CodecError> {
        Ok(serde_json::to_writer(writer, value)?)
    }

    fn decode_from<T: DeserializeOwned, R: Read>(reader: R) -> Result<T, CodecError> {
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Compact binary encoding, preferred for on-disk records.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode_into<T: Serialize, W: Write>(writer: W, value: &T) -> Result<(), CodecError> {
        Ok(bincode::serialize_into(writer, value)?)
    }

    fn decode_from<T: DeserializeOwned, R: Read>(reader: R) -> Result<T, CodecError> {
        Ok(bincode::deserialize_from(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        visits: u32,
    }

    #[test]
    fn json_is_plain_text() {
        let bytes = JsonCodec::encode(&User {
            name: "Alice".into(),
            visits: 3,
        })
        .unwrap();

        assert_eq!(bytes, br#"{"name":"Alice","visits":3}"#);
    }

    #[test]
    fn bincode_reads_back_what_it_wrote() {
        let user = User {
            name: "Bob".into(),
            visits: 7,
        };
        let bytes = BincodeCodec::encode(&user).unwrap();

        assert_eq!(BincodeCodec::decode::<User>(&bytes).unwrap(), user);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert!(matches!(
            JsonCodec::decode::<User>(b"not json"),
            Err(CodecError::Json(_))
        ));
        assert!(matches!(
            BincodeCodec::decode::<User>(&[1]),
            Err(CodecError::Bincode(_))
        ));
    }
}

use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::header;
use super::strip_header;
use super::NodeCodec;
use super::BINARY_TAG;
use super::HEADER_LEN;
use crate::CodecError;
use crate::DecodeError;
use crate::Result;

/// Compact binary payloads via bincode.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl NodeCodec for BinaryCodec {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Bytes> {
        let body = bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))?;
        let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
        buf.put_slice(&header(BINARY_TAG));
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<T> {
        let body = strip_header(bytes, BINARY_TAG)?;
        bincode::deserialize(body).map_err(|e| {
            DecodeError::Malformed {
                format: self.name(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

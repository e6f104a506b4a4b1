use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::header;
use super::strip_header;
use super::NodeCodec;
use super::JSON_TAG;
use crate::CodecError;
use crate::DecodeError;
use crate::Result;

/// JSON payloads, readable by other JSON-aware clients once the header is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl NodeCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Bytes> {
        let mut writer = BytesMut::new().writer();
        writer.get_mut().put_slice(&header(JSON_TAG));
        serde_json::to_writer(&mut writer, value).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(writer.into_inner().freeze())
    }

    fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<T> {
        let body = strip_header(bytes, JSON_TAG)?;
        serde_json::from_slice(body).map_err(|e| {
            DecodeError::Malformed {
                format: self.name(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::sniff;
use super::NodeCodec;
use crate::CodecError;
use crate::DecodeError;
use crate::Result;

/// Plain UTF-8 payloads without a header.
///
/// Only string values are accepted, and none starting like a codec header. This is the format shell tools write, so
/// nodes edited from a terminal stay readable.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl NodeCodec for TextCodec {
    fn name(&self) -> &'static str {
        "text"
    }

    fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Bytes> {
        match serde_json::to_value(value).map_err(|e| CodecError::Encode(e.to_string()))? {
            Value::String(s) => match sniff(s.as_bytes()) {
                Some(found) => Err(CodecError::Encode(format!(
                    "text value would read back as a {found} header"
                ))
                .into()),
                None => Ok(Bytes::from(s)),
            },
            other => Err(CodecError::Encode(format!("text codec only accepts strings, got {other}")).into()),
        }
    }

    fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<T> {
        if let Some(found) = sniff(bytes) {
            return Err(DecodeError::FormatMismatch {
                expected: self.name(),
                found,
            }
            .into());
        }
        let s = std::str::from_utf8(bytes).map_err(|e| DecodeError::Malformed {
            format: self.name(),
            reason: e.to_string(),
        })?;
        serde_json::from_value(Value::String(s.to_string())).map_err(|e| {
            DecodeError::Malformed {
                format: self.name(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

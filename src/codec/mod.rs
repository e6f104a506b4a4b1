//! Node payload codecs
//!
//! A codec turns application values into node payload bytes and back. The
//! codec is chosen when the client is built:
//!
//! - [`BinaryCodec`] - compact binary (bincode), header `ZC B 1`
//! - [`JsonCodec`] - JSON, header `ZC J 1`
//! - [`TextCodec`] - raw UTF-8 strings with no header, readable by shell tools
//!
//! Headered codecs validate the header before touching the body. A payload
//! written by a different codec or by an external tool fails with a
//! descriptive [`DecodeError`] instead of decoding into garbage:
//!
//! ```ignore
//! // "aaaa" written from a shell, read with the binary codec
//! Err(DecodeError::InvalidHeader { found: "61616161" })
//! ```

mod binary;
mod json;
mod text;

pub use binary::*;
pub use json::*;
pub use text::*;


use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::DecodeError;
use crate::Result;

/// Magic prefix of every headered payload
pub(crate) const MAGIC: [u8; 2] = [b'Z', b'C'];
pub(crate) const HEADER_LEN: usize = 4;
pub(crate) const FORMAT_VERSION: u8 = 1;

pub(crate) const BINARY_TAG: u8 = b'B';
pub(crate) const JSON_TAG: u8 = b'J';

/// Encoding capability used by the client for every node payload.
pub trait NodeCodec: Send + Sync + 'static {
    /// Short format name used in error messages
    fn name(&self) -> &'static str;

    fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Bytes>;

    fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<T>;
}

/// Codec selection, usable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Binary,
    Json,
    Text,
}

/// The built-in codecs behind one type.
#[derive(Debug, Clone, Copy)]
pub enum Codec {
    Binary(BinaryCodec),
    Json(JsonCodec),
    Text(TextCodec),
}

impl From<CodecKind> for Codec {
    fn from(kind: CodecKind) -> Self {
        match kind {
            CodecKind::Binary => Codec::Binary(BinaryCodec),
            CodecKind::Json => Codec::Json(JsonCodec),
            CodecKind::Text => Codec::Text(TextCodec),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        CodecKind::default().into()
    }
}

impl NodeCodec for Codec {
    fn name(&self) -> &'static str {
        match self {
            Codec::Binary(c) => c.name(),
            Codec::Json(c) => c.name(),
            Codec::Text(c) => c.name(),
        }
    }

    fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Bytes> {
        match self {
            Codec::Binary(c) => c.encode(value),
            Codec::Json(c) => c.encode(value),
            Codec::Text(c) => c.encode(value),
        }
    }

    fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<T> {
        match self {
            Codec::Binary(c) => c.decode(bytes),
            Codec::Json(c) => c.decode(bytes),
            Codec::Text(c) => c.decode(bytes),
        }
    }
}

pub(crate) fn header(tag: u8) -> [u8; HEADER_LEN] {
    [MAGIC[0], MAGIC[1], tag, FORMAT_VERSION]
}

fn format_of(tag: u8) -> &'static str {
    match tag {
        BINARY_TAG => "binary",
        JSON_TAG => "json",
        _ => "unknown",
    }
}

/// Name of the headered format `bytes` claims to be, if any.
pub(crate) fn sniff(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= HEADER_LEN && bytes[..2] == MAGIC {
        Some(format_of(bytes[2]))
    } else {
        None
    }
}

/// Checks the header of `bytes` against `tag` and returns the body.
pub(crate) fn strip_header<'a>(
    bytes: &'a [u8],
    tag: u8,
) -> std::result::Result<&'a [u8], DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() < HEADER_LEN || bytes[..2] != MAGIC {
        return Err(DecodeError::InvalidHeader {
            found: hex_prefix(bytes),
        });
    }
    if bytes[2] != tag {
        return Err(DecodeError::FormatMismatch {
            expected: format_of(tag),
            found: format_of(bytes[2]),
        });
    }
    if bytes[3] != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            format: format_of(tag),
            version: bytes[3],
        });
    }
    Ok(&bytes[HEADER_LEN..])
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(HEADER_LEN).map(|b| format!("{b:02x}")).collect()
}

//! # Key and Value Codecs
//!
//! Purpose: Turn keys and values into the byte strings sent to the store and
//! back again, independently of which driver carries them.
//!
//! ## Design Principles
//! 1. **Fixed Key Encoding**: Keys and hash fields are always UTF-8, so the
//!    same text maps to the same bytes on every driver and every host.
//! 2. **Strategy Pattern**: Values go through a `ValueCodec` chosen when the
//!    client is built; commands never see the concrete format.
//! 3. **Serde Everywhere**: Any `Serialize`/`DeserializeOwned` type is a value.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecResult;

/// Fixed UTF-8 codec for keys, hash fields, channels, and patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyCodec;

impl KeyCodec {
    /// Borrows the key's bytes. No allocation, no failure.
    #[inline]
    pub fn encode(key: &str) -> &[u8] {
        key.as_bytes()
    }

    /// Decodes key bytes read back from the store.
    pub fn decode(bytes: &[u8]) -> CodecResult<String> {
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }
}

/// Pluggable value serialization.
///
/// Implementations must satisfy `decode(encode(v)) == v` for every type they
/// accept. The type parameter of `decode` is the target type hint.
pub trait ValueCodec: Send + Sync + 'static {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T>;
}

/// Default codec: JSON text.
///
/// Integers and floats encode to their plain decimal form, so values written
/// through this codec stay compatible with INCRBY/INCRBYFLOAT on the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Compact binary codec backed by bincode.
///
/// Smaller payloads than JSON, but values are opaque to server-side
/// arithmetic and scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl ValueCodec for BincodeCodec {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        Ok(bincode::deserialize(bytes)?)
    }
}

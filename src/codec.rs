//! Payload codec for argument values, return values and wire envelopes.
//!
//! Values are serialized with MessagePack using named struct fields, so that payloads stay
//! readable by peers whose types gained or reordered fields.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CodecError;

/// Serializes a value into a byte vector.
pub fn encode<T>(value: &T) -> Result<Vec<u8>, CodecError>
where
    T: Serialize + ?Sized,
{
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Deserializes a value from the given byte slice.
pub fn decode<T>(bytes: &[u8]) -> Result<T, CodecError>
where
    T: DeserializeOwned,
{
    Ok(rmp_serde::from_slice(bytes)?)
}

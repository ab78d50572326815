//! Encoding of live containers into persisted blobs
//!
//! Blobs are a single format version byte followed by MessagePack. Anything that does not
//! decode cleanly is a [`CodecError`], which sync code treats exactly like a miss.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::domain::{EnderChestContents, InventoryContents};

/// Current blob format
pub const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum CodecError {
	#[error("Failed to encode payload: {0}")]
	Encode(#[from] rmp_serde::encode::Error),

	#[error("Failed to decode payload: {0}")]
	Decode(#[from] rmp_serde::decode::Error),

	#[error("Unsupported payload format version {0}")]
	UnsupportedVersion(u8),

	#[error("Payload is empty")]
	Empty,
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Converts containers to and from opaque blobs
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializationCodec;

impl SerializationCodec {
	pub fn encode_inventory(&self, inventory: &InventoryContents) -> Result<Vec<u8>> {
		encode(inventory)
	}

	pub fn decode_inventory(&self, blob: &[u8]) -> Result<InventoryContents> {
		decode(blob)
	}

	pub fn encode_ender_chest(&self, ender_chest: &EnderChestContents) -> Result<Vec<u8>> {
		encode(ender_chest)
	}

	pub fn decode_ender_chest(&self, blob: &[u8]) -> Result<EnderChestContents> {
		decode(blob)
	}
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
	let mut blob = vec![FORMAT_VERSION];
	// Named fields keep blobs readable across struct reordering
	rmp_serde::encode::write_named(&mut blob, value)?;
	Ok(blob)
}

fn decode<T: DeserializeOwned>(blob: &[u8]) -> Result<T> {
	let (version, body) = blob.split_first().ok_or(CodecError::Empty)?;
	if *version != FORMAT_VERSION {
		return Err(CodecError::UnsupportedVersion(*version));
	}
	Ok(rmp_serde::from_slice(body)?)
}

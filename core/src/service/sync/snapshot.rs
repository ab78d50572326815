//! Copies of player state taken at join and quit time

use crate::domain::{Balance, DataKind, EnderChestContents, GroupName, InventoryContents};
use crate::infra::codec::{CodecError, SerializationCodec};
use crate::infra::db::Payload;
use std::time::Instant;

/// Pre-clear copy of live state, only used to restore after a failed apply
#[derive(Debug, Clone)]
pub struct BackupSnapshot {
	pub inventory: Option<InventoryContents>,
	/// Only captured when ender chest sync is enabled for this server
	pub ender_chest: Option<EnderChestContents>,
	/// Only captured when balance sync is enabled and a provider is available
	pub balance: Option<Balance>,
	pub taken_at: Instant,
}

/// Where the load step reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
	/// The server's groups in order; inventory falls back through all of them
	Groups(Vec<GroupName>),
	/// One fixed group, no fallback
	Fixed(GroupName),
}

impl LoadSource {
	pub fn primary(&self) -> Option<&GroupName> {
		match self {
			LoadSource::Groups(groups) => groups.first(),
			LoadSource::Fixed(group) => Some(group),
		}
	}

	/// Groups consulted for inventory, in order
	pub fn inventory_chain(&self) -> &[GroupName] {
		match self {
			LoadSource::Groups(groups) => groups,
			LoadSource::Fixed(group) => std::slice::from_ref(group),
		}
	}
}

/// Result of the load step; `None` means a miss for that kind
#[derive(Debug, Clone, Default)]
pub struct LoadedData {
	/// Decoded inventory and the group it came from
	pub inventory: Option<(GroupName, InventoryContents)>,
	pub ender_chest: Option<EnderChestContents>,
	pub balance: Option<Balance>,
}

impl LoadedData {
	pub fn is_empty(&self) -> bool {
		self.inventory.is_none() && self.ender_chest.is_none() && self.balance.is_none()
	}
}

/// Live state captured for saving, at quit or on a checkpoint
#[derive(Debug, Clone, PartialEq)]
pub struct SaveSnapshot {
	pub inventory: Option<InventoryContents>,
	pub ender_chest: Option<EnderChestContents>,
	pub balance: Option<Balance>,
}

impl SaveSnapshot {
	pub fn is_empty(&self) -> bool {
		self.inventory.is_none() && self.ender_chest.is_none() && self.balance.is_none()
	}

	/// Encode every captured kind; a kind that fails to encode is reported, not fatal
	pub fn into_payloads(
		self,
		codec: &SerializationCodec,
	) -> (Vec<Payload>, Vec<(DataKind, CodecError)>) {
		let mut payloads = Vec::with_capacity(3);
		let mut failures = Vec::new();

		if let Some(inventory) = &self.inventory {
			match codec.encode_inventory(inventory) {
				Ok(blob) => payloads.push(Payload::Inventory(blob)),
				Err(e) => failures.push((DataKind::Inventory, e)),
			}
		}
		if let Some(ender_chest) = &self.ender_chest {
			match codec.encode_ender_chest(ender_chest) {
				Ok(blob) => payloads.push(Payload::EnderChest(blob)),
				Err(e) => failures.push((DataKind::EnderChest, e)),
			}
		}
		if let Some(balance) = self.balance {
			payloads.push(Payload::Balance(balance));
		}

		(payloads, failures)
	}
}

//! Domain models shared by every layer
//!
//! Identities are thin newtypes so a group name can never be passed where a server
//! identity is expected. Live player state (items, balances) lives in the submodules.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod balance;
pub mod item;

pub use balance::{Balance, BalanceParseError};
pub use item::{EnderChestContents, InventoryContents, ItemStack};

/// Stable identity of a player across every server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
	pub fn new(id: Uuid) -> Self {
		Self(id)
	}

	pub fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl From<Uuid> for PlayerId {
	fn from(id: Uuid) -> Self {
		Self(id)
	}
}

impl fmt::Display for PlayerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Identity of the running server process, fixed once configuration is first loaded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ServerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ServerId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

/// Name of a sharing group: the unit under which player state is pooled
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(String);

impl GroupName {
	pub fn new(name: impl Into<String>) -> Self {
		Self(name.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for GroupName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for GroupName {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}

/// The independently synchronized kinds of player state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
	Inventory,
	EnderChest,
	Balance,
}

impl DataKind {
	pub const ALL: [DataKind; 3] = [DataKind::Inventory, DataKind::EnderChest, DataKind::Balance];

	pub fn as_str(&self) -> &'static str {
		match self {
			DataKind::Inventory => "inventory",
			DataKind::EnderChest => "enderchest",
			DataKind::Balance => "balance",
		}
	}
}

impl fmt::Display for DataKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

//! Player-held item containers as the host hands them to us

use serde::{Deserialize, Serialize};

/// A stack of items in one slot
///
/// `meta` carries whatever the host needs to rebuild the stack exactly (enchantments,
/// names, durability); it is never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
	pub material: String,
	pub amount: u32,
	#[serde(default, skip_serializing_if = "Option::is_none", with = "serde_bytes")]
	pub meta: Option<Vec<u8>>,
}

impl ItemStack {
	pub fn new(material: impl Into<String>, amount: u32) -> Self {
		Self {
			material: material.into(),
			amount,
			meta: None,
		}
	}

	pub fn with_meta(mut self, meta: Vec<u8>) -> Self {
		self.meta = Some(meta);
		self
	}

	/// Air and zero-sized stacks occupy a slot without holding anything
	pub fn is_empty(&self) -> bool {
		self.amount == 0 || self.material.eq_ignore_ascii_case("air")
	}
}

/// Main storage, armor slots and off-hand of a player inventory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryContents {
	pub storage: Vec<Option<ItemStack>>,
	pub armor: Vec<Option<ItemStack>>,
	pub off_hand: Option<ItemStack>,
}

impl InventoryContents {
	pub fn new(
		storage: Vec<Option<ItemStack>>,
		armor: Vec<Option<ItemStack>>,
		off_hand: Option<ItemStack>,
	) -> Self {
		Self {
			storage,
			armor,
			off_hand,
		}
	}

	/// Every non-empty stack, storage first, then armor, then off-hand
	pub fn items(&self) -> impl Iterator<Item = &ItemStack> {
		self.storage
			.iter()
			.chain(self.armor.iter())
			.chain(std::iter::once(&self.off_hand))
			.filter_map(|slot| slot.as_ref())
			.filter(|item| !item.is_empty())
	}

	pub fn is_empty(&self) -> bool {
		self.items().next().is_none()
	}

	/// Place `items` into free storage slots in order, returning the stacks that did not fit
	pub fn fill_free_slots(&mut self, items: Vec<ItemStack>) -> Vec<ItemStack> {
		let mut items = items.into_iter();
		for slot in self.storage.iter_mut() {
			if slot.as_ref().is_some_and(|item| !item.is_empty()) {
				continue;
			}
			match items.next() {
				Some(item) => *slot = Some(item),
				None => return Vec::new(),
			}
		}
		items.collect()
	}
}

/// Contents of the per-player ender chest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnderChestContents {
	pub slots: Vec<Option<ItemStack>>,
}

impl EnderChestContents {
	pub fn new(slots: Vec<Option<ItemStack>>) -> Self {
		Self { slots }
	}

	pub fn items(&self) -> impl Iterator<Item = &ItemStack> {
		self.slots
			.iter()
			.filter_map(|slot| slot.as_ref())
			.filter(|item| !item.is_empty())
	}

	pub fn is_empty(&self) -> bool {
		self.items().next().is_none()
	}
}

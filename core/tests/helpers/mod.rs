//! Test helper modules for integration tests

#![allow(dead_code)]

use invshare_core::{
	config::DatabaseConfig,
	domain::{EnderChestContents, InventoryContents, ItemStack},
	infra::{
		codec::SerializationCodec,
		db::{entities, Payload, StorageEngine},
	},
	testing::{inventory_of, STORE_FILE},
	Balance, DataKind, GroupName, PlayerId,
};
use sea_orm::{Database, EntityTrait, PaginatorTrait};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub fn new_player() -> PlayerId {
	PlayerId::new(Uuid::new_v4())
}

/// A sword and three bread
pub fn sword_and_bread() -> InventoryContents {
	inventory_of(&[
		ItemStack::new("diamond_sword", 1).with_meta(vec![0x0a, 0x01]),
		ItemStack::new("bread", 3),
	])
}

pub fn ender_chest_of(items: &[ItemStack]) -> EnderChestContents {
	let mut ender_chest = invshare_core::testing::empty_ender_chest();
	for (slot, item) in ender_chest.slots.iter_mut().zip(items) {
		*slot = Some(item.clone());
	}
	ender_chest
}

/// Direct access to the store a test's servers share, bypassing every server
pub struct StoreProbe {
	path: PathBuf,
	storage: StorageEngine,
	codec: SerializationCodec,
}

impl StoreProbe {
	pub async fn open(dir: &Path) -> Self {
		let path = dir.join(STORE_FILE);
		let storage = StorageEngine::new(DatabaseConfig::sqlite(&path));
		storage.connect().await.unwrap();
		Self {
			path,
			storage,
			codec: SerializationCodec,
		}
	}

	pub async fn seed_inventory(&self, player: &PlayerId, group: &str, inventory: &InventoryContents) {
		let blob = self.codec.encode_inventory(inventory).unwrap();
		assert!(
			self.storage
				.save(player, &GroupName::new(group), &Payload::Inventory(blob))
				.await
		);
	}

	pub async fn seed_ender_chest(
		&self,
		player: &PlayerId,
		group: &str,
		ender_chest: &EnderChestContents,
	) {
		let blob = self.codec.encode_ender_chest(ender_chest).unwrap();
		assert!(
			self.storage
				.save(player, &GroupName::new(group), &Payload::EnderChest(blob))
				.await
		);
	}

	pub async fn seed_balance(&self, player: &PlayerId, group: &str, balance: Balance) {
		assert!(
			self.storage
				.save(player, &GroupName::new(group), &Payload::Balance(balance))
				.await
		);
	}

	pub async fn inventory(&self, player: &PlayerId, group: &str) -> Option<InventoryContents> {
		match self
			.storage
			.load(player, &GroupName::new(group), DataKind::Inventory)
			.await
		{
			Some(Payload::Inventory(blob)) => Some(self.codec.decode_inventory(&blob).unwrap()),
			_ => None,
		}
	}

	pub async fn ender_chest(&self, player: &PlayerId, group: &str) -> Option<EnderChestContents> {
		match self
			.storage
			.load(player, &GroupName::new(group), DataKind::EnderChest)
			.await
		{
			Some(Payload::EnderChest(blob)) => Some(self.codec.decode_ender_chest(&blob).unwrap()),
			_ => None,
		}
	}

	pub async fn balance(&self, player: &PlayerId, group: &str) -> Option<Balance> {
		match self
			.storage
			.load(player, &GroupName::new(group), DataKind::Balance)
			.await
		{
			Some(Payload::Balance(balance)) => Some(balance),
			_ => None,
		}
	}

	/// Number of rows stored for `kind` across every player and group
	pub async fn count_rows(&self, kind: DataKind) -> u64 {
		let url = DatabaseConfig::sqlite(&self.path).connection_url().unwrap();
		let db = Database::connect(url).await.unwrap();
		let count = match kind {
			DataKind::Inventory => entities::InventoryData::find().count(&db).await,
			DataKind::EnderChest => entities::EnderChestData::find().count(&db).await,
			DataKind::Balance => entities::EconomyData::find().count(&db).await,
		};
		db.close().await.unwrap();
		count.unwrap()
	}

	pub async fn close(&self) {
		self.storage.disconnect().await;
	}
}

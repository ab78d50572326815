//! Inventory entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "inventory_data")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub uuid: String,
	#[sea_orm(primary_key, auto_increment = false)]
	pub server_group: String,
	pub inventory: Vec<u8>, // Encoded InventoryContents
	pub last_updated: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

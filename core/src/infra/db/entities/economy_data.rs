//! Balance entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "economy_data")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub uuid: String,
	#[sea_orm(primary_key, auto_increment = false)]
	pub server_group: String,
	#[sea_orm(column_type = "Decimal(Some((16, 2)))")]
	pub balance: Decimal,
	pub last_updated: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

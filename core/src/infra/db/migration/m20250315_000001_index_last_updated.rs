//! Index `last_updated` so operators can find stale or recently touched rows

use super::m20250301_000001_create_player_data::{EconomyData, EnderchestData, InventoryData};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_index(
				Index::create()
					.name("idx_inventory_data_last_updated")
					.table(InventoryData::Table)
					.col(InventoryData::LastUpdated)
					.if_not_exists()
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_enderchest_data_last_updated")
					.table(EnderchestData::Table)
					.col(EnderchestData::LastUpdated)
					.if_not_exists()
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_economy_data_last_updated")
					.table(EconomyData::Table)
					.col(EconomyData::LastUpdated)
					.if_not_exists()
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_index(
				Index::drop()
					.name("idx_economy_data_last_updated")
					.table(EconomyData::Table)
					.to_owned(),
			)
			.await?;
		manager
			.drop_index(
				Index::drop()
					.name("idx_enderchest_data_last_updated")
					.table(EnderchestData::Table)
					.to_owned(),
			)
			.await?;
		manager
			.drop_index(
				Index::drop()
					.name("idx_inventory_data_last_updated")
					.table(InventoryData::Table)
					.to_owned(),
			)
			.await?;
		Ok(())
	}
}

//! Player data tables
//!
//! One table per synchronized kind, each keyed by `(uuid, server_group)`. Payload columns
//! must hold large encoded containers, so MySQL gets LONGBLOB rather than the default BLOB.

use crate::config::MAX_GROUP_NAME_LEN;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		let backend = manager.get_database_backend();

		// Create inventory_data table
		manager
			.create_table(
				Table::create()
					.table(InventoryData::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(InventoryData::Uuid)
							.string_len(36)
							.not_null(),
					)
					.col(
						ColumnDef::new(InventoryData::ServerGroup)
							.string_len(MAX_GROUP_NAME_LEN as u32)
							.not_null(),
					)
					.col(&mut payload_column(backend, InventoryData::Inventory))
					.col(
						ColumnDef::new(InventoryData::LastUpdated)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.primary_key(
						Index::create()
							.col(InventoryData::Uuid)
							.col(InventoryData::ServerGroup),
					)
					.to_owned(),
			)
			.await?;

		// Create enderchest_data table
		manager
			.create_table(
				Table::create()
					.table(EnderchestData::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(EnderchestData::Uuid)
							.string_len(36)
							.not_null(),
					)
					.col(
						ColumnDef::new(EnderchestData::ServerGroup)
							.string_len(MAX_GROUP_NAME_LEN as u32)
							.not_null(),
					)
					.col(&mut payload_column(backend, EnderchestData::Enderchest))
					.col(
						ColumnDef::new(EnderchestData::LastUpdated)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.primary_key(
						Index::create()
							.col(EnderchestData::Uuid)
							.col(EnderchestData::ServerGroup),
					)
					.to_owned(),
			)
			.await?;

		// Create economy_data table
		manager
			.create_table(
				Table::create()
					.table(EconomyData::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(EconomyData::Uuid)
							.string_len(36)
							.not_null(),
					)
					.col(
						ColumnDef::new(EconomyData::ServerGroup)
							.string_len(MAX_GROUP_NAME_LEN as u32)
							.not_null(),
					)
					.col(
						ColumnDef::new(EconomyData::Balance)
							.decimal_len(16, 2)
							.not_null()
							.default(0),
					)
					.col(
						ColumnDef::new(EconomyData::LastUpdated)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.primary_key(
						Index::create()
							.col(EconomyData::Uuid)
							.col(EconomyData::ServerGroup),
					)
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(EconomyData::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(EnderchestData::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(InventoryData::Table).to_owned())
			.await?;
		Ok(())
	}
}

fn payload_column<T: IntoIden>(backend: sea_orm::DatabaseBackend, name: T) -> ColumnDef {
	let mut column = ColumnDef::new(name);
	match backend {
		sea_orm::DatabaseBackend::MySql => column.custom(Alias::new("LONGBLOB")),
		_ => column.blob(),
	};
	column.not_null().to_owned()
}

#[derive(DeriveIden)]
pub(super) enum InventoryData {
	Table,
	Uuid,
	ServerGroup,
	Inventory,
	LastUpdated,
}

#[derive(DeriveIden)]
pub(super) enum EnderchestData {
	Table,
	Uuid,
	ServerGroup,
	Enderchest,
	LastUpdated,
}

#[derive(DeriveIden)]
pub(super) enum EconomyData {
	Table,
	Uuid,
	ServerGroup,
	Balance,
	LastUpdated,
}

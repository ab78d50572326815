//! Database migrations

use sea_orm_migration::prelude::*;

mod m20250301_000001_create_player_data;
mod m20250315_000001_index_last_updated;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
	fn migrations() -> Vec<Box<dyn MigrationTrait>> {
		vec![
			Box::new(m20250301_000001_create_player_data::Migration),
			Box::new(m20250315_000001_index_last_updated::Migration),
		]
	}
}

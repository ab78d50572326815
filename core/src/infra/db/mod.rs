//! Shared store access using SeaORM
//!
//! [`StorageEngine`] is the only component that talks to the shared store. Every public
//! operation first runs a bounded liveness probe and at most one reconnect; when the store
//! stays unreachable the operation degrades to `false` / `None` and the cause is logged.
//! Nothing below this boundary surfaces an error to sync code, so a miss and a failed read
//! look the same to callers.

use crate::config::{ConfigError, DatabaseConfig, DatabaseEngine};
use crate::domain::{Balance, DataKind, GroupName, PlayerId};
use chrono::Utc;
use sea_orm::{
	sea_query::OnConflict, ActiveValue::Set, ConnectOptions, Database as SeaDatabase,
	DatabaseConnection, DbErr, EntityTrait,
};
use sea_orm_migration::MigratorTrait;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

pub mod entities;
pub mod migration;

use entities::{economy_data, enderchest_data, inventory_data};

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Invalid store configuration: {0}")]
	Config(#[from] ConfigError),

	#[error("Failed to create store directory: {0}")]
	Io(#[from] std::io::Error),

	#[error("Failed to connect to the store: {0}")]
	Connect(#[source] DbErr),

	#[error("Failed to provision store schema: {0}")]
	Migrate(#[source] DbErr),

	#[error("Store is closed")]
	Closed,
}

/// A value as it is persisted for one `(player, group, kind)` key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
	Inventory(Vec<u8>),
	EnderChest(Vec<u8>),
	Balance(Balance),
}

impl Payload {
	pub fn kind(&self) -> DataKind {
		match self {
			Payload::Inventory(_) => DataKind::Inventory,
			Payload::EnderChest(_) => DataKind::EnderChest,
			Payload::Balance(_) => DataKind::Balance,
		}
	}
}

/// Owner of the shared store connection
pub struct StorageEngine {
	config: parking_lot::RwLock<DatabaseConfig>,
	conn: RwLock<Option<DatabaseConnection>>,
	/// Serializes reconnect attempts so a dead store is not hammered by every caller at once
	reconnect_lock: Mutex<()>,
	closed: AtomicBool,
}

impl StorageEngine {
	pub fn new(config: DatabaseConfig) -> Self {
		Self {
			config: parking_lot::RwLock::new(config),
			conn: RwLock::new(None),
			reconnect_lock: Mutex::new(()),
			closed: AtomicBool::new(false),
		}
	}

	/// Connect and provision the schema
	///
	/// Callers treat a failure here at startup as fatal.
	pub async fn connect(&self) -> Result<(), StorageError> {
		let config = self.config.read().clone();
		let conn = open_connection(&config).await?;

		*self.conn.write().await = Some(conn);
		self.closed.store(false, Ordering::Release);

		info!(
			engine = ?config.engine,
			host = %config.host,
			database = %config.name,
			"Connected to shared store"
		);
		Ok(())
	}

	/// Swap to a new configuration, keeping the current connection if the new one fails
	pub async fn reconfigure(&self, config: DatabaseConfig) -> Result<(), StorageError> {
		let _guard = self.reconnect_lock.lock().await;

		let conn = open_connection(&config).await?;
		let previous = self.conn.write().await.replace(conn);
		*self.config.write() = config;
		self.closed.store(false, Ordering::Release);

		if let Some(previous) = previous {
			if let Err(e) = previous.close().await {
				debug!(error = %e, "Failed to close previous store connection");
			}
		}

		info!("Store connection re-established with new configuration");
		Ok(())
	}

	/// Bounded liveness probe, then at most one reconnect attempt
	pub async fn ensure_connection(&self) -> bool {
		if self.closed.load(Ordering::Acquire) {
			return false;
		}

		if self.probe().await {
			return true;
		}

		let _guard = self.reconnect_lock.lock().await;

		// Another caller may have reconnected while we waited
		if self.probe().await {
			return true;
		}

		let config = self.config.read().clone();
		warn!(host = %config.host, "Store connection lost, attempting to reconnect");

		match open_connection(&config).await {
			Ok(conn) => {
				*self.conn.write().await = Some(conn);
				info!("Reconnected to shared store");
				true
			}
			Err(e) => {
				error!(error = %e, "Failed to reconnect to shared store");
				false
			}
		}
	}

	async fn probe(&self) -> bool {
		let timeout = self.config.read().probe_timeout();
		let conn = self.conn.read().await;
		let Some(conn) = conn.as_ref() else {
			return false;
		};

		match tokio::time::timeout(timeout, conn.ping()).await {
			Ok(Ok(())) => true,
			Ok(Err(e)) => {
				warn!(error = %e, "Store liveness probe failed");
				false
			}
			Err(_) => {
				warn!(timeout_secs = timeout.as_secs(), "Store liveness probe timed out");
				false
			}
		}
	}

	pub async fn is_connected(&self) -> bool {
		!self.closed.load(Ordering::Acquire) && self.conn.read().await.is_some()
	}

	/// Upsert the value for `(player, group, payload.kind())`
	///
	/// Returns `false` on any failure; the cause is logged here.
	pub async fn save(&self, player: &PlayerId, group: &GroupName, payload: &Payload) -> bool {
		let kind = payload.kind();
		if !self.ensure_connection().await {
			warn!(player = %player, group = %group, kind = %kind, "Store unavailable, save skipped");
			return false;
		}

		let conn = self.conn.read().await;
		let Some(conn) = conn.as_ref() else {
			return false;
		};

		match upsert(conn, player, group, payload).await {
			Ok(()) => {
				debug!(player = %player, group = %group, kind = %kind, "Saved player data");
				true
			}
			Err(e) => {
				error!(
					player = %player,
					group = %group,
					kind = %kind,
					error = %e,
					"Failed to save player data"
				);
				false
			}
		}
	}

	/// Look up the value for `(player, group, kind)`
	///
	/// Returns `None` on a miss and on any failure alike.
	pub async fn load(&self, player: &PlayerId, group: &GroupName, kind: DataKind) -> Option<Payload> {
		if !self.ensure_connection().await {
			warn!(player = %player, group = %group, kind = %kind, "Store unavailable, load skipped");
			return None;
		}

		let conn = self.conn.read().await;
		let conn = conn.as_ref()?;

		match lookup(conn, player, group, kind).await {
			Ok(found) => found,
			Err(e) => {
				error!(
					player = %player,
					group = %group,
					kind = %kind,
					error = %e,
					"Failed to load player data"
				);
				None
			}
		}
	}

	/// Close the connection; later operations degrade instead of reconnecting
	pub async fn disconnect(&self) {
		self.closed.store(true, Ordering::Release);
		let _guard = self.reconnect_lock.lock().await;

		if let Some(conn) = self.conn.write().await.take() {
			match conn.close().await {
				Ok(()) => info!("Disconnected from shared store"),
				Err(e) => warn!(error = %e, "Error while closing store connection"),
			}
		}
	}
}

async fn open_connection(config: &DatabaseConfig) -> Result<DatabaseConnection, StorageError> {
	let url = config.connection_url()?;

	if config.engine == DatabaseEngine::Sqlite {
		if let Some(parent) = config.sqlite_path.as_ref().and_then(|p| p.parent()) {
			tokio::fs::create_dir_all(parent).await?;
		}
	}

	let mut opt = ConnectOptions::new(url);
	opt.max_connections(config.max_connections)
		.min_connections(1)
		.connect_timeout(config.connect_timeout())
		.acquire_timeout(config.connect_timeout())
		.sqlx_logging(false); // We use tracing instead

	let conn = SeaDatabase::connect(opt)
		.await
		.map_err(StorageError::Connect)?;

	migration::Migrator::up(&conn, None)
		.await
		.map_err(StorageError::Migrate)?;

	Ok(conn)
}

async fn upsert(
	conn: &DatabaseConnection,
	player: &PlayerId,
	group: &GroupName,
	payload: &Payload,
) -> Result<(), DbErr> {
	let uuid = player.to_string();
	let server_group = group.as_str().to_owned();
	let now = Utc::now();

	match payload {
		Payload::Inventory(bytes) => {
			let model = inventory_data::ActiveModel {
				uuid: Set(uuid),
				server_group: Set(server_group),
				inventory: Set(bytes.clone()),
				last_updated: Set(now),
			};
			inventory_data::Entity::insert(model)
				.on_conflict(
					OnConflict::columns([
						inventory_data::Column::Uuid,
						inventory_data::Column::ServerGroup,
					])
					.update_columns([
						inventory_data::Column::Inventory,
						inventory_data::Column::LastUpdated,
					])
					.to_owned(),
				)
				.exec_without_returning(conn)
				.await?;
		}
		Payload::EnderChest(bytes) => {
			let model = enderchest_data::ActiveModel {
				uuid: Set(uuid),
				server_group: Set(server_group),
				enderchest: Set(bytes.clone()),
				last_updated: Set(now),
			};
			enderchest_data::Entity::insert(model)
				.on_conflict(
					OnConflict::columns([
						enderchest_data::Column::Uuid,
						enderchest_data::Column::ServerGroup,
					])
					.update_columns([
						enderchest_data::Column::Enderchest,
						enderchest_data::Column::LastUpdated,
					])
					.to_owned(),
				)
				.exec_without_returning(conn)
				.await?;
		}
		Payload::Balance(balance) => {
			let model = economy_data::ActiveModel {
				uuid: Set(uuid),
				server_group: Set(server_group),
				balance: Set((*balance).into()),
				last_updated: Set(now),
			};
			economy_data::Entity::insert(model)
				.on_conflict(
					OnConflict::columns([
						economy_data::Column::Uuid,
						economy_data::Column::ServerGroup,
					])
					.update_columns([
						economy_data::Column::Balance,
						economy_data::Column::LastUpdated,
					])
					.to_owned(),
				)
				.exec_without_returning(conn)
				.await?;
		}
	}

	Ok(())
}

async fn lookup(
	conn: &DatabaseConnection,
	player: &PlayerId,
	group: &GroupName,
	kind: DataKind,
) -> Result<Option<Payload>, DbErr> {
	let key = (player.to_string(), group.as_str().to_owned());

	let found = match kind {
		DataKind::Inventory => inventory_data::Entity::find_by_id(key)
			.one(conn)
			.await?
			.map(|row| Payload::Inventory(row.inventory)),
		DataKind::EnderChest => enderchest_data::Entity::find_by_id(key)
			.one(conn)
			.await?
			.map(|row| Payload::EnderChest(row.enderchest)),
		DataKind::Balance => match economy_data::Entity::find_by_id(key).one(conn).await? {
			Some(row) => Some(Payload::Balance(Balance::from_decimal(row.balance).ok_or_else(
				|| DbErr::Custom(format!("Stored balance {} is out of range", row.balance)),
			)?)),
			None => None,
		},
	};

	Ok(found)
}

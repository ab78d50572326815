//! Keeps player inventories, ender chests and balances consistent across game servers that
//! share one store.
//!
//! The host embeds an [`InventoryShare`], forwards player lifecycle events to its
//! [`SyncCoordinator`], and drains the owner-thread queue every tick.

pub mod config;
pub mod domain;
pub mod host;
pub mod infra;
pub mod logging;
pub mod ops;
pub mod service;
pub mod testing;

use crate::config::{AppConfig, ConfigError};
use crate::host::PlayerHost;
use crate::infra::db::{StorageEngine, StorageError};
use crate::infra::scheduler::TaskScheduler;
use crate::service::{
	EconomyAdapter, EconomyProvider, Settings, SettingsHandle, SyncCoordinator,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub use crate::domain::{Balance, DataKind, GroupName, PlayerId, ServerId};
pub use crate::infra::scheduler::{MainThreadQueue, QueueScheduler};

#[derive(Debug, Error)]
pub enum StartupError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error("Shared store unavailable at startup: {0}")]
	Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum ReloadError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error("Failed to reconnect with reloaded configuration: {0}")]
	Storage(#[from] StorageError),
}

/// Composition root owning every service
pub struct InventoryShare {
	config_path: PathBuf,
	settings: Arc<SettingsHandle>,
	storage: Arc<StorageEngine>,
	economy: Arc<EconomyAdapter>,
	coordinator: Arc<SyncCoordinator>,
}

impl InventoryShare {
	/// Load configuration from `config_path` and connect to the store
	///
	/// Fails when the store cannot be reached: there is no degraded mode without it.
	pub async fn start(
		config_path: impl Into<PathBuf>,
		host: Arc<dyn PlayerHost>,
		economy: Option<Arc<dyn EconomyProvider>>,
		scheduler: Arc<dyn TaskScheduler>,
	) -> Result<Arc<Self>, StartupError> {
		let config_path = config_path.into();
		let config = AppConfig::load_from(&config_path)?;

		info!(server = %config.server_id(), "Starting inventory share");

		let settings = Arc::new(SettingsHandle::new(config));
		let current = settings.current();
		if current.groups.is_empty() {
			warn!(
				server = %current.server,
				"Server is not in any sharing group, synchronization is disabled"
			);
		} else {
			info!(
				groups = ?current.groups,
				peers = ?current.resolver.peers_of(&current.server),
				"Sharing groups resolved"
			);
		}

		let storage = Arc::new(StorageEngine::new(current.config.database.clone()));
		storage.connect().await?;

		let economy = Arc::new(EconomyAdapter::new(economy, storage.clone()));
		if current.profile.sync_economy && !economy.is_available() {
			warn!("Balance sync is enabled but no economy provider is available, skipping balances");
		}

		let coordinator = SyncCoordinator::new(
			host,
			storage.clone(),
			economy.clone(),
			scheduler,
			settings.clone(),
		);

		Ok(Arc::new(Self {
			config_path,
			settings,
			storage,
			economy,
			coordinator,
		}))
	}

	pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
		&self.coordinator
	}

	pub fn settings(&self) -> Arc<Settings> {
		self.settings.current()
	}

	pub fn economy(&self) -> &EconomyAdapter {
		&self.economy
	}

	pub fn config_path(&self) -> &Path {
		&self.config_path
	}

	/// Re-read configuration and re-establish the store connection
	///
	/// Nothing changes if the file is invalid or the new store cannot be reached. The server
	/// identity is kept from startup.
	pub async fn reload(&self) -> Result<Arc<Settings>, ReloadError> {
		let config = AppConfig::load_from(&self.config_path)?;
		self.storage.reconfigure(config.database.clone()).await?;

		let settings = self.settings.replace(config);
		info!(groups = ?settings.groups, "Configuration reloaded");
		Ok(settings)
	}

	/// Persist every online player, wait for outstanding writes and close the store
	pub async fn shutdown(&self) {
		let flushed = self.coordinator.flush_online();
		self.coordinator.abort_all();
		self.coordinator.wait_for_writes().await;
		self.storage.disconnect().await;
		info!(flushed, "Inventory share stopped");
	}
}

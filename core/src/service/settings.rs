//! Resolved settings shared by every service
//!
//! Configuration is resolved once into [`Settings`] and swapped atomically on reload. Readers
//! take an `Arc` snapshot, so a reload never changes settings halfway through a sync.

use crate::config::{AppConfig, ServerProfile};
use crate::domain::{GroupName, ServerId};
use crate::service::groups::GroupResolver;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Settings {
	pub config: AppConfig,
	pub server: ServerId,
	pub profile: ServerProfile,
	pub resolver: GroupResolver,
	/// This server's groups; the first is the primary group
	pub groups: Vec<GroupName>,
}

impl Settings {
	pub fn resolve(config: AppConfig, server: ServerId) -> Self {
		let resolver = GroupResolver::from_config(&config);
		let groups = resolver.groups_of(&server);
		let profile = config.profile_for(&server);

		Self {
			config,
			server,
			profile,
			resolver,
			groups,
		}
	}
}

pub struct SettingsHandle {
	current: RwLock<Arc<Settings>>,
}

impl SettingsHandle {
	pub fn new(config: AppConfig) -> Self {
		let server = config.server_id();
		Self {
			current: RwLock::new(Arc::new(Settings::resolve(config, server))),
		}
	}

	pub fn current(&self) -> Arc<Settings> {
		self.current.read().clone()
	}

	/// Install a reloaded configuration; the server identity never changes after startup
	pub fn replace(&self, config: AppConfig) -> Arc<Settings> {
		let server = self.current().server.clone();
		if config.server_id() != server {
			warn!(
				current = %server,
				requested = %config.server_id(),
				"Server identity cannot change without a restart, keeping the current one"
			);
		}

		let settings = Arc::new(Settings::resolve(config, server));
		*self.current.write() = settings.clone();
		settings
	}
}

//! Integration test utilities for running one or more servers against a shared store
//!
//! Every server in a test gets its own [`MockHost`], [`MockEconomy`] and owner-thread queue,
//! while all of them point at the same sqlite file inside the test directory.
//!
//! ```rust,ignore
//! use invshare_core::testing::{drive_until, IntegrationTestSetup};
//!
//! let dir = tempfile::tempdir()?;
//! let mut lobby = IntegrationTestSetup::with_config(dir.path(), |b| {
//!     b.server_id("lobby").group("survival", &["lobby", "survival1"])
//! })
//! .await?;
//!
//! lobby.host.join(player, "Steve");
//! let completion = lobby.app.coordinator().on_join(player).unwrap();
//! drive_until(&mut lobby.queue, completion, Duration::from_secs(5)).await;
//! ```

use crate::config::{AppConfig, DatabaseConfig, RetryConfig, ServerProfile, SyncOptions};
use crate::infra::scheduler::{MainThreadQueue, QueueScheduler};
use crate::service::EconomyProvider;
use crate::testing::{MockEconomy, MockHost};
use crate::InventoryShare;
use indexmap::IndexMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name of the shared store inside a test directory
pub const STORE_FILE: &str = "store.db";

/// Builds an [`AppConfig`] suited to tests: sqlite store, short join delay, fast retries
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
	dir: PathBuf,
	server_id: String,
	groups: IndexMap<String, Vec<String>>,
	sync_enderchest: bool,
	sync_economy: bool,
	sound: Option<String>,
	join_delay_ms: u64,
	retry: RetryConfig,
}

impl TestConfigBuilder {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self {
			dir: dir.into(),
			server_id: "server1".to_string(),
			groups: IndexMap::new(),
			sync_enderchest: true,
			sync_economy: true,
			sound: None,
			// Long enough to exercise the delay, short enough to keep tests fast
			join_delay_ms: 10,
			retry: RetryConfig {
				max_attempts: 2,
				initial_backoff_ms: 5,
				max_backoff_ms: 20,
			},
		}
	}

	pub fn server_id(mut self, id: impl Into<String>) -> Self {
		self.server_id = id.into();
		self
	}

	/// Add a sharing group; order of calls is the fallback order
	pub fn group(mut self, name: impl Into<String>, servers: &[&str]) -> Self {
		self.groups.insert(
			name.into(),
			servers.iter().map(|s| s.to_string()).collect(),
		);
		self
	}

	pub fn sync_enderchest(mut self, enabled: bool) -> Self {
		self.sync_enderchest = enabled;
		self
	}

	pub fn sync_economy(mut self, enabled: bool) -> Self {
		self.sync_economy = enabled;
		self
	}

	pub fn completion_sound(mut self, name: impl Into<String>) -> Self {
		self.sound = Some(name.into());
		self
	}

	pub fn join_delay_ms(mut self, delay: u64) -> Self {
		self.join_delay_ms = delay;
		self
	}

	pub fn retry(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;
		self
	}

	pub fn config_path(&self) -> PathBuf {
		self.dir.join(format!("{}.toml", self.server_id))
	}

	pub fn build(self) -> AppConfig {
		let mut profile = ServerProfile {
			sync_enderchest: self.sync_enderchest,
			sync_economy: self.sync_economy,
			..Default::default()
		};
		if let Some(sound) = self.sound {
			profile.completion_sound.name = sound;
		}

		let mut servers = IndexMap::new();
		servers.insert(self.server_id.clone(), profile);

		AppConfig {
			server_id: self.server_id,
			database: DatabaseConfig::sqlite(self.dir.join(STORE_FILE)),
			sync: SyncOptions {
				join_delay_ms: self.join_delay_ms,
				dead_letter_path: Some(self.dir.join("dead-letters.jsonl")),
			},
			retry: self.retry,
			sharing_groups: self.groups,
			servers,
			..Default::default()
		}
	}

	/// Build the config and write it where [`InventoryShare::start`] will read it
	pub fn build_and_save(self) -> Result<(PathBuf, AppConfig), Box<dyn std::error::Error>> {
		let path = self.config_path();
		std::fs::create_dir_all(&self.dir)?;
		let config = self.build();
		config.save(&path)?;
		info!(
			path = %path.display(),
			server = %config.server_id,
			groups = ?config.sharing_groups.keys().collect::<Vec<_>>(),
			"Wrote test configuration"
		);
		Ok((path, config))
	}
}

/// Install a test-friendly subscriber once per process
pub fn initialize_test_tracing() {
	static INIT: Once = Once::new();

	INIT.call_once(|| {
		let filter = EnvFilter::try_from_default_env()
			.unwrap_or_else(|_| EnvFilter::new("warn,invshare_core=debug"));
		let _ = tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().with_test_writer().with_target(true))
			.try_init();
	});
}

/// One running server wired to mocks
pub struct IntegrationTestSetup {
	pub config_path: PathBuf,
	pub host: Arc<MockHost>,
	pub economy: Arc<MockEconomy>,
	pub queue: MainThreadQueue,
	pub app: Arc<InventoryShare>,
}

impl IntegrationTestSetup {
	/// A single server `server1` in a `default` group
	pub async fn new(dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
		Self::with_config(dir, |b| b.group("default", &["server1"])).await
	}

	pub async fn with_config<F>(
		dir: &Path,
		config_builder: F,
	) -> Result<Self, Box<dyn std::error::Error>>
	where
		F: FnOnce(TestConfigBuilder) -> TestConfigBuilder,
	{
		initialize_test_tracing();

		let (config_path, _) = config_builder(TestConfigBuilder::new(dir)).build_and_save()?;

		let host = Arc::new(MockHost::new());
		let economy = Arc::new(MockEconomy::new());
		let (scheduler, queue) = QueueScheduler::new(Handle::current());

		let app = InventoryShare::start(
			config_path.clone(),
			host.clone(),
			Some(economy.clone() as Arc<dyn EconomyProvider>),
			Arc::new(scheduler),
		)
		.await?;

		Ok(Self {
			config_path,
			host,
			economy,
			queue,
			app,
		})
	}

	/// Run owner-thread tasks until `until` resolves
	pub async fn drive<F: Future>(&mut self, until: F) -> Option<F::Output> {
		drive_until(&mut self.queue, until, Duration::from_secs(10)).await
	}
}

/// Drain the owner-thread queue until `until` resolves or `limit` elapses
pub async fn drive_until<F: Future>(
	queue: &mut MainThreadQueue,
	until: F,
	limit: Duration,
) -> Option<F::Output> {
	let drive = async {
		tokio::pin!(until);
		loop {
			tokio::select! {
				biased;
				output = &mut until => return output,
				ran = queue.run_next() => {
					if ran == 0 {
						// Queue closed; nothing left to run on the owner thread
						return (&mut until).await;
					}
				}
			}
		}
	};

	tokio::time::timeout(limit, drive).await.ok()
}

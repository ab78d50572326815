//! Join and quit synchronization
//!
//! Join: register the player in the [`SyncGuard`], back up and clear live state, wait the
//! join delay, load on a worker, then apply on the owner thread. Quit: capture live state,
//! clear it, and persist to every group in the background.
//!
//! Live state is only ever touched from tasks the [`TaskScheduler`] runs on the owner thread;
//! store reads and writes only ever run from [`TaskScheduler::run_async`].

pub mod guard;
pub mod persist;
pub mod snapshot;

pub use guard::{GuardError, SessionState, SyncGuard, SyncOutcome, Ticket};
pub use persist::{PersistReport, PersistenceWriter};
pub use snapshot::{BackupSnapshot, LoadSource, LoadedData, SaveSnapshot};

use crate::config::CompletionSound;
use crate::domain::{DataKind, GroupName, ItemStack, PlayerId};
use crate::host::{HostError, PlayerHost};
use crate::infra::codec::SerializationCodec;
use crate::infra::db::{Payload, StorageEngine};
use crate::infra::scheduler::TaskScheduler;
use crate::service::economy::{EconomyAdapter, EconomyError};
use crate::service::settings::{Settings, SettingsHandle};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Resolves once the join-sync session ends
pub type SyncCompletion = oneshot::Receiver<SyncOutcome>;

#[derive(Debug, Error)]
pub enum SyncError {
	#[error(transparent)]
	Guard(#[from] GuardError),

	#[error("Unknown sharing group '{0}'")]
	UnknownGroup(GroupName),

	#[error("Player {0} is not online")]
	PlayerOffline(PlayerId),

	#[error(transparent)]
	Host(#[from] HostError),

	#[error(transparent)]
	Economy(#[from] EconomyError),
}

/// Failure while writing one kind into live state
#[derive(Debug, Error)]
pub enum ApplyError {
	#[error(transparent)]
	Host(#[from] HostError),

	#[error(transparent)]
	Economy(#[from] EconomyError),

	#[error("Host panicked while applying {0}")]
	Panicked(DataKind),
}

/// Items that reached the cleared inventory before apply
enum Gained {
	/// Nothing arrived, or it was dropped at the player's feet
	Cleared,
	/// The host refused the drop; the stacks are still in the live inventory
	Kept(Vec<ItemStack>),
	/// The live inventory could not be read
	Unknown,
}

/// What a session loads, decided on the owner thread before the load starts
#[derive(Debug, Clone)]
struct LoadPlan {
	source: LoadSource,
	ender_chest: bool,
	balance: bool,
	/// Restore kinds the source has no data for; set for administrative resyncs
	restore_misses: bool,
}

pub struct SyncCoordinator {
	host: Arc<dyn PlayerHost>,
	storage: Arc<StorageEngine>,
	economy: Arc<EconomyAdapter>,
	scheduler: Arc<dyn TaskScheduler>,
	settings: Arc<SettingsHandle>,
	guard: SyncGuard,
	writer: Arc<PersistenceWriter>,
	codec: SerializationCodec,
}

impl SyncCoordinator {
	pub fn new(
		host: Arc<dyn PlayerHost>,
		storage: Arc<StorageEngine>,
		economy: Arc<EconomyAdapter>,
		scheduler: Arc<dyn TaskScheduler>,
		settings: Arc<SettingsHandle>,
	) -> Arc<Self> {
		let writer = Arc::new(PersistenceWriter::new(
			storage.clone(),
			economy.clone(),
			settings.clone(),
		));

		Arc::new(Self {
			host,
			storage,
			economy,
			scheduler,
			settings,
			guard: SyncGuard::new(),
			writer,
			codec: SerializationCodec,
		})
	}

	pub fn is_syncing(&self, player: &PlayerId) -> bool {
		self.guard.is_syncing(player)
	}

	pub fn session_state(&self, player: &PlayerId) -> Option<SessionState> {
		self.guard.state(player)
	}

	/// Item pickups are refused while the player is mid-sync
	pub fn should_cancel_pickup(&self, player: &PlayerId) -> bool {
		self.guard.is_syncing(player)
	}

	/// Start the join pipeline; `None` when there is nothing to synchronize
	pub fn on_join(self: &Arc<Self>, player: PlayerId) -> Option<SyncCompletion> {
		let settings = self.settings.current();
		if settings.groups.is_empty() {
			warn!(
				player = %player,
				server = %settings.server,
				"Server is not in any sharing group, skipping sync"
			);
			return None;
		}

		if let Some(state) = self.guard.remove(&player) {
			warn!(player = %player, ?state, "Replacing a sync session left open by a previous join");
		}

		let plan = self.plan(LoadSource::Groups(settings.groups.clone()), &settings, false);
		match self.start(player, plan, &settings) {
			Ok(completion) => Some(completion),
			Err(e) => {
				error!(player = %player, error = %e, "Failed to start sync");
				None
			}
		}
	}

	/// Rerun the join pipeline against one group, with no fallback
	pub fn resync_from_group(
		self: &Arc<Self>,
		player: PlayerId,
		group: GroupName,
	) -> Result<SyncCompletion, SyncError> {
		let settings = self.settings.current();
		if !settings.resolver.contains_group(&group) {
			return Err(SyncError::UnknownGroup(group));
		}
		if !self.host.is_online(&player) {
			return Err(SyncError::PlayerOffline(player));
		}

		info!(player = %player, group = %group, "Resynchronizing player from group");
		let plan = self.plan(LoadSource::Fixed(group), &settings, true);
		self.start(player, plan, &settings)
	}

	fn plan(&self, source: LoadSource, settings: &Settings, restore_misses: bool) -> LoadPlan {
		LoadPlan {
			source,
			ender_chest: settings.profile.sync_enderchest,
			balance: self.balance_enabled(settings),
			restore_misses,
		}
	}

	fn balance_enabled(&self, settings: &Settings) -> bool {
		settings.profile.sync_economy && self.economy.is_available()
	}

	fn start(
		self: &Arc<Self>,
		player: PlayerId,
		plan: LoadPlan,
		settings: &Arc<Settings>,
	) -> Result<SyncCompletion, SyncError> {
		let (ticket, completion) = self.guard.begin(player)?;

		let backup = self.capture_backup(&player, &plan);
		let prepared = self
			.guard
			.transition(&player, ticket, SessionState::ClearingLocal)
			.and_then(|_| self.guard.store_backup(&player, ticket, backup));
		if let Err(e) = prepared {
			self.guard.release(&player, ticket, SyncOutcome::Aborted);
			return Err(e.into());
		}

		self.clear_live_state(&player, true, plan.ender_chest);
		self.notify(&player, settings, &settings.config.messages.sync_started);

		debug!(player = %player, source = ?plan.source, "Live state cleared, waiting to load");

		let this = self.clone();
		self.scheduler.run_later(
			settings.config.sync.join_delay(),
			Box::new(move || this.begin_loading(player, ticket, plan)),
		);

		Ok(completion)
	}

	fn capture_backup(&self, player: &PlayerId, plan: &LoadPlan) -> BackupSnapshot {
		let inventory = self
			.host
			.inventory(player)
			.map_err(|e| warn!(player = %player, error = %e, "Failed to back up inventory"))
			.ok();

		let ender_chest = if plan.ender_chest {
			self.host
				.ender_chest(player)
				.map_err(|e| warn!(player = %player, error = %e, "Failed to back up ender chest"))
				.ok()
		} else {
			None
		};

		let balance = if plan.balance {
			self.economy
				.current_balance(player)
				.map_err(|e| warn!(player = %player, error = %e, "Failed to back up balance"))
				.ok()
		} else {
			None
		};

		BackupSnapshot {
			inventory,
			ender_chest,
			balance,
			taken_at: std::time::Instant::now(),
		}
	}

	fn clear_live_state(&self, player: &PlayerId, inventory: bool, ender_chest: bool) {
		if inventory {
			if let Err(e) = self.host.clear_inventory(player) {
				error!(player = %player, error = %e, "Failed to clear inventory");
			}
		}
		if ender_chest {
			if let Err(e) = self.host.clear_ender_chest(player) {
				error!(player = %player, error = %e, "Failed to clear ender chest");
			}
		}
	}

	/// Runs on the owner thread once the join delay has elapsed
	fn begin_loading(self: &Arc<Self>, player: PlayerId, ticket: Ticket, plan: LoadPlan) {
		if !self.guard.is_current(&player, ticket) {
			debug!(player = %player, "Sync session ended before loading");
			return;
		}

		if !self.host.is_online(&player) {
			info!(player = %player, "Player left before loading, sync aborted");
			self.guard.release(&player, ticket, SyncOutcome::Aborted);
			return;
		}

		if let Err(e) = self.guard.transition(&player, ticket, SessionState::Loading) {
			warn!(player = %player, error = %e, "Cannot start loading");
			self.guard.release(&player, ticket, SyncOutcome::Aborted);
			return;
		}

		let this = self.clone();
		self.scheduler.run_async(Box::pin(async move {
			let loaded = this.load(&player, &plan).await;

			let owner = this.clone();
			this.scheduler.run_on_main(Box::new(move || {
				owner.apply(player, ticket, &plan, loaded)
			}));
		}));
	}

	/// Read every planned kind; misses and decode failures both come back as `None`
	async fn load(&self, player: &PlayerId, plan: &LoadPlan) -> LoadedData {
		self.writer.wait_for_pending(player).await;

		let mut loaded = LoadedData::default();
		let primary = plan.source.primary();

		for group in plan.source.inventory_chain() {
			let Some(Payload::Inventory(blob)) =
				self.storage.load(player, group, DataKind::Inventory).await
			else {
				debug!(player = %player, group = %group, "No inventory stored in group");
				continue;
			};

			match self.codec.decode_inventory(&blob) {
				Ok(inventory) => {
					if Some(group) != primary {
						info!(player = %player, group = %group, "Loaded inventory from fallback group");
					}
					loaded.inventory = Some((group.clone(), inventory));
					break;
				}
				Err(e) => warn!(
					player = %player,
					group = %group,
					error = %e,
					"Stored inventory could not be decoded, treating as missing"
				),
			}
		}

		let Some(primary) = primary else {
			return loaded;
		};

		if plan.ender_chest {
			if let Some(Payload::EnderChest(blob)) =
				self.storage.load(player, primary, DataKind::EnderChest).await
			{
				match self.codec.decode_ender_chest(&blob) {
					Ok(ender_chest) => loaded.ender_chest = Some(ender_chest),
					Err(e) => warn!(
						player = %player,
						group = %primary,
						error = %e,
						"Stored ender chest could not be decoded, treating as missing"
					),
				}
			}
		}

		if plan.balance {
			loaded.balance = self.economy.load_balance(player, primary).await;
		}

		if loaded.is_empty() {
			info!(player = %player, "No stored data found, treating as a new player");
		}

		loaded
	}

	/// Runs on the owner thread with whatever the load produced
	fn apply(&self, player: PlayerId, ticket: Ticket, plan: &LoadPlan, loaded: LoadedData) {
		if !self.guard.is_current(&player, ticket) {
			debug!(player = %player, "Sync session ended before apply");
			return;
		}

		if !self.host.is_online(&player) {
			info!(player = %player, "Player left before apply, sync aborted");
			self.guard.release(&player, ticket, SyncOutcome::Aborted);
			return;
		}

		if let Err(e) = self.guard.transition(&player, ticket, SessionState::Applying) {
			warn!(player = %player, error = %e, "Cannot apply loaded data");
			self.guard.release(&player, ticket, SyncOutcome::Aborted);
			return;
		}

		let settings = self.settings.current();
		let backup = self.guard.take_backup(&player, ticket);
		let nothing_stored = loaded.is_empty();
		let mut failed = Vec::new();
		let mut missed = Vec::new();
		// Failed kinds whose live state must not be replaced by the backup
		let mut held = Vec::new();

		match loaded.inventory {
			Some((group, mut inventory)) => {
				let ready = match self.drop_accumulated_items(&player, &settings) {
					Gained::Cleared => true,
					Gained::Kept(items) => {
						let leftover = inventory.fill_free_slots(items);
						if leftover.is_empty() {
							info!(player = %player, "Merged items gained during sync into the loaded inventory");
							true
						} else {
							error!(
								player = %player,
								stacks = leftover.len(),
								"Items gained during sync do not fit the loaded inventory, keeping live inventory"
							);
							false
						}
					}
					Gained::Unknown => false,
				};

				if !ready {
					failed.push(DataKind::Inventory);
					held.push(DataKind::Inventory);
				} else {
					match apply_kind(DataKind::Inventory, || {
						Ok(self.host.set_inventory(&player, inventory)?)
					}) {
						Ok(()) => debug!(player = %player, group = %group, "Applied inventory"),
						Err(e) => {
							error!(player = %player, error = %e, "Failed to apply inventory");
							failed.push(DataKind::Inventory);
						}
					}
				}
			}
			None => missed.push(DataKind::Inventory),
		}

		if plan.ender_chest {
			match loaded.ender_chest {
				Some(ender_chest) => {
					if let Err(e) = apply_kind(DataKind::EnderChest, || {
						Ok(self.host.set_ender_chest(&player, ender_chest)?)
					}) {
						error!(player = %player, error = %e, "Failed to apply ender chest");
						failed.push(DataKind::EnderChest);
					}
				}
				None => missed.push(DataKind::EnderChest),
			}
		}

		if plan.balance {
			match loaded.balance {
				Some(balance) => match apply_kind(DataKind::Balance, || {
					Ok(self.economy.apply_balance(&player, balance)?)
				}) {
					Ok(()) => {}
					Err(e) => {
						error!(player = %player, error = %e, "Failed to apply balance");
						failed.push(DataKind::Balance);
					}
				},
				None => missed.push(DataKind::Balance),
			}
		}

		if plan.restore_misses && !missed.is_empty() {
			info!(player = %player, kinds = ?missed, "Group has no data for some kinds, restoring local state");
			self.restore(&player, backup.as_ref(), &missed);
		} else if nothing_stored {
			debug!(player = %player, kinds = ?missed, "Nothing stored, restoring the state the host assigned");
			self.restore(&player, backup.as_ref(), &missed);
		}

		let outcome = if failed.is_empty() {
			let _ = self.guard.transition(&player, ticket, SessionState::Complete);
			self.notify(&player, &settings, &settings.config.messages.sync_completed);
			self.play_completion_sound(&player, &settings.profile.completion_sound);
			info!(player = %player, "Player data synchronized");
			SyncOutcome::Completed
		} else {
			let restorable: Vec<DataKind> = failed
				.iter()
				.copied()
				.filter(|kind| !held.contains(kind))
				.collect();
			self.restore(&player, backup.as_ref(), &restorable);
			let _ = self.guard.transition(&player, ticket, SessionState::Failed);
			error!(
				player = %player,
				kinds = ?failed,
				"Synchronization failed, restored local state from backup"
			);
			self.notify(&player, &settings, &settings.config.messages.sync_failed);
			SyncOutcome::Failed
		};

		self.guard.release(&player, ticket, outcome);
	}

	/// Drop anything that reached the inventory between clearing and apply
	fn drop_accumulated_items(&self, player: &PlayerId, settings: &Settings) -> Gained {
		let current = match self.host.inventory(player) {
			Ok(inventory) => inventory,
			Err(e) => {
				error!(player = %player, error = %e, "Failed to inspect inventory before apply");
				return Gained::Unknown;
			}
		};

		let items: Vec<ItemStack> = current.items().cloned().collect();
		if items.is_empty() {
			return Gained::Cleared;
		}

		let count = items.len();
		match self.host.drop_at_feet(player, items.clone()) {
			Ok(()) => {
				self.clear_live_state(player, true, false);
				info!(player = %player, stacks = count, "Dropped items gained during sync");
				self.notify(player, settings, &settings.config.messages.items_dropped);
				Gained::Cleared
			}
			Err(e) => {
				warn!(player = %player, error = %e, "Failed to drop items gained during sync");
				Gained::Kept(items)
			}
		}
	}

	fn restore(&self, player: &PlayerId, backup: Option<&BackupSnapshot>, kinds: &[DataKind]) {
		let Some(backup) = backup else {
			warn!(player = %player, "No backup to restore from");
			return;
		};

		for kind in kinds {
			let restored = match kind {
				DataKind::Inventory => backup.inventory.clone().map(|inventory| {
					apply_kind(*kind, || Ok(self.host.set_inventory(player, inventory)?))
				}),
				DataKind::EnderChest => backup.ender_chest.clone().map(|ender_chest| {
					apply_kind(*kind, || Ok(self.host.set_ender_chest(player, ender_chest)?))
				}),
				DataKind::Balance => backup.balance.map(|balance| {
					apply_kind(*kind, || Ok(self.economy.set_balance(player, balance)?))
				}),
			};

			match restored {
				Some(Ok(())) => debug!(player = %player, kind = %kind, "Restored from backup"),
				Some(Err(e)) => {
					error!(player = %player, kind = %kind, error = %e, "Failed to restore from backup")
				}
				None => warn!(player = %player, kind = %kind, "Backup has nothing to restore"),
			}
		}
	}

	fn play_completion_sound(&self, player: &PlayerId, sound: &CompletionSound) {
		if !sound.enabled {
			return;
		}

		match self
			.host
			.play_sound(player, &sound.name, sound.volume, sound.pitch)
		{
			Ok(()) => {}
			Err(HostError::UnknownSound(name)) if name != CompletionSound::DEFAULT_NAME => {
				warn!(sound = %name, "Unknown completion sound, playing the default instead");
				if let Err(e) = self.host.play_sound(
					player,
					CompletionSound::DEFAULT_NAME,
					sound.volume,
					sound.pitch,
				) {
					warn!(player = %player, error = %e, "Failed to play completion sound");
				}
			}
			Err(e) => warn!(player = %player, error = %e, "Failed to play completion sound"),
		}
	}

	fn notify(&self, player: &PlayerId, settings: &Settings, text: &str) {
		self.host
			.send_message(player, &settings.config.messages.format(text));
	}

	/// Capture and clear live state, then persist it to every group in the background
	pub fn on_quit(&self, player: PlayerId) {
		if let Some(state) = self.guard.remove(&player) {
			info!(
				player = %player,
				?state,
				"Player left during synchronization, skipping save"
			);
			return;
		}

		let settings = self.settings.current();
		if settings.groups.is_empty() {
			warn!(
				player = %player,
				server = %settings.server,
				"Server is not in any sharing group, skipping save"
			);
			return;
		}

		let snapshot = self.capture_for_save(&player, &settings);
		self.clear_live_state(
			&player,
			snapshot.inventory.is_some(),
			snapshot.ender_chest.is_some(),
		);
		self.spawn_persist(player, &settings.groups, snapshot);
	}

	fn capture_for_save(&self, player: &PlayerId, settings: &Settings) -> SaveSnapshot {
		let inventory = self
			.host
			.inventory(player)
			.map_err(|e| error!(player = %player, error = %e, "Failed to capture inventory"))
			.ok();

		let ender_chest = if settings.profile.sync_enderchest {
			self.host
				.ender_chest(player)
				.map_err(|e| error!(player = %player, error = %e, "Failed to capture ender chest"))
				.ok()
		} else {
			None
		};

		let balance = if self.balance_enabled(settings) {
			self.economy
				.current_balance(player)
				.map_err(|e| error!(player = %player, error = %e, "Failed to capture balance"))
				.ok()
		} else {
			None
		};

		SaveSnapshot {
			inventory,
			ender_chest,
			balance,
		}
	}

	fn spawn_persist(&self, player: PlayerId, groups: &[GroupName], snapshot: SaveSnapshot) {
		let (payloads, failures) = snapshot.into_payloads(&self.codec);
		for (kind, e) in failures {
			error!(player = %player, kind = %kind, error = %e, "Failed to encode player data, not saved");
		}
		if payloads.is_empty() {
			return;
		}

		let permit = self.writer.permit(player);
		let writer = self.writer.clone();
		let groups = groups.to_vec();
		self.scheduler.run_async(Box::pin(async move {
			writer.persist(permit, &groups, &payloads).await;
		}));
	}

	/// Save one kind of the player's current state without clearing it
	///
	/// Returns `Ok(false)` when the save was skipped.
	pub fn checkpoint(&self, player: PlayerId, kind: DataKind) -> Result<bool, SyncError> {
		if self.guard.is_syncing(&player) {
			debug!(player = %player, kind = %kind, "Player is synchronizing, checkpoint skipped");
			return Ok(false);
		}

		let settings = self.settings.current();
		if settings.groups.is_empty() {
			warn!(server = %settings.server, "Server is not in any sharing group, checkpoint skipped");
			return Ok(false);
		}

		if !self.host.is_online(&player) {
			return Err(SyncError::PlayerOffline(player));
		}

		let mut snapshot = SaveSnapshot {
			inventory: None,
			ender_chest: None,
			balance: None,
		};
		match kind {
			DataKind::Inventory => snapshot.inventory = Some(self.host.inventory(&player)?),
			DataKind::EnderChest if settings.profile.sync_enderchest => {
				snapshot.ender_chest = Some(self.host.ender_chest(&player)?)
			}
			DataKind::Balance if self.balance_enabled(&settings) => {
				snapshot.balance = Some(self.economy.current_balance(&player)?)
			}
			_ => return Ok(false),
		}

		self.spawn_persist(player, &settings.groups, snapshot);
		Ok(true)
	}

	/// Persist every online player that is not mid-sync, keeping live state
	pub fn flush_online(&self) -> usize {
		let settings = self.settings.current();
		if settings.groups.is_empty() {
			return 0;
		}

		let mut flushed = 0;
		for player in self.host.online_players() {
			if self.guard.is_syncing(&player) {
				debug!(player = %player, "Player is synchronizing, not flushed");
				continue;
			}
			let snapshot = self.capture_for_save(&player, &settings);
			self.spawn_persist(player, &settings.groups, snapshot);
			flushed += 1;
		}

		info!(players = flushed, "Flushed online players");
		flushed
	}

	/// Wait for every background write started so far
	pub async fn wait_for_writes(&self) {
		self.writer.wait_idle().await;
	}

	pub fn pending_writes(&self) -> usize {
		self.writer.in_flight()
	}

	/// Abort every open session
	pub fn abort_all(&self) {
		let open = self.guard.active_count();
		self.guard.clear();
		if open > 0 {
			warn!(sessions = open, "Aborted open sync sessions");
		}
	}
}

fn apply_kind<T>(
	kind: DataKind,
	f: impl FnOnce() -> Result<T, ApplyError>,
) -> Result<(), ApplyError> {
	match catch_unwind(AssertUnwindSafe(f)) {
		Ok(result) => result.map(|_| ()),
		Err(_) => Err(ApplyError::Panicked(kind)),
	}
}

//! Quit-time and checkpoint writes with bounded retry
//!
//! Each `(group, kind)` write is retried with exponential backoff up to the configured number
//! of attempts, then handed to the dead-letter log. Writes for one player hold that player's
//! write permit until they finish; a join for the same player waits on the permit before it
//! reads, so it never loads a row that an in-flight save is about to replace.

use crate::domain::{DataKind, GroupName, PlayerId};
use crate::infra::db::{Payload, StorageEngine};
use crate::infra::dead_letter::{DeadLetter, DeadLetterLog};
use crate::service::economy::EconomyAdapter;
use crate::service::settings::SettingsHandle;
use backoff::{backoff::Backoff, ExponentialBackoffBuilder};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};

/// Outcome of persisting one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
	pub written: Vec<(GroupName, DataKind)>,
	pub dead_lettered: Vec<(GroupName, DataKind)>,
}

impl PersistReport {
	pub fn is_complete(&self) -> bool {
		self.dead_lettered.is_empty()
	}
}

/// Tracks outstanding writes so shutdown can wait for them
#[derive(Default)]
struct InFlight {
	count: AtomicUsize,
	idle: Notify,
}

struct InFlightToken(Arc<InFlight>);

impl InFlightToken {
	fn new(in_flight: &Arc<InFlight>) -> Self {
		in_flight.count.fetch_add(1, Ordering::AcqRel);
		Self(in_flight.clone())
	}
}

impl Drop for InFlightToken {
	fn drop(&mut self) {
		if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
			self.0.idle.notify_waiters();
		}
	}
}

/// Per-player exclusive write permit, taken on the owner thread before the write is spawned
pub struct WritePermit {
	player: PlayerId,
	state: PermitState,
	_in_flight: InFlightToken,
}

enum PermitState {
	Held(OwnedRwLockWriteGuard<()>),
	/// Another write for the player still holds the lock; wait for it off the owner thread
	Queued(Arc<RwLock<()>>),
}

impl WritePermit {
	async fn acquire(self) -> HeldPermit {
		let guard = match self.state {
			PermitState::Held(guard) => guard,
			PermitState::Queued(lock) => lock.write_owned().await,
		};
		HeldPermit {
			player: self.player,
			_guard: guard,
			_in_flight: self._in_flight,
		}
	}
}

struct HeldPermit {
	player: PlayerId,
	_guard: OwnedRwLockWriteGuard<()>,
	_in_flight: InFlightToken,
}

pub struct PersistenceWriter {
	storage: Arc<StorageEngine>,
	economy: Arc<EconomyAdapter>,
	settings: Arc<SettingsHandle>,
	dead_letters: DeadLetterLog,
	pending: DashMap<PlayerId, Arc<RwLock<()>>>,
	in_flight: Arc<InFlight>,
}

impl PersistenceWriter {
	pub fn new(
		storage: Arc<StorageEngine>,
		economy: Arc<EconomyAdapter>,
		settings: Arc<SettingsHandle>,
	) -> Self {
		Self {
			storage,
			economy,
			settings,
			dead_letters: DeadLetterLog::new(),
			pending: DashMap::new(),
			in_flight: Arc::new(InFlight::default()),
		}
	}

	/// Take the player's write permit without blocking
	pub fn permit(&self, player: PlayerId) -> WritePermit {
		let lock = self
			.pending
			.entry(player)
			.or_insert_with(|| Arc::new(RwLock::new(())))
			.clone();

		let state = match lock.clone().try_write_owned() {
			Ok(guard) => PermitState::Held(guard),
			Err(_) => PermitState::Queued(lock),
		};

		WritePermit {
			player,
			state,
			_in_flight: InFlightToken::new(&self.in_flight),
		}
	}

	/// Wait until no write for `player` is outstanding
	pub async fn wait_for_pending(&self, player: &PlayerId) {
		let Some(lock) = self.pending.get(player).map(|entry| entry.value().clone()) else {
			return;
		};
		let _read = lock.read().await;
	}

	pub fn has_pending(&self, player: &PlayerId) -> bool {
		self.pending
			.get(player)
			.is_some_and(|lock| lock.try_read().is_err())
	}

	/// Write every payload to every group; a failing group never blocks the others
	pub async fn persist(
		&self,
		permit: WritePermit,
		groups: &[GroupName],
		payloads: &[Payload],
	) -> PersistReport {
		let held = permit.acquire().await;
		let player = held.player;

		let writes = groups.iter().flat_map(|group| {
			payloads
				.iter()
				.map(move |payload| async move {
					let ok = self.write_with_retry(&player, group, payload).await;
					(group.clone(), payload.kind(), ok)
				})
		});

		let mut report = PersistReport::default();
		for (group, kind, ok) in join_all(writes).await {
			if ok {
				report.written.push((group, kind));
			} else {
				report.dead_lettered.push((group, kind));
			}
		}

		drop(held);
		self.pending
			.remove_if(&player, |_, lock| Arc::strong_count(lock) == 1);

		if report.is_complete() {
			info!(
				player = %player,
				writes = report.written.len(),
				"Player data saved"
			);
		} else {
			warn!(
				player = %player,
				written = report.written.len(),
				failed = report.dead_lettered.len(),
				"Player data partially saved"
			);
		}

		report
	}

	async fn write_with_retry(&self, player: &PlayerId, group: &GroupName, payload: &Payload) -> bool {
		let settings = self.settings.current();
		let retry = &settings.config.retry;

		let mut backoff = ExponentialBackoffBuilder::new()
			.with_initial_interval(retry.initial_backoff())
			.with_max_interval(retry.max_backoff())
			.with_max_elapsed_time(None)
			.build();

		let mut attempts = 0;
		loop {
			attempts += 1;
			if self.write_once(player, group, payload).await {
				if attempts > 1 {
					debug!(player = %player, group = %group, kind = %payload.kind(), attempts, "Write succeeded after retry");
				}
				return true;
			}

			if attempts >= retry.max_attempts {
				break;
			}

			let delay = backoff.next_backoff().unwrap_or_else(|| retry.max_backoff());
			warn!(
				player = %player,
				group = %group,
				kind = %payload.kind(),
				attempt = attempts,
				retry_in_ms = delay.as_millis() as u64,
				"Write failed, retrying"
			);
			tokio::time::sleep(delay).await;
		}

		self.dead_letters
			.record(
				settings.config.sync.dead_letter_path.as_deref(),
				DeadLetter::new(player, group, payload, attempts),
			)
			.await;
		false
	}

	async fn write_once(&self, player: &PlayerId, group: &GroupName, payload: &Payload) -> bool {
		match payload {
			Payload::Balance(balance) => self.economy.save_balance(player, group, *balance).await,
			_ => self.storage.save(player, group, payload).await,
		}
	}

	/// Wait for every outstanding write to finish
	pub async fn wait_idle(&self) {
		loop {
			let notified = self.in_flight.idle.notified();
			if self.in_flight.count.load(Ordering::Acquire) == 0 {
				return;
			}
			notified.await;
		}
	}

	pub fn in_flight(&self) -> usize {
		self.in_flight.count.load(Ordering::Acquire)
	}
}

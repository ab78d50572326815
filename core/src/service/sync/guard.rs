//! Registry of players that are mid-synchronization
//!
//! One [`SyncSession`] per player. A session is identified by a ticket handed out at
//! [`SyncGuard::begin`]; every later step must present it, so a pipeline left over from an
//! earlier join can never act on a newer session for the same player.

use super::snapshot::BackupSnapshot;
use crate::domain::PlayerId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::trace;

/// Join-sync state for one player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
	/// Registered, nothing touched yet
	Idle,

	/// Live state is being backed up and cleared
	ClearingLocal,

	/// Waiting for the join delay or reading from the store
	Loading,

	/// Loaded data is being written into live state on the owner thread
	Applying,

	/// Apply failed and the backup was restored
	Failed,

	/// Loaded data applied
	Complete,
}

impl SessionState {
	pub fn can_transition_to(&self, next: SessionState) -> bool {
		use SessionState::*;
		matches!(
			(self, next),
			(Idle, ClearingLocal)
				| (ClearingLocal, Loading)
				| (ClearingLocal, Failed)
				| (Loading, Applying)
				| (Loading, Failed)
				| (Applying, Complete)
				| (Applying, Failed)
		)
	}
}

/// How a join-sync session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOutcome {
	/// Loaded data applied (or nothing to apply)
	Completed,
	/// At least one kind failed to apply and was restored from the backup
	Failed,
	/// The player left or the session was superseded before apply
	Aborted,
}

/// Identifies one session; tickets are never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
	#[error("Player {0} is already synchronizing")]
	AlreadySyncing(PlayerId),

	#[error("Player {0} has no active sync session")]
	NotSyncing(PlayerId),

	#[error("Sync session for player {0} was superseded")]
	StaleTicket(PlayerId),

	#[error("Invalid sync transition {from:?} -> {to:?}")]
	InvalidTransition { from: SessionState, to: SessionState },
}

pub struct SyncSession {
	ticket: Ticket,
	state: SessionState,
	backup: Option<BackupSnapshot>,
	started_at: Instant,
	outcome_tx: Option<oneshot::Sender<SyncOutcome>>,
}

impl SyncSession {
	fn finish(mut self, outcome: SyncOutcome) {
		if let Some(tx) = self.outcome_tx.take() {
			// Nobody waiting is fine
			let _ = tx.send(outcome);
		}
	}
}

#[derive(Default)]
pub struct SyncGuard {
	sessions: DashMap<PlayerId, SyncSession>,
	next_ticket: AtomicU64,
}

impl SyncGuard {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a new session in [`SessionState::Idle`]
	pub fn begin(
		&self,
		player: PlayerId,
	) -> Result<(Ticket, oneshot::Receiver<SyncOutcome>), GuardError> {
		let ticket = Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
		let (tx, rx) = oneshot::channel();

		match self.sessions.entry(player) {
			dashmap::mapref::entry::Entry::Occupied(_) => Err(GuardError::AlreadySyncing(player)),
			dashmap::mapref::entry::Entry::Vacant(entry) => {
				entry.insert(SyncSession {
					ticket,
					state: SessionState::Idle,
					backup: None,
					started_at: Instant::now(),
					outcome_tx: Some(tx),
				});
				trace!(player = %player, ticket = ticket.0, "Sync session started");
				Ok((ticket, rx))
			}
		}
	}

	pub fn is_syncing(&self, player: &PlayerId) -> bool {
		self.sessions.contains_key(player)
	}

	/// True if `ticket` still identifies the player's active session
	pub fn is_current(&self, player: &PlayerId, ticket: Ticket) -> bool {
		self.sessions
			.get(player)
			.is_some_and(|session| session.ticket == ticket)
	}

	pub fn state(&self, player: &PlayerId) -> Option<SessionState> {
		self.sessions.get(player).map(|session| session.state)
	}

	pub fn active_count(&self) -> usize {
		self.sessions.len()
	}

	/// Move the session to `next`, returning the previous state
	pub fn transition(
		&self,
		player: &PlayerId,
		ticket: Ticket,
		next: SessionState,
	) -> Result<SessionState, GuardError> {
		let mut session = self
			.sessions
			.get_mut(player)
			.ok_or(GuardError::NotSyncing(*player))?;

		if session.ticket != ticket {
			return Err(GuardError::StaleTicket(*player));
		}

		let from = session.state;
		if !from.can_transition_to(next) {
			return Err(GuardError::InvalidTransition { from, to: next });
		}

		session.state = next;
		trace!(player = %player, ?from, to = ?next, "Sync session transition");
		Ok(from)
	}

	pub fn store_backup(
		&self,
		player: &PlayerId,
		ticket: Ticket,
		backup: BackupSnapshot,
	) -> Result<(), GuardError> {
		let mut session = self
			.sessions
			.get_mut(player)
			.ok_or(GuardError::NotSyncing(*player))?;

		if session.ticket != ticket {
			return Err(GuardError::StaleTicket(*player));
		}

		session.backup = Some(backup);
		Ok(())
	}

	pub fn take_backup(&self, player: &PlayerId, ticket: Ticket) -> Option<BackupSnapshot> {
		let mut session = self.sessions.get_mut(player)?;
		if session.ticket != ticket {
			return None;
		}
		session.backup.take()
	}

	/// End the session identified by `ticket` and report `outcome` to its waiter
	///
	/// Returns false when the ticket no longer matches, in which case nothing is removed.
	pub fn release(&self, player: &PlayerId, ticket: Ticket, outcome: SyncOutcome) -> bool {
		match self
			.sessions
			.remove_if(player, |_, session| session.ticket == ticket)
		{
			Some((_, session)) => {
				trace!(
					player = %player,
					?outcome,
					elapsed_ms = session.started_at.elapsed().as_millis() as u64,
					"Sync session released"
				);
				session.finish(outcome);
				true
			}
			None => false,
		}
	}

	/// Drop whatever session the player has, reporting it as aborted
	pub fn remove(&self, player: &PlayerId) -> Option<SessionState> {
		let (_, session) = self.sessions.remove(player)?;
		let state = session.state;
		session.finish(SyncOutcome::Aborted);
		Some(state)
	}

	/// Abort every session, used at shutdown
	pub fn clear(&self) {
		let players: Vec<PlayerId> = self.sessions.iter().map(|entry| *entry.key()).collect();
		for player in players {
			self.remove(&player);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use uuid::Uuid;

	fn player() -> PlayerId {
		PlayerId::new(Uuid::new_v4())
	}

	#[test]
	fn test_one_session_per_player() {
		let guard = SyncGuard::new();
		let p = player();

		let (ticket, _rx) = guard.begin(p).unwrap();
		assert!(guard.is_syncing(&p));
		assert_eq!(guard.begin(p).unwrap_err(), GuardError::AlreadySyncing(p));

		assert!(guard.release(&p, ticket, SyncOutcome::Completed));
		assert!(!guard.is_syncing(&p));
		assert!(guard.begin(p).is_ok());
	}

	#[test]
	fn test_transitions_are_validated() {
		let guard = SyncGuard::new();
		let p = player();
		let (ticket, _rx) = guard.begin(p).unwrap();

		assert_eq!(
			guard.transition(&p, ticket, SessionState::Applying),
			Err(GuardError::InvalidTransition {
				from: SessionState::Idle,
				to: SessionState::Applying
			})
		);

		guard
			.transition(&p, ticket, SessionState::ClearingLocal)
			.unwrap();
		guard.transition(&p, ticket, SessionState::Loading).unwrap();
		guard.transition(&p, ticket, SessionState::Applying).unwrap();
		assert_eq!(
			guard.transition(&p, ticket, SessionState::Complete),
			Ok(SessionState::Applying)
		);
		assert_eq!(guard.state(&p), Some(SessionState::Complete));
	}

	#[tokio::test]
	async fn test_stale_ticket_cannot_touch_newer_session() {
		let guard = SyncGuard::new();
		let p = player();

		let (old, old_rx) = guard.begin(p).unwrap();
		assert_eq!(guard.remove(&p), Some(SessionState::Idle));
		assert_eq!(old_rx.await, Ok(SyncOutcome::Aborted));

		let (new, new_rx) = guard.begin(p).unwrap();
		assert_ne!(old, new);
		assert!(!guard.is_current(&p, old));
		assert_eq!(
			guard.transition(&p, old, SessionState::ClearingLocal),
			Err(GuardError::StaleTicket(p))
		);
		assert!(!guard.release(&p, old, SyncOutcome::Completed));
		assert!(guard.is_syncing(&p));

		assert!(guard.release(&p, new, SyncOutcome::Failed));
		assert_eq!(new_rx.await, Ok(SyncOutcome::Failed));
	}
}

//! Balance synchronization against an external currency provider
//!
//! Providers only offer relative deposit and withdraw, so a stored balance is reconciled by
//! moving the difference. Reading the live balance and moving the difference are two
//! separate calls; a change made in between is not detected.

use crate::domain::{Balance, DataKind, GroupName, PlayerId};
use crate::infra::db::{Payload, StorageEngine};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EconomyError {
	#[error("No economy provider is available")]
	Unavailable,

	#[error("Economy provider rejected {operation} of {amount}: {reason}")]
	Rejected {
		operation: &'static str,
		amount: Balance,
		reason: String,
	},

	#[error("Economy provider failed: {0}")]
	Provider(String),
}

pub type Result<T> = std::result::Result<T, EconomyError>;

/// External currency provider
///
/// Called only from the host's owner thread.
pub trait EconomyProvider: Send + Sync {
	fn name(&self) -> &str;

	fn is_available(&self) -> bool;

	fn balance(&self, player: &PlayerId) -> Result<Balance>;

	fn deposit(&self, player: &PlayerId, amount: Balance) -> Result<()>;

	fn withdraw(&self, player: &PlayerId, amount: Balance) -> Result<()>;
}

/// What a reconciliation actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChange {
	Deposited(Balance),
	Withdrew(Balance),
	Unchanged,
}

pub struct EconomyAdapter {
	provider: Option<Arc<dyn EconomyProvider>>,
	storage: Arc<StorageEngine>,
}

impl EconomyAdapter {
	pub fn new(provider: Option<Arc<dyn EconomyProvider>>, storage: Arc<StorageEngine>) -> Self {
		match &provider {
			Some(p) => info!(provider = p.name(), "Economy provider registered"),
			None => warn!("No economy provider found, balance sync is disabled"),
		}
		Self { provider, storage }
	}

	/// Name of the active provider, if any
	pub fn provider_name(&self) -> Option<&str> {
		self.provider.as_deref().map(|p| p.name())
	}

	pub fn is_available(&self) -> bool {
		self.provider.as_ref().is_some_and(|p| p.is_available())
	}

	fn provider(&self) -> Result<&dyn EconomyProvider> {
		match self.provider.as_deref() {
			Some(p) if p.is_available() => Ok(p),
			_ => Err(EconomyError::Unavailable),
		}
	}

	pub fn current_balance(&self, player: &PlayerId) -> Result<Balance> {
		self.provider()?.balance(player)
	}

	/// Move the live balance to `target` with a single deposit or withdraw of the difference
	pub fn apply_balance(&self, player: &PlayerId, target: Balance) -> Result<BalanceChange> {
		let provider = self.provider()?;
		let current = provider.balance(player)?;
		let delta = target - current;

		let change = if delta.is_zero() {
			BalanceChange::Unchanged
		} else if delta.is_negative() {
			provider.withdraw(player, delta.abs())?;
			BalanceChange::Withdrew(delta.abs())
		} else {
			provider.deposit(player, delta)?;
			BalanceChange::Deposited(delta)
		};

		debug!(player = %player, %current, %target, ?change, "Reconciled balance");
		Ok(change)
	}

	/// Overwrite the live balance, used when restoring a backup
	///
	/// Clamps to zero, empties the account, then deposits. Both steps must succeed.
	pub fn set_balance(&self, player: &PlayerId, amount: Balance) -> Result<()> {
		let provider = self.provider()?;
		let amount = amount.non_negative();
		let current = provider.balance(player)?;
		if current == amount {
			return Ok(());
		}

		if current > Balance::ZERO {
			provider.withdraw(player, current)?;
		}
		if amount > Balance::ZERO {
			provider.deposit(player, amount)?;
		}

		debug!(player = %player, %amount, "Set balance");
		Ok(())
	}

	/// Stored balance from the primary group only
	pub async fn load_balance(&self, player: &PlayerId, primary: &GroupName) -> Option<Balance> {
		match self.storage.load(player, primary, DataKind::Balance).await {
			Some(Payload::Balance(balance)) => Some(balance),
			_ => None,
		}
	}

	pub async fn save_balance(&self, player: &PlayerId, group: &GroupName, balance: Balance) -> bool {
		self.storage
			.save(player, group, &Payload::Balance(balance))
			.await
	}
}

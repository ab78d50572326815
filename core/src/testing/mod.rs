//! Fakes for the host and economy ports, used by unit and integration tests

pub mod integration_utils;

pub use integration_utils::{drive_until, IntegrationTestSetup, TestConfigBuilder, STORE_FILE};

use crate::domain::{Balance, EnderChestContents, InventoryContents, ItemStack, PlayerId};
use crate::host::{HostError, PlayerHost};
use crate::ops::CommandSender;
use crate::service::economy::{EconomyError, EconomyProvider};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Slots in a player's main storage
pub const STORAGE_SLOTS: usize = 36;
/// Armor slots
pub const ARMOR_SLOTS: usize = 4;
/// Ender chest slots
pub const ENDER_CHEST_SLOTS: usize = 27;

pub fn empty_inventory() -> InventoryContents {
	InventoryContents::new(vec![None; STORAGE_SLOTS], vec![None; ARMOR_SLOTS], None)
}

pub fn empty_ender_chest() -> EnderChestContents {
	EnderChestContents::new(vec![None; ENDER_CHEST_SLOTS])
}

/// Inventory holding `items` in the first storage slots
pub fn inventory_of(items: &[ItemStack]) -> InventoryContents {
	let mut inventory = empty_inventory();
	for (slot, item) in inventory.storage.iter_mut().zip(items) {
		*slot = Some(item.clone());
	}
	inventory
}

#[derive(Debug, Clone)]
pub struct MockPlayer {
	pub name: String,
	pub online: bool,
	pub inventory: InventoryContents,
	pub ender_chest: EnderChestContents,
	pub messages: Vec<String>,
	pub sounds: Vec<String>,
	pub dropped: Vec<ItemStack>,
}

/// Remaining injected failures per operation
#[derive(Debug, Default)]
struct Faults {
	set_inventory: usize,
	set_ender_chest: usize,
	panic_on_set_ender_chest: usize,
	drop_items: usize,
}

fn take_fault(remaining: &mut usize) -> bool {
	if *remaining == 0 {
		return false;
	}
	*remaining -= 1;
	true
}

/// In-memory live state with fault injection
#[derive(Default)]
pub struct MockHost {
	players: Mutex<HashMap<PlayerId, MockPlayer>>,
	faults: Mutex<Faults>,
	/// Sounds the host recognizes; everything is recognized when empty
	known_sounds: Mutex<HashSet<String>>,
}

impl MockHost {
	pub fn new() -> Self {
		Self::default()
	}

	/// Bring a player online with empty containers
	pub fn join(&self, player: PlayerId, name: &str) {
		let mut players = self.players.lock();
		let entry = players.entry(player).or_insert_with(|| MockPlayer {
			name: name.to_string(),
			online: true,
			inventory: empty_inventory(),
			ender_chest: empty_ender_chest(),
			messages: Vec::new(),
			sounds: Vec::new(),
			dropped: Vec::new(),
		});
		entry.online = true;
	}

	pub fn leave(&self, player: &PlayerId) {
		if let Some(p) = self.players.lock().get_mut(player) {
			p.online = false;
		}
	}

	pub fn player(&self, player: &PlayerId) -> Option<MockPlayer> {
		self.players.lock().get(player).cloned()
	}

	pub fn live_inventory(&self, player: &PlayerId) -> InventoryContents {
		self.player(player)
			.map(|p| p.inventory)
			.unwrap_or_default()
	}

	pub fn live_ender_chest(&self, player: &PlayerId) -> EnderChestContents {
		self.player(player)
			.map(|p| p.ender_chest)
			.unwrap_or_default()
	}

	pub fn put_inventory(&self, player: &PlayerId, inventory: InventoryContents) {
		if let Some(p) = self.players.lock().get_mut(player) {
			p.inventory = inventory;
		}
	}

	pub fn put_ender_chest(&self, player: &PlayerId, ender_chest: EnderChestContents) {
		if let Some(p) = self.players.lock().get_mut(player) {
			p.ender_chest = ender_chest;
		}
	}

	/// Simulate a pickup into the first free storage slot
	pub fn pick_up(&self, player: &PlayerId, item: ItemStack) {
		if let Some(p) = self.players.lock().get_mut(player) {
			match p.inventory.storage.iter_mut().find(|slot| slot.is_none()) {
				Some(slot) => *slot = Some(item),
				None => p.inventory.storage.push(Some(item)),
			}
		}
	}

	pub fn messages(&self, player: &PlayerId) -> Vec<String> {
		self.player(player).map(|p| p.messages).unwrap_or_default()
	}

	pub fn sounds(&self, player: &PlayerId) -> Vec<String> {
		self.player(player).map(|p| p.sounds).unwrap_or_default()
	}

	pub fn dropped(&self, player: &PlayerId) -> Vec<ItemStack> {
		self.player(player).map(|p| p.dropped).unwrap_or_default()
	}

	/// Reject the next `times` inventory writes
	pub fn fail_set_inventory(&self, times: usize) {
		self.faults.lock().set_inventory = times;
	}

	/// Reject the next `times` ender chest writes
	pub fn fail_set_ender_chest(&self, times: usize) {
		self.faults.lock().set_ender_chest = times;
	}

	/// Panic on the next `times` ender chest writes
	pub fn panic_on_set_ender_chest(&self, times: usize) {
		self.faults.lock().panic_on_set_ender_chest = times;
	}

	pub fn fail_drop_items(&self, times: usize) {
		self.faults.lock().drop_items = times;
	}

	pub fn known_sounds(&self, sounds: &[&str]) {
		*self.known_sounds.lock() = sounds.iter().map(|s| s.to_string()).collect();
	}

	fn with_online<T>(
		&self,
		player: &PlayerId,
		f: impl FnOnce(&mut MockPlayer) -> T,
	) -> Result<T, HostError> {
		let mut players = self.players.lock();
		match players.get_mut(player) {
			Some(p) if p.online => Ok(f(p)),
			_ => Err(HostError::PlayerOffline(*player)),
		}
	}
}

impl PlayerHost for MockHost {
	fn online_players(&self) -> Vec<PlayerId> {
		let mut online: Vec<_> = self
			.players
			.lock()
			.iter()
			.filter(|(_, p)| p.online)
			.map(|(id, _)| *id)
			.collect();
		online.sort();
		online
	}

	fn is_online(&self, player: &PlayerId) -> bool {
		self.players.lock().get(player).is_some_and(|p| p.online)
	}

	fn player_name(&self, player: &PlayerId) -> Option<String> {
		self.players.lock().get(player).map(|p| p.name.clone())
	}

	fn inventory(&self, player: &PlayerId) -> Result<InventoryContents, HostError> {
		self.with_online(player, |p| p.inventory.clone())
	}

	fn set_inventory(&self, player: &PlayerId, inventory: InventoryContents) -> Result<(), HostError> {
		if take_fault(&mut self.faults.lock().set_inventory) {
			return Err(HostError::Rejected("inventory is locked".into()));
		}
		self.with_online(player, |p| p.inventory = inventory)
	}

	fn clear_inventory(&self, player: &PlayerId) -> Result<(), HostError> {
		self.with_online(player, |p| p.inventory = empty_inventory())
	}

	fn ender_chest(&self, player: &PlayerId) -> Result<EnderChestContents, HostError> {
		self.with_online(player, |p| p.ender_chest.clone())
	}

	fn set_ender_chest(
		&self,
		player: &PlayerId,
		ender_chest: EnderChestContents,
	) -> Result<(), HostError> {
		let (panic, fail) = {
			let mut faults = self.faults.lock();
			(
				take_fault(&mut faults.panic_on_set_ender_chest),
				take_fault(&mut faults.set_ender_chest),
			)
		};
		if panic {
			panic!("ender chest inventory is gone");
		}
		if fail {
			return Err(HostError::Rejected("ender chest is locked".into()));
		}
		self.with_online(player, |p| p.ender_chest = ender_chest)
	}

	fn clear_ender_chest(&self, player: &PlayerId) -> Result<(), HostError> {
		self.with_online(player, |p| p.ender_chest = empty_ender_chest())
	}

	fn drop_at_feet(&self, player: &PlayerId, items: Vec<ItemStack>) -> Result<(), HostError> {
		if take_fault(&mut self.faults.lock().drop_items) {
			return Err(HostError::Rejected("cannot drop here".into()));
		}
		self.with_online(player, |p| p.dropped.extend(items))
	}

	fn send_message(&self, player: &PlayerId, message: &str) {
		if let Some(p) = self.players.lock().get_mut(player) {
			p.messages.push(message.to_string());
		}
	}

	fn play_sound(&self, player: &PlayerId, sound: &str, _volume: f32, _pitch: f32) -> Result<(), HostError> {
		{
			let known = self.known_sounds.lock();
			if !known.is_empty() && !known.contains(sound) {
				return Err(HostError::UnknownSound(sound.to_string()));
			}
		}
		self.with_online(player, |p| p.sounds.push(sound.to_string()))
	}
}

/// A call made against [`MockEconomy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EconomyCall {
	Deposit(PlayerId, Balance),
	Withdraw(PlayerId, Balance),
}

/// Economy provider that records every mutation
pub struct MockEconomy {
	balances: Mutex<HashMap<PlayerId, Balance>>,
	calls: Mutex<Vec<EconomyCall>>,
	available: AtomicBool,
	fail_deposits: AtomicBool,
	fail_withdraws: AtomicBool,
}

impl Default for MockEconomy {
	fn default() -> Self {
		Self {
			balances: Mutex::new(HashMap::new()),
			calls: Mutex::new(Vec::new()),
			available: AtomicBool::new(true),
			fail_deposits: AtomicBool::new(false),
			fail_withdraws: AtomicBool::new(false),
		}
	}
}

impl MockEconomy {
	pub fn new() -> Self {
		Self::default()
	}

	/// Set a balance directly, without recording a call
	pub fn set(&self, player: &PlayerId, balance: Balance) {
		self.balances.lock().insert(*player, balance);
	}

	pub fn balance_of(&self, player: &PlayerId) -> Balance {
		self.balances
			.lock()
			.get(player)
			.copied()
			.unwrap_or(Balance::ZERO)
	}

	pub fn calls(&self) -> Vec<EconomyCall> {
		self.calls.lock().clone()
	}

	pub fn set_available(&self, available: bool) {
		self.available.store(available, Ordering::SeqCst);
	}

	pub fn fail_deposits(&self, fail: bool) {
		self.fail_deposits.store(fail, Ordering::SeqCst);
	}

	pub fn fail_withdraws(&self, fail: bool) {
		self.fail_withdraws.store(fail, Ordering::SeqCst);
	}
}

impl EconomyProvider for MockEconomy {
	fn name(&self) -> &str {
		"MockEconomy"
	}

	fn is_available(&self) -> bool {
		self.available.load(Ordering::SeqCst)
	}

	fn balance(&self, player: &PlayerId) -> Result<Balance, EconomyError> {
		Ok(self.balance_of(player))
	}

	fn deposit(&self, player: &PlayerId, amount: Balance) -> Result<(), EconomyError> {
		if self.fail_deposits.load(Ordering::SeqCst) {
			return Err(EconomyError::Rejected {
				operation: "deposit",
				amount,
				reason: "account frozen".into(),
			});
		}
		self.calls.lock().push(EconomyCall::Deposit(*player, amount));
		let mut balances = self.balances.lock();
		let balance = balances.entry(*player).or_insert(Balance::ZERO);
		*balance = Balance::from_cents(balance.cents() + amount.cents());
		Ok(())
	}

	fn withdraw(&self, player: &PlayerId, amount: Balance) -> Result<(), EconomyError> {
		if self.fail_withdraws.load(Ordering::SeqCst) {
			return Err(EconomyError::Rejected {
				operation: "withdraw",
				amount,
				reason: "account frozen".into(),
			});
		}
		self.calls.lock().push(EconomyCall::Withdraw(*player, amount));
		let mut balances = self.balances.lock();
		let balance = balances.entry(*player).or_insert(Balance::ZERO);
		*balance = *balance - amount;
		Ok(())
	}
}

/// Command sender that records replies
pub struct MockSender {
	name: String,
	permissions: HashSet<String>,
	replies: Mutex<Vec<String>>,
}

impl MockSender {
	pub fn new(name: &str, permissions: &[&str]) -> Self {
		Self {
			name: name.to_string(),
			permissions: permissions.iter().map(|p| p.to_string()).collect(),
			replies: Mutex::new(Vec::new()),
		}
	}

	pub fn replies(&self) -> Vec<String> {
		self.replies.lock().clone()
	}
}

impl CommandSender for MockSender {
	fn name(&self) -> String {
		self.name.clone()
	}

	fn has_permission(&self, permission: &str) -> bool {
		self.permissions.contains(permission)
	}

	fn send_message(&self, message: &str) {
		self.replies.lock().push(message.to_string());
	}
}

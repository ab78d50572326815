//! Host collaborator port
//!
//! The game server owns live player state. Everything here is called only from the host's
//! owner thread, so implementations may assume single-threaded access to player objects.

use crate::domain::{EnderChestContents, InventoryContents, ItemStack, PlayerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
	#[error("Player {0} is not online")]
	PlayerOffline(PlayerId),

	#[error("Unknown sound '{0}'")]
	UnknownSound(String),

	#[error("Host rejected the operation: {0}")]
	Rejected(String),
}

pub type Result<T> = std::result::Result<T, HostError>;

pub trait PlayerHost: Send + Sync {
	fn online_players(&self) -> Vec<PlayerId>;

	fn is_online(&self, player: &PlayerId) -> bool;

	/// Display name used in log lines
	fn player_name(&self, player: &PlayerId) -> Option<String>;

	fn inventory(&self, player: &PlayerId) -> Result<InventoryContents>;

	fn set_inventory(&self, player: &PlayerId, inventory: InventoryContents) -> Result<()>;

	fn clear_inventory(&self, player: &PlayerId) -> Result<()>;

	fn ender_chest(&self, player: &PlayerId) -> Result<EnderChestContents>;

	fn set_ender_chest(&self, player: &PlayerId, ender_chest: EnderChestContents) -> Result<()>;

	fn clear_ender_chest(&self, player: &PlayerId) -> Result<()>;

	/// Drop items into the world at the player's position
	fn drop_at_feet(&self, player: &PlayerId, items: Vec<ItemStack>) -> Result<()>;

	fn send_message(&self, player: &PlayerId, message: &str);

	fn play_sound(&self, player: &PlayerId, sound: &str, volume: f32, pitch: f32) -> Result<()>;
}

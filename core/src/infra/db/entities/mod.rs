//! Persisted player state, one table per synchronized kind
//!
//! Every table is keyed by `(uuid, server_group)` so a player has exactly one row per
//! group and kind.

pub mod economy_data;
pub mod enderchest_data;
pub mod inventory_data;

pub use economy_data::Entity as EconomyData;
pub use enderchest_data::Entity as EnderChestData;
pub use inventory_data::Entity as InventoryData;

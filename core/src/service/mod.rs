//! Services built on top of the infrastructure layer

pub mod economy;
pub mod groups;
pub mod settings;
pub mod sync;

pub use economy::{BalanceChange, EconomyAdapter, EconomyError, EconomyProvider};
pub use groups::GroupResolver;
pub use settings::{Settings, SettingsHandle};
pub use sync::{SessionState, SyncCompletion, SyncCoordinator, SyncError, SyncOutcome};

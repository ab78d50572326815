//! Administrative operations exposed to the host's command layer

pub mod reload;

pub use reload::{CommandSender, ReloadCommand, ReloadOutput, RELOAD_PERMISSION};

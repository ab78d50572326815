//! Permission-gated configuration reload

use crate::InventoryShare;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Permission node required to reload
pub const RELOAD_PERMISSION: &str = "inventoryshare.reload";

/// Whoever issued the command: a player or the console
pub trait CommandSender: Send + Sync {
	fn name(&self) -> String;

	fn has_permission(&self, permission: &str) -> bool;

	fn send_message(&self, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadOutput {
	/// Whether the reload was applied
	pub success: bool,
	/// Message sent back to the sender
	pub message: String,
}

pub struct ReloadCommand {
	app: Arc<InventoryShare>,
}

impl ReloadCommand {
	pub fn new(app: Arc<InventoryShare>) -> Self {
		Self { app }
	}

	pub async fn execute(&self, sender: &dyn CommandSender) -> ReloadOutput {
		let messages = self.app.settings().config.messages.clone();

		if !sender.has_permission(RELOAD_PERMISSION) {
			warn!(sender = %sender.name(), "Reload refused, missing permission");
			return respond(sender, false, messages.format(&messages.no_permission));
		}

		match self.app.reload().await {
			Ok(settings) => {
				info!(sender = %sender.name(), "Configuration reloaded by command");
				let messages = &settings.config.messages;
				respond(sender, true, messages.format(&messages.reload_completed))
			}
			Err(e) => {
				error!(sender = %sender.name(), error = %e, "Reload failed");
				respond(sender, false, messages.format(&messages.reload_failed))
			}
		}
	}
}

fn respond(sender: &dyn CommandSender, success: bool, message: String) -> ReloadOutput {
	sender.send_message(&message);
	ReloadOutput { success, message }
}

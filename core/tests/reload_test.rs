//! Permission-gated configuration reload

use invshare_core::{
	config::AppConfig,
	ops::{ReloadCommand, RELOAD_PERMISSION},
	testing::{IntegrationTestSetup, MockSender},
	GroupName,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

#[tokio::test]
async fn test_reload_applies_new_groups() {
	let temp_dir = TempDir::new().unwrap();
	let server = IntegrationTestSetup::with_config(temp_dir.path(), |b| {
		b.server_id("server-a").group("survival", &["server-a"])
	})
	.await
	.unwrap();

	let mut config = AppConfig::load_from(&server.config_path).unwrap();
	config
		.sharing_groups
		.insert("economy".to_string(), vec!["server-a".to_string()]);
	config.messages.prefix = "[Sync] ".to_string();
	config.save(&server.config_path).unwrap();

	let command = ReloadCommand::new(server.app.clone());
	let admin = MockSender::new("admin", &[RELOAD_PERMISSION]);
	let output = command.execute(&admin).await;

	assert!(output.success);
	assert_eq!(output.message, "[Sync] Configuration reloaded.");
	assert_eq!(admin.replies(), vec![output.message.clone()]);
	assert_eq!(
		server.app.settings().groups,
		vec![GroupName::new("survival"), GroupName::new("economy")]
	);
}

#[tokio::test]
async fn test_reload_requires_permission() {
	let temp_dir = TempDir::new().unwrap();
	let server = IntegrationTestSetup::new(temp_dir.path()).await.unwrap();

	let mut config = AppConfig::load_from(&server.config_path).unwrap();
	config.sharing_groups.clear();
	config.save(&server.config_path).unwrap();

	let command = ReloadCommand::new(server.app.clone());
	let player = MockSender::new("Steve", &[]);
	let output = command.execute(&player).await;

	assert!(!output.success);
	assert_eq!(
		output.message,
		"[AIS] You do not have permission to run this command."
	);
	assert_eq!(server.app.settings().groups, vec![GroupName::new("default")]);
}

#[tokio::test]
async fn test_invalid_file_keeps_previous_settings() {
	let temp_dir = TempDir::new().unwrap();
	let server = IntegrationTestSetup::new(temp_dir.path()).await.unwrap();

	std::fs::write(&server.config_path, "server-id = [not valid toml").unwrap();

	let command = ReloadCommand::new(server.app.clone());
	let console = MockSender::new("CONSOLE", &[RELOAD_PERMISSION]);
	let output = command.execute(&console).await;

	assert!(!output.success);
	assert_eq!(
		output.message,
		"[AIS] Configuration reload failed, see the server log."
	);
	assert_eq!(server.app.settings().groups, vec![GroupName::new("default")]);
}

#[tokio::test]
async fn test_server_identity_survives_reload() {
	let temp_dir = TempDir::new().unwrap();
	let server = IntegrationTestSetup::with_config(temp_dir.path(), |b| {
		b.server_id("server-a")
			.group("survival", &["server-a"])
			.group("creative", &["server-b"])
	})
	.await
	.unwrap();

	let mut config = AppConfig::load_from(&server.config_path).unwrap();
	config.server_id = "server-b".to_string();
	config.save(&server.config_path).unwrap();

	let settings = server.app.reload().await.unwrap();

	assert_eq!(settings.server.as_str(), "server-a");
	assert_eq!(settings.groups, vec![GroupName::new("survival")]);
}

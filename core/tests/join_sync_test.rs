//! Join pipeline: load from the shared store, fallback groups, failure handling

mod helpers;

use helpers::{ender_chest_of, new_player, sword_and_bread, StoreProbe};
use invshare_core::{
	domain::ItemStack,
	service::{SessionState, SyncOutcome},
	testing::{empty_ender_chest, empty_inventory, inventory_of, IntegrationTestSetup},
	Balance, DataKind, GroupName,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

async fn survival_server(dir: &std::path::Path, id: &str) -> IntegrationTestSetup {
	IntegrationTestSetup::with_config(dir, |b| {
		b.server_id(id).group("survival", &["server-a", "server-b"])
	})
	.await
	.unwrap()
}

#[tokio::test]
async fn test_new_player_gets_host_defaults() {
	let temp_dir = TempDir::new().unwrap();
	let mut server = survival_server(temp_dir.path(), "server-a").await;
	let player = new_player();

	server.host.join(player, "Newcomer");
	server.economy.set(&player, Balance::from_cents(1000));

	let completion = server.app.coordinator().on_join(player).unwrap();
	let outcome = server.drive(completion).await.unwrap().unwrap();

	assert_eq!(outcome, SyncOutcome::Completed);
	assert_eq!(server.host.live_inventory(&player), empty_inventory());
	assert_eq!(server.host.live_ender_chest(&player), empty_ender_chest());
	assert_eq!(server.economy.balance_of(&player), Balance::from_cents(1000));
	assert!(server.economy.calls().is_empty());

	let messages = server.host.messages(&player);
	let config = &server.app.settings().config;
	assert!(!messages.contains(&config.messages.format(&config.messages.sync_failed)));
	assert!(messages.contains(&config.messages.format(&config.messages.sync_completed)));
	assert!(!server.app.coordinator().is_syncing(&player));
}

#[tokio::test]
async fn test_inventory_follows_player_across_servers() {
	let temp_dir = TempDir::new().unwrap();
	let mut server_a = survival_server(temp_dir.path(), "server-a").await;
	let mut server_b = survival_server(temp_dir.path(), "server-b").await;
	let player = new_player();

	server_a.host.join(player, "Traveler");
	let completion = server_a.app.coordinator().on_join(player).unwrap();
	server_a.drive(completion).await.unwrap().unwrap();

	server_a.host.put_inventory(&player, sword_and_bread());
	server_a.app.coordinator().on_quit(player);
	server_a.host.leave(&player);
	server_a.app.coordinator().wait_for_writes().await;
	assert_eq!(server_a.host.live_inventory(&player), empty_inventory());

	server_b.host.join(player, "Traveler");
	let completion = server_b.app.coordinator().on_join(player).unwrap();
	let outcome = server_b.drive(completion).await.unwrap().unwrap();

	assert_eq!(outcome, SyncOutcome::Completed);
	assert_eq!(server_b.host.live_inventory(&player), sword_and_bread());
}

#[tokio::test]
async fn test_inventory_falls_back_to_later_group() {
	let temp_dir = TempDir::new().unwrap();
	let probe = StoreProbe::open(temp_dir.path()).await;
	let player = new_player();
	probe.seed_inventory(&player, "survival", &sword_and_bread()).await;
	probe
		.seed_ender_chest(&player, "survival", &ender_chest_of(&[ItemStack::new("elytra", 1)]))
		.await;

	let mut hub = IntegrationTestSetup::with_config(temp_dir.path(), |b| {
		b.server_id("hub")
			.group("creative", &["hub"])
			.group("survival", &["hub", "server-a"])
	})
	.await
	.unwrap();

	hub.host.join(player, "Wanderer");
	let completion = hub.app.coordinator().on_join(player).unwrap();
	let outcome = hub.drive(completion).await.unwrap().unwrap();

	assert_eq!(outcome, SyncOutcome::Completed);
	assert_eq!(hub.host.live_inventory(&player), sword_and_bread());
	// Ender chest only ever comes from the primary group
	assert_eq!(hub.host.live_ender_chest(&player), empty_ender_chest());
}

#[tokio::test]
async fn test_primary_group_wins_over_fallback() {
	let temp_dir = TempDir::new().unwrap();
	let probe = StoreProbe::open(temp_dir.path()).await;
	let player = new_player();
	let primary = inventory_of(&[ItemStack::new("golden_apple", 2)]);
	probe.seed_inventory(&player, "creative", &primary).await;
	probe.seed_inventory(&player, "survival", &sword_and_bread()).await;

	let mut hub = IntegrationTestSetup::with_config(temp_dir.path(), |b| {
		b.server_id("hub")
			.group("creative", &["hub"])
			.group("survival", &["hub"])
	})
	.await
	.unwrap();

	hub.host.join(player, "Wanderer");
	let completion = hub.app.coordinator().on_join(player).unwrap();
	hub.drive(completion).await.unwrap().unwrap();

	assert_eq!(hub.host.live_inventory(&player), primary);
}

#[tokio::test]
async fn test_server_outside_every_group_does_nothing() {
	let temp_dir = TempDir::new().unwrap();
	let mut lonely = IntegrationTestSetup::with_config(temp_dir.path(), |b| {
		b.server_id("lonely").group("survival", &["server-a"])
	})
	.await
	.unwrap();
	let player = new_player();

	lonely.host.join(player, "Hermit");
	lonely.host.put_inventory(&player, sword_and_bread());

	assert!(lonely.app.coordinator().on_join(player).is_none());
	assert!(!lonely.app.coordinator().is_syncing(&player));
	assert_eq!(lonely.host.live_inventory(&player), sword_and_bread());
	assert!(lonely.host.messages(&player).is_empty());

	lonely.app.coordinator().on_quit(player);
	lonely.app.coordinator().wait_for_writes().await;
	assert_eq!(lonely.host.live_inventory(&player), sword_and_bread());

	let probe = StoreProbe::open(temp_dir.path()).await;
	assert_eq!(probe.count_rows(DataKind::Inventory).await, 0);
	assert_eq!(lonely.queue.run_pending(), 0);
}

#[tokio::test]
async fn test_disconnect_before_apply_leaves_no_trace() {
	let temp_dir = TempDir::new().unwrap();
	let probe = StoreProbe::open(temp_dir.path()).await;
	let player = new_player();
	probe.seed_inventory(&player, "survival", &sword_and_bread()).await;

	let mut server = IntegrationTestSetup::with_config(temp_dir.path(), |b| {
		b.server_id("server-a")
			.group("survival", &["server-a"])
			.join_delay_ms(200)
	})
	.await
	.unwrap();

	server.host.join(player, "Flaky");
	let completion = server.app.coordinator().on_join(player).unwrap();
	assert_eq!(
		server.app.coordinator().session_state(&player),
		Some(SessionState::ClearingLocal)
	);

	server.host.leave(&player);
	let outcome = server.drive(completion).await.unwrap().unwrap();

	assert_eq!(outcome, SyncOutcome::Aborted);
	assert!(!server.app.coordinator().is_syncing(&player));
	assert_eq!(server.host.live_inventory(&player), empty_inventory());

	server.app.coordinator().wait_for_writes().await;
	assert_eq!(probe.count_rows(DataKind::Inventory).await, 1);
	assert_eq!(
		probe.inventory(&player, "survival").await,
		Some(sword_and_bread())
	);
}

#[tokio::test]
async fn test_failed_ender_chest_apply_restores_backup() {
	let temp_dir = TempDir::new().unwrap();
	let probe = StoreProbe::open(temp_dir.path()).await;
	let player = new_player();
	probe.seed_inventory(&player, "survival", &sword_and_bread()).await;
	probe
		.seed_ender_chest(&player, "survival", &ender_chest_of(&[ItemStack::new("elytra", 1)]))
		.await;

	let mut server = survival_server(temp_dir.path(), "server-b").await;
	let local_chest = ender_chest_of(&[ItemStack::new("emerald", 12)]);
	server.host.join(player, "Unlucky");
	server.host.put_ender_chest(&player, local_chest.clone());
	server.host.panic_on_set_ender_chest(1);

	let completion = server.app.coordinator().on_join(player).unwrap();
	let outcome = server.drive(completion).await.unwrap().unwrap();

	assert_eq!(outcome, SyncOutcome::Failed);
	assert_eq!(server.host.live_inventory(&player), sword_and_bread());
	assert_eq!(server.host.live_ender_chest(&player), local_chest);
	assert!(!server.app.coordinator().is_syncing(&player));

	let config = &server.app.settings().config;
	assert!(server
		.host
		.messages(&player)
		.contains(&config.messages.format(&config.messages.sync_failed)));
	assert!(server.host.sounds(&player).is_empty());
}

#[tokio::test]
async fn test_rejected_ender_chest_apply_restores_backup() {
	let temp_dir = TempDir::new().unwrap();
	let probe = StoreProbe::open(temp_dir.path()).await;
	let player = new_player();
	probe.seed_inventory(&player, "survival", &sword_and_bread()).await;
	probe
		.seed_ender_chest(&player, "survival", &ender_chest_of(&[ItemStack::new("elytra", 1)]))
		.await;

	let mut server = survival_server(temp_dir.path(), "server-b").await;
	let local_chest = ender_chest_of(&[ItemStack::new("emerald", 12)]);
	server.host.join(player, "Unlucky");
	server.host.put_ender_chest(&player, local_chest.clone());

	// Both the apply and the restore are rejected
	server.host.fail_set_ender_chest(2);

	let completion = server.app.coordinator().on_join(player).unwrap();
	let outcome = server.drive(completion).await.unwrap().unwrap();

	assert_eq!(outcome, SyncOutcome::Failed);
	assert_eq!(server.host.live_inventory(&player), sword_and_bread());
	assert_eq!(server.host.live_ender_chest(&player), empty_ender_chest());
	assert_eq!(
		probe.ender_chest(&player, "survival").await,
		Some(ender_chest_of(&[ItemStack::new("elytra", 1)]))
	);
}

#[tokio::test]
async fn test_items_gained_during_sync_are_dropped() {
	let temp_dir = TempDir::new().unwrap();
	let probe = StoreProbe::open(temp_dir.path()).await;
	let player = new_player();
	probe.seed_inventory(&player, "survival", &sword_and_bread()).await;

	let mut server = IntegrationTestSetup::with_config(temp_dir.path(), |b| {
		b.server_id("server-a")
			.group("survival", &["server-a"])
			.join_delay_ms(50)
	})
	.await
	.unwrap();

	server.host.join(player, "Collector");
	let completion = server.app.coordinator().on_join(player).unwrap();

	assert!(server.app.coordinator().should_cancel_pickup(&player));
	// A pickup the host failed to cancel
	server.host.pick_up(&player, ItemStack::new("cobblestone", 64));

	let outcome = server.drive(completion).await.unwrap().unwrap();

	assert_eq!(outcome, SyncOutcome::Completed);
	assert!(!server.app.coordinator().should_cancel_pickup(&player));
	assert_eq!(
		server.host.dropped(&player),
		vec![ItemStack::new("cobblestone", 64)]
	);
	assert_eq!(server.host.live_inventory(&player), sword_and_bread());

	let config = &server.app.settings().config;
	assert!(server
		.host
		.messages(&player)
		.contains(&config.messages.format(&config.messages.items_dropped)));
}

#[tokio::test]
async fn test_items_that_cannot_be_dropped_are_merged() {
	let temp_dir = TempDir::new().unwrap();
	let probe = StoreProbe::open(temp_dir.path()).await;
	let player = new_player();
	probe.seed_inventory(&player, "survival", &sword_and_bread()).await;

	let mut server = IntegrationTestSetup::with_config(temp_dir.path(), |b| {
		b.server_id("server-a")
			.group("survival", &["server-a"])
			.join_delay_ms(50)
	})
	.await
	.unwrap();

	server.host.join(player, "Hoarder");
	server.host.fail_drop_items(1);
	let completion = server.app.coordinator().on_join(player).unwrap();
	server.host.pick_up(&player, ItemStack::new("diamond_block", 64));

	let outcome = server.drive(completion).await.unwrap().unwrap();

	assert_eq!(outcome, SyncOutcome::Completed);
	assert!(server.host.dropped(&player).is_empty());

	let mut expected = sword_and_bread();
	expected.storage[2] = Some(ItemStack::new("diamond_block", 64));
	assert_eq!(server.host.live_inventory(&player), expected);
}

#[tokio::test]
async fn test_undroppable_items_without_room_keep_live_inventory() {
	let temp_dir = TempDir::new().unwrap();
	let probe = StoreProbe::open(temp_dir.path()).await;
	let player = new_player();
	let full: Vec<ItemStack> = (0..36).map(|_| ItemStack::new("stone", 64)).collect();
	probe.seed_inventory(&player, "survival", &inventory_of(&full)).await;

	let mut server = IntegrationTestSetup::with_config(temp_dir.path(), |b| {
		b.server_id("server-a")
			.group("survival", &["server-a"])
			.join_delay_ms(50)
	})
	.await
	.unwrap();

	server.host.join(player, "Packrat");
	server.host.fail_drop_items(1);
	let completion = server.app.coordinator().on_join(player).unwrap();
	server.host.pick_up(&player, ItemStack::new("diamond_block", 64));

	let outcome = server.drive(completion).await.unwrap().unwrap();

	assert_eq!(outcome, SyncOutcome::Failed);
	assert_eq!(
		server.host.live_inventory(&player),
		inventory_of(&[ItemStack::new("diamond_block", 64)])
	);
	let config = &server.app.settings().config;
	assert!(server
		.host
		.messages(&player)
		.contains(&config.messages.format(&config.messages.sync_failed)));
}

#[tokio::test]
async fn test_new_player_keeps_starting_items() {
	let temp_dir = TempDir::new().unwrap();
	let mut server = survival_server(temp_dir.path(), "server-a").await;
	let player = new_player();
	let starter_kit = inventory_of(&[
		ItemStack::new("wooden_sword", 1),
		ItemStack::new("bread", 5),
	]);
	let starter_chest = ender_chest_of(&[ItemStack::new("torch", 16)]);

	server.host.join(player, "Fresh");
	server.host.put_inventory(&player, starter_kit.clone());
	server.host.put_ender_chest(&player, starter_chest.clone());

	let completion = server.app.coordinator().on_join(player).unwrap();
	let outcome = server.drive(completion).await.unwrap().unwrap();

	assert_eq!(outcome, SyncOutcome::Completed);
	assert_eq!(server.host.live_inventory(&player), starter_kit);
	assert_eq!(server.host.live_ender_chest(&player), starter_chest);
	assert!(server.economy.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_completion_sound_falls_back_to_default() {
	let temp_dir = TempDir::new().unwrap();
	let mut server = IntegrationTestSetup::with_config(temp_dir.path(), |b| {
		b.server_id("server-a")
			.group("survival", &["server-a"])
			.completion_sound("NOT_A_REAL_SOUND")
	})
	.await
	.unwrap();
	let player = new_player();

	server.host.known_sounds(&["ENTITY_PLAYER_LEVELUP"]);
	server.host.join(player, "Listener");
	let completion = server.app.coordinator().on_join(player).unwrap();
	server.drive(completion).await.unwrap().unwrap();

	assert_eq!(
		server.host.sounds(&player),
		vec!["ENTITY_PLAYER_LEVELUP".to_string()]
	);
}

#[tokio::test]
async fn test_ender_chest_left_alone_when_disabled() {
	let temp_dir = TempDir::new().unwrap();
	let probe = StoreProbe::open(temp_dir.path()).await;
	let player = new_player();
	probe
		.seed_ender_chest(&player, "survival", &ender_chest_of(&[ItemStack::new("elytra", 1)]))
		.await;

	let mut server = IntegrationTestSetup::with_config(temp_dir.path(), |b| {
		b.server_id("server-a")
			.group("survival", &["server-a"])
			.sync_enderchest(false)
	})
	.await
	.unwrap();

	let local_chest = ender_chest_of(&[ItemStack::new("emerald", 12)]);
	server.host.join(player, "Keeper");
	server.host.put_ender_chest(&player, local_chest.clone());

	let completion = server.app.coordinator().on_join(player).unwrap();
	server.drive(completion).await.unwrap().unwrap();
	assert_eq!(server.host.live_ender_chest(&player), local_chest);

	server.app.coordinator().on_quit(player);
	server.app.coordinator().wait_for_writes().await;
	assert_eq!(
		probe.ender_chest(&player, "survival").await,
		Some(ender_chest_of(&[ItemStack::new("elytra", 1)]))
	);
	assert_eq!(server.host.live_ender_chest(&player), local_chest);
}

#[tokio::test]
async fn test_resync_from_fixed_group() {
	let temp_dir = TempDir::new().unwrap();
	let probe = StoreProbe::open(temp_dir.path()).await;
	let player = new_player();
	probe.seed_inventory(&player, "creative", &sword_and_bread()).await;

	let mut server = IntegrationTestSetup::with_config(temp_dir.path(), |b| {
		b.server_id("server-a")
			.group("survival", &["server-a"])
			.group("creative", &["server-c"])
	})
	.await
	.unwrap();

	server.host.join(player, "Admin");
	let completion = server.app.coordinator().on_join(player).unwrap();
	server.drive(completion).await.unwrap().unwrap();

	let local_chest = ender_chest_of(&[ItemStack::new("emerald", 12)]);
	server.host.put_ender_chest(&player, local_chest.clone());

	assert!(server
		.app
		.coordinator()
		.resync_from_group(player, GroupName::new("missing"))
		.is_err());

	let completion = server
		.app
		.coordinator()
		.resync_from_group(player, GroupName::new("creative"))
		.unwrap();
	let outcome = server.drive(completion).await.unwrap().unwrap();

	assert_eq!(outcome, SyncOutcome::Completed);
	assert_eq!(server.host.live_inventory(&player), sword_and_bread());
	// No ender chest stored in the group, so the local one comes back
	assert_eq!(server.host.live_ender_chest(&player), local_chest);
}

//! Record of writes that exhausted their retries
//!
//! Each entry is logged at error level and, when a path is configured, appended as one JSON
//! line so an operator can replay it later. Payload bytes are base64-encoded.

use crate::domain::{DataKind, GroupName, PlayerId};
use crate::infra::db::Payload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
	pub player: PlayerId,
	pub group: GroupName,
	pub kind: DataKind,
	/// base64 of the encoded container, or the balance in hundredths
	pub payload: String,
	pub attempts: u32,
	pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
	pub fn new(player: &PlayerId, group: &GroupName, payload: &Payload, attempts: u32) -> Self {
		let encoded = match payload {
			Payload::Inventory(bytes) | Payload::EnderChest(bytes) => STANDARD.encode(bytes),
			Payload::Balance(balance) => balance.cents().to_string(),
		};

		Self {
			player: *player,
			group: group.clone(),
			kind: payload.kind(),
			payload: encoded,
			attempts,
			failed_at: Utc::now(),
		}
	}
}

/// Serializes appends so concurrent writers never interleave lines
#[derive(Default)]
pub struct DeadLetterLog {
	write_lock: Mutex<()>,
}

impl DeadLetterLog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Log `letter` and append it to `path` when one is configured
	pub async fn record(&self, path: Option<&Path>, letter: DeadLetter) {
		error!(
			player = %letter.player,
			group = %letter.group,
			kind = %letter.kind,
			attempts = letter.attempts,
			"Write failed after all retries, recorded as dead letter"
		);

		let Some(path) = path else {
			return;
		};

		if let Err(e) = self.append(path, &letter).await {
			warn!(path = %path.display(), error = %e, "Failed to append dead letter");
		}
	}

	async fn append(&self, path: &Path, letter: &DeadLetter) -> std::io::Result<()> {
		let mut line = serde_json::to_vec(letter)?;
		line.push(b'\n');

		let _guard = self.write_lock.lock().await;
		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		let mut file = tokio::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(path)
			.await?;
		file.write_all(&line).await?;
		file.flush().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::domain::Balance;
	use uuid::Uuid;

	#[tokio::test]
	async fn test_appends_one_json_line_per_letter() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("logs").join("dead-letters.jsonl");
		let log = DeadLetterLog::new();

		let player = PlayerId::new(Uuid::new_v4());
		let group = GroupName::new("survival");

		log.record(
			Some(path.as_path()),
			DeadLetter::new(&player, &group, &Payload::Inventory(vec![1, 2, 3]), 3),
		)
		.await;
		log.record(
			Some(path.as_path()),
			DeadLetter::new(
				&player,
				&group,
				&Payload::Balance(Balance::from_cents(12050)),
				3,
			),
		)
		.await;

		let raw = std::fs::read_to_string(&path).unwrap();
		let letters: Vec<DeadLetter> = raw
			.lines()
			.map(|line| serde_json::from_str(line).unwrap())
			.collect();

		assert_eq!(letters.len(), 2);
		assert_eq!(letters[0].kind, DataKind::Inventory);
		assert_eq!(STANDARD.decode(&letters[0].payload).unwrap(), vec![1, 2, 3]);
		assert_eq!(letters[1].kind, DataKind::Balance);
		assert_eq!(letters[1].payload, "12050");
	}
}

//! Configuration management
//!
//! The configuration file is read once, deserialized into typed sections and validated
//! before anything else starts. Reloads go through the same path.

use std::path::PathBuf;
use thiserror::Error;

pub mod app_config;

pub use app_config::{
	AppConfig, CompletionSound, DatabaseConfig, DatabaseEngine, Messages, RetryConfig,
	ServerProfile, SyncOptions,
};

/// File name used when the host does not point us at a specific configuration file
pub const DEFAULT_CONFIG_FILE: &str = "inventory-share.toml";

/// Longest sharing group name the store's key column holds
pub const MAX_GROUP_NAME_LEN: usize = 64;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("Failed to read configuration {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse configuration {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("Failed to write default configuration: {0}")]
	Serialize(#[from] toml::ser::Error),

	#[error("Invalid configuration: {0}")]
	Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

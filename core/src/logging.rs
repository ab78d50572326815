//! Tracing setup for hosts that do not install their own subscriber

use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
	filter::LevelFilter,
	fmt::{self, Layer},
	prelude::*,
	EnvFilter,
};

/// Directive used when `RUST_LOG` is not set
pub const DEFAULT_DIRECTIVES: &str = "warn,invshare_core=info";

#[cfg(debug_assertions)]
const CONSOLE_LOG_FILTER: LevelFilter = LevelFilter::DEBUG;

#[cfg(not(debug_assertions))]
const CONSOLE_LOG_FILTER: LevelFilter = LevelFilter::INFO;

#[derive(Debug, Error)]
pub enum LoggingError {
	#[error("Invalid log directive: {0}")]
	Directive(#[from] tracing_subscriber::filter::ParseError),

	#[error("A global tracing subscriber is already installed")]
	AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
	/// Overrides `RUST_LOG` and [`DEFAULT_DIRECTIVES`]
	pub directives: Option<String>,
	/// Directory for daily-rolling log files; console only when unset
	pub log_dir: Option<PathBuf>,
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop and must be kept alive for as long
/// as file logging is wanted.
pub fn init_logging(options: LoggingOptions) -> Result<Option<WorkerGuard>, LoggingError> {
	let filter = match &options.directives {
		Some(directives) => EnvFilter::builder().parse(directives)?,
		None => EnvFilter::builder()
			.with_default_directive(LevelFilter::WARN.into())
			.try_from_env()
			.or_else(|_| EnvFilter::builder().parse(DEFAULT_DIRECTIVES))?,
	};

	let (file_layer, guard) = match &options.log_dir {
		Some(dir) => {
			let (non_blocking, guard) =
				tracing_appender::non_blocking(rolling::daily(dir, "inventory-share.log"));
			let layer = Layer::default()
				.with_writer(non_blocking)
				.with_ansi(false)
				.with_filter(LevelFilter::DEBUG);
			(Some(layer), Some(guard))
		}
		None => (None, None),
	};

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_filter(CONSOLE_LOG_FILTER))
		.with(file_layer)
		.try_init()?;

	Ok(guard)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_invalid_directive_is_rejected_before_install() {
		let result = init_logging(LoggingOptions {
			directives: Some("invshare_core=chatty".to_string()),
			log_dir: None,
		});
		assert!(matches!(result, Err(LoggingError::Directive(_))));
	}
}

//! Viewer configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading a [`ViewerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse viewer config: {0}")]
	Parse(#[from] toml::de::Error),
}

/// Tunables shared by every session a viewer opens.
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
	/// Factor applied by zoom in/out commands.
	pub zoom_step: f64,
	/// Factor applied per mouse wheel notch.
	pub wheel_zoom_step: f64,
	/// Capacity of each session's message queue.
	pub mailbox_capacity: usize,
	/// Capacity of each session's notice broadcast channel.
	pub notice_capacity: usize,
	/// Maximum number of job events held while a start is unacknowledged.
	pub parked_event_limit: usize,
	/// Deadline after which a running job is failed locally.
	pub job_timeout_ms: Option<u64>,
}

impl Default for ViewerConfig {
	fn default() -> Self {
		Self {
			zoom_step: 1.2,
			wheel_zoom_step: 1.12,
			mailbox_capacity: 256,
			notice_capacity: 64,
			parked_event_limit: 8,
			job_timeout_ms: None,
		}
	}
}

impl ViewerConfig {
	/// Reads and parses a TOML config file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&text)
	}

	/// Parses a TOML document, replacing out-of-range values with defaults.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		Ok(config.normalized())
	}

	/// Returns a copy where every value is usable: zoom steps above 1 and
	/// channel capacities of at least 1.
	#[must_use]
	pub fn normalized(self) -> Self {
		let defaults = Self::default();
		let step = |value: f64, fallback: f64| if value.is_finite() && value > 1.0 { value } else { fallback };
		Self {
			zoom_step: step(self.zoom_step, defaults.zoom_step),
			wheel_zoom_step: step(self.wheel_zoom_step, defaults.wheel_zoom_step),
			mailbox_capacity: self.mailbox_capacity.max(1),
			notice_capacity: self.notice_capacity.max(1),
			parked_event_limit: self.parked_event_limit,
			job_timeout_ms: self.job_timeout_ms.filter(|&ms| ms > 0),
		}
	}

	pub fn job_timeout(&self) -> Option<Duration> {
		self.job_timeout_ms.map(Duration::from_millis)
	}
}

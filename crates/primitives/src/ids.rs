use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for one open viewer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "viewer-{}", self.0)
	}
}

/// Backend-assigned identifier of a long-running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "job {}", self.0)
	}
}

/// Freshness token tagging one frame render request.
///
/// Strictly increases per session. A response is applied only if it carries the
/// token that is current when the response is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct FrameToken(pub u64);

impl FrameToken {
	#[must_use]
	pub const fn next(self) -> Self {
		Self(self.0.wrapping_add(1))
	}
}

/// Freshness token tagging one job start request.
///
/// Independent of [`FrameToken`]; the two counters never interact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct JobToken(pub u64);

impl JobToken {
	#[must_use]
	pub const fn next(self) -> Self {
		Self(self.0.wrapping_add(1))
	}
}

/// Sequential integer ID generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterIdGen(u64);

impl CounterIdGen {
	/// Creates a generator whose first ID is 1.
	#[must_use]
	pub const fn new() -> Self {
		Self(0)
	}

	/// Returns the next ID.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> u64 {
		self.0 = self.0.saturating_add(1);
		self.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_id_displays_as_window_label() {
		assert_eq!(SessionId(3).to_string(), "viewer-3");
	}

	#[test]
	fn counter_starts_at_one_and_increases() {
		let mut ids = CounterIdGen::new();
		assert_eq!(ids.next(), 1);
		assert_eq!(ids.next(), 2);
	}

	#[test]
	fn tokens_advance() {
		assert_eq!(FrameToken::default().next(), FrameToken(1));
		assert_eq!(JobToken(7).next(), JobToken(8));
	}
}

//! Frame request freshness.
//!
//! Every render request is tagged with a [`FrameToken`]. A response is applied
//! only when its token is still the latest one issued *and* still pending, so
//! superseded responses are dropped whatever order they arrive in, and a
//! duplicate response for a settled token is dropped too.

use ijview_primitives::{AxisPosition, FrameToken};

/// The single outstanding render request a session cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFrame {
	pub token: FrameToken,
	pub position: AxisPosition,
}

/// How a render response was classified.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameResolution<T, E> {
	/// The response answers the latest request.
	Accepted { position: AxisPosition, value: T },
	/// The latest request failed.
	Failed { position: AxisPosition, error: E },
	/// The response was superseded or already settled.
	Stale,
}

/// Issues frame tokens and decides which responses may be applied.
#[derive(Debug, Default)]
pub struct FrameCoordinator {
	latest: FrameToken,
	pending: Option<PendingFrame>,
}

impl FrameCoordinator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Most recently issued token.
	pub const fn latest(&self) -> FrameToken {
		self.latest
	}

	/// Request still awaiting its response.
	pub const fn pending(&self) -> Option<PendingFrame> {
		self.pending
	}

	pub const fn is_pending(&self) -> bool {
		self.pending.is_some()
	}

	/// Issues a new token for `position`, superseding any outstanding request.
	pub fn issue(&mut self, position: AxisPosition) -> FrameToken {
		self.latest = self.latest.next();
		self.pending = Some(PendingFrame {
			token: self.latest,
			position,
		});
		self.latest
	}

	/// Classifies the response for `token`, settling it when it is current.
	pub fn resolve<T, E>(&mut self, token: FrameToken, result: Result<T, E>) -> FrameResolution<T, E> {
		if token != self.latest {
			return FrameResolution::Stale;
		}
		let Some(pending) = self.pending.take_if(|pending| pending.token == token) else {
			return FrameResolution::Stale;
		};
		match result {
			Ok(value) => FrameResolution::Accepted {
				position: pending.position,
				value,
			},
			Err(error) => FrameResolution::Failed {
				position: pending.position,
				error,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	fn at(z: usize) -> AxisPosition {
		AxisPosition::new(z, 0, 0)
	}

	#[test]
	fn tokens_strictly_increase() {
		let mut frames = FrameCoordinator::new();
		let a = frames.issue(at(0));
		let b = frames.issue(at(0));
		assert!(b > a);
		assert_eq!(frames.latest(), b);
	}

	#[test]
	fn older_response_after_newer_request_is_stale() {
		let mut frames = FrameCoordinator::new();
		let first = frames.issue(at(1));
		let _second = frames.issue(at(2));
		assert_eq!(frames.resolve::<_, ()>(first, Ok("one")), FrameResolution::Stale);
		assert!(frames.is_pending());
	}

	#[test]
	fn current_response_is_applied_once() {
		let mut frames = FrameCoordinator::new();
		let token = frames.issue(at(4));
		assert_eq!(
			frames.resolve::<_, ()>(token, Ok("frame")),
			FrameResolution::Accepted {
				position: at(4),
				value: "frame",
			}
		);
		assert_eq!(frames.resolve::<_, ()>(token, Ok("frame")), FrameResolution::Stale);
		assert!(!frames.is_pending());
	}

	#[test]
	fn stale_failure_is_swallowed() {
		let mut frames = FrameCoordinator::new();
		let first = frames.issue(at(0));
		let second = frames.issue(at(1));
		assert_eq!(frames.resolve::<(), _>(first, Err("boom")), FrameResolution::Stale);
		assert_eq!(
			frames.resolve::<(), _>(second, Err("boom")),
			FrameResolution::Failed {
				position: at(1),
				error: "boom",
			}
		);
	}

	proptest! {
		#[test]
		fn burst_applies_only_last_request(order in Just((0..12usize).collect::<Vec<_>>()).prop_shuffle()) {
			let mut frames = FrameCoordinator::new();
			let tokens: Vec<_> = (0..12).map(|z| frames.issue(at(z))).collect();
			let mut applied = Vec::new();
			for index in order {
				if let FrameResolution::Accepted { position, .. } = frames.resolve::<_, ()>(tokens[index], Ok(index)) {
					applied.push(position);
				}
			}
			prop_assert_eq!(applied, vec![at(11)]);
		}
	}
}

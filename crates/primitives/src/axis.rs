use serde::{Deserialize, Serialize};

/// Position along the non-spatial axes of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AxisPosition {
	pub z: usize,
	pub t: usize,
	pub channel: usize,
}

impl AxisPosition {
	pub const fn new(z: usize, t: usize, channel: usize) -> Self {
		Self { z, t, channel }
	}

	/// Returns a copy with the supplied components replaced.
	#[must_use]
	pub fn with(self, z: Option<usize>, t: Option<usize>, channel: Option<usize>) -> Self {
		Self {
			z: z.unwrap_or(self.z),
			t: t.unwrap_or(self.t),
			channel: channel.unwrap_or(self.channel),
		}
	}
}

/// Number of slices along each non-spatial axis.
///
/// Datasets lacking an axis report an extent of 1 for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisExtents {
	pub z_slices: usize,
	pub times: usize,
	pub channels: usize,
}

impl Default for AxisExtents {
	fn default() -> Self {
		Self {
			z_slices: 1,
			times: 1,
			channels: 1,
		}
	}
}

impl AxisExtents {
	pub const fn new(z_slices: usize, times: usize, channels: usize) -> Self {
		Self { z_slices, times, channels }
	}

	/// Clamps every component of `position` to the last valid index.
	pub fn clamp(&self, position: AxisPosition) -> AxisPosition {
		AxisPosition {
			z: position.z.min(self.z_slices.saturating_sub(1)),
			t: position.t.min(self.times.saturating_sub(1)),
			channel: position.channel.min(self.channels.saturating_sub(1)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clamp_limits_each_axis() {
		let extents = AxisExtents::new(5, 2, 3);
		assert_eq!(extents.clamp(AxisPosition::new(9, 1, 7)), AxisPosition::new(4, 1, 2));
	}

	#[test]
	fn clamp_handles_empty_extent() {
		let extents = AxisExtents::new(0, 0, 0);
		assert_eq!(extents.clamp(AxisPosition::new(3, 3, 3)), AxisPosition::default());
	}

	#[test]
	fn with_replaces_only_supplied_components() {
		let position = AxisPosition::new(1, 2, 3).with(None, Some(5), None);
		assert_eq!(position, AxisPosition::new(1, 5, 3));
	}
}

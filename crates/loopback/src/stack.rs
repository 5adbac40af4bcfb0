//! Dense five-dimensional image stacks.

use std::path::PathBuf;

use ijview_proto::ImageSummary;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::ops::OpError;

/// Axis labels of a [`Stack`], outermost first.
pub const AXES: &str = "ZTCYX";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
	#[error("stack shape {shape:?} has a zero-length axis")]
	EmptyAxis { shape: StackShape },
	#[error("stack shape {shape:?} needs {expected} values, got {actual}")]
	DataLength { shape: StackShape, expected: usize, actual: usize },
}

/// Extents of a stack along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackShape {
	pub z: usize,
	pub t: usize,
	pub c: usize,
	pub height: usize,
	pub width: usize,
}

impl StackShape {
	pub const fn new(z: usize, t: usize, c: usize, height: usize, width: usize) -> Self {
		Self { z, t, c, height, width }
	}

	/// Pixels in one YX plane.
	pub const fn plane_len(&self) -> usize {
		self.height * self.width
	}

	pub const fn planes(&self) -> usize {
		self.z * self.t * self.c
	}

	pub const fn len(&self) -> usize {
		self.planes() * self.plane_len()
	}

	pub const fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn plane_index(&self, z: usize, t: usize, c: usize) -> Option<usize> {
		(z < self.z && t < self.t && c < self.c).then(|| (z * self.t + t) * self.c + c)
	}
}

#[derive(Deserialize)]
struct StackParts {
	shape: StackShape,
	data: Vec<f32>,
}

/// Immutable `z × t × c × h × w` array of raw samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StackParts")]
pub struct Stack {
	shape: StackShape,
	data: Vec<f32>,
}

impl TryFrom<StackParts> for Stack {
	type Error = StackError;

	fn try_from(parts: StackParts) -> Result<Self, Self::Error> {
		Self::new(parts.shape, parts.data)
	}
}

impl Stack {
	/// Wraps ZTCYX-ordered samples, checking them against `shape`.
	pub fn new(shape: StackShape, data: Vec<f32>) -> Result<Self, StackError> {
		if shape.is_empty() {
			return Err(StackError::EmptyAxis { shape });
		}
		if data.len() != shape.len() {
			return Err(StackError::DataLength {
				shape,
				expected: shape.len(),
				actual: data.len(),
			});
		}
		Ok(Self { shape, data })
	}

	/// Deterministic test pattern: a diagonal ramp per plane, offset by the
	/// plane's z, t, and channel so every plane renders differently.
	pub fn synthetic(shape: StackShape) -> Result<Self, StackError> {
		let mut data = Vec::with_capacity(shape.len());
		for z in 0..shape.z {
			for t in 0..shape.t {
				for c in 0..shape.c {
					let offset = (z * 16 + t * 4 + c * 32) as f32;
					for y in 0..shape.height {
						for x in 0..shape.width {
							data.push(offset + (x + y) as f32);
						}
					}
				}
			}
		}
		Self::new(shape, data)
	}

	pub const fn shape(&self) -> StackShape {
		self.shape
	}

	pub fn data(&self) -> &[f32] {
		&self.data
	}

	/// Samples of one 2D plane in row-major order.
	pub fn plane(&self, z: usize, t: usize, c: usize) -> Option<&[f32]> {
		let index = self.shape.plane_index(z, t, c)?;
		let len = self.shape.plane_len();
		self.data.get(index * len..(index + 1) * len)
	}

	/// Finite sample range over the whole stack.
	pub fn min_max(&self) -> (f32, f32) {
		min_max(&self.data)
	}

	pub fn summary(&self, source: PathBuf) -> ImageSummary {
		let shape = self.shape;
		let (min, max) = self.min_max();
		ImageSummary {
			shape: vec![shape.z, shape.t, shape.c, shape.height, shape.width],
			axes: AXES.to_string(),
			channels: shape.c,
			z_slices: shape.z,
			times: shape.t,
			min,
			max,
			source,
		}
	}

	/// Builds a same-shaped stack by transforming each plane in turn.
	///
	/// `cancel` is checked between planes; a cancelled token aborts with
	/// [`OpError::Cancelled`].
	pub fn map_planes(
		&self,
		cancel: &CancellationToken,
		mut f: impl FnMut(&[f32], StackShape) -> Vec<f32>,
	) -> Result<Self, OpError> {
		let mut data = Vec::with_capacity(self.data.len());
		for plane in self.data.chunks(self.shape.plane_len()) {
			if cancel.is_cancelled() {
				return Err(OpError::Cancelled);
			}
			data.extend(f(plane, self.shape));
		}
		Self::new(self.shape, data).map_err(|error| OpError::Failed(error.to_string()))
	}

	/// Applies `f` to every sample.
	pub fn map_values(&self, cancel: &CancellationToken, f: impl Fn(f32) -> f32) -> Result<Self, OpError> {
		self.map_planes(cancel, |plane, _| plane.iter().map(|&value| f(value)).collect())
	}
}

/// Smallest and largest finite sample, or `(0, 0)` when there is none.
pub fn min_max(values: &[f32]) -> (f32, f32) {
	let mut finite = values.iter().copied().filter(|value| value.is_finite());
	let Some(first) = finite.next() else {
		return (0.0, 0.0);
	};
	finite.fold((first, first), |(min, max), value| (min.min(value), max.max(value)))
}

//! Rendered frames.
//!
//! A [`Frame`] is produced by the backend for one axis position and is never
//! mutated afterwards; sessions replace it wholesale.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::PixelCoord;

/// Number of bins in every frame histogram.
pub const HISTOGRAM_BINS: usize = 256;

/// Errors raised when assembling a frame from backend data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
	#[error("raster has {actual} samples, expected {expected} for {width}x{height}")]
	RasterSize {
		width: usize,
		height: usize,
		expected: usize,
		actual: usize,
	},
	#[error("histogram has {0} bins, expected {HISTOGRAM_BINS}")]
	HistogramBins(usize),
}

/// Raw-value range mapped onto the 8-bit display scale.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplayRange {
	pub min: f32,
	pub max: f32,
}

impl DisplayRange {
	pub const fn new(min: f32, max: f32) -> Self {
		Self { min, max }
	}

	/// Maps an 8-bit display sample back to the raw value scale.
	pub fn value_of(&self, sample: u8) -> f32 {
		self.min + (f32::from(sample) / 255.0) * (self.max - self.min)
	}
}

/// Fixed-size intensity histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct Histogram(Vec<u32>);

impl Histogram {
	pub fn from_counts(counts: Vec<u32>) -> Result<Self, FrameError> {
		if counts.len() != HISTOGRAM_BINS {
			return Err(FrameError::HistogramBins(counts.len()));
		}
		Ok(Self(counts))
	}

	pub fn counts(&self) -> &[u32] {
		&self.0
	}

	/// Tallest bin, used to scale bar-chart renderings.
	pub fn peak(&self) -> u32 {
		self.0.iter().copied().max().unwrap_or(0)
	}

	/// Sum of all bin counts.
	pub fn total(&self) -> u64 {
		self.0.iter().map(|&count| u64::from(count)).sum()
	}
}

impl Default for Histogram {
	fn default() -> Self {
		Self(vec![0; HISTOGRAM_BINS])
	}
}

impl TryFrom<Vec<u32>> for Histogram {
	type Error = FrameError;

	fn try_from(counts: Vec<u32>) -> Result<Self, Self::Error> {
		Self::from_counts(counts)
	}
}

impl From<Histogram> for Vec<u32> {
	fn from(histogram: Histogram) -> Self {
		histogram.0
	}
}

/// One inspected pixel: its index and its value on the raw scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
	pub x: usize,
	pub y: usize,
	pub value: f32,
}

#[derive(Deserialize)]
struct FrameParts {
	width: usize,
	height: usize,
	pixels: Vec<u8>,
	histogram: Histogram,
	range: DisplayRange,
}

/// An immutable rendered raster plus histogram and display range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FrameParts")]
pub struct Frame {
	width: usize,
	height: usize,
	pixels: Vec<u8>,
	histogram: Histogram,
	range: DisplayRange,
}

impl TryFrom<FrameParts> for Frame {
	type Error = FrameError;

	fn try_from(parts: FrameParts) -> Result<Self, Self::Error> {
		Self::new(parts.width, parts.height, parts.pixels, parts.histogram, parts.range)
	}
}

impl Frame {
	/// Assembles a frame, checking that the raster covers `width * height`.
	pub fn new(width: usize, height: usize, pixels: Vec<u8>, histogram: Histogram, range: DisplayRange) -> Result<Self, FrameError> {
		let expected = width.saturating_mul(height);
		if pixels.len() != expected {
			return Err(FrameError::RasterSize {
				width,
				height,
				expected,
				actual: pixels.len(),
			});
		}
		Ok(Self {
			width,
			height,
			pixels,
			histogram,
			range,
		})
	}

	pub const fn width(&self) -> usize {
		self.width
	}

	pub const fn height(&self) -> usize {
		self.height
	}

	/// Row-major 8-bit display samples.
	pub fn pixels(&self) -> &[u8] {
		&self.pixels
	}

	pub fn histogram(&self) -> &Histogram {
		&self.histogram
	}

	pub const fn range(&self) -> DisplayRange {
		self.range
	}

	/// Reads the pixel at `coord`, or `None` outside the raster.
	pub fn sample(&self, coord: PixelCoord) -> Option<Sample> {
		if coord.x >= self.width || coord.y >= self.height {
			return None;
		}
		let gray = *self.pixels.get(coord.y * self.width + coord.x)?;
		Some(Sample {
			x: coord.x,
			y: coord.y,
			value: self.range.value_of(gray),
		})
	}
}

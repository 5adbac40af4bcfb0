//! Conversion of raw planes into displayable frames.

use ijview_primitives::{DisplayRange, Frame, HISTOGRAM_BINS, Histogram};
use ijview_proto::{BackendError, FrameRequest};

use crate::stack::{Stack, min_max};

/// Maps raw samples to 8-bit display values.
///
/// Data already inside `[0, 1]` is scaled as-is; anything else is normalized
/// by the plane's own min and max. A flat plane renders black.
pub fn to_u8_samples(values: &[f32]) -> Vec<u8> {
	let (min, max) = min_max(values);
	let unit = is_unit_range(min, max);
	let flat = (max - min).abs() < f32::EPSILON;
	values
		.iter()
		.map(|&value| {
			let norm = if unit {
				value
			} else if flat {
				0.0
			} else {
				(value - min) / (max - min)
			};
			quantize(norm)
		})
		.collect()
}

/// 256-bin histogram of `values` over their own min/max range.
pub fn histogram(values: &[f32]) -> Histogram {
	let (min, max) = min_max(values);
	let span = (max - min).max(f32::EPSILON);
	let mut counts = vec![0_u32; HISTOGRAM_BINS];
	for value in values.iter().filter(|value| value.is_finite()) {
		let bin = quantize((value - min) / span) as usize;
		if let Some(count) = counts.get_mut(bin) {
			*count = count.saturating_add(1);
		}
	}
	Histogram::from_counts(counts).unwrap_or_default()
}

/// Value range the 8-bit samples of `values` map back onto.
///
/// Matches [`to_u8_samples`]: unit-range data maps onto `[0, 1]`, anything
/// else onto its own min and max.
pub fn display_range(values: &[f32]) -> DisplayRange {
	let (min, max) = min_max(values);
	if is_unit_range(min, max) {
		DisplayRange::new(0.0, 1.0)
	} else {
		DisplayRange::new(min, max)
	}
}

fn is_unit_range(min: f32, max: f32) -> bool {
	min >= 0.0 && max <= 1.0
}

fn quantize(norm: f32) -> u8 {
	if norm.is_nan() {
		return 0;
	}
	(norm.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Renders the plane addressed by `request`.
pub fn render_plane(stack: &Stack, request: FrameRequest) -> Result<Frame, BackendError> {
	let plane = stack.plane(request.z, request.t, request.channel).ok_or_else(|| {
		BackendError::InvalidParameters(format!(
			"plane z={} t={} c={} is outside {:?}",
			request.z,
			request.t,
			request.channel,
			stack.shape()
		))
	})?;
	let shape = stack.shape();
	Frame::new(
		shape.width,
		shape.height,
		to_u8_samples(plane),
		histogram(plane),
		display_range(plane),
	)
	.map_err(|error| BackendError::Failed(error.to_string()))
}

//! Built-in image operations and their registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use ijview_primitives::HISTOGRAM_BINS;
use ijview_proto::BackendError;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::stack::{Stack, StackShape};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
	#[error("unknown operation `{0}`")]
	UnknownOp(String),
	#[error("{0}")]
	InvalidParams(String),
	#[error("operation cancelled")]
	Cancelled,
	#[error("{0}")]
	Failed(String),
}

impl From<OpError> for BackendError {
	fn from(error: OpError) -> Self {
		match error {
			OpError::UnknownOp(_) | OpError::InvalidParams(_) => Self::InvalidParameters(error.to_string()),
			OpError::Cancelled | OpError::Failed(_) => Self::Failed(error.to_string()),
		}
	}
}

/// One named transformation of a whole stack.
pub trait Operation: Send + Sync + 'static {
	fn name(&self) -> &'static str;

	/// Whether the operation may run in preview mode.
	fn supports_preview(&self) -> bool {
		true
	}

	/// Rejects bad parameters before a job is started.
	fn validate(&self, params: &Value) -> Result<(), OpError>;

	/// Produces the transformed stack. Long loops should poll `cancel`.
	fn execute(&self, stack: &Stack, params: &Value, cancel: &CancellationToken) -> Result<Stack, OpError>;
}

/// Operations addressable by name.
#[derive(Clone, Default)]
pub struct OpRegistry {
	ops: BTreeMap<&'static str, Arc<dyn Operation>>,
}

impl std::fmt::Debug for OpRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_set().entries(self.ops.keys()).finish()
	}
}

impl OpRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registry preloaded with the built-in operations.
	pub fn builtin() -> Self {
		let mut registry = Self::new();
		registry.register(Arc::new(Invert));
		registry.register(Arc::new(Normalize));
		registry.register(Arc::new(Window));
		registry.register(Arc::new(GaussianBlur));
		registry.register(Arc::new(FixedThreshold));
		registry.register(Arc::new(OtsuThreshold));
		registry
	}

	/// Adds `op`, replacing any operation of the same name.
	pub fn register(&mut self, op: Arc<dyn Operation>) {
		self.ops.insert(op.name(), op);
	}

	/// Looks up an operation by name.
	pub fn get(&self, name: &str) -> Result<Arc<dyn Operation>, OpError> {
		self.ops.get(name).cloned().ok_or_else(|| OpError::UnknownOp(name.to_string()))
	}

	/// Names of preview-capable operations, sorted.
	pub fn preview_ops(&self) -> Vec<String> {
		self.ops
			.values()
			.filter(|op| op.supports_preview())
			.map(|op| op.name().to_string())
			.collect()
	}
}

fn optional_f32(params: &Value, key: &str) -> Result<Option<f32>, OpError> {
	match params.get(key) {
		None | Some(Value::Null) => Ok(None),
		Some(value) => value
			.as_f64()
			.map(|value| Some(value as f32))
			.ok_or_else(|| OpError::InvalidParams(format!("`{key}` must be a number"))),
	}
}

fn required_f32(params: &Value, key: &str) -> Result<f32, OpError> {
	optional_f32(params, key)?.ok_or_else(|| OpError::InvalidParams(format!("missing required parameter `{key}`")))
}

/// `max - v + min` over the dataset range.
struct Invert;

impl Operation for Invert {
	fn name(&self) -> &'static str {
		"intensity.invert"
	}

	fn validate(&self, _params: &Value) -> Result<(), OpError> {
		Ok(())
	}

	fn execute(&self, stack: &Stack, _params: &Value, cancel: &CancellationToken) -> Result<Stack, OpError> {
		let (min, max) = stack.min_max();
		stack.map_values(cancel, |value| max - value + min)
	}
}

/// Linear rescale of `[min, max]` onto `[0, 1]`. Bounds default to the
/// dataset range.
struct Normalize;

impl Normalize {
	fn bounds(stack: &Stack, params: &Value) -> Result<(f32, f32), OpError> {
		let (source_min, source_max) = stack.min_max();
		let min = optional_f32(params, "min")?.unwrap_or(source_min);
		let max = optional_f32(params, "max")?.unwrap_or(source_max);
		Ok((min, max))
	}
}

impl Operation for Normalize {
	fn name(&self) -> &'static str {
		"intensity.normalize"
	}

	fn validate(&self, params: &Value) -> Result<(), OpError> {
		optional_f32(params, "min")?;
		optional_f32(params, "max")?;
		Ok(())
	}

	fn execute(&self, stack: &Stack, params: &Value, cancel: &CancellationToken) -> Result<Stack, OpError> {
		let (min, max) = Self::bounds(stack, params)?;
		let scale = if (max - min).abs() < f32::EPSILON { 1.0 } else { max - min };
		stack.map_values(cancel, |value| ((value - min) / scale).clamp(0.0, 1.0))
	}
}

/// Clamp to `[low, high]` and rescale onto `[0, 1]`.
struct Window;

impl Window {
	fn bounds(params: &Value) -> Result<(f32, f32), OpError> {
		let low = required_f32(params, "low")?;
		let high = required_f32(params, "high")?;
		if high <= low {
			return Err(OpError::InvalidParams("`high` must be greater than `low`".to_string()));
		}
		Ok((low, high))
	}
}

impl Operation for Window {
	fn name(&self) -> &'static str {
		"intensity.window"
	}

	fn validate(&self, params: &Value) -> Result<(), OpError> {
		Self::bounds(params).map(drop)
	}

	fn execute(&self, stack: &Stack, params: &Value, cancel: &CancellationToken) -> Result<Stack, OpError> {
		let (low, high) = Self::bounds(params)?;
		stack.map_values(cancel, |value| ((value - low) / (high - low)).clamp(0.0, 1.0))
	}
}

/// Separable gaussian blur of each plane with clamped edges.
struct GaussianBlur;

impl GaussianBlur {
	fn sigma(params: &Value) -> Result<f32, OpError> {
		let sigma = optional_f32(params, "sigma")?.unwrap_or(1.0);
		if !sigma.is_finite() || sigma <= 0.0 {
			return Err(OpError::InvalidParams("`sigma` must be positive".to_string()));
		}
		Ok(sigma)
	}

	fn kernel(sigma: f32) -> Vec<f32> {
		let radius = (sigma * 3.0).ceil() as isize;
		let weights: Vec<f32> = (-radius..=radius)
			.map(|offset| {
				let x = offset as f32;
				(-(x * x) / (2.0 * sigma * sigma)).exp()
			})
			.collect();
		let sum: f32 = weights.iter().sum();
		weights.into_iter().map(|weight| weight / sum).collect()
	}

	fn blur_plane(plane: &[f32], shape: StackShape, kernel: &[f32]) -> Vec<f32> {
		let (width, height) = (shape.width as isize, shape.height as isize);
		let radius = (kernel.len() / 2) as isize;
		let at = |x: isize, y: isize| y.clamp(0, height - 1) * width + x.clamp(0, width - 1);

		let mut horizontal = vec![0.0_f32; plane.len()];
		for y in 0..height {
			for x in 0..width {
				horizontal[(y * width + x) as usize] = kernel
					.iter()
					.enumerate()
					.map(|(i, weight)| weight * plane[at(x + i as isize - radius, y) as usize])
					.sum();
			}
		}
		let mut out = vec![0.0_f32; plane.len()];
		for y in 0..height {
			for x in 0..width {
				out[(y * width + x) as usize] = kernel
					.iter()
					.enumerate()
					.map(|(i, weight)| weight * horizontal[at(x, y + i as isize - radius) as usize])
					.sum();
			}
		}
		out
	}
}

impl Operation for GaussianBlur {
	fn name(&self) -> &'static str {
		"gaussian.blur"
	}

	fn validate(&self, params: &Value) -> Result<(), OpError> {
		Self::sigma(params).map(drop)
	}

	fn execute(&self, stack: &Stack, params: &Value, cancel: &CancellationToken) -> Result<Stack, OpError> {
		let kernel = Self::kernel(Self::sigma(params)?);
		stack.map_planes(cancel, |plane, shape| Self::blur_plane(plane, shape, &kernel))
	}
}

/// Values at or above `threshold` become 1, the rest 0.
struct FixedThreshold;

impl Operation for FixedThreshold {
	fn name(&self) -> &'static str {
		"threshold.fixed"
	}

	fn validate(&self, params: &Value) -> Result<(), OpError> {
		optional_f32(params, "threshold").map(drop)
	}

	fn execute(&self, stack: &Stack, params: &Value, cancel: &CancellationToken) -> Result<Stack, OpError> {
		let threshold = optional_f32(params, "threshold")?.unwrap_or(0.5);
		stack.map_values(cancel, |value| if value >= threshold { 1.0 } else { 0.0 })
	}
}

/// Binarizes at the threshold maximizing between-class variance over the
/// whole dataset.
struct OtsuThreshold;

impl OtsuThreshold {
	fn threshold(stack: &Stack) -> f32 {
		let (min, max) = stack.min_max();
		let span = (max - min).max(f32::EPSILON);
		let mut counts = [0_u64; HISTOGRAM_BINS];
		for value in stack.data().iter().filter(|value| value.is_finite()) {
			let bin = (((value - min) / span).clamp(0.0, 1.0) * (HISTOGRAM_BINS - 1) as f32).round() as usize;
			counts[bin] += 1;
		}

		let total: u64 = counts.iter().sum();
		let weighted: f64 = counts.iter().enumerate().map(|(bin, &n)| bin as f64 * n as f64).sum();
		let (mut background, mut background_sum) = (0_u64, 0.0_f64);
		let (mut best_bin, mut best_variance) = (0, -1.0_f64);
		for (bin, &n) in counts.iter().enumerate() {
			background += n;
			if background == 0 {
				continue;
			}
			let foreground = total - background;
			if foreground == 0 {
				break;
			}
			background_sum += bin as f64 * n as f64;
			let mean_back = background_sum / background as f64;
			let mean_fore = (weighted - background_sum) / foreground as f64;
			let variance = background as f64 * foreground as f64 * (mean_back - mean_fore).powi(2);
			if variance > best_variance {
				best_variance = variance;
				best_bin = bin;
			}
		}
		min + (best_bin as f32 + 0.5) / (HISTOGRAM_BINS - 1) as f32 * span
	}
}

impl Operation for OtsuThreshold {
	fn name(&self) -> &'static str {
		"threshold.otsu"
	}

	fn validate(&self, _params: &Value) -> Result<(), OpError> {
		Ok(())
	}

	fn execute(&self, stack: &Stack, _params: &Value, cancel: &CancellationToken) -> Result<Stack, OpError> {
		let threshold = Self::threshold(stack);
		stack.map_values(cancel, |value| if value >= threshold { 1.0 } else { 0.0 })
	}
}

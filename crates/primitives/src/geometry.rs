//! Viewport transform.
//!
//! Data space is the frame's pixel grid (origin at the top-left corner of pixel
//! `(0, 0)`); screen space is the canvas the frame is drawn into. The mapping is
//! a uniform scale by `zoom` followed by a translation by `pan`:
//!
//! ```text
//! screen = data * zoom + pan
//! data   = (screen - pan) / zoom
//! ```
//!
//! Zoom is always kept inside `[MIN_ZOOM, MAX_ZOOM]`, so the inverse mapping is
//! total.


use serde::{Deserialize, Serialize};

/// Smallest permitted zoom factor.
pub const MIN_ZOOM: f64 = 0.1;
/// Largest permitted zoom factor.
pub const MAX_ZOOM: f64 = 64.0;

/// A point in screen (canvas) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
	pub x: f64,
	pub y: f64,
}

impl ScreenPoint {
	pub const fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}
}

/// A point in continuous data (frame pixel) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DataPoint {
	pub x: f64,
	pub y: f64,
}

impl DataPoint {
	pub const fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}

	/// Center of the pixel at `(x, y)`.
	pub fn pixel_center(x: usize, y: usize) -> Self {
		Self {
			x: x as f64 + 0.5,
			y: y as f64 + 0.5,
		}
	}
}

/// Integer pixel index inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelCoord {
	pub x: usize,
	pub y: usize,
}

/// A width/height pair, used for canvases and frames.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
	pub width: f64,
	pub height: f64,
}

impl Size {
	pub const fn new(width: f64, height: f64) -> Self {
		Self { width, height }
	}
}

/// Zoom and pan state of one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
	zoom: f64,
	pan_x: f64,
	pan_y: f64,
}

impl Default for Viewport {
	fn default() -> Self {
		Self {
			zoom: 1.0,
			pan_x: 0.0,
			pan_y: 0.0,
		}
	}
}

impl Viewport {
	/// Creates a viewport, clamping zoom into range.
	///
	/// Non-finite components fall back to the identity transform's value.
	pub fn new(zoom: f64, pan_x: f64, pan_y: f64) -> Self {
		let mut viewport = Self::default();
		viewport.set(zoom, pan_x, pan_y);
		viewport
	}

	/// Screen pixels per data pixel.
	pub const fn zoom(&self) -> f64 {
		self.zoom
	}

	/// Screen position of the data origin.
	pub const fn pan(&self) -> (f64, f64) {
		(self.pan_x, self.pan_y)
	}

	/// Replaces zoom and pan. Non-finite components are ignored.
	pub fn set(&mut self, zoom: f64, pan_x: f64, pan_y: f64) {
		if let Some(zoom) = clamp_zoom(zoom) {
			self.zoom = zoom;
		}
		if pan_x.is_finite() {
			self.pan_x = pan_x;
		}
		if pan_y.is_finite() {
			self.pan_y = pan_y;
		}
	}

	/// Maps a data-space point onto the canvas.
	pub fn to_screen(&self, point: DataPoint) -> ScreenPoint {
		ScreenPoint {
			x: point.x * self.zoom + self.pan_x,
			y: point.y * self.zoom + self.pan_y,
		}
	}

	/// Inverse of [`Viewport::to_screen`].
	pub fn to_data(&self, point: ScreenPoint) -> DataPoint {
		DataPoint {
			x: (point.x - self.pan_x) / self.zoom,
			y: (point.y - self.pan_y) / self.zoom,
		}
	}

	/// Maps a screen point to the frame pixel under it.
	///
	/// Returns `None` when the floored index falls outside
	/// `[0, width) × [0, height)` or the point is not finite.
	pub fn pixel_at(&self, point: ScreenPoint, width: usize, height: usize) -> Option<PixelCoord> {
		let data = self.to_data(point);
		if !data.x.is_finite() || !data.y.is_finite() {
			return None;
		}
		let x = data.x.floor();
		let y = data.y.floor();
		if x < 0.0 || y < 0.0 || x >= width as f64 || y >= height as f64 {
			return None;
		}
		Some(PixelCoord {
			x: x as usize,
			y: y as usize,
		})
	}

	/// Sets zoom while keeping the data point under `anchor` fixed.
	pub fn zoom_about(&mut self, anchor: ScreenPoint, zoom: f64) {
		let Some(next) = clamp_zoom(zoom) else {
			return;
		};
		if !anchor.x.is_finite() || !anchor.y.is_finite() {
			self.zoom = next;
			return;
		}
		let under = self.to_data(anchor);
		self.zoom = next;
		self.pan_x = anchor.x - under.x * next;
		self.pan_y = anchor.y - under.y * next;
	}

	/// Multiplies zoom by `factor`, anchored at `anchor`.
	pub fn zoom_by(&mut self, anchor: ScreenPoint, factor: f64) {
		if !factor.is_finite() || factor <= 0.0 {
			return;
		}
		self.zoom_about(anchor, self.zoom * factor);
	}

	/// Shifts the pan by a screen-space delta. Non-finite deltas are ignored.
	pub fn pan_by(&mut self, dx: f64, dy: f64) {
		if dx.is_finite() && dy.is_finite() {
			self.pan_x += dx;
			self.pan_y += dy;
		}
	}

	/// Returns to 100% zoom with no pan.
	pub fn reset(&mut self) {
		*self = Self::default();
	}

	/// Largest zoom that shows the whole image inside `canvas`, centered.
	pub fn fit(canvas: Size, image: Size) -> Self {
		let image_w = image.width.max(1.0);
		let image_h = image.height.max(1.0);
		let zoom = clamp_zoom((canvas.width / image_w).min(canvas.height / image_h)).unwrap_or(1.0);
		let pan_x = (canvas.width - image_w * zoom) / 2.0;
		let pan_y = (canvas.height - image_h * zoom) / 2.0;
		Self::new(zoom, pan_x, pan_y)
	}
}

fn clamp_zoom(zoom: f64) -> Option<f64> {
	zoom.is_finite().then(|| zoom.clamp(MIN_ZOOM, MAX_ZOOM))
}

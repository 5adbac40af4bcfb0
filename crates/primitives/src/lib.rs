//! Core value types shared by the ijview session layer: viewport geometry,
//! axis positions, identifiers and freshness tokens, and rendered frames.

/// Dataset axis positions and extents.
pub mod axis;
/// Immutable rendered frames and their histograms.
pub mod frame;
/// Viewport transform between data space and screen space.
pub mod geometry;
/// Identifier and freshness token types.
pub mod ids;

pub use axis::{AxisExtents, AxisPosition};
pub use frame::{DisplayRange, Frame, FrameError, HISTOGRAM_BINS, Histogram, Sample};
pub use geometry::{DataPoint, MAX_ZOOM, MIN_ZOOM, PixelCoord, ScreenPoint, Size, Viewport};
pub use ids::{CounterIdGen, FrameToken, JobId, JobToken, SessionId};

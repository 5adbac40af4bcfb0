//! Wire types for the session/backend boundary.

use std::fmt;
use std::path::PathBuf;

use ijview_primitives::{AxisExtents, AxisPosition, JobId, SessionId};
use serde::{Deserialize, Serialize};

/// Metadata reported by the backend when a dataset is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
	/// Full array shape in axis order.
	pub shape: Vec<usize>,
	/// Axis labels, one character per dimension (for example `"ZCYX"`).
	pub axes: String,
	/// Number of channels.
	pub channels: usize,
	/// Number of z slices.
	pub z_slices: usize,
	/// Number of time points.
	pub times: usize,
	/// Smallest raw value in the dataset.
	pub min: f32,
	/// Largest raw value in the dataset.
	pub max: f32,
	/// Path the dataset was loaded from.
	pub source: PathBuf,
}

impl ImageSummary {
	/// Axis extents, treating missing axes as length 1.
	pub fn extents(&self) -> AxisExtents {
		AxisExtents::new(self.z_slices.max(1), self.times.max(1), self.channels.max(1))
	}
}

/// Request to render one 2D plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameRequest {
	/// Z slice index.
	pub z: usize,
	/// Time point index.
	pub t: usize,
	/// Channel index.
	pub channel: usize,
}

impl From<AxisPosition> for FrameRequest {
	fn from(position: AxisPosition) -> Self {
		Self {
			z: position.z,
			t: position.t,
			channel: position.channel,
		}
	}
}

/// Whether a job only previews its result or commits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
	/// Result is cached for display and export but not committed.
	Preview,
	/// Result replaces the committed dataset.
	Apply,
}

impl fmt::Display for RunMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Preview => "preview",
			Self::Apply => "apply",
		})
	}
}

/// Request to start a long-running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartJob {
	/// Operation name, for example `"gaussian.blur"`.
	pub op: String,
	/// Opaque parameter object validated by the backend.
	pub params: serde_json::Value,
	/// Preview or apply.
	pub mode: RunMode,
}

/// Backend acknowledgment of a started job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
	/// Identifier assigned by the backend.
	pub job_id: JobId,
}

/// Status carried by a job event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
	/// Job is in progress.
	Running,
	/// Job finished successfully.
	Completed,
	/// Job failed.
	Failed,
	/// Job was cancelled before finishing.
	Cancelled,
}

impl JobStatus {
	/// Terminal statuses are final for a job.
	pub const fn is_terminal(self) -> bool {
		!matches!(self, Self::Running)
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Running => "running",
			Self::Completed => "completed",
			Self::Failed => "failed",
			Self::Cancelled => "cancelled",
		})
	}
}

/// Progress or completion notification for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
	/// Job the event belongs to.
	pub job_id: JobId,
	/// Mode the job was started with.
	pub mode: RunMode,
	/// Operation name.
	pub op: String,
	/// Reported status.
	pub status: JobStatus,
	/// Optional human-readable detail.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

/// A job event addressed to one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
	/// Session that owns the job.
	pub session_id: SessionId,
	/// The job event itself.
	pub event: JobEvent,
}

/// Preview operation to apply on the fly during export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewSpec {
	/// Operation name.
	pub op: String,
	/// Operation parameters.
	pub params: serde_json::Value,
}

/// Request to write the current dataset to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
	/// Destination path.
	pub output_path: PathBuf,
	/// Preview to export instead of the committed data.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub preview: Option<PreviewSpec>,
}

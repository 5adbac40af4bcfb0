//! The backend trait implemented by every transport.

use std::path::Path;

use async_trait::async_trait;
use ijview_primitives::{Frame, JobId, SessionId};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::types::{ExportRequest, FrameRequest, ImageSummary, JobTicket, SessionEvent, StartJob};

/// Image backend reachable from a viewer session.
///
/// Calls are request/response correlated by the transport; job progress is
/// delivered separately through [`Backend::subscribe`] with at-least-once
/// semantics, so receivers must tolerate duplicates.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
	/// Loads the dataset at `path` into `session`.
	async fn inspect(&self, session: SessionId, path: &Path) -> Result<ImageSummary>;

	/// Renders one plane of the session's current source.
	async fn render_frame(&self, session: SessionId, request: FrameRequest) -> Result<Frame>;

	/// Starts a preview or apply job.
	async fn start_job(&self, session: SessionId, request: StartJob) -> Result<JobTicket>;

	/// Requests cooperative cancellation of a job.
	async fn cancel_job(&self, session: SessionId, job_id: JobId) -> Result<()>;

	/// Writes the session's current source to disk.
	async fn export_current(&self, session: SessionId, request: ExportRequest) -> Result<()>;

	/// Names of operations that support preview mode.
	async fn list_preview_ops(&self) -> Result<Vec<String>>;

	/// Drops all backend state held for `session`.
	async fn release(&self, session: SessionId) -> Result<()>;

	/// Subscribes to job events for every session.
	fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

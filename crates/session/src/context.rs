//! Per-viewer session state.
//!
//! [`SessionContext`] is synchronous and has exactly one writer (the session
//! actor). Operations never perform I/O: anything that must reach the backend
//! is queued as an [`Effect`], and anything the presentation layer should hear
//! about is queued as a [`Notice`]. The actor drains both after every message.

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;

use ijview_primitives::{AxisExtents, AxisPosition, Frame, FrameToken, Histogram, JobId, JobToken, PixelCoord, Sample, ScreenPoint, SessionId, Size, Viewport};
use ijview_proto::{BackendError, ExportRequest, FrameRequest, ImageSummary, JobEvent, JobStatus, JobTicket, PreviewSpec, RunMode, StartJob};
use tracing::{debug, trace, warn};

use crate::config::ViewerConfig;
use crate::error::{Result, SessionError};
use crate::filter::{Verdict, classify};
use crate::frame::{FrameCoordinator, FrameResolution};
use crate::job::{AckOutcome, CancelAction, JobLifecycle, JobOutcome, JobPhase};
use crate::status::status_line;

/// Pointer readout over the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Hover {
	Inside {
		x: usize,
		y: usize,
		value: f32,
	},
	#[default]
	Outside,
}

impl Hover {
	pub const fn sample(self) -> Option<Sample> {
		match self {
			Self::Inside { x, y, value } => Some(Sample { x, y, value }),
			Self::Outside => None,
		}
	}
}

impl From<Option<Sample>> for Hover {
	fn from(sample: Option<Sample>) -> Self {
		match sample {
			Some(Sample { x, y, value }) => Self::Inside { x, y, value },
			None => Self::Outside,
		}
	}
}

/// Reads the frame pixel under `point`.
pub fn hover(viewport: &Viewport, frame: Option<&Frame>, point: ScreenPoint) -> Hover {
	let Some(frame) = frame else {
		return Hover::Outside;
	};
	viewport
		.pixel_at(point, frame.width(), frame.height())
		.and_then(|coord| frame.sample(coord))
		.into()
}

/// Client-side viewport change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewOp {
	Set { zoom: f64, pan_x: f64, pan_y: f64 },
	ZoomAt { anchor: ScreenPoint, factor: f64 },
	ZoomIn(ScreenPoint),
	ZoomOut(ScreenPoint),
	/// Positive notches zoom in.
	Wheel { anchor: ScreenPoint, notches: i32 },
	Reset,
	PanBy { dx: f64, dy: f64 },
	Fit(Size),
}

/// Backend work requested by a state change.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
	Render { token: FrameToken, request: FrameRequest },
	StartJob { token: JobToken, request: StartJob },
	CancelJob { job_id: JobId },
}

/// Outward notification for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
	FrameUpdated { token: FrameToken, position: AxisPosition },
	FrameFailed { position: AxisPosition, error: SessionError },
	JobStarted { job_id: JobId, op: String, mode: RunMode },
	JobProgress { job_id: JobId, message: Option<String> },
	JobFinished(JobOutcome),
	Error(SessionError),
}

/// Read-only view of a session, published after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
	pub id: SessionId,
	pub source: PathBuf,
	pub position: AxisPosition,
	pub extents: AxisExtents,
	pub viewport: Viewport,
	pub frame: Option<Arc<Frame>>,
	pub hover: Hover,
	pub pinned: Option<Sample>,
	pub status: String,
	pub status_line: String,
	pub job: Option<JobId>,
	pub job_running: bool,
	pub last_outcome: Option<JobOutcome>,
	pub preview: Option<PreviewSpec>,
	pub fatal: Option<SessionError>,
}

impl SessionSnapshot {
	pub fn histogram(&self) -> Option<&Histogram> {
		self.frame.as_deref().map(Frame::histogram)
	}

	/// Pointer readout computed from this snapshot alone.
	pub fn hover_at(&self, point: ScreenPoint) -> Hover {
		hover(&self.viewport, self.frame.as_deref(), point)
	}
}

/// Coordination state for one open viewer.
#[derive(Debug)]
pub struct SessionContext {
	id: SessionId,
	summary: ImageSummary,
	extents: AxisExtents,
	position: AxisPosition,
	viewport: Viewport,
	frame: Option<Arc<Frame>>,
	frames: FrameCoordinator,
	jobs: JobLifecycle,
	hover: Option<Sample>,
	pinned: Option<Sample>,
	status: String,
	preview: Option<PreviewSpec>,
	fatal: Option<SessionError>,
	zoom_step: f64,
	wheel_zoom_step: f64,
	effects: Vec<Effect>,
	notices: Vec<Notice>,
}

impl SessionContext {
	pub fn new(id: SessionId, summary: ImageSummary, config: &ViewerConfig) -> Self {
		let status = format!("Opened {}", summary.source.display());
		Self {
			id,
			extents: summary.extents(),
			summary,
			position: AxisPosition::default(),
			viewport: Viewport::default(),
			frame: None,
			frames: FrameCoordinator::new(),
			jobs: JobLifecycle::new(config.parked_event_limit),
			hover: None,
			pinned: None,
			status,
			preview: None,
			fatal: None,
			zoom_step: config.zoom_step,
			wheel_zoom_step: config.wheel_zoom_step,
			effects: Vec::new(),
			notices: Vec::new(),
		}
	}

	/// Session this context belongs to.
	pub const fn id(&self) -> SessionId {
		self.id
	}

	/// Dataset metadata captured when the session was opened.
	pub const fn summary(&self) -> &ImageSummary {
		&self.summary
	}

	/// Current `(z, t, channel)` position.
	pub const fn position(&self) -> AxisPosition {
		self.position
	}

	pub const fn extents(&self) -> AxisExtents {
		self.extents
	}

	/// Current zoom and pan.
	pub const fn viewport(&self) -> Viewport {
		self.viewport
	}

	/// Frame on screen, if any response has been applied yet.
	pub const fn frame(&self) -> Option<&Arc<Frame>> {
		self.frame.as_ref()
	}

	pub const fn frames(&self) -> &FrameCoordinator {
		&self.frames
	}

	/// The session's job slot.
	pub const fn jobs(&self) -> &JobLifecycle {
		&self.jobs
	}

	/// Last status message.
	pub fn status(&self) -> &str {
		&self.status
	}

	/// Preview carried into the next export.
	pub const fn preview(&self) -> Option<&PreviewSpec> {
		self.preview.as_ref()
	}

	/// Error that ended the session, if any.
	pub const fn fatal(&self) -> Option<&SessionError> {
		self.fatal.as_ref()
	}

	fn ensure_alive(&self) -> Result<()> {
		match &self.fatal {
			Some(error) => Err(error.clone()),
			None => Ok(()),
		}
	}

	/// Converts a backend error, recording it when it disables the session.
	fn backend_failure(&mut self, error: BackendError) -> SessionError {
		let error = SessionError::from(error);
		if error.is_fatal() && self.fatal.is_none() {
			warn!(session = %self.id, %error, "session.transport_lost");
			self.fatal = Some(error.clone());
		}
		error
	}

	/// Issues a render request for the current position.
	pub fn request_frame(&mut self) -> FrameToken {
		let token = self.frames.issue(self.position);
		trace!(session = %self.id, token = token.0, z = self.position.z, t = self.position.t, c = self.position.channel, "frame.request");
		self.effects.push(Effect::Render {
			token,
			request: self.position.into(),
		});
		token
	}

	/// Re-requests the frame at the current position.
	pub fn refresh(&mut self) -> Result<FrameToken> {
		self.ensure_alive()?;
		Ok(self.request_frame())
	}

	/// Moves to a new axis position, clamped to the dataset extents.
	///
	/// Requests a frame when the position changed, or when nothing is shown
	/// and nothing is in flight.
	pub fn set_axis(&mut self, z: Option<usize>, t: Option<usize>, channel: Option<usize>) -> Result<Option<FrameToken>> {
		self.ensure_alive()?;
		let next = self.extents.clamp(self.position.with(z, t, channel));
		let changed = next != self.position;
		self.position = next;
		if changed || (self.frame.is_none() && !self.frames.is_pending()) {
			return Ok(Some(self.request_frame()));
		}
		Ok(None)
	}

	/// Replaces zoom and pan. Never requests a frame.
	pub fn set_viewport(&mut self, zoom: f64, pan_x: f64, pan_y: f64) {
		self.viewport.set(zoom, pan_x, pan_y);
	}

	/// Zooms by `factor`, keeping `anchor` fixed on screen.
	pub fn zoom_at(&mut self, anchor: ScreenPoint, factor: f64) {
		self.viewport.zoom_by(anchor, factor);
	}

	pub fn zoom_in(&mut self, anchor: ScreenPoint) {
		self.zoom_at(anchor, self.zoom_step);
	}

	pub fn zoom_out(&mut self, anchor: ScreenPoint) {
		self.zoom_at(anchor, 1.0 / self.zoom_step);
	}

	/// Applies one wheel step per notch; positive notches zoom in.
	pub fn wheel(&mut self, anchor: ScreenPoint, notches: i32) {
		self.zoom_at(anchor, self.wheel_zoom_step.powi(notches));
	}

	/// Back to 1:1 with no pan.
	pub fn reset_zoom(&mut self) {
		self.viewport.reset();
	}

	pub fn pan_by(&mut self, dx: f64, dy: f64) {
		self.viewport.pan_by(dx, dy);
	}

	/// Fits the current frame into `canvas`. No-op until a frame is shown.
	pub fn fit_to(&mut self, canvas: Size) {
		if let Some(frame) = &self.frame {
			self.viewport = Viewport::fit(canvas, Size::new(frame.width() as f64, frame.height() as f64));
		}
	}

	/// Applies a viewport change. Never requests a frame.
	pub fn apply_view(&mut self, op: ViewOp) -> Result<Viewport> {
		self.ensure_alive()?;
		match op {
			ViewOp::Set { zoom, pan_x, pan_y } => self.set_viewport(zoom, pan_x, pan_y),
			ViewOp::ZoomAt { anchor, factor } => self.zoom_at(anchor, factor),
			ViewOp::ZoomIn(anchor) => self.zoom_in(anchor),
			ViewOp::ZoomOut(anchor) => self.zoom_out(anchor),
			ViewOp::Wheel { anchor, notches } => self.wheel(anchor, notches),
			ViewOp::Reset => self.reset_zoom(),
			ViewOp::PanBy { dx, dy } => self.pan_by(dx, dy),
			ViewOp::Fit(canvas) => self.fit_to(canvas),
		}
		Ok(self.viewport)
	}

	/// Pure pointer readout.
	pub fn hover_at(&self, point: ScreenPoint) -> Hover {
		hover(&self.viewport, self.frame.as_deref(), point)
	}

	/// Records the pointer readout shown in the status line.
	pub fn track_pointer(&mut self, point: ScreenPoint) -> Hover {
		let hover = self.hover_at(point);
		self.hover = hover.sample();
		hover
	}

	/// The pointer left the canvas.
	pub fn clear_pointer(&mut self) {
		self.hover = None;
	}

	/// Pins the sample under `point`; it takes precedence over the hover sample.
	pub fn pin_at(&mut self, point: ScreenPoint) -> Hover {
		let hover = self.hover_at(point);
		self.pinned = hover.sample();
		hover
	}

	pub fn unpin(&mut self) {
		self.pinned = None;
	}

	/// Starts a preview or apply job. The ticket arrives via [`Self::on_job_ack`].
	pub fn start_operation(&mut self, op: impl Into<String>, params: serde_json::Value, mode: RunMode) -> Result<JobToken> {
		self.ensure_alive()?;
		let request = StartJob {
			op: op.into(),
			params,
			mode,
		};
		let token = self.jobs.start(request.clone())?;
		debug!(session = %self.id, op = %request.op, %mode, token = token.0, "job.start");
		self.status = format!("Starting {} ({mode})", request.op);
		self.effects.push(Effect::StartJob { token, request });
		Ok(token)
	}

	/// Asks the backend to cancel the tracked job. State only changes when the
	/// terminal event arrives.
	pub fn cancel_operation(&mut self) -> Result<()> {
		self.ensure_alive()?;
		match self.jobs.cancel()? {
			CancelAction::Send(job_id) => {
				debug!(session = %self.id, job = job_id.0, "job.cancel");
				self.effects.push(Effect::CancelJob { job_id });
			}
			CancelAction::Deferred => {
				debug!(session = %self.id, "job.cancel_deferred");
			}
		}
		self.status = "Cancelling...".to_string();
		Ok(())
	}

	/// Applies a render response if `token` is still the latest request.
	pub fn on_frame_response(&mut self, token: FrameToken, result: std::result::Result<Frame, BackendError>) {
		match self.frames.resolve(token, result) {
			FrameResolution::Accepted { position, value } => {
				debug!(session = %self.id, token = token.0, "frame.accepted");
				self.hover = self.hover.and_then(|s| value.sample(PixelCoord { x: s.x, y: s.y }));
				self.pinned = self.pinned.and_then(|s| value.sample(PixelCoord { x: s.x, y: s.y }));
				self.frame = Some(Arc::new(value));
				self.notices.push(Notice::FrameUpdated { token, position });
			}
			FrameResolution::Failed { position, error } => {
				let error = self.backend_failure(error);
				debug!(session = %self.id, token = token.0, %error, "frame.failed");
				self.status = error.to_string();
				self.notices.push(Notice::FrameFailed { position, error });
			}
			FrameResolution::Stale => {
				trace!(session = %self.id, token = token.0, latest = self.frames.latest().0, "frame.stale");
			}
		}
	}

	/// Applies a start acknowledgment. Returns the answer for the caller that
	/// started the job, or `None` when the acknowledgment is stale.
	pub fn on_job_ack(&mut self, token: JobToken, result: std::result::Result<JobTicket, BackendError>) -> Option<Result<JobTicket>> {
		match self.jobs.acknowledge(token, result) {
			AckOutcome::Stale => {
				trace!(session = %self.id, token = token.0, "job.ack_stale");
				None
			}
			AckOutcome::Started { job, replay } => {
				let job_id = job.job_id;
				debug!(session = %self.id, job = job_id.0, op = %job.request.op, "job.running");
				self.status = format!("Running {} ({})", job.request.op, job.request.mode);
				self.notices.push(Notice::JobStarted {
					job_id,
					op: job.request.op.clone(),
					mode: job.request.mode,
				});
				if job.cancel_requested {
					debug!(session = %self.id, job = job_id.0, "job.cancel");
					self.effects.push(Effect::CancelJob { job_id });
				}
				for event in replay {
					self.on_job_event(event);
				}
				Some(Ok(JobTicket { job_id }))
			}
			AckOutcome::Rejected { request, error } => {
				let error = self.backend_failure(error);
				debug!(session = %self.id, op = %request.op, %error, "job.rejected");
				self.status = error.to_string();
				self.notices.push(Notice::Error(error.clone()));
				Some(Err(error))
			}
		}
	}

	/// Feeds one routed job event through the filter.
	pub fn on_job_event(&mut self, event: JobEvent) {
		match classify(self.jobs.phase(), &event) {
			Verdict::Discard(reason) => {
				trace!(session = %self.id, job = event.job_id.0, ?reason, "job.event_discarded");
			}
			Verdict::Park => {
				self.jobs.park(event);
			}
			Verdict::Progress => {
				self.status = event.message.clone().unwrap_or_else(|| format!("Running {} ({})", event.op, event.mode));
				self.notices.push(Notice::JobProgress {
					job_id: event.job_id,
					message: event.message,
				});
			}
			Verdict::Terminal => self.retire(&event),
		}
	}

	fn retire(&mut self, event: &JobEvent) {
		let Some((active, outcome)) = self.jobs.finish(event) else {
			return;
		};
		debug!(session = %self.id, job = outcome.job_id.0, status = %outcome.status, "job.finished");
		match outcome.status {
			JobStatus::Completed => {
				let StartJob { op, params, mode } = active.request;
				self.status = match mode {
					RunMode::Preview => {
						let status = format!("Preview cached for {op} ({})", outcome.job_id);
						self.preview = Some(PreviewSpec { op, params });
						status
					}
					RunMode::Apply => {
						self.preview = None;
						format!("Applied {op} ({})", outcome.job_id)
					}
				};
				self.request_frame();
			}
			JobStatus::Cancelled => {
				self.status = outcome.message.clone().unwrap_or_else(|| "Operation cancelled.".to_string());
			}
			_ => {
				self.status = outcome.message.clone().unwrap_or_else(|| format!("{} failed", outcome.op));
			}
		}
		self.notices.push(Notice::JobFinished(outcome));
	}

	/// Records the backend's answer to a cancel. The slot stays busy until a terminal event.
	pub fn on_cancel_ack(&mut self, job_id: JobId, result: std::result::Result<(), BackendError>) {
		match result {
			Ok(()) => trace!(session = %self.id, job = job_id.0, "job.cancel_sent"),
			Err(error) => {
				let error = self.backend_failure(error);
				debug!(session = %self.id, job = job_id.0, %error, "job.cancel_failed");
				self.status = format!("Cancel failed: {error}");
				self.notices.push(Notice::Error(error));
			}
		}
	}

	/// Fails `job_id` locally if it is still tracked when its deadline passes.
	pub fn on_watchdog(&mut self, job_id: JobId) -> bool {
		let JobPhase::Running(active) = self.jobs.phase() else {
			return false;
		};
		if active.job_id != job_id {
			return false;
		}
		let event = JobEvent {
			job_id,
			mode: active.request.mode,
			op: active.request.op.clone(),
			status: JobStatus::Failed,
			message: Some("timed out".to_string()),
		};
		warn!(session = %self.id, job = job_id.0, "job.timeout");
		self.effects.push(Effect::CancelJob { job_id });
		self.on_job_event(event);
		true
	}

	/// Builds an export of the current source, carrying the active preview.
	pub fn export_request(&self, output_path: impl Into<PathBuf>) -> Result<ExportRequest> {
		self.ensure_alive()?;
		Ok(ExportRequest {
			output_path: output_path.into(),
			preview: self.preview.clone(),
		})
	}

	pub fn on_export_result(&mut self, output_path: PathBuf, result: std::result::Result<(), BackendError>) -> Result<()> {
		match result {
			Ok(()) => {
				self.status = format!("Exported {}", output_path.display());
				Ok(())
			}
			Err(error) => {
				let error = self.backend_failure(error);
				self.status = error.to_string();
				self.notices.push(Notice::Error(error.clone()));
				Err(error)
			}
		}
	}

	pub fn status_line(&self) -> String {
		status_line(self.pinned.or(self.hover), self.position, self.viewport.zoom(), &self.status)
	}

	/// Read-only copy published to handles.
	pub fn snapshot(&self) -> SessionSnapshot {
		SessionSnapshot {
			id: self.id,
			source: self.summary.source.clone(),
			position: self.position,
			extents: self.extents,
			viewport: self.viewport,
			frame: self.frame.clone(),
			hover: self.hover.into(),
			pinned: self.pinned,
			status: self.status.clone(),
			status_line: self.status_line(),
			job: self.jobs.tracked(),
			job_running: self.jobs.is_busy(),
			last_outcome: self.jobs.last_outcome().cloned(),
			preview: self.preview.clone(),
			fatal: self.fatal.clone(),
		}
	}

	/// Takes the queued backend calls.
	pub fn drain_effects(&mut self) -> Vec<Effect> {
		std::mem::take(&mut self.effects)
	}

	/// Takes the queued presentation notices.
	pub fn drain_notices(&mut self) -> Vec<Notice> {
		std::mem::take(&mut self.notices)
	}
}

use std::path::{Path, PathBuf};

use ijview_primitives::{FrameToken, ScreenPoint, SessionId, Size, Viewport};
use ijview_proto::{JobTicket, RunMode};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::actor::{Command, SessionMsg};
use crate::context::{Hover, Notice, SessionSnapshot, ViewOp};
use crate::error::{Result, SessionError};

/// Cloneable handle to one session actor.
///
/// Mutating calls are messages to the actor and resolve once it has applied
/// them. Reads ([`Self::snapshot`], [`Self::hover_at`]) use the latest
/// published snapshot and never wait on the actor.
#[derive(Clone)]
pub struct SessionHandle {
	id: SessionId,
	source: PathBuf,
	tx: mpsc::Sender<SessionMsg>,
	snapshot: watch::Receiver<SessionSnapshot>,
	notices: broadcast::Sender<Notice>,
	cancel: CancellationToken,
}

impl std::fmt::Debug for SessionHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionHandle")
			.field("id", &self.id)
			.field("source", &self.source)
			.field("closed", &self.is_closed())
			.finish()
	}
}

impl SessionHandle {
	pub(crate) fn new(
		id: SessionId,
		source: PathBuf,
		tx: mpsc::Sender<SessionMsg>,
		snapshot: watch::Receiver<SessionSnapshot>,
		notices: broadcast::Sender<Notice>,
		cancel: CancellationToken,
	) -> Self {
		Self {
			id,
			source,
			tx,
			snapshot,
			notices,
			cancel,
		}
	}

	/// Session this handle addresses.
	pub const fn id(&self) -> SessionId {
		self.id
	}

	/// Path the session was opened from.
	pub fn source(&self) -> &Path {
		&self.source
	}

	pub(crate) fn sender(&self) -> mpsc::Sender<SessionMsg> {
		self.tx.clone()
	}

	/// Whether the actor has stopped.
	pub fn is_closed(&self) -> bool {
		self.cancel.is_cancelled() || self.tx.is_closed()
	}

	/// Stops the actor. Outstanding calls resolve with [`SessionError::Closed`].
	pub(crate) fn shutdown(&self) {
		self.cancel.cancel();
	}

	/// Latest published snapshot.
	pub fn snapshot(&self) -> SessionSnapshot {
		self.snapshot.borrow().clone()
	}

	/// Subscribes to snapshot updates.
	pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
		self.snapshot.clone()
	}

	/// Subscribes to presentation notices.
	pub fn notices(&self) -> broadcast::Receiver<Notice> {
		self.notices.subscribe()
	}

	/// Pointer readout over the latest published frame, without messaging the actor.
	pub fn hover_at(&self, point: ScreenPoint) -> Hover {
		self.snapshot.borrow().hover_at(point)
	}

	/// Formatted status bar text from the latest snapshot.
	pub fn status_line(&self) -> String {
		self.snapshot.borrow().status_line.clone()
	}

	/// Waits until a published snapshot satisfies `predicate`.
	pub async fn wait_for(&self, mut predicate: impl FnMut(&SessionSnapshot) -> bool) -> Result<SessionSnapshot> {
		let mut rx = self.snapshot.clone();
		let snapshot = rx.wait_for(|snapshot| predicate(snapshot)).await.map_err(|_| SessionError::Closed)?;
		Ok(snapshot.clone())
	}

	async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
		if self.cancel.is_cancelled() {
			return Err(SessionError::Closed);
		}
		let (reply, rx) = oneshot::channel();
		self.tx.send(SessionMsg::Command(build(reply))).await.map_err(|_| SessionError::Closed)?;
		rx.await.map_err(|_| SessionError::Closed)
	}

	/// Moves to a new axis position. Returns the token of the frame request
	/// issued, if any.
	pub async fn set_axis(&self, z: Option<usize>, t: Option<usize>, channel: Option<usize>) -> Result<Option<FrameToken>> {
		self.call(|reply| Command::SetAxis { z, t, channel, reply }).await?
	}

	pub async fn view(&self, op: ViewOp) -> Result<Viewport> {
		self.call(|reply| Command::View { op, reply }).await?
	}

	/// Replaces zoom and pan.
	pub async fn set_viewport(&self, zoom: f64, pan_x: f64, pan_y: f64) -> Result<Viewport> {
		self.view(ViewOp::Set { zoom, pan_x, pan_y }).await
	}

	pub async fn zoom_in(&self, anchor: ScreenPoint) -> Result<Viewport> {
		self.view(ViewOp::ZoomIn(anchor)).await
	}

	pub async fn zoom_out(&self, anchor: ScreenPoint) -> Result<Viewport> {
		self.view(ViewOp::ZoomOut(anchor)).await
	}

	/// Wheel zoom around `anchor`.
	pub async fn wheel(&self, anchor: ScreenPoint, notches: i32) -> Result<Viewport> {
		self.view(ViewOp::Wheel { anchor, notches }).await
	}

	pub async fn reset_zoom(&self) -> Result<Viewport> {
		self.view(ViewOp::Reset).await
	}

	pub async fn pan_by(&self, dx: f64, dy: f64) -> Result<Viewport> {
		self.view(ViewOp::PanBy { dx, dy }).await
	}

	/// Fits the displayed frame into `canvas`.
	pub async fn fit_to(&self, canvas: Size) -> Result<Viewport> {
		self.view(ViewOp::Fit(canvas)).await
	}

	/// Updates the hover sample shown in the status line. `None` clears it.
	pub async fn track_pointer(&self, point: Option<ScreenPoint>) -> Result<Hover> {
		self.call(|reply| Command::TrackPointer { point, reply }).await
	}

	/// Pins the sample under `point`. `None` unpins.
	pub async fn pin_at(&self, point: Option<ScreenPoint>) -> Result<Hover> {
		self.call(|reply| Command::Pin { point, reply }).await
	}

	/// Requests a fresh frame for the current position.
	pub async fn refresh(&self) -> Result<FrameToken> {
		self.call(|reply| Command::Refresh { reply }).await?
	}

	/// Starts a job and resolves once the backend acknowledges it.
	pub async fn start_operation(&self, op: impl Into<String>, params: serde_json::Value, mode: RunMode) -> Result<JobTicket> {
		let op = op.into();
		self.call(|reply| Command::Start { op, params, mode, reply }).await?
	}

	/// Asks the backend to cancel the tracked job. The job stays tracked until its terminal event.
	pub async fn cancel_operation(&self) -> Result<()> {
		self.call(|reply| Command::Cancel { reply }).await?
	}

	/// Exports the current source, including the active preview if any.
	pub async fn export(&self, output_path: impl Into<PathBuf>) -> Result<()> {
		let output_path = output_path.into();
		self.call(|reply| Command::Export { output_path, reply }).await?
	}
}

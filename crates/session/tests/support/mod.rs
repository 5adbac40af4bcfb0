//! Scripted backend for driving session actors from tests.
//!
//! Every render and job start blocks until the test releases it, so tests
//! control exactly when and in which order responses reach the session.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ijview_primitives::{DisplayRange, Frame, Histogram, JobId, SessionId};
use ijview_proto::{Backend, BackendError, ExportRequest, FrameRequest, ImageSummary, JobEvent, JobStatus, JobTicket, RunMode, SessionEvent, StartJob};
use ijview_session::{SessionHandle, SessionSnapshot};
use tokio::sync::{broadcast, mpsc, oneshot};

pub const WIDTH: usize = 4;
pub const HEIGHT: usize = 3;

pub struct PendingRender {
	pub session: SessionId,
	pub request: FrameRequest,
	reply: oneshot::Sender<Result<Frame, BackendError>>,
}

impl PendingRender {
	pub fn respond(self, result: Result<Frame, BackendError>) {
		let _ = self.reply.send(result);
	}

	/// Responds with a flat frame whose pixels all equal `fill`.
	pub fn respond_fill(self, fill: u8) {
		self.respond(Ok(frame(fill)));
	}
}

pub struct PendingStart {
	pub session: SessionId,
	pub request: StartJob,
	reply: oneshot::Sender<Result<JobTicket, BackendError>>,
}

impl PendingStart {
	pub fn respond(self, result: Result<JobTicket, BackendError>) {
		let _ = self.reply.send(result);
	}

	pub fn accept(self, job: u64) {
		self.respond(Ok(JobTicket { job_id: JobId(job) }));
	}
}

pub struct ScriptedBackend {
	renders: mpsc::UnboundedSender<PendingRender>,
	starts: mpsc::UnboundedSender<PendingStart>,
	cancels: mpsc::UnboundedSender<(SessionId, JobId)>,
	exports: mpsc::UnboundedSender<(SessionId, ExportRequest)>,
	releases: mpsc::UnboundedSender<SessionId>,
	events: broadcast::Sender<SessionEvent>,
}

pub struct Script {
	renders: mpsc::UnboundedReceiver<PendingRender>,
	starts: mpsc::UnboundedReceiver<PendingStart>,
	cancels: mpsc::UnboundedReceiver<(SessionId, JobId)>,
	exports: mpsc::UnboundedReceiver<(SessionId, ExportRequest)>,
	releases: mpsc::UnboundedReceiver<SessionId>,
	events: broadcast::Sender<SessionEvent>,
}

pub fn scripted() -> (Arc<ScriptedBackend>, Script) {
	let (renders_tx, renders) = mpsc::unbounded_channel();
	let (starts_tx, starts) = mpsc::unbounded_channel();
	let (cancels_tx, cancels) = mpsc::unbounded_channel();
	let (exports_tx, exports) = mpsc::unbounded_channel();
	let (releases_tx, releases) = mpsc::unbounded_channel();
	let (events, _) = broadcast::channel(64);
	let backend = ScriptedBackend {
		renders: renders_tx,
		starts: starts_tx,
		cancels: cancels_tx,
		exports: exports_tx,
		releases: releases_tx,
		events: events.clone(),
	};
	let script = Script {
		renders,
		starts,
		cancels,
		exports,
		releases,
		events,
	};
	(Arc::new(backend), script)
}

const WAIT: Duration = Duration::from_secs(5);

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>, what: &str) -> T {
	match tokio::time::timeout(WAIT, rx.recv()).await {
		Ok(Some(value)) => value,
		Ok(None) => panic!("{what} channel closed"),
		Err(_) => panic!("timed out waiting for {what}"),
	}
}

impl Script {
	pub async fn next_render(&mut self) -> PendingRender {
		recv(&mut self.renders, "render").await
	}

	pub async fn next_start(&mut self) -> PendingStart {
		recv(&mut self.starts, "job start").await
	}

	pub async fn next_cancel(&mut self) -> (SessionId, JobId) {
		recv(&mut self.cancels, "cancel").await
	}

	pub async fn next_export(&mut self) -> (SessionId, ExportRequest) {
		recv(&mut self.exports, "export").await
	}

	pub async fn next_release(&mut self) -> SessionId {
		recv(&mut self.releases, "release").await
	}

	pub fn no_pending_render(&mut self) -> bool {
		self.renders.try_recv().is_err()
	}

	pub fn emit(&self, session: SessionId, job: u64, mode: RunMode, status: JobStatus) {
		let _ = self.events.send(SessionEvent {
			session_id: session,
			event: JobEvent {
				job_id: JobId(job),
				mode,
				op: "gaussian.blur".into(),
				status,
				message: None,
			},
		});
	}
}

pub fn frame(fill: u8) -> Frame {
	Frame::new(WIDTH, HEIGHT, vec![fill; WIDTH * HEIGHT], Histogram::default(), DisplayRange::new(0.0, 255.0)).unwrap()
}

pub fn fill_of(snapshot: &SessionSnapshot) -> Option<u8> {
	snapshot.frame.as_ref().map(|frame| frame.pixels()[0])
}

/// Lets spawned backend tasks post their results, then round-trips a
/// command so the actor has consumed everything queued before it.
pub async fn settle(handle: &SessionHandle) {
	for _ in 0..16 {
		tokio::task::yield_now().await;
	}
	let _ = handle.track_pointer(None).await;
}

#[async_trait]
impl Backend for ScriptedBackend {
	async fn inspect(&self, _session: SessionId, path: &Path) -> Result<ImageSummary, BackendError> {
		if path.to_string_lossy().contains("unreadable") {
			return Err(BackendError::InvalidParameters(format!("cannot decode {}", path.display())));
		}
		Ok(ImageSummary {
			shape: vec![5, 2, HEIGHT, WIDTH],
			axes: "ZCYX".into(),
			channels: 2,
			z_slices: 5,
			times: 1,
			min: 0.0,
			max: 255.0,
			source: path.to_path_buf(),
		})
	}

	async fn render_frame(&self, session: SessionId, request: FrameRequest) -> Result<Frame, BackendError> {
		let (reply, rx) = oneshot::channel();
		self.renders
			.send(PendingRender { session, request, reply })
			.map_err(|_| BackendError::TransportUnavailable("script dropped".into()))?;
		rx.await.map_err(|_| BackendError::TransportUnavailable("script dropped".into()))?
	}

	async fn start_job(&self, session: SessionId, request: StartJob) -> Result<JobTicket, BackendError> {
		let (reply, rx) = oneshot::channel();
		self.starts
			.send(PendingStart { session, request, reply })
			.map_err(|_| BackendError::TransportUnavailable("script dropped".into()))?;
		rx.await.map_err(|_| BackendError::TransportUnavailable("script dropped".into()))?
	}

	async fn cancel_job(&self, session: SessionId, job_id: JobId) -> Result<(), BackendError> {
		let _ = self.cancels.send((session, job_id));
		Ok(())
	}

	async fn export_current(&self, session: SessionId, request: ExportRequest) -> Result<(), BackendError> {
		let _ = self.exports.send((session, request));
		Ok(())
	}

	async fn list_preview_ops(&self) -> Result<Vec<String>, BackendError> {
		Ok(vec!["gaussian.blur".into()])
	}

	async fn release(&self, session: SessionId) -> Result<(), BackendError> {
		let _ = self.releases.send(session);
		Ok(())
	}

	fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
		self.events.subscribe()
	}
}

//! Session actor.
//!
//! One task per session owns the [`SessionContext`] and consumes a single
//! bounded queue. User commands, backend responses, routed job events and
//! watchdog ticks are all [`SessionMsg`]s, so state changes never interleave.
//! Backend calls run on spawned tasks that post their results back into the
//! same queue; the actor itself never awaits the backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ijview_primitives::{Frame, FrameToken, JobId, JobToken, ScreenPoint, SessionId, Viewport};
use ijview_proto::{Backend, BackendError, ImageSummary, JobEvent, JobTicket, RunMode};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::config::ViewerConfig;
use crate::context::{Effect, Hover, Notice, SessionContext, SessionSnapshot, ViewOp};
use crate::error::{Result, SessionError};
use crate::handle::SessionHandle;
use crate::spawn::{TaskClass, spawn};

/// User-facing requests carried to the actor.
pub(crate) enum Command {
	SetAxis {
		z: Option<usize>,
		t: Option<usize>,
		channel: Option<usize>,
		reply: oneshot::Sender<Result<Option<FrameToken>>>,
	},
	View {
		op: ViewOp,
		reply: oneshot::Sender<Result<Viewport>>,
	},
	TrackPointer {
		point: Option<ScreenPoint>,
		reply: oneshot::Sender<Hover>,
	},
	Pin {
		point: Option<ScreenPoint>,
		reply: oneshot::Sender<Hover>,
	},
	Refresh {
		reply: oneshot::Sender<Result<FrameToken>>,
	},
	Start {
		op: String,
		params: serde_json::Value,
		mode: RunMode,
		reply: oneshot::Sender<Result<JobTicket>>,
	},
	Cancel {
		reply: oneshot::Sender<Result<()>>,
	},
	Export {
		output_path: PathBuf,
		reply: oneshot::Sender<Result<()>>,
	},
}

/// Everything a session actor consumes.
pub(crate) enum SessionMsg {
	Command(Command),
	FrameResponse {
		token: FrameToken,
		result: std::result::Result<Frame, BackendError>,
	},
	JobAck {
		token: JobToken,
		result: std::result::Result<JobTicket, BackendError>,
	},
	JobEvent(JobEvent),
	CancelAck {
		job_id: JobId,
		result: std::result::Result<(), BackendError>,
	},
	ExportDone {
		output_path: PathBuf,
		result: std::result::Result<(), BackendError>,
		reply: oneshot::Sender<Result<()>>,
	},
	Watchdog(JobId),
}

struct SessionActor<B: Backend> {
	ctx: SessionContext,
	backend: Arc<B>,
	tx: mpsc::WeakSender<SessionMsg>,
	snapshot: watch::Sender<SessionSnapshot>,
	notices: broadcast::Sender<Notice>,
	pending_start: Option<(JobToken, oneshot::Sender<Result<JobTicket>>)>,
	job_timeout: Option<Duration>,
}

/// Spawns the actor for a freshly inspected session and requests its first frame.
pub(crate) fn spawn_session<B: Backend>(id: SessionId, summary: ImageSummary, backend: Arc<B>, config: &ViewerConfig, cancel: CancellationToken) -> SessionHandle {
	let source = summary.source.clone();
	let mut ctx = SessionContext::new(id, summary, config);
	ctx.request_frame();

	let (tx, rx) = mpsc::channel(config.mailbox_capacity);
	let (snapshot_tx, snapshot_rx) = watch::channel(ctx.snapshot());
	let (notices, _) = broadcast::channel(config.notice_capacity);

	let actor = SessionActor {
		ctx,
		backend,
		tx: tx.downgrade(),
		snapshot: snapshot_tx,
		notices: notices.clone(),
		pending_start: None,
		job_timeout: config.job_timeout(),
	};
	spawn(TaskClass::Control, actor.run(rx, cancel.clone()));
	SessionHandle::new(id, source, tx, snapshot_rx, notices, cancel)
}

impl<B: Backend> SessionActor<B> {
	async fn run(mut self, mut rx: mpsc::Receiver<SessionMsg>, cancel: CancellationToken) {
		let id = self.ctx.id();
		tracing::debug!(session = %id, "session.started");
		self.flush();
		self.publish();
		loop {
			let msg = tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				msg = rx.recv() => match msg {
					Some(msg) => msg,
					None => break,
				},
			};
			self.handle(msg);
			self.flush();
			self.publish();
		}
		if let Some((_, reply)) = self.pending_start.take() {
			let _ = reply.send(Err(SessionError::Closed));
		}
		tracing::debug!(session = %id, "session.stopped");
	}

	fn handle(&mut self, msg: SessionMsg) {
		match msg {
			SessionMsg::Command(command) => self.handle_command(command),
			SessionMsg::FrameResponse { token, result } => self.ctx.on_frame_response(token, result),
			SessionMsg::JobAck { token, result } => self.on_job_ack(token, result),
			SessionMsg::JobEvent(event) => self.ctx.on_job_event(event),
			SessionMsg::CancelAck { job_id, result } => self.ctx.on_cancel_ack(job_id, result),
			SessionMsg::ExportDone { output_path, result, reply } => {
				let _ = reply.send(self.ctx.on_export_result(output_path, result));
			}
			SessionMsg::Watchdog(job_id) => {
				self.ctx.on_watchdog(job_id);
			}
		}
	}

	fn handle_command(&mut self, command: Command) {
		match command {
			Command::SetAxis { z, t, channel, reply } => {
				let _ = reply.send(self.ctx.set_axis(z, t, channel));
			}
			Command::View { op, reply } => {
				let _ = reply.send(self.ctx.apply_view(op));
			}
			Command::TrackPointer { point, reply } => {
				let hover = match point {
					Some(point) => self.ctx.track_pointer(point),
					None => {
						self.ctx.clear_pointer();
						Hover::Outside
					}
				};
				let _ = reply.send(hover);
			}
			Command::Pin { point, reply } => {
				let hover = match point {
					Some(point) => self.ctx.pin_at(point),
					None => {
						self.ctx.unpin();
						Hover::Outside
					}
				};
				let _ = reply.send(hover);
			}
			Command::Refresh { reply } => {
				let _ = reply.send(self.ctx.refresh());
			}
			Command::Start { op, params, mode, reply } => match self.ctx.start_operation(op, params, mode) {
				Ok(token) => self.pending_start = Some((token, reply)),
				Err(error) => {
					let _ = reply.send(Err(error));
				}
			},
			Command::Cancel { reply } => {
				let _ = reply.send(self.ctx.cancel_operation());
			}
			Command::Export { output_path, reply } => self.export(output_path, reply),
		}
	}

	fn on_job_ack(&mut self, token: JobToken, result: std::result::Result<JobTicket, BackendError>) {
		let Some(answer) = self.ctx.on_job_ack(token, result) else {
			return;
		};
		if let Ok(ticket) = &answer
			&& self.ctx.jobs().tracked() == Some(ticket.job_id)
		{
			self.arm_watchdog(ticket.job_id);
		}
		if let Some((pending, reply)) = self.pending_start.take() {
			if pending == token {
				let _ = reply.send(answer);
			} else {
				self.pending_start = Some((pending, reply));
			}
		}
	}

	fn arm_watchdog(&self, job_id: JobId) {
		let Some(timeout) = self.job_timeout else {
			return;
		};
		let Some(tx) = self.tx.upgrade() else {
			return;
		};
		spawn(TaskClass::Control, async move {
			tokio::time::sleep(timeout).await;
			let _ = tx.send(SessionMsg::Watchdog(job_id)).await;
		});
	}

	fn export(&self, output_path: PathBuf, reply: oneshot::Sender<Result<()>>) {
		let request = match self.ctx.export_request(output_path.clone()) {
			Ok(request) => request,
			Err(error) => {
				let _ = reply.send(Err(error));
				return;
			}
		};
		let Some(tx) = self.tx.upgrade() else {
			let _ = reply.send(Err(SessionError::Closed));
			return;
		};
		let backend = Arc::clone(&self.backend);
		let id = self.ctx.id();
		spawn(TaskClass::Control, async move {
			let result = backend.export_current(id, request).await;
			let _ = tx.send(SessionMsg::ExportDone { output_path, result, reply }).await;
		});
	}

	/// Dispatches queued effects as backend calls.
	fn flush(&mut self) {
		let effects = self.ctx.drain_effects();
		if effects.is_empty() {
			return;
		}
		let Some(tx) = self.tx.upgrade() else {
			return;
		};
		let id = self.ctx.id();
		for effect in effects {
			let backend = Arc::clone(&self.backend);
			let tx = tx.clone();
			match effect {
				Effect::Render { token, request } => {
					spawn(TaskClass::Render, async move {
						let result = backend.render_frame(id, request).await;
						let _ = tx.send(SessionMsg::FrameResponse { token, result }).await;
					});
				}
				Effect::StartJob { token, request } => {
					spawn(TaskClass::Job, async move {
						let result = backend.start_job(id, request).await;
						let _ = tx.send(SessionMsg::JobAck { token, result }).await;
					});
				}
				Effect::CancelJob { job_id } => {
					spawn(TaskClass::Job, async move {
						let result = backend.cancel_job(id, job_id).await;
						let _ = tx.send(SessionMsg::CancelAck { job_id, result }).await;
					});
				}
			}
		}
	}

	/// Publishes the snapshot before notices, so a notice receiver always
	/// observes state at least as new as the notice.
	fn publish(&mut self) {
		self.snapshot.send_replace(self.ctx.snapshot());
		for notice in self.ctx.drain_notices() {
			let _ = self.notices.send(notice);
		}
	}
}


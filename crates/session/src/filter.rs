//! Job event routing and filtering.
//!
//! Backend job events arrive on a single process-wide subscription. The
//! [`EventRouter`] hands each one to a per-session forwarder that feeds the
//! session's mailbox, so a session that is slow to drain never holds up the
//! others. Inside the session, [`classify`] decides whether the event touches
//! state.

use std::collections::HashMap;
use std::sync::Arc;

use ijview_primitives::{JobId, SessionId};
use ijview_proto::{JobEvent, SessionEvent};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::actor::SessionMsg;
use crate::job::JobPhase;
use crate::spawn::{TaskClass, spawn};

/// Why an event was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
	/// No job is tracked (never started, or already retired).
	NoTrackedJob,
	/// The event belongs to a job other than the tracked one.
	ForeignJob { tracked: JobId },
}

/// What a session should do with a job event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
	Discard(Discard),
	/// The tracked job's id is not known yet; hold the event.
	Park,
	/// Progress on the tracked job.
	Progress,
	/// Final event for the tracked job.
	Terminal,
}

/// Classifies `event` against the session's job phase.
pub fn classify(phase: &JobPhase, event: &JobEvent) -> Verdict {
	match phase {
		JobPhase::Idle => Verdict::Discard(Discard::NoTrackedJob),
		JobPhase::Starting(_) => Verdict::Park,
		JobPhase::Running(active) if active.job_id != event.job_id => Verdict::Discard(Discard::ForeignJob { tracked: active.job_id }),
		JobPhase::Running(_) if event.status.is_terminal() => Verdict::Terminal,
		JobPhase::Running(_) => Verdict::Progress,
	}
}

/// Maps session ids to their event forwarders.
#[derive(Clone, Default)]
pub struct EventRouter {
	routes: Arc<RwLock<HashMap<SessionId, mpsc::UnboundedSender<JobEvent>>>>,
}

impl EventRouter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Routes events for `id` into `mailbox`.
	///
	/// Spawns the forwarder for this session. It exits once the route is
	/// removed or the mailbox closes.
	pub(crate) fn register(&self, id: SessionId, mailbox: mpsc::Sender<SessionMsg>) {
		let (tx, mut rx) = mpsc::unbounded_channel::<JobEvent>();
		spawn(TaskClass::Control, async move {
			while let Some(event) = rx.recv().await {
				if mailbox.send(SessionMsg::JobEvent(event)).await.is_err() {
					break;
				}
			}
			tracing::trace!(session = %id, "events.forwarder_stopped");
		});
		self.routes.write().insert(id, tx);
	}

	pub(crate) fn unregister(&self, id: SessionId) -> bool {
		self.routes.write().remove(&id).is_some()
	}

	pub fn is_routed(&self, id: SessionId) -> bool {
		self.routes.read().contains_key(&id)
	}

	pub fn len(&self) -> usize {
		self.routes.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.routes.read().is_empty()
	}

	/// Queues one event for its session without waiting on the session.
	///
	/// Returns `false` when the session is unknown or gone.
	pub fn route(&self, event: SessionEvent) -> bool {
		let tx = self.routes.read().get(&event.session_id).cloned();
		let Some(tx) = tx else {
			tracing::trace!(session = %event.session_id, job = event.event.job_id.0, "events.unknown_session");
			return false;
		};
		tx.send(event.event).is_ok()
	}

	/// Pumps `events` into sessions until cancelled or the stream closes.
	pub async fn run(self, mut events: broadcast::Receiver<SessionEvent>, cancel: CancellationToken) {
		tracing::debug!("events.pump_started");
		loop {
			let next = tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				next = events.recv() => next,
			};
			match next {
				Ok(event) => {
					self.route(event);
				}
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					tracing::warn!(skipped, "events.lagged");
				}
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}
		tracing::debug!("events.pump_stopped");
	}
}

//! Single-slot job lifecycle.
//!
//! ```text
//! Idle ──start──▶ Starting ──ack ok──▶ Running ──terminal event──▶ Idle
//!                    │
//!                    └──ack err──▶ Idle
//! ```
//!
//! `cancel` never moves the state machine; only an observed terminal event
//! frees the slot.

use ijview_primitives::{JobId, JobToken};
use ijview_proto::{BackendError, JobEvent, JobStatus, JobTicket, RunMode, StartJob};

use crate::error::SessionError;

/// A job whose start request has not been acknowledged yet.
#[derive(Debug, Clone, PartialEq)]
pub struct StartingJob {
	pub token: JobToken,
	pub request: StartJob,
	pub cancel_requested: bool,
	parked: Vec<JobEvent>,
}

/// A job the backend has acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveJob {
	pub job_id: JobId,
	pub request: StartJob,
	pub cancel_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum JobPhase {
	#[default]
	Idle,
	Starting(StartingJob),
	Running(ActiveJob),
}

impl JobPhase {
	/// Backend id of the tracked job, known only once `Running`.
	pub fn tracked(&self) -> Option<JobId> {
		match self {
			Self::Running(active) => Some(active.job_id),
			_ => None,
		}
	}

	pub const fn is_idle(&self) -> bool {
		matches!(self, Self::Idle)
	}
}

/// Final state of a retired job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
	pub job_id: JobId,
	pub op: String,
	pub mode: RunMode,
	pub status: JobStatus,
	pub message: Option<String>,
}

/// What to do after a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAction {
	/// Send a cancel for this job now.
	Send(JobId),
	/// The job id is not known yet; cancel is sent on acknowledgment.
	Deferred,
}

/// Result of feeding a start acknowledgment.
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
	/// The acknowledgment does not belong to the current start.
	Stale,
	/// The job is now running. `replay` holds parked events for this job.
	Started { job: ActiveJob, replay: Vec<JobEvent> },
	/// The backend refused the start; the slot is free again.
	Rejected { request: StartJob, error: BackendError },
}

/// Per-session job slot.
#[derive(Debug)]
pub struct JobLifecycle {
	latest: JobToken,
	phase: JobPhase,
	last_outcome: Option<JobOutcome>,
	parked_limit: usize,
}

impl JobLifecycle {
	pub fn new(parked_limit: usize) -> Self {
		Self {
			latest: JobToken::default(),
			phase: JobPhase::Idle,
			last_outcome: None,
			parked_limit,
		}
	}

	/// Current phase of the slot.
	pub const fn phase(&self) -> &JobPhase {
		&self.phase
	}

	pub fn tracked(&self) -> Option<JobId> {
		self.phase.tracked()
	}

	/// Whether a job is starting or running.
	pub const fn is_busy(&self) -> bool {
		!self.phase.is_idle()
	}

	/// Outcome of the most recently retired job.
	pub const fn last_outcome(&self) -> Option<&JobOutcome> {
		self.last_outcome.as_ref()
	}

	/// Claims the slot for `request`.
	///
	/// Fails with [`SessionError::AlreadyRunning`] unless idle, leaving the
	/// tracked job untouched.
	pub fn start(&mut self, request: StartJob) -> Result<JobToken, SessionError> {
		match &self.phase {
			JobPhase::Idle => {}
			JobPhase::Starting(_) => return Err(SessionError::AlreadyRunning { job: None }),
			JobPhase::Running(active) => {
				return Err(SessionError::AlreadyRunning {
					job: Some(active.job_id),
				});
			}
		}
		self.latest = self.latest.next();
		self.phase = JobPhase::Starting(StartingJob {
			token: self.latest,
			request,
			cancel_requested: false,
			parked: Vec::new(),
		});
		Ok(self.latest)
	}

	/// Applies the backend's answer to the start tagged `token`.
	pub fn acknowledge(&mut self, token: JobToken, result: Result<JobTicket, BackendError>) -> AckOutcome {
		if token != self.latest {
			return AckOutcome::Stale;
		}
		let JobPhase::Starting(starting) = &self.phase else {
			return AckOutcome::Stale;
		};
		if starting.token != token {
			return AckOutcome::Stale;
		}
		let JobPhase::Starting(starting) = std::mem::take(&mut self.phase) else {
			return AckOutcome::Stale;
		};
		match result {
			Ok(ticket) => {
				let job = ActiveJob {
					job_id: ticket.job_id,
					request: starting.request,
					cancel_requested: starting.cancel_requested,
				};
				let parked = starting.parked.len();
				let replay: Vec<_> = starting.parked.into_iter().filter(|event| event.job_id == ticket.job_id).collect();
				if replay.len() != parked {
					tracing::trace!(dropped = parked - replay.len(), "job.parked_foreign");
				}
				self.phase = JobPhase::Running(job.clone());
				AckOutcome::Started { job, replay }
			}
			Err(error) => AckOutcome::Rejected {
				request: starting.request,
				error,
			},
		}
	}

	/// Requests cancellation of the tracked job.
	pub fn cancel(&mut self) -> Result<CancelAction, SessionError> {
		match &mut self.phase {
			JobPhase::Idle => Err(SessionError::NoActiveJob),
			JobPhase::Starting(starting) => {
				starting.cancel_requested = true;
				Ok(CancelAction::Deferred)
			}
			JobPhase::Running(active) => {
				active.cancel_requested = true;
				Ok(CancelAction::Send(active.job_id))
			}
		}
	}

	/// Holds an event that arrived before the start was acknowledged.
	///
	/// Progress events coalesce to the latest one per job. When the parking
	/// area is full the oldest progress event is evicted; terminal events are
	/// always kept. Returns `false` when nothing is starting or a progress
	/// event had to be dropped.
	pub fn park(&mut self, event: JobEvent) -> bool {
		let JobPhase::Starting(starting) = &mut self.phase else {
			return false;
		};
		let parked = &mut starting.parked;
		if !event.status.is_terminal()
			&& let Some(slot) = parked.iter_mut().find(|p| p.job_id == event.job_id && !p.status.is_terminal())
		{
			*slot = event;
			return true;
		}
		if parked.len() >= self.parked_limit {
			match parked.iter().position(|p| !p.status.is_terminal()) {
				Some(oldest) => {
					let evicted = parked.remove(oldest);
					tracing::debug!(job = evicted.job_id.0, limit = self.parked_limit, "job.park_evicted");
				}
				None if !event.status.is_terminal() => {
					tracing::warn!(job = event.job_id.0, limit = self.parked_limit, "job.park_overflow");
					return false;
				}
				None => {}
			}
		}
		parked.push(event);
		true
	}

	/// Retires the tracked job if `event` is its terminal event.
	pub fn finish(&mut self, event: &JobEvent) -> Option<(ActiveJob, JobOutcome)> {
		if !event.status.is_terminal() || self.tracked() != Some(event.job_id) {
			return None;
		}
		let JobPhase::Running(active) = std::mem::take(&mut self.phase) else {
			return None;
		};
		let outcome = JobOutcome {
			job_id: active.job_id,
			op: active.request.op.clone(),
			mode: active.request.mode,
			status: event.status,
			message: event.message.clone(),
		};
		self.last_outcome = Some(outcome.clone());
		Some((active, outcome))
	}
}

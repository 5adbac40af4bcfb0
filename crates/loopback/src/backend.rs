//! [`Backend`] implementation over in-memory stacks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ijview_primitives::{CounterIdGen, Frame, JobId, SessionId};
use ijview_proto::{
	Backend, BackendError, ExportRequest, FrameRequest, ImageSummary, JobEvent, JobStatus, JobTicket, Result, RunMode,
	SessionEvent, StartJob, preview_key,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::ops::{OpError, OpRegistry, Operation};
use crate::render::render_plane;
use crate::stack::Stack;

#[cfg(test)]
mod tests;

const EVENT_CAPACITY: usize = 256;

/// Status text of a job cancelled before it finished.
pub const CANCELLED_MESSAGE: &str = "Operation cancelled.";

struct RunningJob {
	op: String,
	mode: RunMode,
	cancel: CancellationToken,
}

struct SessionState {
	source: PathBuf,
	committed: Arc<Stack>,
	previews: HashMap<String, Arc<Stack>>,
	/// Key of the preview frames are rendered from, if any.
	active_preview: Option<String>,
	jobs: HashMap<JobId, RunningJob>,
}

impl SessionState {
	fn current(&self) -> Arc<Stack> {
		self.active_preview
			.as_ref()
			.and_then(|key| self.previews.get(key))
			.map_or_else(|| Arc::clone(&self.committed), Arc::clone)
	}
}

struct Shared {
	datasets: RwLock<HashMap<PathBuf, Arc<Stack>>>,
	sessions: Mutex<HashMap<SessionId, SessionState>>,
	job_ids: Mutex<CounterIdGen>,
	ops: OpRegistry,
	events: broadcast::Sender<SessionEvent>,
}

impl Shared {
	fn emit(&self, session: SessionId, job_id: JobId, op: &str, mode: RunMode, status: JobStatus, message: Option<String>) {
		tracing::debug!(%session, job = job_id.0, op, %mode, %status, "loopback.event");
		let _ = self.events.send(SessionEvent {
			session_id: session,
			event: JobEvent {
				job_id,
				mode,
				op: op.to_string(),
				status,
				message,
			},
		});
	}

	fn with_session<T>(&self, session: SessionId, f: impl FnOnce(&mut SessionState) -> Result<T>) -> Result<T> {
		let mut sessions = self.sessions.lock();
		let state = sessions.get_mut(&session).ok_or(BackendError::UnknownSession(session))?;
		f(state)
	}

	/// Stores a finished job's output unless the job was cancelled or the
	/// session released meanwhile.
	fn finish(&self, session: SessionId, job_id: JobId, key: String, result: std::result::Result<Stack, OpError>) {
		let mut sessions = self.sessions.lock();
		let Some(state) = sessions.get_mut(&session) else {
			return;
		};
		let Some(job) = state.jobs.remove(&job_id) else {
			tracing::trace!(%session, job = job_id.0, "loopback.late_result");
			return;
		};
		let (status, message) = match result {
			Ok(stack) => {
				let stack = Arc::new(stack);
				match job.mode {
					RunMode::Preview => {
						state.previews.insert(key.clone(), stack);
						state.active_preview = Some(key);
					}
					RunMode::Apply => {
						state.committed = stack;
						state.previews.clear();
						state.active_preview = None;
					}
				}
				(JobStatus::Completed, None)
			}
			Err(OpError::Cancelled) => (JobStatus::Cancelled, Some(CANCELLED_MESSAGE.to_string())),
			Err(error) => (JobStatus::Failed, Some(error.to_string())),
		};
		drop(sessions);
		self.emit(session, job_id, &job.op, job.mode, status, message);
	}
}

/// Reference backend that keeps every dataset in memory.
///
/// Datasets are registered by path up front, or read from `.json` stack files
/// on [`Backend::inspect`]. Each session has a committed stack plus a cache of
/// previews keyed by [`preview_key`]; frames render from the active preview
/// when one is set.
#[derive(Clone)]
pub struct LoopbackBackend {
	shared: Arc<Shared>,
	render_delay: Duration,
}

impl Default for LoopbackBackend {
	fn default() -> Self {
		Self::new(OpRegistry::builtin())
	}
}

impl LoopbackBackend {
	pub fn new(ops: OpRegistry) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			shared: Arc::new(Shared {
				datasets: RwLock::new(HashMap::new()),
				sessions: Mutex::new(HashMap::new()),
				job_ids: Mutex::new(CounterIdGen::new()),
				ops,
				events,
			}),
			render_delay: Duration::ZERO,
		}
	}

	/// Delays every frame render, so responses overtake each other the way they
	/// do over a slow transport.
	#[must_use]
	pub const fn with_render_delay(mut self, delay: Duration) -> Self {
		self.render_delay = delay;
		self
	}

	/// Makes `stack` available under `path`.
	pub fn register(&self, path: impl Into<PathBuf>, stack: Stack) {
		self.shared.datasets.write().insert(path.into(), Arc::new(stack));
	}

	fn lookup(&self, path: &Path) -> Option<Arc<Stack>> {
		let datasets = self.shared.datasets.read();
		datasets
			.get(path)
			.or_else(|| std::fs::canonicalize(path).ok().and_then(|canonical| datasets.get(&canonical)))
			.cloned()
	}

	async fn load(&self, path: &Path) -> Result<Arc<Stack>> {
		if let Some(stack) = self.lookup(path) {
			return Ok(stack);
		}
		if path.extension().is_none_or(|ext| ext != "json") {
			return Err(BackendError::InvalidParameters(format!("no dataset at {}", path.display())));
		}
		let owned = path.to_path_buf();
		let stack = tokio::task::spawn_blocking(move || -> Result<Stack> {
			let bytes = std::fs::read(&owned)
				.map_err(|error| BackendError::InvalidParameters(format!("{}: {error}", owned.display())))?;
			serde_json::from_slice(&bytes)
				.map_err(|error| BackendError::InvalidParameters(format!("{}: {error}", owned.display())))
		})
		.await
		.map_err(|error| BackendError::Failed(error.to_string()))??;
		Ok(Arc::new(stack))
	}

	/// The stack frames of `session` are currently rendered from.
	pub fn current_stack(&self, session: SessionId) -> Option<Arc<Stack>> {
		self.shared.sessions.lock().get(&session).map(SessionState::current)
	}

	/// Number of jobs still running for `session`.
	pub fn running_jobs(&self, session: SessionId) -> usize {
		self.shared.sessions.lock().get(&session).map_or(0, |state| state.jobs.len())
	}

	fn spawn_job(&self, session: SessionId, job_id: JobId, op: Arc<dyn Operation>, input: Arc<Stack>, request: StartJob, cancel: CancellationToken) {
		let shared = Arc::clone(&self.shared);
		let key = preview_key(&request.op, &request.params);
		tokio::spawn(async move {
			let params = request.params;
			let result = tokio::task::spawn_blocking(move || op.execute(&input, &params, &cancel))
				.await
				.unwrap_or_else(|error| Err(OpError::Failed(error.to_string())));
			shared.finish(session, job_id, key, result);
		});
	}
}

#[derive(Serialize)]
struct ExportDocument<'a> {
	source: &'a Path,
	preview: Option<&'a str>,
	#[serde(flatten)]
	stack: &'a Stack,
}

#[async_trait]
impl Backend for LoopbackBackend {
	async fn inspect(&self, session: SessionId, path: &Path) -> Result<ImageSummary> {
		let stack = self.load(path).await?;
		let summary = stack.summary(path.to_path_buf());
		tracing::info!(%session, path = %path.display(), shape = ?summary.shape, "loopback.inspect");
		self.shared.sessions.lock().insert(
			session,
			SessionState {
				source: path.to_path_buf(),
				committed: stack,
				previews: HashMap::new(),
				active_preview: None,
				jobs: HashMap::new(),
			},
		);
		Ok(summary)
	}

	async fn render_frame(&self, session: SessionId, request: FrameRequest) -> Result<Frame> {
		let stack = self.shared.with_session(session, |state| Ok(state.current()))?;
		if !self.render_delay.is_zero() {
			tokio::time::sleep(self.render_delay).await;
		}
		tokio::task::spawn_blocking(move || render_plane(&stack, request))
			.await
			.map_err(|error| BackendError::Failed(error.to_string()))?
	}

	async fn start_job(&self, session: SessionId, request: StartJob) -> Result<JobTicket> {
		let op = self.shared.ops.get(&request.op)?;
		if request.mode == RunMode::Preview && !op.supports_preview() {
			return Err(BackendError::InvalidParameters(format!("`{}` has no preview", request.op)));
		}
		op.validate(&request.params)?;

		let key = preview_key(&request.op, &request.params);
		let job_id = JobId(self.shared.job_ids.lock().next());
		let cancel = CancellationToken::new();
		let input = self.shared.with_session(session, |state| {
			if request.mode == RunMode::Preview && state.previews.contains_key(&key) {
				state.active_preview = Some(key.clone());
				return Ok(None);
			}
			state.jobs.insert(
				job_id,
				RunningJob {
					op: request.op.clone(),
					mode: request.mode,
					cancel: cancel.clone(),
				},
			);
			Ok(Some(Arc::clone(&state.committed)))
		})?;

		tracing::debug!(%session, job = job_id.0, op = %request.op, mode = %request.mode, cached = input.is_none(), "loopback.start");
		let Some(input) = input else {
			self.shared
				.emit(session, job_id, &request.op, request.mode, JobStatus::Completed, Some("cached".to_string()));
			return Ok(JobTicket { job_id });
		};
		self.shared.emit(session, job_id, &request.op, request.mode, JobStatus::Running, None);
		self.spawn_job(session, job_id, op, input, request, cancel);
		Ok(JobTicket { job_id })
	}

	async fn cancel_job(&self, session: SessionId, job_id: JobId) -> Result<()> {
		let job = self.shared.with_session(session, |state| Ok(state.jobs.remove(&job_id)))?;
		let Some(job) = job else {
			tracing::trace!(%session, job = job_id.0, "loopback.cancel_finished");
			return Ok(());
		};
		job.cancel.cancel();
		self.shared.emit(
			session,
			job_id,
			&job.op,
			job.mode,
			JobStatus::Cancelled,
			Some(CANCELLED_MESSAGE.to_string()),
		);
		Ok(())
	}

	async fn export_current(&self, session: SessionId, request: ExportRequest) -> Result<()> {
		let (source, key, stack) = self.shared.with_session(session, |state| match &request.preview {
			Some(spec) => {
				let key = preview_key(&spec.op, &spec.params);
				let stack = state
					.previews
					.get(&key)
					.cloned()
					.ok_or_else(|| BackendError::Failed(format!("no cached preview for {}", spec.op)))?;
				Ok((state.source.clone(), Some(key), stack))
			}
			None => Ok((state.source.clone(), None, Arc::clone(&state.committed))),
		})?;

		let output = request.output_path;
		tracing::info!(%session, output = %output.display(), preview = key.is_some(), "loopback.export");
		tokio::task::spawn_blocking(move || -> Result<()> {
			let document = ExportDocument {
				source: &source,
				preview: key.as_deref(),
				stack: &stack,
			};
			let bytes = serde_json::to_vec(&document).map_err(|error| BackendError::Failed(error.to_string()))?;
			std::fs::write(&output, bytes).map_err(|error| BackendError::Failed(format!("{}: {error}", output.display())))
		})
		.await
		.map_err(|error| BackendError::Failed(error.to_string()))?
	}

	async fn list_preview_ops(&self) -> Result<Vec<String>> {
		Ok(self.shared.ops.preview_ops())
	}

	async fn release(&self, session: SessionId) -> Result<()> {
		let state = self.shared.sessions.lock().remove(&session).ok_or(BackendError::UnknownSession(session))?;
		for job in state.jobs.values() {
			job.cancel.cancel();
		}
		tracing::debug!(%session, cancelled = state.jobs.len(), "loopback.release");
		Ok(())
	}

	fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
		self.shared.events.subscribe()
	}
}

use std::sync::mpsc;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use super::*;
use crate::stack::StackShape;

const SESSION: SessionId = SessionId(1);

fn cells() -> Stack {
	Stack::synthetic(StackShape::new(3, 1, 2, 4, 5)).unwrap()
}

async fn opened(backend: &LoopbackBackend) -> ImageSummary {
	backend.register("/data/cells.tif", cells());
	backend.inspect(SESSION, Path::new("/data/cells.tif")).await.unwrap()
}

async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> JobEvent {
	let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
		.await
		.expect("timed out waiting for job event")
		.unwrap();
	assert_eq!(event.session_id, SESSION);
	event.event
}

fn start(op: &str, params: Value, mode: RunMode) -> StartJob {
	StartJob {
		op: op.into(),
		params,
		mode,
	}
}

/// Blocks until the test sends on the paired channel, then returns its input.
struct Gate(parking_lot::Mutex<mpsc::Receiver<()>>);

impl Operation for Gate {
	fn name(&self) -> &'static str {
		"test.gate"
	}

	fn validate(&self, _params: &Value) -> std::result::Result<(), OpError> {
		Ok(())
	}

	fn execute(&self, stack: &Stack, _params: &Value, _cancel: &CancellationToken) -> std::result::Result<Stack, OpError> {
		let _ = self.0.lock().recv();
		Ok(stack.clone())
	}
}

fn gated() -> (LoopbackBackend, mpsc::Sender<()>) {
	let (tx, rx) = mpsc::channel();
	let mut ops = OpRegistry::builtin();
	ops.register(Arc::new(Gate(parking_lot::Mutex::new(rx))));
	(LoopbackBackend::new(ops), tx)
}

#[tokio::test]
async fn inspect_and_render_registered_stack() {
	let backend = LoopbackBackend::default();
	let summary = opened(&backend).await;
	assert_eq!(summary.extents(), ijview_primitives::AxisExtents::new(3, 1, 2));

	let frame = backend.render_frame(SESSION, FrameRequest { z: 2, t: 0, channel: 1 }).await.unwrap();
	assert_eq!((frame.width(), frame.height()), (5, 4));
	assert_eq!(frame.range().min, 64.0);

	assert_eq!(
		backend.render_frame(SessionId(9), FrameRequest::default()).await.unwrap_err(),
		BackendError::UnknownSession(SessionId(9))
	);
	assert!(matches!(
		backend.inspect(SessionId(2), Path::new("/data/missing.tif")).await,
		Err(BackendError::InvalidParameters(_))
	));
}

#[tokio::test]
async fn preview_is_cached_by_canonical_params() {
	let backend = LoopbackBackend::default();
	opened(&backend).await;
	let mut events = backend.subscribe();

	let params = json!({"min": 0.0, "max": 100.0});
	let ticket = backend
		.start_job(SESSION, start("intensity.normalize", params, RunMode::Preview))
		.await
		.unwrap();
	assert_eq!(next_event(&mut events).await.status, JobStatus::Running);
	let done = next_event(&mut events).await;
	assert_eq!((done.job_id, done.status), (ticket.job_id, JobStatus::Completed));
	assert!(backend.current_stack(SESSION).unwrap().min_max().1 <= 1.0);

	let reordered = json!({"max": 100.0, "min": 0.0});
	let again = backend
		.start_job(SESSION, start("intensity.normalize", reordered, RunMode::Preview))
		.await
		.unwrap();
	let cached = next_event(&mut events).await;
	assert_eq!(cached.job_id, again.job_id);
	assert_eq!(cached.status, JobStatus::Completed);
	assert_eq!(cached.message.as_deref(), Some("cached"));
	assert_eq!(backend.running_jobs(SESSION), 0);
}

#[tokio::test]
async fn apply_commits_and_drops_previews() {
	let backend = LoopbackBackend::default();
	opened(&backend).await;
	let mut events = backend.subscribe();

	backend
		.start_job(SESSION, start("threshold.fixed", json!({"threshold": 40.0}), RunMode::Preview))
		.await
		.unwrap();
	next_event(&mut events).await;
	next_event(&mut events).await;

	backend
		.start_job(SESSION, start("intensity.invert", json!({}), RunMode::Apply))
		.await
		.unwrap();
	next_event(&mut events).await;
	assert_eq!(next_event(&mut events).await.status, JobStatus::Completed);

	let current = backend.current_stack(SESSION).unwrap();
	let original = cells();
	let (min, max) = original.min_max();
	assert_eq!(current.data()[0], max - original.data()[0] + min);
}

#[tokio::test]
async fn invalid_params_are_rejected_before_start() {
	let backend = LoopbackBackend::default();
	opened(&backend).await;
	let err = backend
		.start_job(SESSION, start("intensity.window", json!({"low": 5, "high": 1}), RunMode::Apply))
		.await
		.unwrap_err();
	assert_eq!(err, BackendError::InvalidParameters("`high` must be greater than `low`".into()));
	assert!(matches!(
		backend.start_job(SESSION, start("median.3d", json!({}), RunMode::Apply)).await,
		Err(BackendError::InvalidParameters(_))
	));
	assert_eq!(backend.running_jobs(SESSION), 0);
}

#[tokio::test]
async fn cancel_drops_late_result() {
	let (backend, release) = gated();
	opened(&backend).await;
	let mut events = backend.subscribe();

	let ticket = backend.start_job(SESSION, start("test.gate", json!({}), RunMode::Apply)).await.unwrap();
	assert_eq!(next_event(&mut events).await.status, JobStatus::Running);

	backend.cancel_job(SESSION, ticket.job_id).await.unwrap();
	let cancelled = next_event(&mut events).await;
	assert_eq!(cancelled.status, JobStatus::Cancelled);
	assert_eq!(cancelled.message.as_deref(), Some(CANCELLED_MESSAGE));
	assert_eq!(backend.running_jobs(SESSION), 0);

	release.send(()).unwrap();
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert!(events.try_recv().is_err());
	assert_eq!(*backend.current_stack(SESSION).unwrap(), cells());
}

#[tokio::test]
async fn cancel_after_finish_is_a_no_op() {
	let backend = LoopbackBackend::default();
	opened(&backend).await;
	let mut events = backend.subscribe();

	let ticket = backend
		.start_job(SESSION, start("intensity.invert", json!({}), RunMode::Apply))
		.await
		.unwrap();
	next_event(&mut events).await;
	assert_eq!(next_event(&mut events).await.status, JobStatus::Completed);

	backend.cancel_job(SESSION, ticket.job_id).await.unwrap();
	assert!(events.try_recv().is_err());
	assert_ne!(*backend.current_stack(SESSION).unwrap(), cells());
}

#[tokio::test]
async fn export_writes_preview_and_reopens() {
	let backend = LoopbackBackend::default();
	opened(&backend).await;
	let mut events = backend.subscribe();
	let dir = tempfile::tempdir().unwrap();

	let spec = ijview_proto::PreviewSpec {
		op: "threshold.fixed".into(),
		params: json!({"threshold": 40.0}),
	};
	let missing = backend
		.export_current(
			SESSION,
			ExportRequest {
				output_path: dir.path().join("none.json"),
				preview: Some(spec.clone()),
			},
		)
		.await;
	assert!(matches!(missing, Err(BackendError::Failed(_))));

	backend
		.start_job(SESSION, start(&spec.op, spec.params.clone(), RunMode::Preview))
		.await
		.unwrap();
	next_event(&mut events).await;
	next_event(&mut events).await;

	let output = dir.path().join("thresholded.json");
	backend
		.export_current(
			SESSION,
			ExportRequest {
				output_path: output.clone(),
				preview: Some(spec),
			},
		)
		.await
		.unwrap();

	let summary = backend.inspect(SessionId(2), &output).await.unwrap();
	assert_eq!(summary.shape, vec![3, 1, 2, 4, 5]);
	assert_eq!((summary.min, summary.max), (0.0, 1.0));
}

#[tokio::test]
async fn release_forgets_session() {
	let backend = LoopbackBackend::default();
	opened(&backend).await;
	backend.release(SESSION).await.unwrap();
	assert!(backend.current_stack(SESSION).is_none());
	assert_eq!(backend.release(SESSION).await, Err(BackendError::UnknownSession(SESSION)));
	assert!(backend.list_preview_ops().await.unwrap().contains(&"gaussian.blur".to_string()));
}

//! ijview demo binary.
//!
//! Opens a synthetic stack on the loopback backend and walks one session
//! through a slice scrub, a preview, a cancelled apply, and a committed
//! apply, printing the status line after each step.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use ijview_loopback::{LoopbackBackend, Stack, StackShape};
use ijview_primitives::{DataPoint, JobId, ScreenPoint, Size};
use ijview_proto::RunMode;
use ijview_session::{JobOutcome, Notice, SessionError, SessionHandle, Viewer, ViewerConfig};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::info;

/// Demo command line arguments.
#[derive(Parser, Debug)]
#[command(name = "ijview")]
#[command(about = "Drive an ijview session against the in-process loopback backend")]
struct Args {
	/// Viewer configuration file (TOML)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Number of z slices in the synthetic stack
	#[arg(long, default_value_t = 12)]
	slices: usize,

	/// Number of channels in the synthetic stack
	#[arg(long, default_value_t = 2)]
	channels: usize,

	/// Plane width and height in pixels
	#[arg(long, default_value_t = 64)]
	size: usize,

	/// Artificial render latency in milliseconds
	#[arg(long, default_value_t = 15)]
	render_delay_ms: u64,

	/// Write the final dataset as JSON to this path
	#[arg(long, value_name = "PATH")]
	export: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	setup_tracing(args.verbose);

	let config = match &args.config {
		Some(path) => ViewerConfig::load(path)?,
		None => ViewerConfig::default(),
	};
	if args.slices == 0 || args.channels == 0 || args.size == 0 {
		bail!("stack dimensions must be non-zero");
	}

	let source = PathBuf::from("/synthetic/cells.tif");
	let stack = Stack::synthetic(StackShape::new(args.slices, 1, args.channels, args.size, args.size))?;
	let backend = LoopbackBackend::default().with_render_delay(Duration::from_millis(args.render_delay_ms));
	backend.register(source.clone(), stack);

	let mut viewer = Viewer::new(Arc::new(backend), config);
	viewer.start_event_pump();
	let session = viewer.open(&source).await?.into_handle();
	session.wait_for(|s| s.frame.is_some()).await?;
	info!(session = %session.id(), "opened synthetic stack");
	println!("{}", session.status_line());

	let result = run(&session, &args).await;
	viewer.shutdown().await;
	result
}

async fn run(session: &SessionHandle, args: &Args) -> anyhow::Result<()> {
	session.fit_to(Size::new(640.0, 480.0)).await?;
	scrub(session, args.slices - 1).await?;

	let half = args.size / 2;
	let centre = session.snapshot().viewport.to_screen(DataPoint::pixel_center(half, half));
	session.track_pointer(Some(centre)).await?;
	println!("{}", session.status_line());
	session.set_axis(None, None, Some(args.channels - 1)).await?;

	let preview = run_job(session, "gaussian.blur", json!({"sigma": 1.5}), RunMode::Preview).await?;
	println!("{}  [{}]", session.status_line(), preview.status);

	let cancelled = cancel_job(session, "intensity.invert").await?;
	println!("{}  [{}]", session.status_line(), cancelled.status);

	let applied = run_job(session, "intensity.normalize", json!({}), RunMode::Apply).await?;
	println!("{}  [{}]", session.status_line(), applied.status);

	session.zoom_in(ScreenPoint::new(320.0, 240.0)).await?;
	println!("{}", session.status_line());

	if let Some(path) = &args.export {
		session.export(path.clone()).await?;
		println!("exported {}", path.display());
	}
	Ok(())
}

/// Steps through every slice without waiting, then waits for the frame of the
/// last one. Intermediate responses are superseded and never shown.
async fn scrub(session: &SessionHandle, last: usize) -> anyhow::Result<()> {
	let mut notices = session.notices();
	for z in 0..=last {
		session.set_axis(Some(z), None, None).await?;
	}
	if last == 0 {
		return Ok(());
	}
	let mut shown = 0;
	loop {
		match notices.recv().await {
			Ok(Notice::FrameUpdated { position, .. }) => {
				shown += 1;
				if position.z == last {
					break;
				}
			}
			Ok(Notice::FrameFailed { error, .. }) => return Err(error.into()),
			Ok(_) => {}
			Err(broadcast::error::RecvError::Lagged(_)) => {}
			Err(broadcast::error::RecvError::Closed) => return Err(SessionError::Closed.into()),
		}
	}
	info!(requested = last + 1, shown, "scrub settled");
	println!("{}", session.status_line());
	Ok(())
}

async fn wait_outcome(session: &SessionHandle, job_id: JobId) -> anyhow::Result<JobOutcome> {
	let snapshot = session
		.wait_for(|s| !s.job_running && s.last_outcome.as_ref().is_some_and(|outcome| outcome.job_id == job_id))
		.await?;
	snapshot.last_outcome.context("job finished without an outcome")
}

async fn run_job(session: &SessionHandle, op: &str, params: Value, mode: RunMode) -> anyhow::Result<JobOutcome> {
	let ticket = session.start_operation(op, params, mode).await?;
	println!("{}", session.status_line());
	wait_outcome(session, ticket.job_id).await
}

/// Starts an apply and cancels it straight away. The job may still complete
/// if the backend finished first.
async fn cancel_job(session: &SessionHandle, op: &str) -> anyhow::Result<JobOutcome> {
	let ticket = session.start_operation(op, json!({}), RunMode::Apply).await?;
	match session.cancel_operation().await {
		Ok(()) | Err(SessionError::NoActiveJob) => {}
		Err(error) => return Err(error.into()),
	}
	wait_outcome(session, ticket.job_id).await
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("ijview_session=trace,ijview_loopback=debug,info")
		} else {
			EnvFilter::new("warn")
		}
	});
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.init();
}

use std::path::PathBuf;

use ijview_primitives::{DisplayRange, Frame, FrameToken, Histogram, JobId, JobToken, ScreenPoint, SessionId, Size};
use ijview_proto::{BackendError, FrameRequest, ImageSummary, JobEvent, JobStatus, JobTicket, PreviewSpec, RunMode};
use pretty_assertions::assert_eq;
use serde_json::json;

use super::{Effect, Hover, Notice, SessionContext, ViewOp};
use crate::config::ViewerConfig;
use crate::error::SessionError;

fn summary() -> ImageSummary {
	ImageSummary {
		shape: vec![3, 2, 3, 4],
		axes: "ZCYX".into(),
		channels: 2,
		z_slices: 3,
		times: 1,
		min: 0.0,
		max: 10.0,
		source: PathBuf::from("/data/cells.tif"),
	}
}

fn context() -> SessionContext {
	SessionContext::new(SessionId(1), summary(), &ViewerConfig::default())
}

fn frame(fill: u8) -> Frame {
	Frame::new(4, 3, vec![fill; 12], Histogram::default(), DisplayRange::new(0.0, 10.0)).unwrap()
}

fn render_tokens(ctx: &mut SessionContext) -> Vec<FrameToken> {
	ctx.drain_effects()
		.into_iter()
		.filter_map(|effect| match effect {
			Effect::Render { token, .. } => Some(token),
			_ => None,
		})
		.collect()
}

fn start_token(ctx: &mut SessionContext) -> JobToken {
	ctx.drain_effects()
		.into_iter()
		.find_map(|effect| match effect {
			Effect::StartJob { token, .. } => Some(token),
			_ => None,
		})
		.unwrap()
}

fn job_event(job: u64, mode: RunMode, status: JobStatus) -> JobEvent {
	JobEvent {
		job_id: JobId(job),
		mode,
		op: "gaussian.blur".into(),
		status,
		message: None,
	}
}

fn running_job(ctx: &mut SessionContext, mode: RunMode, job: u64) {
	ctx.start_operation("gaussian.blur", json!({"sigma": 2.0}), mode).unwrap();
	let token = start_token(ctx);
	assert_eq!(ctx.on_job_ack(token, Ok(JobTicket { job_id: JobId(job) })), Some(Ok(JobTicket { job_id: JobId(job) })));
}

#[test]
fn first_set_axis_requests_frame_even_without_change() {
	let mut ctx = context();
	let token = ctx.set_axis(None, None, None).unwrap();
	assert!(token.is_some());
	assert_eq!(
		ctx.drain_effects(),
		vec![Effect::Render {
			token: token.unwrap(),
			request: FrameRequest::default(),
		}]
	);
}

#[test]
fn set_axis_clamps_to_extents() {
	let mut ctx = context();
	ctx.set_axis(Some(99), Some(5), Some(7)).unwrap();
	assert_eq!((ctx.position().z, ctx.position().t, ctx.position().channel), (2, 0, 1));
}

#[test]
fn unchanged_axis_with_frame_shown_does_not_request() {
	let mut ctx = context();
	let token = ctx.request_frame();
	ctx.on_frame_response(token, Ok(frame(1)));
	ctx.drain_effects();
	assert_eq!(ctx.set_axis(Some(0), None, None).unwrap(), None);
	assert!(ctx.drain_effects().is_empty());
}

#[test]
fn stale_response_never_replaces_frame() {
	let mut ctx = context();
	let first = ctx.set_axis(Some(1), None, None).unwrap().unwrap();
	let second = ctx.set_axis(Some(2), None, None).unwrap().unwrap();

	ctx.on_frame_response(second, Ok(frame(200)));
	ctx.on_frame_response(first, Ok(frame(100)));

	assert_eq!(ctx.frame().unwrap().pixels()[0], 200);
	let notices = ctx.drain_notices();
	assert_eq!(notices.len(), 1);
	assert!(matches!(notices[0], Notice::FrameUpdated { token, .. } if token == second));
}

#[test]
fn burst_in_reverse_order_applies_only_last() {
	let mut ctx = context();
	for z in [1, 2, 0, 1, 2] {
		ctx.set_axis(Some(z), None, None).unwrap();
	}
	let tokens = render_tokens(&mut ctx);
	assert_eq!(tokens.len(), 5);
	for (index, token) in tokens.iter().enumerate().rev() {
		ctx.on_frame_response(*token, Ok(frame(index as u8)));
	}
	let updates = ctx.drain_notices().into_iter().filter(|n| matches!(n, Notice::FrameUpdated { .. })).count();
	assert_eq!(updates, 1);
	assert_eq!(ctx.frame().unwrap().pixels()[0], 4);
}

#[test]
fn stale_failure_is_swallowed() {
	let mut ctx = context();
	let first = ctx.set_axis(Some(1), None, None).unwrap().unwrap();
	ctx.set_axis(Some(2), None, None).unwrap();
	ctx.on_frame_response(first, Err(BackendError::Failed("decode".into())));
	assert!(ctx.drain_notices().is_empty());
}

#[test]
fn viewport_changes_never_request_frames() {
	let mut ctx = context();
	ctx.apply_view(ViewOp::Set {
		zoom: 3.0,
		pan_x: 5.0,
		pan_y: 5.0,
	})
	.unwrap();
	ctx.apply_view(ViewOp::ZoomIn(ScreenPoint::new(10.0, 10.0))).unwrap();
	ctx.apply_view(ViewOp::Wheel {
		anchor: ScreenPoint::new(0.0, 0.0),
		notches: -2,
	})
	.unwrap();
	ctx.apply_view(ViewOp::PanBy { dx: 1.0, dy: 1.0 }).unwrap();
	assert!(ctx.drain_effects().is_empty());
}

#[test]
fn zoom_in_and_out_use_configured_step() {
	let mut ctx = context();
	let origin = ScreenPoint::new(0.0, 0.0);
	ctx.zoom_in(origin);
	assert!((ctx.viewport().zoom() - 1.2).abs() < 1e-12);
	ctx.zoom_out(origin);
	assert!((ctx.viewport().zoom() - 1.0).abs() < 1e-12);
	ctx.wheel(origin, 1);
	assert!((ctx.viewport().zoom() - 1.12).abs() < 1e-12);
	ctx.reset_zoom();
	assert_eq!(ctx.viewport().zoom(), 1.0);
}

#[test]
fn fit_uses_displayed_frame() {
	let mut ctx = context();
	ctx.fit_to(Size::new(40.0, 30.0));
	assert_eq!(ctx.viewport().zoom(), 1.0);
	let token = ctx.request_frame();
	ctx.on_frame_response(token, Ok(frame(0)));
	ctx.fit_to(Size::new(40.0, 30.0));
	assert_eq!(ctx.viewport().zoom(), 10.0);
}

#[test]
fn hover_reads_frame_and_reports_outside() {
	let mut ctx = context();
	assert_eq!(ctx.hover_at(ScreenPoint::new(1.0, 1.0)), Hover::Outside);
	let token = ctx.request_frame();
	ctx.on_frame_response(token, Ok(frame(255)));
	ctx.set_viewport(2.0, 0.0, 0.0);
	assert_eq!(ctx.hover_at(ScreenPoint::new(7.5, 5.5)), Hover::Inside { x: 3, y: 2, value: 10.0 });
	assert_eq!(ctx.hover_at(ScreenPoint::new(8.0, 1.0)), Hover::Outside);
	assert_eq!(ctx.hover_at(ScreenPoint::new(-0.5, 1.0)), Hover::Outside);
}

#[test]
fn status_line_prefers_pinned_sample() {
	let mut ctx = context();
	let token = ctx.request_frame();
	ctx.on_frame_response(token, Ok(frame(51)));
	ctx.track_pointer(ScreenPoint::new(0.5, 0.5));
	ctx.pin_at(ScreenPoint::new(2.5, 1.5));
	assert!(ctx.status_line().starts_with("X:2 Y:1 Value:2.0000  Z:0 T:0 C:0  Zoom:100%"));
	ctx.unpin();
	assert!(ctx.status_line().starts_with("X:0 Y:0 Value:2.0000"));
	ctx.clear_pointer();
	assert!(ctx.status_line().starts_with("X:- Y:- Value:-"));
}

#[test]
fn start_while_running_is_refused_and_keeps_tracked_job() {
	let mut ctx = context();
	running_job(&mut ctx, RunMode::Apply, 4);
	let err = ctx.start_operation("median", json!({}), RunMode::Preview).unwrap_err();
	assert_eq!(err, SessionError::AlreadyRunning { job: Some(JobId(4)) });
	assert_eq!(ctx.jobs().tracked(), Some(JobId(4)));
}

#[test]
fn rejected_start_surfaces_and_frees_slot() {
	let mut ctx = context();
	ctx.start_operation("gaussian.blur", json!({"sigma": -1}), RunMode::Apply).unwrap();
	let token = start_token(&mut ctx);
	let answer = ctx.on_job_ack(token, Err(BackendError::InvalidParameters("sigma must be positive".into())));
	assert_eq!(answer, Some(Err(SessionError::InvalidParameters("sigma must be positive".into()))));
	assert!(!ctx.jobs().is_busy());
	assert!(ctx.start_operation("gaussian.blur", json!({"sigma": 1}), RunMode::Apply).is_ok());
}

#[test]
fn cancel_without_job_fails() {
	let mut ctx = context();
	assert_eq!(ctx.cancel_operation(), Err(SessionError::NoActiveJob));
}

#[test]
fn cancel_then_completed_ends_completed_and_refreshes() {
	let mut ctx = context();
	running_job(&mut ctx, RunMode::Apply, 6);
	ctx.cancel_operation().unwrap();
	assert_eq!(ctx.drain_effects(), vec![Effect::CancelJob { job_id: JobId(6) }]);
	assert!(ctx.jobs().is_busy());

	ctx.on_job_event(job_event(6, RunMode::Apply, JobStatus::Completed));

	assert!(!ctx.jobs().is_busy());
	assert_eq!(ctx.jobs().last_outcome().unwrap().status, JobStatus::Completed);
	assert_eq!(render_tokens(&mut ctx).len(), 1);
	assert_eq!(ctx.status(), "Applied gaussian.blur (job 6)");
}

#[test]
fn cancel_while_starting_is_sent_after_ack() {
	let mut ctx = context();
	ctx.start_operation("gaussian.blur", json!({}), RunMode::Preview).unwrap();
	let token = start_token(&mut ctx);
	ctx.cancel_operation().unwrap();
	assert!(ctx.drain_effects().is_empty());
	ctx.on_job_ack(token, Ok(JobTicket { job_id: JobId(2) }));
	assert_eq!(ctx.drain_effects(), vec![Effect::CancelJob { job_id: JobId(2) }]);
}

#[test]
fn duplicate_terminal_event_has_no_effect() {
	let mut ctx = context();
	running_job(&mut ctx, RunMode::Apply, 3);
	ctx.on_job_event(job_event(3, RunMode::Apply, JobStatus::Cancelled));
	ctx.drain_effects();
	ctx.drain_notices();
	let before = ctx.snapshot();

	ctx.on_job_event(job_event(3, RunMode::Apply, JobStatus::Cancelled));
	ctx.on_job_event(job_event(3, RunMode::Apply, JobStatus::Completed));

	assert_eq!(ctx.snapshot(), before);
	assert!(ctx.drain_effects().is_empty());
	assert!(ctx.drain_notices().is_empty());
	assert_eq!(ctx.status(), "Operation cancelled.");
}

#[test]
fn foreign_and_progress_events() {
	let mut ctx = context();
	running_job(&mut ctx, RunMode::Apply, 3);
	ctx.on_job_event(job_event(2, RunMode::Apply, JobStatus::Completed));
	assert_eq!(ctx.jobs().tracked(), Some(JobId(3)));

	let mut progress = job_event(3, RunMode::Apply, JobStatus::Running);
	progress.message = Some("50%".into());
	ctx.on_job_event(progress);
	assert_eq!(ctx.status(), "50%");
	assert!(ctx.drain_effects().is_empty());
}

#[test]
fn events_during_start_are_replayed_on_ack() {
	let mut ctx = context();
	ctx.start_operation("gaussian.blur", json!({}), RunMode::Apply).unwrap();
	let token = start_token(&mut ctx);
	ctx.on_job_event(job_event(8, RunMode::Apply, JobStatus::Completed));
	ctx.on_job_event(job_event(1, RunMode::Apply, JobStatus::Completed));

	ctx.on_job_ack(token, Ok(JobTicket { job_id: JobId(8) }));

	assert!(!ctx.jobs().is_busy());
	assert_eq!(ctx.jobs().last_outcome().unwrap().job_id, JobId(8));
	assert_eq!(render_tokens(&mut ctx).len(), 1);
}

#[test]
fn chatty_start_keeps_terminal_event() {
	let mut ctx = context();
	ctx.start_operation("gaussian.blur", json!({}), RunMode::Apply).unwrap();
	let token = start_token(&mut ctx);
	for _ in 0..12 {
		ctx.on_job_event(job_event(8, RunMode::Apply, JobStatus::Running));
	}
	ctx.on_job_event(job_event(8, RunMode::Apply, JobStatus::Completed));

	ctx.on_job_ack(token, Ok(JobTicket { job_id: JobId(8) }));

	assert!(!ctx.jobs().is_busy());
	assert_eq!(ctx.jobs().last_outcome().unwrap().status, JobStatus::Completed);
}

#[test]
fn completed_preview_sets_export_spec_and_apply_clears_it() {
	let mut ctx = context();
	running_job(&mut ctx, RunMode::Preview, 1);
	ctx.on_job_event(job_event(1, RunMode::Preview, JobStatus::Completed));
	assert_eq!(ctx.status(), "Preview cached for gaussian.blur (job 1)");
	let export = ctx.export_request("/tmp/out.json").unwrap();
	assert_eq!(
		export.preview,
		Some(PreviewSpec {
			op: "gaussian.blur".into(),
			params: json!({"sigma": 2.0}),
		})
	);

	running_job(&mut ctx, RunMode::Apply, 2);
	ctx.on_job_event(job_event(2, RunMode::Apply, JobStatus::Completed));
	assert_eq!(ctx.export_request("/tmp/out.json").unwrap().preview, None);
}

#[test]
fn failed_job_reports_message() {
	let mut ctx = context();
	running_job(&mut ctx, RunMode::Apply, 5);
	let mut failed = job_event(5, RunMode::Apply, JobStatus::Failed);
	failed.message = Some("out of memory".into());
	ctx.on_job_event(failed);
	assert_eq!(ctx.status(), "out of memory");
	assert!(render_tokens(&mut ctx).is_empty());
}

#[test]
fn watchdog_fails_tracked_job_only() {
	let mut ctx = context();
	running_job(&mut ctx, RunMode::Apply, 9);
	assert!(!ctx.on_watchdog(JobId(8)));
	assert!(ctx.on_watchdog(JobId(9)));
	assert_eq!(ctx.drain_effects(), vec![Effect::CancelJob { job_id: JobId(9) }]);
	let outcome = ctx.jobs().last_outcome().unwrap();
	assert_eq!(outcome.status, JobStatus::Failed);
	assert_eq!(outcome.message.as_deref(), Some("timed out"));
	assert!(!ctx.on_watchdog(JobId(9)));
}

#[test]
fn transport_loss_is_fatal() {
	let mut ctx = context();
	let token = ctx.request_frame();
	ctx.on_frame_response(token, Err(BackendError::TransportUnavailable("socket closed".into())));
	let expected = SessionError::TransportUnavailable("socket closed".into());
	assert_eq!(ctx.fatal(), Some(&expected));
	assert_eq!(ctx.set_axis(Some(1), None, None), Err(expected.clone()));
	assert_eq!(ctx.start_operation("op", json!({}), RunMode::Apply), Err(expected.clone()));
	assert_eq!(ctx.cancel_operation(), Err(expected.clone()));
	assert_eq!(ctx.apply_view(ViewOp::Reset), Err(expected));
}

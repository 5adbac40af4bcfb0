//! Session coordination for ijview viewers.
//!
//! # Purpose
//!
//! - Keep each viewer's displayed frame consistent with the latest user intent (axis position, viewport, pending job) while the backend answers slowly, out of order, or not at all.
//! - Own the preview/apply job slot of each viewer, including cancellation.
//! - Route the backend's process-wide job event stream to the session that owns each job, dropping everything stale.
//! - Exclude pixel processing, decoding, and transport; those sit behind [`ijview_proto::Backend`].
//!
//! # Mental model
//!
//! - One [`SessionContext`] per open viewer, mutated only by its actor task. Every input (user command, backend response, routed event, watchdog tick) is a message on the actor's queue.
//! - Frame requests carry a [`FrameToken`](ijview_primitives::FrameToken); a response is applied only if its token is the latest issued and still pending.
//! - Jobs move `Idle → Starting → Running → Idle`. Only a terminal event observed for the tracked job frees the slot; cancel merely asks.
//! - Presentation reads a `watch` snapshot and listens for [`Notice`]s on a broadcast channel.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`Viewer`] | Registry of open sessions and the event pump | MUST start at most one pump per instance | `Viewer::open`, `Viewer::close`, `Viewer::start_event_pump` |
//! | [`SessionHandle`] | Cloneable API to one session actor | MUST NOT mutate state except via the actor queue | `Viewer::open` |
//! | [`SessionContext`] | Single-writer session state | MUST NOT perform I/O; backend work is queued as [`Effect`]s | `actor` |
//! | [`FrameCoordinator`] | Frame token issuer and response classifier | Token MUST only increase; each token applied at most once | `SessionContext::request_frame`, `SessionContext::on_frame_response` |
//! | [`JobLifecycle`] | Single job slot | MUST refuse `start` unless idle; MUST only free the slot on a terminal event | `SessionContext::start_operation`, `SessionContext::on_job_event` |
//! | [`EventRouter`] | Session id to per-session forwarder map | MUST drop events for unknown sessions and MUST NOT wait on any session mailbox | `Viewer::open`, `Viewer::close` |
//! | [`SessionSnapshot`] | Published read model | MUST reflect state after the message that produced it | `actor` |
//!
//! # Invariants
//!
//! 1. A frame response MUST be applied only if its token equals the latest issued token at evaluation time.
//!    - Enforced in: `FrameCoordinator::resolve`
//!    - Tested by: `frame::tests::burst_applies_only_last_request`, `context::tests::stale_response_never_replaces_frame`
//!    - Failure symptom: scrubbing through slices briefly shows an older slice after the newer one.
//!
//! 2. At most one job MUST be tracked per session; a refused start MUST leave the tracked job untouched.
//!    - Enforced in: `JobLifecycle::start`
//!    - Tested by: `context::tests::start_while_running_is_refused_and_keeps_tracked_job`
//!    - Failure symptom: two jobs race to commit, or the running job loses its cancel target.
//!
//! 3. Cancel MUST NOT change job state; only the observed terminal event does.
//!    - Enforced in: `JobLifecycle::cancel`, `SessionContext::retire`
//!    - Tested by: `context::tests::cancel_then_completed_ends_completed_and_refreshes`
//!    - Failure symptom: a job that completed despite cancel is reported cancelled and its result never shown.
//!
//! 4. Events for untracked or foreign jobs MUST be discarded; duplicate terminal events MUST have no effect.
//!    - Enforced in: `filter::classify`, `JobLifecycle::finish`
//!    - Tested by: `context::tests::duplicate_terminal_event_has_no_effect`, `context::tests::foreign_and_progress_events`
//!    - Failure symptom: a stale completion frees the slot of the next job or triggers spurious refreshes.
//!
//! 5. Viewport changes MUST NOT request frames.
//!    - Enforced in: `SessionContext::apply_view`
//!    - Tested by: `context::tests::viewport_changes_never_request_frames`
//!    - Failure symptom: every zoom step re-renders the plane.
//!
//! 6. A terminal event MUST reach its session: parking never drops one, and a slow session MUST NOT stall routing for others.
//!    - Enforced in: `JobLifecycle::park`, `EventRouter::register`
//!    - Tested by: `context::tests::chatty_start_keeps_terminal_event`, `filter::tests::full_mailbox_does_not_block_other_sessions`
//!    - Failure symptom: the job slot stays busy forever after the backend reported completion.

mod actor;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod frame;
pub mod handle;
pub mod job;
mod spawn;
pub mod status;
pub mod viewer;

pub use config::{ConfigError, ViewerConfig};
pub use context::{Effect, Hover, Notice, SessionContext, SessionSnapshot, ViewOp, hover};
pub use error::{Result, SessionError};
pub use filter::{Discard, EventRouter, Verdict, classify};
pub use frame::{FrameCoordinator, FrameResolution, PendingFrame};
pub use handle::SessionHandle;
pub use job::{AckOutcome, ActiveJob, CancelAction, JobLifecycle, JobOutcome, JobPhase, StartingJob};
pub use status::status_line;
pub use viewer::{Direction, Opened, Viewer, normalize_path};

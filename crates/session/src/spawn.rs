use std::future::Future;

use tokio::task::JoinHandle;

/// Execution classes for tasks spawned on behalf of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TaskClass {
	/// Frame render calls.
	Render,
	/// Job start and cancel calls.
	Job,
	/// Actor loops, the event pump, watchdog timers, and export.
	Control,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Render => "render",
			Self::Job => "job",
			Self::Control => "control",
		}
	}
}

/// Spawns an async task on the current runtime, tagged with its class.
pub(crate) fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(task_class = class.as_str(), "session.spawn");
	tokio::spawn(fut)
}

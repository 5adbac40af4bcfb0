use ijview_primitives::{JobId, SessionId};
use ijview_proto::BackendError;
use thiserror::Error;

/// Errors surfaced by session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
	/// The backend transport is gone. Once recorded, every later operation on
	/// the session fails with this error.
	#[error("backend unavailable: {0}")]
	TransportUnavailable(String),
	/// A job is already tracked; `job` is `None` while its start is unacknowledged.
	#[error("a job is already running")]
	AlreadyRunning { job: Option<JobId> },
	#[error("no active job")]
	NoActiveJob,
	#[error("{0}")]
	OperationFailed(String),
	#[error("invalid parameters: {0}")]
	InvalidParameters(String),
	#[error("session closed")]
	Closed,
	#[error("unknown session {0}")]
	UnknownSession(SessionId),
}

impl SessionError {
	/// Whether this error permanently disables the session.
	pub const fn is_fatal(&self) -> bool {
		matches!(self, Self::TransportUnavailable(_))
	}
}

impl From<BackendError> for SessionError {
	fn from(error: BackendError) -> Self {
		match error {
			BackendError::TransportUnavailable(reason) => Self::TransportUnavailable(reason),
			BackendError::InvalidParameters(reason) => Self::InvalidParameters(reason),
			BackendError::Failed(reason) => Self::OperationFailed(reason),
			BackendError::UnknownSession(id) => Self::UnknownSession(id),
		}
	}
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

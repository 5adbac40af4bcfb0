//! Backend error taxonomy.

use ijview_primitives::SessionId;
use thiserror::Error;

/// Errors reported by a [`Backend`](crate::Backend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
	/// The transport to the backend is gone.
	#[error("backend unavailable: {0}")]
	TransportUnavailable(String),
	/// The backend rejected the job or frame parameters.
	#[error("invalid parameters: {0}")]
	InvalidParameters(String),
	/// The backend accepted the request but could not complete it.
	#[error("{0}")]
	Failed(String),
	/// The backend has no state for this session.
	#[error("unknown session {0}")]
	UnknownSession(SessionId),
}

/// Result type for backend calls.
pub type Result<T> = std::result::Result<T, BackendError>;

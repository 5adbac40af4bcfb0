//! Multi-session registry.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ijview_primitives::{CounterIdGen, SessionId};
use ijview_proto::Backend;
use tokio_util::sync::CancellationToken;

use crate::actor::spawn_session;
use crate::config::ViewerConfig;
use crate::error::{Result, SessionError};
use crate::filter::EventRouter;
use crate::handle::SessionHandle;
use crate::spawn::{TaskClass, spawn};

/// Result of [`Viewer::open`].
#[derive(Debug, Clone)]
pub enum Opened {
	/// A new session was created for the path.
	Created(SessionHandle),
	/// The path was already open; its session was focused instead.
	Focused(SessionHandle),
}

impl Opened {
	pub fn handle(&self) -> &SessionHandle {
		match self {
			Self::Created(handle) | Self::Focused(handle) => handle,
		}
	}

	pub fn into_handle(self) -> SessionHandle {
		match self {
			Self::Created(handle) | Self::Focused(handle) => handle,
		}
	}
}

/// Direction for [`Viewer::cycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	Next,
	Prev,
}

impl Direction {
	const fn delta(self) -> isize {
		match self {
			Self::Next => 1,
			Self::Prev => -1,
		}
	}
}

/// Owns every open session plus the process-wide job event pump.
pub struct Viewer<B: Backend> {
	backend: Arc<B>,
	config: ViewerConfig,
	router: EventRouter,
	sessions: BTreeMap<SessionId, SessionHandle>,
	paths: HashMap<PathBuf, SessionId>,
	ids: CounterIdGen,
	focused: Option<SessionId>,
	cancel: CancellationToken,
	pump_started: bool,
}

impl<B: Backend> Viewer<B> {
	pub fn new(backend: Arc<B>, config: ViewerConfig) -> Self {
		Self {
			backend,
			config: config.normalized(),
			router: EventRouter::new(),
			sessions: BTreeMap::new(),
			paths: HashMap::new(),
			ids: CounterIdGen::new(),
			focused: None,
			cancel: CancellationToken::new(),
			pump_started: false,
		}
	}

	pub const fn config(&self) -> &ViewerConfig {
		&self.config
	}

	pub const fn router(&self) -> &EventRouter {
		&self.router
	}

	/// Subscribes to backend job events and starts routing them. Only the
	/// first call has an effect.
	pub fn start_event_pump(&mut self) -> bool {
		if self.pump_started {
			return false;
		}
		self.pump_started = true;
		let events = self.backend.subscribe();
		let router = self.router.clone();
		spawn(TaskClass::Control, router.run(events, self.cancel.child_token()));
		true
	}

	/// Opens `path`, or focuses the session that already shows it.
	pub async fn open(&mut self, path: impl AsRef<Path>) -> Result<Opened> {
		let path = normalize_path(path.as_ref());
		if let Some(&id) = self.paths.get(&path)
			&& let Some(handle) = self.sessions.get(&id)
		{
			self.focused = Some(id);
			tracing::debug!(session = %id, path = %path.display(), "viewer.focus_existing");
			return Ok(Opened::Focused(handle.clone()));
		}

		let id = SessionId(self.ids.next());
		let summary = self.backend.inspect(id, &path).await?;
		tracing::info!(session = %id, path = %path.display(), axes = %summary.axes, "viewer.open");
		let handle = spawn_session(id, summary, Arc::clone(&self.backend), &self.config, self.cancel.child_token());
		self.router.register(id, handle.sender());
		self.sessions.insert(id, handle.clone());
		self.paths.insert(path, id);
		self.focused = Some(id);
		Ok(Opened::Created(handle))
	}

	/// Closes a session and releases its backend state.
	pub async fn close(&mut self, id: SessionId) -> Result<()> {
		let handle = self.sessions.remove(&id).ok_or(SessionError::UnknownSession(id))?;
		self.paths.retain(|_, session| *session != id);
		self.router.unregister(id);
		handle.shutdown();
		if self.focused == Some(id) {
			self.focused = self.sessions.keys().next().copied();
		}
		tracing::info!(session = %id, "viewer.close");
		self.backend.release(id).await?;
		Ok(())
	}

	/// Handle for an open session.
	pub fn session(&self, id: SessionId) -> Option<&SessionHandle> {
		self.sessions.get(&id)
	}

	/// Open sessions in id order.
	pub fn sessions(&self) -> impl Iterator<Item = &SessionHandle> {
		self.sessions.values()
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}

	/// Session that currently has focus.
	pub fn focused(&self) -> Option<&SessionHandle> {
		self.focused.and_then(|id| self.sessions.get(&id))
	}

	/// Moves focus to `id`.
	pub fn focus(&mut self, id: SessionId) -> Result<&SessionHandle> {
		let handle = self.sessions.get(&id).ok_or(SessionError::UnknownSession(id))?;
		self.focused = Some(id);
		Ok(handle)
	}

	/// Session after (or before) `current` in id order, wrapping around.
	///
	/// An unknown `current` yields the first session.
	pub fn cycle(&self, current: SessionId, direction: Direction) -> Option<SessionId> {
		let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
		if ids.is_empty() {
			return None;
		}
		let Some(index) = ids.iter().position(|&id| id == current) else {
			return ids.first().copied();
		};
		let len = ids.len() as isize;
		let next = (index as isize + direction.delta()).rem_euclid(len);
		ids.get(next as usize).copied()
	}

	/// Moves focus one session in `direction`.
	pub fn focus_cycle(&mut self, direction: Direction) -> Option<&SessionHandle> {
		let current = self.focused?;
		let next = self.cycle(current, direction)?;
		self.focused = Some(next);
		self.sessions.get(&next)
	}

	/// Closes every session and stops the event pump.
	pub async fn shutdown(&mut self) {
		let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
		for id in ids {
			if let Err(error) = self.close(id).await {
				tracing::warn!(session = %id, %error, "viewer.close_failed");
			}
		}
		self.cancel.cancel();
	}
}

impl<B: Backend> Drop for Viewer<B> {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

/// Canonical form of `path`, falling back to an absolute path when the file
/// cannot be resolved.
pub fn normalize_path(path: &Path) -> PathBuf {
	std::fs::canonicalize(path)
		.or_else(|_| std::path::absolute(path))
		.unwrap_or_else(|_| path.to_path_buf())
}

//! Acquisition progress of a single item.
//!
//! A [`ProgressToken`] is a cheap shared handle, clones observe and mutate the same state.
//! Listeners registered with [`ProgressToken::subscribe`] are called synchronously on the thread that caused the change.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Serialize, Deserialize};

/// Lifecycle of an item's acquisition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProgressState {
	#[default] NotStarted,
	DownloadInProgress,
	Downloaded,
	InstallInProgress,
	Installed,
	Failed,
}

impl ProgressState {
	/// `true` while an acquisition is working on the item.
	pub fn is_busy(self) -> bool {
		matches!(self, Self::DownloadInProgress | Self::Downloaded | Self::InstallInProgress)
	}

	fn can_become(self, to: Self) -> bool {
		use ProgressState::*;
		matches!((self, to),
			(NotStarted | Failed, DownloadInProgress)
			| (DownloadInProgress, Downloaded)
			| (Downloaded, InstallInProgress)
			| (InstallInProgress, Installed)
			| (DownloadInProgress | Downloaded | InstallInProgress, Failed)
			| (Installed, NotStarted)
		)
	}
}

/// A change delivered to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
	State(ProgressState),
	Percentage(u8),
}

type Listener = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

#[derive(Debug, Default)]
struct Status {
	state: ProgressState,
	percentage: u8,
	install_path: Option<PathBuf>,
}

struct Inner {
	status: Mutex<Status>,
	listeners: Mutex<Vec<(u64, Listener)>>,
	next_listener: AtomicU64,
	/* Mirrors `status.state` for tasks waiting on another acquisition. */
	state_watch: tokio::sync::watch::Sender<ProgressState>,
}

#[derive(Clone)]
pub struct ProgressToken {
	inner: Arc<Inner>,
}

impl Default for ProgressToken {
	fn default() -> Self {
		Self::with_status(Status::default())
	}
}

impl std::fmt::Debug for ProgressToken {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let status = self.inner.status.lock();
		f.debug_struct("ProgressToken")
			.field("state", &status.state)
			.field("percentage", &status.percentage)
			.field("install_path", &status.install_path)
			.finish()
	}
}

impl ProgressToken {
	pub fn new() -> Self {
		Self::default()
	}

	/// A token for an item already installed at `path`.
	pub fn installed(path: impl Into<PathBuf>) -> Self {
		Self::with_status(Status {
			state: ProgressState::Installed,
			percentage: 0,
			install_path: Some(path.into()),
		})
	}

	fn with_status(status: Status) -> Self {
		let (state_watch, _) = tokio::sync::watch::channel(status.state);
		Self {
			inner: Arc::new(Inner {
				status: Mutex::new(status),
				listeners: Default::default(),
				next_listener: AtomicU64::new(0),
				state_watch,
			}),
		}
	}

	pub fn state(&self) -> ProgressState {
		self.inner.status.lock().state
	}

	/// Download percentage, only meaningful while the state is [`ProgressState::DownloadInProgress`].
	pub fn percentage(&self) -> u8 {
		self.inner.status.lock().percentage
	}

	pub fn install_path(&self) -> Option<PathBuf> {
		self.inner.status.lock().install_path.clone()
	}

	pub fn is_installed(&self) -> bool {
		self.state() == ProgressState::Installed
	}

	/// Checks if both handles point to the same token.
	pub fn same_token(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Registers a listener for state and percentage changes.
	///
	/// The listener stays registered until the returned [`Subscription`] is cancelled or dropped.
	/// Listeners are called with no library lock held, so they may query the token or a
	/// [`DownloadManager`](crate::DownloadManager), and may subscribe or unsubscribe.
	pub fn subscribe(&self, listener: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Subscription {
		let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
		self.inner.listeners.lock().push((id, Arc::new(listener)));
		Subscription { token: Arc::downgrade(&self.inner), id }
	}

	/// Waits until no acquisition is working on the item and returns the state it was left in.
	pub async fn settled(&self) -> ProgressState {
		let mut receiver = self.inner.state_watch.subscribe();
		let settled = receiver.wait_for(|state| !state.is_busy()).await.map(|state| *state);
		/* The sender lives as long as `self` so the channel can't close while we wait. */
		settled.unwrap_or_else(|_| self.state())
	}

	/// Updates the download percentage.
	///
	/// Ignored outside of [`ProgressState::DownloadInProgress`] so late reports from an earlier attempt don't leak into the current one.
	pub fn set_percentage(&self, percentage: u8) {
		let percentage = percentage.min(100);
		{
			let mut status = self.inner.status.lock();
			if status.state != ProgressState::DownloadInProgress || status.percentage == percentage {
				return;
			}
			status.percentage = percentage;
		}
		self.notify(ProgressEvent::Percentage(percentage));
	}

	#[cfg(test)]
	pub(crate) fn begin_download(&self) -> crate::Result<()> {
		self.claim_download().map(PendingEvent::notify)
	}

	/// Moves to [`ProgressState::DownloadInProgress`] without calling listeners yet.
	///
	/// Lets a caller change state while holding its own lock and notify once the lock is released.
	pub(crate) fn claim_download(&self) -> crate::Result<PendingEvent> {
		let event = self.apply(ProgressState::DownloadInProgress, |status| status.percentage = 0)?;
		Ok(PendingEvent { token: self.clone(), event })
	}

	pub(crate) fn finish_download(&self) -> crate::Result<()> {
		self.transition(ProgressState::Downloaded, |_| {})
	}

	pub(crate) fn begin_install(&self) -> crate::Result<()> {
		self.transition(ProgressState::InstallInProgress, |_| {})
	}

	pub(crate) fn finish_install(&self, install_path: &Path) -> crate::Result<()> {
		self.transition(ProgressState::Installed, |status| status.install_path = Some(install_path.to_path_buf()))
	}

	pub(crate) fn fail(&self) -> crate::Result<()> {
		self.transition(ProgressState::Failed, |_| {})
	}

	/// Moves an installed token back to [`ProgressState::NotStarted`] after removal.
	pub(crate) fn reset(&self) -> crate::Result<()> {
		self.transition(ProgressState::NotStarted, |status| {
			status.install_path = None;
			status.percentage = 0;
		})
	}

	fn transition(&self, to: ProgressState, update: impl FnOnce(&mut Status)) -> crate::Result<()> {
		let event = self.apply(to, update)?;
		self.notify(event);
		Ok(())
	}

	/// Changes state and wakes [`settled`](Self::settled) waiters, listeners are left to the caller.
	fn apply(&self, to: ProgressState, update: impl FnOnce(&mut Status)) -> crate::Result<ProgressEvent> {
		{
			let mut status = self.inner.status.lock();
			if !status.state.can_become(to) {
				return Err(crate::Error::InvalidTransition { from: status.state, to });
			}
			status.state = to;
			update(&mut status);
		}
		self.inner.state_watch.send_replace(to);
		Ok(ProgressEvent::State(to))
	}

	fn notify(&self, event: ProgressEvent) {
		/* Clone out of the lock so listeners may read the token. */
		let listeners = self.inner.listeners.lock()
			.iter()
			.map(|(_, l)| l.clone())
			.collect::<Vec<_>>();
		for listener in listeners {
			listener(&event);
		}
	}
}

/// A state change already applied whose listeners haven't been called.
#[must_use = "listeners are only called by `notify`"]
pub(crate) struct PendingEvent {
	token: ProgressToken,
	event: ProgressEvent,
}

impl PendingEvent {
	pub(crate) fn notify(self) {
		self.token.notify(self.event);
	}
}

/// Persisted as the item's install path, `null` meaning not installed.
impl Serialize for ProgressToken {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let path = if self.is_installed() { self.install_path() } else { None };
		path.serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for ProgressToken {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		Ok(match Option::<PathBuf>::deserialize(deserializer)? {
			Some(path) => ProgressToken::installed(path),
			None => ProgressToken::new(),
		})
	}
}

/// Handle to a listener registered with [`ProgressToken::subscribe`].
#[must_use = "the listener is removed when the subscription is dropped"]
pub struct Subscription {
	token: Weak<Inner>,
	id: u64,
}

impl Subscription {
	/// Stops delivering events to the listener.
	pub fn cancel(self) {}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(inner) = self.token.upgrade() {
			inner.listeners.lock().retain(|(id, _)| *id != self.id);
		}
	}
}

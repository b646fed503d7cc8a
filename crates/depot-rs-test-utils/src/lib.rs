//! Various helper functions for testing
//!
//! functions in this module should use results and not use any panics to avoid confusion in callers

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use depot_rs::installation::content::{ContentError, Installer};
use depot_rs::installation::download::{DownloadError, Fetcher};
use depot_rs::{Config, Item, ItemSet};

/// Creates a config with every directory inside a new temporary directory.
///
/// The directory is deleted when the returned [`tempfile::TempDir`] is dropped.
pub fn temp_config() -> std::io::Result<(Config, tempfile::TempDir)> {
	let dir = tempfile::tempdir()?;
	Ok((Config::in_directory(dir.path()), dir))
}

/// Creates an item with a download url and dependencies.
pub fn item(id: &str, download: Option<&str>, dependencies: &[&str]) -> depot_rs::Result<Item> {
	let mut item = Item::new(id)?.with_dependencies(dependencies.iter().copied());
	item.download = download.map(str::to_owned);
	Ok(item)
}

/// Creates a set with dependencies already bound.
pub fn resolved_set(items: Vec<Item>) -> depot_rs::Result<ItemSet> {
	let mut set = ItemSet::new(items);
	set.resolve_dependencies(&depot_rs::metadb::DefaultItemHooks)?;
	Ok(set)
}

#[derive(Debug, Clone)]
enum Response {
	Content(Vec<u8>),
	Fail(String),
}

#[derive(Debug, Default)]
struct FetcherState {
	responses: Mutex<HashMap<String, Response>>,
	calls: Mutex<Vec<String>>,
	delay: Mutex<Option<Duration>>,
}

/// A [`Fetcher`] serving canned responses.
///
/// Clones share their state so a clone can be kept to inspect calls after handing one to a manager.
/// Failing urls leave a partial file behind before erroring, unknown urls fail without writing anything.
#[derive(Debug, Clone, Default)]
pub struct FakeFetcher {
	state: Arc<FetcherState>,
}

impl FakeFetcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Serves `content` for `url`.
	pub fn serve(self, url: &str, content: impl Into<Vec<u8>>) -> Self {
		self.state.responses.lock().insert(url.to_owned(), Response::Content(content.into()));
		self
	}

	/// Fails every fetch of `url`.
	pub fn fail(self, url: &str, reason: &str) -> Self {
		self.state.responses.lock().insert(url.to_owned(), Response::Fail(reason.to_owned()));
		self
	}

	/// Waits this long inside every fetch.
	pub fn with_delay(self, delay: Duration) -> Self {
		*self.state.delay.lock() = Some(delay);
		self
	}

	/// Number of fetches of `url`.
	pub fn calls(&self, url: &str) -> usize {
		self.state.calls.lock().iter().filter(|u| *u == url).count()
	}

	pub fn total_calls(&self) -> usize {
		self.state.calls.lock().len()
	}
}

#[async_trait]
impl Fetcher for FakeFetcher {
	async fn fetch(&self, url: &str, destination: &Path, progress: &(dyn Fn(u8) + Send + Sync)) -> Result<(), DownloadError> {
		self.state.calls.lock().push(url.to_owned());
		let delay = *self.state.delay.lock();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}

		let response = self.state.responses.lock().get(url).cloned();
		match response {
			Some(Response::Content(content)) => {
				progress(50);
				tokio::fs::write(destination, content).await?;
				progress(100);
				Ok(())
			},
			Some(Response::Fail(reason)) => {
				tokio::fs::write(destination, b"partial").await?;
				Err(DownloadError::Unavailable(reason))
			},
			None => Err(DownloadError::Unavailable(format!("no response for {}", url))),
		}
	}
}

#[derive(Debug, Default)]
struct InstallerState {
	installed: Mutex<Vec<String>>,
	failing: Mutex<Vec<String>>,
}

/// An [`Installer`] that copies the content file into the destination and records what it installed.
#[derive(Debug, Clone, Default)]
pub struct RecordingInstaller {
	state: Arc<InstallerState>,
}

impl RecordingInstaller {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes installs of `id` fail.
	pub fn fail_on(self, id: &str) -> Self {
		self.state.failing.lock().push(id.to_owned());
		self
	}

	/// Ids installed so far in the order their installs ran.
	pub fn installed(&self) -> Vec<String> {
		self.state.installed.lock().clone()
	}

	pub fn install_count(&self, id: &str) -> usize {
		self.state.installed.lock().iter().filter(|i| *i == id).count()
	}
}

#[async_trait]
impl Installer for RecordingInstaller {
	async fn install(&self, item: &Item, content: &Path, destination: &Path) -> Result<(), ContentError> {
		if self.state.failing.lock().iter().any(|i| i == item.id()) {
			tokio::fs::write(destination.join("partial"), b"partial").await?;
			return Err(ContentError::Rejected(format!("{} is set to fail", item.id())));
		}
		let name = content.file_name().ok_or(ContentError::MissingFileName)?;
		tokio::fs::copy(content, destination.join(name)).await?;
		self.state.installed.lock().push(item.id().to_owned());
		Ok(())
	}
}

//! Acquirement is when we take an item and its dependencies, download their content and install them.
//!
//! An acquisition runs in two phases over the whole closure of the requested item:
//! every download is started concurrently and all of them finish before any install starts,
//! then every successfully downloaded item is installed concurrently. Installs don't wait for the items
//! they depend on to be installed, each item unpacks into its own directory from its own content.
//! Scratch files are removed once every install has finished.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use parking_lot::Mutex;

use crate::metadb::item::{validate_id, Item};
use crate::metadb::item_set::ItemSet;
use crate::metadb::progress::ProgressState;

use super::content::{ArchiveInstaller, Installer};
use super::download::{self, Fetcher, HttpFetcher};

pub struct DownloadManager {
	download_dir: PathBuf,
	install_dir: PathBuf,
	fetcher: Box<dyn Fetcher>,
	installer: Box<dyn Installer>,
	/* Ids claimed by a running acquisition, used so concurrent calls join instead of repeating work. */
	in_progress: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for DownloadManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DownloadManager")
			.field("download_dir", &self.download_dir)
			.field("install_dir", &self.install_dir)
			.field("in_progress", &*self.in_progress.lock())
			.finish()
	}
}

impl DownloadManager {
	pub fn new(download_dir: impl Into<PathBuf>, install_dir: impl Into<PathBuf>, fetcher: impl Fetcher + 'static, installer: impl Installer + 'static) -> Self {
		Self {
			download_dir: download_dir.into(),
			install_dir: install_dir.into(),
			fetcher: Box::new(fetcher),
			installer: Box::new(installer),
			in_progress: Default::default(),
		}
	}

	/// Uses the config's directories with an [`HttpFetcher`] and [`ArchiveInstaller`].
	pub fn from_config(config: &crate::Config) -> crate::Result<Self> {
		Ok(Self::new(config.download_dir(), config.install_dir(), HttpFetcher::new(config)?, ArchiveInstaller))
	}

	pub fn download_dir(&self) -> &Path {
		&self.download_dir
	}

	pub fn install_dir(&self) -> &Path {
		&self.install_dir
	}

	/// The directory an item with `id` is installed to, always a direct child of the install directory.
	///
	/// # Errors
	/// - [`InvalidArgument`](crate::Error::InvalidArgument) when `id` isn't a plain name.
	pub fn get_install_path(&self, id: &str) -> crate::Result<PathBuf> {
		validate_id(id)?;
		let path = self.install_dir.join(id);
		if path.parent() != Some(self.install_dir.as_path()) {
			return Err(crate::Error::InvalidArgument(format!("install path of {} escapes {}", id, self.install_dir.display())));
		}
		Ok(path)
	}

	/// Checks if an acquisition is currently working on the item with `id`.
	pub fn is_in_progress(&self, id: &str) -> bool {
		self.in_progress.lock().contains(id)
	}

	/// Downloads and installs `item` and everything it depends on within `items`.
	///
	/// Installed items are skipped, a fully installed closure returns `true` without touching the disk or network.
	/// Items another call is already acquiring are waited on rather than acquired twice.
	/// Progress listeners are never called while the manager holds its own lock.
	///
	/// Returns `true` when every item in the closure ends up installed.
	/// A failure doesn't stop work on the other items, the state of each item's [`ProgressToken`](crate::ProgressToken)
	/// tells which ones failed.
	pub async fn acquire(&self, items: &ItemSet, item: &Item) -> bool {
		let closure = items.closure(item);
		let mut success = true;

		for id in &closure.missing {
			log::error!("Dependency {} needed by {} is not in the item set", id, item.id());
			success = false;
		}

		let mut owned = Vec::<&Item>::new();
		let mut joined = Vec::<&Item>::new();
		let mut claimed = Vec::new();
		{
			let mut in_progress = self.in_progress.lock();
			for target in closure.items {
				if target.is_installed() {
					log::trace!("{} already installed, skipping", target.id());
					continue;
				}
				if in_progress.contains(target.id()) {
					log::debug!("{} is being acquired elsewhere, joining", target.id());
					joined.push(target);
					continue;
				}
				/* Moved to a busy state inside the claim so joiners never see a stale state */
				match target.progress().claim_download() {
					Ok(event) => {
						in_progress.insert(target.id().to_owned());
						owned.push(target);
						claimed.push(event);
					},
					Err(e) => {
						log::error!("Can't start acquiring {}: {}", target.id(), e);
						success = false;
					},
				}
			}
		}
		/* Listeners run without the claim lock so they can query this manager */
		for event in claimed {
			event.notify();
		}

		if owned.is_empty() && joined.is_empty() {
			return success;
		}

		log::debug!("Acquiring {} items for {}", owned.len(), item.id());

		let downloads = join_all(owned.iter().map(|target| self.download(target))).await;
		let downloaded = owned.iter()
			.zip(downloads)
			.filter_map(|(target, path)| path.map(|path| (*target, path)))
			.collect::<Vec<_>>();
		success &= downloaded.len() == owned.len();

		log::debug!("Installing {} items for {}", downloaded.len(), item.id());

		let installs = join_all(downloaded.iter().map(|(target, path)| self.install(target, path))).await;
		success &= installs.iter().all(|ok| *ok);

		for (_, path) in &downloaded {
			remove_download(&self.download_dir, path).await;
		}

		{
			let mut in_progress = self.in_progress.lock();
			for target in &owned {
				in_progress.remove(target.id());
			}
		}

		let joined_states = join_all(joined.iter().map(|target| target.progress().settled())).await;
		for (target, state) in joined.iter().zip(joined_states) {
			if state != ProgressState::Installed {
				log::error!("Acquisition of {} by another caller ended as {:?}", target.id(), state);
				success = false;
			}
		}

		success
	}

	/// Uninstalls a single item, its dependencies and dependants are left alone.
	///
	/// Does nothing when the item isn't installed. Only `install_dir/<id>` is ever deleted.
	///
	/// # Errors
	/// - [`InvalidArgument`](crate::Error::InvalidArgument) when the id isn't a plain name.
	/// - [`IO`](crate::Error::IO) when the install directory can't be removed.
	pub async fn remove(&self, item: &Item) -> crate::Result<()> {
		if !item.is_installed() {
			log::debug!("{} is not installed, nothing to remove", item.id());
			return Ok(());
		}

		let path = self.get_install_path(item.id())?;
		if item.install_path().is_some_and(|recorded| recorded != path) {
			log::warn!("{} was recorded at another location, removing {} only", item.id(), path.display());
		}
		log::info!("Removing {} from {}", item.id(), path.display());
		match tokio::fs::remove_dir_all(&path).await {
			Ok(()) => {},
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				log::warn!("Install directory of {} was already gone", item.id());
			},
			Err(e) => return Err(e.into()),
		}

		item.progress().reset()
	}

	/// Download phase for one claimed item, `None` on failure with the item marked failed.
	async fn download(&self, target: &Item) -> Option<PathBuf> {
		match self.try_download(target).await {
			Ok(path) => Some(path),
			Err(e) => {
				log::error!("Failed to download {}: {}", target.id(), e);
				mark_failed(target);
				None
			},
		}
	}

	async fn try_download(&self, target: &Item) -> crate::Result<PathBuf> {
		let url = target.download.as_deref()
			.ok_or_else(|| crate::Error::InvalidArgument(format!("item {} has no download url", target.id())))?;
		let path = download::get_download_path(&self.download_dir, target.id(), url)?;

		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent).await
				.map_err(|source| crate::Error::DirectoryCreation { path: parent.to_path_buf(), source })?;
		}

		log::info!("Downloading {} from {}", target.id(), url);
		let token = target.progress().clone();
		let report = move |percentage: u8| token.set_percentage(percentage);
		if let Err(e) = self.fetcher.fetch(url, &path, &report).await {
			remove_download(&self.download_dir, &path).await;
			return Err(e.into());
		}

		if let Err(e) = target.progress().finish_download() {
			remove_download(&self.download_dir, &path).await;
			return Err(e);
		}

		Ok(path)
	}

	/// Install phase for one downloaded item, `false` on failure with the item marked failed.
	async fn install(&self, target: &Item, content: &Path) -> bool {
		match self.try_install(target, content).await {
			Ok(()) => true,
			Err(e) => {
				log::error!("Failed to install {}: {}", target.id(), e);
				mark_failed(target);
				false
			},
		}
	}

	async fn try_install(&self, target: &Item, content: &Path) -> crate::Result<()> {
		target.progress().begin_install()?;

		let destination = self.get_install_path(target.id())?;
		tokio::fs::create_dir_all(&destination).await
			.map_err(|source| crate::Error::DirectoryCreation { path: destination.clone(), source })?;

		if let Err(e) = self.installer.install(target, content, &destination).await {
			if let Err(e) = tokio::fs::remove_dir_all(&destination).await {
				log::warn!("Failed to clean up partial install of {}: {}", target.id(), e);
			}
			return Err(e.into());
		}

		target.progress().finish_install(&destination)?;
		log::info!("Installed {} to {}", target.id(), destination.display());
		Ok(())
	}
}

fn mark_failed(target: &Item) {
	if let Err(e) = target.progress().fail() {
		log::warn!("Couldn't mark {} as failed: {}", target.id(), e);
	}
}

/// Removes a scratch file and the item directory holding it, errors are only logged.
async fn remove_download(download_dir: &Path, path: &Path) {
	match tokio::fs::remove_file(path).await {
		Ok(()) => {},
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
		Err(e) => log::warn!("Failed to remove download {}: {}", path.display(), e),
	}
	if let Some(parent) = path.parent().filter(|p| *p != download_dir) {
		/* Only succeeds once empty */
		let _ = tokio::fs::remove_dir(parent).await;
	}
}

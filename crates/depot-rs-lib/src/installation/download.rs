//! Downloads an item's content.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors that can occur during the download process.
#[derive(Debug, Error)]
pub enum DownloadError {
	/// The server answered with a non success status.
	#[error("server responded with status {0}")]
	Status(reqwest::StatusCode),
	/// The source couldn't provide the content for another reason.
	#[error("source unavailable: {0}")]
	Unavailable(String),
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
}

/// Transport used to fetch content.
#[async_trait]
pub trait Fetcher: Send + Sync {
	/// Writes the content at `url` to `destination`.
	///
	/// `progress` may be called any number of times with the percentage complete.
	async fn fetch(&self, url: &str, destination: &Path, progress: &(dyn Fn(u8) + Send + Sync)) -> Result<(), DownloadError>;
}

/// Where the content of the item with `id` is stored while it waits to be installed.
///
/// Files keep the basename of their url and each item gets its own directory so equal basenames can't collide.
///
/// # Errors
/// - [`InvalidArgument`](crate::Error::InvalidArgument) when the url has no file name or `id` isn't a plain name.
pub fn get_download_path(download_dir: &Path, id: &str, url: &str) -> crate::Result<PathBuf> {
	crate::metadb::item::validate_id(id)?;
	let without_query = url.split(['?', '#']).next().unwrap_or(url);
	let basename = without_query.rsplit('/').next().unwrap_or(without_query);
	if basename.is_empty() || basename == "." || basename == ".." {
		return Err(crate::Error::InvalidArgument(format!("download url {} has no file name", url)));
	}
	Ok(download_dir.join(id).join(basename))
}

/// Fetches over HTTP(S) with reqwest.
///
/// `file://` urls and plain paths are copied from disk unless local files are disabled,
/// which [`HttpFetcher::new`] does whenever the config asks for HTTPS only.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
	client: reqwest::Client,
	local_files: bool,
}

impl Default for HttpFetcher {
	fn default() -> Self {
		Self::with_client(reqwest::Client::new())
	}
}

impl HttpFetcher {
	pub fn new(config: &crate::Config) -> crate::Result<Self> {
		let client = reqwest::Client::builder()
			.https_only(config.https_only())
			.build()?;
		Ok(Self::with_client(client).with_local_files(!config.https_only()))
	}

	/// Uses `client` as is, local files are allowed.
	pub fn with_client(client: reqwest::Client) -> Self {
		Self { client, local_files: true }
	}

	pub fn with_local_files(mut self, allowed: bool) -> Self {
		self.local_files = allowed;
		self
	}
}

fn local_path(url: &str) -> Option<&Path> {
	if let Some(path) = url.strip_prefix("file://") {
		Some(Path::new(path))
	} else if url.contains("://") {
		None
	} else {
		Some(Path::new(url))
	}
}

#[async_trait]
impl Fetcher for HttpFetcher {
	async fn fetch(&self, url: &str, destination: &Path, progress: &(dyn Fn(u8) + Send + Sync)) -> Result<(), DownloadError> {
		if let Some(source) = local_path(url) {
			if !self.local_files {
				return Err(DownloadError::Unavailable(format!("local source {} refused, local files are disabled", url)));
			}
			log::debug!("Copying {} to {}", source.display(), destination.display());
			tokio::fs::copy(source, destination).await?;
			progress(100);
			return Ok(());
		}

		let mut response = self.client.get(url).send().await?;
		if !response.status().is_success() {
			return Err(DownloadError::Status(response.status()));
		}

		let total = response.content_length().filter(|t| *t > 0);
		let mut file = tokio::fs::File::create(destination).await?;
		let mut received = 0u64;

		while let Some(chunk) = response.chunk().await? {
			file.write_all(&chunk).await?;
			received += chunk.len() as u64;
			if let Some(total) = total {
				progress((received.saturating_mul(100) / total).min(100) as u8);
			}
		}
		file.flush().await?;
		progress(100);

		Ok(())
	}
}

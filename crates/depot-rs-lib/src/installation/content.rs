//! Item content extraction.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::metadb::item::Item;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
	/// The downloaded content has no file name to install it under.
	#[error("content has no file name.")]
	MissingFileName,
	/// The installer refused the item.
	#[error("installer rejected item: {0}")]
	Rejected(String),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("zip error: {0}")]
	Zip(#[from] zip::result::ZipError),
	#[error("extraction task failed: {0}")]
	Task(#[from] tokio::task::JoinError),
}

/// Puts downloaded content in place.
#[async_trait]
pub trait Installer: Send + Sync {
	/// Installs `item` from the downloaded `content` into `destination`, which already exists and belongs to the item alone.
	async fn install(&self, item: &Item, content: &Path, destination: &Path) -> Result<(), ContentError>;
}

/// How content is unpacked, decided by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
	Zip,
	TarGz,
	/// Anything else is copied as is.
	File,
}

impl ContentType {
	pub fn from_path(path: &Path) -> Self {
		let name = path.file_name()
			.map(|n| n.to_string_lossy().to_lowercase())
			.unwrap_or_default();
		if name.ends_with(".zip") {
			Self::Zip
		} else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
			Self::TarGz
		} else {
			Self::File
		}
	}
}

/// Extracts zip and tar.gz archives, copies any other file into the destination.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveInstaller;

#[async_trait]
impl Installer for ArchiveInstaller {
	async fn install(&self, item: &Item, content: &Path, destination: &Path) -> Result<(), ContentError> {
		log::info!("Extracting content of {} to {}", item.id(), destination.display());
		let content = content.to_path_buf();
		let destination = destination.to_path_buf();
		tokio::task::spawn_blocking(move || extract_content(&content, &destination)).await?
	}
}

/// Unpacks `content` into `destination` according to its [`ContentType`].
pub fn extract_content(content: &Path, destination: &Path) -> Result<(), ContentError> {
	match ContentType::from_path(content) {
		ContentType::Zip => {
			let mut zip = zip::ZipArchive::new(std::fs::File::open(content)?)?;
			zip.extract(destination)?;
		},
		ContentType::TarGz => {
			let gz = flate2::read::GzDecoder::new(std::fs::File::open(content)?);
			tar::Archive::new(gz).unpack(destination)?;
		},
		ContentType::File => {
			let name = content.file_name().ok_or(ContentError::MissingFileName)?;
			let target: PathBuf = destination.join(name);
			std::fs::copy(content, target)?;
		},
	}
	Ok(())
}

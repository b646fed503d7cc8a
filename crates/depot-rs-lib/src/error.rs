//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

use crate::installation::content::ContentError;
use crate::installation::download::DownloadError;
use crate::metadb::progress::ProgressState;

#[derive(Debug, Error)]
pub enum Error {
	/// A required identifier or url was missing or empty.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),
	#[error("failed to create directory {path:?}: {source}")]
	DirectoryCreation {
		path: std::path::PathBuf,
		source: std::io::Error,
	},
	#[error("transfer failed: {0}")]
	Transfer(#[from] DownloadError),
	#[error("install failed: {0}")]
	Install(#[from] ContentError),
	/// A [`ProgressToken`](crate::ProgressToken) was asked to move to a state it can't reach from its current one.
	#[error("invalid progress transition from {from:?} to {to:?}")]
	InvalidTransition {
		from: ProgressState,
		to: ProgressState,
	},
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("parsing error: {0}")]
	Parse(String),
}

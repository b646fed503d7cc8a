//! Getting item content onto disk.
//!
//! - [`download`] fetches content into the download directory.
//! - [`content`] unpacks content into an item's install directory.
//! - acquirement drives both over an item's dependency closure, see [`DownloadManager`].

pub mod download;
pub mod content;

mod acquirement;
pub use acquirement::DownloadManager;

//! Sources of items.

use async_trait::async_trait;

use crate::metadb::item::Item;

mod static_repository;
pub use static_repository::StaticRepository;

mod json;
pub use json::JsonRepository;

mod archive;
pub use archive::ArchiveRepository;

/// A refreshable snapshot of items.
#[async_trait]
pub trait Repository: Send + Sync {
	fn name(&self) -> &str;

	/// The current snapshot, empty before the first refresh.
	fn items(&self) -> &[Item];

	/// Replaces the snapshot with the current contents of the source.
	///
	/// On failure the snapshot is left in an unspecified state.
	async fn refresh(&mut self) -> crate::Result<()>;

	fn lookup(&self, id: &str) -> Option<&Item> {
		self.items().iter().find(|i| i.id() == id)
	}
}

/// Builds the repositories listed in `config`, in the same order.
pub fn from_config(config: &crate::Config) -> crate::Result<Vec<Box<dyn Repository>>> {
	let client = reqwest::Client::builder()
		.https_only(config.https_only())
		.build()?;

	Ok(config.repositories().iter().map(|r| -> Box<dyn Repository> {
		match r {
			crate::RepositoryConfig::Json { name, location } => Box::new(JsonRepository::with_client(name, location, client.clone())),
			crate::RepositoryConfig::Archive { name, location } => Box::new(ArchiveRepository::with_client(name, location, client.clone())),
		}
	}).collect())
}

/// Reads the whole body at `location`.
///
/// `http://` and `https://` locations are requested with `client`, `file://` urls and anything else are read as paths.
pub(crate) async fn read_location(client: &reqwest::Client, location: &str) -> crate::Result<Vec<u8>> {
	if location.starts_with("http://") || location.starts_with("https://") {
		log::debug!("Requesting {}", location);
		let bytes = client
			.get(location)
			.send()
			.await?
			.error_for_status()?
			.bytes()
			.await?;
		Ok(bytes.to_vec())
	} else {
		let path = location.strip_prefix("file://").unwrap_or(location);
		log::debug!("Reading {}", path);
		Ok(tokio::fs::read(path).await?)
	}
}

use async_trait::async_trait;

use crate::metadb::item::Item;

/// A repository distributed as a `.tar.gz` archive holding one JSON item document per entry.
#[derive(Debug, Clone)]
pub struct ArchiveRepository {
	name: String,
	location: String,
	client: reqwest::Client,
	items: Vec<Item>,
}

impl ArchiveRepository {
	/// `location` is a `http(s)://` url, a `file://` url or a path.
	pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
		Self::with_client(name, location, reqwest::Client::new())
	}

	pub fn with_client(name: impl Into<String>, location: impl Into<String>, client: reqwest::Client) -> Self {
		Self {
			name: name.into(),
			location: location.into(),
			client,
			items: Vec::new(),
		}
	}

	pub fn location(&self) -> &str {
		&self.location
	}
}

/// Reads every item document in a gzip compressed tar archive.
///
/// Entries that aren't valid items are logged and skipped, a broken archive is an error.
pub fn read_archive(data: &[u8]) -> crate::Result<Vec<Item>> {
	use std::io::Read;

	let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(data));
	let mut items = Vec::<Item>::new();

	for (i, entry) in archive.entries()?.enumerate() {
		let mut entry = entry.map_err(|e| crate::Error::Parse(format!("tar archive entry {} unreadable: {}", i, e)))?;

		/* Directories and empty files */
		if entry.size() == 0 {
			continue;
		}

		let mut b = Vec::<u8>::new();
		entry.read_to_end(&mut b)?;

		let item = match serde_json::from_slice::<Item>(&b) {
			Ok(v) => v,
			Err(e) => {
				log::warn!("Couldn't process entry {} in archive, failed to deserialize as an item: {}", i, e);
				continue;
			},
		};
		if let Err(e) = item.validate() {
			log::warn!("Couldn't process entry {} in archive: {}", i, e);
			continue;
		}
		items.push(item);
	}

	Ok(items)
}

#[async_trait]
impl super::Repository for ArchiveRepository {
	fn name(&self) -> &str {
		&self.name
	}

	fn items(&self) -> &[Item] {
		&self.items
	}

	async fn refresh(&mut self) -> crate::Result<()> {
		log::info!("Refreshing repository {} from archive {}", self.name, self.location);
		let data = super::read_location(&self.client, &self.location).await?;
		let items = read_archive(&data)?;
		log::debug!("Repository {} lists {} items", self.name, items.len());
		self.items = items;
		Ok(())
	}
}

use async_trait::async_trait;

use crate::metadb::item::Item;

/// A repository listing its items as one JSON array.
#[derive(Debug, Clone)]
pub struct JsonRepository {
	name: String,
	location: String,
	client: reqwest::Client,
	items: Vec<Item>,
}

impl JsonRepository {
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

#[async_trait]
impl super::Repository for JsonRepository {
	fn name(&self) -> &str {
		&self.name
	}

	fn items(&self) -> &[Item] {
		&self.items
	}

	/// # Errors
	/// Fails on transport errors, malformed JSON or any item with an empty id.
	async fn refresh(&mut self) -> crate::Result<()> {
		log::info!("Refreshing repository {} from {}", self.name, self.location);
		let body = super::read_location(&self.client, &self.location).await?;
		let items = serde_json::from_slice::<Vec<Item>>(&body)?;
		for item in &items {
			item.validate()?;
		}
		log::debug!("Repository {} lists {} items", self.name, items.len());
		self.items = items;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Repository;

	#[tokio::test]
	async fn reads_local_listing() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("items.json");
		std::fs::write(&path, r#"[
			{"id": "pkgA", "download": "http://x/pkgA.zip", "dependencies": ["pkgB"]},
			{"id": "pkgB", "download": "http://x/pkgB.zip"}
		]"#).unwrap();

		let mut repo = JsonRepository::new("main", format!("file://{}", path.display()));
		repo.refresh().await.unwrap();
		assert_eq!(repo.items().len(), 2);
		assert!(repo.lookup("pkgA").unwrap().dependencies().contains("pkgB"));
	}

	#[tokio::test]
	async fn missing_source_fails() {
		let dir = tempfile::tempdir().unwrap();
		let mut repo = JsonRepository::new("main", dir.path().join("absent.json").display().to_string());
		assert!(matches!(repo.refresh().await, Err(crate::Error::IO(_))));
	}

	#[tokio::test]
	async fn empty_id_fails_refresh() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("items.json");
		std::fs::write(&path, r#"[{"id": ""}]"#).unwrap();

		let mut repo = JsonRepository::new("main", path.display().to_string());
		assert!(matches!(repo.refresh().await, Err(crate::Error::InvalidArgument(_))));
	}
}

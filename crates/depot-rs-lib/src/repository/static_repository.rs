use async_trait::async_trait;

use crate::metadb::item::Item;

/// A repository backed by a list held in memory, for locally provided items.
#[derive(Debug, Clone)]
pub struct StaticRepository {
	name: String,
	source: Vec<Item>,
	items: Vec<Item>,
}

impl StaticRepository {
	pub fn new(name: impl Into<String>, source: Vec<Item>) -> Self {
		Self { name: name.into(), source, items: Vec::new() }
	}

	/// Changes what the next refresh will return.
	pub fn set_source(&mut self, source: Vec<Item>) {
		self.source = source;
	}
}

#[async_trait]
impl super::Repository for StaticRepository {
	fn name(&self) -> &str {
		&self.name
	}

	fn items(&self) -> &[Item] {
		&self.items
	}

	async fn refresh(&mut self) -> crate::Result<()> {
		for item in &self.source {
			item.validate()?;
		}
		self.items = self.source.iter().map(Item::snapshot).collect();
		Ok(())
	}
}

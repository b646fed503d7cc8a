//! # MetaDB
//!
//! The merged view of every configured [`Repository`].
//!
//! Repositories are listed in ascending precedence. A refresh pulls every repository, merges their listings
//! field by field (see [`ItemHooks`]), binds dependencies and persists the result as JSON when a database path is set.
//! The database is rebuilt from scratch on each refresh, install state is carried over from the previous set.

use std::path::{Path, PathBuf};

use crate::repository::Repository;

pub mod item;
pub mod item_set;
pub mod progress;

mod hooks;
pub use hooks::ItemHooks;
pub use hooks::DefaultItemHooks;

mod merge;
pub use merge::merge;

use item::Item;
use item_set::ItemSet;

pub struct MetaDB {
	repositories: Vec<Box<dyn Repository>>,
	hooks: Box<dyn ItemHooks>,
	database_path: Option<PathBuf>,
	items: ItemSet,
}

impl std::fmt::Debug for MetaDB {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MetaDB")
			.field("repositories", &self.repositories.iter().map(|r| r.name()).collect::<Vec<_>>())
			.field("database_path", &self.database_path)
			.field("items", &self.items.len())
			.finish()
	}
}

impl MetaDB {
	/// Creates an empty database over `repositories` using [`DefaultItemHooks`] and no persistence.
	pub fn new(repositories: Vec<Box<dyn Repository>>) -> Self {
		Self {
			repositories,
			hooks: Box::new(DefaultItemHooks),
			database_path: None,
			items: Default::default(),
		}
	}

	/// Creates a database from the repositories listed in `config`, persisted to [`Config::database_path`](crate::Config::database_path).
	pub fn from_config(config: &crate::Config) -> crate::Result<Self> {
		let repositories = crate::repository::from_config(config)?;
		Ok(Self::new(repositories).with_database_path(config.database_path()))
	}

	pub fn with_hooks(mut self, hooks: impl ItemHooks + 'static) -> Self {
		self.hooks = Box::new(hooks);
		self
	}

	pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.database_path = Some(path.into());
		self
	}

	pub fn database_path(&self) -> Option<&Path> {
		self.database_path.as_deref()
	}

	pub fn repositories(&self) -> &[Box<dyn Repository>] {
		&self.repositories
	}

	pub fn items(&self) -> &ItemSet {
		&self.items
	}

	/// Looks up a merged item, `None` when absent.
	pub fn get(&self, id: &str) -> Option<&Item> {
		self.items.get(id)
	}

	/// Refreshes every repository concurrently then rebuilds the merged set.
	///
	/// # Errors
	/// If any repository fails the first failure is returned and the current set is kept as is.
	/// Persisting the new set can also fail with [`IO`](crate::Error::IO) or [`SerdeJSON`](crate::Error::SerdeJSON).
	pub async fn refresh_database(&mut self) -> crate::Result<()> {
		log::info!("Refreshing {} repositories", self.repositories.len());

		let results = futures::future::join_all(
			self.repositories.iter_mut().map(|r| async move {
				let result = r.refresh().await;
				(r.name().to_owned(), result)
			})
		).await;

		let mut first_error = None;
		for (name, result) in results {
			match result {
				Ok(()) => log::debug!("Repository {} refreshed", name),
				Err(e) => {
					log::error!("Failed to refresh repository {}: {}", name, e);
					first_error.get_or_insert(e);
				},
			}
		}
		if let Some(e) = first_error {
			return Err(e);
		}

		let merged = merge(self.repositories.iter().map(|r| r.items()), self.hooks.as_ref());
		let mut items = ItemSet::new(merged);
		items.resolve_dependencies(self.hooks.as_ref())?;
		items.adopt_install_state(&self.items);
		self.items = items;
		log::info!("Database rebuilt with {} items", self.items.len());

		if self.database_path.is_some() {
			self.save_to_disk()?;
		}

		Ok(())
	}

	/// Rebinds dependencies in the current set, returns the number of placeholders created.
	pub fn resolve_dependencies(&mut self) -> crate::Result<usize> {
		self.items.resolve_dependencies(self.hooks.as_ref())
	}

	/// Writes the merged set to the database path.
	///
	/// # Errors
	/// - [`InvalidArgument`](crate::Error::InvalidArgument) when no database path is set.
	pub fn save_to_disk(&self) -> crate::Result<()> {
		let path = self.require_database_path()?;
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		log::debug!("Saving database to {}", path.display());
		std::fs::write(path, serde_json::to_string_pretty(&self.items)?)?;
		Ok(())
	}

	/// Replaces the merged set with the one stored at the database path and rebinds dependencies.
	///
	/// # Errors
	/// - [`InvalidArgument`](crate::Error::InvalidArgument) when no database path is set or a stored item is invalid.
	/// - [`IO`](crate::Error::IO) and [`SerdeJSON`](crate::Error::SerdeJSON) when reading the file.
	pub fn load_from_disk(&mut self) -> crate::Result<()> {
		let path = self.require_database_path()?;
		log::debug!("Loading database from {}", path.display());
		let data = std::fs::read_to_string(path)?;
		let mut items: ItemSet = serde_json::from_str(&data)?;
		for item in &items {
			item.validate()?;
		}
		items.resolve_dependencies(self.hooks.as_ref())?;
		self.items = items;
		Ok(())
	}

	/// Loads the stored database if there is one, otherwise performs a full refresh.
	pub async fn load_or_refresh(&mut self) -> crate::Result<()> {
		match &self.database_path {
			Some(path) if path.exists() => self.load_from_disk(),
			_ => self.refresh_database().await,
		}
	}

	fn require_database_path(&self) -> crate::Result<&Path> {
		self.database_path.as_deref()
			.ok_or_else(|| crate::Error::InvalidArgument("no database path configured".to_string()))
	}
}

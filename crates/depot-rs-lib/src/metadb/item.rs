//! Various types associated with items.

use std::path::{Component, Path, PathBuf};

use serde::{Serialize, Deserialize};

use super::progress::ProgressToken;

/// A single installable artifact as listed by a [`Repository`](crate::Repository).
///
/// Items are equal, hashed and ordered by [`id`](Item::id) alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
	id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Where the content is downloaded from, `None` when the item can't be downloaded.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub download: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub download_size: Option<u64>,
	#[serde(default)]
	pub kind: Kind,
	#[serde(default)]
	dependencies: Dependencies,
	#[serde(default, rename = "install_path", skip_serializing_if = "not_installed")]
	progress: ProgressToken,
}

/// Checks `id` can name a single directory.
///
/// Ids become directory names under the install and download directories, so they must be one
/// plain path component. Empty ids, `.`, `..`, separators and absolute paths are rejected.
///
/// # Errors
/// - [`InvalidArgument`](crate::Error::InvalidArgument) when `id` isn't usable.
pub fn validate_id(id: &str) -> crate::Result<()> {
	if id.trim().is_empty() {
		return Err(crate::Error::InvalidArgument("item id is empty".to_string()));
	}
	let mut components = Path::new(id).components();
	let single = match (components.next(), components.next()) {
		(Some(Component::Normal(name)), None) => name.to_str() == Some(id),
		_ => false,
	};
	if !single || id.contains(['/', '\\']) {
		return Err(crate::Error::InvalidArgument(format!("item id {:?} is not a plain name", id)));
	}
	Ok(())
}

fn not_installed(progress: &ProgressToken) -> bool {
	!progress.is_installed()
}

/// The type of an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
	/// A normal item listed by a repository.
	#[default] Package,
	/// Stand-in created for a dependency no repository lists.
	Placeholder,
}

impl std::hash::Hash for Item {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl std::cmp::Ord for Item {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.id.cmp(&other.id)
	}
}

impl std::cmp::PartialOrd for Item {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl std::cmp::PartialEq for Item {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl std::cmp::Eq for Item {}

impl Item {
	/// Creates an item with no fields set other than `id`.
	///
	/// # Errors
	/// - [`InvalidArgument`](crate::Error::InvalidArgument) when `id` is empty.
	pub fn new(id: impl Into<String>) -> crate::Result<Self> {
		let item = Self::blank(id.into(), Kind::Package);
		item.validate()?;
		Ok(item)
	}

	/// Creates a [`Kind::Placeholder`] item for a dependency that couldn't be found.
	pub fn placeholder(id: impl Into<String>) -> Self {
		Self::blank(id.into(), Kind::Placeholder)
	}

	fn blank(id: String, kind: Kind) -> Self {
		Self {
			id,
			name: None,
			version: None,
			description: None,
			download: None,
			download_size: None,
			kind,
			dependencies: Default::default(),
			progress: Default::default(),
		}
	}

	pub fn with_download(mut self, url: impl Into<String>) -> Self {
		self.download = Some(url.into());
		self
	}

	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn with_version(mut self, version: impl Into<String>) -> Self {
		self.version = Some(version.into());
		self
	}

	/// Declares a dependency, duplicates are ignored.
	pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
		self.dependencies.insert(id.into());
		self
	}

	pub fn with_dependencies<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
		for id in ids {
			self.dependencies.insert(id.into());
		}
		self
	}

	/// Checks the identifiers on this item are usable.
	///
	/// Items from serialized sources skip [`Item::new`] so this should be called on anything deserialized.
	pub fn validate(&self) -> crate::Result<()> {
		validate_id(&self.id)?;
		for dependency in self.dependencies.ids() {
			validate_id(dependency)
				.map_err(|e| crate::Error::InvalidArgument(format!("item {} has a bad dependency: {}", self.id, e)))?;
		}
		if matches!(&self.download, Some(url) if url.trim().is_empty()) {
			return Err(crate::Error::InvalidArgument(format!("item {} has an empty download url", self.id)));
		}
		Ok(())
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn dependencies(&self) -> &Dependencies {
		&self.dependencies
	}

	pub(crate) fn dependencies_mut(&mut self) -> &mut Dependencies {
		&mut self.dependencies
	}

	pub fn progress(&self) -> &ProgressToken {
		&self.progress
	}

	/// A copy with its own [`ProgressToken`], keeping only the persisted install state.
	///
	/// Plain clones share the token with the original.
	pub fn snapshot(&self) -> Item {
		let mut item = self.clone();
		item.progress = match self.install_path().filter(|_| self.is_installed()) {
			Some(path) => ProgressToken::installed(path),
			None => ProgressToken::new(),
		};
		item
	}

	pub(crate) fn adopt_progress(&mut self, progress: ProgressToken) {
		self.progress = progress;
	}

	pub fn install_path(&self) -> Option<PathBuf> {
		self.progress.install_path()
	}

	pub fn is_installed(&self) -> bool {
		self.progress.is_installed()
	}

	pub fn is_placeholder(&self) -> bool {
		self.kind == Kind::Placeholder
	}

	/// Field by field override, every field of `superior` wins unless it is unset.
	///
	/// Unset means `None`, an empty dependency list or a token that isn't installed.
	/// `id` and `kind` always come from `superior`.
	pub fn merge_fields(superior: &Item, inferior: &Item) -> Item {
		Item {
			id: superior.id.clone(),
			name: superior.name.clone().or_else(|| inferior.name.clone()),
			version: superior.version.clone().or_else(|| inferior.version.clone()),
			description: superior.description.clone().or_else(|| inferior.description.clone()),
			download: superior.download.clone().or_else(|| inferior.download.clone()),
			download_size: superior.download_size.or(inferior.download_size),
			kind: superior.kind,
			dependencies: if superior.dependencies.is_empty() {
				inferior.dependencies.unbound()
			} else {
				superior.dependencies.unbound()
			},
			progress: if !superior.is_installed() && inferior.is_installed() {
				inferior.progress.clone()
			} else {
				superior.progress.clone()
			},
		}
	}
}

impl std::fmt::Display for Item {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.version {
			Some(version) => write!(f, "{} {}", self.id, version),
			None => write!(f, "{}", self.id),
		}
	}
}

/// A declared dependency and, once resolved, the index of the item it points to within an [`ItemSet`](crate::ItemSet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
	id: String,
	resolved: Option<usize>,
}

impl Dependency {
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Index of the bound item, `None` until [`ItemSet::resolve_dependencies`](crate::ItemSet::resolve_dependencies) has run.
	pub fn resolved(&self) -> Option<usize> {
		self.resolved
	}

	pub(crate) fn bind(&mut self, index: Option<usize>) {
		self.resolved = index;
	}
}

/// Ordered mapping of dependency ids to their bindings.
///
/// Keys are unique and fixed once added. Persisted as a plain list of ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Dependencies {
	entries: Vec<Dependency>,
}

impl Dependencies {
	pub fn iter(&self) -> std::slice::Iter<'_, Dependency> {
		self.entries.iter()
	}

	pub fn ids(&self) -> impl Iterator<Item = &str> {
		self.entries.iter().map(|d| d.id.as_str())
	}

	pub fn contains(&self, id: &str) -> bool {
		self.entries.iter().any(|d| d.id == id)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn is_resolved(&self) -> bool {
		self.entries.iter().all(|d| d.resolved.is_some())
	}

	pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Dependency> {
		self.entries.iter_mut()
	}

	fn insert(&mut self, id: String) -> bool {
		if self.contains(&id) {
			return false;
		}
		self.entries.push(Dependency { id, resolved: None });
		true
	}

	/// Same keys with every binding cleared, bindings are only valid within the set that made them.
	fn unbound(&self) -> Self {
		Self {
			entries: self.entries.iter().map(|d| Dependency { id: d.id.clone(), resolved: None }).collect(),
		}
	}
}

impl From<Vec<String>> for Dependencies {
	fn from(ids: Vec<String>) -> Self {
		let mut dependencies = Self::default();
		for id in ids {
			dependencies.insert(id);
		}
		dependencies
	}
}

impl From<Dependencies> for Vec<String> {
	fn from(dependencies: Dependencies) -> Self {
		dependencies.entries.into_iter().map(|d| d.id).collect()
	}
}

impl<'a> IntoIterator for &'a Dependencies {
	type Item = &'a Dependency;
	type IntoIter = std::slice::Iter<'a, Dependency>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

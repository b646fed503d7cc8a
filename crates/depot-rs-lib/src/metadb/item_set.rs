//! The merged set of items.
//!
//! Items are kept sorted by id. Dependencies are bound to indices into the set rather than holding references
//! so the set owns every item outright, bindings are rebuilt whenever the set changes shape or is loaded.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Serialize, Deserialize};

use super::hooks::ItemHooks;
use super::item::Item;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ItemSet {
	items: Vec<Item>,
}

impl<'de> Deserialize<'de> for ItemSet {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		Vec::<Item>::deserialize(deserializer).map(ItemSet::new)
	}
}

/// Result of walking an item's dependencies, see [`ItemSet::closure`].
#[derive(Debug, Default)]
pub struct Closure<'a> {
	/// Every reachable item including the root, in depth first pre-order.
	pub items: Vec<&'a Item>,
	/// Dependency ids that aren't in the set at all.
	pub missing: Vec<String>,
}

impl ItemSet {
	/// Creates a set from `items`, sorting them. Bindings are left for [`ItemSet::resolve_dependencies`].
	///
	/// Items sharing an id are reduced to the last one.
	pub fn new(mut items: Vec<Item>) -> Self {
		/* stable sort keeps the later duplicate last */
		items.sort();
		let mut deduped = Vec::<Item>::with_capacity(items.len());
		for item in items {
			if deduped.last().is_some_and(|last| last.id() == item.id()) {
				log::warn!("Duplicate item {} in set, keeping the last listing", item.id());
				deduped.pop();
			}
			deduped.push(item);
		}
		Self { items: deduped }
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, Item> {
		self.items.iter()
	}

	pub fn index_of(&self, id: &str) -> Option<usize> {
		self.items.binary_search_by(|i| i.id().cmp(id)).ok()
	}

	/// Looks up an item, `None` when no item has `id`.
	pub fn get(&self, id: &str) -> Option<&Item> {
		self.index_of(id).map(|i| &self.items[i])
	}

	pub fn get_by_index(&self, index: usize) -> Option<&Item> {
		self.items.get(index)
	}

	/// The item a dependency of `item` points to.
	///
	/// Uses the binding when it is current and falls back to looking the id up.
	pub fn dependency_target(&self, dependency: &super::item::Dependency) -> Option<&Item> {
		dependency.resolved()
			.and_then(|i| self.items.get(i))
			.filter(|target| target.id() == dependency.id())
			.or_else(|| self.get(dependency.id()))
	}

	pub fn is_resolved(&self) -> bool {
		self.items.iter().all(|i| i.dependencies().is_resolved())
	}

	/// Binds every dependency to the item with its id.
	///
	/// Ids missing from the set get an item from [`ItemHooks::create_unknown_dependency`] inserted first,
	/// including ids only placeholders depend on, so afterwards every binding is set.
	///
	/// Returns the number of placeholders created.
	///
	/// # Errors
	/// - [`InvalidArgument`](crate::Error::InvalidArgument) when the hook returns an item with a different id or an invalid item.
	pub fn resolve_dependencies(&mut self, hooks: &dyn ItemHooks) -> crate::Result<usize> {
		let mut created = 0;
		/* Placeholders may declare dependencies of their own, repeat until nothing new is missing */
		loop {
			let missing = self.items.iter()
				.flat_map(|i| i.dependencies().ids())
				.filter(|id| self.index_of(id).is_none())
				.map(str::to_owned)
				.collect::<BTreeSet<_>>();
			if missing.is_empty() {
				break;
			}

			for id in &missing {
				log::warn!("Dependency {} is not provided by any repository, adding a placeholder", id);
				let placeholder = hooks.create_unknown_dependency(id);
				if placeholder.id() != id {
					return Err(crate::Error::InvalidArgument(format!("placeholder for {} was created with id {}", id, placeholder.id())));
				}
				placeholder.validate()?;
				self.items.push(placeholder);
			}
			created += missing.len();
			self.items.sort();
		}

		/* Inserting placeholders shifts indices so everything is rebound */
		let positions = self.items.iter()
			.enumerate()
			.map(|(i, item)| (item.id().to_owned(), i))
			.collect::<HashMap<_, _>>();
		for item in &mut self.items {
			for dependency in item.dependencies_mut().iter_mut() {
				let index = positions.get(dependency.id()).copied();
				dependency.bind(index);
			}
		}

		Ok(created)
	}

	/// Keeps install state across a rebuild.
	///
	/// Items not installed in `self` but installed in `previous` take over the previous token.
	pub fn adopt_install_state(&mut self, previous: &ItemSet) {
		for item in &mut self.items {
			if item.is_installed() {
				continue;
			}
			if let Some(old) = previous.get(item.id()).filter(|old| old.is_installed()) {
				log::trace!("Keeping install state of {}", item.id());
				item.adopt_progress(old.progress().clone());
			}
		}
	}

	/// Walks the dependencies of `root` depth first.
	///
	/// Each id is visited once so shared dependencies appear once and cycles terminate.
	pub fn closure<'a>(&'a self, root: &'a Item) -> Closure<'a> {
		let mut closure = Closure::default();
		let mut visited = HashSet::<&str>::new();
		let mut stack = vec![root];

		while let Some(item) = stack.pop() {
			if !visited.insert(item.id()) {
				continue;
			}
			log::trace!("Visiting {} in closure of {}", item.id(), root.id());
			closure.items.push(item);

			/* Reversed so the first declared dependency is popped first */
			for dependency in item.dependencies().iter().rev() {
				if visited.contains(dependency.id()) {
					continue;
				}
				match self.dependency_target(dependency) {
					Some(target) => stack.push(target),
					None => {
						if !closure.missing.iter().any(|m| m == dependency.id()) {
							closure.missing.push(dependency.id().to_owned());
						}
					},
				}
			}
		}

		closure
	}
}

impl<'a> IntoIterator for &'a ItemSet {
	type Item = &'a Item;
	type IntoIter = std::slice::Iter<'a, Item>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

impl From<Vec<Item>> for ItemSet {
	fn from(items: Vec<Item>) -> Self {
		Self::new(items)
	}
}

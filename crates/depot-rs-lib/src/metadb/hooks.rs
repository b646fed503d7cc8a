//! Item specific behaviour injected into the [`MetaDB`](crate::MetaDB).

use super::item::Item;

/// Strategy for the parts of reconciliation that depend on what the items describe.
pub trait ItemHooks: Send + Sync {
	/// Combines two listings of the same id, `superior` comes from the repository with higher precedence.
	fn merge_items(&self, superior: &Item, inferior: &Item) -> Item;

	/// Creates the stand-in bound to a dependency id no repository lists.
	///
	/// The returned item must have the given `id`.
	fn create_unknown_dependency(&self, id: &str) -> Item;
}

/// Uses [`Item::merge_fields`] and [`Item::placeholder`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultItemHooks;

impl ItemHooks for DefaultItemHooks {
	fn merge_items(&self, superior: &Item, inferior: &Item) -> Item {
		Item::merge_fields(superior, inferior)
	}

	fn create_unknown_dependency(&self, id: &str) -> Item {
		Item::placeholder(id)
	}
}

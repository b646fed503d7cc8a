//! Combining repository listings.

use std::collections::HashMap;

use super::hooks::ItemHooks;
use super::item::Item;

/// Merges item lists into one, sorted by id.
///
/// `lists` are in ascending precedence, when an id is seen again the new listing is merged over the existing one with [`ItemHooks::merge_items`].
pub fn merge<'a>(lists: impl IntoIterator<Item = &'a [Item]>, hooks: &dyn ItemHooks) -> Vec<Item> {
	let mut merged = Vec::<Item>::new();
	let mut positions = HashMap::<String, usize>::new();

	for list in lists {
		for item in list {
			match positions.get(item.id()) {
				Some(&i) => {
					log::trace!("Merging item {} over existing listing", item.id());
					merged[i] = hooks.merge_items(item, &merged[i]);
				},
				None => {
					positions.insert(item.id().to_owned(), merged.len());
					merged.push(item.clone());
				},
			}
		}
	}

	merged.sort();
	merged
}

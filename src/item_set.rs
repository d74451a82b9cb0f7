//! Set operations over retrieved items: ordering, filtering, grouping.

use anyhow::{bail, Result};
use std::collections::hash_map;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{Id, Item};

/// Items keyed by id. Values are shared so sets can be regrouped freely.
#[derive(Clone, Debug, Default)]
pub struct ItemSet {
    items: HashMap<Id, Arc<Item>>,
}

impl ItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: HashMap::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, item: Arc<Item>) {
        self.items.insert(item.id, item);
    }

    pub fn get(&self, id: Id) -> Option<&Arc<Item>> {
        self.items.get(&id)
    }

    pub fn contains(&self, id: Id) -> bool {
        self.items.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Item>> {
        self.items.values()
    }

    /// All ids, largest first.
    pub fn ids(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self.items.keys().copied().collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids
    }

    /// Items newest first; id breaks ties, larger first.
    pub fn order_by_time_desc(&self) -> Vec<Arc<Item>> {
        let mut items: Vec<Arc<Item>> = self.items.values().cloned().collect();
        items.sort_unstable_by(|a, b| b.time.cmp(&a.time).then(b.id.cmp(&a.id)));
        items
    }

    pub fn filter(&self, keep: impl Fn(&Item) -> bool) -> ItemSet {
        self.items
            .values()
            .filter(|item| keep(item))
            .cloned()
            .collect()
    }

    pub fn union(&self, other: &ItemSet) -> ItemSet {
        self.items
            .values()
            .chain(other.items.values())
            .cloned()
            .collect()
    }

    /// Walk parent links from `item` until an item with no parent.
    /// Fails when a claimed parent is not in the set.
    pub fn find_root(&self, item: &Arc<Item>) -> Result<Arc<Item>> {
        let mut current = item;

        while let Some(parent_id) = current.parent {
            match self.items.get(&parent_id) {
                Some(parent) => current = parent,
                None => bail!("parent {parent_id} of item {} not found", current.id),
            }
        }

        Ok(Arc::clone(current))
    }

    /// Group every item under the root of its parent chain, keyed by root
    /// id. Fails when any parent link leaves the set.
    pub fn group_by_root(&self) -> Result<HashMap<Id, ItemSet>> {
        let mut groups: HashMap<Id, ItemSet> = HashMap::new();

        for item in self.items.values() {
            let root = self.find_root(item)?;
            groups
                .entry(root.id)
                .or_default()
                .insert(Arc::clone(item));
        }

        Ok(groups)
    }

    /// Bucket items by their parent id; items without a parent are
    /// returned separately.
    pub fn group_by_parent(&self) -> (HashMap<Id, ItemSet>, ItemSet) {
        let mut groups: HashMap<Id, ItemSet> = HashMap::new();
        let mut rootless = ItemSet::new();

        for item in self.items.values() {
            match item.parent {
                Some(parent_id) => groups
                    .entry(parent_id)
                    .or_default()
                    .insert(Arc::clone(item)),
                None => rootless.insert(Arc::clone(item)),
            }
        }

        (groups, rootless)
    }

    /// Bucket items by author.
    pub fn group_by_author(&self) -> HashMap<String, ItemSet> {
        let mut groups: HashMap<String, ItemSet> = HashMap::new();

        for item in self.items.values() {
            groups
                .entry(item.by.clone())
                .or_default()
                .insert(Arc::clone(item));
        }

        groups
    }
}

impl FromIterator<Arc<Item>> for ItemSet {
    fn from_iter<I: IntoIterator<Item = Arc<Item>>>(iter: I) -> Self {
        let mut set = ItemSet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

impl IntoIterator for ItemSet {
    type Item = (Id, Arc<Item>);
    type IntoIter = hash_map::IntoIter<Id, Arc<Item>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

//! Selection of active discussions on top of the frontier scan.
//!
//! A root qualifies when it is alive, younger than `max_age`, and its
//! subtree restricted to the activity window has at least `min_authors`
//! distinct authors. "Lurker-free" threads with one person talking to
//! themselves don't make the cut.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::client::Client;
use crate::core::{CancelToken, Clock};
use crate::item_set::ItemSet;
use crate::types::{Id, Item};

#[derive(Clone, Debug)]
pub struct ActiveQuery {
    /// Window defining "recent activity".
    pub window: Duration,
    /// Maximum age of a root to still be shown.
    pub max_age: Duration,
    /// Minimum distinct authors active within the window per root.
    pub min_authors: usize,
    /// Maximum roots returned; 0 means no limit.
    pub limit: usize,
}

impl Default for ActiveQuery {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30 * 60),
            max_age: Duration::from_secs(8 * 60 * 60),
            min_authors: 3,
            limit: 0,
        }
    }
}

/// Result of [`find_active`]: qualifying roots (newest first) and the full
/// scan grouped by parent for tree rendering.
pub struct ActiveDiscussions {
    pub roots: Vec<Arc<Item>>,
    pub by_parent: HashMap<Id, ItemSet>,
    pub now: SystemTime,
    pub active_after: SystemTime,
}

pub fn find_active(
    client: &Client,
    token: &CancelToken,
    clock: &dyn Clock,
    query: &ActiveQuery,
    on_scanned: impl FnMut(usize),
) -> Result<ActiveDiscussions> {
    let now = clock.now();
    let active_after = now - query.window;
    let aged_after = now - query.max_age;

    let max_id = client.max_item(token).context("failed to get max item")?;

    let all = client
        .get_active_with(token, max_id, active_after, on_scanned)
        .context("failed to get active items")?;

    let by_root = all.group_by_root().context("failed to group by root")?;

    let mut roots = active_roots(&all, by_root, active_after, aged_after, query.min_authors)
        .order_by_time_desc();

    if query.limit > 0 {
        roots.truncate(query.limit);
    }

    let (by_parent, _) = all.group_by_parent();

    Ok(ActiveDiscussions {
        roots,
        by_parent,
        now,
        active_after,
    })
}

fn active_roots(
    all: &ItemSet,
    by_root: HashMap<Id, ItemSet>,
    active_after: SystemTime,
    aged_after: SystemTime,
    min_authors: usize,
) -> ItemSet {
    let mut roots = ItemSet::with_capacity(by_root.len());

    for (root_id, tree) in by_root {
        let Some(root) = all.get(root_id) else {
            continue;
        };

        if root.dead || root.deleted || root.created() <= aged_after {
            continue;
        }

        let active = tree.filter(|item| item.is_active(active_after));

        if active.group_by_author().len() >= min_authors {
            roots.insert(Arc::clone(root));
        }
    }

    roots
}

//! Duplicate place detection and merge planning.
//!
//! Places are grouped by a fuzzy identity key, one survivor per group is
//! chosen by completeness, and gap fields are backfilled from the
//! duplicates before they are deleted.

pub mod apply;

use hashbrown::HashMap;
use tracing::debug;

use crate::models::{FieldValue, MergeField, Place, MERGE_FIELDS};

pub use apply::apply_merge;

/// Identity key for duplicate grouping.
///
/// Freshly generated rows often lack an address until enrichment runs, so
/// when the address is empty the key falls back to name + category, the
/// only discriminator available pre-enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    NameAddr(String, String),
    NameCat(String, Option<String>),
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::NameAddr(name, addr) => write!(f, "name+addr({}, {})", name, addr),
            GroupKey::NameCat(name, Some(cat)) => write!(f, "name+cat({}, {})", name, cat),
            GroupKey::NameCat(name, None) => write!(f, "name+cat({}, -)", name),
        }
    }
}

/// Trim and lowercase; empty results collapse to `None`.
fn norm(value: Option<&str>) -> Option<String> {
    let s = value?.trim().to_lowercase();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Grouping key for one row, or `None` when the row has no usable name.
pub fn group_key(place: &Place) -> Option<GroupKey> {
    let name = norm(Some(&place.name))?;
    match norm(place.address.as_deref()) {
        Some(address) => Some(GroupKey::NameAddr(name, address)),
        None => Some(GroupKey::NameCat(name, norm(place.category.as_deref()))),
    }
}

/// Count of non-empty merge fields; higher means "more data".
pub fn completeness(place: &Place) -> usize {
    MERGE_FIELDS
        .iter()
        .filter(|f| !f.get(place).is_empty())
        .count()
}

/// One duplicate group's resolution: update the survivor, delete the rest.
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub key: GroupKey,
    pub survivor_id: i64,
    pub updates: Vec<(MergeField, FieldValue)>,
    pub delete_ids: Vec<i64>,
}

/// Pick the group member with the highest completeness score, breaking
/// ties toward the lowest id so the choice is stable across input order.
fn choose_survivor<'a>(rows: &[&'a Place]) -> &'a Place {
    rows.iter()
        .copied()
        .max_by(|a, b| {
            completeness(a)
                .cmp(&completeness(b))
                .then(b.id.cmp(&a.id))
        })
        .expect("group is never empty")
}

/// Compute merge plans for every duplicate group among `rows`.
///
/// Groups of size 1 produce no plan. Backfill donors are consulted in
/// ascending id order and only fill fields the survivor left empty; the
/// survivor's own values are never replaced.
pub fn plan_merges(rows: &[Place]) -> Vec<MergePlan> {
    let mut buckets: HashMap<GroupKey, Vec<&Place>> = HashMap::new();
    for row in rows {
        match group_key(row) {
            Some(key) => buckets.entry(key).or_default().push(row),
            None => debug!("Skipping row {} with empty name", row.id),
        }
    }

    let mut plans = Vec::new();
    for (key, mut members) in buckets {
        if members.len() <= 1 {
            continue;
        }
        members.sort_by_key(|p| p.id);

        let survivor = choose_survivor(&members);
        let donors: Vec<&Place> = members
            .iter()
            .copied()
            .filter(|p| p.id != survivor.id)
            .collect();

        let mut updates = Vec::new();
        for field in MERGE_FIELDS {
            if !field.get(survivor).is_empty() {
                continue;
            }
            if let Some(value) = donors
                .iter()
                .map(|d| field.get(d))
                .find(|v| !v.is_empty())
            {
                updates.push((field, value));
            }
        }

        plans.push(MergePlan {
            key,
            survivor_id: survivor.id,
            updates,
            delete_ids: donors.iter().map(|d| d.id).collect(),
        });
    }

    // HashMap iteration order is arbitrary; fix the apply order.
    plans.sort_by_key(|p| p.survivor_id);
    plans
}

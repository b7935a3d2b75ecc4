//! Reference graph queries and user-count auditing.

use std::collections::{BTreeMap, HashMap};

use datablock_types::EntityId;

use crate::store::Store;

/// A stored user count that disagrees with the live references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMismatch {
    pub id: EntityId,
    pub name: String,
    pub stored: u32,
    pub expected: u32,
}

impl Store {
    /// Entities holding references to `target`, with how many each holds.
    pub fn referrers(&self, target: EntityId) -> Vec<(EntityId, usize)> {
        let mut out: BTreeMap<EntityId, usize> = BTreeMap::new();
        for entity in self.entities.values() {
            let count = entity.references().iter().filter(|id| **id == target).count();
            if count > 0 {
                out.insert(entity.id, count);
            }
        }
        out.into_iter().collect()
    }

    /// `(holder, target)` pairs whose target is not in the store.
    ///
    /// Only hand-edited or truncated files produce these.
    pub fn dangling_references(&self) -> Vec<(EntityId, EntityId)> {
        let mut out: Vec<(EntityId, EntityId)> = self
            .entities
            .values()
            .flat_map(|e| e.references().into_iter().map(move |target| (e.id, target)))
            .filter(|(_, target)| !self.entities.contains_key(target))
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Live references plus runtime pins, per entity.
    fn expected_users(&self) -> HashMap<EntityId, u32> {
        let mut counts: HashMap<EntityId, u32> = self
            .entities
            .values()
            .map(|e| (e.id, e.pins))
            .collect();
        for entity in self.entities.values() {
            for id in entity.references() {
                if let Some(count) = counts.get_mut(&id) {
                    *count += 1;
                }
            }
        }
        counts
    }

    /// Rebuilds every user count from the stored references.
    pub fn recount_users(&mut self) {
        let counts = self.expected_users();
        for (id, users) in counts {
            if let Some(entity) = self.entities.get_mut(&id) {
                entity.users = users;
            }
        }
    }

    /// Every entity whose stored user count is wrong; empty when consistent.
    pub fn audit_users(&self) -> Vec<UserMismatch> {
        let counts = self.expected_users();
        let mut out: Vec<UserMismatch> = self
            .entities
            .values()
            .filter_map(|e| {
                let expected = counts.get(&e.id).copied().unwrap_or_default();
                (e.users != expected).then(|| UserMismatch {
                    id: e.id,
                    name: e.name.clone(),
                    stored: e.users,
                    expected,
                })
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

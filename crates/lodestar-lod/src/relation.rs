//! Bidirectional entity ↔ combiner membership.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ids::{CombinerId, EntityId};

/// Which combiner each entity belongs to, and which entities each combiner holds.
///
/// An entity belongs to at most one combiner.
#[derive(Debug, Default)]
pub struct RelationTable {
    combiner_of: FxHashMap<EntityId, CombinerId>,
    members_of: FxHashMap<CombinerId, FxHashSet<EntityId>>,
}

impl RelationTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `entity` to `combiner`, replacing any previous assignment.
    pub fn link(&mut self, entity: EntityId, combiner: CombinerId) {
        self.unlink(entity);
        self.combiner_of.insert(entity, combiner);
        self.members_of.entry(combiner).or_default().insert(entity);
    }

    /// Remove `entity`'s assignment, returning the combiner it belonged to.
    pub fn unlink(&mut self, entity: EntityId) -> Option<CombinerId> {
        let combiner = self.combiner_of.remove(&entity)?;
        if let Some(members) = self.members_of.get_mut(&combiner) {
            members.remove(&entity);
            if members.is_empty() {
                self.members_of.remove(&combiner);
            }
        }
        Some(combiner)
    }

    /// Combiner `entity` belongs to.
    pub fn combiner_of(&self, entity: EntityId) -> Option<CombinerId> {
        self.combiner_of.get(&entity).copied()
    }

    /// Entities assigned to `combiner`.
    pub fn members(&self, combiner: CombinerId) -> impl Iterator<Item = EntityId> + '_ {
        self.members_of
            .get(&combiner)
            .into_iter()
            .flat_map(|m| m.iter().copied())
    }

    /// Number of entities assigned to `combiner`.
    pub fn member_count(&self, combiner: CombinerId) -> usize {
        self.members_of.get(&combiner).map_or(0, FxHashSet::len)
    }

    /// Number of assigned entities.
    pub fn len(&self) -> usize {
        self.combiner_of.len()
    }

    /// Whether no entity is assigned.
    pub fn is_empty(&self) -> bool {
        self.combiner_of.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids() -> (Vec<EntityId>, Vec<CombinerId>) {
        let mut entities: SlotMap<EntityId, ()> = SlotMap::with_key();
        let mut combiners: SlotMap<CombinerId, ()> = SlotMap::with_key();
        (
            (0..3).map(|_| entities.insert(())).collect(),
            (0..2).map(|_| combiners.insert(())).collect(),
        )
    }

    #[test]
    fn test_link_is_bidirectional() {
        let (e, c) = ids();
        let mut table = RelationTable::new();
        table.link(e[0], c[0]);
        table.link(e[1], c[0]);
        assert_eq!(table.combiner_of(e[0]), Some(c[0]));
        assert_eq!(table.member_count(c[0]), 2);
        assert_eq!(table.member_count(c[1]), 0);
        assert_eq!(table.combiner_of(e[2]), None);
    }

    /// Relinking moves the entity instead of duplicating it.
    #[test]
    fn test_relink_moves_entity() {
        let (e, c) = ids();
        let mut table = RelationTable::new();
        table.link(e[0], c[0]);
        table.link(e[0], c[1]);
        assert_eq!(table.member_count(c[0]), 0);
        assert_eq!(table.members(c[1]).collect::<Vec<_>>(), vec![e[0]]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unlink_empties_table() {
        let (e, c) = ids();
        let mut table = RelationTable::new();
        table.link(e[0], c[0]);
        table.link(e[1], c[0]);
        table.link(e[2], c[1]);
        assert_eq!(table.unlink(e[2]), Some(c[1]));
        assert_eq!(table.unlink(e[2]), None);

        assert_eq!(table.member_count(c[1]), 0);
        assert_eq!(table.member_count(c[0]), 2);

        table.unlink(e[0]);
        table.unlink(e[1]);
        assert_eq!(table.combiner_of(e[1]), None);
        assert!(table.is_empty());
    }
}

use datablock_types::{EntityId, IdKind, LibraryId};

use crate::entity::{Entity, EntityData};

/// Read-only view of a store, handed to poll predicates and type checks.
pub trait EntityLookup {
    fn entity(&self, id: EntityId) -> Option<&Entity>;

    fn find(&self, kind: IdKind, name: &str, library: Option<LibraryId>) -> Option<&Entity>;
}

/// Decides whether `candidate` should be offered for a pointer property.
///
/// Polls only filter interactive selection lists. Programmatic writes never
/// consult them; strict type checks are done by the schema registry instead.
pub trait PointerPoll: Send + Sync {
    fn poll(&self, lookup: &dyn EntityLookup, holder: &Entity, candidate: &Entity) -> bool;
}

impl<F> PointerPoll for F
where
    F: Fn(&dyn EntityLookup, &Entity, &Entity) -> bool + Send + Sync,
{
    fn poll(&self, lookup: &dyn EntityLookup, holder: &Entity, candidate: &Entity) -> bool {
        self(lookup, holder, candidate)
    }
}

/// Offers an action only to holders of the kind it was made for.
///
/// Actions without an `id_root` are floating library members and are offered
/// to everyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionIdRootPoll;

impl PointerPoll for ActionIdRootPoll {
    fn poll(&self, _lookup: &dyn EntityLookup, holder: &Entity, candidate: &Entity) -> bool {
        match &candidate.data {
            EntityData::Action(action) => action.id_root.is_none_or(|root| root == holder.kind),
            _ => false,
        }
    }
}

/// A lookup with no entities, for contexts that never hold references.
pub(crate) struct NoEntities;

impl EntityLookup for NoEntities {
    fn entity(&self, _id: EntityId) -> Option<&Entity> {
        None
    }

    fn find(&self, _kind: IdKind, _name: &str, _library: Option<LibraryId>) -> Option<&Entity> {
        None
    }
}

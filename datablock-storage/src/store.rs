//! The entity store: creation, naming, lifecycle and ownership.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use datablock_model::{
    ActionData, Entity, EntityData, EntityLookup, LinkTag, NodeTree, SchemaRegistry,
};
use datablock_types::{EntityId, IdKind, LibraryId, unique_name};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

const DEFAULT_NAME: &str = "Untitled";

type NameKey = (IdKind, Option<LibraryId>, String);

/// A foreign store that entities were linked from.
///
/// Every entity linked from the same file carries the same [`LibraryId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub id: LibraryId,
    /// File name of the library, for display.
    pub name: String,
    /// Canonical absolute path.
    pub path: PathBuf,
}

/// In-memory store of uniquely named entities.
///
/// All mutation goes through `&mut self`; callers serialize access.
#[derive(Debug)]
pub struct Store {
    pub(crate) entities: HashMap<EntityId, Entity>,
    pub(crate) names: HashMap<NameKey, EntityId>,
    pub(crate) libraries: Vec<Library>,
    pub(crate) schema: SchemaRegistry,
    pub(crate) config: StoreConfig,
    pub(crate) filepath: Option<PathBuf>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(SchemaRegistry::new(), StoreConfig::default())
    }
}

impl Store {
    #[must_use]
    pub fn new(schema: SchemaRegistry, config: StoreConfig) -> Self {
        Self {
            entities: HashMap::new(),
            names: HashMap::new(),
            libraries: Vec::new(),
            schema,
            config,
            filepath: None,
        }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path the store was last opened from or saved to.
    pub fn filepath(&self) -> Option<&Path> {
        self.filepath.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Like [`Store::get`], but a missing entity is an error.
    pub fn entity(&self, id: EntityId) -> StoreResult<&Entity> {
        self.entities.get(&id).ok_or(StoreError::EntityNotFound(id))
    }

    pub fn find(&self, kind: IdKind, name: &str, library: Option<LibraryId>) -> Option<&Entity> {
        self.names
            .get(&(kind, library, name.to_string()))
            .and_then(|id| self.entities.get(id))
    }

    /// Entities of `kind`, local ones first, then by library and name.
    pub fn entities_of(&self, kind: IdKind) -> Vec<&Entity> {
        let mut out: Vec<&Entity> = self.entities.values().filter(|e| e.kind == kind).collect();
        out.sort_by(|a, b| {
            (a.library.is_some(), self.library_sort_key(a.library), &a.name).cmp(&(
                b.library.is_some(),
                self.library_sort_key(b.library),
                &b.name,
            ))
        });
        out
    }

    fn library_sort_key(&self, library: Option<LibraryId>) -> Option<&Path> {
        library.and_then(|id| self.library(id)).map(|l| l.path.as_path())
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    pub fn library(&self, id: LibraryId) -> Option<&Library> {
        self.libraries.iter().find(|l| l.id == id)
    }

    pub fn library_by_path(&self, path: &Path) -> Option<&Library> {
        self.libraries.iter().find(|l| l.path == path)
    }

    // ── Creation ─────────────────────────────────────────────────

    /// Creates a local entity with zero users; the name is disambiguated.
    pub fn create(&mut self, kind: IdKind, name: &str) -> EntityId {
        self.insert_local(Entity::new(kind, name))
    }

    pub fn create_node_tree(&mut self, name: &str, tree_type: &str) -> EntityId {
        let mut entity = Entity::new(IdKind::NodeTree, name);
        entity.data = EntityData::NodeTree(NodeTree::new(tree_type));
        self.insert_local(entity)
    }

    /// Creates an action restricted to animating entities of `id_root`.
    pub fn create_action(&mut self, name: &str, id_root: Option<IdKind>) -> EntityId {
        let mut entity = Entity::new(IdKind::Action, name);
        entity.data = EntityData::Action(ActionData { id_root });
        self.insert_local(entity)
    }

    /// Adds a detached entity to the local namespace without touching users.
    pub(crate) fn insert_local(&mut self, mut entity: Entity) -> EntityId {
        entity.library = None;
        entity.link_tag = None;
        entity.name = self.free_name(entity.kind, None, &entity.name);
        debug!(kind = %entity.kind, name = %entity.name, "created entity");
        self.index(entity)
    }

    /// Indexes an entity under its current name, which must be free.
    pub(crate) fn index(&mut self, entity: Entity) -> EntityId {
        let id = entity.id;
        self.names
            .insert((entity.kind, entity.library, entity.name.clone()), id);
        self.entities.insert(id, entity);
        id
    }

    pub(crate) fn free_name(
        &self,
        kind: IdKind,
        library: Option<LibraryId>,
        requested: &str,
    ) -> String {
        let requested = if requested.is_empty() {
            DEFAULT_NAME
        } else {
            requested
        };
        unique_name(requested, self.config.max_name_len, |candidate| {
            self.names
                .contains_key(&(kind, library, candidate.to_string()))
        })
    }

    // ── Mutation guards ──────────────────────────────────────────

    /// Mutable access to a local entity; linked entities are read-only.
    pub(crate) fn local_mut(&mut self, id: EntityId) -> StoreResult<&mut Entity> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(StoreError::EntityNotFound(id))?;
        if entity.is_linked() {
            return Err(StoreError::ImmutableLibraryData {
                kind: entity.kind,
                name: entity.name.clone(),
            });
        }
        Ok(entity)
    }

    pub(crate) fn ensure_local(&self, id: EntityId) -> StoreResult<&Entity> {
        let entity = self.entity(id)?;
        if entity.is_linked() {
            return Err(StoreError::ImmutableLibraryData {
                kind: entity.kind,
                name: entity.name.clone(),
            });
        }
        Ok(entity)
    }

    fn ensure_kind(&self, id: EntityId, expected: IdKind) -> StoreResult<&Entity> {
        let entity = self.entity(id)?;
        if entity.kind != expected {
            return Err(StoreError::WrongKind {
                expected,
                found: entity.kind,
            });
        }
        Ok(entity)
    }

    // ── Naming ───────────────────────────────────────────────────

    /// Renames a local entity and returns the name it ended up with.
    ///
    /// A clash gives the renamed entity a numeric suffix; the holder of the
    /// requested name keeps it.
    pub fn rename(&mut self, id: EntityId, name: &str) -> StoreResult<String> {
        let entity = self.ensure_local(id)?;
        if entity.name == name {
            return Ok(entity.name.clone());
        }
        let kind = entity.kind;
        let old = entity.name.clone();
        self.names.remove(&(kind, None, old.clone()));
        let new = self.free_name(kind, None, name);
        self.names.insert((kind, None, new.clone()), id);
        self.local_mut(id)?.name = new.clone();
        debug!(%kind, %old, %new, "renamed entity");
        Ok(new)
    }

    // ── Runtime pins ─────────────────────────────────────────────

    /// Adds a runtime user that is not a stored reference.
    pub fn retain(&mut self, id: EntityId) -> StoreResult<u32> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(StoreError::EntityNotFound(id))?;
        entity.pins += 1;
        entity.users += 1;
        Ok(entity.users)
    }

    /// Drops a runtime user added by [`Store::retain`].
    ///
    /// Reaching zero users never frees the entity; see [`Store::delete`].
    pub fn release(&mut self, id: EntityId) -> StoreResult<u32> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(StoreError::EntityNotFound(id))?;
        debug_assert!(entity.pins > 0, "release without retain on {}", entity.name);
        if entity.pins > 0 {
            entity.pins -= 1;
            entity.users = entity.users.saturating_sub(1);
        }
        Ok(entity.users)
    }

    // ── Ownership ────────────────────────────────────────────────

    /// Whether a scene's collection holds `id`.
    pub fn is_directly_owned(&self, id: EntityId) -> bool {
        self.entities
            .values()
            .any(|e| e.owned_objects().contains(&id))
    }

    /// Scenes whose collection holds `id`.
    pub fn owners_of(&self, id: EntityId) -> Vec<EntityId> {
        let mut owners: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| e.owned_objects().contains(&id))
            .map(|e| e.id)
            .collect();
        owners.sort();
        owners
    }

    /// Adds an object to a scene's collection. Returns `false` if it was already there.
    pub fn link_object(&mut self, scene: EntityId, object: EntityId) -> StoreResult<bool> {
        self.ensure_kind(object, IdKind::Object)?;
        self.ensure_kind(scene, IdKind::Scene)?;
        let Some(data) = self.local_mut(scene)?.scene_mut() else {
            return Ok(false);
        };
        if data.objects.contains(&object) {
            return Ok(false);
        }
        data.objects.push(object);
        Ok(true)
    }

    /// Removes an object from a scene's collection. Returns `false` if it wasn't there.
    pub fn unlink_object(&mut self, scene: EntityId, object: EntityId) -> StoreResult<bool> {
        self.ensure_kind(scene, IdKind::Scene)?;
        let Some(data) = self.local_mut(scene)?.scene_mut() else {
            return Ok(false);
        };
        let before = data.objects.len();
        data.objects.retain(|o| *o != object);
        Ok(data.objects.len() != before)
    }

    // ── Nodes ────────────────────────────────────────────────────

    /// Enables or disables the compositing tree of a scene.
    ///
    /// The default tree is created the first time nodes are enabled and kept
    /// afterwards.
    pub fn set_use_nodes(&mut self, scene: EntityId, use_nodes: bool) -> StoreResult<()> {
        self.ensure_kind(scene, IdKind::Scene)?;
        if let Some(data) = self.local_mut(scene)?.scene_mut() {
            data.use_nodes = use_nodes;
            if use_nodes && data.node_tree.is_none() {
                data.node_tree = Some(NodeTree::compositor_default());
            }
        }
        Ok(())
    }

    /// Adds a node to a node tree or scene tree and returns its unique name.
    pub fn add_node(&mut self, id: EntityId, node_type: &str, name: &str) -> StoreResult<String> {
        let max_len = self.config.max_name_len;
        let entity = self.local_mut(id)?;
        let name = if name.is_empty() { node_type } else { name };
        let tree = entity
            .node_tree_mut()
            .ok_or_else(|| StoreError::PathNotFound(format!("{id} has no node tree")))?;
        Ok(tree.add_node(node_type, name, max_len))
    }

    /// Removes a node and releases every reference its custom data held.
    pub fn remove_node(&mut self, id: EntityId, name: &str) -> StoreResult<()> {
        let entity = self.local_mut(id)?;
        let node = entity
            .node_tree_mut()
            .and_then(|tree| tree.remove_node(name))
            .ok_or_else(|| StoreError::PathNotFound(format!("{id}/nodes[\"{name}\"]")))?;
        let mut refs = Vec::new();
        node.properties.collect_references(&mut refs);
        self.release_refs(&refs);
        Ok(())
    }

    // ── Deletion ─────────────────────────────────────────────────

    /// Deletes an entity with no users that no scene owns.
    ///
    /// References held by the deleted entity are released. Deleting a scene
    /// gives up ownership of its objects without deleting them.
    pub fn delete(&mut self, id: EntityId) -> StoreResult<()> {
        let entity = self.entity(id)?;
        let owned = self.is_directly_owned(id);
        if entity.users > 0 || owned {
            return Err(StoreError::StillInUse {
                name: entity.name.clone(),
                users: entity.users,
                owned,
            });
        }
        self.remove_unchecked(id);
        Ok(())
    }

    fn remove_unchecked(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.remove(&id) {
            self.names
                .remove(&(entity.kind, entity.library, entity.name.clone()));
            self.release_refs(&entity.references());
            debug!(kind = %entity.kind, name = %entity.name, "deleted entity");
        }
    }

    /// Deletes every entity that nothing in use can reach.
    ///
    /// Scenes, pinned entities and directly linked entities are in use, along
    /// with everything their references and scene collections lead to.
    /// Unreachable reference cycles are deleted too. Returns the deleted ids in
    /// deletion order.
    pub fn purge_orphans(&mut self) -> Vec<EntityId> {
        let reachable = self.reachable();
        let mut purged: Vec<EntityId> = self
            .entities
            .keys()
            .filter(|id| !reachable.contains(id))
            .copied()
            .collect();
        purged.sort();
        for id in &purged {
            self.remove_unchecked(*id);
        }
        self.libraries
            .retain(|lib| self.entities.values().any(|e| e.library == Some(lib.id)));
        info!(count = purged.len(), "purged orphan entities");
        purged
    }

    /// Ids reachable from the roots kept by [`Store::purge_orphans`].
    pub(crate) fn reachable(&self) -> HashSet<EntityId> {
        let mut stack: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| {
                e.kind == IdKind::Scene || e.pins > 0 || e.link_tag == Some(LinkTag::Direct)
            })
            .map(|e| e.id)
            .collect();
        let mut seen = HashSet::with_capacity(self.entities.len());
        while let Some(id) = stack.pop() {
            let Some(entity) = self.entities.get(&id) else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            stack.extend(entity.references());
            stack.extend_from_slice(entity.owned_objects());
        }
        seen
    }

    /// Turns a linked entity into an editable local one.
    ///
    /// Its name is disambiguated in the local namespace; entities it refers to
    /// stay linked.
    pub fn make_local(&mut self, id: EntityId) -> StoreResult<String> {
        let entity = self.entity(id)?;
        let Some(library) = entity.library else {
            return Ok(entity.name.clone());
        };
        let kind = entity.kind;
        let old = entity.name.clone();
        let new = self.free_name(kind, None, &old);
        self.names.remove(&(kind, Some(library), old));
        self.names.insert((kind, None, new.clone()), id);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.library = None;
            entity.link_tag = None;
            entity.name = new.clone();
        }
        debug!(%kind, name = %new, "made entity local");
        Ok(new)
    }

    // ── Reference bookkeeping ────────────────────────────────────

    /// Counts one user per listed reference.
    pub(crate) fn acquire_refs(&mut self, refs: &[EntityId]) {
        for id in refs {
            if let Some(target) = self.entities.get_mut(id) {
                target.users += 1;
            }
        }
    }

    /// Drops one user per listed reference.
    pub(crate) fn release_refs(&mut self, refs: &[EntityId]) {
        for id in refs {
            if let Some(target) = self.entities.get_mut(id) {
                debug_assert!(target.users > 0, "user count underflow on {}", target.name);
                target.users = target.users.saturating_sub(1);
            }
        }
    }
}

impl EntityLookup for Store {
    fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    fn find(&self, kind: IdKind, name: &str, library: Option<LibraryId>) -> Option<&Entity> {
        Store::find(self, kind, name, library)
    }
}

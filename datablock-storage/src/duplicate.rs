//! Entity copies and scene duplication.
//!
//! A plain copy re-points every reference at the original target. A full
//! scene copy also copies the objects the scene owns and then rewrites
//! references between copied entities so they point at the new copies:
//!
//! 1. copy the scene and every member object, recording old -> new ids
//! 2. rewrite references and membership of the copies through that table
//! 3. count the references of the copies
//!
//! References to entities outside the scene keep pointing at the originals.

use std::collections::HashMap;

use datablock_model::{Entity, NodeTree, SceneData};
use datablock_types::{EntityId, IdKind};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// How [`Store::duplicate_scene`] treats the scene's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCopy {
    /// Settings and custom data only: no objects, and a default compositing
    /// tree if the source uses nodes.
    Empty,
    /// Share the objects with the source scene.
    LinkCopy,
    /// Copy the objects too, remapping references between copies.
    FullCopy,
}

/// Old id -> new id for one duplication.
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    map: HashMap<EntityId, EntityId>,
}

impl TranslationTable {
    pub fn insert(&mut self, old: EntityId, new: EntityId) {
        self.map.insert(old, new);
    }

    pub fn get(&self, old: EntityId) -> Option<EntityId> {
        self.map.get(&old).copied()
    }

    /// `id`'s copy, or `id` itself when it was not copied.
    pub fn translate(&self, id: EntityId) -> EntityId {
        self.get(id).unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn copies(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.map.values().copied()
    }
}

impl Store {
    /// Creates an independent local copy of an entity.
    ///
    /// Custom data is deep-copied while every reference in it keeps pointing
    /// at the original target, which gains one user per copied reference. A
    /// copied scene shares its objects and gets its own compositing tree.
    pub fn copy(&mut self, id: EntityId) -> StoreResult<EntityId> {
        let source = self.entity(id)?;
        let copy = source.detached_copy(source.name.clone());
        let refs = copy.references();
        let new_id = self.insert_local(copy);
        self.acquire_refs(&refs);
        debug!(source = %id, copy = %new_id, "copied entity");
        Ok(new_id)
    }

    /// Creates a new scene from an existing one.
    pub fn duplicate_scene(&mut self, id: EntityId, mode: SceneCopy) -> StoreResult<EntityId> {
        let source = self.entity(id)?;
        if source.kind != IdKind::Scene {
            return Err(StoreError::WrongKind {
                expected: IdKind::Scene,
                found: source.kind,
            });
        }
        match mode {
            SceneCopy::Empty => {
                let mut copy = source.detached_copy(source.name.clone());
                if let Some(scene) = copy.scene_mut() {
                    *scene = SceneData {
                        objects: Vec::new(),
                        use_nodes: scene.use_nodes,
                        node_tree: scene.use_nodes.then(NodeTree::compositor_default),
                    };
                }
                let mut refs = Vec::new();
                copy.properties.collect_references(&mut refs);
                let new_id = self.insert_local(copy);
                self.acquire_refs(&refs);
                Ok(new_id)
            }
            SceneCopy::LinkCopy => self.copy(id),
            SceneCopy::FullCopy => {
                let table = self.full_copy(id)?;
                Ok(table.translate(id))
            }
        }
    }

    /// Copies a scene and its objects; returns the translation it used.
    fn full_copy(&mut self, scene: EntityId) -> StoreResult<TranslationTable> {
        let source = self.entity(scene)?;
        let members = source.owned_objects().to_vec();

        let mut table = TranslationTable::default();
        let mut pending: Vec<Entity> = Vec::with_capacity(members.len() + 1);
        for old in std::iter::once(scene).chain(members) {
            if table.get(old).is_some() {
                continue;
            }
            let original = self.entity(old)?;
            let copy = original.detached_copy(original.name.clone());
            table.insert(old, copy.id);
            pending.push(copy);
        }

        for copy in &mut pending {
            copy.remap_references(&mut |id| table.translate(id));
            copy.remap_owned(&mut |id| table.translate(id));
        }

        let mut refs = Vec::new();
        for copy in pending {
            refs.extend(copy.references());
            self.insert_local(copy);
        }
        self.acquire_refs(&refs);
        debug!(source = %scene, copies = table.len(), "full scene copy");
        Ok(table)
    }
}

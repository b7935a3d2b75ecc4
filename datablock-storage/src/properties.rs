//! Custom data and declared properties on entities and nested structures.
//!
//! Every write goes through [`Store::set`] or one of the collection helpers,
//! which swap the stored value and then adjust user counts: references in the
//! new value are acquired, references in the old value released. Nothing
//! else touches property bags of stored entities.

use std::fmt;

use datablock_model::{
    DeclShape, Entity, NODE_STRUCT, PointerPoll, PropertyBag, PropertyKind, SchemaRegistry,
    StructBuilder, Value,
};
use datablock_types::{EntityId, IdKind};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// One step from a bag to a bag nested inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A node of the entity's node tree. Only valid as the first step.
    Node(String),
    /// The group stored under a key.
    Group(String),
    /// An element of the collection stored under a key.
    Item(String, usize),
}

/// Addresses a property bag: an entity's own, a node's, or a nested one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    pub entity: EntityId,
    pub segments: Vec<Segment>,
}

impl PropertyPath {
    pub fn entity(entity: EntityId) -> Self {
        Self {
            entity,
            segments: Vec::new(),
        }
    }

    #[must_use]
    pub fn node(mut self, name: impl Into<String>) -> Self {
        self.segments.push(Segment::Node(name.into()));
        self
    }

    #[must_use]
    pub fn group(mut self, key: impl Into<String>) -> Self {
        self.segments.push(Segment::Group(key.into()));
        self
    }

    #[must_use]
    pub fn item(mut self, key: impl Into<String>, index: usize) -> Self {
        self.segments.push(Segment::Item(key.into(), index));
        self
    }
}

impl From<EntityId> for PropertyPath {
    fn from(entity: EntityId) -> Self {
        Self::entity(entity)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entity)?;
        for segment in &self.segments {
            match segment {
                Segment::Node(name) => write!(f, ".nodes[\"{name}\"]")?,
                Segment::Group(key) => write!(f, "[\"{key}\"]")?,
                Segment::Item(key, index) => write!(f, "[\"{key}\"][{index}]")?,
            }
        }
        Ok(())
    }
}

/// A bag reached by a path, or the struct type of one that doesn't exist yet.
struct Resolved<'a> {
    owner: Option<String>,
    bag: Option<&'a PropertyBag>,
}

fn not_found(path: &PropertyPath) -> StoreError {
    StoreError::PathNotFound(path.to_string())
}

/// Read-only walk. Declared groups that were never written resolve to an
/// absent bag of their declared type.
fn resolve<'a>(
    schema: &SchemaRegistry,
    entity: &'a Entity,
    path: &PropertyPath,
) -> StoreResult<Resolved<'a>> {
    let mut segments = path.segments.as_slice();
    let mut current = Resolved {
        owner: Some(entity.kind.struct_name().to_string()),
        bag: Some(&entity.properties),
    };
    if let Some((Segment::Node(name), rest)) = segments.split_first() {
        let node = entity
            .node_tree()
            .and_then(|tree| tree.node(name))
            .ok_or_else(|| not_found(path))?;
        current = Resolved {
            owner: Some(NODE_STRUCT.to_string()),
            bag: Some(&node.properties),
        };
        segments = rest;
    }

    for segment in segments {
        current = match segment {
            Segment::Node(_) => return Err(not_found(path)),
            Segment::Group(key) => match current.bag.and_then(|b| b.get(key)) {
                Some(Value::Group(group)) => Resolved {
                    owner: group.type_name.clone(),
                    bag: Some(&group.properties),
                },
                Some(_) => return Err(not_found(path)),
                None => match declared_default(schema, current.owner.as_deref(), key) {
                    Some(Value::Group(group)) => Resolved {
                        owner: group.type_name,
                        bag: None,
                    },
                    _ => return Err(not_found(path)),
                },
            },
            Segment::Item(key, index) => match current.bag.and_then(|b| b.get(key)) {
                Some(Value::Collection(collection)) => Resolved {
                    owner: Some(collection.element_type.clone()),
                    bag: Some(collection.get(*index).ok_or_else(|| not_found(path))?),
                },
                _ => return Err(not_found(path)),
            },
        };
    }
    Ok(current)
}

fn declared_default(schema: &SchemaRegistry, owner: Option<&str>, key: &str) -> Option<Value> {
    owner.and_then(|owner| schema.default_value(owner, key))
}

/// Mutable walk. Declared groups are materialized on the way down.
fn resolve_mut<'a>(
    schema: &SchemaRegistry,
    entity: &'a mut Entity,
    path: &PropertyPath,
) -> StoreResult<(Option<String>, &'a mut PropertyBag)> {
    let segments = path.segments.as_slice();
    match segments.split_first() {
        Some((Segment::Node(name), rest)) => {
            let node = entity
                .node_tree_mut()
                .and_then(|tree| tree.node_mut(name))
                .ok_or_else(|| not_found(path))?;
            descend_mut(
                schema,
                Some(NODE_STRUCT.to_string()),
                &mut node.properties,
                rest,
                path,
            )
        }
        _ => {
            let owner = Some(entity.kind.struct_name().to_string());
            descend_mut(schema, owner, &mut entity.properties, segments, path)
        }
    }
}

fn descend_mut<'a>(
    schema: &SchemaRegistry,
    owner: Option<String>,
    bag: &'a mut PropertyBag,
    segments: &[Segment],
    path: &PropertyPath,
) -> StoreResult<(Option<String>, &'a mut PropertyBag)> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok((owner, bag));
    };
    match first {
        Segment::Node(_) => Err(not_found(path)),
        Segment::Group(key) => {
            if !bag.contains_key(key) {
                match declared_default(schema, owner.as_deref(), key) {
                    Some(value @ Value::Group(_)) => {
                        bag.insert(key.clone(), value);
                    }
                    _ => return Err(not_found(path)),
                }
            }
            match bag.get_mut(key) {
                Some(Value::Group(group)) => {
                    let owner = group.type_name.clone();
                    descend_mut(schema, owner, &mut group.properties, rest, path)
                }
                _ => Err(not_found(path)),
            }
        }
        Segment::Item(key, index) => match bag.get_mut(key) {
            Some(Value::Collection(collection)) => {
                let owner = Some(collection.element_type.clone());
                let item = collection
                    .items
                    .get_mut(*index)
                    .ok_or_else(|| not_found(path))?;
                descend_mut(schema, owner, item, rest, path)
            }
            _ => Err(not_found(path)),
        },
    }
}

impl Store {
    /// Mutable bag at `path` together with its struct type.
    fn bag_mut(
        &mut self,
        path: &PropertyPath,
    ) -> StoreResult<(Option<String>, &mut PropertyBag)> {
        let entity = self
            .entities
            .get_mut(&path.entity)
            .ok_or(StoreError::EntityNotFound(path.entity))?;
        if entity.is_linked() {
            return Err(StoreError::ImmutableLibraryData {
                kind: entity.kind,
                name: entity.name.clone(),
            });
        }
        resolve_mut(&self.schema, entity, path)
    }

    // ── Reading ──────────────────────────────────────────────────

    /// Reads `key` from the bag at `path`.
    ///
    /// Declared properties that were never written read as their default;
    /// unset entity pointers read as `None`.
    pub fn get_property(&self, path: &PropertyPath, key: &str) -> StoreResult<Option<Value>> {
        let entity = self.entity(path.entity)?;
        let resolved = resolve(&self.schema, entity, path)?;
        if let Some(value) = resolved.bag.and_then(|bag| bag.get(key)) {
            return Ok(Some(value.clone()));
        }
        Ok(declared_default(&self.schema, resolved.owner.as_deref(), key))
    }

    /// The entity `key` points at, if it holds a reference.
    pub fn get_entity(&self, path: &PropertyPath, key: &str) -> StoreResult<Option<&Entity>> {
        let value = self.get_property(path, key)?;
        Ok(value
            .and_then(|v| v.as_entity())
            .and_then(|id| self.entities.get(&id)))
    }

    /// Whether `key` is stored at `path` or declared on its struct.
    pub fn has_property(&self, path: &PropertyPath, key: &str) -> StoreResult<bool> {
        let entity = self.entity(path.entity)?;
        let resolved = resolve(&self.schema, entity, path)?;
        let stored = resolved.bag.is_some_and(|bag| bag.contains_key(key));
        let declared = resolved
            .owner
            .as_deref()
            .is_some_and(|owner| self.schema.has_property(owner, key));
        Ok(stored || declared)
    }

    // ── Writing ──────────────────────────────────────────────────

    /// Writes `value` under `key`, adjusting user counts of old and new targets.
    ///
    /// Declared properties are type checked; a pointer's poll predicate is not
    /// consulted. Every referenced entity must exist.
    pub fn set(
        &mut self,
        path: &PropertyPath,
        key: &str,
        value: impl Into<Value>,
    ) -> StoreResult<()> {
        let value = value.into();
        let entity = self.ensure_local(path.entity)?;
        for id in value.references() {
            self.entity(id)?;
        }
        let owner = resolve(&self.schema, entity, path)?.owner;
        let value = self
            .schema
            .check_assignment(owner.as_deref(), key, value, &*self)?;
        let new_refs = value.references();

        let (_, bag) = self.bag_mut(path)?;
        let old = bag.insert(key, value);
        self.acquire_refs(&new_refs);
        if let Some(old) = old {
            self.release_refs(&old.references());
        }
        Ok(())
    }

    /// Removes `key` from the bag at `path`, releasing what it referenced.
    pub fn clear(&mut self, path: &PropertyPath, key: &str) -> StoreResult<Option<Value>> {
        let (_, bag) = self.bag_mut(path)?;
        let old = bag.remove(key);
        if let Some(old) = &old {
            self.release_refs(&old.references());
        }
        Ok(old)
    }

    // ── Collections ──────────────────────────────────────────────

    /// Appends an empty element to the collection under `key` and returns its index.
    pub fn collection_add(&mut self, path: &PropertyPath, key: &str) -> StoreResult<usize> {
        let entity = self.ensure_local(path.entity)?;
        let owner = resolve(&self.schema, entity, path)?.owner;
        let default = declared_default(&self.schema, owner.as_deref(), key);
        let (_, bag) = self.bag_mut(path)?;
        if !bag.contains_key(key) {
            match default {
                Some(value @ Value::Collection(_)) => {
                    bag.insert(key, value);
                }
                _ => {
                    return Err(StoreError::UnknownProperty {
                        owner: owner.unwrap_or_default(),
                        property: key.to_string(),
                    });
                }
            }
        }
        match bag.get_mut(key) {
            Some(Value::Collection(collection)) => Ok(collection.push_empty()),
            _ => Err(StoreError::NotACollection {
                property: key.to_string(),
            }),
        }
    }

    /// Removes one element, releasing every reference it held.
    pub fn collection_remove(
        &mut self,
        path: &PropertyPath,
        key: &str,
        index: usize,
    ) -> StoreResult<()> {
        let (_, bag) = self.bag_mut(path)?;
        let removed = match bag.get_mut(key) {
            Some(Value::Collection(collection)) => collection.remove(index).ok_or_else(|| {
                StoreError::PathNotFound(format!("{path}[\"{key}\"][{index}]"))
            })?,
            _ => {
                return Err(StoreError::NotACollection {
                    property: key.to_string(),
                });
            }
        };
        let mut refs = Vec::new();
        removed.collect_references(&mut refs);
        self.release_refs(&refs);
        Ok(())
    }

    pub fn collection_len(&self, path: &PropertyPath, key: &str) -> StoreResult<usize> {
        match self.get_property(path, key)? {
            Some(Value::Collection(collection)) => Ok(collection.len()),
            _ => Err(StoreError::NotACollection {
                property: key.to_string(),
            }),
        }
    }

    // ── Declarations ─────────────────────────────────────────────

    pub fn declare(
        &mut self,
        owner: &str,
        identifier: &str,
        kind: PropertyKind,
    ) -> StoreResult<()> {
        self.schema.declare(owner, identifier, kind)?;
        debug!(%owner, %identifier, "declared property");
        Ok(())
    }

    /// Registers a struct with all its properties, or nothing on error.
    pub fn register(&mut self, builder: StructBuilder) -> StoreResult<()> {
        self.schema.register(builder)?;
        Ok(())
    }

    /// Removes a declaration and drops every value stored under it.
    ///
    /// Values are dropped wherever a bag of type `owner` exists: entity roots,
    /// nodes, nested groups and collection elements, linked entities included.
    pub fn undeclare(&mut self, owner: &str, identifier: &str) -> StoreResult<()> {
        self.schema.undeclare(owner, identifier)?;

        let mut dropped = Vec::new();
        let mut drop_values = |ty: Option<&str>, bag: &mut PropertyBag| {
            if ty == Some(owner) {
                if let Some(value) = bag.remove(identifier) {
                    value.collect_references(&mut dropped);
                }
            }
        };
        for entity in self.entities.values_mut() {
            let kind = entity.kind.struct_name();
            entity.properties.visit_bags_mut(Some(kind), &mut drop_values);
            if let Some(tree) = entity.node_tree_mut() {
                for node in &mut tree.nodes {
                    node.properties
                        .visit_bags_mut(Some(NODE_STRUCT), &mut drop_values);
                }
            }
        }
        self.release_refs(&dropped);
        debug!(%owner, %identifier, released = dropped.len(), "undeclared property");
        Ok(())
    }

    // ── Selection ────────────────────────────────────────────────

    /// Entities offered for the pointer `key` at `path`, filtered by its poll.
    pub fn pointer_candidates(
        &self,
        path: &PropertyPath,
        key: &str,
    ) -> StoreResult<Vec<EntityId>> {
        let (holder, target, decl_owner) = self.pointer_decl(path, key)?;
        let poll = self
            .schema
            .lookup(&decl_owner, key)
            .and_then(|decl| decl.poll().cloned());
        Ok(self
            .entities_of(target)
            .into_iter()
            .filter(|candidate| match &poll {
                Some(poll) => poll.poll(self, holder, candidate),
                None => true,
            })
            .map(|candidate| candidate.id)
            .collect())
    }

    /// Whether `candidate` would be offered for the pointer `key` at `path`.
    pub fn poll_pointer(
        &self,
        path: &PropertyPath,
        key: &str,
        candidate: EntityId,
    ) -> StoreResult<bool> {
        let (holder, target, decl_owner) = self.pointer_decl(path, key)?;
        let candidate = self.entity(candidate)?;
        if candidate.kind != target {
            return Ok(false);
        }
        Ok(self
            .schema
            .lookup(&decl_owner, key)
            .and_then(|decl| decl.poll())
            .is_none_or(|poll| poll.poll(self, holder, candidate)))
    }

    fn pointer_decl(
        &self,
        path: &PropertyPath,
        key: &str,
    ) -> StoreResult<(&Entity, IdKind, String)> {
        let holder = self.entity(path.entity)?;
        let owner = resolve(&self.schema, holder, path)?
            .owner
            .unwrap_or_default();
        match self.schema.lookup(&owner, key).map(|decl| &decl.shape) {
            Some(DeclShape::EntityPointer(kind)) => Ok((holder, *kind, owner)),
            _ => Err(StoreError::UnknownProperty {
                owner,
                property: key.to_string(),
            }),
        }
    }
}

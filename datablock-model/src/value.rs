//! Custom-data values.
//!
//! A [`PropertyBag`] is the ordered key→[`Value`] mapping attached to every
//! entity, node and nested structure. Declared properties and ad-hoc custom
//! data share the same bag; the schema registry decides which keys are typed.

use datablock_types::EntityId;
use serde::{Deserialize, Serialize};

/// A single custom-data value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    /// A counted reference to another entity.
    Entity(EntityId),
    /// A nested structure owned by the holder.
    Group(PropertyGroup),
    /// An ordered list of owned structures.
    Collection(PropertyCollection),
}

impl Value {
    /// Short name of the variant, used in type-mismatch messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Entity(_) => "entity",
            Self::Group(_) => "group",
            Self::Collection(_) => "collection",
        }
    }

    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Self::Entity(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Floats, and ints widened to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&PropertyGroup> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&PropertyCollection> {
        match self {
            Self::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Appends every entity reference held by this value, at any depth.
    pub fn collect_references(&self, out: &mut Vec<EntityId>) {
        match self {
            Self::Entity(id) => out.push(*id),
            Self::Group(g) => g.properties.collect_references(out),
            Self::Collection(c) => {
                for item in &c.items {
                    item.collect_references(out);
                }
            }
            Self::Int(_) | Self::Float(_) | Self::Bool(_) | Self::String(_) => {}
        }
    }

    /// Every entity reference held by this value.
    pub fn references(&self) -> Vec<EntityId> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    pub fn contains_references(&self) -> bool {
        match self {
            Self::Entity(_) => true,
            Self::Group(g) => g.properties.contains_references(),
            Self::Collection(c) => c.items.iter().any(PropertyBag::contains_references),
            Self::Int(_) | Self::Float(_) | Self::Bool(_) | Self::String(_) => false,
        }
    }

    /// Rewrites every entity reference held by this value.
    pub fn remap_references(&mut self, f: &mut dyn FnMut(EntityId) -> EntityId) {
        match self {
            Self::Entity(id) => *id = f(*id),
            Self::Group(g) => g.properties.remap_references(f),
            Self::Collection(c) => {
                for item in &mut c.items {
                    item.remap_references(f);
                }
            }
            Self::Int(_) | Self::Float(_) | Self::Bool(_) | Self::String(_) => {}
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Self::Entity(id)
    }
}

impl From<PropertyGroup> for Value {
    fn from(g: PropertyGroup) -> Self {
        Self::Group(g)
    }
}

/// Ordered key→value mapping. Overwriting a key keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag {
    entries: Vec<(String, Value)>,
}

impl PropertyBag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Inserts or overwrites `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        match self.position(&key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn collect_references(&self, out: &mut Vec<EntityId>) {
        for (_, value) in &self.entries {
            value.collect_references(out);
        }
    }

    pub fn contains_references(&self) -> bool {
        self.entries.iter().any(|(_, v)| v.contains_references())
    }

    pub fn remap_references(&mut self, f: &mut dyn FnMut(EntityId) -> EntityId) {
        for (_, value) in &mut self.entries {
            value.remap_references(f);
        }
    }

    /// Visits this bag and every nested bag, passing each one's struct type.
    ///
    /// `own_type` is the struct name describing `self`; nested groups report
    /// their `type_name`, collection items their `element_type`. The visitor
    /// runs on a bag before its children, so entries it removes are not visited.
    pub fn visit_bags_mut(
        &mut self,
        own_type: Option<&str>,
        f: &mut dyn FnMut(Option<&str>, &mut PropertyBag),
    ) {
        f(own_type, self);
        for (_, value) in &mut self.entries {
            match value {
                Value::Group(PropertyGroup {
                    type_name,
                    properties,
                }) => properties.visit_bags_mut(type_name.as_deref(), f),
                Value::Collection(PropertyCollection {
                    element_type,
                    items,
                }) => {
                    for item in items {
                        item.visit_bags_mut(Some(element_type.as_str()), f);
                    }
                }
                _ => {}
            }
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut bag = PropertyBag::new();
        for (k, v) in iter {
            bag.insert(k, v);
        }
        bag
    }
}

/// A nested structure: typed when it backs a declared group pointer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub properties: PropertyBag,
}

impl PropertyGroup {
    /// An ad-hoc group with no schema.
    #[must_use]
    pub fn untyped(properties: PropertyBag) -> Self {
        Self {
            type_name: None,
            properties,
        }
    }

    /// An empty group described by the struct `type_name`.
    #[must_use]
    pub fn typed(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            properties: PropertyBag::new(),
        }
    }
}

/// A collection-of-struct value. Items have no identity of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyCollection {
    pub element_type: String,
    #[serde(default)]
    pub items: Vec<PropertyBag>,
}

impl PropertyCollection {
    #[must_use]
    pub fn new(element_type: impl Into<String>) -> Self {
        Self {
            element_type: element_type.into(),
            items: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PropertyBag> {
        self.items.get(index)
    }

    /// Appends an empty element and returns its index.
    pub fn push_empty(&mut self) -> usize {
        self.items.push(PropertyBag::new());
        self.items.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Option<PropertyBag> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }
}

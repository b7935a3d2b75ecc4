use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use datablock_types::IdKind;

use crate::entity::Entity;
use crate::error::{AssignError, PermissionDenied, SchemaError, TypeMismatch};
use crate::handler::{ActionIdRootPoll, EntityLookup, PointerPoll};
use crate::value::{PropertyCollection, PropertyGroup, Value};

/// Name of the embedded struct describing nodes of a node tree.
pub const NODE_STRUCT: &str = "Node";

/// What a struct is, which fixes what its properties may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructClass {
    /// An entity type such as `Object` or `Scene`.
    IdType(IdKind),
    /// A user-defined record stored inside entities.
    PropertyGroup,
    /// A structure embedded in an entity payload (nodes).
    Embedded,
    /// Parameters of a command invocation; never persisted.
    Operator,
    /// A row of a UI list; never persisted.
    UiList,
    /// Add-on preferences; persisted outside any store.
    AddonPreferences,
}

impl StructClass {
    /// Whether values of this struct may hold counted entity references.
    pub fn supports_entity_refs(self) -> bool {
        matches!(self, Self::IdType(_) | Self::PropertyGroup | Self::Embedded)
    }

    /// Whether a pointer property may target this struct as an entity.
    pub fn is_linkable(self) -> bool {
        matches!(self, Self::IdType(_))
    }

    pub fn is_persistent(self) -> bool {
        !matches!(self, Self::Operator | Self::UiList)
    }
}

/// The kind of a property declaration.
#[derive(Clone)]
pub enum PropertyKind {
    Int,
    Float,
    Bool,
    String,
    /// Pointer to an entity type (a counted reference) or to a property group
    /// (a nested structure owned by the holder).
    Pointer {
        target: String,
        poll: Option<Arc<dyn PointerPoll>>,
    },
    /// Collection of property-group records.
    Collection { element: String },
}

impl PropertyKind {
    pub fn pointer(target: impl Into<String>) -> Self {
        Self::Pointer {
            target: target.into(),
            poll: None,
        }
    }

    /// A pointer whose selection list is filtered by `poll`.
    pub fn pointer_with_poll<F>(target: impl Into<String>, poll: F) -> Self
    where
        F: Fn(&dyn EntityLookup, &Entity, &Entity) -> bool + Send + Sync + 'static,
    {
        Self::Pointer {
            target: target.into(),
            poll: Some(Arc::new(poll)),
        }
    }

    pub fn pointer_with(target: impl Into<String>, poll: Arc<dyn PointerPoll>) -> Self {
        Self::Pointer {
            target: target.into(),
            poll: Some(poll),
        }
    }

    pub fn collection(element: impl Into<String>) -> Self {
        Self::Collection {
            element: element.into(),
        }
    }
}

impl fmt::Debug for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => f.write_str("Int"),
            Self::Float => f.write_str("Float"),
            Self::Bool => f.write_str("Bool"),
            Self::String => f.write_str("String"),
            Self::Pointer { target, poll } => f
                .debug_struct("Pointer")
                .field("target", target)
                .field("poll", &poll.is_some())
                .finish(),
            Self::Collection { element } => f
                .debug_struct("Collection")
                .field("element", element)
                .finish(),
        }
    }
}

/// A declaration resolved against the registry at declaration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclShape {
    Int,
    Float,
    Bool,
    String,
    EntityPointer(IdKind),
    GroupPointer(String),
    Collection(String),
}

impl DeclShape {
    fn label(&self) -> String {
        match self {
            Self::Int => "int".into(),
            Self::Float => "float".into(),
            Self::Bool => "bool".into(),
            Self::String => "string".into(),
            Self::EntityPointer(kind) => kind.struct_name().into(),
            Self::GroupPointer(name) => format!("group {name}"),
            Self::Collection(name) => format!("collection of {name}"),
        }
    }

    /// The struct this shape embeds, if any.
    fn embedded_struct(&self) -> Option<&str> {
        match self {
            Self::GroupPointer(name) | Self::Collection(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropertyDecl {
    pub identifier: String,
    pub kind: PropertyKind,
    pub shape: DeclShape,
    pub builtin: bool,
}

impl PropertyDecl {
    pub fn poll(&self) -> Option<&Arc<dyn PointerPoll>> {
        match &self.kind {
            PropertyKind::Pointer { poll, .. } => poll.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub class: StructClass,
    pub properties: Vec<PropertyDecl>,
}

impl StructDef {
    pub fn property(&self, identifier: &str) -> Option<&PropertyDecl> {
        self.properties.iter().find(|p| p.identifier == identifier)
    }
}

/// Builder for registering a struct together with its properties.
///
/// Registration is all-or-nothing: if any property is illegal, the struct is
/// not registered at all.
#[derive(Debug, Clone)]
pub struct StructBuilder {
    name: String,
    class: StructClass,
    properties: Vec<(String, PropertyKind)>,
}

impl StructBuilder {
    pub fn new(name: impl Into<String>, class: StructClass) -> Self {
        Self {
            name: name.into(),
            class,
            properties: Vec::new(),
        }
    }

    #[must_use]
    pub fn property(mut self, identifier: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.push((identifier.into(), kind));
        self
    }
}

/// Typed property declarations per struct.
///
/// Entity types, the embedded `Node` struct and the built-in pointers
/// (`Object.parent`, `Object.action`, `Scene.camera`) are registered by
/// [`SchemaRegistry::new`]. Everything else is declared at runtime.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    structs: HashMap<String, StructDef>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            structs: HashMap::new(),
        };
        for kind in IdKind::ALL {
            registry.insert_struct(kind.struct_name(), StructClass::IdType(kind));
        }
        registry.insert_struct(NODE_STRUCT, StructClass::Embedded);

        let builtins = [
            ("Object", "parent", PropertyKind::pointer("Object")),
            (
                "Object",
                "action",
                PropertyKind::pointer_with("Action", Arc::new(ActionIdRootPoll)),
            ),
            ("Scene", "camera", PropertyKind::pointer("Object")),
        ];
        for (owner, identifier, kind) in builtins {
            let Ok(shape) = registry.resolve_shape(&kind) else {
                continue;
            };
            if let Some(def) = registry.structs.get_mut(owner) {
                def.properties.push(PropertyDecl {
                    identifier: identifier.to_string(),
                    kind,
                    shape,
                    builtin: true,
                });
            }
        }
        registry
    }

    fn insert_struct(&mut self, name: &str, class: StructClass) {
        self.structs.insert(
            name.to_string(),
            StructDef {
                name: name.to_string(),
                class,
                properties: Vec::new(),
            },
        );
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.get(name)
    }

    pub fn lookup(&self, owner: &str, identifier: &str) -> Option<&PropertyDecl> {
        self.structs.get(owner)?.property(identifier)
    }

    pub fn has_property(&self, owner: &str, identifier: &str) -> bool {
        self.lookup(owner, identifier).is_some()
    }

    pub fn register_struct(
        &mut self,
        name: impl Into<String>,
        class: StructClass,
    ) -> Result<(), SchemaError> {
        let name = name.into();
        validate_identifier(&name)?;
        if self.structs.contains_key(&name) {
            return Err(SchemaError::AlreadyRegistered(name));
        }
        self.insert_struct(&name, class);
        Ok(())
    }

    /// Registers a struct and all its properties, or nothing at all.
    pub fn register(&mut self, builder: StructBuilder) -> Result<(), SchemaError> {
        let mut staged = self.clone();
        staged.register_struct(builder.name.clone(), builder.class)?;
        for (identifier, kind) in builder.properties {
            staged.declare(&builder.name, identifier, kind)?;
        }
        *self = staged;
        Ok(())
    }

    /// Removes a user-registered struct that no declaration refers to.
    pub fn unregister_struct(&mut self, name: &str) -> Result<StructDef, SchemaError> {
        let def = self
            .structs
            .get(name)
            .ok_or_else(|| SchemaError::UnknownStruct(name.to_string()))?;
        if matches!(def.class, StructClass::IdType(_) | StructClass::Embedded) {
            return Err(SchemaError::Builtin(name.to_string()));
        }
        for other in self.structs.values().filter(|d| d.name != name) {
            if let Some(decl) = other
                .properties
                .iter()
                .find(|p| p.shape.embedded_struct() == Some(name))
            {
                return Err(SchemaError::StructInUse {
                    name: name.to_string(),
                    used_by: format!("{}.{}", other.name, decl.identifier),
                });
            }
        }
        self.structs
            .remove(name)
            .ok_or_else(|| SchemaError::UnknownStruct(name.to_string()))
    }

    /// Declares a property on `owner`, checking capabilities eagerly.
    pub fn declare(
        &mut self,
        owner: &str,
        identifier: impl Into<String>,
        kind: PropertyKind,
    ) -> Result<(), SchemaError> {
        let identifier = identifier.into();
        validate_identifier(&identifier)?;
        let owner_def = self
            .structs
            .get(owner)
            .ok_or_else(|| SchemaError::UnknownStruct(owner.to_string()))?;
        if owner_def.property(&identifier).is_some() {
            return Err(SchemaError::AlreadyDeclared {
                owner: owner.to_string(),
                property: identifier,
            });
        }
        let owner_class = owner_def.class;

        let shape = self.resolve_shape(&kind)?;
        let holds_references = match &shape {
            DeclShape::EntityPointer(_) => true,
            DeclShape::GroupPointer(name) | DeclShape::Collection(name) => {
                self.can_hold_references(name)
            }
            _ => false,
        };
        if holds_references {
            if !owner_class.supports_entity_refs() {
                return Err(SchemaError::EntityRefsUnsupported {
                    owner: owner.to_string(),
                    property: identifier,
                });
            }
            if let Some(embedder) = self.restricted_embedder_of(owner) {
                return Err(SchemaError::EntityRefsUnsupported {
                    owner: embedder,
                    property: format!("{owner}.{identifier}"),
                });
            }
        }

        if let Some(def) = self.structs.get_mut(owner) {
            def.properties.push(PropertyDecl {
                identifier,
                kind,
                shape,
                builtin: false,
            });
        }
        Ok(())
    }

    /// Removes a declaration. Stored values are left for the caller to drop.
    pub fn undeclare(
        &mut self,
        owner: &str,
        identifier: &str,
    ) -> Result<PropertyDecl, SchemaError> {
        let def = self
            .structs
            .get_mut(owner)
            .ok_or_else(|| SchemaError::UnknownStruct(owner.to_string()))?;
        let index = def
            .properties
            .iter()
            .position(|p| p.identifier == identifier)
            .ok_or_else(|| SchemaError::UnknownProperty {
                owner: owner.to_string(),
                property: identifier.to_string(),
            })?;
        if def.properties[index].builtin {
            return Err(SchemaError::Builtin(format!("{owner}.{identifier}")));
        }
        Ok(def.properties.remove(index))
    }

    fn resolve_shape(&self, kind: &PropertyKind) -> Result<DeclShape, SchemaError> {
        Ok(match kind {
            PropertyKind::Int => DeclShape::Int,
            PropertyKind::Float => DeclShape::Float,
            PropertyKind::Bool => DeclShape::Bool,
            PropertyKind::String => DeclShape::String,
            PropertyKind::Pointer { target, .. } => {
                let def = self
                    .structs
                    .get(target)
                    .ok_or_else(|| SchemaError::UnknownStruct(target.clone()))?;
                match def.class {
                    StructClass::IdType(kind) => DeclShape::EntityPointer(kind),
                    StructClass::PropertyGroup => DeclShape::GroupPointer(target.clone()),
                    _ => {
                        return Err(SchemaError::TargetNotLinkable {
                            target: target.clone(),
                        });
                    }
                }
            }
            PropertyKind::Collection { element } => {
                let def = self
                    .structs
                    .get(element)
                    .ok_or_else(|| SchemaError::UnknownStruct(element.clone()))?;
                if def.class != StructClass::PropertyGroup {
                    return Err(SchemaError::InvalidCollectionElement {
                        element: element.clone(),
                    });
                }
                DeclShape::Collection(element.clone())
            }
        })
    }

    /// Whether values of `name` can hold entity references, through any nesting.
    pub fn can_hold_references(&self, name: &str) -> bool {
        let mut visited = HashSet::new();
        self.can_hold_references_inner(name, &mut visited)
    }

    fn can_hold_references_inner<'a>(
        &'a self,
        name: &'a str,
        visited: &mut HashSet<&'a str>,
    ) -> bool {
        if !visited.insert(name) {
            return false;
        }
        let Some(def) = self.structs.get(name) else {
            return false;
        };
        def.properties.iter().any(|p| match &p.shape {
            DeclShape::EntityPointer(_) => true,
            DeclShape::GroupPointer(inner) | DeclShape::Collection(inner) => {
                self.can_hold_references_inner(inner, visited)
            }
            _ => false,
        })
    }

    /// A struct without entity-reference support that embeds `group`, if any.
    fn restricted_embedder_of(&self, group: &str) -> Option<String> {
        self.structs
            .values()
            .filter(|d| !d.class.supports_entity_refs())
            .find(|d| {
                let mut visited = HashSet::new();
                self.embeds(&d.name, group, &mut visited)
            })
            .map(|d| d.name.clone())
    }

    fn embeds<'a>(&'a self, outer: &'a str, group: &str, visited: &mut HashSet<&'a str>) -> bool {
        if !visited.insert(outer) {
            return false;
        }
        let Some(def) = self.structs.get(outer) else {
            return false;
        };
        def.properties.iter().any(|p| match p.shape.embedded_struct() {
            Some(inner) => inner == group || self.embeds(inner, group, visited),
            None => false,
        })
    }

    /// Checks a write of `value` to `owner.key` and returns the value to store.
    ///
    /// `owner` is the struct describing the bag being written, `None` for
    /// ad-hoc groups. Undeclared keys are dynamic custom data and accept any
    /// value. Poll predicates are never consulted here.
    pub fn check_assignment(
        &self,
        owner: Option<&str>,
        key: &str,
        value: Value,
        lookup: &dyn EntityLookup,
    ) -> Result<Value, AssignError> {
        let Some(def) = owner.and_then(|o| self.structs.get(o)) else {
            return Ok(value);
        };
        if !def.class.supports_entity_refs() && value.contains_references() {
            return Err(PermissionDenied {
                owner: def.name.clone(),
                property: key.to_string(),
                reason: "struct cannot hold entity references".into(),
            }
            .into());
        }
        let Some(decl) = def.property(key) else {
            return Ok(value);
        };

        let mismatch = |found: String| -> AssignError {
            TypeMismatch {
                property: format!("{}.{}", def.name, key),
                expected: decl.shape.label(),
                found,
            }
            .into()
        };

        match (&decl.shape, value) {
            (DeclShape::Int, v @ Value::Int(_)) => Ok(v),
            (DeclShape::Float, v @ Value::Float(_)) => Ok(v),
            (DeclShape::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (DeclShape::Bool, v @ Value::Bool(_)) => Ok(v),
            (DeclShape::String, v @ Value::String(_)) => Ok(v),
            (DeclShape::EntityPointer(expected), Value::Entity(id)) => match lookup.entity(id) {
                Some(target) if target.kind == *expected => Ok(Value::Entity(id)),
                Some(target) => Err(mismatch(target.kind.struct_name().to_string())),
                None => Err(mismatch(format!("missing entity {id}"))),
            },
            (DeclShape::GroupPointer(_) | DeclShape::Collection(_), _) => Err(PermissionDenied {
                owner: def.name.clone(),
                property: key.to_string(),
                reason: "nested structures are not assignable".into(),
            }
            .into()),
            (_, other) => Err(mismatch(other.type_name().to_string())),
        }
    }

    /// The value a declared-but-unset property reads as.
    ///
    /// Unset entity pointers read as `None`.
    pub fn default_value(&self, owner: &str, key: &str) -> Option<Value> {
        match &self.lookup(owner, key)?.shape {
            DeclShape::Int => Some(Value::Int(0)),
            DeclShape::Float => Some(Value::Float(0.0)),
            DeclShape::Bool => Some(Value::Bool(false)),
            DeclShape::String => Some(Value::String(String::new())),
            DeclShape::EntityPointer(_) => None,
            DeclShape::GroupPointer(name) => Some(Value::Group(PropertyGroup::typed(name.clone()))),
            DeclShape::Collection(name) => {
                Some(Value::Collection(PropertyCollection::new(name.clone())))
            }
        }
    }
}

fn validate_identifier(identifier: &str) -> Result<(), SchemaError> {
    let mut chars = identifier.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(identifier.to_string()))
    }
}

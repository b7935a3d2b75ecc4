//! Entity model for datablock stores.
//!
//! Defines the types every store operation works with:
//! - [`Entity`]: a uniquely named unit of data with custom properties
//! - [`Value`] / [`PropertyBag`]: custom data, including counted references
//! - [`SchemaRegistry`]: typed property declarations and their checks
//! - [`PointerPoll`]: selection filters for pointer properties
//!
//! Storage, linking and file I/O live in `datablock-storage`.

mod entity;
mod error;
mod handler;
mod schema;
mod transient;
mod value;

pub use entity::{
    ActionData, COMPOSITOR_TREE_TYPE, Entity, EntityData, LinkTag, Node, NodeTree, SceneData,
};
pub use error::{AssignError, PermissionDenied, SchemaError, TypeMismatch};
pub use handler::{ActionIdRootPoll, EntityLookup, PointerPoll};
pub use schema::{
    DeclShape, NODE_STRUCT, PropertyDecl, PropertyKind, SchemaRegistry, StructBuilder, StructClass,
    StructDef,
};
pub use transient::TransientProperties;
pub use value::{PropertyBag, PropertyCollection, PropertyGroup, Value};

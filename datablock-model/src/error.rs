//! Error types for schema declaration and property assignment.

use thiserror::Error;

/// An illegal property declaration, reported at declaration time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unknown struct: {0}")]
    UnknownStruct(String),

    #[error("struct already registered: {0}")]
    AlreadyRegistered(String),

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("property '{property}' already declared on '{owner}'")]
    AlreadyDeclared { owner: String, property: String },

    #[error("property '{property}' is not declared on '{owner}'")]
    UnknownProperty { owner: String, property: String },

    #[error("'{owner}' doesn't support entity references (property '{property}')")]
    EntityRefsUnsupported { owner: String, property: String },

    #[error("pointer target '{target}' is not a linkable entity type or property group")]
    TargetNotLinkable { target: String },

    #[error("collection element '{element}' is not a property group")]
    InvalidCollectionElement { element: String },

    #[error("'{0}' is built in and cannot be removed")]
    Builtin(String),

    #[error("struct '{name}' is still used by '{used_by}'")]
    StructInUse { name: String, used_by: String },
}

/// A value of the wrong type written to a strictly typed property.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("type mismatch for '{property}': expected {expected}, found {found}")]
pub struct TypeMismatch {
    pub property: String,
    pub expected: String,
    pub found: String,
}

/// A write rejected because of a type-level restriction on the holder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("write to '{owner}.{property}' rejected: {reason}")]
pub struct PermissionDenied {
    pub owner: String,
    pub property: String,
    pub reason: String,
}

/// Failure of [`crate::SchemaRegistry::check_assignment`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    #[error(transparent)]
    Type(#[from] TypeMismatch),

    #[error(transparent)]
    PermissionDenied(#[from] PermissionDenied),
}

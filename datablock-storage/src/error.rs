//! Error types for the storage layer.

use std::path::PathBuf;

use datablock_model::{AssignError, PermissionDenied, SchemaError, TypeMismatch};
use datablock_types::{EntityId, IdKind, LibraryId};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Illegal property declaration.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Wrong value type for a strictly typed property.
    #[error(transparent)]
    Type(#[from] TypeMismatch),

    /// Write rejected by a type-level restriction.
    #[error(transparent)]
    PermissionDenied(#[from] PermissionDenied),

    /// Attempted mutation of an entity linked from a library.
    #[error("{kind} '{name}' is linked library data and cannot be modified")]
    ImmutableLibraryData { kind: IdKind, name: String },

    /// Library load failed; the store was left unchanged.
    #[error(transparent)]
    LinkLoad(#[from] LinkLoadError),

    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// A property path that doesn't address an existing structure.
    #[error("property path not found: {0}")]
    PathNotFound(String),

    #[error("property '{property}' is not declared on '{owner}'")]
    UnknownProperty { owner: String, property: String },

    #[error("property '{property}' is not a collection")]
    NotACollection { property: String },

    /// Deletion refused because the entity is referenced or owned.
    #[error("'{name}' is still in use ({users} users, owned: {owned})")]
    StillInUse {
        name: String,
        users: u32,
        owned: bool,
    },

    #[error("expected {expected}, found {found}")]
    WrongKind { expected: IdKind, found: IdKind },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unknown file format or version.
    #[error("invalid file: {0}")]
    Format(String),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// A config value outside its allowed range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl From<AssignError> for StoreError {
    fn from(err: AssignError) -> Self {
        match err {
            AssignError::Type(e) => Self::Type(e),
            AssignError::PermissionDenied(e) => Self::PermissionDenied(e),
        }
    }
}

/// Reasons a library could not be linked.
#[derive(Debug, Error)]
pub enum LinkLoadError {
    #[error("cannot read library {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("{kind} '{name}' not found in library {}", library.display())]
    MissingEntity {
        kind: IdKind,
        name: String,
        library: PathBuf,
    },

    /// A library entity refers to an id the library doesn't contain.
    #[error("library {} has a dangling reference to {id}", library.display())]
    DanglingReference { library: PathBuf, id: EntityId },

    /// A saved file names a library id it doesn't declare.
    #[error("unknown library id {0}")]
    UnknownLibrary(LibraryId),
}

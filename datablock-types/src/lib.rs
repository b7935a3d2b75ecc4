//! Core type definitions for datablock.
//!
//! This crate defines the plugin-agnostic vocabulary shared by every other
//! datablock crate:
//! - Entity and library identifiers (UUID v7)
//! - The closed set of entity kinds ([`IdKind`])
//! - Deterministic name disambiguation (`Name`, `Name.001`, ...)
//!
//! Property values, entity payloads and the schema registry live in
//! `datablock-model`; the store itself lives in `datablock-storage`.

mod ids;
mod kind;
pub mod naming;

pub use ids::{EntityId, LibraryId};
pub use kind::IdKind;
pub use naming::{
    DEFAULT_MAX_NAME_LEN, MIN_NAME_LEN, split_numeric_suffix, truncate_name, unique_name,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("invalid name: {0}")]
    InvalidName(String),
}

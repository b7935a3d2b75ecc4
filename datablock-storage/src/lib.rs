//! Entity store for datablock.
//!
//! Holds entities in memory and keeps their user counts equal to the number
//! of live references at every point.
//!
//! # Architecture
//!
//! - [`Store`] owns entities, the name index and the library arena
//! - Property writes go through one path that adjusts user counts
//! - Copies re-point references; full scene copies remap internal ones
//! - Linking pulls entities from library files as read-only data
//! - Files are JSON; linked data is stored as stubs and re-linked on open

mod config;
mod duplicate;
mod error;
mod file;
mod linker;
mod properties;
mod references;
mod store;

pub use config::StoreConfig;
pub use duplicate::{SceneCopy, TranslationTable};
pub use error::{LinkLoadError, StoreError, StoreResult};
pub use linker::{LinkOutcome, LinkRequest};
pub use properties::{PropertyPath, Segment};
pub use references::UserMismatch;
pub use store::{Library, Store};

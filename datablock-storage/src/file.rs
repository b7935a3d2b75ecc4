//! Saved store files.
//!
//! A file is a JSON document holding the local entities in full and every
//! linked entity as a stub naming its library. Stubs are re-linked from their
//! libraries on open under the ids they had when saved, so references into
//! library data survive the round trip unchanged. User counts are never
//! written; they are recounted on open.

use std::path::{Path, PathBuf};

use datablock_model::{Entity, LinkTag, SchemaRegistry};
use datablock_types::{EntityId, IdKind, LibraryId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::error::{LinkLoadError, StoreError, StoreResult};
use crate::linker::StubRequest;
use crate::store::{Library, Store};

pub(crate) const FORMAT: &str = "datablock";
pub(crate) const VERSION: u32 = 1;

/// Prefix marking a path relative to the directory of the file holding it.
const RELATIVE_PREFIX: &str = "//";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Document {
    pub format: String,
    pub version: u32,
    #[serde(default)]
    pub libraries: Vec<LibraryRecord>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub links: Vec<LinkStub>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LibraryRecord {
    pub id: LibraryId,
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LinkStub {
    pub id: EntityId,
    pub kind: IdKind,
    pub name: String,
    pub library: LibraryId,
    pub tag: LinkTag,
}

/// Reads and validates a store file.
pub(crate) fn read_document(path: &Path) -> StoreResult<Document> {
    let contents = std::fs::read_to_string(path)?;
    let document: Document = serde_json::from_str(&contents)?;
    if document.format != FORMAT {
        return Err(StoreError::Format(format!(
            "unknown format '{}'",
            document.format
        )));
    }
    if document.version != VERSION {
        return Err(StoreError::Format(format!(
            "unsupported version {}",
            document.version
        )));
    }
    Ok(document)
}

/// Directory that relative paths stored in `file` are resolved against.
pub(crate) fn base_dir(file: &Path) -> StoreResult<PathBuf> {
    let parent = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(std::fs::canonicalize(parent)?)
}

pub(crate) fn encode_library_path(library: &Path, base: &Path, relative: bool) -> String {
    if relative {
        if let Ok(rest) = library.strip_prefix(base) {
            let rest = rest.to_string_lossy().replace('\\', "/");
            return format!("{RELATIVE_PREFIX}{rest}");
        }
    }
    library.to_string_lossy().into_owned()
}

pub(crate) fn decode_library_path(stored: &str, base: &Path) -> PathBuf {
    match stored.strip_prefix(RELATIVE_PREFIX) {
        Some(rest) => base.join(rest),
        None => PathBuf::from(stored),
    }
}

pub(crate) fn canonical_library_path(path: &Path) -> Result<PathBuf, LinkLoadError> {
    std::fs::canonicalize(path).map_err(|e| LinkLoadError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

impl Library {
    pub(crate) fn at(id: LibraryId, path: PathBuf) -> Self {
        Self {
            id,
            name: file_name(&path),
            path,
        }
    }
}

impl Store {
    /// Writes the store to `path` and remembers it as the store's file.
    pub fn save(&mut self, path: &Path) -> StoreResult<()> {
        let base = base_dir(path)?;

        let reachable = self
            .config
            .skip_orphans_on_save
            .then(|| self.reachable());
        let mut entities: Vec<&Entity> = self
            .entities
            .values()
            .filter(|e| !e.is_linked())
            .filter(|e| reachable.as_ref().is_none_or(|r| r.contains(&e.id)))
            .collect();
        entities.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));

        let mut links: Vec<LinkStub> = self
            .entities
            .values()
            .filter_map(|e| {
                Some(LinkStub {
                    id: e.id,
                    kind: e.kind,
                    name: e.name.clone(),
                    library: e.library?,
                    tag: e.link_tag.unwrap_or(LinkTag::Indirect),
                })
            })
            .collect();
        links.sort_by(|a, b| (a.library, a.kind, &a.name).cmp(&(b.library, b.kind, &b.name)));

        let libraries = self
            .libraries
            .iter()
            .filter(|lib| links.iter().any(|l| l.library == lib.id))
            .map(|lib| LibraryRecord {
                id: lib.id,
                path: encode_library_path(&lib.path, &base, self.config.relative_library_paths),
            })
            .collect();

        let skipped = self.entities.values().filter(|e| !e.is_linked()).count() - entities.len();
        let document = Document {
            format: FORMAT.to_string(),
            version: VERSION,
            libraries,
            entities: entities.into_iter().cloned().collect(),
            links,
        };
        let json = if self.config.compact_files {
            serde_json::to_string(&document)?
        } else {
            serde_json::to_string_pretty(&document)?
        };
        std::fs::write(path, json)?;
        self.filepath = Some(path.to_path_buf());

        if skipped > 0 {
            warn!(skipped, "left orphan entities out of saved file");
        }
        info!(
            path = %path.display(),
            entities = document.entities.len(),
            links = document.links.len(),
            "saved store"
        );
        Ok(())
    }

    /// Loads a store file, re-linking its library data.
    ///
    /// Fails with a link error when a library it needs is missing.
    pub fn open(path: &Path, schema: SchemaRegistry, config: StoreConfig) -> StoreResult<Store> {
        let document = read_document(path)?;
        let base = base_dir(path)?;
        let mut store = Store::new(schema, config);

        for record in &document.libraries {
            let resolved = decode_library_path(&record.path, &base);
            let canonical = canonical_library_path(&resolved)?;
            store.libraries.push(Library::at(record.id, canonical));
        }

        for mut entity in document.entities {
            entity.library = None;
            entity.link_tag = None;
            entity.users = 0;
            entity.pins = 0;
            entity.name = store.free_name(entity.kind, None, &entity.name);
            store.index(entity);
        }

        let mut stubs = Vec::with_capacity(document.links.len());
        for stub in document.links {
            let library = store
                .library(stub.library)
                .ok_or(LinkLoadError::UnknownLibrary(stub.library))?;
            stubs.push(StubRequest {
                path: library.path.clone(),
                kind: stub.kind,
                name: stub.name,
                id: stub.id,
                tag: stub.tag,
            });
        }
        store.relink(&stubs)?;
        store.recount_users();
        store.filepath = Some(path.to_path_buf());

        info!(
            path = %path.display(),
            entities = store.len(),
            libraries = store.libraries.len(),
            "opened store"
        );
        Ok(store)
    }
}

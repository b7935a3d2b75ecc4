//! Linking entities from library files.
//!
//! A link call runs a session against a read-only view of the store. Each
//! foreign entity it touches goes `Loading -> Linked`; references and scene
//! membership pull further entities in as indirect links, following nested
//! libraries where the library itself links them. Only a session that
//! finishes without error is committed, so a failed link leaves the store
//! as it was.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use datablock_model::{Entity, LinkTag};
use datablock_types::{EntityId, IdKind, LibraryId};
use tracing::{debug, info};

use crate::error::{LinkLoadError, StoreResult};
use crate::file::{base_dir, canonical_library_path, decode_library_path, read_document};
use crate::store::{Library, Store};

/// Entities to link from one library, by kind and name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkRequest {
    items: BTreeSet<(IdKind, String)>,
}

impl LinkRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, kind: IdKind, name: impl Into<String>) -> Self {
        self.insert(kind, name);
        self
    }

    pub fn insert(&mut self, kind: IdKind, name: impl Into<String>) {
        self.items.insert((kind, name.into()));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdKind, &str)> {
        self.items.iter().map(|(kind, name)| (*kind, name.as_str()))
    }
}

/// Local ids of the entities a [`LinkRequest`] asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkOutcome {
    linked: BTreeMap<(IdKind, String), EntityId>,
}

impl LinkOutcome {
    pub fn get(&self, kind: IdKind, name: &str) -> Option<EntityId> {
        self.linked.get(&(kind, name.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.linked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.linked.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdKind, &str, EntityId)> {
        self.linked
            .iter()
            .map(|((kind, name), id)| (*kind, name.as_str(), *id))
    }
}

/// A linked entity recorded in a saved file, to be re-linked under its old id.
#[derive(Debug, Clone)]
pub(crate) struct StubRequest {
    pub path: PathBuf,
    pub kind: IdKind,
    pub name: String,
    pub id: EntityId,
    pub tag: LinkTag,
}

#[derive(Debug, Clone, Copy)]
enum LinkState {
    Loading(EntityId),
    Linked(EntityId),
}

impl LinkState {
    fn id(self) -> EntityId {
        match self {
            Self::Loading(id) | Self::Linked(id) => id,
        }
    }
}

/// The parsed content of one library file.
struct Snapshot {
    path: PathBuf,
    entities: HashMap<EntityId, Entity>,
    names: HashMap<(IdKind, String), EntityId>,
    /// Entities the library links from elsewhere: id -> (library path, kind, name).
    stubs: HashMap<EntityId, (PathBuf, IdKind, String)>,
}

impl Snapshot {
    fn load(path: &Path) -> Result<Self, LinkLoadError> {
        let unreadable = |reason: String| LinkLoadError::Unreadable {
            path: path.to_path_buf(),
            reason,
        };
        let document = read_document(path).map_err(|e| unreadable(e.to_string()))?;
        let base = base_dir(path).map_err(|e| unreadable(e.to_string()))?;

        let libraries: HashMap<LibraryId, PathBuf> = document
            .libraries
            .iter()
            .map(|record| (record.id, decode_library_path(&record.path, &base)))
            .collect();
        let mut stubs = HashMap::new();
        for stub in document.links {
            let library = libraries
                .get(&stub.library)
                .ok_or(LinkLoadError::UnknownLibrary(stub.library))?;
            stubs.insert(stub.id, (library.clone(), stub.kind, stub.name));
        }

        let names = document
            .entities
            .iter()
            .map(|e| ((e.kind, e.name.clone()), e.id))
            .collect();
        let entities = document.entities.into_iter().map(|e| (e.id, e)).collect();
        Ok(Self {
            path: path.to_path_buf(),
            entities,
            names,
            stubs,
        })
    }
}

/// Everything a successful session adds to the store.
struct Staged {
    libraries: Vec<Library>,
    entities: Vec<Entity>,
    direct: HashSet<EntityId>,
}

struct LinkSession<'s> {
    store: &'s Store,
    snapshots: HashMap<PathBuf, Rc<Snapshot>>,
    libraries: Vec<Library>,
    states: HashMap<(LibraryId, IdKind, String), LinkState>,
    staged: Vec<Entity>,
    direct: HashSet<EntityId>,
    preassigned: HashMap<(PathBuf, IdKind, String), EntityId>,
}

impl<'s> LinkSession<'s> {
    fn new(store: &'s Store) -> Self {
        Self {
            store,
            snapshots: HashMap::new(),
            libraries: Vec::new(),
            states: HashMap::new(),
            staged: Vec::new(),
            direct: HashSet::new(),
            preassigned: HashMap::new(),
        }
    }

    /// The one library record for a canonical path, created on first use.
    fn library_id(&mut self, path: &Path) -> LibraryId {
        if let Some(library) = self.store.library_by_path(path) {
            return library.id;
        }
        if let Some(library) = self.libraries.iter().find(|l| l.path == path) {
            return library.id;
        }
        let library = Library::at(LibraryId::new(), path.to_path_buf());
        let id = library.id;
        self.libraries.push(library);
        id
    }

    fn snapshot(&mut self, path: &Path) -> Result<Rc<Snapshot>, LinkLoadError> {
        if let Some(snapshot) = self.snapshots.get(path) {
            return Ok(Rc::clone(snapshot));
        }
        let snapshot = Rc::new(Snapshot::load(path)?);
        self.snapshots.insert(path.to_path_buf(), Rc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Local id for the entity `kind`/`name` of the library at `path`.
    fn resolve(
        &mut self,
        path: &Path,
        kind: IdKind,
        name: &str,
        tag: LinkTag,
    ) -> StoreResult<EntityId> {
        let path = canonical_library_path(path)?;
        let library = self.library_id(&path);

        if let Some(existing) = self.store.find(kind, name, Some(library)) {
            if tag == LinkTag::Direct {
                self.direct.insert(existing.id);
            }
            return Ok(existing.id);
        }
        let key = (library, kind, name.to_string());
        if let Some(state) = self.states.get(&key) {
            let id = state.id();
            if tag == LinkTag::Direct {
                self.direct.insert(id);
            }
            return Ok(id);
        }

        let snapshot = self.snapshot(&path)?;
        let foreign = snapshot
            .names
            .get(&(kind, name.to_string()))
            .and_then(|id| snapshot.entities.get(id))
            .ok_or_else(|| LinkLoadError::MissingEntity {
                kind,
                name: name.to_string(),
                library: path.clone(),
            })?;

        let local_id = self
            .preassigned
            .get(&(path.clone(), kind, name.to_string()))
            .copied()
            .unwrap_or_else(EntityId::new);
        self.states.insert(key.clone(), LinkState::Loading(local_id));
        if tag == LinkTag::Direct {
            self.direct.insert(local_id);
        }

        let mut entity = foreign.clone();
        let mut dependencies = entity.references();
        dependencies.extend_from_slice(entity.owned_objects());
        let mut translation: HashMap<EntityId, EntityId> = HashMap::new();
        for dependency in dependencies {
            if translation.contains_key(&dependency) {
                continue;
            }
            let local = self.resolve_dependency(&snapshot, dependency)?;
            translation.insert(dependency, local);
        }
        let mut translate = |id: EntityId| translation.get(&id).copied().unwrap_or(id);
        entity.remap_references(&mut translate);
        entity.remap_owned(&mut translate);

        entity.id = local_id;
        entity.library = Some(library);
        entity.link_tag = Some(LinkTag::Indirect);
        entity.users = 0;
        entity.pins = 0;
        self.staged.push(entity);
        self.states.insert(key, LinkState::Linked(local_id));
        debug!(%kind, %name, library = %path.display(), "linked entity");
        Ok(local_id)
    }

    fn resolve_dependency(&mut self, snapshot: &Snapshot, id: EntityId) -> StoreResult<EntityId> {
        if let Some(entity) = snapshot.entities.get(&id) {
            return self.resolve(&snapshot.path, entity.kind, &entity.name, LinkTag::Indirect);
        }
        if let Some((path, kind, name)) = snapshot.stubs.get(&id) {
            return self.resolve(path, *kind, name, LinkTag::Indirect);
        }
        Err(LinkLoadError::DanglingReference {
            library: snapshot.path.clone(),
            id,
        }
        .into())
    }

    fn finish(self) -> Staged {
        Staged {
            libraries: self.libraries,
            entities: self.staged,
            direct: self.direct,
        }
    }
}

impl Store {
    /// Links the requested entities from the library file at `path`.
    ///
    /// Every entity from one library file shares the same [`LibraryId`].
    /// Entities linked earlier are reused. On error nothing is added.
    pub fn link(&mut self, path: &Path, request: &LinkRequest) -> StoreResult<LinkOutcome> {
        let mut session = LinkSession::new(self);
        let mut outcome = LinkOutcome::default();
        for (kind, name) in request.iter() {
            let id = session.resolve(path, kind, name, LinkTag::Direct)?;
            outcome.linked.insert((kind, name.to_string()), id);
        }
        let staged = session.finish();
        let added = staged.entities.len();
        self.commit(staged);
        info!(
            library = %path.display(),
            requested = request.len(),
            added,
            "linked library data"
        );
        Ok(outcome)
    }

    /// Re-links saved stubs under their saved ids.
    pub(crate) fn relink(&mut self, stubs: &[StubRequest]) -> StoreResult<()> {
        let mut session = LinkSession::new(self);
        for stub in stubs {
            let path = canonical_library_path(&stub.path)?;
            session
                .preassigned
                .insert((path, stub.kind, stub.name.clone()), stub.id);
        }
        for stub in stubs {
            session.resolve(&stub.path, stub.kind, &stub.name, stub.tag)?;
        }
        let staged = session.finish();
        self.commit(staged);
        Ok(())
    }

    fn commit(&mut self, staged: Staged) {
        self.libraries.extend(staged.libraries);
        let mut refs = Vec::new();
        for mut entity in staged.entities {
            if staged.direct.contains(&entity.id) {
                entity.link_tag = Some(LinkTag::Direct);
            }
            refs.extend(entity.references());
            self.index(entity);
        }
        for id in &staged.direct {
            if let Some(entity) = self.entities.get_mut(id) {
                if entity.link_tag == Some(LinkTag::Indirect) {
                    entity.link_tag = Some(LinkTag::Direct);
                }
            }
        }
        self.acquire_refs(&refs);
    }
}

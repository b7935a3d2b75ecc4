//! Command-line inspection and editing of datablock store files.
//!
//! Every command opens a store file, optionally changes it and writes the
//! result to a new file. Commands return their report as a string so they can
//! be driven from tests without a process.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use datablock_model::{Entity, LinkTag, SchemaRegistry};
use datablock_storage::{LinkRequest, SceneCopy, Store, StoreConfig};
use datablock_types::IdKind;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "datablock")]
#[command(about = "Inspect and edit datablock store files")]
pub struct Args {
    /// Store configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// List entities per kind with user counts and libraries
    Inspect { file: PathBuf },

    /// Check user counts and references; fails on any inconsistency
    Audit { file: PathBuf },

    /// Link scenes and objects from a library file
    Link {
        file: PathBuf,
        #[arg(long)]
        library: PathBuf,
        #[arg(long)]
        scene: Vec<String>,
        #[arg(long)]
        object: Vec<String>,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Create a new scene from an existing one
    DuplicateScene {
        file: PathBuf,
        scene: String,
        #[arg(long, value_enum, default_value_t = CopyMode::FullCopy)]
        mode: CopyMode,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Delete unused entities
    Purge {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    Empty,
    LinkCopy,
    FullCopy,
}

impl From<CopyMode> for SceneCopy {
    fn from(mode: CopyMode) -> Self {
        match mode {
            CopyMode::Empty => SceneCopy::Empty,
            CopyMode::LinkCopy => SceneCopy::LinkCopy,
            CopyMode::FullCopy => SceneCopy::FullCopy,
        }
    }
}

/// Runs one command and returns what it has to report.
pub fn run(command: &Command, config: &StoreConfig) -> Result<String> {
    match command {
        Command::Inspect { file } => {
            let store = open(file, config)?;
            Ok(describe(&store))
        }
        Command::Audit { file } => audit(&open(file, config)?),
        Command::Link {
            file,
            library,
            scene,
            object,
            output,
        } => {
            let mut request = LinkRequest::new();
            for name in scene {
                request.insert(IdKind::Scene, name.as_str());
            }
            for name in object {
                request.insert(IdKind::Object, name.as_str());
            }
            if request.is_empty() {
                bail!("nothing to link: pass --scene or --object");
            }
            let mut store = open(file, config)?;
            let before = store.len();
            let outcome = store
                .link(library, &request)
                .with_context(|| format!("Failed to link from {}", library.display()))?;
            save(&mut store, output)?;
            Ok(format!(
                "linked {} requested entities ({} added) from {}",
                outcome.len(),
                store.len() - before,
                library.display()
            ))
        }
        Command::DuplicateScene {
            file,
            scene,
            mode,
            output,
        } => {
            let mut store = open(file, config)?;
            let id = store
                .find(IdKind::Scene, scene, None)
                .map(|e| e.id)
                .with_context(|| format!("No local scene named '{scene}'"))?;
            let copy = store.duplicate_scene(id, (*mode).into())?;
            let name = store.entity(copy)?.name.clone();
            save(&mut store, output)?;
            Ok(format!("created scene '{name}'"))
        }
        Command::Purge { file, output } => {
            let mut store = open(file, config)?;
            let purged = store.purge_orphans();
            save(&mut store, output)?;
            Ok(format!("purged {} entities", purged.len()))
        }
    }
}

fn open(path: &Path, config: &StoreConfig) -> Result<Store> {
    let store = Store::open(path, SchemaRegistry::new(), config.clone())
        .with_context(|| format!("Failed to open {}", path.display()))?;
    info!("Opened {:?} ({} entities)", path, store.len());
    Ok(store)
}

fn save(store: &mut Store, path: &Path) -> Result<()> {
    store
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Entities grouped by kind, one line each.
pub fn describe(store: &Store) -> String {
    let mut lines = vec![format!(
        "{} entities, {} libraries",
        store.len(),
        store.libraries().len()
    )];
    lines.extend(
        store
            .libraries()
            .iter()
            .map(|library| format!("library {} ({})", library.name, library.path.display())),
    );
    for kind in IdKind::ALL {
        let entities = store.entities_of(kind);
        if entities.is_empty() {
            continue;
        }
        lines.push(kind.to_string());
        lines.extend(
            entities
                .into_iter()
                .map(|entity| format!("  {}", entity_line(store, entity))),
        );
    }
    lines.join("\n")
}

fn entity_line(store: &Store, entity: &Entity) -> String {
    let objects = entity
        .scene()
        .map(|scene| format!("  objects={}", scene.objects.len()))
        .unwrap_or_default();
    let library = entity
        .library
        .and_then(|id| store.library(id))
        .map(|library| {
            let tag = match entity.link_tag {
                Some(LinkTag::Direct) => "direct",
                _ => "indirect",
            };
            format!("  [{}, {tag}]", library.name)
        })
        .unwrap_or_default();
    format!("{}  users={}{objects}{library}", entity.name, entity.users)
}

fn audit(store: &Store) -> Result<String> {
    let mismatches = store.audit_users();
    let dangling = store.dangling_references();
    if mismatches.is_empty() && dangling.is_empty() {
        return Ok(format!("ok: {} entities consistent", store.len()));
    }

    let problems: Vec<String> = mismatches
        .iter()
        .map(|m| {
            format!(
                "{}: stored {} users, {} live references",
                m.name, m.stored, m.expected
            )
        })
        .chain(dangling.iter().map(|(holder, target)| {
            let name = store.get(*holder).map_or("?", |e| e.name.as_str());
            format!("{name}: reference to missing entity {target}")
        }))
        .collect();
    bail!("{} problems found:\n{}", problems.len(), problems.join("\n"))
}

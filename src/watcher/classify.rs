//! Mapping of raw notify events onto the created/modified/deleted vocabulary.

use super::DomainEvent;
use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use std::path::PathBuf;

/// Translate one raw event into zero or more domain events.
///
/// Directory entries and access-only notifications are dropped. Renames are
/// reported as a deletion of the old name and a creation of the new one.
pub fn classify(event: &Event) -> Vec<DomainEvent> {
    let paths = event.paths.iter().cloned();
    match &event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Create(_) => paths.filter(not_dir).map(DomainEvent::Created).collect(),
        EventKind::Remove(_) => paths.map(DomainEvent::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => classify_rename(*mode, &event.paths),
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)) => Vec::new(),
        EventKind::Modify(_) => paths.filter(not_dir).map(DomainEvent::Modified).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn classify_rename(mode: RenameMode, paths: &[PathBuf]) -> Vec<DomainEvent> {
    match mode {
        RenameMode::From => paths.iter().cloned().map(DomainEvent::Deleted).collect(),
        RenameMode::To => paths
            .iter()
            .cloned()
            .filter(not_dir)
            .map(DomainEvent::Created)
            .collect(),
        RenameMode::Both => {
            let mut events = Vec::with_capacity(paths.len());
            if let Some((from, to)) = paths.split_first() {
                events.push(DomainEvent::Deleted(from.clone()));
                events.extend(to.iter().cloned().filter(not_dir).map(DomainEvent::Created));
            }
            events
        }
        // Backend could not tell which side of the rename this is
        RenameMode::Any | RenameMode::Other => paths
            .iter()
            .filter_map(|p| match p.try_exists() {
                Ok(true) if p.is_dir() => None,
                Ok(true) => Some(DomainEvent::Created(p.clone())),
                _ => Some(DomainEvent::Deleted(p.clone())),
            })
            .collect(),
    }
}

fn not_dir(path: &PathBuf) -> bool {
    !path.is_dir()
}

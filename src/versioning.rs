//! Lineage resolution and version assignment.
//!
//! A family is a root record (no parent) plus every record whose `parent_id`
//! chain reaches that root. Within a family exactly one member carries
//! `is_latest` after any completed mutation, and versions are unique and
//! strictly increasing in creation order. All functions here operate on the
//! registry's record map and are called while the caller holds the
//! appropriate lock (see `RegistryStore::mutate`).

use std::collections::HashMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::registry::RecordMap;

/// Version number and parent link computed for a record about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPlacement {
    pub version: u32,
    pub parent_id: Option<String>,
}

/// Walk `parent_id` links from `id` to the root, bounded by the total record
/// count so a malformed cycle fails with `CorruptLineage` instead of looping.
/// A parent id that no record carries anchors the family all the same: the
/// chain simply ends there.
fn find_root(records: &RecordMap, id: &str) -> Result<String> {
    let bound = records.len();
    let mut current = id.to_string();
    let mut steps = 0usize;
    while let Some(rec) = records.get(&current) {
        match &rec.parent_id {
            Some(parent) => {
                steps += 1;
                if steps > bound {
                    return Err(Error::CorruptLineage(id.to_string()));
                }
                current = parent.clone();
            }
            None => break,
        }
    }
    Ok(current)
}

fn chain_reaches(records: &RecordMap, id: &str, ancestor: &str) -> Result<bool> {
    let bound = records.len();
    let mut steps = 0usize;
    let mut current = records.get(id);
    while let Some(rec) = current {
        match &rec.parent_id {
            Some(parent) => {
                if parent == ancestor {
                    return Ok(true);
                }
                steps += 1;
                if steps > bound {
                    return Err(Error::CorruptLineage(id.to_string()));
                }
                current = records.get(parent);
            }
            None => return Ok(false),
        }
    }
    Ok(false)
}

/// All member ids of the lineage family containing `id`.
pub fn resolve_family(records: &RecordMap, id: &str) -> Result<Vec<String>> {
    if !records.contains_key(id) {
        return Err(Error::NotFound(id.to_string()));
    }
    let root = find_root(records, id)?;
    let mut family = Vec::new();
    for rid in records.keys() {
        if rid == &root || chain_reaches(records, rid, &root)? {
            family.push(rid.clone());
        }
    }
    Ok(family)
}

/// Next version for a new child of `parent_id`: max version in the family
/// plus one. A missing parent is an error, never a silent fallback to 1.
pub fn next_version(records: &RecordMap, parent_id: &str) -> Result<u32> {
    if !records.contains_key(parent_id) {
        return Err(Error::ParentNotFound(parent_id.to_string()));
    }
    let family = resolve_family(records, parent_id)?;
    let max = family
        .iter()
        .filter_map(|id| records.get(id))
        .map(|r| r.version)
        .max()
        .unwrap_or(1);
    Ok(max + 1)
}

/// Compute placement for a record about to be created and demote the
/// family's current latest members. Must run under the registry write lock
/// together with the insert of the new record.
///
/// Without `is_new_version` this always yields a fresh root at version 1,
/// even when other records share the name: unrelated models may coexist
/// under one label until the caller opts into a lineage.
pub fn assign_version(
    records: &mut RecordMap,
    name: &str,
    parent_id: Option<&str>,
    is_new_version: bool,
) -> Result<VersionPlacement> {
    if !is_new_version {
        return Ok(VersionPlacement { version: 1, parent_id: None });
    }

    if let Some(pid) = parent_id {
        let version = next_version(records, pid)?;
        let family = resolve_family(records, pid)?;
        for id in &family {
            if let Some(rec) = records.get_mut(id) {
                if rec.is_latest {
                    rec.is_latest = false;
                    rec.touch();
                }
            }
        }
        return Ok(VersionPlacement { version, parent_id: Some(pid.to_string()) });
    }

    // No parent given: the highest-versioned record with this name becomes
    // the implicit parent. No such record degenerates to a fresh root.
    let same_name: Vec<String> = records
        .values()
        .filter(|r| r.name == name)
        .map(|r| r.id.clone())
        .collect();
    let implicit = same_name
        .iter()
        .filter_map(|id| records.get(id))
        .max_by_key(|r| (r.version, r.created_at))
        .map(|r| (r.id.clone(), r.version));
    let (implicit_id, implicit_version) = match implicit {
        Some(found) => found,
        None => return Ok(VersionPlacement { version: 1, parent_id: None }),
    };
    for id in &same_name {
        if let Some(rec) = records.get_mut(id) {
            if rec.is_latest {
                rec.is_latest = false;
                rec.touch();
            }
        }
    }
    Ok(VersionPlacement {
        version: implicit_version + 1,
        parent_id: Some(implicit_id),
    })
}

/// Re-point `is_latest` before a record is removed. Deleting a non-latest
/// member changes nothing; deleting the latest promotes the surviving family
/// member with the highest version, if any survive.
pub fn promote_on_delete(records: &mut RecordMap, deleted_id: &str) -> Result<()> {
    let is_latest = match records.get(deleted_id) {
        Some(rec) => rec.is_latest,
        None => return Ok(()),
    };
    if !is_latest {
        return Ok(());
    }
    let family = resolve_family(records, deleted_id)?;
    let heir = family
        .iter()
        .filter(|id| id.as_str() != deleted_id)
        .filter_map(|id| records.get(id))
        .max_by_key(|r| (r.version, r.created_at))
        .map(|r| r.id.clone());
    if let Some(id) = heir {
        if let Some(rec) = records.get_mut(&id) {
            rec.is_latest = true;
            rec.touch();
            debug!(model_id = %rec.id, version = rec.version, "promoted to latest after delete");
        }
    }
    Ok(())
}

/// Idempotent repair pass run after reload: group records by name, reassign
/// versions in `created_at` order and mark only the last as latest. Repairs
/// registries that predate versioning or were caught by a crash between
/// mutation and persist. Returns the number of records changed.
pub fn reconcile(records: &mut RecordMap) -> usize {
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for rec in records.values() {
        groups.entry(rec.name.clone()).or_default().push(rec.id.clone());
    }
    let mut repaired = 0usize;
    for ids in groups.values_mut() {
        if ids.len() == 1 {
            if let Some(rec) = records.get_mut(&ids[0]) {
                if !rec.is_latest {
                    rec.is_latest = true;
                    rec.touch();
                    repaired += 1;
                }
            }
            continue;
        }
        // Existing version then id breaks created_at ties deterministically.
        ids.sort_by_key(|id| records.get(id).map(|r| (r.created_at, r.version, r.id.clone())));
        let last = ids.len() - 1;
        for (i, id) in ids.iter().enumerate() {
            if let Some(rec) = records.get_mut(id) {
                let version = (i + 1) as u32;
                let latest = i == last;
                if rec.version != version || rec.is_latest != latest {
                    rec.version = version;
                    rec.is_latest = latest;
                    rec.touch();
                    repaired += 1;
                }
            }
        }
    }
    repaired
}

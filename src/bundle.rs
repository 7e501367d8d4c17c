//! Bundling: rewriting external references into internal ones.
//!
//! Every `$ref` reachable from the root is inventoried first. The entries
//! are then sorted so that the best location for each distinct target comes
//! first; that location receives a copy of the target content and every
//! other reference to the same target becomes an internal pointer to it.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::RefError;
use crate::locator::{self, get_hash, strip_hash};
use crate::node::{NodeId, REF_KEY};
use crate::options::Options;
use crate::pointer::{join_pointer, parse_pointer};
use crate::refs::Refs;

/// One `$ref` occurrence found while crawling.
#[derive(Debug, Clone)]
struct InventoryEntry {
    /// The reference node; rewritten or replaced during remapping.
    site: NodeId,
    path_from_root: String,
    depth: usize,
    file: String,
    hash: String,
    value: NodeId,
    circular: bool,
    extended: bool,
    external: bool,
    /// A fragment-only `$ref` written in the root file.
    local: bool,
    indirections: usize,
}

/// Bundles all referenced content into the root document.
///
/// # Errors
///
/// Pointer errors (unless recorded under `continue_on_error`),
/// `RefError::NotRegistered` for files never resolved and
/// `RefError::DepthExceeded`.
pub(crate) fn bundle(refs: &mut Refs, options: &Options) -> Result<(), RefError> {
    let Some(root) = refs.root_value() else {
        return Ok(());
    };
    let root_path = format!("{}#", refs.root());

    let inventory = take_inventory(refs, root, &root_path, options)?;
    debug!(references = inventory.len(), "bundling");
    remap(refs, inventory);
    Ok(())
}

// --- Inventory ---

fn take_inventory(
    refs: &mut Refs,
    root: NodeId,
    root_path: &str,
    options: &Options,
) -> Result<Vec<InventoryEntry>, RefError> {
    let mut inventory: Vec<InventoryEntry> = Vec::new();
    // site -> position in `inventory`
    let mut index: HashMap<NodeId, usize> = HashMap::new();
    // (node, its locator, its path from root, indirections so far)
    let mut stack = vec![(root, root_path.to_string(), "#".to_string(), 0usize)];

    while let Some((id, path, path_from_root, indirections)) = stack.pop() {
        if !refs.arena().is_container(id) || options.is_excluded_from_bundle(&path_from_root) {
            continue;
        }

        let depth = parse_pointer(&path_from_root)?.len();
        if depth > options.max_depth {
            return Err(RefError::DepthExceeded {
                limit: options.max_depth,
                path: path_from_root,
            });
        }

        let allowed = refs
            .arena()
            .ref_target(id)
            .is_some_and(|r| options.is_allowed_ref(r));
        if !allowed {
            for (key, child) in crawl_order(refs.arena().children(id)).into_iter().rev() {
                stack.push((
                    child,
                    join_pointer(&path, &[&key]),
                    join_pointer(&path_from_root, &[&key]),
                    indirections,
                ));
            }
            continue;
        }

        let Some(entry) = inventory_ref(refs, id, &path, &path_from_root, depth, indirections, options)?
        else {
            continue;
        };

        let existing = index.get(&id).copied();
        if let Some(i) = existing {
            let current = &inventory[i];
            if entry.depth >= current.depth && entry.indirections >= current.indirections {
                continue;
            }
        }

        trace!(site = %entry.path_from_root, target = %format!("{}{}", entry.file, entry.hash), "inventoried");
        let target = entry.value;
        let target_path = format!("{}{}", entry.file, entry.hash);
        let next = entry.indirections + 1;
        let crawl_target = existing.is_none() || entry.external;
        let from_root = entry.path_from_root.clone();
        match existing {
            Some(i) => inventory[i] = entry,
            None => {
                index.insert(id, inventory.len());
                inventory.push(entry);
            }
        }

        if crawl_target {
            stack.push((target, target_path, from_root, next));
        }
    }
    Ok(inventory)
}

/// Resolves the reference at `site` into an inventory entry.
fn inventory_ref(
    refs: &mut Refs,
    site: NodeId,
    path: &str,
    path_from_root: &str,
    depth: usize,
    indirections: usize,
    options: &Options,
) -> Result<Option<InventoryEntry>, RefError> {
    let Some(reference) = refs.arena().ref_target(site) else {
        return Ok(None);
    };
    let local = reference.starts_with('#') && strip_hash(path) == refs.root();
    let target = locator::resolve(path, reference);
    let extended = refs.arena().is_extended_ref(site);

    let Some(res) = refs.resolve(&target, path_from_root, options)? else {
        return Ok(None);
    };

    let file = strip_hash(&res.path).to_string();
    Ok(Some(InventoryEntry {
        site,
        path_from_root: path_from_root.to_string(),
        depth,
        external: file != refs.root(),
        local,
        hash: get_hash(&res.path).to_string(),
        file,
        value: res.value,
        circular: res.circular,
        extended,
        indirections: indirections + res.indirections,
    }))
}

/// `definitions` and `$defs` first, then shorter keys first.
fn crawl_order(mut children: Vec<(String, NodeId)>) -> Vec<(String, NodeId)> {
    let rank = |key: &str| key == "definitions" || key == "$defs";
    children.sort_by(|(a, _), (b, _)| {
        rank(b)
            .cmp(&rank(a))
            .then_with(|| a.len().cmp(&b.len()))
    });
    children
}

// --- Remap ---

fn remap(refs: &mut Refs, mut inventory: Vec<InventoryEntry>) {
    inventory.sort_by(remap_order);

    let mut anchor: Option<(String, String, String)> = None;
    for entry in &inventory {
        let arena = refs.arena_mut();

        if !entry.external {
            if !entry.local {
                arena.set_string(entry.site, REF_KEY, entry.hash.clone());
            }
            continue;
        }

        if let Some((file, hash, anchor_path)) = &anchor {
            if entry.file == *file && entry.hash == *hash {
                arena.set_string(entry.site, REF_KEY, anchor_path.clone());
                continue;
            }
            let prefix = format!("{}/", hash);
            if entry.file == *file && entry.hash.starts_with(&prefix) {
                let rest = format!("#{}", &entry.hash[hash.len()..]);
                if let Ok(tokens) = parse_pointer(&rest) {
                    arena.set_string(entry.site, REF_KEY, join_pointer(anchor_path, &tokens));
                    continue;
                }
            }
        }

        trace!(site = %entry.path_from_root, file = %entry.file, hash = %entry.hash, "inlining");
        let content = arena.merge_extended(entry.site, entry.value);
        let node = arena.node(content).clone();
        arena.replace(entry.site, node);
        if entry.circular {
            arena.set_string(entry.site, REF_KEY, entry.path_from_root.clone());
        }
        anchor = Some((
            entry.file.clone(),
            entry.hash.clone(),
            entry.path_from_root.clone(),
        ));
    }
}

fn remap_order(a: &InventoryEntry, b: &InventoryEntry) -> Ordering {
    a.file
        .cmp(&b.file)
        .then_with(|| a.hash.cmp(&b.hash))
        // circular first
        .then_with(|| b.circular.cmp(&a.circular))
        // plain before extended
        .then_with(|| a.extended.cmp(&b.extended))
        .then_with(|| a.indirections.cmp(&b.indirections))
        .then_with(|| a.depth.cmp(&b.depth))
        // closest to a definitions section
        .then_with(|| definitions_index(&b.path_from_root).cmp(&definitions_index(&a.path_from_root)))
        .then_with(|| a.path_from_root.len().cmp(&b.path_from_root.len()))
}

fn definitions_index(path: &str) -> Option<usize> {
    path.rfind("/definitions").max(path.rfind("/$defs"))
}

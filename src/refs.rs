//! The reference registry: every file touched by one operation.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::RefError;
use crate::locator::{self, is_file_system_path, is_http, strip_hash, to_file_system_path};
use crate::node::{Arena, Node, NodeId};
use crate::options::Options;
use crate::pointer::{self, join_pointer, parse_pointer, Resolution};

/// How a file was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathType {
    File,
    Http,
    Unknown,
    /// Name of a custom resolver.
    Custom(String),
}

impl PathType {
    /// Guess from the locator alone, before any resolver ran.
    pub fn from_locator(locator: &str) -> Self {
        if is_http(locator) {
            PathType::Http
        } else if is_file_system_path(locator) {
            PathType::File
        } else {
            PathType::Unknown
        }
    }

    /// Path type named after the resolver that read the file.
    pub fn from_name(name: &str) -> Self {
        match name {
            "file" => PathType::File,
            "http" => PathType::Http,
            "unknown" => PathType::Unknown,
            other => PathType::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PathType::File => "file",
            PathType::Http => "http",
            PathType::Unknown => "unknown",
            PathType::Custom(name) => name,
        }
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical file and its parsed content.
#[derive(Debug)]
pub struct FileRecord {
    locator: String,
    value: Option<NodeId>,
    path_type: PathType,
    errors: Vec<RefError>,
}

impl FileRecord {
    /// Absolute locator, without fragment.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Root node of the file; `None` until it has been parsed, or forever if
    /// loading failed under `continue_on_error`.
    pub fn value(&self) -> Option<NodeId> {
        self.value
    }

    pub fn path_type(&self) -> &PathType {
        &self.path_type
    }

    /// Errors recorded against this file under `continue_on_error`.
    pub fn errors(&self) -> &[RefError] {
        &self.errors
    }
}

/// Registry of every file of one operation, plus the node arena holding
/// their content.
///
/// The first file added is the root. Files are added exactly once; `add`
/// returning `true` is what entitles the caller to fetch the file.
#[derive(Debug, Default)]
pub struct Refs {
    arena: Arena,
    files: Vec<FileRecord>,
    index: HashMap<String, usize>,
    circular: bool,
}

impl Refs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a locator (its fragment is ignored).
    ///
    /// Returns `false` if the file was already registered.
    pub fn add(&mut self, locator: &str) -> bool {
        let key = strip_hash(locator);
        if self.index.contains_key(key) {
            return false;
        }
        debug!(locator = %key, root = self.files.is_empty(), "registering file");
        self.index.insert(key.to_string(), self.files.len());
        self.files.push(FileRecord {
            locator: key.to_string(),
            value: None,
            path_type: PathType::from_locator(key),
            errors: Vec::new(),
        });
        true
    }

    /// Stores the parsed content of a registered file.
    pub(crate) fn set_value(&mut self, locator: &str, value: NodeId) {
        if let Some(record) = self.record_mut(locator) {
            record.value = Some(value);
        }
    }

    pub(crate) fn set_path_type(&mut self, locator: &str, path_type: PathType) {
        if let Some(record) = self.record_mut(locator) {
            record.path_type = path_type;
        }
    }

    /// Locator of the root file, or an empty string before anything was added.
    pub fn root(&self) -> &str {
        self.files.first().map_or("", |r| r.locator.as_str())
    }

    /// Root node of the root file.
    pub fn root_value(&self) -> Option<NodeId> {
        self.files.first().and_then(|r| r.value)
    }

    /// The record of the file holding `locator`.
    pub fn record(&self, locator: &str) -> Option<&FileRecord> {
        self.index
            .get(strip_hash(locator))
            .map(|&i| &self.files[i])
    }

    fn record_mut(&mut self, locator: &str) -> Option<&mut FileRecord> {
        match self.index.get(strip_hash(locator)) {
            Some(&i) => Some(&mut self.files[i]),
            None => None,
        }
    }

    /// Records in registration order, root first.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Whether any circular reference has been found. Never reset.
    pub fn circular(&self) -> bool {
        self.circular
    }

    pub(crate) fn mark_circular(&mut self) {
        self.circular = true;
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// Attaches an error to the file holding `locator`, skipping duplicates.
    /// Errors for unknown files land on the root.
    pub(crate) fn add_error(&mut self, locator: &str, error: RefError) {
        let i = match self.index.get(strip_hash(locator)) {
            Some(&i) => i,
            None if !self.files.is_empty() => 0,
            None => return,
        };
        let record = &mut self.files[i];
        let message = error.to_string();
        if record.errors.iter().all(|e| e.to_string() != message) {
            record.errors.push(error);
        }
    }

    /// Every recorded error, file by file.
    pub fn errors(&self) -> impl Iterator<Item = &RefError> {
        self.files.iter().flat_map(|r| r.errors.iter())
    }

    /// Drains the errors of every record.
    pub fn take_errors(&mut self) -> Vec<RefError> {
        self.files
            .iter_mut()
            .flat_map(|r| std::mem::take(&mut r.errors))
            .collect()
    }

    /// Resolves `path` (relative to the root) to a node.
    ///
    /// `path_from_root` is where the reference being resolved sits in the
    /// root document; a chain leading back to it is circular.
    ///
    /// # Errors
    ///
    /// `RefError::NotRegistered` if the target file was never added; pointer
    /// errors unless `continue_on_error` absorbs them (then `Ok(None)`).
    pub fn resolve(
        &mut self,
        path: &str,
        path_from_root: &str,
        options: &Options,
    ) -> Result<Option<Resolution>, RefError> {
        let root = self.root().to_string();
        let absolute = locator::resolve(&root, path);
        let mut chain = vec![locator::resolve(&root, path_from_root)];
        pointer::resolve_pointer(self, &absolute, options, &mut chain)
    }

    /// Locators of all files, optionally only those of the given types.
    /// Local files are listed as filesystem paths.
    pub fn paths(&self, types: &[PathType]) -> Vec<String> {
        self.filtered(types)
            .map(|r| match r.path_type {
                PathType::File => to_file_system_path(&r.locator),
                _ => r.locator.clone(),
            })
            .collect()
    }

    /// Content of all loaded files keyed by locator.
    ///
    /// # Errors
    ///
    /// `RefError::CyclicValue` if a file's content has been dereferenced
    /// into a cycle.
    pub fn values(&self, types: &[PathType]) -> Result<Map<String, Value>, RefError> {
        let mut out = Map::new();
        for record in self.filtered(types) {
            if let Some(id) = record.value {
                out.insert(record.locator.clone(), self.arena.export(id)?);
            }
        }
        Ok(out)
    }

    fn filtered<'a>(&'a self, types: &'a [PathType]) -> impl Iterator<Item = &'a FileRecord> {
        self.files
            .iter()
            .filter(move |r| types.is_empty() || types.contains(&r.path_type))
    }

    /// Whether `path` resolves to a value.
    pub fn exists(&mut self, path: &str, options: &Options) -> bool {
        matches!(self.lookup(path, options), Ok(Some(_)))
    }

    /// The value at `path`, resolved relative to the root.
    pub fn get(&mut self, path: &str, options: &Options) -> Result<Value, RefError> {
        match self.lookup(path, options)? {
            Some(res) => self.arena.export(res.value),
            None => Err(RefError::Resolver {
                locator: strip_hash(&locator::resolve(self.root(), path)).to_string(),
                source: "file has not been loaded".into(),
            }),
        }
    }

    fn lookup(&mut self, path: &str, options: &Options) -> Result<Option<Resolution>, RefError> {
        let strict = Options {
            continue_on_error: false,
            ..options.clone()
        };
        let absolute = locator::resolve(self.root(), path);
        let mut chain = Vec::new();
        pointer::resolve_pointer(self, &absolute, &strict, &mut chain)
    }

    /// Sets the value at `path`, creating intermediate objects as needed.
    ///
    /// `#` replaces the whole file; a final `-` token appends to an array.
    pub fn set(&mut self, path: &str, value: &Value, options: &Options) -> Result<(), RefError> {
        let absolute = locator::resolve(self.root(), path);
        let file = strip_hash(&absolute).to_string();
        let Some(record) = self.record(&file) else {
            return Err(RefError::NotRegistered {
                pointer: path.to_string(),
                locator: file,
            });
        };
        let current = record.value;
        let tokens = parse_pointer(&absolute)?;
        let new = self.arena.import(value);

        let Some((last, parents)) = tokens.split_last() else {
            self.set_value(&file, new);
            return Ok(());
        };
        let mut cursor = match current {
            Some(id) => id,
            None => {
                let id = self.arena.alloc(Node::Object(Default::default()));
                self.set_value(&file, id);
                id
            }
        };

        let mut at = format!("{}#", file);
        for token in parents {
            cursor = self.follow(cursor, &at, options)?;
            at = join_pointer(&at, &[token]);
            cursor = match self.arena.child(cursor, token) {
                Some(next) => next,
                None => {
                    let created = self.arena.alloc(Node::Object(Default::default()));
                    if !self.arena.set_child(cursor, token, created) {
                        return Err(not_settable(&at));
                    }
                    created
                }
            };
        }

        cursor = self.follow(cursor, &at, options)?;
        let appended = match self.arena.node(cursor) {
            Node::Array(items) => {
                (last == "-" || last.parse::<usize>().ok() == Some(items.len()))
                    && self.arena.push(cursor, new)
            }
            _ => false,
        };
        if appended || self.arena.set_child(cursor, last, new) {
            Ok(())
        } else {
            Err(not_settable(&join_pointer(&at, &[last])))
        }
    }

    /// The node a reference under `id` stands for, or `id` itself.
    fn follow(&mut self, id: NodeId, at: &str, options: &Options) -> Result<NodeId, RefError> {
        let Some(target) = self.arena.ref_target(id) else {
            return Ok(id);
        };
        if !options.is_allowed_ref(target) {
            return Ok(id);
        }
        let target = locator::resolve(at, target);
        let mut chain = vec![at.to_string()];
        match pointer::resolve_pointer(self, &target, options, &mut chain)? {
            Some(res) => Ok(res.value),
            None => Ok(id),
        }
    }
}

fn not_settable(path: &str) -> RefError {
    RefError::InvalidInput {
        message: format!("cannot set a value at {}", path),
    }
}

//! Loading the root document and fetching individual files.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::RefError;
use crate::locator::{self, cwd, from_file_system_path, get_protocol};
use crate::options::Options;
use crate::plugins::{parse_file, read_file, FileInfo};
use crate::refs::{PathType, Refs};

/// Where the root document comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// A filesystem path or URL, fetched through the resolvers.
    Path(String),
    /// An in-memory document; relative references resolve against the
    /// current directory.
    Value(Value),
    /// An in-memory document that behaves as if it had been read from `base`.
    ValueAt { base: String, value: Value },
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::Path(path.to_string())
    }
}

impl From<String> for Source {
    fn from(path: String) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_string_lossy().into_owned())
    }
}

impl From<Value> for Source {
    fn from(value: Value) -> Self {
        Source::Value(value)
    }
}

/// Turns a user-supplied path or URL into an absolute locator.
pub fn absolute_locator(path: &str) -> String {
    if get_protocol(path).is_some_and(|p| p != "file") {
        return path.to_string();
    }
    locator::resolve(&cwd(), &from_file_system_path(path))
}

/// Registers and loads the root document.
///
/// # Errors
///
/// Resolver or parser errors for the root file (always fatal), or
/// `RefError::InvalidInput` when the root is not an object.
pub(crate) async fn parse_root(source: Source, options: &Options) -> Result<Refs, RefError> {
    let mut refs = Refs::new();

    let (locator, value) = match source {
        Source::Path(path) => {
            let locator = absolute_locator(&path);
            refs.add(&locator);
            let (path_type, value) = fetch(&locator, options).await?;
            refs.set_path_type(&locator, path_type);
            (locator, value)
        }
        Source::Value(value) => {
            let locator = cwd();
            refs.add(&locator);
            (locator, value)
        }
        Source::ValueAt { base, value } => {
            let locator = absolute_locator(&base);
            refs.add(&locator);
            (locator, value)
        }
    };

    if !value.is_object() {
        return Err(RefError::InvalidInput {
            message: format!("the root of {} must be an object", refs.root()),
        });
    }

    let id = refs.arena_mut().import(&value);
    refs.set_value(&locator, id);
    Ok(refs)
}

/// Reads and decodes one file. Returns the path type named after the
/// resolver that read it.
pub(crate) async fn fetch(locator: &str, options: &Options) -> Result<(PathType, Value), RefError> {
    let mut file = FileInfo::new(locator);
    let (resolver, data) = read_file(&file, options).await?;
    debug!(locator = %file.url, resolver = %resolver, bytes = data.len(), "read file");
    file.data = data;
    let value = parse_file(&file, options)?;
    Ok((PathType::from_name(&resolver), value))
}

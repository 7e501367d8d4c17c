//! Resolver and parser plugin interfaces.
//!
//! Resolvers fetch the raw bytes of a locator; parsers decode those bytes
//! into a value. Both are selected the same way: the plugins whose predicate
//! accepts the file, by ascending order, or every plugin when none matched.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{BoxError, RefError};
use crate::locator::{get_extension, get_hash, strip_hash};
use crate::options::Options;

/// Everything a plugin knows about the file being loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// Locator without fragment.
    pub url: String,
    /// Fragment of the reference that caused the load (`#` if none).
    pub hash: String,
    /// Lower-case extension including the dot, or empty.
    pub extension: String,
    /// Raw bytes, filled in once a resolver has read the file.
    pub data: Vec<u8>,
}

impl FileInfo {
    pub fn new(locator: &str) -> Self {
        let url = strip_hash(locator).to_string();
        Self {
            extension: get_extension(&url),
            hash: get_hash(locator).to_string(),
            url,
            data: Vec::new(),
        }
    }
}

/// Fetches raw bytes for a locator.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Name recorded as the file's path type (`file`, `http`, ...).
    fn name(&self) -> &str;

    /// Lower runs first.
    fn order(&self) -> i32 {
        i32::MAX
    }

    fn can_read(&self, file: &FileInfo) -> bool;

    async fn read(&self, file: &FileInfo) -> Result<Vec<u8>, BoxError>;
}

/// Decodes fetched bytes into a value.
pub trait Parser: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first.
    fn order(&self) -> i32 {
        i32::MAX
    }

    /// Whether an empty result (null, `{}`, `[]`, blank text) is acceptable.
    fn allow_empty(&self) -> bool {
        false
    }

    fn can_parse(&self, file: &FileInfo) -> bool;

    fn parse(&self, file: &FileInfo) -> Result<Value, BoxError>;
}

/// The plugins to try for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates<T> {
    /// Plugins whose predicate accepted the file, sorted by order.
    Matched(Vec<T>),
    /// Nothing matched: every plugin, sorted by order.
    Fallback(Vec<T>),
}

impl<T: Clone> Candidates<T> {
    pub fn select(
        plugins: &[T],
        matches: impl Fn(&T) -> bool,
        order: impl Fn(&T) -> i32,
    ) -> Self {
        let mut matched: Vec<T> = plugins.iter().filter(|p| matches(p)).cloned().collect();
        if matched.is_empty() {
            let mut all = plugins.to_vec();
            all.sort_by_key(|p| order(p));
            Candidates::Fallback(all)
        } else {
            matched.sort_by_key(|p| order(p));
            Candidates::Matched(matched)
        }
    }
}

impl<T> Candidates<T> {
    pub fn plugins(&self) -> &[T] {
        match self {
            Candidates::Matched(p) | Candidates::Fallback(p) => p,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Candidates::Fallback(_))
    }
}

/// Reads the file with the first resolver that succeeds.
///
/// Returns the name of that resolver along with the bytes.
pub(crate) async fn read_file(
    file: &FileInfo,
    options: &Options,
) -> Result<(String, Vec<u8>), RefError> {
    let candidates = Candidates::select(
        &options.resolve.resolvers,
        |r: &Arc<dyn Resolver>| r.can_read(file),
        |r| r.order(),
    );
    if candidates.is_fallback() {
        debug!(url = %file.url, "no resolver matched, trying all resolvers");
    }

    let mut last_error = None;
    for resolver in candidates.plugins() {
        match resolver.read(file).await {
            Ok(data) => return Ok((resolver.name().to_string(), data)),
            Err(source) => {
                debug!(url = %file.url, resolver = resolver.name(), error = %source, "resolver failed");
                last_error = Some(source);
            }
        }
    }

    Err(match last_error {
        Some(source) => RefError::Resolver {
            locator: file.url.clone(),
            source,
        },
        None => RefError::UnmatchedResolver {
            locator: file.url.clone(),
        },
    })
}

/// Decodes the file with the first parser that succeeds.
pub(crate) fn parse_file(file: &FileInfo, options: &Options) -> Result<Value, RefError> {
    let candidates = Candidates::select(
        &options.parse.parsers,
        |p: &Arc<dyn Parser>| p.can_parse(file),
        |p| p.order(),
    );
    if candidates.is_fallback() {
        debug!(url = %file.url, "no parser matched, trying all parsers");
    }

    let mut last_error = None;
    for parser in candidates.plugins() {
        match parser.parse(file) {
            Ok(value) if !parser.allow_empty() && is_empty(&value) => {
                return Err(RefError::parser(
                    &file.url,
                    format!("parsed value is empty ({} parser)", parser.name()),
                ));
            }
            Ok(value) => return Ok(value),
            Err(source) => {
                debug!(url = %file.url, parser = parser.name(), error = %source, "parser failed");
                last_error = Some(source);
            }
        }
    }

    Err(match last_error {
        Some(source) => RefError::Parser {
            locator: file.url.clone(),
            source,
        },
        None => RefError::UnmatchedParser {
            locator: file.url.clone(),
        },
    })
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

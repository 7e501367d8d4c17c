//! Top-level operations.

use serde_json::Value;
use tracing::debug;

use crate::error::RefError;
use crate::options::Options;
use crate::parse::{parse_root, Source};
use crate::refs::Refs;
use crate::{bundle as bundler, dereference as dereferencer, external, Document};

/// Reads and parses the root document without touching its references.
///
/// # Errors
///
/// Resolver or parser errors for the root, or `RefError::InvalidInput`
/// when the root is not an object.
pub async fn parse(source: impl Into<Source>, options: &Options) -> Result<Value, RefError> {
    let refs = parse_root(source.into(), options).await?;
    match refs.root_value() {
        Some(root) => refs.arena().export(root),
        None => Ok(Value::Null),
    }
}

/// Parses the root and fetches every file it references, directly or
/// through other files.
///
/// # Errors
///
/// The first error met, or with `continue_on_error` a single
/// `RefError::Aggregate` holding every recorded error.
pub async fn resolve(source: impl Into<Source>, options: &Options) -> Result<Refs, RefError> {
    let refs = load(source.into(), options).await?;
    finish(refs, options)
}

/// Pulls every external reference into the root document, leaving only
/// internal `$ref`s.
///
/// # Errors
///
/// As for [`resolve`], plus pointer errors met while bundling.
pub async fn bundle(source: impl Into<Source>, options: &Options) -> Result<Document, RefError> {
    let mut refs = load(source.into(), options).await?;
    bundler::bundle(&mut refs, options)?;
    document(finish(refs, options)?)
}

/// Replaces every `$ref` with the value it points to.
///
/// # Errors
///
/// As for [`resolve`], plus `RefError::Circular` when a circular reference
/// is found and the circular policy is `false`.
pub async fn dereference(
    source: impl Into<Source>,
    options: &Options,
) -> Result<Document, RefError> {
    let mut refs = load(source.into(), options).await?;
    dereferencer::dereference(&mut refs, options)?;
    document(finish(refs, options)?)
}

async fn load(source: Source, options: &Options) -> Result<Refs, RefError> {
    let mut refs = parse_root(source, options).await?;
    external::resolve_external(&mut refs, options).await?;
    debug!(root = %refs.root(), files = refs.len(), "resolved");
    Ok(refs)
}

/// Turns errors recorded under `continue_on_error` into one aggregate.
fn finish(mut refs: Refs, options: &Options) -> Result<Refs, RefError> {
    if options.continue_on_error {
        let errors = refs.take_errors();
        if !errors.is_empty() {
            return Err(RefError::Aggregate {
                root: refs.root().to_string(),
                errors,
            });
        }
    }
    Ok(refs)
}

fn document(refs: Refs) -> Result<Document, RefError> {
    let root = refs.root_value().ok_or_else(|| RefError::InvalidInput {
        message: format!("{} has no content", refs.root()),
    })?;
    Ok(Document::new(refs, root))
}

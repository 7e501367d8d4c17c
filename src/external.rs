//! Discovery and concurrent fetching of externally referenced files.

use std::collections::HashSet;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RefError;
use crate::locator::{self, strip_hash};
use crate::node::NodeId;
use crate::options::Options;
use crate::parse::fetch;
use crate::pointer::{join_pointer, parse_pointer};
use crate::refs::{PathType, Refs};

type Fetch<'a> = BoxFuture<'a, (String, Result<(PathType, Value), RefError>)>;

/// Fetches every file reachable from the root through external `$ref`s.
///
/// Each file is registered before its fetch is scheduled, so no file is
/// read twice. Fetches run concurrently; the registry is only touched
/// between polls.
///
/// # Errors
///
/// The first fetch, parse or pointer-syntax error, unless
/// `continue_on_error` records it on the file instead.
pub(crate) async fn resolve_external(refs: &mut Refs, options: &Options) -> Result<(), RefError> {
    let Some(root) = refs.root_value() else {
        return Ok(());
    };
    let root_path = format!("{}#", refs.root());

    let mut pending: FuturesUnordered<Fetch<'_>> = FuturesUnordered::new();
    crawl(refs, root, &root_path, options, &mut pending)?;

    while let Some((locator, result)) = pending.next().await {
        match result {
            Ok((path_type, value)) => {
                let id = refs.arena_mut().import(&value);
                refs.set_value(&locator, id);
                refs.set_path_type(&locator, path_type);
                crawl(refs, id, &format!("{}#", locator), options, &mut pending)?;
            }
            Err(err) if options.continue_on_error && err.is_recoverable() => {
                warn!(locator = %locator, error = %err, "recording fetch error");
                refs.add_error(&locator, err);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Walks one file's content, scheduling a fetch for every unregistered
/// external file it references.
fn crawl<'a>(
    refs: &mut Refs,
    start: NodeId,
    path: &str,
    options: &'a Options,
    pending: &mut FuturesUnordered<Fetch<'a>>,
) -> Result<(), RefError> {
    let mut seen = HashSet::new();
    let mut stack = vec![(start, path.to_string(), 0usize)];

    while let Some((id, path, depth)) = stack.pop() {
        if !refs.arena().is_container(id) || !seen.insert(id) {
            continue;
        }
        if depth > options.max_depth {
            return Err(RefError::DepthExceeded {
                limit: options.max_depth,
                path,
            });
        }

        if let Some(reference) = refs.arena().ref_target(id) {
            if options.is_allowed_ref(reference) {
                let target = locator::resolve(&path, reference);
                let external = !reference.starts_with('#');

                if let Err(err) = parse_pointer(&target) {
                    if !(options.continue_on_error && err.is_recoverable()) {
                        return Err(err);
                    }
                    warn!(pointer = %target, error = %err, "recording pointer error");
                    refs.add_error(&path, err);
                }

                if external {
                    let file = strip_hash(&target).to_string();
                    if refs.add(&file) {
                        debug!(locator = %file, from = %path, "scheduling fetch");
                        pending.push(schedule(file, options));
                    }
                }
            }
        }

        let children = refs.arena().children(id);
        for (token, child) in children.into_iter().rev() {
            stack.push((child, join_pointer(&path, &[token]), depth + 1));
        }
    }
    Ok(())
}

fn schedule(locator: String, options: &Options) -> Fetch<'_> {
    async move {
        let result = fetch(&locator, options).await;
        (locator, result)
    }
    .boxed()
}

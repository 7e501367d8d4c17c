//! JSON Pointer (RFC 6901) parsing and resolution across files.

use tracing::{trace, warn};

use crate::error::RefError;
use crate::locator::{self, decode, encode_fragment, get_hash, strip_hash};
use crate::options::Options;
use crate::refs::Refs;

/// Outcome of resolving one pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Absolute locator (with `#` fragment) of the value that was reached.
    pub path: String,
    /// The resolved node.
    pub value: crate::node::NodeId,
    /// Whether a reference loop stopped the resolution.
    pub circular: bool,
    /// Number of extra `$ref`s traversed on the way.
    pub indirections: usize,
}

impl Resolution {
    /// Locator of the file holding the resolved value.
    pub fn file(&self) -> &str {
        strip_hash(&self.path)
    }

    /// Fragment of the resolved value within its file.
    pub fn hash(&self) -> &str {
        get_hash(&self.path)
    }
}

/// Splits the fragment of `path` into decoded reference tokens.
///
/// `/tmp/a.json`, `/tmp/a.json#` and `#` all yield no tokens.
///
/// # Errors
///
/// Returns `RefError::InvalidPointer` if the fragment is not empty and does
/// not start with `/`.
pub fn parse_pointer(path: &str) -> Result<Vec<String>, RefError> {
    let hash = get_hash(path);
    let pointer = &hash[1..];
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    if !pointer.starts_with('/') {
        return Err(RefError::InvalidPointer {
            pointer: hash.to_string(),
        });
    }

    Ok(pointer[1..]
        .split('/')
        .map(|token| decode(&token.replace("~1", "/").replace("~0", "~")))
        .collect())
}

/// Appends encoded tokens to a locator, adding `#` if it has no fragment.
pub fn join_pointer<S: AsRef<str>>(base: &str, tokens: &[S]) -> String {
    let mut out = base.to_string();
    if !out.contains('#') {
        out.push('#');
    }
    for token in tokens {
        let escaped = token.as_ref().replace('~', "~0").replace('/', "~1");
        out.push('/');
        out.push_str(&encode_fragment(&escaped));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// The cursor was not a followable reference, or it was circular.
    Stayed,
    /// The cursor moved to another location; the path changed.
    Moved,
    /// The target could not be resolved and an error was recorded.
    Failed,
}

/// Resolves an absolute locator to a node, following nested references.
///
/// `chain` holds the paths of the resolutions currently in progress; a
/// reference back into the chain is reported as circular instead of being
/// followed. Returns `Ok(None)` when `continue_on_error` absorbed a pointer
/// error or the target file failed to load.
pub(crate) fn resolve_pointer(
    refs: &mut Refs,
    path: &str,
    options: &Options,
    chain: &mut Vec<String>,
) -> Result<Option<Resolution>, RefError> {
    let file = strip_hash(path);
    let root = match refs.record(file) {
        Some(record) => record.value(),
        None => {
            return Err(RefError::NotRegistered {
                pointer: path.to_string(),
                locator: file.to_string(),
            })
        }
    };
    let Some(root) = root else {
        return Ok(None);
    };

    match walk(refs, root, path, options, chain) {
        Err(err) if options.continue_on_error && err.is_recoverable() => {
            warn!(pointer = %path, error = %err, "recording pointer error");
            refs.add_error(file, err);
            Ok(None)
        }
        other => other,
    }
}

fn walk(
    refs: &mut Refs,
    root: crate::node::NodeId,
    path: &str,
    options: &Options,
    chain: &mut Vec<String>,
) -> Result<Option<Resolution>, RefError> {
    if chain.len() > options.max_depth {
        return Err(RefError::DepthExceeded {
            limit: options.max_depth,
            path: path.to_string(),
        });
    }
    trace!(pointer = %path, "resolving");

    let tokens = parse_pointer(path)?;
    let mut res = Resolution {
        path: path.to_string(),
        value: root,
        circular: false,
        indirections: 0,
    };

    for (i, token) in tokens.iter().enumerate() {
        match follow_ref(refs, &mut res, options, chain)? {
            Step::Moved => res.path = join_pointer(&res.path, &tokens[i..]),
            Step::Failed => return Ok(None),
            Step::Stayed => {}
        }

        match refs.arena().child(res.value, token) {
            Some(next) if !refs.arena().is_null(next) => res.value = next,
            _ => {
                return Err(RefError::MissingPointer {
                    token: token.clone(),
                    pointer: get_hash(path).to_string(),
                })
            }
        }
    }

    if follow_ref(refs, &mut res, options, chain)? == Step::Failed {
        return Ok(None);
    }
    Ok(Some(res))
}

/// Follows the reference under the cursor, if there is one.
fn follow_ref(
    refs: &mut Refs,
    res: &mut Resolution,
    options: &Options,
    chain: &mut Vec<String>,
) -> Result<Step, RefError> {
    let Some(target) = refs.arena().ref_target(res.value) else {
        return Ok(Step::Stayed);
    };
    if !options.is_allowed_ref(target) {
        return Ok(Step::Stayed);
    }

    let target = locator::resolve(&res.path, target);
    if target == res.path || chain.contains(&target) {
        trace!(pointer = %target, "circular reference");
        res.circular = true;
        return Ok(Step::Stayed);
    }

    chain.push(res.path.clone());
    let resolved = resolve_pointer(refs, &target, options, chain);
    chain.pop();
    let Some(resolved) = resolved? else {
        return Ok(Step::Failed);
    };

    res.indirections += resolved.indirections + 1;
    res.circular |= resolved.circular;

    if refs.arena().is_extended_ref(res.value) {
        res.value = refs.arena_mut().merge_extended(res.value, resolved.value);
        Ok(Step::Stayed)
    } else {
        res.path = resolved.path;
        res.value = resolved.value;
        Ok(Step::Moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_pointers() {
        assert!(parse_pointer("/a.json").unwrap().is_empty());
        assert!(parse_pointer("/a.json#").unwrap().is_empty());
        assert!(parse_pointer("#").unwrap().is_empty());
    }

    #[test]
    fn parse_decodes_tokens() {
        assert_eq!(
            parse_pointer("#/paths/~1pets~1{id}/a~0b").unwrap(),
            vec!["paths", "/pets/{id}", "a~b"]
        );
        assert_eq!(parse_pointer("#/a%20b/0").unwrap(), vec!["a b", "0"]);
        assert_eq!(parse_pointer("#/").unwrap(), vec![""]);
    }

    #[test]
    fn parse_rejects_missing_slash() {
        match parse_pointer("/a.json#foo") {
            Err(RefError::InvalidPointer { pointer }) => assert_eq!(pointer, "#foo"),
            other => panic!("expected invalid pointer, got {:?}", other),
        }
    }

    #[test]
    fn join_encodes_tokens() {
        assert_eq!(join_pointer("/a.json", &["definitions", "pet"]), "/a.json#/definitions/pet");
        assert_eq!(join_pointer("#/paths", &["/pets/{id}"]), "#/paths/~1pets~1%7Bid%7D");
        assert_eq!(join_pointer("#", &["a~b", "c d"]), "#/a~0b/c%20d");
        assert_eq!(join_pointer("#", &["$defs"]), "#/$defs");
    }

    #[test]
    fn join_then_parse_keeps_tokens() {
        let tokens = vec!["/pets/{id}".to_string(), "a~b".to_string(), "ü".to_string()];
        let joined = join_pointer("/x.json", &tokens);
        assert_eq!(parse_pointer(&joined).unwrap(), tokens);
    }

    #[test]
    fn resolution_file_and_hash() {
        let res = Resolution {
            path: "/a/b.json#/x/y".into(),
            value: crate::node::Arena::new().alloc(crate::node::Node::Null),
            circular: false,
            indirections: 0,
        };
        assert_eq!(res.file(), "/a/b.json");
        assert_eq!(res.hash(), "#/x/y");
    }
}

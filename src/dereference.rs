//! Dereferencing: substituting every `$ref` with the value it points to.
//!
//! Substitution shares nodes: every reference to the same target ends up
//! holding the same [`NodeId`]. With [`CircularPolicy::Allow`] a reference
//! back into one of its own ancestors produces a cyclic graph.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::error::RefError;
use crate::locator::{self, get_hash, strip_hash};
use crate::node::{NodeId, REF_KEY};
use crate::options::{CircularPolicy, Options};
use crate::pointer::join_pointer;
use crate::refs::Refs;

#[derive(Debug, Clone, Copy)]
struct Outcome {
    value: NodeId,
    circular: bool,
}

/// Dereferences the root document of `refs` in place.
///
/// # Errors
///
/// `RefError::Circular` when a circular reference is found and the policy
/// is [`CircularPolicy::Error`]; pointer and depth errors as for
/// resolution.
pub(crate) fn dereference(refs: &mut Refs, options: &Options) -> Result<(), RefError> {
    let Some(root) = refs.root_value() else {
        return Ok(());
    };
    let root_locator = refs.root().to_string();

    let mut walker = Walker {
        refs: &mut *refs,
        options,
        parents: HashSet::new(),
        processed: HashSet::new(),
        cache: HashMap::new(),
    };
    let outcome = walker.crawl(root, &format!("{}#", root_locator), "#", 0)?;
    debug!(circular = outcome.circular, cached = walker.cache.len(), "dereferenced");

    if outcome.value != root {
        refs.set_value(&root_locator, outcome.value);
    }
    Ok(())
}

struct Walker<'a> {
    refs: &'a mut Refs,
    options: &'a Options,
    /// Ancestors of the node being crawled.
    parents: HashSet<NodeId>,
    /// Every node crawled so far.
    processed: HashSet<NodeId>,
    /// Absolute target -> substituted value, for plain references only.
    cache: HashMap<String, Outcome>,
}

impl Walker<'_> {
    fn policy(&self) -> CircularPolicy {
        self.options.dereference.circular
    }

    fn is_ref(&self, id: NodeId) -> bool {
        self.refs
            .arena()
            .ref_target(id)
            .is_some_and(|r| self.options.is_allowed_ref(r))
    }

    fn crawl(
        &mut self,
        id: NodeId,
        path: &str,
        path_from_root: &str,
        depth: usize,
    ) -> Result<Outcome, RefError> {
        let mut outcome = Outcome {
            value: id,
            circular: false,
        };
        if self.policy() != CircularPolicy::Ignore && self.processed.contains(&id) {
            // already crawled; any circularity was reported on the first visit
            return Ok(outcome);
        }
        if !self.refs.arena().is_container(id)
            || self.options.is_excluded_from_dereference(path_from_root)
        {
            return Ok(outcome);
        }
        if depth > self.options.max_depth {
            return Err(RefError::DepthExceeded {
                limit: self.options.max_depth,
                path: path_from_root.to_string(),
            });
        }

        self.parents.insert(id);
        self.processed.insert(id);

        if self.is_ref(id) {
            outcome = self.dereference_ref(id, path, path_from_root, depth)?;
        } else {
            for (key, child) in self.refs.arena().children(id) {
                let key_path = join_pointer(path, &[&key]);
                let key_from_root = join_pointer(path_from_root, &[&key]);
                if self.options.is_excluded_from_dereference(&key_from_root) {
                    continue;
                }

                let circular = if self.is_ref(child) {
                    let reference = self
                        .refs
                        .arena()
                        .ref_target(child)
                        .unwrap_or_default()
                        .to_string();
                    let result = self.dereference_ref(child, &key_path, &key_from_root, depth + 1)?;
                    if result.value != child {
                        self.refs.arena_mut().set_child(id, &key, result.value);
                        if let Some(hook) = &self.options.dereference.on_dereference {
                            hook(&reference, &key_from_root);
                        }
                    }
                    result.circular
                } else if !self.parents.contains(&child) {
                    let result = self.crawl(child, &key_path, &key_from_root, depth + 1)?;
                    if result.value != child {
                        self.refs.arena_mut().set_child(id, &key, result.value);
                    }
                    result.circular
                } else {
                    self.found_circular(&key_path)?
                };
                outcome.circular |= circular;
            }
        }

        self.parents.remove(&id);
        Ok(outcome)
    }

    fn dereference_ref(
        &mut self,
        site: NodeId,
        path: &str,
        path_from_root: &str,
        depth: usize,
    ) -> Result<Outcome, RefError> {
        let reference = self
            .refs
            .arena()
            .ref_target(site)
            .unwrap_or_default()
            .to_string();
        let target = locator::resolve(path, &reference);
        let extended = self.refs.arena().is_extended_ref(site);

        if let Some(cached) = self.cache.get(&target).copied() {
            if !extended {
                return Ok(cached);
            }
            if cached.circular {
                if self.policy() == CircularPolicy::Ignore {
                    return Ok(Outcome {
                        value: site,
                        circular: true,
                    });
                }
                let merged = self.refs.arena_mut().merge_extended(site, cached.value);
                return Ok(Outcome {
                    value: merged,
                    circular: true,
                });
            }
            let merged = self.refs.arena_mut().merge_extended(site, cached.value);
            return self.crawl(merged, path, path_from_root, depth + 1);
        }

        let Some(res) = self.refs.resolve(&target, path_from_root, self.options)? else {
            return Ok(Outcome {
                value: site,
                circular: false,
            });
        };

        let direct = res.circular;
        let mut circular = direct || self.parents.contains(&res.value);
        if circular {
            self.found_circular(path)?;
        }

        let mut value = self.refs.arena_mut().merge_extended(site, res.value);
        if !circular {
            let crawled = self.crawl(value, &res.path, path_from_root, depth + 1)?;
            circular = crawled.circular;
            value = crawled.value;
        }

        if circular && self.policy() == CircularPolicy::Ignore {
            value = site;
        } else if direct {
            // keep the reference, pointing at where the loop closes
            let own = if strip_hash(&res.path) == self.refs.root() {
                get_hash(&res.path).to_string()
            } else {
                path_from_root.to_string()
            };
            self.refs.arena_mut().set_string(site, REF_KEY, own);
            value = site;
        }

        trace!(pointer = %target, circular, "dereferenced");
        let outcome = Outcome { value, circular };
        if !extended && value != site {
            self.cache.insert(target, outcome);
        }
        Ok(outcome)
    }

    fn found_circular(&mut self, path: &str) -> Result<bool, RefError> {
        self.refs.mark_circular();
        if self.policy() == CircularPolicy::Error {
            return Err(RefError::Circular {
                path: path.to_string(),
            });
        }
        Ok(true)
    }
}

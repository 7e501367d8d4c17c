//! The result of bundling or dereferencing.

use serde_json::Value;

use crate::error::RefError;
use crate::locator;
use crate::node::{Node, NodeId};
use crate::options::Options;
use crate::refs::Refs;

/// A processed root document together with the registry it came from.
#[derive(Debug)]
pub struct Document {
    refs: Refs,
    root: NodeId,
}

impl Document {
    pub(crate) fn new(refs: Refs, root: NodeId) -> Self {
        Self { refs, root }
    }

    /// Root node of the document.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn into_refs(self) -> Refs {
        self.refs
    }

    /// Whether a circular reference was found.
    pub fn circular(&self) -> bool {
        self.refs.circular()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.refs.arena().node(id)
    }

    /// Node at an internal pointer such as `#/definitions/pet`.
    ///
    /// References met on the way are not followed; after dereferencing there
    /// are none left to follow.
    pub fn get(&self, pointer: &str) -> Result<NodeId, RefError> {
        let tokens = crate::pointer::parse_pointer(pointer)?;
        let arena = self.refs.arena();
        let mut cursor = self.root;
        for token in &tokens {
            cursor = arena
                .child(cursor, token)
                .ok_or_else(|| RefError::MissingPointer {
                    token: token.clone(),
                    pointer: locator::get_hash(pointer).to_string(),
                })?;
        }
        Ok(cursor)
    }

    /// Converts the document into a plain value.
    ///
    /// # Errors
    ///
    /// `RefError::CyclicValue` if dereferencing produced a cycle.
    pub fn to_value(&self) -> Result<Value, RefError> {
        self.refs.arena().export(self.root)
    }

    /// Whether the node graph contains a cycle.
    pub fn is_cyclic(&self) -> bool {
        self.refs.arena().is_cyclic(self.root)
    }

    /// Exported value at `pointer`, following references.
    pub fn value_at(&mut self, pointer: &str, options: &Options) -> Result<Value, RefError> {
        self.refs.get(pointer, options)
    }
}

//! Node arena holding every parsed value of an operation.
//!
//! Each JSON/YAML node gets a stable [`NodeId`]. Identity-based bookkeeping
//! (visited sets, ancestor sets, the dereference cache) is keyed by id, and a
//! dereferenced document may share ids between slots or even contain cycles.

use std::collections::HashSet;

use serde_json::{Map, Number, Value};

use crate::error::RefError;
use crate::pointer::join_pointer;

/// The `$ref` keyword.
pub const REF_KEY: &str = "$ref";

/// Stable index of a node inside an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Insertion-ordered object members.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Members(Vec<(String, NodeId)>);

impl Members {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<NodeId> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, id)| *id)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Replaces the value of an existing key in place, or appends it.
    pub fn insert(&mut self, key: impl Into<String>, id: NodeId) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = id,
            None => self.0.push((key, id)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.0.iter().map(|(k, id)| (k.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One JSON-shaped node. Containers refer to their children by id.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<NodeId>),
    Object(Members),
}

/// Owner of every node created during one operation.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes allocated so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Overwrites the content of `id`, keeping its identity.
    pub fn replace(&mut self, id: NodeId, node: Node) {
        self.nodes[id.0] = node;
    }

    /// Copies a `serde_json` value into the arena and returns its root id.
    pub fn import(&mut self, value: &Value) -> NodeId {
        let node = match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => Node::Number(n.clone()),
            Value::String(s) => Node::String(s.clone()),
            Value::Array(items) => Node::Array(items.iter().map(|v| self.import(v)).collect()),
            Value::Object(map) => {
                let mut members = Members::new();
                for (key, v) in map {
                    let id = self.import(v);
                    members.insert(key.clone(), id);
                }
                Node::Object(members)
            }
        };
        self.alloc(node)
    }

    /// Converts the graph reachable from `id` back into a tree.
    ///
    /// Shared nodes are duplicated. A node that is its own ancestor cannot be
    /// represented as a tree and yields [`RefError::CyclicValue`].
    pub fn export(&self, id: NodeId) -> Result<Value, RefError> {
        let mut ancestors = HashSet::new();
        self.export_inner(id, "#", &mut ancestors)
    }

    fn export_inner(
        &self,
        id: NodeId,
        path: &str,
        ancestors: &mut HashSet<NodeId>,
    ) -> Result<Value, RefError> {
        let value = match self.node(id) {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(s.clone()),
            Node::Array(items) => {
                if !ancestors.insert(id) {
                    return Err(RefError::CyclicValue {
                        path: path.to_string(),
                    });
                }
                let mut out = Vec::with_capacity(items.len());
                for (i, child) in items.iter().enumerate() {
                    let child_path = join_pointer(path, &[i.to_string()]);
                    out.push(self.export_inner(*child, &child_path, ancestors)?);
                }
                ancestors.remove(&id);
                Value::Array(out)
            }
            Node::Object(members) => {
                if !ancestors.insert(id) {
                    return Err(RefError::CyclicValue {
                        path: path.to_string(),
                    });
                }
                let mut out = Map::new();
                for (key, child) in members.iter() {
                    let child_path = join_pointer(path, &[key.to_string()]);
                    out.insert(
                        key.to_string(),
                        self.export_inner(child, &child_path, ancestors)?,
                    );
                }
                ancestors.remove(&id);
                Value::Object(out)
            }
        };
        Ok(value)
    }

    /// Whether some node reachable from `id` is its own ancestor.
    pub fn is_cyclic(&self, id: NodeId) -> bool {
        matches!(self.export(id), Err(RefError::CyclicValue { .. }))
    }

    /// Looks up a child by pointer token. Arrays accept decimal indices.
    pub fn child(&self, id: NodeId, token: &str) -> Option<NodeId> {
        match self.node(id) {
            Node::Object(members) => members.get(token),
            Node::Array(items) => token.parse::<usize>().ok().and_then(|i| items.get(i).copied()),
            _ => None,
        }
    }

    /// Replaces the child at `token`. Objects gain the key if missing.
    /// Returns false when `id` is not a container or the index is out of range.
    pub fn set_child(&mut self, id: NodeId, token: &str, child: NodeId) -> bool {
        match &mut self.nodes[id.0] {
            Node::Object(members) => {
                members.insert(token, child);
                true
            }
            Node::Array(items) => match token.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(slot) => {
                    *slot = child;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Appends to an array. Returns false when `id` is not an array.
    pub fn push(&mut self, id: NodeId, child: NodeId) -> bool {
        match &mut self.nodes[id.0] {
            Node::Array(items) => {
                items.push(child);
                true
            }
            _ => false,
        }
    }

    /// Children of a container as `(token, id)` pairs, in document order.
    pub fn children(&self, id: NodeId) -> Vec<(String, NodeId)> {
        match self.node(id) {
            Node::Object(members) => members.iter().map(|(k, v)| (k.to_string(), v)).collect(),
            Node::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), *v))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_container(&self, id: NodeId) -> bool {
        matches!(self.node(id), Node::Object(_) | Node::Array(_))
    }

    pub fn is_null(&self, id: NodeId) -> bool {
        matches!(self.node(id), Node::Null)
    }

    pub fn as_str(&self, id: NodeId) -> Option<&str> {
        match self.node(id) {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    /// The `$ref` string of a reference node.
    pub fn ref_target(&self, id: NodeId) -> Option<&str> {
        match self.node(id) {
            Node::Object(members) => members.get(REF_KEY).and_then(|r| self.as_str(r)),
            _ => None,
        }
    }

    pub fn is_ref(&self, id: NodeId) -> bool {
        self.ref_target(id).is_some()
    }

    /// A reference with sibling keys besides `$ref`.
    pub fn is_extended_ref(&self, id: NodeId) -> bool {
        match self.node(id) {
            Node::Object(members) => self.is_ref(id) && members.len() > 1,
            _ => false,
        }
    }

    /// Sets a string member, allocating the string node.
    pub fn set_string(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
        let string = self.alloc(Node::String(value.into()));
        self.set_child(id, key, string);
    }

    /// Content a reference node stands for once `target` is known.
    ///
    /// For an extended reference to an object the result is a new object
    /// holding the reference's own keys (without `$ref`) followed by the
    /// target keys it does not already have; the reference's keys win.
    /// Otherwise the target itself is returned.
    pub fn merge_extended(&mut self, ref_id: NodeId, target: NodeId) -> NodeId {
        if !self.is_extended_ref(ref_id) {
            return target;
        }
        let (Node::Object(own), Node::Object(resolved)) = (self.node(ref_id), self.node(target))
        else {
            return target;
        };

        let mut merged = Members::new();
        for (key, id) in own.iter() {
            if key != REF_KEY {
                merged.insert(key, id);
            }
        }
        for (key, id) in resolved.iter() {
            if !merged.contains_key(key) {
                merged.insert(key, id);
            }
        }
        self.alloc(Node::Object(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn import_export_preserves_order() {
        let mut arena = Arena::new();
        let value = json!({"z": 1, "a": [true, null, "x"], "m": {"k": 1.5}});
        let id = arena.import(&value);
        let back = arena.export(id).unwrap();
        assert_eq!(back, value);
        let keys: Vec<_> = back.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn export_rejects_cycles() {
        let mut arena = Arena::new();
        let id = arena.import(&json!({"a": {"b": 1}}));
        let a = arena.child(id, "a").unwrap();
        arena.set_child(a, "self", id);
        assert!(arena.is_cyclic(id));
        match arena.export(id) {
            Err(RefError::CyclicValue { path }) => assert_eq!(path, "#/a/self"),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn shared_nodes_are_duplicated_on_export() {
        let mut arena = Arena::new();
        let id = arena.import(&json!({"a": {"v": 1}, "b": null}));
        let a = arena.child(id, "a").unwrap();
        arena.set_child(id, "b", a);
        assert!(!arena.is_cyclic(id));
        assert_eq!(
            arena.export(id).unwrap(),
            json!({"a": {"v": 1}, "b": {"v": 1}})
        );
    }

    #[test]
    fn array_children() {
        let mut arena = Arena::new();
        let id = arena.import(&json!([10, 20]));
        let second = arena.child(id, "1").unwrap();
        assert_eq!(arena.export(second).unwrap(), json!(20));
        assert!(arena.child(id, "2").is_none());
        assert!(arena.child(id, "x").is_none());
        assert!(!arena.set_child(id, "5", second));
    }

    #[test]
    fn ref_detection() {
        let mut arena = Arena::new();
        let plain = arena.import(&json!({"$ref": "#/a"}));
        let extended = arena.import(&json!({"$ref": "#/a", "description": "x"}));
        let not_ref = arena.import(&json!({"$ref": 5}));
        assert_eq!(arena.ref_target(plain), Some("#/a"));
        assert!(!arena.is_extended_ref(plain));
        assert!(arena.is_extended_ref(extended));
        assert!(!arena.is_ref(not_ref));
    }

    #[test]
    fn merge_extended_keeps_own_keys() {
        let mut arena = Arena::new();
        let reference = arena.import(&json!({"$ref": "#/t", "title": "mine", "extra": 1}));
        let target = arena.import(&json!({"title": "theirs", "type": "object"}));
        let merged = arena.merge_extended(reference, target);
        assert_ne!(merged, target);
        assert_eq!(
            arena.export(merged).unwrap(),
            json!({"title": "mine", "extra": 1, "type": "object"})
        );

        let plain = arena.import(&json!({"$ref": "#/t"}));
        assert_eq!(arena.merge_extended(plain, target), target);
    }
}

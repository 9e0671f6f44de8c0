//! Path-addressable parameter tree
//!
//! A hierarchical key/value store addressed by slash-delimited paths such as
//! `config/hdf/file/path`. Leaves carry a `serde_json::Value` and a
//! writability flag; branches are key-ordered maps. Reads return the
//! addressed subtree wrapped under its final path segment, optionally with
//! per-leaf metadata.
//!
//! The tree is internally synchronized, so request handlers and background
//! tasks can share one instance behind an `Arc` without extra locking.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::{Map, Value};

use crate::error::{ControlError, ControlResult};

// ============================================================================
// Nodes
// ============================================================================

/// A single leaf parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub value: Value,
    pub writable: bool,
}

impl Param {
    /// Create a writable parameter
    pub fn writable(value: Value) -> Self {
        Self {
            value,
            writable: true,
        }
    }

    /// Create a read-only parameter
    pub fn read_only(value: Value) -> Self {
        Self {
            value,
            writable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Branch(BTreeMap<String, Node>),
    Leaf(Param),
}

impl Node {
    fn empty_branch() -> Self {
        Node::Branch(BTreeMap::new())
    }

    /// Build a writable node from a JSON value; objects become branches.
    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Node::Branch(
                map.into_iter()
                    .map(|(k, v)| (k, Node::from_value(v)))
                    .collect(),
            ),
            other => Node::Leaf(Param::writable(other)),
        }
    }

    fn render(&self, with_metadata: bool) -> Value {
        match self {
            Node::Branch(children) => Value::Object(
                children
                    .iter()
                    .map(|(k, child)| (k.clone(), child.render(with_metadata)))
                    .collect(),
            ),
            Node::Leaf(param) if with_metadata => {
                let mut meta = Map::new();
                meta.insert("value".to_string(), param.value.clone());
                meta.insert("type".to_string(), Value::from(type_name(&param.value)));
                meta.insert("writeable".to_string(), Value::Bool(param.writable));
                Value::Object(meta)
            }
            Node::Leaf(param) => param.value.clone(),
        }
    }
}

/// Type label reported in metadata
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Whether `new` may replace `current` in a typed leaf
fn type_compatible(current: &Value, new: &Value) -> bool {
    match (current, new) {
        (Value::Null, _) => true,
        (Value::Number(c), Value::Number(n)) => c.is_f64() || !n.is_f64(),
        _ => type_name(current) == type_name(new),
    }
}

/// Split a path into its non-empty segments
fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

// ============================================================================
// Parameter Tree
// ============================================================================

/// Thread-safe hierarchical parameter store
#[derive(Debug)]
pub struct ParameterTree {
    root: RwLock<Node>,
    mutable: bool,
}

impl Default for ParameterTree {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ParameterTree {
    /// Create an empty tree. A mutable tree accepts writes to paths that
    /// do not exist yet and creates them.
    pub fn new(mutable: bool) -> Self {
        Self {
            root: RwLock::new(Node::empty_branch()),
            mutable,
        }
    }

    /// Create a new tree builder
    pub fn builder() -> ParameterTreeBuilder {
        ParameterTreeBuilder::default()
    }

    /// Whether unknown paths are created on write
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Read the subtree at `path`.
    ///
    /// The result is wrapped under the final path segment, so
    /// `get("module", false)` yields `{"module": "fp1"}`. The root path
    /// returns the whole tree unwrapped.
    pub fn get(&self, path: &str, with_metadata: bool) -> ControlResult<Value> {
        let root = self
            .root
            .read()
            .map_err(|_| ControlError::PeerUnavailable("parameter tree lock poisoned".into()))?;

        let segs = segments(path);
        let mut node = &*root;
        for seg in &segs {
            node = match node {
                Node::Branch(children) => children
                    .get(*seg)
                    .ok_or_else(|| ControlError::PathNotFound(path.to_string()))?,
                Node::Leaf(_) => return Err(ControlError::PathNotFound(path.to_string())),
            };
        }

        let rendered = node.render(with_metadata);
        match segs.last() {
            Some(last) => {
                let mut wrapped = Map::new();
                wrapped.insert((*last).to_string(), rendered);
                Ok(Value::Object(wrapped))
            }
            None => Ok(rendered),
        }
    }

    /// Write `value` at `path`.
    ///
    /// Object values written to a branch are merged key by key. The whole
    /// update is applied or none of it is.
    pub fn set(&self, path: &str, value: Value) -> ControlResult<()> {
        let mut root = self
            .root
            .write()
            .map_err(|_| ControlError::PeerUnavailable("parameter tree lock poisoned".into()))?;

        let mut staged = root.clone();
        apply(&mut staged, &segments(path), path, value, self.mutable, false)?;
        *root = staged;
        Ok(())
    }

    /// Owner-side write that ignores writability. Used by the owning
    /// controller to publish values it manages itself.
    pub fn replace(&self, path: &str, value: Value) -> ControlResult<()> {
        let mut root = self
            .root
            .write()
            .map_err(|_| ControlError::PeerUnavailable("parameter tree lock poisoned".into()))?;

        let mut staged = root.clone();
        apply(&mut staged, &segments(path), path, value, true, true)?;
        *root = staged;
        Ok(())
    }

    /// Read the raw value of a single leaf
    pub fn leaf(&self, path: &str) -> ControlResult<Value> {
        let root = self
            .root
            .read()
            .map_err(|_| ControlError::PeerUnavailable("parameter tree lock poisoned".into()))?;

        let mut node = &*root;
        for seg in segments(path) {
            node = match node {
                Node::Branch(children) => children
                    .get(seg)
                    .ok_or_else(|| ControlError::PathNotFound(path.to_string()))?,
                Node::Leaf(_) => return Err(ControlError::PathNotFound(path.to_string())),
            };
        }

        match node {
            Node::Leaf(param) => Ok(param.value.clone()),
            Node::Branch(_) => Err(ControlError::invalid_value(path, "path addresses a branch")),
        }
    }
}

/// Place a leaf at `segs`, turning anything in the way into a branch
fn insert(node: &mut Node, segs: &[&str], param: Param) {
    match segs.split_first() {
        None => *node = Node::Leaf(param),
        Some((head, rest)) => {
            if !matches!(node, Node::Branch(_)) {
                *node = Node::empty_branch();
            }
            if let Node::Branch(children) = node {
                let child = children
                    .entry((*head).to_string())
                    .or_insert_with(Node::empty_branch);
                insert(child, rest, param);
            }
        }
    }
}

fn apply(
    node: &mut Node,
    segs: &[&str],
    full_path: &str,
    value: Value,
    mutable: bool,
    force: bool,
) -> ControlResult<()> {
    let Some((head, rest)) = segs.split_first() else {
        return assign(node, full_path, value, mutable, force);
    };

    let children = match node {
        Node::Branch(children) => children,
        Node::Leaf(_) => return Err(ControlError::PathNotFound(full_path.to_string())),
    };

    if !children.contains_key(*head) {
        if !mutable {
            return Err(ControlError::PathNotFound(full_path.to_string()));
        }
        children.insert((*head).to_string(), Node::empty_branch());
    }

    let child = children
        .get_mut(*head)
        .ok_or_else(|| ControlError::PathNotFound(full_path.to_string()))?;
    apply(child, rest, full_path, value, mutable, force)
}

fn assign(
    node: &mut Node,
    full_path: &str,
    value: Value,
    mutable: bool,
    force: bool,
) -> ControlResult<()> {
    match node {
        Node::Leaf(param) => {
            if force {
                param.value = value;
                return Ok(());
            }
            if !param.writable {
                return Err(ControlError::invalid_value(full_path, "parameter is read-only"));
            }
            if !type_compatible(&param.value, &value) {
                return Err(ControlError::invalid_value(
                    full_path,
                    format!(
                        "type mismatch: got {}, expected {}",
                        type_name(&value),
                        type_name(&param.value)
                    ),
                ));
            }
            param.value = value;
            Ok(())
        }
        Node::Branch(children) => match value {
            Value::Object(map) => {
                for (key, child_value) in map {
                    let child_path = if full_path.trim_matches('/').is_empty() {
                        key.clone()
                    } else {
                        format!("{}/{}", full_path.trim_matches('/'), key)
                    };
                    match children.get_mut(&key) {
                        Some(child) => assign(child, &child_path, child_value, mutable, force)?,
                        None if mutable => {
                            children.insert(key, Node::from_value(child_value));
                        }
                        None => return Err(ControlError::PathNotFound(child_path)),
                    }
                }
                Ok(())
            }
            other if children.is_empty() && mutable => {
                *node = Node::from_value(other);
                Ok(())
            }
            other => Err(ControlError::invalid_value(
                full_path,
                format!("cannot replace a branch with a {}", type_name(&other)),
            )),
        },
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for ParameterTree
#[derive(Debug, Default)]
pub struct ParameterTreeBuilder {
    params: Vec<(String, Param)>,
    mutable: Option<bool>,
}

impl ParameterTreeBuilder {
    /// Add a writable leaf
    pub fn writable(mut self, path: impl Into<String>, value: Value) -> Self {
        self.params.push((path.into(), Param::writable(value)));
        self
    }

    /// Add a read-only leaf
    pub fn read_only(mut self, path: impl Into<String>, value: Value) -> Self {
        self.params.push((path.into(), Param::read_only(value)));
        self
    }

    /// Allow or forbid creating unknown paths on write
    pub fn mutable(mut self, mutable: bool) -> Self {
        self.mutable = Some(mutable);
        self
    }

    /// Build the tree
    pub fn build(self) -> ParameterTree {
        let mut root = Node::empty_branch();
        for (path, param) in self.params {
            insert(&mut root, &segments(&path), param);
        }
        ParameterTree {
            root: RwLock::new(root),
            mutable: self.mutable.unwrap_or(true),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

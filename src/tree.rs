//! Address-dispatch tree.
//!
//! Nodes live in a flat arena and refer to each other by [`NodeId`].
//! The tree is assembled with a [`TreeBuilder`] at startup, then frozen
//! into an [`AddressTree`] that is shared read-only (`Arc`) between the
//! inbound path and the autosender. No lock is needed to resolve.
//!
//! ```text
//!   /analogin/5/value
//!    │        │ └── leaf "value" (handler, getter)
//!    │        └──── index 5, consumed by the ranged node
//!    └───────────── container "analogin" (range 8)
//! ```

use std::sync::Arc;

use log::{debug, info};

use crate::error::{Error, Result, TreeError};
use crate::osc::types::Argument;

/// Property callback: `(index, args) -> reply`.
///
/// Called with no arguments for a read, which should return the current
/// value. Called with arguments for a write; the return value is ignored.
pub type Handler = Arc<dyn Fn(Option<i32>, &[Argument]) -> Option<Argument> + Send + Sync>;

/// Autosend getter: current value at `index`, or `None` if it could not be
/// sampled in time.
pub type Getter = Arc<dyn Fn(u32) -> Option<Argument> + Send + Sync>;

/// Box a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(Option<i32>, &[Argument]) -> Option<Argument> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Box a closure as a [`Getter`].
pub fn getter<F>(f: F) -> Getter
where
    F: Fn(u32) -> Option<Argument> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Largest range an autosend source may have (one mask bit per index).
pub const MAX_AUTOSEND_RANGE: u32 = u32::BITS;

/// Handle to a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

const ROOT: NodeId = NodeId(0);

struct Node {
    name: String,
    range: Option<u32>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    handler: Option<Handler>,
    getter: Option<Getter>,
}

// ── Shared arena queries ──────────────────────────────────────

struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).name == name)
    }

    fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        core::iter::successors(Some(id), |&n| self.node(n).parent)
    }

    /// Range of the nearest ranged node at or above `id`.
    fn range_of(&self, id: NodeId) -> Option<u32> {
        self.ancestors(id).find_map(|n| self.node(n).range)
    }

    /// Names from the root down to `id`, joined with `/` and without a
    /// leading slash or indices: `analogin/value`.
    fn path_key(&self, id: NodeId) -> String {
        let mut names: Vec<&str> = self
            .ancestors(id)
            .filter(|&n| n != ROOT)
            .map(|n| self.node(n).name.as_str())
            .collect();
        names.reverse();
        names.join("/")
    }
}

// ── Builder ───────────────────────────────────────────────────

/// Mutable tree under construction.
pub struct TreeBuilder {
    arena: Arena,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            arena: Arena {
                nodes: vec![Node {
                    name: String::new(),
                    range: None,
                    parent: None,
                    children: Vec::new(),
                    handler: None,
                    getter: None,
                }],
            },
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    fn push(
        &mut self,
        parent: NodeId,
        name: &str,
        range: Option<u32>,
        handler: Option<Handler>,
    ) -> NodeId {
        let id = NodeId(self.arena.nodes.len() as u32);
        self.arena.nodes.push(Node {
            name: name.to_owned(),
            range,
            parent: Some(parent),
            children: Vec::new(),
            handler,
            getter: None,
        });
        self.arena.node_mut(parent).children.push(id);
        id
    }

    /// Get or create the container `name` under `parent`.
    ///
    /// An existing container is returned only if its range matches.
    pub fn container(
        &mut self,
        parent: NodeId,
        name: &str,
        range: Option<u32>,
    ) -> core::result::Result<NodeId, TreeError> {
        if name.is_empty() {
            return Err(TreeError::EmptyPath);
        }
        if range == Some(0) {
            return Err(TreeError::ZeroRange);
        }
        if range.is_some_and(|r| r > i32::MAX as u32) {
            return Err(TreeError::RangeTooLarge);
        }
        if self.arena.node(parent).handler.is_some() {
            return Err(TreeError::NotAContainer);
        }
        if let Some(existing) = self.arena.child(parent, name) {
            let node = self.arena.node(existing);
            if node.handler.is_some() {
                return Err(TreeError::NotAContainer);
            }
            if node.range != range {
                return Err(TreeError::RangeConflict);
            }
            return Ok(existing);
        }
        if range.is_some() && self.arena.range_of(parent).is_some() {
            return Err(TreeError::NestedRange);
        }
        let id = self.push(parent, name, range, None);
        debug!("Tree: container /{} (range {:?})", self.arena.path_key(id), range);
        Ok(id)
    }

    /// Existing child of any range, or a new plain container.
    fn intermediate(
        &mut self,
        parent: NodeId,
        name: &str,
    ) -> core::result::Result<NodeId, TreeError> {
        match self.arena.child(parent, name) {
            Some(existing) if self.arena.node(existing).handler.is_some() => {
                Err(TreeError::NotAContainer)
            }
            Some(existing) => Ok(existing),
            None => self.container(parent, name, None),
        }
    }

    /// Add a leaf carrying `handler` under `parent`.
    pub fn property(
        &mut self,
        parent: NodeId,
        name: &str,
        handler: Handler,
    ) -> core::result::Result<NodeId, TreeError> {
        if name.is_empty() {
            return Err(TreeError::EmptyPath);
        }
        if self.arena.node(parent).handler.is_some() {
            return Err(TreeError::NotAContainer);
        }
        if self.arena.child(parent, name).is_some() {
            return Err(TreeError::DuplicateName);
        }
        let id = self.push(parent, name, None, Some(handler));
        debug!("Tree: property /{}", self.arena.path_key(id));
        Ok(id)
    }

    /// Mark a leaf as an autosend source.
    ///
    /// The leaf needs a ranged ancestor no wider than
    /// [`MAX_AUTOSEND_RANGE`].
    pub fn set_getter(
        &mut self,
        leaf: NodeId,
        getter: Getter,
    ) -> core::result::Result<(), TreeError> {
        if self.arena.node(leaf).handler.is_none() {
            return Err(TreeError::NotAutosendCapable);
        }
        match self.arena.range_of(leaf) {
            Some(range) if range <= MAX_AUTOSEND_RANGE => {
                self.arena.node_mut(leaf).getter = Some(getter);
                Ok(())
            }
            _ => Err(TreeError::NotAutosendCapable),
        }
    }

    /// Register a leaf by path, creating containers as needed.
    ///
    /// `range`, when given, applies to the leaf's parent container:
    /// `register(&["analogin", "value"], Some(8), ..)` serves
    /// `/analogin/0/value` through `/analogin/7/value`. With `None` an
    /// existing parent keeps whatever range it already has.
    pub fn register(
        &mut self,
        path: &[&str],
        range: Option<u32>,
        handler: Handler,
        getter: Option<Getter>,
    ) -> core::result::Result<NodeId, TreeError> {
        let (leaf, parents) = path.split_last().ok_or(TreeError::EmptyPath)?;
        if parents.is_empty() && range.is_some() {
            return Err(TreeError::RangeConflict);
        }

        let mut node = ROOT;
        for (i, segment) in parents.iter().enumerate() {
            let is_parent = i + 1 == parents.len();
            node = match range {
                Some(r) if is_parent => self.container(node, segment, Some(r))?,
                _ => self.intermediate(node, segment)?,
            };
        }

        let id = self.property(node, leaf, handler)?;
        if let Some(getter) = getter {
            self.set_getter(id, getter)?;
        }
        Ok(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.node(id).parent
    }

    pub fn range_of(&self, id: NodeId) -> Option<u32> {
        self.arena.range_of(id)
    }

    pub fn has_getter(&self, id: NodeId) -> bool {
        self.arena.node(id).getter.is_some()
    }

    pub fn path_key(&self, id: NodeId) -> String {
        self.arena.path_key(id)
    }

    /// Freeze the tree.
    pub fn build(self) -> AddressTree {
        info!("Tree: frozen with {} nodes", self.arena.nodes.len());
        AddressTree { arena: self.arena }
    }
}

// ── Frozen tree ───────────────────────────────────────────────

/// Result of a successful resolution.
pub struct Target<'a> {
    pub node: NodeId,
    /// Index consumed by the ranged container on the way, if any.
    pub index: Option<i32>,
    pub handler: &'a Handler,
}

impl Target<'_> {
    pub fn invoke(&self, args: &[Argument]) -> Option<Argument> {
        (self.handler)(self.index, args)
    }
}

/// Immutable address tree.
pub struct AddressTree {
    arena: Arena,
}

impl AddressTree {
    /// Resolve an address to its handler and index.
    ///
    /// Fails with [`Error::NotFound`] when a name does not match, a
    /// ranged segment is not a number, or the address stops short of a
    /// handler (or runs past one). Fails with [`Error::IndexOutOfRange`]
    /// when a numeric segment is `>= range`.
    pub fn resolve(&self, address: &str) -> Result<Target<'_>> {
        let rest = address.strip_prefix('/').ok_or(Error::NotFound)?;

        let mut node = ROOT;
        let mut index = None;
        let mut awaiting_index = false;

        for segment in rest.split('/') {
            let current = self.arena.node(node);
            if current.handler.is_some() {
                return Err(Error::NotFound);
            }
            if awaiting_index {
                let range = current.range.unwrap_or(0);
                let i = parse_index(segment).ok_or(Error::NotFound)?;
                if i >= range {
                    return Err(Error::IndexOutOfRange { index: i, range });
                }
                index = Some(i as i32);
                awaiting_index = false;
                continue;
            }
            node = self.arena.child(node, segment).ok_or(Error::NotFound)?;
            awaiting_index = self.arena.node(node).range.is_some();
        }

        match &self.arena.node(node).handler {
            Some(handler) if !awaiting_index => Ok(Target {
                node,
                index,
                handler,
            }),
            _ => Err(Error::NotFound),
        }
    }

    /// Inverse of [`resolve`](Self::resolve): `/analogin/5/value` for the
    /// `value` leaf and index 5.
    ///
    /// `index` must be given exactly when the node sits below a range.
    pub fn build_address(&self, node: NodeId, index: Option<u32>) -> Result<String> {
        match (self.arena.range_of(node), index) {
            (Some(range), Some(i)) if i >= range => {
                return Err(Error::IndexOutOfRange { index: i, range });
            }
            (Some(_), None) | (None, Some(_)) => return Err(Error::NotFound),
            _ => {}
        }

        let mut chain: Vec<NodeId> = self.arena.ancestors(node).filter(|&n| n != ROOT).collect();
        chain.reverse();

        let mut address = String::new();
        for id in chain {
            let n = self.arena.node(id);
            address.push('/');
            address.push_str(&n.name);
            if let (Some(_), Some(i)) = (n.range, index) {
                address.push('/');
                address.push_str(&i.to_string());
            }
        }
        if address.is_empty() {
            address.push('/');
        }
        Ok(address)
    }

    /// Look up a node by names alone (no indices).
    pub fn find(&self, path: &[&str]) -> Option<NodeId> {
        path.iter()
            .try_fold(ROOT, |node, name| self.arena.child(node, name))
    }

    pub fn getter(&self, node: NodeId) -> Option<&Getter> {
        self.arena.node(node).getter.as_ref()
    }

    pub fn range_of(&self, node: NodeId) -> Option<u32> {
        self.arena.range_of(node)
    }

    pub fn path_key(&self, node: NodeId) -> String {
        self.arena.path_key(node)
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.arena.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.nodes.len() <= 1
    }
}

/// Plain decimal digits only; `+5`, `-1` and `` are not indices.
/// Values too large for `u32` saturate so they report as out of range.
fn parse_index(segment: &str) -> Option<u32> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(segment.parse().unwrap_or(u32::MAX))
}

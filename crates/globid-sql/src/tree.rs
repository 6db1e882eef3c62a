use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Major {
    Statement,
    List,
    Endpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Minor {
    Insert,
    Select,
    Other,
    /// Generic grouping list introduced by the grammar, carries no meaning.
    Normal,
    Format,
    Value,
    ValueRow,
    Column,
    Table,
    Schema,
    Integer,
    Float,
    Text,
    Null,
    Placeholder,
}

/// Type tag of a node: (major class, minor kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeType {
    pub major: Major,
    pub minor: Minor,
}

impl NodeType {
    pub const INSERT: Self = Self::new(Major::Statement, Minor::Insert);
    pub const SELECT: Self = Self::new(Major::Statement, Minor::Select);
    pub const OTHER_STATEMENT: Self = Self::new(Major::Statement, Minor::Other);
    pub const NORMAL_LIST: Self = Self::new(Major::List, Minor::Normal);
    pub const FORMAT_LIST: Self = Self::new(Major::List, Minor::Format);
    pub const VALUE_LIST: Self = Self::new(Major::List, Minor::Value);
    pub const VALUE_ROW: Self = Self::new(Major::List, Minor::ValueRow);
    pub const COLUMN: Self = Self::new(Major::Endpoint, Minor::Column);
    pub const TABLE: Self = Self::new(Major::Endpoint, Minor::Table);
    pub const SCHEMA: Self = Self::new(Major::Endpoint, Minor::Schema);
    pub const INTEGER: Self = Self::new(Major::Endpoint, Minor::Integer);
    pub const FLOAT: Self = Self::new(Major::Endpoint, Minor::Float);
    pub const TEXT: Self = Self::new(Major::Endpoint, Minor::Text);
    pub const NULL: Self = Self::new(Major::Endpoint, Minor::Null);
    pub const PLACEHOLDER: Self = Self::new(Major::Endpoint, Minor::Placeholder);

    pub const fn new(major: Major, minor: Minor) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    ty: NodeType,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> NodeType {
        self.ty
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} does not exist in this tree")]
    UnknownNode(NodeId),
    #[error("node {0} has no parent")]
    Detached(NodeId),
    #[error("attaching {child} under {parent} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
    #[error("position {position} out of range for node {parent} with {len} children")]
    PositionOutOfRange {
        parent: NodeId,
        position: usize,
        len: usize,
    },
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Arena of statement nodes rooted at a single node.
///
/// Nodes refer to each other by [`NodeId`]; every node has at most one
/// parent, and ids of freed nodes are never handed out again.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementTree {
    nodes: Vec<Option<Node>>,
    root: NodeId,
}

impl StatementTree {
    pub fn new(root_name: impl Into<String>, root_ty: NodeType) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.create_node(root_name, root_ty);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn get(&self, id: NodeId) -> TreeResult<&Node> {
        self.node(id).ok_or(TreeError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> TreeResult<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TreeError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(Node::name)
    }

    pub fn ty(&self, id: NodeId) -> Option<NodeType> {
        self.node(id).map(Node::ty)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::parent)
    }

    /// Children of `id`, empty for unknown nodes.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(Node::children).unwrap_or(&[])
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> TreeResult<()> {
        self.get_mut(id)?.name = name.into();
        Ok(())
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Pre-order listing of `from` and everything below it.
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(from) {
            return out;
        }
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Depth-first search for the first node at or below `from` with type `ty`.
    pub fn find_type(&self, from: NodeId, ty: NodeType) -> Option<NodeId> {
        self.find(from, |node| node.ty == ty)
    }

    /// Depth-first search for the first node at or below `from` whose payload
    /// equals `name`.
    pub fn find_name(&self, from: NodeId, name: &str) -> Option<NodeId> {
        self.find(from, |node| node.name == name)
    }

    fn find(&self, from: NodeId, pred: impl Fn(&Node) -> bool) -> Option<NodeId> {
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            if pred(node) {
                return Some(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    /// Ordinal position of `id` among its parent's children.
    pub fn parent_index_of(&self, id: NodeId) -> Option<usize> {
        self.parent_position(id).ok().map(|(_, position)| position)
    }

    pub fn parent_position(&self, id: NodeId) -> TreeResult<(NodeId, usize)> {
        let parent = self.get(id)?.parent.ok_or(TreeError::Detached(id))?;
        let position = self
            .get(parent)?
            .children
            .iter()
            .position(|&child| child == id)
            .ok_or(TreeError::Detached(id))?;
        Ok((parent, position))
    }

    /// Allocates a parentless node.
    pub fn create_node(&mut self, name: impl Into<String>, ty: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            name: name.into(),
            ty,
            parent: None,
            children: Vec::new(),
        }));
        id
    }

    /// Appends `child` as the last child of `parent`, moving it out of its
    /// previous parent if it had one.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.get(parent)?;
        self.get(child)?;
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(TreeError::Cycle { parent, child });
            }
            cursor = self.parent(id);
        }

        if let Some(old_parent) = self.get(child)?.parent {
            self.get_mut(old_parent)?.children.retain(|&c| c != child);
        }
        self.get_mut(child)?.parent = Some(parent);
        self.get_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Removes the child at `position` under `parent` and frees its subtree.
    pub fn detach(&mut self, parent: NodeId, position: usize) -> TreeResult<()> {
        let node = self.get_mut(parent)?;
        let len = node.children.len();
        if position >= len {
            return Err(TreeError::PositionOutOfRange {
                parent,
                position,
                len,
            });
        }
        let child = node.children.remove(position);
        for id in self.descendants(child) {
            self.nodes[id.0] = None;
        }
        Ok(())
    }

    /// Collapses a chain of single-child generic list wrappers sitting at the
    /// first position under `root`: the innermost wrapper's elements take the
    /// outermost wrapper's place, in order, and the wrappers are freed.
    ///
    /// Returns whether the tree changed.
    pub fn eliminate_wrapper_lists(&mut self, root: NodeId) -> TreeResult<bool> {
        let Some(&outer) = self.get(root)?.children.first() else {
            return Ok(false);
        };
        if self.ty(outer) != Some(NodeType::NORMAL_LIST) {
            return Ok(false);
        }

        let mut chain = vec![outer];
        let mut inner = outer;
        loop {
            match self.children(inner) {
                [only] if self.ty(*only) == Some(NodeType::NORMAL_LIST) => {
                    inner = *only;
                    chain.push(inner);
                }
                _ => break,
            }
        }

        let elements = std::mem::take(&mut self.get_mut(inner)?.children);
        for &element in &elements {
            self.get_mut(element)?.parent = Some(root);
        }
        let children = &mut self.get_mut(root)?.children;
        let rest = children.split_off(1);
        children.clear();
        children.extend(elements);
        children.extend(rest);
        for wrapper in chain {
            self.nodes[wrapper.0] = None;
        }
        Ok(true)
    }

    /// Indented multi-line rendering of the tree for diagnostics.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            out.push_str(&"  ".repeat(depth));
            out.push_str(&format!("{} {:?}\n", node.ty, node.name));
            stack.extend(node.children.iter().rev().map(|&c| (c, depth + 1)));
        }
        out
    }
}

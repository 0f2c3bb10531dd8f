//! The logical node tree: light trees, shadow roots and insertion points.
//!
//! Nodes live in an arena owned by [`Document`] and are referred to by [`NodeId`].
//! The same ids identify nodes in a [`LiveTree`](`crate::live::LiveTree`), which is what makes reconciliation identity-preserving.

use crate::error::{Error, Result};
use core::fmt::{self, Debug, Formatter};
use tracing::trace;

/// Stable identity of a node for as long as the owning [`Document`] exists.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);
impl NodeId {
	#[must_use]
	pub fn index(self) -> usize {
		self.0 as usize
	}
}
impl Debug for NodeId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
	pub tag: String,
	pub attributes: Vec<(String, String)>,
}
impl Element {
	#[must_use]
	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
	}

	pub fn classes(&self) -> impl Iterator<Item = &str> {
		self.attribute("class").into_iter().flat_map(str::split_ascii_whitespace)
	}
}

/// Classification of a slot inside a shadow tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertionPoint {
	/// Claims pool nodes matching `select`. An absent or blank filter matches every node.
	Selecting { select: Option<String> },
	/// Shows whatever the next-older shadow tree would have shown.
	Aggregating,
}
impl InsertionPoint {
	/// The effective filter, trimmed. [`None`] means "match all".
	#[must_use]
	pub fn filter(&self) -> Option<&str> {
		match self {
			InsertionPoint::Selecting { select: Some(select) } => Some(select.trim()).filter(|s| !s.is_empty()),
			InsertionPoint::Selecting { select: None } | InsertionPoint::Aggregating => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
	Document,
	Element(Element),
	Text(String),
	InsertionPoint(InsertionPoint),
	ShadowRoot { host: NodeId, older: Option<NodeId> },
}

#[derive(Debug, Clone)]
struct NodeData {
	kind: NodeKind,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
	shadow_root: Option<NodeId>,
}

/// Arena of logical nodes.
///
/// The tree navigation, shadow-chain and insertion-point classification queries distribution needs all live here.
#[derive(Debug, Clone)]
pub struct Document {
	nodes: Vec<NodeData>,
}
impl Default for Document {
	fn default() -> Self {
		Self::new()
	}
}
impl Document {
	#[must_use]
	pub fn new() -> Self {
		Self {
			nodes: vec![NodeData {
				kind: NodeKind::Document,
				parent: None,
				children: Vec::new(),
				shadow_root: None,
			}],
		}
	}

	/// The document node every light tree ultimately hangs off.
	#[must_use]
	pub fn root(&self) -> NodeId {
		NodeId(0)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		false
	}

	#[allow(clippy::cast_possible_truncation)]
	pub fn ids(&self) -> impl Iterator<Item = NodeId> {
		(0..self.nodes.len() as u32).map(NodeId)
	}

	#[must_use]
	pub fn contains(&self, node: NodeId) -> bool {
		node.index() < self.nodes.len()
	}

	fn data(&self, node: NodeId) -> Result<&NodeData> {
		self.nodes.get(node.index()).ok_or(Error::UnknownNode(node))
	}

	fn data_mut(&mut self, node: NodeId) -> Result<&mut NodeData> {
		self.nodes.get_mut(node.index()).ok_or(Error::UnknownNode(node))
	}

	fn allocate(&mut self, kind: NodeKind) -> NodeId {
		#[allow(clippy::cast_possible_truncation)]
		let id = NodeId(self.nodes.len() as u32);
		self.nodes.push(NodeData {
			kind,
			parent: None,
			children: Vec::new(),
			shadow_root: None,
		});
		id
	}

	pub fn create_element(&mut self, tag: &str) -> NodeId {
		self.create_element_with(tag, &[])
	}

	pub fn create_element_with(&mut self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
		self.allocate(NodeKind::Element(Element {
			tag: tag.to_owned(),
			attributes: attributes.iter().map(|&(n, v)| (n.to_owned(), v.to_owned())).collect(),
		}))
	}

	pub fn create_text(&mut self, text: &str) -> NodeId {
		self.allocate(NodeKind::Text(text.to_owned()))
	}

	/// Creates a selecting insertion point. `select` of [`None`] claims every node in the pool.
	pub fn create_content(&mut self, select: Option<&str>) -> NodeId {
		self.allocate(NodeKind::InsertionPoint(InsertionPoint::Selecting { select: select.map(ToOwned::to_owned) }))
	}

	/// Creates an aggregating insertion point.
	pub fn create_shadow_insertion_point(&mut self) -> NodeId {
		self.allocate(NodeKind::InsertionPoint(InsertionPoint::Aggregating))
	}

	pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
		match &mut self.data_mut(node)?.kind {
			NodeKind::Element(element) => {
				match element.attributes.iter_mut().find(|(n, _)| n == name) {
					Some((_, v)) => *v = value.to_owned(),
					None => element.attributes.push((name.to_owned(), value.to_owned())),
				}
				Ok(())
			}
			NodeKind::InsertionPoint(InsertionPoint::Selecting { select }) if name == "select" => {
				*select = Some(value.to_owned());
				Ok(())
			}
			_ => Err(Error::UnknownNode(node)),
		}
	}

	pub fn kind(&self, node: NodeId) -> Result<&NodeKind> {
		Ok(&self.data(node)?.kind)
	}

	#[must_use]
	pub fn element(&self, node: NodeId) -> Option<&Element> {
		match self.data(node).ok()?.kind {
			NodeKind::Element(ref element) => Some(element),
			_ => None,
		}
	}

	#[must_use]
	pub fn insertion_point(&self, node: NodeId) -> Option<&InsertionPoint> {
		match self.data(node).ok()?.kind {
			NodeKind::InsertionPoint(ref point) => Some(point),
			_ => None,
		}
	}

	#[must_use]
	pub fn is_insertion_point(&self, node: NodeId) -> bool {
		self.insertion_point(node).is_some()
	}

	#[must_use]
	pub fn is_shadow_root(&self, node: NodeId) -> bool {
		matches!(self.data(node).map(|d| &d.kind), Ok(NodeKind::ShadowRoot { .. }))
	}

	#[must_use]
	pub fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.data(node).ok()?.parent
	}

	/// Ordered children. Unknown nodes have none.
	#[must_use]
	pub fn children(&self, node: NodeId) -> &[NodeId] {
		self.data(node).map_or(&[], |d| d.children.as_slice())
	}

	#[must_use]
	pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
		self.children(node).first().copied()
	}

	#[must_use]
	pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
		let siblings = self.children(self.parent(node)?);
		let position = siblings.iter().position(|&s| s == node)?;
		siblings.get(position + 1).copied()
	}

	/// The topmost ancestor of `node`: the document, a shadow root, or a detached subtree's root.
	#[must_use]
	pub fn tree_scope_root(&self, mut node: NodeId) -> NodeId {
		while let Some(parent) = self.parent(node) {
			node = parent;
		}
		node
	}

	#[must_use]
	pub fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
		self.data(host).ok()?.shadow_root
	}

	#[must_use]
	pub fn is_shadow_host(&self, node: NodeId) -> bool {
		self.shadow_root(node).is_some()
	}

	#[must_use]
	pub fn older_shadow_root(&self, root: NodeId) -> Option<NodeId> {
		match self.data(root).ok()?.kind {
			NodeKind::ShadowRoot { older, .. } => older,
			_ => None,
		}
	}

	#[must_use]
	pub fn shadow_host(&self, root: NodeId) -> Option<NodeId> {
		match self.data(root).ok()?.kind {
			NodeKind::ShadowRoot { host, .. } => Some(host),
			_ => None,
		}
	}

	/// The host whose shadow tree (transitively) contains `node`, if any.
	#[must_use]
	pub fn containing_host(&self, node: NodeId) -> Option<NodeId> {
		self.shadow_host(self.tree_scope_root(node))
	}

	/// Creates a new, youngest shadow root on `host`. A previous shadow root becomes its older shadow root.
	pub fn attach_shadow(&mut self, host: NodeId) -> Result<NodeId> {
		let older = match &self.data(host)?.kind {
			NodeKind::Element(_) => self.shadow_root(host),
			_ => return Err(Error::InvalidShadowHost(host)),
		};
		let root = self.allocate(NodeKind::ShadowRoot { host, older });
		self.data_mut(host)?.shadow_root = Some(root);
		trace!(?host, ?root, ?older, "Attached shadow root.");
		Ok(root)
	}

	/// Rewires the older-shadow-root chain directly.
	///
	/// Nothing here prevents cycles; distribution reports them as [`Error::CyclicShadowChain`].
	pub fn set_older_shadow_root(&mut self, root: NodeId, new_older: Option<NodeId>) -> Result<()> {
		if let Some(new_older) = new_older {
			if !self.is_shadow_root(new_older) {
				return Err(Error::InvalidShadowHost(new_older));
			}
		}
		match &mut self.data_mut(root)?.kind {
			NodeKind::ShadowRoot { older, .. } => {
				*older = new_older;
				Ok(())
			}
			_ => Err(Error::InvalidShadowHost(root)),
		}
	}

	pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
		self.insert_before(parent, child, None)
	}

	/// Inserts `child` into `parent` before `reference`, detaching it from its previous parent first.
	pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> Result<()> {
		self.data(parent)?;
		if self.is_shadow_root(child) || child == self.root() {
			return Err(Error::ShadowRootNotInsertable(child));
		}
		let mut ancestor = Some(parent);
		while let Some(a) = ancestor {
			if a == child {
				return Err(Error::HierarchyCycle { parent, node: child });
			}
			ancestor = self.parent(a);
		}
		if let Some(reference) = reference {
			if self.parent(reference) != Some(parent) || reference == child {
				return Err(Error::NotAChild { parent, node: reference });
			}
		}

		self.detach(child)?;
		let position = match reference {
			Some(reference) => self.children(parent).iter().position(|&c| c == reference).ok_or(Error::NotAChild { parent, node: reference })?,
			None => self.children(parent).len(),
		};
		self.data_mut(parent)?.children.insert(position, child);
		self.data_mut(child)?.parent = Some(parent);
		Ok(())
	}

	pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
		if self.parent(child) != Some(parent) {
			return Err(Error::NotAChild { parent, node: child });
		}
		self.detach(child)
	}

	fn detach(&mut self, child: NodeId) -> Result<()> {
		if let Some(old_parent) = self.data_mut(child)?.parent.take() {
			self.data_mut(old_parent)?.children.retain(|&c| c != child);
		}
		Ok(())
	}

	/// Short structural description for log messages.
	///
	/// Text content is only included with the `dangerous-logging` feature.
	#[must_use]
	pub fn describe(&self, node: NodeId) -> String {
		match self.data(node).map(|d| &d.kind) {
			Err(_) => format!("{:?} (unknown)", node),
			Ok(NodeKind::Document) => format!("{:?} #document", node),
			Ok(NodeKind::Element(element)) => format!("{:?} <{}>", node, element.tag),
			Ok(NodeKind::Text(text)) => {
				if cfg!(feature = "dangerous-logging") {
					format!("{:?} #text {:?}", node, text)
				} else {
					format!("{:?} #text", node)
				}
			}
			Ok(NodeKind::InsertionPoint(InsertionPoint::Selecting { select })) => format!("{:?} <content select={:?}>", node, select),
			Ok(NodeKind::InsertionPoint(InsertionPoint::Aggregating)) => format!("{:?} <shadow>", node),
			Ok(NodeKind::ShadowRoot { host, .. }) => format!("{:?} #shadow-root (host {:?})", node, host),
		}
	}
}

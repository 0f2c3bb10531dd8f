//! Snapshots of the composed tree, which is what the live tree should look like.

use crate::{
	distribution::Distribution,
	scheduler::{RendererId, Scheduler},
	tree::{Document, NodeId},
};
use hashbrown::HashMap;
use tracing::{instrument, trace};

/// One node of a desired tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderNode {
	/// Children are reconciled as part of the current pass.
	Local { node: NodeId, children: Vec<RenderNode> },
	/// An up-to-date subtree owned by another renderer. Positioned, but never reconciled locally.
	Delegated { node: NodeId, owner: RendererId },
}
impl RenderNode {
	#[must_use]
	pub fn node(&self) -> NodeId {
		match *self {
			RenderNode::Local { node, .. } | RenderNode::Delegated { node, .. } => node,
		}
	}

	#[must_use]
	pub fn children(&self) -> &[RenderNode] {
		match self {
			RenderNode::Local { children, .. } => children,
			RenderNode::Delegated { .. } => &[],
		}
	}

	/// Total number of nodes, including `self`.
	#[must_use]
	pub fn len(&self) -> usize {
		let mut len = 0;
		let mut stack = vec![self];
		while let Some(node) = stack.pop() {
			len += 1;
			stack.extend(node.children());
		}
		len
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		false
	}
}

/// Which renderer's composition last placed each node.
pub type Associations = HashMap<NodeId, RendererId>;

pub struct RenderTreeBuilder<'a> {
	pub document: &'a Document,
	pub distribution: &'a Distribution,
	pub scheduler: &'a Scheduler,
}
impl RenderTreeBuilder<'_> {
	/// `node`'s composed children: the children of its youngest shadow root (or its own),
	/// with insertion points replaced by the nodes that end up there.
	#[must_use]
	pub fn compose(&self, node: NodeId) -> Vec<NodeId> {
		let base = self.document.shadow_root(node).unwrap_or(node);
		let mut composed = Vec::with_capacity(self.document.children(base).len());
		for &child in self.document.children(base) {
			if self.document.is_insertion_point(child) {
				composed.extend(
					self.distribution
						.distributed_nodes(child)
						.iter()
						.copied()
						.filter(|&distributed| self.distribution.is_final_destination(child, distributed)),
				);
			} else {
				composed.push(child);
			}
		}
		composed
	}

	/// A clean host's live children can be left alone if none of its light tree shows up in its composition.
	fn is_delegable(&self, host: NodeId) -> Option<RendererId> {
		let renderer = self.scheduler.renderer_for_host(host)?;
		if self.scheduler.is_dirty(renderer) {
			return None;
		}
		let shows_light_tree = self.document.children(host).iter().any(|&child| {
			if self.document.is_insertion_point(child) {
				!self.distribution.distributed_nodes(child).is_empty()
			} else {
				!self.distribution.destination_insertion_points(child).is_empty()
			}
		});
		if shows_light_tree {
			None
		} else {
			Some(renderer)
		}
	}

	/// Builds the desired tree below `root` and records the owning renderer of every placed node in `associations`.
	///
	/// Also returns the renderers of nested shadow hosts that were built locally rather than delegated.
	/// Once the tree is reconciled, they are up to date as well.
	#[instrument(skip(self, associations))]
	pub fn build_render_tree(&self, root: NodeId, associations: &mut Associations) -> (RenderNode, Vec<RendererId>) {
		struct Pending {
			node: NodeId,
			owner: Option<RendererId>,
			delegated: Option<RendererId>,
			children: Vec<usize>,
		}

		let mut flat = vec![Pending {
			node: root,
			owner: self.scheduler.renderer_for_host(root),
			delegated: None,
			children: Vec::new(),
		}];
		let mut stack = vec![0];
		while let Some(i) = stack.pop() {
			if flat[i].delegated.is_some() {
				continue;
			}
			let node = flat[i].node;
			let own_renderer = self.scheduler.renderer_for_host(node);
			let owner = own_renderer.or(flat[i].owner);
			if let (Some(shadow_root), Some(owner)) = (self.document.shadow_root(node), owner) {
				associations.insert(shadow_root, owner);
			}

			for child in self.compose(node) {
				if let Some(owner) = owner {
					associations.insert(child, owner);
				}
				let j = flat.len();
				flat.push(Pending {
					node: child,
					owner,
					delegated: self.is_delegable(child),
					children: Vec::new(),
				});
				flat[i].children.push(j);
				stack.push(j);
			}
		}

		// Children always come after their parent, so assembling back to front sees them finished.
		let mut built: Vec<Option<RenderNode>> = Vec::with_capacity(flat.len());
		built.resize_with(flat.len(), || None);
		let mut covered = Vec::new();
		for (i, pending) in flat.iter().enumerate().rev() {
			built[i] = Some(match pending.delegated {
				Some(owner) => {
					trace!(node = ?pending.node, ?owner, "Delegating subtree.");
					RenderNode::Delegated { node: pending.node, owner }
				}
				None => {
					if i != 0 {
						covered.extend(self.scheduler.renderer_for_host(pending.node));
					}
					RenderNode::Local {
						node: pending.node,
						children: pending.children.iter().filter_map(|&j| built[j].take()).collect(),
					}
				}
			});
		}

		let tree = built[0].take().unwrap_or(RenderNode::Local { node: root, children: Vec::new() });
		(tree, covered)
	}
}

//! Applies a desired [`RenderNode`] tree to a [`LiveTree`] with as few child list mutations as possible.

use crate::{
	error::{Error, Result},
	live::LiveTree,
	render_tree::RenderNode,
	splice::calculate_splices,
	temp_set::TempNodeSet,
	tree::NodeId,
};
use tracing::{info, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

/// Above this capacity of the per-pass set of inserted nodes, a warning is logged after each pass.
pub const ADDED_SET_WARN_CAPACITY: usize = 100;

/// Mutations applied by one [`Reconciler::sync`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
	pub inserted: usize,
	pub removed: usize,
}
impl SyncStats {
	#[must_use]
	pub fn mutations(self) -> usize {
		self.inserted + self.removed
	}
}

#[derive(Debug, Default)]
pub struct Reconciler {
	added: TempNodeSet,
}
impl Reconciler {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes the live children of every [`RenderNode::Local`] node below and including `root` match the desired ones.
	///
	/// Nodes that stay in place are never detached. Nodes that move within the pass are inserted once and not removed.
	/// [`RenderNode::Delegated`] subtrees are positioned but their contents are left alone.
	///
	/// # Errors
	///
	/// [`Error::StaleSnapshot`] if the live tree no longer matches the snapshot taken of a parent's children,
	/// which means it was changed out of band. Mutations applied up to that point are kept.
	#[instrument(skip(self, root, live), fields(root = ?root.node()))]
	pub fn sync(&mut self, root: &RenderNode, live: &mut dyn LiveTree) -> Result<SyncStats> {
		let added = self.added.temp();
		let mut stats = SyncStats::default();

		let mut stack = vec![root];
		while let Some(render_node) = stack.pop() {
			let children = match render_node {
				RenderNode::Local { children, .. } => children,
				RenderNode::Delegated { node, owner } => {
					trace!(?node, ?owner, "Skipping delegated subtree.");
					continue;
				}
			};
			let parent = render_node.node();
			let span = trace_span!("Syncing child list", ?parent);
			let _enter = span.enter();

			let snapshot = live.child_nodes(parent);
			let desired: Vec<NodeId> = children.iter().map(RenderNode::node).collect();
			let splices = calculate_splices(&desired, &snapshot, |a, b| a == b);
			trace!(splices = splices.len());

			let stale = |error: Error| match error {
				Error::NotAChild { .. } => Error::StaleSnapshot { parent },
				other => other,
			};

			let mut recurse = Vec::with_capacity(children.len());
			let mut last_index = 0;
			let mut old_index = 0;
			for splice in &splices {
				recurse.extend(&children[last_index..splice.index]);
				old_index += splice.index - last_index;

				for &removed in &splice.removed {
					if added.contains(&removed) {
						trace!(?removed, "Already moved.");
					} else {
						live.remove_child(parent, removed).map_err(stale)?;
						stats.removed += 1;
					}
				}
				old_index += splice.removed.len();

				let reference = snapshot.get(old_index).copied();
				for child in &children[splice.added()] {
					let node = child.node();
					live.insert_before(parent, node, reference).map_err(stale)?;
					added.insert(node);
					stats.inserted += 1;
					recurse.push(child);
				}
				last_index = splice.index + splice.added_count;
			}
			recurse.extend(&children[last_index..]);

			stack.extend(recurse.into_iter().rev());
		}

		info!("Diff heap capacity (added nodes): {}", self.added.capacity());
		if STATIC_MAX_LEVEL >= Level::WARN && self.added.capacity() >= ADDED_SET_WARN_CAPACITY {
			warn!(
				"The added node set capacity is large ({}).\n\
				This may point to large unstable child lists.",
				self.added.capacity()
			);
		}
		Ok(stats)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		live::{LiveDom, MutationCounts},
		scheduler::Scheduler,
		tree::Document,
	};

	fn leaf(node: NodeId) -> RenderNode {
		RenderNode::Local { node, children: Vec::new() }
	}

	fn local(node: NodeId, children: &[NodeId]) -> RenderNode {
		RenderNode::Local {
			node,
			children: children.iter().copied().map(leaf).collect(),
		}
	}

	fn setup(count: usize) -> (NodeId, Vec<NodeId>) {
		let mut doc = Document::new();
		let parent = doc.create_element("div");
		(parent, (0..count).map(|_| doc.create_element("span")).collect())
	}

	#[test]
	fn replaced_middle_child() {
		let (parent, n) = setup(4);
		let (a, b, c, d) = (n[0], n[1], n[2], n[3]);
		let mut live = LiveDom::new();
		for &child in &[a, b, d] {
			live.push_child(parent, child);
		}

		let stats = Reconciler::new().sync(&local(parent, &[a, c, d]), &mut live).unwrap();
		assert_eq!(live.child_nodes(parent), vec![a, c, d]);
		assert_eq!(stats, SyncStats { inserted: 1, removed: 1 });
	}

	#[test]
	fn stable_children_are_left_alone() {
		let (parent, n) = setup(3);
		let mut live = LiveDom::new();
		for &child in &n {
			live.push_child(parent, child);
		}

		let stats = Reconciler::new().sync(&local(parent, &n), &mut live).unwrap();
		assert_eq!(stats.mutations(), 0);
		assert_eq!(live.counts(), MutationCounts::default());
	}

	#[test]
	fn moves_are_not_removed_again() {
		let (parent, n) = setup(3);
		let (a, b, c) = (n[0], n[1], n[2]);
		let mut live = LiveDom::new();
		for &child in &[a, b, c] {
			live.push_child(parent, child);
		}

		let stats = Reconciler::new().sync(&local(parent, &[a, c, b]), &mut live).unwrap();
		assert_eq!(live.child_nodes(parent), vec![a, c, b]);
		assert_eq!(stats, SyncStats { inserted: 1, removed: 0 });
		assert_eq!(live.counts(), MutationCounts { inserted: 1, removed: 0, moved: 1 });
	}

	#[test]
	fn recurses_into_local_but_not_delegated_children() {
		let (parent, n) = setup(4);
		let (local_child, delegated_child, x, y) = (n[0], n[1], n[2], n[3]);
		let scheduler = Scheduler::manual();
		let owner = scheduler.register(delegated_child, None);

		let mut live = LiveDom::new();
		live.push_child(delegated_child, y);
		let desired = RenderNode::Local {
			node: parent,
			children: vec![local(local_child, &[x]), RenderNode::Delegated { node: delegated_child, owner }],
		};

		let stats = Reconciler::new().sync(&desired, &mut live).unwrap();
		assert_eq!(stats, SyncStats { inserted: 3, removed: 0 });
		assert_eq!(live.child_nodes(parent), vec![local_child, delegated_child]);
		assert_eq!(live.child_nodes(local_child), vec![x]);
		assert_eq!(live.child_nodes(delegated_child), vec![y]);
	}

	#[test]
	fn out_of_band_removal_is_reported_as_stale() {
		struct Meddling(LiveDom, NodeId);
		impl LiveTree for Meddling {
			fn parent(&self, node: NodeId) -> Option<NodeId> {
				self.0.parent(node)
			}
			fn first_child(&self, node: NodeId) -> Option<NodeId> {
				self.0.first_child(node)
			}
			fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
				self.0.next_sibling(node)
			}
			fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> Result<()> {
				self.0.insert_before(parent, node, reference)
			}
			fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<()> {
				let victim = self.1;
				let _ = self.0.remove_child(parent, victim);
				self.0.remove_child(parent, node)
			}
		}

		let (parent, n) = setup(2);
		let mut live = LiveDom::new();
		live.push_child(parent, n[0]);
		let mut meddling = Meddling(live, n[0]);

		assert_eq!(Reconciler::new().sync(&local(parent, &[]), &mut meddling), Err(Error::StaleSnapshot { parent }));
	}
}

//! The live tree that reconciliation mutates.

use crate::{
	error::{Error, Result},
	splice::{Splice, SpliceMerger},
	tree::NodeId,
};
use hashbrown::HashMap;
use tracing::trace;

/// Navigation and the two mutation primitives reconciliation needs.
///
/// Node identity is shared with the logical [`Document`](`crate::tree::Document`).
pub trait LiveTree {
	fn parent(&self, node: NodeId) -> Option<NodeId>;
	fn first_child(&self, node: NodeId) -> Option<NodeId>;
	fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

	/// Inserts `node` into `parent` before `reference` (or last), detaching it from its current parent first.
	///
	/// # Errors
	///
	/// [`Error::NotAChild`] if `reference` is not a child of `parent`.
	fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> Result<()>;

	/// # Errors
	///
	/// [`Error::NotAChild`] if `node` is not a child of `parent`.
	fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<()>;

	/// Plain snapshot of `parent`'s current children.
	fn child_nodes(&self, parent: NodeId) -> Vec<NodeId> {
		let mut children = Vec::new();
		let mut next = self.first_child(parent);
		while let Some(child) = next {
			children.push(child);
			next = self.next_sibling(child);
		}
		children
	}
}

/// How often each primitive was applied to a [`LiveDom`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MutationCounts {
	pub inserted: usize,
	pub removed: usize,
	/// Insertions of nodes that still had a parent, which implies a detach.
	pub moved: usize,
}

/// In-memory [`LiveTree`].
///
/// Can optionally journal child list changes per parent as coalesced splices.
#[derive(Debug, Default, Clone)]
pub struct LiveDom {
	parents: HashMap<NodeId, NodeId>,
	children: HashMap<NodeId, Vec<NodeId>>,
	counts: MutationCounts,
	journal: Option<HashMap<NodeId, SpliceMerger<NodeId>>>,
}
impl LiveDom {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts recording child list changes, see [`LiveDom::take_journal`].
	pub fn enable_journal(&mut self) {
		self.journal.get_or_insert_with(HashMap::new);
	}

	#[must_use]
	pub fn children(&self, parent: NodeId) -> &[NodeId] {
		self.children.get(&parent).map_or(&[], Vec::as_slice)
	}

	#[must_use]
	pub fn counts(&self) -> MutationCounts {
		self.counts
	}

	pub fn reset_counts(&mut self) {
		self.counts = MutationCounts::default();
	}

	/// The minimal splices that turn `parent`'s children as of the last call (or [`LiveDom::enable_journal`]) into the current ones.
	///
	/// Empty if journaling is disabled.
	pub fn take_journal(&mut self, parent: NodeId) -> Vec<Splice<NodeId>> {
		let merger = match self.journal.as_mut().and_then(|journal| journal.remove(&parent)) {
			Some(merger) => merger,
			None => return Vec::new(),
		};
		merger.project(self.children(parent), |a, b| a == b)
	}

	fn record(&mut self, parent: NodeId, index: usize, removed: Vec<NodeId>, added_count: usize) {
		if let Some(journal) = &mut self.journal {
			journal.entry(parent).or_default().push(index, removed, added_count);
		}
	}

	/// Appends without any checks. Used to mirror an existing tree.
	pub(crate) fn push_child(&mut self, parent: NodeId, child: NodeId) {
		self.children.entry(parent).or_default().push(child);
		self.parents.insert(child, parent);
	}

	fn detach(&mut self, node: NodeId) -> Option<NodeId> {
		let parent = self.parents.remove(&node)?;
		let siblings = self.children.get_mut(&parent)?;
		let index = siblings.iter().position(|&c| c == node)?;
		siblings.remove(index);
		self.record(parent, index, vec![node], 0);
		Some(parent)
	}
}
impl LiveTree for LiveDom {
	fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.parents.get(&node).copied()
	}

	fn first_child(&self, node: NodeId) -> Option<NodeId> {
		self.children(node).first().copied()
	}

	fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
		let siblings = self.children(self.parent(node)?);
		let index = siblings.iter().position(|&c| c == node)?;
		siblings.get(index + 1).copied()
	}

	fn child_nodes(&self, parent: NodeId) -> Vec<NodeId> {
		self.children(parent).to_vec()
	}

	fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> Result<()> {
		if let Some(reference) = reference {
			if self.parent(reference) != Some(parent) || reference == node {
				return Err(Error::NotAChild { parent, node: reference });
			}
		}
		let mut ancestor = Some(parent);
		while let Some(a) = ancestor {
			if a == node {
				return Err(Error::HierarchyCycle { parent, node });
			}
			ancestor = self.parent(a);
		}

		if let Some(old_parent) = self.detach(node) {
			trace!(?node, ?old_parent, "Detached for insertion.");
			self.counts.moved += 1;
		}
		let siblings = self.children.entry(parent).or_default();
		let index = match reference {
			Some(reference) => siblings.iter().position(|&c| c == reference).ok_or(Error::NotAChild { parent, node: reference })?,
			None => siblings.len(),
		};
		siblings.insert(index, node);
		self.parents.insert(node, parent);
		self.counts.inserted += 1;
		self.record(parent, index, Vec::new(), 1);
		Ok(())
	}

	fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<()> {
		if self.parent(node) != Some(parent) {
			return Err(Error::NotAChild { parent, node });
		}
		self.detach(node);
		self.counts.removed += 1;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tree::Document;

	#[test]
	fn insert_remove_and_journal() {
		let mut doc = Document::new();
		let parent = doc.create_element("ul");
		let items: Vec<NodeId> = (0..4).map(|_| doc.create_element("li")).collect();

		let mut live = LiveDom::new();
		for &item in &items[..3] {
			live.push_child(parent, item);
		}
		live.enable_journal();

		live.insert_before(parent, items[3], Some(items[0])).unwrap();
		live.remove_child(parent, items[1]).unwrap();
		live.insert_before(parent, items[2], Some(items[3])).unwrap();
		assert_eq!(live.child_nodes(parent), vec![items[2], items[3], items[0]]);
		assert_eq!(live.counts(), MutationCounts { inserted: 2, removed: 1, moved: 1 });

		let mut replayed = items[..3].to_vec();
		let journal = live.take_journal(parent);
		crate::splice::apply_splices(&mut replayed, live.children(parent), &journal);
		assert_eq!(replayed, live.child_nodes(parent));
		assert!(live.take_journal(parent).is_empty());
	}

	#[test]
	fn rejects_foreign_reference_and_cycles() {
		let mut doc = Document::new();
		let a = doc.create_element("a");
		let b = doc.create_element("b");
		let c = doc.create_element("c");
		let mut live = LiveDom::new();
		live.push_child(a, b);

		assert_eq!(live.insert_before(a, c, Some(c)), Err(Error::NotAChild { parent: a, node: c }));
		assert_eq!(live.insert_before(b, a, None), Err(Error::HierarchyCycle { parent: b, node: a }));
		assert_eq!(live.remove_child(b, a), Err(Error::NotAChild { parent: b, node: a }));
		assert_eq!(live.counts(), MutationCounts::default());
	}
}

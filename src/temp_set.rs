use crate::tree::NodeId;
use hashbrown::HashSet;

/// Reusable identity set for the nodes inserted during one reconciliation pass.
#[derive(Debug, Default)]
pub struct TempNodeSet(HashSet<NodeId>);
impl TempNodeSet {
	#[must_use]
	pub fn new() -> Self {
		Self(HashSet::new())
	}

	/// Clears the set and lends it out, keeping the allocation between passes.
	pub fn temp(&mut self) -> &mut HashSet<NodeId> {
		self.0.clear();
		&mut self.0
	}

	/// Capacity kept from earlier passes. Does not clear the set.
	#[must_use]
	pub fn capacity(&self) -> usize {
		self.0.capacity()
	}
}

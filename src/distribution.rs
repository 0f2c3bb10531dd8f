//! Assignment of light-tree nodes to the insertion points of (chains of) shadow trees.
//!
//! Results are kept in side tables keyed by [`NodeId`]: distributed nodes per insertion point,
//! and per node the ordered insertion points it was distributed through.

use crate::{
	error::{Error, Result},
	selector::SelectorMatcher,
	tree::{Document, InsertionPoint, NodeId},
};
use hashbrown::{HashMap, HashSet};
use tracing::{instrument, trace, trace_span, warn};

#[derive(Debug, Default, Clone)]
pub struct Distribution {
	distributed: HashMap<NodeId, Vec<NodeId>>,
	destinations: HashMap<NodeId, Vec<NodeId>>,
}
impl Distribution {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// The nodes finally or transitively assigned to `point` during the last pass.
	#[must_use]
	pub fn distributed_nodes(&self, point: NodeId) -> &[NodeId] {
		self.distributed.get(&point).map_or(&[], Vec::as_slice)
	}

	/// The insertion points `node` was distributed through, outermost first.
	#[must_use]
	pub fn destination_insertion_points(&self, node: NodeId) -> &[NodeId] {
		self.destinations.get(&node).map_or(&[], Vec::as_slice)
	}

	/// Whether `point` is the last insertion point `node` passed through.
	#[must_use]
	pub fn is_final_destination(&self, point: NodeId, node: NodeId) -> bool {
		self.destination_insertion_points(node).last() == Some(&point)
	}

	/// Drops every table entry keyed by `node`.
	pub fn forget(&mut self, node: NodeId) {
		self.distributed.remove(&node);
		self.destinations.remove(&node);
	}

	fn distribute_node_into(&mut self, node: NodeId, point: NodeId) {
		self.distributed.entry(point).or_default().push(node);
		self.destinations.entry(node).or_default().push(point);
	}

	/// Recomputes the distribution of `host` and of every shadow host nested below it, including older shadow trees.
	///
	/// # Errors
	///
	/// [`Error::CyclicShadowChain`] if an older-shadow-root chain loops. The tables may then be partially reset.
	#[instrument(skip(self, document, matcher))]
	pub fn distribute(&mut self, document: &Document, matcher: &dyn SelectorMatcher, host: NodeId) -> Result<()> {
		if !document.contains(host) {
			return Err(Error::UnknownNode(host));
		}
		self.reset(document, host)?;
		self.resolve(document, matcher, host)
	}

	/// Clears everything [`resolve`](`Distribution::resolve`) recomputes for `start`.
	///
	/// Insertion points in `start`'s own light subtree belong to an enclosing shadow tree and keep their nodes.
	fn reset(&mut self, document: &Document, start: NodeId) -> Result<()> {
		let mut seen_roots = HashSet::new();
		let mut stack = vec![(start, false)];
		while let Some((node, in_shadow_tree)) = stack.pop() {
			if !document.is_insertion_point(node) {
				self.destinations.remove(&node);
			} else if in_shadow_tree {
				// Unwind this hop (and any later ones) from nodes that were redistributed from further out.
				for distributed in self.distributed.remove(&node).unwrap_or_default() {
					if let Some(points) = self.destinations.get_mut(&distributed) {
						if let Some(position) = points.iter().position(|&p| p == node) {
							points.truncate(position);
						}
					}
				}
			}

			stack.extend(document.children(node).iter().map(|&child| (child, in_shadow_tree)));
			if document.is_shadow_host(node) {
				// Chains are checked per host. Another host's older tree may be borrowed, but is only walked once.
				for root in shadow_trees(document, node)? {
					if seen_roots.insert(root) {
						stack.push((root, true));
					}
				}
			}
		}
		Ok(())
	}

	fn resolve(&mut self, document: &Document, matcher: &dyn SelectorMatcher, start: NodeId) -> Result<()> {
		let mut seen_roots = HashSet::new();
		let mut stack = vec![start];
		while let Some(node) = stack.pop() {
			// Children resolve after all shadow trees of `node` did.
			stack.extend(document.children(node).iter().rev());

			if !document.is_shadow_host(node) {
				continue;
			}
			let span = trace_span!("Resolving host", host = %document.describe(node));
			let _enter = span.enter();

			let trees = shadow_trees(document, node)?;
			let mut pool = self.pool_population(document, node);
			for &tree in &trees {
				self.pool_distribution(document, matcher, tree, &mut pool);
			}

			for &tree in trees.iter().rev() {
				if let Some(point) = aggregating_point(document, tree) {
					match document.older_shadow_root(tree) {
						Some(older) => {
							for older_node in self.pool_population(document, older).into_iter().flatten() {
								self.distribute_node_into(older_node, point);
							}
						}
						None => trace!(?point, "No older shadow tree to aggregate."),
					}
				}
			}

			// Youngest first onto the stack, so the oldest tree resolves first.
			stack.extend(trees.into_iter().filter(|&tree| seen_roots.insert(tree)));
		}
		Ok(())
	}

	/// `node`'s children in order, with insertion points replaced by what was distributed into them.
	fn pool_population(&self, document: &Document, node: NodeId) -> Vec<Option<NodeId>> {
		let mut pool = Vec::with_capacity(document.children(node).len());
		for &child in document.children(node) {
			if document.is_insertion_point(child) {
				pool.extend(self.distributed_nodes(child).iter().copied().map(Some));
			} else {
				pool.push(Some(child));
			}
		}
		pool
	}

	fn pool_distribution(&mut self, document: &Document, matcher: &dyn SelectorMatcher, tree: NodeId, pool: &mut [Option<NodeId>]) {
		let mut stack: Vec<NodeId> = document.children(tree).iter().rev().copied().collect();
		while let Some(node) = stack.pop() {
			let filter = match document.insertion_point(node) {
				None => {
					stack.extend(document.children(node).iter().rev());
					continue;
				}
				Some(InsertionPoint::Aggregating) => continue,
				Some(point) => point.filter(),
			};

			let mut any_distributed = false;
			let mut reported = false;
			for slot in pool.iter_mut() {
				let candidate = match *slot {
					Some(candidate) => candidate,
					None => continue,
				};
				let matched = match filter {
					None => true,
					Some(selector) => match document.element(candidate) {
						None => false,
						Some(element) => matcher.matches(element, selector).unwrap_or_else(|error| {
							if !reported {
								warn!(%error, ?node, "Invalid insertion point selector; matching nothing.");
								reported = true;
							}
							false
						}),
					},
				};
				if matched {
					self.distribute_node_into(candidate, node);
					*slot = None;
					any_distributed = true;
				}
			}

			if !any_distributed {
				trace!(?node, "Nothing matched, falling back to own children.");
				for &child in document.children(node) {
					self.distribute_node_into(child, node);
				}
			}
		}
	}
}

/// `host`'s shadow roots, youngest first.
fn shadow_trees(document: &Document, host: NodeId) -> Result<Vec<NodeId>> {
	let mut trees = Vec::new();
	let mut next = document.shadow_root(host);
	while let Some(tree) = next {
		if trees.contains(&tree) {
			return Err(Error::CyclicShadowChain { host });
		}
		trees.push(tree);
		next = document.older_shadow_root(tree);
	}
	Ok(trees)
}

/// The first aggregating insertion point in `tree`, depth first, without looking inside selecting ones.
fn aggregating_point(document: &Document, tree: NodeId) -> Option<NodeId> {
	let mut stack: Vec<NodeId> = document.children(tree).iter().rev().copied().collect();
	while let Some(node) = stack.pop() {
		match document.insertion_point(node) {
			Some(InsertionPoint::Aggregating) => return Some(node),
			Some(InsertionPoint::Selecting { .. }) => (),
			None => stack.extend(document.children(node).iter().rev()),
		}
	}
	None
}

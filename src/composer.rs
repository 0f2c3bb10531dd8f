//! Ties the logical [`Document`], its distribution, the scheduler and reconciliation together.

use crate::{
	distribution::Distribution,
	error::{Error, Result},
	live::LiveTree,
	reconcile::{Reconciler, SyncStats},
	render_tree::{Associations, RenderNode, RenderTreeBuilder},
	scheduler::{RendererId, Scheduler},
	selector::{SelectorMatcher, SimpleSelectors},
	tree::{Document, NodeId},
};
use std::{iter, rc::Rc};
use tracing::{error, instrument, trace, warn};

/// How often a renderer's reconciliation is repeated after the live tree changed under it.
pub const STALE_SNAPSHOT_RETRIES: usize = 1;

/// Owns a [`Document`] and keeps live trees in sync with its composed form.
///
/// Mutations made through the `Composer` invalidate the renderers they affect.
/// Mutations made through [`Composer::document_mut`] are not tracked.
pub struct Composer {
	document: Document,
	distribution: Distribution,
	associations: Associations,
	scheduler: Rc<Scheduler>,
	matcher: Box<dyn SelectorMatcher>,
	reconciler: Reconciler,
}
impl Composer {
	/// Registers renderers for all shadow hosts already in `document` and queues them for the first flush.
	#[must_use]
	pub fn new(document: Document, scheduler: Rc<Scheduler>) -> Self {
		let this = Self {
			document,
			distribution: Distribution::new(),
			associations: Associations::new(),
			scheduler,
			matcher: Box::new(SimpleSelectors),
			reconciler: Reconciler::new(),
		};
		let hosts: Vec<NodeId> = this.document.ids().filter(|&node| this.document.is_shadow_host(node)).collect();
		for host in hosts {
			let renderer = this.register_host(host);
			if let Err(e) = this.scheduler.invalidate(renderer) {
				error!(?host, error = %e, "Could not queue initial render.");
			}
		}
		this
	}

	/// Replaces the built-in [`SimpleSelectors`].
	#[must_use]
	pub fn with_matcher(mut self, matcher: impl SelectorMatcher + 'static) -> Self {
		self.matcher = Box::new(matcher);
		self
	}

	#[must_use]
	pub fn document(&self) -> &Document {
		&self.document
	}

	/// Untracked access. Call [`Composer::invalidate`] for affected hosts afterwards.
	pub fn document_mut(&mut self) -> &mut Document {
		&mut self.document
	}

	#[must_use]
	pub fn scheduler(&self) -> Rc<Scheduler> {
		Rc::clone(&self.scheduler)
	}

	/// Registers `host` and any unregistered hosts containing it, outermost first.
	fn register_host(&self, host: NodeId) -> RendererId {
		let mut chain = vec![host];
		let mut current = host;
		while let Some(container) = self.document.containing_host(current) {
			if self.scheduler.renderer_for_host(container).is_some() || chain.contains(&container) {
				break;
			}
			chain.push(container);
			current = container;
		}

		let mut renderer = None;
		for host in chain.into_iter().rev() {
			renderer = Some(self.scheduler.register(host, self.document.containing_host(host)));
		}
		renderer.unwrap_or_else(|| self.scheduler.register(host, None))
	}

	/// Re-resolves the parent renderer of every host in `node`'s light subtree.
	fn relink(&self, node: NodeId) -> Result<()> {
		let parent = self
			.document
			.containing_host(node)
			.and_then(|container| self.scheduler.renderer_for_host(container));
		let mut stack = vec![node];
		while let Some(current) = stack.pop() {
			if let Some(renderer) = self.scheduler.renderer_for_host(current) {
				self.scheduler.set_parent(renderer, parent)?;
			}
			stack.extend(self.document.children(current));
		}
		Ok(())
	}

	/// Creates a new youngest shadow root on `host` and schedules its renderer.
	pub fn attach_shadow(&mut self, host: NodeId) -> Result<NodeId> {
		let root = self.document.attach_shadow(host)?;
		let renderer = self.register_host(host);
		self.scheduler.invalidate(renderer)?;
		Ok(root)
	}

	/// Unregisters `host`'s renderer and drops everything recorded for it.
	pub fn destroy_host(&mut self, host: NodeId) -> Result<()> {
		let renderer = self.scheduler.renderer_for_host(host).ok_or(Error::NotAHost(host))?;
		self.scheduler.unregister(renderer)?;
		self.associations.retain(|_, owner| *owner != renderer);
		self.distribution.forget(host);
		trace!(?host, ?renderer, "Destroyed host.");
		Ok(())
	}

	pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
		self.insert_before(parent, child, None)
	}

	pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> Result<()> {
		let old_parent = self.document.parent(child);
		self.document.insert_before(parent, child, reference)?;
		self.relink(child)?;
		if let Some(old_parent) = old_parent {
			self.child_list_changed(old_parent)?;
		}
		self.child_list_changed(parent)?;
		Ok(())
	}

	pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
		self.document.remove_child(parent, child)?;
		self.relink(child)?;
		self.child_list_changed(parent)?;
		Ok(())
	}

	/// Attributes can change which insertion point selects `node`.
	pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
		self.document.set_attribute(node, name, value)?;
		match self.document.parent(node) {
			Some(parent) => self.child_list_changed(parent).map(drop),
			None => Ok(()),
		}
	}

	/// Invalidates whichever renderer is responsible for how `node`'s children are composed.
	///
	/// That is `node`'s own renderer if it is a host, else the renderer that last placed it,
	/// else that of its nearest such ancestor or of the shadow tree it is in.
	pub fn child_list_changed(&self, node: NodeId) -> Result<Option<RendererId>> {
		let owner = self.owner_of_child_list(node);
		match owner {
			Some(renderer) => self.scheduler.invalidate(renderer)?,
			None => trace!(?node, "Child list change outside of any shadow tree."),
		}
		Ok(owner)
	}

	fn owner_of_child_list(&self, node: NodeId) -> Option<RendererId> {
		let mut current = Some(node);
		while let Some(node) = current {
			if let Some(renderer) = self.scheduler.renderer_for_host(node) {
				return Some(renderer);
			}
			if let Some(&renderer) = self.associations.get(&node) {
				return Some(renderer);
			}
			if let Some(host) = self.document.shadow_host(node) {
				return self.scheduler.renderer_for_host(host);
			}
			current = self.document.parent(node);
		}
		None
	}

	/// # Errors
	///
	/// [`Error::NotAHost`] if `host` has no renderer.
	pub fn invalidate(&self, host: NodeId) -> Result<()> {
		let renderer = self.scheduler.renderer_for_host(host).ok_or(Error::NotAHost(host))?;
		self.scheduler.invalidate(renderer)
	}

	/// Recomputes distribution for `host` and everything nested below it.
	pub fn distribute(&mut self, host: NodeId) -> Result<()> {
		self.distribution.distribute(&self.document, &*self.matcher, host)
	}

	#[must_use]
	pub fn get_distributed_nodes(&self, point: NodeId) -> &[NodeId] {
		self.distribution.distributed_nodes(point)
	}

	#[must_use]
	pub fn get_destination_insertion_points(&self, node: NodeId) -> &[NodeId] {
		self.distribution.destination_insertion_points(node)
	}

	#[must_use]
	pub fn renderer_for_host(&self, host: NodeId) -> Option<RendererId> {
		self.scheduler.renderer_for_host(host)
	}

	/// The renderer whose composition last placed `node`.
	#[must_use]
	pub fn renderer_for_node(&self, node: NodeId) -> Option<RendererId> {
		self.associations.get(&node).copied()
	}

	/// The desired tree for `host` as of the last distribution.
	///
	/// Like a render pass, this replaces the associations recorded for `host`'s renderer and the nested ones it covers.
	pub fn build_render_tree(&mut self, host: NodeId) -> RenderNode {
		self.build_tree(host).0
	}

	fn build_tree(&mut self, host: NodeId) -> (RenderNode, Vec<RendererId>) {
		let mut fresh = Associations::new();
		let (tree, covered) = RenderTreeBuilder {
			document: &self.document,
			distribution: &self.distribution,
			scheduler: &self.scheduler,
		}
		.build_render_tree(host, &mut fresh);

		let renderer = self.scheduler.renderer_for_host(host);
		self.associations.retain(|_, owner| Some(*owner) != renderer && !covered.contains(owner));
		self.associations.extend(fresh);
		(tree, covered)
	}

	/// Renders `host` right away, whether it is dirty or not.
	///
	/// # Errors
	///
	/// [`Error::ReentrantRender`] if called while another pass is active,
	/// [`Error::NotAHost`] if `host` has no renderer,
	/// and any error from distribution or reconciliation.
	#[instrument(skip(self, live))]
	pub fn render(&mut self, host: NodeId, live: &mut dyn LiveTree) -> Result<SyncStats> {
		let scheduler = Rc::clone(&self.scheduler);
		let _pass = scheduler.begin_pass()?;
		let renderer = scheduler.renderer_for_host(host).ok_or(Error::NotAHost(host))?;
		self.render_pass(renderer, live)
	}

	/// Renders every renderer queued so far, outermost first. Does nothing if none are.
	///
	/// Renderers invalidated while this runs are queued for the next flush.
	/// A renderer that fails is logged and queued again. The first such error is returned after the rest rendered.
	///
	/// Returns how many renderers were rendered.
	#[instrument(skip(self, live))]
	pub fn flush(&mut self, live: &mut dyn LiveTree) -> Result<usize> {
		let scheduler = Rc::clone(&self.scheduler);
		let _pass = scheduler.begin_pass()?;
		let pending = scheduler.take_pending();
		if pending.is_empty() {
			return Ok(0);
		}

		let mut rendered = 0;
		let mut first_error = None;
		for renderer in pending {
			if !scheduler.is_dirty(renderer) {
				trace!(?renderer, "Already clean.");
				continue;
			}
			if let Some(parent) = scheduler.parent(renderer).filter(|&parent| scheduler.is_dirty(parent)) {
				trace!(?renderer, ?parent, "Parent still dirty, skipping.");
				continue;
			}
			match self.render_pass(renderer, live) {
				Ok(stats) => {
					trace!(?renderer, ?stats, "Rendered.");
					rendered += 1;
				}
				Err(e) => {
					error!(?renderer, error = %e, "Render failed.");
					first_error.get_or_insert(e);
				}
			}
		}

		match first_error {
			Some(e) => Err(e),
			None => Ok(rendered),
		}
	}

	/// Renderers are marked clean up front, so that invalidations arriving during the pass queue them again.
	/// If the pass fails, they are invalidated once more.
	fn render_pass(&mut self, renderer: RendererId, live: &mut dyn LiveTree) -> Result<SyncStats> {
		let mut covered = Vec::new();
		let result = self.try_render_pass(renderer, live, &mut covered);
		if result.is_err() {
			for renderer in iter::once(renderer).chain(covered) {
				if let Err(e) = self.scheduler.invalidate(renderer) {
					warn!(?renderer, error = %e, "Could not requeue.");
				}
			}
		}
		result
	}

	fn try_render_pass(&mut self, renderer: RendererId, live: &mut dyn LiveTree, covered: &mut Vec<RendererId>) -> Result<SyncStats> {
		let host = self.scheduler.host(renderer)?;
		self.scheduler.mark_clean(renderer)?;
		self.distribute(host)?;
		let (tree, built_through) = self.build_tree(host);
		*covered = built_through;
		for &nested in covered.iter() {
			self.scheduler.mark_clean(nested)?;
		}

		let mut retries = 0;
		loop {
			match self.reconciler.sync(&tree, live) {
				Err(Error::StaleSnapshot { parent }) if retries < STALE_SNAPSHOT_RETRIES => {
					warn!(?renderer, ?parent, "Live tree changed during reconciliation, retrying.");
					retries += 1;
				}
				result => return result,
			}
		}
	}
}

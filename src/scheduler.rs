//! Dirty tracking for renderers and batching of render passes.
//!
//! The scheduler is shared through an [`Rc`](`std::rc::Rc`) handle and only uses interior mutability,
//! so a live tree implementation may hold on to it and invalidate renderers from inside a pass.

use crate::{
	error::{Error, Result},
	tree::NodeId,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	mem,
};
use hashbrown::HashMap;
use tracing::{instrument, trace};

/// Identifies the renderer of one shadow host.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RendererId(u32);
impl Debug for RendererId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "R{}", self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
	Clean,
	Dirty,
}

#[derive(Debug, Clone)]
struct Renderer {
	host: NodeId,
	/// Renderer of the host whose shadow tree contains `host`. Not owned.
	parent: Option<RendererId>,
	state: RenderState,
}

pub struct Scheduler {
	renderers: RefCell<Vec<Option<Renderer>>>,
	by_host: RefCell<HashMap<NodeId, RendererId>>,
	pending: RefCell<Vec<RendererId>>,
	armed: Cell<bool>,
	rendering: Cell<bool>,
	defer: Box<dyn Fn()>,
}
impl Debug for Scheduler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Scheduler")
			.field("renderers", &self.renderers)
			.field("pending", &self.pending)
			.field("armed", &self.armed)
			.field("rendering", &self.rendering)
			.finish_non_exhaustive()
	}
}
impl Scheduler {
	/// `defer` is called once whenever the pending queue goes from empty to non-empty.
	/// It should arrange for [`Composer::flush`](`crate::Composer::flush`) to run after the current task.
	#[must_use]
	pub fn new(defer: impl Fn() + 'static) -> Self {
		Self {
			renderers: RefCell::default(),
			by_host: RefCell::default(),
			pending: RefCell::default(),
			armed: Cell::new(false),
			rendering: Cell::new(false),
			defer: Box::new(defer),
		}
	}

	/// A scheduler whose owner polls [`Scheduler::is_armed`] instead of being called back.
	#[must_use]
	pub fn manual() -> Self {
		Self::new(|| ())
	}

	/// Registers the renderer for `host`, linked to the renderer of `parent_host` if that one is registered.
	///
	/// Returns the existing renderer if `host` already has one. New renderers start out clean.
	pub fn register(&self, host: NodeId, parent_host: Option<NodeId>) -> RendererId {
		if let Some(existing) = self.renderer_for_host(host) {
			return existing;
		}
		let parent = parent_host.and_then(|parent_host| self.renderer_for_host(parent_host));

		let mut renderers = self.renderers.borrow_mut();
		#[allow(clippy::cast_possible_truncation)]
		let id = RendererId(renderers.len() as u32);
		renderers.push(Some(Renderer {
			host,
			parent,
			state: RenderState::Clean,
		}));
		self.by_host.borrow_mut().insert(host, id);
		trace!(?id, ?host, ?parent, "Registered renderer.");
		id
	}

	/// Forgets `renderer`. Its id is never reused.
	pub fn unregister(&self, renderer: RendererId) -> Result<NodeId> {
		let removed = self
			.renderers
			.borrow_mut()
			.get_mut(renderer.0 as usize)
			.and_then(Option::take)
			.ok_or(Error::UnknownRenderer(renderer))?;
		self.by_host.borrow_mut().remove(&removed.host);
		self.pending.borrow_mut().retain(|&r| r != renderer);
		for child in self.renderers.borrow_mut().iter_mut().flatten() {
			if child.parent == Some(renderer) {
				child.parent = None;
			}
		}
		Ok(removed.host)
	}

	#[must_use]
	pub fn renderer_for_host(&self, host: NodeId) -> Option<RendererId> {
		self.by_host.borrow().get(&host).copied()
	}

	fn with<T>(&self, renderer: RendererId, f: impl FnOnce(&mut Renderer) -> T) -> Result<T> {
		match self.renderers.borrow_mut().get_mut(renderer.0 as usize) {
			Some(Some(r)) => Ok(f(r)),
			_ => Err(Error::UnknownRenderer(renderer)),
		}
	}

	pub fn host(&self, renderer: RendererId) -> Result<NodeId> {
		self.with(renderer, |r| r.host)
	}

	#[must_use]
	pub fn parent(&self, renderer: RendererId) -> Option<RendererId> {
		self.with(renderer, |r| r.parent).ok().flatten()
	}

	/// Points `renderer` at a new parent, after its host moved into another shadow tree.
	pub(crate) fn set_parent(&self, renderer: RendererId, parent: Option<RendererId>) -> Result<()> {
		self.with(renderer, |r| r.parent = parent)
	}

	/// All registered renderers, in registration order.
	#[must_use]
	#[allow(clippy::cast_possible_truncation)]
	pub fn renderers(&self) -> Vec<RendererId> {
		self.renderers
			.borrow()
			.iter()
			.enumerate()
			.filter(|(_, r)| r.is_some())
			.map(|(i, _)| RendererId(i as u32))
			.collect()
	}

	#[must_use]
	pub fn state(&self, renderer: RendererId) -> Option<RenderState> {
		self.with(renderer, |r| r.state).ok()
	}

	#[must_use]
	pub fn is_dirty(&self, renderer: RendererId) -> bool {
		self.state(renderer) == Some(RenderState::Dirty)
	}

	pub fn mark_clean(&self, renderer: RendererId) -> Result<()> {
		self.with(renderer, |r| r.state = RenderState::Clean)
	}

	/// Whether a deferred flush has been requested and not yet taken.
	#[must_use]
	pub fn is_armed(&self) -> bool {
		self.armed.get()
	}

	#[must_use]
	pub fn pending(&self) -> Vec<RendererId> {
		self.pending.borrow().clone()
	}

	/// Marks `renderer` and its ancestors dirty and queues them, outermost first.
	///
	/// Already dirty renderers (and therefore their ancestors) are left alone.
	#[instrument(skip(self))]
	pub fn invalidate(&self, renderer: RendererId) -> Result<()> {
		let mut chain = Vec::new();
		let mut next = Some(renderer);
		while let Some(current) = next {
			let (was_dirty, parent) = self.with(current, |r| {
				let was_dirty = r.state == RenderState::Dirty;
				r.state = RenderState::Dirty;
				(was_dirty, r.parent)
			})?;
			if was_dirty {
				break;
			}
			chain.push(current);
			next = parent;
		}

		if chain.is_empty() {
			return Ok(());
		}
		trace!(?chain, "Dirtied.");
		self.requeue(chain.into_iter().rev());
		Ok(())
	}

	/// Queues renderers without touching their state. Arms the deferred callback if necessary.
	fn requeue(&self, renderers: impl IntoIterator<Item = RendererId>) {
		self.pending.borrow_mut().extend(renderers);
		if !self.armed.get() && !self.pending.borrow().is_empty() {
			self.armed.set(true);
			trace!("Scheduling deferred flush.");
			(self.defer)();
		}
	}

	/// Captures and clears the pending queue. Later invalidations start a fresh one.
	pub(crate) fn take_pending(&self) -> Vec<RendererId> {
		self.armed.set(false);
		mem::take(&mut *self.pending.borrow_mut())
	}

	/// Marks the start of a render pass until the returned guard is dropped.
	///
	/// # Errors
	///
	/// [`Error::ReentrantRender`] if a pass is already active.
	pub fn begin_pass(&self) -> Result<RenderPass<'_>> {
		if self.rendering.replace(true) {
			return Err(Error::ReentrantRender);
		}
		Ok(RenderPass { scheduler: self })
	}

	#[must_use]
	pub fn is_rendering(&self) -> bool {
		self.rendering.get()
	}
}

/// Guard for an active render pass.
#[derive(Debug)]
pub struct RenderPass<'a> {
	scheduler: &'a Scheduler,
}
impl Drop for RenderPass<'_> {
	fn drop(&mut self) {
		self.scheduler.rendering.set(false);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tree::Document;
	use std::rc::Rc;

	fn hosts(count: usize) -> Vec<NodeId> {
		let mut doc = Document::new();
		(0..count).map(|_| doc.create_element("x-host")).collect()
	}

	fn counting() -> (Scheduler, Rc<Cell<usize>>) {
		let calls = Rc::new(Cell::new(0));
		let scheduler = Scheduler::new({
			let calls = Rc::clone(&calls);
			move || calls.set(calls.get() + 1)
		});
		(scheduler, calls)
	}

	#[test]
	fn invalidation_propagates_upward_and_defers_once() {
		let hosts = hosts(3);
		let (scheduler, calls) = counting();
		let outer = scheduler.register(hosts[0], None);
		let middle = scheduler.register(hosts[1], Some(hosts[0]));
		let inner = scheduler.register(hosts[2], Some(hosts[1]));
		assert_eq!(scheduler.parent(inner), Some(middle));

		scheduler.invalidate(inner).unwrap();
		assert!(scheduler.is_dirty(outer) && scheduler.is_dirty(middle) && scheduler.is_dirty(inner));
		assert_eq!(scheduler.pending(), vec![outer, middle, inner]);
		assert_eq!(calls.get(), 1);

		scheduler.invalidate(middle).unwrap();
		assert_eq!(scheduler.pending().len(), 3);
		assert_eq!(calls.get(), 1);
	}

	#[test]
	fn fresh_queue_after_take() {
		let hosts = hosts(2);
		let (scheduler, calls) = counting();
		let a = scheduler.register(hosts[0], None);
		let b = scheduler.register(hosts[1], None);

		scheduler.invalidate(a).unwrap();
		assert_eq!(scheduler.take_pending(), vec![a]);
		assert!(!scheduler.is_armed());

		scheduler.invalidate(b).unwrap();
		assert_eq!(calls.get(), 2);
		assert_eq!(scheduler.pending(), vec![b]);
	}

	#[test]
	fn reentrant_pass_is_refused() {
		let scheduler = Scheduler::manual();
		let pass = scheduler.begin_pass().unwrap();
		assert_eq!(scheduler.begin_pass().unwrap_err(), Error::ReentrantRender);
		drop(pass);
		assert!(scheduler.begin_pass().is_ok());
	}

	#[test]
	fn unregister_detaches_children() {
		let hosts = hosts(2);
		let scheduler = Scheduler::manual();
		let outer = scheduler.register(hosts[0], None);
		let inner = scheduler.register(hosts[1], Some(hosts[0]));
		scheduler.invalidate(inner).unwrap();

		assert_eq!(scheduler.unregister(outer), Ok(hosts[0]));
		assert_eq!(scheduler.parent(inner), None);
		assert_eq!(scheduler.pending(), vec![inner]);
		assert_eq!(scheduler.renderer_for_host(hosts[0]), None);
		assert_eq!(scheduler.invalidate(outer), Err(Error::UnknownRenderer(outer)));
	}
}

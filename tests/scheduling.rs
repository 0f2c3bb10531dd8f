use shadow_compose::{load::load_document, Composer, Document, Error, LiveDom, LiveTree, NodeId, RendererId, Result, Scheduler};
use std::{cell::Cell, rc::Rc};

struct Card {
	host: NodeId,
	light: [NodeId; 3],
}

/// Appends a host with light children `[.a, .b, .a]` that only shows the `.a` ones.
fn add_card(doc: &mut Document) -> Card {
	let host = doc.create_element("x-card");
	doc.append_child(doc.root(), host).unwrap();
	let light = [
		doc.create_element_with("p", &[("class", "a")]),
		doc.create_element_with("p", &[("class", "b")]),
		doc.create_element_with("p", &[("class", "a")]),
	];
	for &node in &light {
		doc.append_child(host, node).unwrap();
	}
	let root = doc.attach_shadow(host).unwrap();
	let point = doc.create_content(Some(".a"));
	doc.append_child(root, point).unwrap();
	Card { host, light }
}

fn counting_scheduler() -> (Rc<Scheduler>, Rc<Cell<usize>>) {
	let calls = Rc::new(Cell::new(0));
	let scheduler = Rc::new(Scheduler::new({
		let calls = Rc::clone(&calls);
		move || calls.set(calls.get() + 1)
	}));
	(scheduler, calls)
}

/// A [`LiveDom`] that misbehaves in configurable ways.
struct Meddling {
	live: LiveDom,
	scheduler: Rc<Scheduler>,
	invalidate_on_insert: Option<RendererId>,
	steal_once: Option<NodeId>,
	fail_below: Option<NodeId>,
	failures_left: usize,
	reentrant: Vec<Error>,
	remove_attempts: usize,
}
impl Meddling {
	fn new(live: LiveDom, scheduler: Rc<Scheduler>) -> Self {
		Self {
			live,
			scheduler,
			invalidate_on_insert: None,
			steal_once: None,
			fail_below: None,
			failures_left: 0,
			reentrant: Vec::new(),
			remove_attempts: 0,
		}
	}
}
impl LiveTree for Meddling {
	fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.live.parent(node)
	}

	fn first_child(&self, node: NodeId) -> Option<NodeId> {
		self.live.first_child(node)
	}

	fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
		self.live.next_sibling(node)
	}

	fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> Result<()> {
		if let Err(e) = self.scheduler.begin_pass() {
			self.reentrant.push(e);
		}
		if let Some(renderer) = self.invalidate_on_insert.take() {
			self.scheduler.invalidate(renderer)?;
		}
		self.live.insert_before(parent, node, reference)
	}

	fn remove_child(&mut self, parent: NodeId, node: NodeId) -> Result<()> {
		self.remove_attempts += 1;
		if self.fail_below == Some(parent) && self.failures_left > 0 {
			self.failures_left -= 1;
			return Err(Error::NotAChild { parent, node });
		}
		if self.steal_once == Some(node) {
			self.steal_once = None;
			self.live.remove_child(parent, node)?;
		}
		self.live.remove_child(parent, node)
	}
}

#[test]
fn deferred_callback_fires_once_per_batch() {
	let mut doc = Document::new();
	let card = add_card(&mut doc);
	let (scheduler, calls) = counting_scheduler();
	let mut live = load_document(&doc);
	let mut composer = Composer::new(doc, Rc::clone(&scheduler));
	assert_eq!(calls.get(), 1);

	composer.invalidate(card.host).unwrap();
	composer.set_attribute(card.light[1], "title", "unchanged distribution").unwrap();
	assert_eq!(calls.get(), 1);

	assert_eq!(composer.flush(&mut live).unwrap(), 1);
	assert!(!scheduler.is_armed());
	assert_eq!(composer.flush(&mut live).unwrap(), 0);
	assert_eq!(calls.get(), 1);

	composer.invalidate(card.host).unwrap();
	assert_eq!(calls.get(), 2);
}

#[test]
fn invalidation_during_drain_starts_a_fresh_queue() {
	let mut doc = Document::new();
	let first = add_card(&mut doc);
	let second = add_card(&mut doc);
	let (scheduler, calls) = counting_scheduler();
	let live = load_document(&doc);
	let mut composer = Composer::new(doc, Rc::clone(&scheduler));
	let first_renderer = composer.renderer_for_host(first.host).unwrap();
	let second_renderer = composer.renderer_for_host(second.host).unwrap();

	let mut live = Meddling::new(live, Rc::clone(&scheduler));
	composer.flush(&mut live).unwrap();
	assert_eq!(calls.get(), 1);

	// Rendering the first card inserts a node, which dirties the already clean first renderer again.
	composer.set_attribute(first.light[1], "class", "a").unwrap();
	live.invalidate_on_insert = Some(first_renderer);
	assert_eq!(calls.get(), 2);
	assert_eq!(composer.flush(&mut live).unwrap(), 1);

	assert_eq!(scheduler.pending(), vec![first_renderer]);
	assert!(scheduler.is_armed());
	assert_eq!(calls.get(), 3);
	assert!(!scheduler.is_dirty(second_renderer));

	assert_eq!(composer.flush(&mut live).unwrap(), 1);
	assert!(scheduler.pending().is_empty());
}

#[test]
fn rendering_from_inside_a_pass_is_refused() {
	let mut doc = Document::new();
	let card = add_card(&mut doc);
	let scheduler = Rc::new(Scheduler::manual());
	let live = load_document(&doc);
	let mut composer = Composer::new(doc, Rc::clone(&scheduler));
	let mut live = Meddling::new(live, Rc::clone(&scheduler));
	composer.flush(&mut live).unwrap();

	composer.set_attribute(card.light[1], "class", "a").unwrap();
	composer.flush(&mut live).unwrap();
	assert_eq!(live.reentrant, vec![Error::ReentrantRender]);
	assert!(!scheduler.is_rendering());
	assert!(scheduler.begin_pass().is_ok());
}

#[test]
fn out_of_band_removal_is_retried_once() {
	let mut doc = Document::new();
	let card = add_card(&mut doc);
	let scheduler = Rc::new(Scheduler::manual());
	let live = load_document(&doc);
	let mut composer = Composer::new(doc, Rc::clone(&scheduler));
	let mut live = Meddling::new(live, Rc::clone(&scheduler));
	live.steal_once = Some(card.light[1]);

	assert_eq!(composer.flush(&mut live).unwrap(), 1);
	assert_eq!(live.remove_attempts, 1);
	assert_eq!(live.child_nodes(card.host), vec![card.light[0], card.light[2]]);
	assert!(!scheduler.is_dirty(composer.renderer_for_host(card.host).unwrap()));
}

#[test]
fn persistent_failure_is_requeued_without_blocking_others() {
	let mut doc = Document::new();
	let failing = add_card(&mut doc);
	let working = add_card(&mut doc);
	let scheduler = Rc::new(Scheduler::manual());
	let live = load_document(&doc);
	let mut composer = Composer::new(doc, Rc::clone(&scheduler));
	let failing_renderer = composer.renderer_for_host(failing.host).unwrap();
	let mut live = Meddling::new(live, Rc::clone(&scheduler));
	live.fail_below = Some(failing.host);
	live.failures_left = usize::MAX;

	assert_eq!(composer.flush(&mut live), Err(Error::StaleSnapshot { parent: failing.host }));
	assert_eq!(live.remove_attempts, 3);
	assert_eq!(live.child_nodes(working.host), vec![working.light[0], working.light[2]]);
	assert_eq!(live.child_nodes(failing.host), failing.light.to_vec());
	assert_eq!(scheduler.pending(), vec![failing_renderer]);
	assert!(scheduler.is_dirty(failing_renderer));
}

#[test]
fn failed_forced_render_stays_queued() {
	let mut doc = Document::new();
	let card = add_card(&mut doc);
	let scheduler = Rc::new(Scheduler::manual());
	let live = load_document(&doc);
	let mut composer = Composer::new(doc, Rc::clone(&scheduler));
	let renderer = composer.renderer_for_host(card.host).unwrap();
	let mut live = Meddling::new(live, Rc::clone(&scheduler));
	live.fail_below = Some(card.host);
	live.failures_left = 2;

	assert_eq!(composer.render(card.host, &mut live), Err(Error::StaleSnapshot { parent: card.host }));
	assert!(scheduler.is_dirty(renderer));
	assert!(scheduler.pending().contains(&renderer));

	assert_eq!(composer.flush(&mut live).unwrap(), 1);
	assert_eq!(live.child_nodes(card.host), vec![card.light[0], card.light[2]]);
	assert!(!scheduler.is_dirty(renderer));
}

#[test]
fn failed_outer_pass_keeps_nested_host_dirty() {
	let mut doc = Document::new();
	let outer = doc.create_element("x-outer");
	doc.append_child(doc.root(), outer).unwrap();
	let stray = doc.create_text("stray");
	doc.append_child(outer, stray).unwrap();
	let outer_root = doc.attach_shadow(outer).unwrap();
	let inner = doc.create_element("x-inner");
	doc.append_child(outer_root, inner).unwrap();
	let inner_root = doc.attach_shadow(inner).unwrap();
	let content = doc.create_text("content");
	doc.append_child(inner_root, content).unwrap();

	let scheduler = Rc::new(Scheduler::manual());
	let live = load_document(&doc);
	let mut composer = Composer::new(doc, Rc::clone(&scheduler));
	let inner_renderer = composer.renderer_for_host(inner).unwrap();
	let mut live = Meddling::new(live, Rc::clone(&scheduler));
	live.fail_below = Some(outer);
	live.failures_left = 2;

	assert_eq!(composer.flush(&mut live), Err(Error::StaleSnapshot { parent: outer }));
	assert!(scheduler.is_dirty(inner_renderer));

	assert_eq!(composer.flush(&mut live).unwrap(), 1);
	assert_eq!(live.child_nodes(outer), vec![inner]);
	assert_eq!(live.child_nodes(inner), vec![content]);
	assert!(!scheduler.is_dirty(inner_renderer));
}

use crate::{live::LiveDom, tree::Document, NodeId};

/// Mirrors `document` into a new [`LiveDom`], as a platform would show it before any composition.
///
/// Light trees hang off their logical parents. Shadow tree contents hang off their (detached) shadow roots.
#[must_use]
pub fn load_document(document: &Document) -> LiveDom {
	let mut live = LiveDom::new();
	for node in document.ids() {
		if document.parent(node).is_none() {
			load_child_nodes(document, node, &mut live);
		}
	}
	live
}

/// Appends the logical subtree below `parent` to `live`, depth first.
pub fn load_child_nodes(document: &Document, parent: NodeId, live: &mut LiveDom) {
	let mut stack = vec![parent];
	while let Some(node) = stack.pop() {
		for &child in document.children(node) {
			live.push_child(node, child);
		}
		stack.extend(document.children(node).iter().rev());
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::live::LiveTree;

	#[test]
	fn mirrors_light_and_shadow_trees() {
		let mut doc = Document::new();
		let host = doc.create_element("x-host");
		let light = doc.create_text("light");
		doc.append_child(doc.root(), host).unwrap();
		doc.append_child(host, light).unwrap();
		let root = doc.attach_shadow(host).unwrap();
		let point = doc.create_content(None);
		doc.append_child(root, point).unwrap();

		let live = load_document(&doc);
		assert_eq!(live.child_nodes(doc.root()), vec![host]);
		assert_eq!(live.child_nodes(host), vec![light]);
		assert_eq!(live.child_nodes(root), vec![point]);
		assert_eq!(live.parent(root), None);
	}
}

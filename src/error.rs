use crate::{scheduler::RendererId, tree::NodeId};
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
	/// A render pass was requested while another one is still applying its edits.
	///
	/// The outer pass owns the pending queue snapshot, so the inner request is refused instead of corrupting it.
	#[error("render() called while a render pass is already active")]
	ReentrantRender,

	#[error("{0:?} does not exist in this tree")]
	UnknownNode(NodeId),

	#[error("{node:?} is not a child of {parent:?}")]
	NotAChild { parent: NodeId, node: NodeId },

	/// The live tree changed out-of-band between the children snapshot and applying the diff.
	#[error("live children of {parent:?} changed during reconciliation")]
	StaleSnapshot { parent: NodeId },

	#[error("inserting {node:?} into {parent:?} would create a cycle")]
	HierarchyCycle { parent: NodeId, node: NodeId },

	#[error("{0:?} is a shadow root and cannot be inserted as a child")]
	ShadowRootNotInsertable(NodeId),

	#[error("{0:?} cannot host a shadow root")]
	InvalidShadowHost(NodeId),

	/// The older-shadow-root chain of `host` loops back onto itself.
	#[error("cyclic older shadow root chain below host {host:?}")]
	CyclicShadowChain { host: NodeId },

	#[error("{0:?} is not a shadow host")]
	NotAHost(NodeId),

	#[error("{0:?} is not registered with this scheduler")]
	UnknownRenderer(RendererId),
}

/// Why a selector filter could not be evaluated.
///
/// Never escapes distribution: a selector that fails to parse matches nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
	#[error("empty compound selector in {0:?}")]
	Empty(String),

	#[error("unsupported character {found:?} at byte {at} of {selector:?}")]
	Unsupported { selector: String, found: char, at: usize },

	#[error("unterminated attribute selector in {0:?}")]
	UnterminatedAttribute(String),
}

#![doc(html_root_url = "https://docs.rs/shadow-compose/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod composer;
pub mod distribution;
pub mod error;
pub mod live;
pub mod load;
pub mod reconcile;
pub mod render_tree;
pub mod scheduler;
pub mod selector;
pub mod splice;
pub mod temp_set;
pub mod tree;

pub use composer::Composer;
pub use error::{Error, Result};
pub use live::{LiveDom, LiveTree};
pub use render_tree::RenderNode;
pub use scheduler::{RendererId, Scheduler};
pub use tree::{Document, NodeId};

//! Grouping and rendering of reconstructed kdb state.
//!
//! [`render_state`] walks a [`SystemState`](kdb_graph::SystemState) and
//! emits an abstract stream of [`GraphEvent`]s: chdesc nodes, dependency,
//! weak-reference and free-list edges, the free-list cluster, and nested
//! grouping clusters chosen by a [`GroupStrategy`]. Producing a concrete
//! graph description from the stream is up to the [`GraphSink`].
//!
//! ```no_run
//! use kdb_graph::SystemState;
//! use kdb_render::{render_state, GraphEvent, RenderOptions};
//!
//! let state = SystemState::new();
//! let mut options = RenderOptions::default();
//! options.set("grouping", "block-owner").unwrap();
//! let mut events: Vec<GraphEvent> = Vec::new();
//! let summary = render_state(&state, &options, &mut events);
//! assert_eq!(summary.nodes, 0);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod graph;
pub mod group;
pub mod options;
pub mod render;

pub use graph::{
    Edge, EdgeKind, Endpoint, Fill, GraphEvent, GraphSink, LabelColor, Node, NodeId, NodeStyle,
};
pub use group::{GroupStrategy, Grouper};
pub use options::{OptionError, RenderOptions};
pub use render::{render_state, RenderSummary};

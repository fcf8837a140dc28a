//! kdb: a post-mortem debugger for filesystem write-ordering traces.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all kdb sub-crates. For most users, adding `kdb` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::io::Cursor;
//! use kdb::prelude::*;
//! use kdb_test_utils::fixtures::grouped_trace;
//!
//! let bytes = grouped_trace().build();
//! let mut dbg = Debugger::open("grouped", Cursor::new(bytes), DebuggerConfig::default()).unwrap();
//! dbg.replay_all().unwrap();
//! assert_eq!(dbg.state().chdesc_count(), 4);
//!
//! let mut options = RenderOptions::default();
//! options.set("grouping", "owner-block").unwrap();
//! let mut events: Vec<GraphEvent> = Vec::new();
//! let summary = render_state(dbg.state(), &options, &mut events);
//! assert_eq!(summary.nodes, 4);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `kdb-core` | Addresses, flags, opcodes, error taxonomy |
//! | [`wire`] | `kdb-wire` | Trace decoder, schema registry, revision gate, writer |
//! | [`graph`] | `kdb-graph` | Chdesc/bdesc model, registry, `SystemState` |
//! | [`replay`] | `kdb-replay` | The `Debugger` replay controller |
//! | [`render`] | `kdb-render` | Grouping and the node/edge/cluster stream |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Addresses, flags, opcodes and errors (`kdb-core`).
pub use kdb_core as types;

/// Trace wire format (`kdb-wire`).
///
/// [`wire::TraceDecoder`] reads traces; [`wire::TraceWriter`] produces them.
pub use kdb_wire as wire;

/// Object graph model (`kdb-graph`).
///
/// [`graph::SystemState`] is the reconstructed snapshot that every opcode
/// is applied to.
pub use kdb_graph as graph;

/// Replay controller (`kdb-replay`).
pub use kdb_replay as replay;

/// Grouping and rendering (`kdb-render`).
pub use kdb_render as render;

/// Common imports for typical kdb usage.
///
/// ```rust
/// use kdb::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use kdb_core::{
        BlockAddr, ChdescAddr, ChdescFlags, Location, Opcode, OpcodeKind, OwnerAddr,
    };

    // Errors
    pub use kdb_core::{DecodeError, StateError};
    pub use kdb_replay::{ReadError, ReplayError};

    // Wire
    pub use kdb_wire::{DecoderConfig, TraceDecoder, TraceWriter};

    // Graph
    pub use kdb_graph::{Bdesc, Chdesc, ChdescType, SystemState};

    // Replay
    pub use kdb_replay::{Debugger, DebuggerConfig, Extreme};

    // Render
    pub use kdb_render::{render_state, GraphEvent, GraphSink, GroupStrategy, RenderOptions};
}

//! Replay controller for the kdb trace debugger.
//!
//! [`Debugger`] loads a trace through [`kdb_wire::TraceDecoder`], keeps
//! the decoded opcodes as an append-only log, and reconstructs the
//! [`kdb_graph::SystemState`] at any position by applying a prefix of
//! that log. Backward moves reset and replay from the start.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//! use kdb_replay::{Debugger, DebuggerConfig};
//!
//! let file = BufReader::new(File::open("trace.kdb")?);
//! let mut dbg = Debugger::open("trace.kdb", file, DebuggerConfig::default())?;
//! dbg.replay_all()?;
//! println!("{dbg}: {} chdescs", dbg.state().chdesc_count());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod debugger;
pub mod error;

pub use config::{ConfigError, DebuggerConfig};
pub use debugger::{Debugger, Extreme};
pub use error::{ReadError, ReplayError};

//! Trace wire format for the kdb debugger.
//!
//! Decodes the binary trace emitted by the instrumented write-ordering
//! subsystem into [`Opcode`](kdb_core::Opcode) values, and encodes the
//! same format for fixtures and tooling.
//!
//! # Architecture
//!
//! - [`TraceInput`] reads primitives and tracks the byte offset
//! - [`SchemaRegistry`] declares every opcode's parameter schema and
//!   dispatches `(module, opcode)` to a typed constructor
//! - [`RevisionTable`] rejects streams from known-incompatible revisions
//! - [`TraceDecoder`] verifies the header, then yields opcodes one by one
//! - [`TraceWriter`] emits the header and opcode records
//!
//! # Format
//!
//! ```text
//! [tool_rev u32] [opcode_rev u32]
//! per module: ( [module u16] [opcode u16] [name\0] ([size u8] [param\0])* [0u8] )* [0u16]
//! [0u16]
//! per record: [file\0] [line u32] [function\0] [module u16] [opcode u16]
//!             ([size u8] [param\0])* [0u8] [values...] [frame u32]* [0u32]
//! ```
//!
//! Integers are big-endian by default. Strings are null-terminated.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod decoder;
pub mod input;
pub mod intern;
pub mod revision;
pub mod schema;
pub mod writer;

pub use config::{ConfigError, DecoderConfig};
pub use decoder::{OpcodeIter, TraceDecoder};
pub use input::{ByteOrder, TraceInput};
pub use intern::{StackInterner, StringInterner};
pub use revision::{RevisionRule, RevisionTable, Verdict};
pub use schema::{ModuleSpec, OpcodeSpec, ParamSpec, ParamValue, Params, SchemaRegistry};
pub use writer::{EncodeError, TraceWriter};

/// The debugger revision this build reads.
pub const TOOL_REVISION: u32 = 4258;

/// The opcode-format revision this build reads.
pub const OPCODE_REVISION: u32 = 4260;

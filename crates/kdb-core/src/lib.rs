//! Core types for the kdb write-ordering trace debugger.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the rest of the workspace: opaque address
//! identities, the change-descriptor flag layout, the closed set of
//! decoded opcode kinds, and the error taxonomy for decoding and replay.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod flags;
pub mod id;
pub mod opcode;

pub use error::{DecodeError, Remediation, StateError};
pub use flags::ChdescFlags;
pub use id::{BlockAddr, ChdescAddr, DdescAddr, Location, OwnerAddr};
pub use opcode::{CallStack, FieldValue, Opcode, OpcodeKind, Provenance, RefCounts};

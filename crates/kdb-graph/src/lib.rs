//! Object graph model for the kdb trace debugger.
//!
//! [`SystemState`] is the reconstructed snapshot of the traced component:
//! an arena of [`Chdesc`] change descriptors indexed by a strict
//! [`Registry`], live [`Bdesc`] block descriptors, the allocator free
//! list head, and annotation tables. [`SystemState::apply`] drives the
//! descriptor state machine for every decoded opcode.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bdesc;
pub mod chdesc;
pub mod hash;
pub mod registry;
pub mod state;

pub use bdesc::{Bdesc, BlockNumber};
pub use chdesc::{Chdesc, ChdescId, ChdescType};
pub use registry::{DuplicateKey, Registry};
pub use state::SystemState;

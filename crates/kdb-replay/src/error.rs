//! Error types for the replay controller.

use kdb_core::{DecodeError, StateError};

use crate::config::ConfigError;

/// A decode failure part-way through reading the log.
///
/// Opcodes decoded before the failure stay in the log; the counts here
/// say how far the read got.
#[derive(Debug, thiserror::Error)]
#[error("{source} ({decoded} opcodes read by this call, {total} in the log)")]
pub struct ReadError {
    /// The underlying decode failure, carrying the byte offset.
    #[source]
    pub source: DecodeError,
    /// Opcodes successfully decoded by the failing call.
    pub decoded: usize,
    /// Opcodes in the log after the failure.
    pub total: usize,
}

impl ReadError {
    /// Byte offset of the failure, when known.
    pub fn offset(&self) -> Option<u64> {
        self.source.offset()
    }
}

/// Errors raised by [`Debugger`](crate::Debugger).
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The trace header could not be read.
    #[error("cannot open trace: {0}")]
    Open(#[from] DecodeError),
    /// Decoding failed while reading opcodes.
    #[error("cannot read opcodes: {0}")]
    Read(#[from] ReadError),
    /// Applying an opcode violated a state invariant. Replay stops.
    #[error("opcode #{index} ({name}) failed: {source}")]
    State {
        /// Log position of the failing opcode.
        index: usize,
        /// The failing opcode's name.
        name: &'static str,
        /// The violated invariant.
        #[source]
        source: StateError,
    },
    /// A seek target lies past the end of the log.
    #[error("position {requested} is past the end of the log ({available} opcodes)")]
    OutOfRange {
        /// The requested position.
        requested: usize,
        /// Opcodes in the log.
        available: usize,
    },
    /// A backward step reaches before the start of the log.
    #[error("cannot step back {back} opcodes from position {position}")]
    BeforeStart {
        /// Requested backward distance.
        back: usize,
        /// Position the step started from.
        position: usize,
    },
}

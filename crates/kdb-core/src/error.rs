//! Error types for trace decoding and state reconstruction.
//!
//! [`DecodeError`] covers everything that can go wrong reading a trace
//! stream and always records where in the stream it happened.
//! [`StateError`] is raised when applying an opcode would violate an
//! object-graph invariant; it means the trace is corrupt (or the replay
//! logic is wrong) and replay must stop.

use std::fmt;
use std::io;

use crate::id::{BlockAddr, ChdescAddr};

/// Advice attached to a rejected stream revision.
///
/// On the wire this is a single signed integer: a positive revision,
/// `0` for "use something newer", or `-1` for "nothing can read this".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Remediation {
    /// Use this revision of the debugger or a newer one.
    Upgrade(u32),
    /// Use this revision of the debugger or an older one.
    Downgrade(u32),
    /// No known upper bound; a newer debugger is required.
    UseNewer,
    /// No version of the debugger can read this stream.
    Unreadable,
}

impl Remediation {
    /// The signed advice code: the revision, `0`, or `-1`.
    pub fn code(self) -> i64 {
        match self {
            Self::Upgrade(rev) | Self::Downgrade(rev) => i64::from(rev),
            Self::UseNewer => 0,
            Self::Unreadable => -1,
        }
    }
}

impl fmt::Display for Remediation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upgrade(rev) => write!(f, "use version {rev} or newer"),
            Self::Downgrade(rev) => write!(f, "use version {rev} or older"),
            Self::UseNewer => write!(f, "use a newer version"),
            Self::Unreadable => write!(f, "no version of this debugger can read it"),
        }
    }
}

/// Errors raised while decoding a trace stream.
///
/// Every variant produced mid-stream carries the byte offset at which the
/// problem was detected.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The underlying source failed.
    #[error("I/O error at offset {offset}: {source}")]
    Io {
        /// Byte offset of the failed read.
        offset: u64,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The stream ended in the middle of a header or opcode record.
    #[error("truncated input at offset {offset}")]
    TruncatedInput {
        /// Byte offset at which input ran out.
        offset: u64,
    },
    /// A module id that no registered module claims.
    #[error("unexpected module {module} at offset {offset}")]
    UnexpectedModule {
        /// The module id read from the stream.
        module: u16,
        /// Byte offset just past the module id.
        offset: u64,
    },
    /// An opcode id not registered within its module.
    #[error("unexpected opcode {opcode} in module {module} at offset {offset}")]
    UnexpectedOpcode {
        /// The module the opcode was read under.
        module: u16,
        /// The opcode id read from the stream.
        opcode: u16,
        /// Byte offset just past the opcode id.
        offset: u64,
    },
    /// The stream's name for an opcode disagrees with the schema.
    #[error("unexpected opcode name {found:?} (expected {expected}) at offset {offset}")]
    UnexpectedName {
        /// The registered opcode name.
        expected: &'static str,
        /// The name read from the stream.
        found: String,
        /// Byte offset just past the name.
        offset: u64,
    },
    /// A parameter self-description that does not match the schema.
    #[error(
        "unexpected parameter {found:?}/{found_width} for {opcode} \
         (expected {expected}) at offset {offset}"
    )]
    UnexpectedParameter {
        /// The opcode whose schema was being verified.
        opcode: &'static str,
        /// What the schema expected at this position.
        expected: String,
        /// The parameter name read from the stream.
        found: String,
        /// The parameter width read from the stream.
        found_width: u8,
        /// Byte offset just past the parameter description.
        offset: u64,
    },
    /// The stream's parameter list ended before the schema's did.
    #[error("missing parameter {parameter} for {opcode} at offset {offset}")]
    MissingParameter {
        /// The opcode whose schema was being verified.
        opcode: &'static str,
        /// The first schema parameter that was not described.
        parameter: &'static str,
        /// Byte offset just past the list terminator.
        offset: u64,
    },
    /// The stream's revision pair is known to be unreadable.
    #[error(
        "unsupported stream revision (debug {tool_rev}, opcodes {opcode_rev}): {remediation}"
    )]
    UnsupportedStreamRevision {
        /// The debugger/tool revision recorded in the stream.
        tool_rev: u32,
        /// The opcode-format revision recorded in the stream.
        opcode_rev: u32,
        /// What to do about it.
        remediation: Remediation,
    },
    /// A string ran past the configured length limit.
    #[error("string longer than {limit} bytes at offset {offset}")]
    StringTooLong {
        /// The configured limit.
        limit: usize,
        /// Byte offset at which the limit was exceeded.
        offset: u64,
    },
    /// A call stack ran past the configured depth limit.
    #[error("call stack deeper than {limit} frames at offset {offset}")]
    StackTooDeep {
        /// The configured limit.
        limit: usize,
        /// Byte offset at which the limit was exceeded.
        offset: u64,
    },
}

impl DecodeError {
    /// The byte offset the error refers to, if it arose mid-stream.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Io { offset, .. }
            | Self::TruncatedInput { offset }
            | Self::UnexpectedModule { offset, .. }
            | Self::UnexpectedOpcode { offset, .. }
            | Self::UnexpectedName { offset, .. }
            | Self::UnexpectedParameter { offset, .. }
            | Self::MissingParameter { offset, .. }
            | Self::StringTooLong { offset, .. }
            | Self::StackTooDeep { offset, .. } => Some(*offset),
            Self::UnsupportedStreamRevision { .. } => None,
        }
    }

    /// The compatibility advice, for revision rejections.
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::UnsupportedStreamRevision { remediation, .. } => Some(*remediation),
            _ => None,
        }
    }
}

/// Invariant violations raised while applying an opcode to the state.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// An operation that requires a valid (NOOP/BIT/BYTE) descriptor was
    /// given a dangling or destroyed one.
    #[error("attempt to {action} invalid chdesc {addr}")]
    InvalidChdesc {
        /// The descriptor's address.
        addr: ChdescAddr,
        /// What was being attempted.
        action: &'static str,
    },
    /// A type-specific field was used on a descriptor of another type.
    #[error("{field} is not defined for {kind} chdesc {addr}")]
    WrongType {
        /// The descriptor's address.
        addr: ChdescAddr,
        /// The field that was queried or set.
        field: &'static str,
        /// The descriptor's actual type.
        kind: &'static str,
    },
    /// A create opcode named an address that already holds a live descriptor.
    #[error("duplicate chdesc {addr} registered")]
    DuplicateChdesc {
        /// The conflicting address.
        addr: ChdescAddr,
    },
    /// An alloc opcode named an address that already holds a live block.
    #[error("duplicate bdesc {addr} registered")]
    DuplicateBdesc {
        /// The conflicting address.
        addr: BlockAddr,
    },
}

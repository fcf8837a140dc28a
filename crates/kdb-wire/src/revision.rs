//! Stream revision compatibility table.
//!
//! A trace starts with the revision of the debug module that wrote it
//! and the revision of its opcode format. Rules are checked top to
//! bottom and the first exact match wins. A pair matched by no rule is
//! rejected with [`Remediation::UseNewer`].

use kdb_core::{DecodeError, Remediation};

use crate::{OPCODE_REVISION, TOOL_REVISION};

/// Outcome of a matched rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// This build reads the stream.
    Supported,
    /// This build cannot read the stream.
    Unsupported(Remediation),
}

/// One exact-match entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RevisionRule {
    /// Debug module revision.
    pub tool_rev: u32,
    /// Opcode format revision.
    pub opcode_rev: u32,
    /// What to do when both match.
    pub verdict: Verdict,
}

impl RevisionRule {
    /// A pair this build reads.
    pub const fn supported(tool_rev: u32, opcode_rev: u32) -> Self {
        Self {
            tool_rev,
            opcode_rev,
            verdict: Verdict::Supported,
        }
    }

    /// A pair this build rejects, with advice.
    pub const fn rejected(tool_rev: u32, opcode_rev: u32, remediation: Remediation) -> Self {
        Self {
            tool_rev,
            opcode_rev,
            verdict: Verdict::Unsupported(remediation),
        }
    }

    fn matches(&self, tool_rev: u32, opcode_rev: u32) -> bool {
        self.tool_rev == tool_rev && self.opcode_rev == opcode_rev
    }
}

/// Revision pairs known to this build.
///
/// Only the current pair describes a real stream format. The rejected
/// entries are sample pairs covering each remediation form; they do not
/// record the history of older trace formats.
const KNOWN_REVISIONS: [RevisionRule; 6] = [
    RevisionRule::rejected(2936, 2969, Remediation::Downgrade(3111)),
    RevisionRule::rejected(3437, 3440, Remediation::Downgrade(3460)),
    RevisionRule::rejected(3940, 3948, Remediation::Downgrade(4001)),
    RevisionRule::rejected(4250, 4251, Remediation::Unreadable),
    RevisionRule::supported(TOOL_REVISION, OPCODE_REVISION),
    RevisionRule::rejected(4302, 4300, Remediation::Upgrade(4302)),
];

/// Ordered compatibility rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionTable {
    rules: Vec<RevisionRule>,
}

impl RevisionTable {
    /// A table with the given rules, checked in order.
    pub fn new(rules: Vec<RevisionRule>) -> Self {
        Self { rules }
    }

    /// Add a rule after the existing ones.
    pub fn push(&mut self, rule: RevisionRule) {
        self.rules.push(rule);
    }

    /// The rules in evaluation order.
    pub fn rules(&self) -> &[RevisionRule] {
        &self.rules
    }

    /// Whether any rule accepts a stream.
    pub fn has_supported(&self) -> bool {
        self.rules.iter().any(|r| r.verdict == Verdict::Supported)
    }

    /// Decide whether a stream with these revisions can be read.
    pub fn check(&self, tool_rev: u32, opcode_rev: u32) -> Result<(), DecodeError> {
        let verdict = self
            .rules
            .iter()
            .find(|rule| rule.matches(tool_rev, opcode_rev))
            .map(|rule| rule.verdict)
            .unwrap_or(Verdict::Unsupported(Remediation::UseNewer));
        match verdict {
            Verdict::Supported => Ok(()),
            Verdict::Unsupported(remediation) => Err(DecodeError::UnsupportedStreamRevision {
                tool_rev,
                opcode_rev,
                remediation,
            }),
        }
    }
}

impl Default for RevisionTable {
    fn default() -> Self {
        Self::new(KNOWN_REVISIONS.to_vec())
    }
}

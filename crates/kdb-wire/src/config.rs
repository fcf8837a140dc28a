//! Decoder configuration.

use crate::input::ByteOrder;
use crate::revision::RevisionTable;

/// Errors detected by [`DecoderConfig::validate`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `max_string_len` is zero.
    #[error("max_string_len must be at least 1")]
    ZeroStringLimit,
    /// `max_stack_depth` is zero.
    #[error("max_stack_depth must be at least 1")]
    ZeroStackDepth,
    /// The revision table accepts no stream at all.
    #[error("revision table has no supported entry")]
    NoSupportedRevision,
}

/// Settings for [`TraceDecoder`](crate::TraceDecoder).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Integer byte order. The instrumented writer uses network order.
    pub byte_order: ByteOrder,
    /// Longest accepted string, in bytes, excluding the terminator.
    pub max_string_len: usize,
    /// Most frames accepted in one call stack, including the terminator.
    pub max_stack_depth: usize,
    /// Revision compatibility rules.
    pub revisions: RevisionTable,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Big,
            max_string_len: 4096,
            max_stack_depth: 128,
            revisions: RevisionTable::default(),
        }
    }
}

impl DecoderConfig {
    /// Check the configuration for values that would reject every trace.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_string_len == 0 {
            return Err(ConfigError::ZeroStringLimit);
        }
        if self.max_stack_depth == 0 {
            return Err(ConfigError::ZeroStackDepth);
        }
        if !self.revisions.has_supported() {
            return Err(ConfigError::NoSupportedRevision);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(DecoderConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_limits_rejected() {
        let cfg = DecoderConfig {
            max_string_len: 0,
            ..DecoderConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroStringLimit));

        let cfg = DecoderConfig {
            max_stack_depth: 0,
            ..DecoderConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroStackDepth));
    }

    #[test]
    fn table_without_supported_entry_rejected() {
        let cfg = DecoderConfig {
            revisions: RevisionTable::new(Vec::new()),
            ..DecoderConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NoSupportedRevision));
    }
}

//! Debugger configuration.

use kdb_wire::DecoderConfig;

/// Errors detected by [`DebuggerConfig::validate`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The embedded decoder configuration is invalid.
    #[error("decoder: {0}")]
    Decoder(#[from] kdb_wire::ConfigError),
    /// `read_limit` is `Some(0)`, which would never decode anything.
    #[error("read_limit must be at least 1 when set")]
    ZeroReadLimit,
}

/// Settings for [`Debugger`](crate::Debugger).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebuggerConfig {
    /// Wire decoder settings.
    pub decoder: DecoderConfig,
    /// Decode at most this many opcodes when opening; `None` reads to EOF.
    pub read_limit: Option<usize>,
    /// Log a warning when a full replay leaves dangling placeholders.
    pub warn_on_dangling: bool,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            read_limit: None,
            warn_on_dangling: true,
        }
    }
}

impl DebuggerConfig {
    /// Check the configuration for values that would make loading fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.decoder.validate()?;
        if self.read_limit == Some(0) {
            return Err(ConfigError::ZeroReadLimit);
        }
        Ok(())
    }
}

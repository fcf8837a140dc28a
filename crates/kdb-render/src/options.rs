//! Rendering options.

use crate::group::GroupStrategy;

/// Errors from getting or setting a rendering option by name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OptionError {
    /// No option has this name.
    #[error("invalid option: {0}")]
    UnknownOption(String),
    /// The option exists but does not accept this value.
    #[error("invalid setting for {option}: {value}")]
    InvalidSetting {
        /// Option name.
        option: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// Settings that shape [`render_state`](crate::render_state) output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Show every free-list member and its forward links, not only the head.
    pub render_free: bool,
    /// How chdescs are clustered.
    pub grouping: GroupStrategy,
}

impl RenderOptions {
    /// Names accepted by [`get`](Self::get) and [`set`](Self::set).
    pub const NAMES: [&'static str; 2] = ["freelist", "grouping"];

    /// Current value of option `name`, as `set` would accept it back.
    pub fn get(&self, name: &str) -> Result<String, OptionError> {
        match name {
            "freelist" => Ok(if self.render_free { "on" } else { "off" }.to_owned()),
            "grouping" => Ok(self.grouping.name()),
            other => Err(OptionError::UnknownOption(other.to_owned())),
        }
    }

    /// Set option `name` from its textual `value`.
    ///
    /// `freelist` takes `on` or `off`. `grouping` takes `off`, `block`,
    /// `owner`, `block-owner` or `owner-block`. On error the options are
    /// unchanged.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), OptionError> {
        match name {
            "freelist" => {
                self.render_free = match value {
                    "on" => true,
                    "off" => false,
                    other => {
                        return Err(OptionError::InvalidSetting {
                            option: "freelist",
                            value: other.to_owned(),
                        })
                    }
                };
            }
            "grouping" => self.grouping = value.parse()?,
            other => return Err(OptionError::UnknownOption(other.to_owned())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = RenderOptions::default();
        assert_eq!(opts.get("freelist").unwrap(), "off");
        assert_eq!(opts.get("grouping").unwrap(), "none");
    }

    #[test]
    fn set_then_get() {
        let mut opts = RenderOptions::default();
        opts.set("freelist", "on").unwrap();
        opts.set("grouping", "block-owner").unwrap();
        assert!(opts.render_free);
        assert_eq!(opts.get("grouping").unwrap(), "block[gold]-owner[red]");
    }

    #[test]
    fn bad_input_leaves_options_unchanged() {
        let mut opts = RenderOptions::default();
        opts.set("grouping", "owner").unwrap();
        let before = opts.clone();

        assert_eq!(
            opts.set("freelist", "maybe"),
            Err(OptionError::InvalidSetting {
                option: "freelist",
                value: "maybe".into()
            })
        );
        assert!(matches!(
            opts.set("grouping", "disk"),
            Err(OptionError::InvalidSetting { option: "grouping", .. })
        ));
        assert_eq!(
            opts.set("colour", "on"),
            Err(OptionError::UnknownOption("colour".into()))
        );
        assert_eq!(opts, before);
    }

    #[test]
    fn every_name_is_gettable() {
        let opts = RenderOptions::default();
        for name in RenderOptions::NAMES {
            assert!(opts.get(name).is_ok());
        }
    }
}

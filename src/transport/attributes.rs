//! Attribute tables shared by the transport variants.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::value::TriState;

use super::capability::TransportKind;

/// A variant's configuration: a fixed set of tri-state string attributes.
pub trait VariantConfig: Default + Clone {
    /// Kind this configuration belongs to.
    const KIND: TransportKind;

    /// Every attribute name the variant accepts.
    const ATTRIBUTES: &'static [&'static str];

    /// Attributes that must carry a concrete value.
    const REQUIRED: &'static [&'static str];

    /// Groups where at least one member must carry a concrete value.
    const ONE_OF: &'static [&'static [&'static str]];

    /// Attributes holding credentials, masked wherever a value is persisted.
    const SENSITIVE: &'static [&'static str] = &[];

    /// Looks up an attribute by name.
    fn attribute(&self, name: &str) -> Option<&TriState<String>>;

    /// Looks up an attribute by name for writing.
    fn attribute_mut(&mut self, name: &str) -> Option<&mut TriState<String>>;

    /// Variant specific value checks, run after presence checks pass.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending attribute.
    fn check_values(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Every attribute keyed by name.
    fn attributes(&self) -> BTreeMap<&'static str, &TriState<String>> {
        Self::ATTRIBUTES
            .iter()
            .filter_map(|name| self.attribute(name).map(|value| (*name, value)))
            .collect()
    }

    /// Checks required attributes and one-of groups. Performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns the first missing attribute or unsatisfied group.
    fn validate(&self) -> Result<(), ConfigError> {
        for name in Self::REQUIRED {
            match self.attribute(name) {
                Some(TriState::Known(_)) => {}
                Some(TriState::Unknown) => {
                    return Err(ConfigError::invalid(
                        attribute_path(Self::KIND, name),
                        "value is not known yet",
                    ));
                }
                _ => {
                    return Err(ConfigError::MissingAttribute {
                        path: attribute_path(Self::KIND, name),
                    });
                }
            }
        }

        for group in Self::ONE_OF {
            let satisfied = group
                .iter()
                .any(|name| self.attribute(name).is_some_and(TriState::has_value));
            if !satisfied {
                return Err(ConfigError::MissingOneOf {
                    paths: group
                        .iter()
                        .map(|name| attribute_path(Self::KIND, name))
                        .collect(),
                });
            }
        }

        self.check_values()
    }
}

/// Dotted path of an attribute, e.g. `transport.ssh.host`.
#[must_use]
pub fn attribute_path(kind: TransportKind, name: &str) -> String {
    format!("transport.{kind}.{name}")
}

/// Expands a leading `~` to the current user's home directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Resolves a value-or-path attribute pair. The inline value wins.
///
/// # Errors
///
/// Returns an invalid attribute error if the path cannot be read.
pub fn value_or_file(
    kind: TransportKind,
    value: &TriState<String>,
    path_name: &str,
    path: &TriState<String>,
) -> Result<Option<String>, ConfigError> {
    if let Some(v) = value.get() {
        return Ok(Some(v.clone()));
    }
    let Some(p) = path.get() else {
        return Ok(None);
    };
    let resolved = expand_home(p);
    std::fs::read_to_string(&resolved)
        .map(Some)
        .map_err(|e| {
            ConfigError::invalid(
                attribute_path(kind, path_name),
                format!("cannot read {}: {e}", resolved.display()),
            )
        })
}

/// Stand-in written in place of a persisted secret.
pub const REDACTED: &str = "<redacted>";

/// Formats a secret for `Debug` output without revealing it.
pub(crate) const fn redacted(value: &TriState<String>) -> &'static str {
    match value {
        TriState::Known(_) => REDACTED,
        TriState::Unknown => "<unknown>",
        TriState::Null => "<null>",
    }
}

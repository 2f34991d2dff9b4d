//! Inputs that contribute to an action fingerprint.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::value::TriState;

use crate::transport::expand_home;

/// A tri-state list of tri-state strings.
pub type StringList = TriState<Vec<TriState<String>>>;

/// A tri-state map of tri-state strings.
pub type StringMap = TriState<BTreeMap<String, TriState<String>>>;

/// Everything an exec action's outcome depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionInputs {
    /// Content uploaded and run as a script.
    pub content: TriState<String>,
    /// Commands run one after another.
    pub inline: StringList,
    /// Local script files uploaded and run.
    pub scripts: StringList,
    /// Environment exported for every command.
    pub environment: StringMap,
}

impl ActionInputs {
    /// True when no contributing input is unknown, at any depth.
    #[must_use]
    pub fn fully_known(&self) -> bool {
        self.content.is_known()
            && self.inline.fully_known()
            && self.scripts.fully_known()
            && self.environment.fully_known()
    }

    /// Inline commands with null entries dropped.
    #[must_use]
    pub fn inline_commands(&self) -> Vec<String> {
        known_items(&self.inline)
    }

    /// Script paths with null entries dropped, `~` expanded.
    #[must_use]
    pub fn script_paths(&self) -> Vec<PathBuf> {
        known_items(&self.scripts)
            .iter()
            .map(|p| expand_home(p))
            .collect()
    }

    /// Reads every script file in order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ScriptUnreadable`] for the first file that
    /// cannot be read.
    pub fn read_scripts(&self) -> Result<Vec<(PathBuf, String)>, ConfigError> {
        self.script_paths()
            .into_iter()
            .map(|path| match std::fs::read_to_string(&path) {
                Ok(body) => Ok((path, body)),
                Err(e) => Err(ConfigError::ScriptUnreadable {
                    path,
                    message: e.to_string(),
                }),
            })
            .collect()
    }

    /// Environment with null values dropped.
    #[must_use]
    pub fn environment_vars(&self) -> BTreeMap<String, String> {
        self.environment
            .get()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(k, v)| v.get().map(|v| (k.clone(), v.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn known_items(list: &StringList) -> Vec<String> {
    list.get()
        .map(|items| items.iter().filter_map(|i| i.get().cloned()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_known_looks_inside_collections() {
        let mut inputs = ActionInputs {
            inline: TriState::Known(vec![TriState::Known(String::from("echo hi"))]),
            ..ActionInputs::default()
        };
        assert!(inputs.fully_known());

        inputs.inline = TriState::Known(vec![TriState::Unknown]);
        assert!(!inputs.fully_known());

        inputs.inline = TriState::Null;
        inputs.content = TriState::Unknown;
        assert!(!inputs.fully_known());
    }

    #[test]
    fn test_environment_vars_drops_nulls() {
        let mut env = BTreeMap::new();
        env.insert(String::from("FOO"), TriState::Known(String::from("bar")));
        env.insert(String::from("UNSET"), TriState::Null);
        let inputs = ActionInputs {
            environment: TriState::Known(env),
            ..ActionInputs::default()
        };

        let vars = inputs.environment_vars();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("FOO").map(String::as_str), Some("bar"));
    }

    #[test]
    fn test_read_scripts_missing_file() {
        let inputs = ActionInputs {
            scripts: TriState::Known(vec![TriState::Known(String::from("/nonexistent/setup.sh"))]),
            ..ActionInputs::default()
        };

        assert!(matches!(
            inputs.read_scripts(),
            Err(ConfigError::ScriptUnreadable { .. })
        ));
    }
}

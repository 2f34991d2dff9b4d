//! Content-addressed fingerprints for change detection.
//!
//! Each input component is hashed on its own, the hex digests are
//! concatenated in a fixed order, and the concatenation is hashed again. A
//! changed fingerprint is the only signal that an action has to run again.

use std::fmt;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ConfigError;
use crate::value::TriState;

use super::inputs::ActionInputs;

/// Result of fingerprinting an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    /// Hex digest over every input.
    Known(String),
    /// Some input is not known yet.
    Unknown,
}

impl Fingerprint {
    /// The digest, if known.
    #[must_use]
    pub fn as_known(&self) -> Option<&str> {
        match self {
            Self::Known(digest) => Some(digest.as_str()),
            Self::Unknown => None,
        }
    }

    /// True when some input was unknown.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Converts into the value written back to the host.
    #[must_use]
    pub fn to_tristate(&self) -> TriState<String> {
        match self {
            Self::Known(digest) => TriState::Known(digest.clone()),
            Self::Unknown => TriState::Unknown,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(digest) => f.write_str(digest),
            Self::Unknown => f.write_str("(known after apply)"),
        }
    }
}

/// Computes fingerprints.
#[derive(Debug, Default)]
pub struct FingerprintEngine;

impl FingerprintEngine {
    /// Creates a new engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Fingerprints exec action inputs.
    ///
    /// Order: uploaded content, each inline command as given, each script
    /// file's contents as given, each environment entry as `key:value`
    /// sorted by key. Null components contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ScriptUnreadable`] if a script file cannot be
    /// read. Unknown inputs are not an error.
    pub fn compute(&self, inputs: &ActionInputs) -> Result<Fingerprint, ConfigError> {
        if !inputs.fully_known() {
            debug!("Fingerprint deferred: inputs not fully known");
            return Ok(Fingerprint::Unknown);
        }

        let mut components = Vec::new();
        if let Some(content) = inputs.content.get() {
            components.push(Self::digest(content.as_bytes()));
        }
        for command in inputs.inline_commands() {
            components.push(Self::digest(command.as_bytes()));
        }
        for (_, body) in inputs.read_scripts()? {
            components.push(Self::digest(body.as_bytes()));
        }
        for (key, value) in inputs.environment_vars() {
            components.push(Self::digest(format!("{key}:{value}").as_bytes()));
        }

        Ok(Fingerprint::Known(Self::combine(components)))
    }

    /// Hex SHA-256 of a single component.
    #[must_use]
    pub fn digest(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Hashes the concatenation of component digests.
    #[must_use]
    pub fn combine<I>(components: I) -> String
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut hasher = Sha256::new();
        for component in components {
            hasher.update(component.as_ref().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// First 8 characters of a digest, for display.
    #[must_use]
    pub fn short_hash(hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two digests in constant time.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Write;

    fn list(items: &[&str]) -> TriState<Vec<TriState<String>>> {
        TriState::Known(items.iter().map(|s| TriState::Known(s.to_string())).collect())
    }

    fn env(pairs: &[(&str, &str)]) -> TriState<BTreeMap<String, TriState<String>>> {
        TriState::Known(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), TriState::Known(v.to_string())))
                .collect(),
        )
    }

    fn inputs(inline: &[&str], vars: &[(&str, &str)]) -> ActionInputs {
        ActionInputs {
            inline: list(inline),
            environment: env(vars),
            ..ActionInputs::default()
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let engine = FingerprintEngine::new();
        let a = engine.compute(&inputs(&["echo hi"], &[("FOO", "bar")])).expect("compute");
        let b = engine.compute(&inputs(&["echo hi"], &[("FOO", "bar")])).expect("compute");

        assert_eq!(a, b);
        assert_eq!(a.as_known().map(str::len), Some(64));
    }

    #[test]
    fn test_env_change_changes_fingerprint() {
        let engine = FingerprintEngine::new();
        let a = engine.compute(&inputs(&["echo hi"], &[("FOO", "bar")])).expect("compute");
        let b = engine.compute(&inputs(&["echo hi"], &[("FOO", "baz")])).expect("compute");

        assert_ne!(a, b);
    }

    #[test]
    fn test_env_insertion_order_irrelevant() {
        let engine = FingerprintEngine::new();
        let a = engine
            .compute(&inputs(&["true"], &[("A", "1"), ("B", "2")]))
            .expect("compute");
        let b = engine
            .compute(&inputs(&["true"], &[("B", "2"), ("A", "1")]))
            .expect("compute");

        assert_eq!(a, b);
    }

    #[test]
    fn test_inline_order_relevant() {
        let engine = FingerprintEngine::new();
        let a = engine.compute(&inputs(&["one", "two"], &[])).expect("compute");
        let b = engine.compute(&inputs(&["two", "one"], &[])).expect("compute");

        assert_ne!(a, b);
    }

    #[test]
    fn test_unknown_input_gives_unknown() {
        let engine = FingerprintEngine::new();
        let mut unknown_env = BTreeMap::new();
        unknown_env.insert(String::from("TOKEN"), TriState::Unknown);
        let inputs = ActionInputs {
            inline: list(&["echo hi"]),
            environment: TriState::Known(unknown_env),
            ..ActionInputs::default()
        };

        assert_eq!(engine.compute(&inputs).expect("compute"), Fingerprint::Unknown);
    }

    #[test]
    fn test_unknown_does_not_read_scripts() {
        let engine = FingerprintEngine::new();
        let inputs = ActionInputs {
            content: TriState::Unknown,
            scripts: list(&["/nonexistent/never-read.sh"]),
            ..ActionInputs::default()
        };

        assert!(engine.compute(&inputs).expect("compute").is_unknown());
    }

    #[test]
    fn test_script_contents_not_path() {
        let engine = FingerprintEngine::new();
        let mut first = tempfile::NamedTempFile::new().expect("tempfile");
        write!(first, "apt-get install -y vault").expect("write");
        let mut second = tempfile::NamedTempFile::new().expect("tempfile");
        write!(second, "apt-get install -y vault").expect("write");

        let by_path = |file: &tempfile::NamedTempFile| ActionInputs {
            scripts: list(&[file.path().to_str().expect("utf-8 path")]),
            ..ActionInputs::default()
        };

        assert_eq!(
            engine.compute(&by_path(&first)).expect("compute"),
            engine.compute(&by_path(&second)).expect("compute")
        );
    }

    #[test]
    fn test_component_layout() {
        let engine = FingerprintEngine::new();
        let expected = FingerprintEngine::combine([
            FingerprintEngine::digest(b"echo hi"),
            FingerprintEngine::digest(b"FOO:bar"),
        ]);
        let computed = engine.compute(&inputs(&["echo hi"], &[("FOO", "bar")])).expect("compute");

        assert_eq!(computed.as_known(), Some(expected.as_str()));
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(FingerprintEngine::short_hash("abcdef1234567890"), "abcdef12");
    }

    #[test]
    fn test_hashes_match() {
        assert!(FingerprintEngine::hashes_match("abc123", "abc123"));
        assert!(!FingerprintEngine::hashes_match("abc123", "abc124"));
        assert!(!FingerprintEngine::hashes_match("abc123", "abc12"));
    }
}

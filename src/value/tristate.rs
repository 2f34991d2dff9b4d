//! Known / unknown / null values exchanged with a plan-then-apply host.
//!
//! The wire encoding is JSON. A known value encodes as itself, null encodes
//! as JSON `null`, and unknown encodes as [`UNKNOWN_SENTINEL`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// String placed on the wire for a value that cannot be computed yet.
pub const UNKNOWN_SENTINEL: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

/// A value that is concretely known, explicitly null, or not yet known.
///
/// Exactly one of the three holds at any time. Unknown is never coerced to a
/// zero value; it has to be carried through plans unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TriState<T> {
    /// Explicitly null or never set.
    #[default]
    Null,
    /// Not computable until apply.
    Unknown,
    /// A concrete value.
    Known(T),
}

impl<T> TriState<T> {
    /// Returns the value only when it is known and not null.
    #[must_use]
    pub const fn get(&self) -> Option<&T> {
        match self {
            Self::Known(v) => Some(v),
            Self::Null | Self::Unknown => None,
        }
    }

    /// Replaces the value, clearing the unknown and null flags.
    pub fn set(&mut self, value: T) {
        *self = Self::Known(value);
    }

    /// Marks the value as not yet known.
    pub fn set_unknown(&mut self) {
        *self = Self::Unknown;
    }

    /// Marks the value as null.
    pub fn set_null(&mut self) {
        *self = Self::Null;
    }

    /// True unless the value is unknown. Null counts as known.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// True when the value is unknown.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// True when the value is null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True when a concrete value is present.
    #[must_use]
    pub const fn has_value(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Consumes the wrapper and returns the concrete value, if any.
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Known(v) => Some(v),
            Self::Null | Self::Unknown => None,
        }
    }

    /// Maps a known value, preserving null and unknown.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> TriState<U> {
        match self {
            Self::Known(v) => TriState::Known(f(v)),
            Self::Null => TriState::Null,
            Self::Unknown => TriState::Unknown,
        }
    }
}

impl<T> From<T> for TriState<T> {
    fn from(value: T) -> Self {
        Self::Known(value)
    }
}

impl<T> From<Option<T>> for TriState<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::Known)
    }
}

impl<T> TriState<Vec<TriState<T>>> {
    /// The list itself is known and so is every element.
    ///
    /// A known list can still contain unknown elements, so this is a stronger
    /// predicate than [`TriState::is_known`].
    #[must_use]
    pub fn fully_known(&self) -> bool {
        match self {
            Self::Known(items) => items.iter().all(TriState::is_known),
            Self::Null => true,
            Self::Unknown => false,
        }
    }
}

impl<T> TriState<BTreeMap<String, TriState<T>>> {
    /// The map itself is known and so is every value.
    #[must_use]
    pub fn fully_known(&self) -> bool {
        match self {
            Self::Known(entries) => entries.values().all(TriState::is_known),
            Self::Null => true,
            Self::Unknown => false,
        }
    }
}

impl<T: Serialize> TriState<T> {
    /// Encodes the value into its wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if the inner value cannot be encoded as JSON.
    pub fn to_wire(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::Known(v) => serde_json::to_value(v),
            Self::Null => Ok(serde_json::Value::Null),
            Self::Unknown => Ok(serde_json::Value::String(UNKNOWN_SENTINEL.to_string())),
        }
    }
}

impl<T: DeserializeOwned> TriState<T> {
    /// Decodes a value from its wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if a known value does not match `T`.
    pub fn from_wire(value: &serde_json::Value) -> serde_json::Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::String(s) if s == UNKNOWN_SENTINEL => Ok(Self::Unknown),
            other => T::deserialize(other).map(Self::Known),
        }
    }
}

impl<T: Serialize> Serialize for TriState<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(v) => v.serialize(serializer),
            Self::Null => serializer.serialize_none(),
            Self::Unknown => serializer.serialize_str(UNKNOWN_SENTINEL),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for TriState<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Self::from_wire(&raw).map_err(serde::de::Error::custom)
    }
}

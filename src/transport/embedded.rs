//! The transport container embedded in provider defaults and in each action.
//!
//! It holds at most one variant plus the exact set of attribute names that
//! were supplied, so what goes back to the host mirrors what came in.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::value::TriState;

use super::attributes::{REDACTED, attribute_path};
use super::capability::{Transport, TransportKind};
use super::variant::TransportVariant;

/// Lifecycle of an [`EmbeddedTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// No variant selected.
    #[default]
    Unconfigured,
    /// A variant is selected but some supplied attribute is still unknown.
    PartiallyConfigured,
    /// Every supplied attribute is known.
    Configured,
    /// Required attributes checked; clients may be built.
    Validated,
}

/// Zero or one transport variant plus its supplied-attribute record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedTransport {
    variant: Option<TransportVariant>,
    supplied: BTreeSet<String>,
    /// Variant blocks that arrived as explicit nulls.
    null_blocks: BTreeSet<TransportKind>,
    /// Whether the `transport` block itself was present.
    declared: bool,
    state: TransportState,
}

impl EmbeddedTransport {
    /// An unconfigured container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`EmbeddedTransport::set_attribute`].
    ///
    /// # Errors
    ///
    /// See [`EmbeddedTransport::set_attribute`].
    pub fn with_attribute(
        mut self,
        kind: TransportKind,
        name: &str,
        value: impl Into<TriState<String>>,
    ) -> std::result::Result<Self, ConfigError> {
        self.set_attribute(kind, name, value.into())?;
        Ok(self)
    }

    /// Supplies one attribute, selecting the variant if none is selected.
    ///
    /// # Errors
    ///
    /// Fails if a different variant is already selected or the attribute is
    /// not defined for `kind`.
    pub fn set_attribute(
        &mut self,
        kind: TransportKind,
        name: &str,
        value: TriState<String>,
    ) -> std::result::Result<(), ConfigError> {
        let variant = self.select(kind)?;
        let slot = variant
            .attribute_mut(name)
            .ok_or_else(|| ConfigError::UnknownAttribute {
                path: attribute_path(kind, name),
            })?;
        *slot = value;
        self.supplied.insert(name.to_string());
        self.declared = true;
        self.refresh_state();
        Ok(())
    }

    fn select(&mut self, kind: TransportKind) -> std::result::Result<&mut TransportVariant, ConfigError> {
        if let Some(existing) = &self.variant {
            if existing.kind() != kind {
                return Err(ConfigError::TransportKindConflict {
                    existing: existing.kind().to_string(),
                    incoming: kind.to_string(),
                });
            }
        }
        Ok(self.variant.get_or_insert_with(|| TransportVariant::empty(kind)))
    }

    /// Decodes the wire form of a `transport` block.
    ///
    /// # Errors
    ///
    /// Fails on unknown block or attribute names, non-string attribute values,
    /// and when more than one variant block is populated.
    pub fn from_wire(wire: &Value) -> std::result::Result<Self, ConfigError> {
        let mut container = Self::default();
        let blocks = match wire {
            Value::Null => return Ok(container),
            Value::Object(blocks) => blocks,
            _ => return Err(ConfigError::invalid("transport", "expected an object")),
        };
        container.declared = true;

        let mut populated = Vec::new();
        for (block, body) in blocks {
            let kind = TransportKind::from_block(block).ok_or_else(|| ConfigError::UnknownAttribute {
                path: format!("transport.{block}"),
            })?;
            match body {
                Value::Null => {
                    container.null_blocks.insert(kind);
                }
                Value::Object(attributes) => populated.push((kind, attributes)),
                _ => {
                    return Err(ConfigError::invalid(
                        format!("transport.{block}"),
                        "expected an object",
                    ));
                }
            }
        }

        if populated.len() > 1 {
            return Err(ConfigError::MultipleTransports {
                kinds: populated.iter().map(|(k, _)| k.to_string()).collect(),
            });
        }

        if let Some((kind, attributes)) = populated.pop() {
            container.select(kind)?;
            for (name, raw) in attributes {
                let value = TriState::<String>::from_wire(raw).map_err(|e| {
                    ConfigError::invalid(attribute_path(kind, name), e.to_string())
                })?;
                container.set_attribute(kind, name, value)?;
            }
        }

        container.refresh_state();
        Ok(container)
    }

    /// Encodes the container back into the shape it arrived in.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        if !self.declared {
            return Value::Null;
        }

        let mut blocks = Map::new();
        for kind in &self.null_blocks {
            blocks.insert(kind.to_string(), Value::Null);
        }
        if let Some(variant) = &self.variant {
            let mut attributes = Map::new();
            for name in &self.supplied {
                if let Some(value) = variant.attribute(name) {
                    attributes.insert(name.clone(), string_wire(value));
                }
            }
            blocks.insert(variant.kind().to_string(), Value::Object(attributes));
        }
        Value::Object(blocks)
    }

    /// Like [`to_wire`](Self::to_wire), but every known credential is replaced
    /// by [`REDACTED`]. Keys and null or unknown values keep their shape.
    #[must_use]
    pub fn to_redacted_wire(&self) -> Value {
        let mut wire = self.to_wire();
        let Some(variant) = &self.variant else {
            return wire;
        };
        let block = wire
            .get_mut(variant.kind().as_str())
            .and_then(Value::as_object_mut);
        if let Some(attributes) = block {
            for name in variant.sensitive_names() {
                if let Some(value) = attributes.get_mut(*name) {
                    if variant.attribute(name).is_some_and(TriState::has_value) {
                        *value = Value::String(REDACTED.to_string());
                    }
                }
            }
        }
        wire
    }

    /// Selected variant kind, if any.
    #[must_use]
    pub fn kind(&self) -> Option<TransportKind> {
        self.variant.as_ref().map(TransportVariant::kind)
    }

    /// Selected variant, if any.
    #[must_use]
    pub const fn variant(&self) -> Option<&TransportVariant> {
        self.variant.as_ref()
    }

    /// Attribute names that were explicitly supplied.
    pub fn supplied(&self) -> impl Iterator<Item = &str> {
        self.supplied.iter().map(String::as_str)
    }

    /// Looks up an attribute of the selected variant.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&TriState<String>> {
        self.variant.as_ref().and_then(|v| v.attribute(name))
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TransportState {
        self.state
    }

    /// Human readable target description.
    #[must_use]
    pub fn target(&self) -> String {
        self.variant
            .as_ref()
            .map_or_else(|| String::from("<no transport>"), TransportVariant::target)
    }

    /// True when every supplied attribute is known.
    #[must_use]
    pub fn fully_known(&self) -> bool {
        self.supplied
            .iter()
            .all(|name| self.attribute(name).is_none_or(TriState::is_known))
    }

    /// Copies the supplied attributes into `target`'s matching variant.
    ///
    /// # Errors
    ///
    /// Fails if `target` already holds a different variant.
    pub fn merge_into(&self, target: &mut Self) -> std::result::Result<(), ConfigError> {
        let Some(source) = &self.variant else {
            return Ok(());
        };
        let kind = source.kind();
        target.select(kind)?;
        for name in &self.supplied {
            if let Some(value) = source.attribute(name) {
                target.set_attribute(kind, name, value.clone())?;
            }
        }
        target.refresh_state();
        Ok(())
    }

    /// Merges `overrides` over `base`; supplied override keys win per key.
    ///
    /// # Errors
    ///
    /// Fails if the two hold different variants.
    pub fn merge(base: &Self, overrides: &Self) -> std::result::Result<Self, ConfigError> {
        let mut merged = base.clone();
        overrides.merge_into(&mut merged)?;
        Ok(merged)
    }

    /// Checks completeness and moves to [`TransportState::Validated`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoTransport`] when nothing is selected, or the
    /// variant's error naming the missing attribute.
    pub fn validate(&mut self) -> std::result::Result<(), ConfigError> {
        let variant = self.variant.as_ref().ok_or(ConfigError::NoTransport)?;
        variant.validate()?;
        self.state = TransportState::Validated;
        debug!(kind = %variant.kind(), target = %variant.target(), "Transport validated");
        Ok(())
    }

    /// Builds a fresh client. Clients are not cached.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotValidated`] unless [`validate`](Self::validate)
    /// succeeded, otherwise whatever building the channel returns.
    pub async fn client(&self, cancel: &CancellationToken) -> Result<Box<dyn Transport>> {
        match (&self.variant, self.state) {
            (Some(variant), TransportState::Validated) => variant.build_client(cancel).await,
            _ => Err(ConfigError::NotValidated.into()),
        }
    }

    fn refresh_state(&mut self) {
        self.state = match &self.variant {
            None => TransportState::Unconfigured,
            Some(_) if self.fully_known() && !self.supplied.is_empty() => TransportState::Configured,
            Some(_) => TransportState::PartiallyConfigured,
        };
    }
}

fn string_wire(value: &TriState<String>) -> Value {
    match value {
        TriState::Known(s) => Value::String(s.clone()),
        TriState::Null => Value::Null,
        TriState::Unknown => Value::String(crate::value::UNKNOWN_SENTINEL.to_string()),
    }
}

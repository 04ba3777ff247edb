// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// A single field value of an [`Item`].
///
/// The persisted form is tagged, so every variant survives a serialization
/// round trip unchanged. In particular, text holding an RFC 3339 date stays
/// [`FieldValue::Text`] instead of being reinterpreted as a timestamp.
/// Snapshots depend on this: a value that changed its variant across the
/// round trip would compare unequal to the adapter's fresh copy and be
/// re-detected as modified on every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum FieldValue {
    /// Boolean flag.
    Flag(bool),

    /// Numeric value.
    Number(f64),

    /// Date and time with offset.
    Timestamp(DateTime<FixedOffset>),

    /// Free text.
    Text(String),

    /// List of strings (tags, attendees, ...).
    TextList(Vec<String>),
}

impl FieldValue {
    /// Returns the text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the timestamp, accepting both the timestamp variant and text
    /// holding an RFC 3339 date (vendor APIs frequently ship the latter).
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            Self::Text(s) => DateTime::parse_from_rfc3339(s).ok(),
            _ => None,
        }
    }
}

impl PartialEq for FieldValue {
    #[allow(clippy::float_cmp)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Flag(a), Self::Flag(b)) => a == b,
            // NaN compares equal to itself here, otherwise an item carrying
            // one would read as modified on every run.
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::TextList(a), Self::TextList(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<DateTime<FixedOffset>> for FieldValue {
    fn from(t: DateTime<FixedOffset>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        Self::TextList(v)
    }
}

/// A side-defined keyed record flowing through the engine.
///
/// Items are immutable value snapshots: once captured for a run they are
/// never mutated in place, only projected into new items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(BTreeMap<String, FieldValue>);

impl Item {
    /// Creates an empty item.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts a field, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the value of a field, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    /// Returns the text content of a field, if present and textual.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(FieldValue::as_text)
    }

    /// Returns a field interpreted as a timestamp, if possible.
    #[must_use]
    pub fn timestamp(&self, key: &str) -> Option<DateTime<FixedOffset>> {
        self.0.get(key).and_then(FieldValue::as_timestamp)
    }

    /// Returns the identity of this item under the given identity field name.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MissingField`] if the field is absent or not text.
    pub fn id(&self, id_key: &str) -> Result<&str, SyncError> {
        self.text(id_key)
            .ok_or_else(|| SyncError::MissingField(id_key.to_string()))
    }

    /// Returns a copy containing only the given fields.
    #[must_use]
    pub fn restricted(&self, keys: &BTreeSet<String>) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| keys.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Returns a copy with the given fields removed.
    #[must_use]
    pub fn without(&self, keys: &BTreeSet<String>) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !keys.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Iterates over fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the item has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for Item {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

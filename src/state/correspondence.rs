// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::Path;

use bimap::BiBTreeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::SyncError;
use crate::side::Side;

/// Durable, bijective map between the two sides' item identities.
///
/// Each pair `(idA, idB)` marks two items believed to represent the same
/// logical entity. The table is kept as a single bidirectional map so both
/// lookup directions stay cheap and the bijection invariant is checked
/// mechanically on every insert.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceTable {
    map: BiBTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Persisted {
    map: BiBTreeMap<String, String>,
    last_modified: DateTime<Utc>,
}

impl CorrespondenceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the table from disk.
    ///
    /// A missing file yields an empty table; a file that exists but cannot be
    /// parsed is an error, since silently discarding the table would make the
    /// next run re-create every known item.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::State`] on I/O or parse failure.
    pub async fn load_or_new(path: &Path) -> Result<Self, SyncError> {
        match fs::read_to_string(path).await {
            Ok(content) => {
                let persisted: Persisted = serde_json::from_str(&content).map_err(|e| {
                    SyncError::State(format!(
                        "corrupt correspondence table {}: {e}",
                        path.display()
                    ))
                })?;
                tracing::debug!(
                    path = %path.display(),
                    pairs = persisted.map.len(),
                    "loaded correspondence table"
                );
                Ok(Self { map: persisted.map })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Dump the table to disk as a whole-table rewrite.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::State`] on I/O failure.
    pub async fn dump(&self, path: &Path) -> Result<(), SyncError> {
        let persisted = Persisted {
            map: self.map.clone(),
            last_modified: Utc::now(),
        };
        let content = serde_json::to_string(&persisted)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Returns the id paired with `id` on the other side, if any.
    #[must_use]
    pub fn lookup(&self, side: Side, id: &str) -> Option<&str> {
        match side {
            Side::A => self.map.get_by_left(id).map(String::as_str),
            Side::B => self.map.get_by_right(id).map(String::as_str),
        }
    }

    /// Inserts the pair `(id_a, id_b)`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::BijectionViolation`] if either id already
    /// participates in a pair. This is a programming or data-corruption
    /// error, never recovered from silently.
    pub fn insert(&mut self, id_a: impl Into<String>, id_b: impl Into<String>) -> Result<(), SyncError> {
        let (id_a, id_b) = (id_a.into(), id_b.into());
        if self.map.contains_left(&id_a) {
            return Err(SyncError::BijectionViolation(id_a));
        }
        if self.map.contains_right(&id_b) {
            return Err(SyncError::BijectionViolation(id_b));
        }
        self.map.insert(id_a, id_b);
        Ok(())
    }

    /// Removes the pair containing `id` on the given side, returning the
    /// other side's id if the pair existed.
    pub fn remove(&mut self, side: Side, id: &str) -> Option<String> {
        match side {
            Side::A => self.map.remove_by_left(id).map(|(_, b)| b),
            Side::B => self.map.remove_by_right(id).map(|(a, _)| a),
        }
    }

    /// Iterates this side's ids in order.
    pub fn ids(&self, side: Side) -> impl Iterator<Item = &str> {
        self.map.iter().map(move |(a, b)| match side {
            Side::A => a.as_str(),
            Side::B => b.as_str(),
        })
    }

    /// Iterates all pairs as `(idA, idB)`.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    /// The number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the table holds no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_directions() {
        let mut table = CorrespondenceTable::new();
        table.insert("a1", "b1").unwrap();

        assert_eq!(table.lookup(Side::A, "a1"), Some("b1"));
        assert_eq!(table.lookup(Side::B, "b1"), Some("a1"));
        assert_eq!(table.lookup(Side::A, "b1"), None);
    }

    #[test]
    fn test_insert_rejects_duplicate_ids() {
        let mut table = CorrespondenceTable::new();
        table.insert("a1", "b1").unwrap();

        assert!(matches!(
            table.insert("a1", "b2"),
            Err(SyncError::BijectionViolation(id)) if id == "a1"
        ));
        assert!(matches!(
            table.insert("a2", "b1"),
            Err(SyncError::BijectionViolation(id)) if id == "b1"
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_either_side() {
        let mut table = CorrespondenceTable::new();
        table.insert("a1", "b1").unwrap();
        table.insert("a2", "b2").unwrap();

        assert_eq!(table.remove(Side::A, "a1"), Some("b1".to_string()));
        assert_eq!(table.remove(Side::B, "b2"), Some("a2".to_string()));
        assert_eq!(table.remove(Side::A, "a1"), None);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_persist_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("correspondence.json");

        let mut table = CorrespondenceTable::new();
        table.insert("a1", "b1").unwrap();
        table.insert("a2", "b2").unwrap();
        table.dump(&path).await.unwrap();

        let loaded = CorrespondenceTable::load_or_new(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.lookup(Side::A, "a2"), Some("b2"));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let table = CorrespondenceTable::load_or_new(&dir.path().join("none.json"))
            .await
            .unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("correspondence.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        assert!(matches!(
            CorrespondenceTable::load_or_new(&path).await,
            Err(SyncError::State(_))
        ));
    }
}

// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;

use tokio::fs;

use crate::error::SyncError;
use crate::item::Item;
use crate::side::Side;

/// Durable per-side map from item id to its last-observed serialized form.
///
/// Snapshots are the diff baseline and nothing else: they are written after a
/// change has been propagated, deleted alongside their correspondence pair,
/// and never shown to a side adapter. One JSON file per `(side, id)` keeps
/// entries independent, so a partial write failure affects a single item.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Opens the store rooted at `dir`, creating its per-side directories.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::State`] if the directories cannot be created.
    pub async fn open(dir: PathBuf) -> Result<Self, SyncError> {
        for side in [Side::A, Side::B] {
            fs::create_dir_all(dir.join(side.to_string())).await?;
        }
        Ok(Self { dir })
    }

    /// Returns the last-observed form of the item, if one is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::State`] on I/O or parse failure.
    pub async fn get(&self, side: Side, id: &str) -> Result<Option<Item>, SyncError> {
        let path = self.path_for(side, id);
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let item = serde_json::from_str(&content).map_err(|e| {
                    SyncError::State(format!("corrupt snapshot {}: {e}", path.display()))
                })?;
                Ok(Some(item))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Records the item as the new baseline for `(side, id)`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::State`] on I/O failure.
    pub async fn put(&mut self, side: Side, id: &str, item: &Item) -> Result<(), SyncError> {
        let content = serde_json::to_string(item)?;
        fs::write(self.path_for(side, id), content).await?;
        Ok(())
    }

    /// Removes the baseline for `(side, id)`. Removing a missing entry is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::State`] on I/O failure.
    pub async fn delete(&mut self, side: Side, id: &str) -> Result<(), SyncError> {
        match fs::remove_file(self.path_for(side, id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, side: Side, id: &str) -> PathBuf {
        self.dir
            .join(side.to_string())
            .join(format!("{}.json", encode_id(id)))
    }
}

/// Encodes an arbitrary item id into a filename-safe form.
///
/// Alphanumerics and `-`, `_`, `.` pass through; every other byte becomes
/// `%XX`. Percent itself is escaped, so the encoding is injective.
fn encode_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::item::Item;

/// Labels one of the two stores participating in a sync pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    /// The first store of the pair.
    A,
    /// The second store of the pair.
    B,
}

impl Side {
    /// The opposite side.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("a"),
            Self::B => f.write_str("b"),
        }
    }
}

/// Capability contract of one store participating in a sync pair.
///
/// Adapters own all vendor specifics: authentication, timeouts, retries and
/// schema mapping live behind this trait. The engine issues calls one item at
/// a time and treats any error as final for that item within the current run.
#[async_trait]
pub trait SideAdapter: Send {
    /// Human-readable adapter name, used in logs and reports.
    fn name(&self) -> &str;

    /// Enumerates every item currently in the store.
    ///
    /// # Errors
    ///
    /// A failure here aborts the whole run before any mutation.
    async fn all_items(&self) -> Result<Vec<Item>, SyncError>;

    /// Fetches a single item by id.
    ///
    /// With `use_cached` set, the adapter may serve the item out of whatever
    /// local cache it keeps instead of a fresh round trip.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure; an unknown id is `Ok(None)`.
    async fn get_item(&self, id: &str, use_cached: bool) -> Result<Option<Item>, SyncError>;

    /// Creates an item and returns it with its newly assigned identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the create.
    async fn add_item(&mut self, item: Item) -> Result<Item, SyncError>;

    /// Applies a partial update to the item with the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is unknown or the store rejects the update.
    async fn update_item(&mut self, id: &str, changes: Item) -> Result<(), SyncError>;

    /// Deletes the item with the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is unknown or the store rejects the delete.
    async fn delete_item(&mut self, id: &str) -> Result<(), SyncError>;

    /// Name of the field holding an item's identity.
    fn id_key(&self) -> &str;

    /// Name of the field holding a human-readable summary.
    fn summary_key(&self) -> &str;

    /// Name of the field holding the last-modification timestamp.
    fn modified_key(&self) -> &str;

    /// Whether two items are the same once the given fields are ignored.
    ///
    /// The default compares field-wise equality after dropping `ignore`;
    /// adapters may override it for looser vendor-specific notions (e.g.
    /// truncated timestamps).
    fn items_identical(&self, a: &Item, b: &Item, ignore: &BTreeSet<String>) -> bool {
        a.without(ignore) == b.without(ignore)
    }
}

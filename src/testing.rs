// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Test doubles for the engine.
//!
//! [`MemorySide`] is a complete in-memory [`SideAdapter`] used by the unit and
//! integration tests: it assigns identities on create, counts adapter calls so
//! tests can assert on mutation traffic, and can inject a one-shot failure.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SyncError;
use crate::item::Item;
use crate::side::SideAdapter;

#[derive(Debug, Default)]
struct Counters {
    all_items: AtomicUsize,
    get_item: AtomicUsize,
    add_item: AtomicUsize,
    update_item: AtomicUsize,
    delete_item: AtomicUsize,
}

/// An in-memory store implementing the full [`SideAdapter`] contract.
#[derive(Debug)]
pub struct MemorySide {
    name: String,
    id_key: String,
    summary_key: String,
    modified_key: String,
    items: BTreeMap<String, Item>,
    next_ids: VecDeque<String>,
    fail_next_add: bool,
    counters: Counters,
}

impl MemorySide {
    /// Creates an empty store with the default field names
    /// (`uid`, `summary`, `modified`).
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_keys(name, "uid", "summary", "modified")
    }

    /// Creates an empty store with custom field names.
    #[must_use]
    pub fn with_keys(
        name: impl Into<String>,
        id_key: impl Into<String>,
        summary_key: impl Into<String>,
        modified_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            id_key: id_key.into(),
            summary_key: summary_key.into(),
            modified_key: modified_key.into(),
            items: BTreeMap::new(),
            next_ids: VecDeque::new(),
            fail_next_add: false,
            counters: Counters::default(),
        }
    }

    /// Adds an item under an explicit id, bypassing the adapter contract and
    /// the call counters. Test setup only.
    pub fn seed(&mut self, id: impl Into<String>, mut item: Item) {
        let id = id.into();
        item.insert(self.id_key.clone(), id.clone());
        self.items.insert(id, item);
    }

    /// Removes an item directly, simulating an out-of-band deletion.
    pub fn lose(&mut self, id: &str) {
        self.items.remove(id);
    }

    /// Scripts the id assigned by the next [`SideAdapter::add_item`] call.
    pub fn queue_id(&mut self, id: impl Into<String>) {
        self.next_ids.push_back(id.into());
    }

    /// Makes the next [`SideAdapter::add_item`] call fail.
    pub fn fail_next_add(&mut self) {
        self.fail_next_add = true;
    }

    /// Returns the stored item with the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// The number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids of all stored items, in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Total create calls received.
    #[must_use]
    pub fn add_calls(&self) -> usize {
        self.counters.add_item.load(Ordering::Relaxed)
    }

    /// Total update calls received.
    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.counters.update_item.load(Ordering::Relaxed)
    }

    /// Total delete calls received.
    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.counters.delete_item.load(Ordering::Relaxed)
    }

    /// Total enumerate and point-fetch calls received.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.counters.all_items.load(Ordering::Relaxed)
            + self.counters.get_item.load(Ordering::Relaxed)
    }

    /// Total mutation calls (create + update + delete) received.
    #[must_use]
    pub fn mutation_calls(&self) -> usize {
        self.add_calls() + self.update_calls() + self.delete_calls()
    }
}

#[async_trait]
impl SideAdapter for MemorySide {
    fn name(&self) -> &str {
        &self.name
    }

    async fn all_items(&self) -> Result<Vec<Item>, SyncError> {
        self.counters.all_items.fetch_add(1, Ordering::Relaxed);
        Ok(self.items.values().cloned().collect())
    }

    async fn get_item(&self, id: &str, _use_cached: bool) -> Result<Option<Item>, SyncError> {
        self.counters.get_item.fetch_add(1, Ordering::Relaxed);
        Ok(self.items.get(id).cloned())
    }

    async fn add_item(&mut self, mut item: Item) -> Result<Item, SyncError> {
        self.counters.add_item.fetch_add(1, Ordering::Relaxed);
        if self.fail_next_add {
            self.fail_next_add = false;
            return Err(SyncError::Adapter(format!("{}: injected failure", self.name)));
        }

        let id = self
            .next_ids
            .pop_front()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        item.insert(self.id_key.clone(), id.clone());
        self.items.insert(id.clone(), item.clone());
        Ok(item)
    }

    async fn update_item(&mut self, id: &str, changes: Item) -> Result<(), SyncError> {
        self.counters.update_item.fetch_add(1, Ordering::Relaxed);
        let Some(existing) = self.items.get_mut(id) else {
            return Err(SyncError::Adapter(format!(
                "{}: no item with id {id:?}",
                self.name
            )));
        };
        for (key, value) in changes.iter() {
            existing.insert(key.to_string(), value.clone());
        }
        Ok(())
    }

    async fn delete_item(&mut self, id: &str) -> Result<(), SyncError> {
        self.counters.delete_item.fetch_add(1, Ordering::Relaxed);
        if self.items.remove(id).is_none() {
            return Err(SyncError::Adapter(format!(
                "{}: no item with id {id:?}",
                self.name
            )));
        }
        Ok(())
    }

    fn id_key(&self) -> &str {
        &self.id_key
    }

    fn summary_key(&self) -> &str {
        &self.summary_key
    }

    fn modified_key(&self) -> &str {
        &self.modified_key
    }
}

// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Durable engine state: the correspondence table and the snapshot store.

mod correspondence;
mod snapshot;

pub use correspondence::CorrespondenceTable;
pub use snapshot::SnapshotStore;

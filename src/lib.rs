// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Bidirectional synchronization engine for task, event and note stores.
//!
//! The engine keeps two independent stores ("sides") mutually consistent in
//! discrete batch passes: it detects what changed on each side since the last
//! run, maintains a durable bijective identity correspondence between the two
//! stores, reconciles concurrent changes through a configurable resolution
//! strategy, and propagates the net effect through the side-agnostic
//! [`SideAdapter`] and [`Converter`] contracts.

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::dbg_macro,
    clippy::indexing_slicing,
    clippy::pedantic
)]
// Allow certain clippy lints that are too restrictive for this crate
#![allow(clippy::similar_names, clippy::single_match_else, clippy::match_bool)]

mod config;
mod convert;
mod detect;
mod engine;
mod error;
mod item;
mod reconcile;
mod resolve;
mod side;
mod state;
pub mod testing;

pub use crate::config::{APP_NAME, SyncConfig};
pub use crate::convert::{Converter, FnConverter, IdentityConverter};
pub use crate::detect::ChangeSet;
pub use crate::engine::SyncEngine;
pub use crate::error::SyncError;
pub use crate::item::{FieldValue, Item};
pub use crate::reconcile::{ItemFailure, Operation, RunReport, SideCounts};
pub use crate::resolve::{ResolutionStrategy, Winner};
pub use crate::side::{Side, SideAdapter};
pub use crate::state::{CorrespondenceTable, SnapshotStore};

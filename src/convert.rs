// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use crate::error::SyncError;
use crate::item::Item;

/// Translates items between the two sides' schemas.
///
/// Both directions must be pure: no I/O, no state, same output for the same
/// input. The engine never inspects converted items beyond their identity
/// field.
pub trait Converter {
    /// Converts an item from side A's schema to side B's schema.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Convert`] if the item cannot be expressed on side B.
    fn a_to_b(&self, item: &Item) -> Result<Item, SyncError>;

    /// Converts an item from side B's schema to side A's schema.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Convert`] if the item cannot be expressed on side A.
    fn b_to_a(&self, item: &Item) -> Result<Item, SyncError>;
}

/// A [`Converter`] built from a pair of functions.
#[derive(Debug, Clone, Copy)]
pub struct FnConverter<F, G> {
    a_to_b: F,
    b_to_a: G,
}

impl<F, G> FnConverter<F, G>
where
    F: Fn(&Item) -> Result<Item, SyncError>,
    G: Fn(&Item) -> Result<Item, SyncError>,
{
    /// Wraps two conversion functions into a converter.
    pub fn new(a_to_b: F, b_to_a: G) -> Self {
        Self { a_to_b, b_to_a }
    }
}

impl<F, G> Converter for FnConverter<F, G>
where
    F: Fn(&Item) -> Result<Item, SyncError>,
    G: Fn(&Item) -> Result<Item, SyncError>,
{
    fn a_to_b(&self, item: &Item) -> Result<Item, SyncError> {
        (self.a_to_b)(item)
    }

    fn b_to_a(&self, item: &Item) -> Result<Item, SyncError> {
        (self.b_to_a)(item)
    }
}

/// A converter for pairs whose sides share one schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl Converter for IdentityConverter {
    fn a_to_b(&self, item: &Item) -> Result<Item, SyncError> {
        Ok(item.clone())
    }

    fn b_to_a(&self, item: &Item) -> Result<Item, SyncError> {
        Ok(item.clone())
    }
}

// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Typed Entity Identifiers
//!
//! ULID-backed, marker-validated identifiers for the three identity-bearing
//! entities: sources, queue items, and canonical events.
//!
//! ## Design
//!
//! A single `GenericId<T>` carries the ULID; a zero-sized marker type per
//! entity category makes the identifiers mutually incompatible at the type
//! level. A `SourceId` can never be passed where an `ItemId` is expected,
//! which matters in a system whose queue rows reference both.
//!
//! ULIDs are used instead of UUIDs for their natural creation-time ordering:
//! queue claim tie-breaking and audit trails sort chronologically for free.
//!
//! ## Serialization
//!
//! IDs serialize as the 26-character Crockford Base32 ULID string, matching
//! their TEXT column representation in the datastore.

use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

use crate::error::HarvestError;

/// Category contract implemented by each ID marker type.
pub trait IdCategory: Send + Sync {
    /// Human-readable category name, used in error messages.
    fn category_name() -> &'static str;

    /// Category-specific validation applied on construction from external
    /// input (database rows, API payloads).
    fn validate_id(ulid: &Ulid) -> Result<(), HarvestError> {
        if ulid.0 == 0 {
            return Err(HarvestError::validation(format!(
                "{} ID cannot be the nil ULID",
                Self::category_name()
            )));
        }
        Ok(())
    }
}

/// Generic ULID wrapper parameterized by an ID category marker.
pub struct GenericId<T: IdCategory> {
    value: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdCategory> GenericId<T> {
    /// Creates a new ID with the current timestamp.
    pub fn new() -> Self {
        Self {
            value: Ulid::new(),
            _marker: PhantomData,
        }
    }

    /// Wraps an existing ULID after category validation.
    pub fn from_ulid(ulid: Ulid) -> Result<Self, HarvestError> {
        T::validate_id(&ulid)?;
        Ok(Self {
            value: ulid,
            _marker: PhantomData,
        })
    }

    /// Parses an ID from its 26-character ULID string form.
    pub fn from_string(s: &str) -> Result<Self, HarvestError> {
        let ulid = Ulid::from_string(s).map_err(|e| {
            HarvestError::validation(format!("invalid {} ID '{}': {}", T::category_name(), s, e))
        })?;
        Self::from_ulid(ulid)
    }

    /// Returns the underlying ULID.
    pub fn as_ulid(&self) -> Ulid {
        self.value
    }

    /// Milliseconds since the Unix epoch encoded in the ID.
    pub fn timestamp_ms(&self) -> u64 {
        self.value.timestamp_ms()
    }

    /// Creation instant encoded in the ID.
    pub fn datetime(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.timestamp_ms() as i64)
            .unwrap_or_else(chrono::Utc::now)
    }
}

impl<T: IdCategory> Clone for GenericId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdCategory> Copy for GenericId<T> {}

impl<T: IdCategory> fmt::Debug for GenericId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", T::category_name(), self.value)
    }
}

impl<T: IdCategory> PartialEq for GenericId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: IdCategory> Eq for GenericId<T> {}

impl<T: IdCategory> PartialOrd for GenericId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdCategory> Ord for GenericId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T: IdCategory> Hash for GenericId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdCategory> Default for GenericId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdCategory> Display for GenericId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T: IdCategory> FromStr for GenericId<T> {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

// String serialization keeps IDs readable in JSON payloads and TEXT columns.
impl<T: IdCategory> Serialize for GenericId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value.to_string())
    }
}

impl<'de, T: IdCategory> Deserialize<'de> for GenericId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_string(&s).map_err(serde::de::Error::custom)
    }
}

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $marker:ident, $category:literal) => {
        /// Marker type for the ID category.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $marker;

        impl IdCategory for $marker {
            fn category_name() -> &'static str {
                $category
            }
        }

        $(#[$doc])*
        pub type $name = GenericId<$marker>;
    };
}

entity_id!(
    /// Identifier for a harvest source (one website to scrape).
    SourceId,
    SourceMarker,
    "source"
);

entity_id!(
    /// Identifier for a queue item (one candidate event URL in flight).
    ItemId,
    ItemMarker,
    "queue_item"
);

entity_id!(
    /// Identifier for a canonical persisted event.
    EventId,
    EventMarker,
    "event"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique() {
        let a = SourceId::new();
        let b = SourceId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_string_round_trip() {
        let id = ItemId::new();
        let parsed = ItemId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_nil_ulid_rejected() {
        let result = EventId::from_ulid(Ulid(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_string_rejected() {
        assert!(SourceId::from_string("not-a-ulid").is_err());
        assert!(SourceId::from_string("").is_err());
    }

    #[test]
    fn test_ids_order_by_creation_time() {
        let earlier = ItemId::from_ulid(Ulid::from_parts(1_000, 42)).unwrap();
        let later = ItemId::from_ulid(Ulid::from_parts(2_000, 42)).unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn test_serde_uses_string_form() {
        let id = SourceId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: SourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}

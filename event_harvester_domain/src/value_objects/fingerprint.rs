// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Identity Hashes
//!
//! The two SHA-256 identities that drive deduplication:
//!
//! - **Content hash** `sha256(title|event_date)`: identity *across* sources.
//!   Two sites listing the same title on the same date collide here.
//! - **Fingerprint** `sha256(title|event_date|source_id)`: identity *within*
//!   a source. Re-runs of the same site collide here, and the canonical
//!   event table's uniqueness constraint targets this value.
//!
//! Both are pure functions of their canonical inputs; identical inputs
//! always produce identical hex digests. The date component is the
//! `YYYY-MM-DD` canonical form, never a full timestamp, so time-of-day
//! refinements do not change an event's identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ids::SourceId;

/// Hex-encoded SHA-256 digest newtype shared by both identity kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest256(String);

impl Digest256 {
    fn compute(input: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an already-computed digest (database round trip).
    pub fn from_hex(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Digest256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Digest of an arbitrary canonical string (change tracking, payload
/// hashes). Prefer the named identity functions for event identity.
pub fn digest_of(input: &str) -> Digest256 {
    Digest256::compute(input)
}

/// Cross-source identity: `sha256(title|event_date)`.
pub fn content_hash(title: &str, event_date: &str) -> Digest256 {
    Digest256::compute(&format!("{}|{}", title.trim(), event_date.trim()))
}

/// Within-source identity: `sha256(title|event_date|source_id)`.
pub fn event_fingerprint(title: &str, event_date: &str, source_id: SourceId) -> Digest256 {
    Digest256::compute(&format!("{}|{}|{}", title.trim(), event_date.trim(), source_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_content_hash_is_deterministic() {
        let a = content_hash("Voorjaarsconcert", "2026-04-12");
        let b = content_hash("Voorjaarsconcert", "2026-04-12");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_content_hash_differs_on_date() {
        let a = content_hash("Pride Walk", "2026-08-01");
        let b = content_hash("Pride Walk", "2026-08-02");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_differs_by_source() {
        let title = "Pride Walk";
        let date = "2026-08-01";
        let source_a = SourceId::new();
        let source_b = SourceId::new();
        assert_ne!(
            event_fingerprint(title, date, source_a),
            event_fingerprint(title, date, source_b)
        );
        // But the content hash is source-independent.
        assert_eq!(content_hash(title, date), content_hash(title, date));
    }

    #[test]
    fn test_whitespace_trimmed_before_hashing() {
        assert_eq!(content_hash(" Pride Walk ", "2026-08-01"), content_hash("Pride Walk", "2026-08-01"));
    }

    proptest! {
        #[test]
        fn prop_idempotent(title in ".{0,64}", date in "[0-9]{4}-[0-9]{2}-[0-9]{2}") {
            prop_assert_eq!(content_hash(&title, &date), content_hash(&title, &date));
        }

        #[test]
        fn prop_hex_shape(title in ".{0,64}", date in "[0-9]{4}-[0-9]{2}-[0-9]{2}") {
            let digest = content_hash(&title, &date);
            prop_assert_eq!(digest.as_str().len(), 64);
            prop_assert!(digest.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}

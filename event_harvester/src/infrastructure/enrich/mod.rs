// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Enrichment infrastructure: the hybrid geocoder's rungs and image
//! relocation.

pub mod geocoder;
pub mod html_coords;
pub mod image_store;
pub mod providers;

pub use geocoder::{GeocodeQuery, GeocodeSource, HybridGeocoder};
pub use image_store::{HttpBucketStore, ImageRelocator, ObjectStore, RelocationOutcome};
pub use providers::{GeocodeBackend, GeocodeProviderPool, HttpGeocodeBackend};

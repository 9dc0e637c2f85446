// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! Standardized Unix exit codes following BSD `sysexits.h` conventions.
//! Startup misconfiguration exits non-zero; long-running workers never exit
//! on per-item failures.
//!
//! ## Exit Code Conventions
//!
//! - **0**: Success
//! - **1**: General error
//! - **64-78**: Specific error conditions (BSD sysexits.h)
//! - **128+N**: Fatal signal N (e.g., 130 = SIGINT)

use std::fmt;

/// Exit codes following Unix conventions (BSD sysexits.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful termination (0)
    #[default]
    Success = 0,

    /// General error (1)
    Error = 1,

    /// Command line usage error (64)
    UsageError = 64,

    /// Data format error (65) - malformed configuration file
    DataError = 65,

    /// Service unavailable (69) - datastore unreachable at startup
    ServiceUnavailable = 69,

    /// Internal software error (70)
    SoftwareError = 70,

    /// Configuration error (78) - missing required secret or URL
    ConfigError = 78,

    /// Interrupted by SIGINT (130)
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric value for `std::process::exit`
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Maps an error's category string onto an exit code.
    ///
    /// The application layer passes `HarvestError::category()`; bootstrap
    /// stays decoupled from the domain crate.
    pub fn from_error_category(category: &str) -> Self {
        match category {
            "configuration" => ExitCode::ConfigError,
            "database" => ExitCode::ServiceUnavailable,
            "internal" | "invariant" => ExitCode::SoftwareError,
            "serialization" => ExitCode::DataError,
            _ => ExitCode::Error,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitCode::Success => "success",
            ExitCode::Error => "error",
            ExitCode::UsageError => "usage error",
            ExitCode::DataError => "data error",
            ExitCode::ServiceUnavailable => "service unavailable",
            ExitCode::SoftwareError => "software error",
            ExitCode::ConfigError => "configuration error",
            ExitCode::Interrupted => "interrupted",
        };
        write!(f, "{} ({})", name, self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::ConfigError.as_i32(), 78);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(ExitCode::from_error_category("configuration"), ExitCode::ConfigError);
        assert_eq!(ExitCode::from_error_category("database"), ExitCode::ServiceUnavailable);
        assert_eq!(ExitCode::from_error_category("internal"), ExitCode::SoftwareError);
        assert_eq!(ExitCode::from_error_category("fetch_transient"), ExitCode::Error);
    }
}

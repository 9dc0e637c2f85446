// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Harvester Bootstrap
//!
//! Entry-point plumbing that sits outside the application layers: CLI
//! parsing, bootstrap logging, signal handling, shutdown coordination, and
//! Unix exit codes.
//!
//! ## Responsibilities
//!
//! - Parse and bounds-check command-line arguments before any service is
//!   constructed
//! - Translate SIGTERM/SIGINT/SIGHUP into a shutdown-coordinator cancel
//! - Map startup failures onto `sysexits.h` exit codes (a missing datastore
//!   credential exits 78; per-item pipeline failures never exit)
//!
//! This crate deliberately has no dependency on the domain or application
//! crates; the binary wires them together.

pub mod cli;
pub mod exit_code;
pub mod logger;
pub mod shutdown;
pub mod signals;

pub use cli::{parse_and_validate, Command, ParseError, ValidatedCli};
pub use exit_code::ExitCode;
pub use logger::{BootstrapLogger, ConsoleLogger, NoOpLogger};
pub use shutdown::{CancellationToken, ShutdownCoordinator};
pub use signals::{ShutdownCallback, SystemSignals};

#[cfg(unix)]
pub use signals::UnixSignalHandler;

// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # CLI Parsing
//!
//! Command-line surface for the harvester binary. Parsing and bounds
//! validation live here in bootstrap; semantic validation (stage names,
//! source lookup) belongs to the application layer, keeping this crate
//! free of domain dependencies.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

/// Upper bound on a worker batch; matches the queue claim contract.
pub const MAX_BATCH_LIMIT: u32 = 500;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Staged event-ingestion pipeline worker and coordinator.
#[derive(Debug, Parser)]
#[command(name = "event_harvester", version, about = "Harvests public event listings into a canonical event store")]
pub struct Cli {
    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Select due sources and mint discovered queue items
    Coordinate {
        /// Restrict to these city names
        #[arg(long, value_delimiter = ',')]
        cities: Vec<String>,
        /// discovery | crawl_existing | full
        #[arg(long, default_value = "full")]
        mode: String,
    },
    /// Run one worker batch for a pipeline stage
    Work {
        /// Stage to claim from (discovered, awaiting_fetch, extracting, enriching)
        #[arg(long)]
        stage: String,
        /// Batch size
        #[arg(long, default_value_t = 10)]
        limit: u32,
        /// Worker identity for claim stamping
        #[arg(long)]
        worker_id: Option<String>,
    },
    /// Run one persister batch over ready_to_persist items
    Persist {
        #[arg(long, default_value_t = 10)]
        limit: u32,
        /// Persist without calling the embedding provider
        #[arg(long)]
        skip_embedding: bool,
        #[arg(long)]
        worker_id: Option<String>,
    },
    /// Repair or revert a source's extraction recipe
    Heal {
        /// Source ULID
        #[arg(long)]
        source_id: String,
        /// repair | revert
        #[arg(long, default_value = "repair")]
        mode: String,
    },
    /// Retry geocoding for geo_incomplete items
    SweepGeo {
        #[arg(long, default_value_t = 25)]
        limit: u32,
    },
    /// Run coordinator and all stage workers continuously
    Serve {
        /// Workers per stage
        #[arg(long, default_value_t = 2)]
        workers: u32,
    },
}

/// Validated CLI configuration.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: Command,
    pub verbose: u8,
    pub config: Option<PathBuf>,
}

/// Parse and validate CLI arguments from the process environment.
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    validate_cli(Cli::parse())
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    match &cli.command {
        Command::Work { limit, .. } | Command::Persist { limit, .. } | Command::SweepGeo { limit } => {
            check_limit(*limit)?;
        }
        Command::Heal { source_id, mode } => {
            if source_id.trim().is_empty() {
                return Err(ParseError::InvalidArgument("--source-id cannot be empty".into()));
            }
            if !matches!(mode.as_str(), "repair" | "revert") {
                return Err(ParseError::InvalidArgument(format!(
                    "--mode must be 'repair' or 'revert', got '{}'",
                    mode
                )));
            }
        }
        Command::Coordinate { mode, .. } => {
            if !matches!(mode.as_str(), "discovery" | "crawl_existing" | "full") {
                return Err(ParseError::InvalidArgument(format!(
                    "--mode must be 'discovery', 'crawl_existing', or 'full', got '{}'",
                    mode
                )));
            }
        }
        Command::Serve { workers } => {
            if *workers == 0 || *workers > 64 {
                return Err(ParseError::InvalidArgument(format!(
                    "--workers must be in 1..=64, got {}",
                    workers
                )));
            }
        }
    }
    Ok(ValidatedCli {
        command: cli.command,
        verbose: cli.verbose,
        config: cli.config,
    })
}

fn check_limit(limit: u32) -> Result<(), ParseError> {
    if limit == 0 || limit > MAX_BATCH_LIMIT {
        return Err(ParseError::InvalidArgument(format!(
            "--limit must be in 1..={}, got {}",
            MAX_BATCH_LIMIT, limit
        )));
    }
    Ok(())
}

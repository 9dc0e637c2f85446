// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Harvester CLI
//!
//! Worker and coordinator entry point. Subcommands drive the same
//! application services the HTTP trigger shells call:
//!
//! ```bash
//! # Mint queue items for due sources
//! event_harvester coordinate
//!
//! # One worker batch for a stage
//! event_harvester work --stage extracting --limit 10
//!
//! # One persister batch
//! event_harvester persist --limit 10
//!
//! # Repair or revert a source's recipe
//! event_harvester heal --source-id 01ARZ3NDEKTSV4RRFFQ69G5FAV --mode repair
//!
//! # Geocoder retry sweep
//! event_harvester sweep-geo
//!
//! # Run everything continuously until SIGTERM/SIGINT
//! event_harvester serve --workers 2
//! ```
//!
//! Exit codes follow sysexits: 0 on success, 78 for configuration errors,
//! 69 for an unreachable datastore. Long-running workers never exit on
//! per-item failures.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use event_harvester::application::services::HarvesterRuntime;
use event_harvester::application::triggers::{CoordinatorMode, CoordinatorRequest, StageResponse};
use event_harvester::infrastructure::config::HarvestConfig;
use event_harvester_bootstrap::{
    parse_and_validate, BootstrapLogger, Command, ConsoleLogger, ExitCode, ShutdownCoordinator,
    SystemSignals,
};
use event_harvester_domain::value_objects::{SourceId, Stage};
use event_harvester_domain::HarvestError;

fn init_tracing(verbose: u8) {
    let default_directive = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = match parse_and_validate() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("argument error: {}", e);
            std::process::exit(ExitCode::UsageError.as_i32());
        }
    };
    init_tracing(cli.verbose);
    let logger = ConsoleLogger::new();

    let exit_code = match run(cli, &logger).await {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            logger.error(&format!("fatal: {}", e));
            ExitCode::from_error_category(e.category())
        }
    };
    std::process::exit(exit_code.as_i32());
}

async fn run(
    cli: event_harvester_bootstrap::ValidatedCli,
    logger: &ConsoleLogger,
) -> Result<(), HarvestError> {
    logger.info("loading configuration");
    let config = HarvestConfig::load(cli.config.as_deref())?;
    let runtime = Arc::new(HarvesterRuntime::build(config).await?);
    logger.info("runtime assembled");

    match cli.command {
        Command::Coordinate { cities, mode } => {
            let request = CoordinatorRequest {
                cities,
                categories: Vec::new(),
                mode: CoordinatorMode::parse(&mode).unwrap_or_default(),
            };
            let response = runtime.coordinator.run_once(&request).await?;
            print_response(&response)?;
        }
        Command::Work { stage, limit, worker_id } => {
            let stage = Stage::parse(&stage)?;
            if !stage.is_claimable() {
                return Err(HarvestError::validation(format!(
                    "stage '{}' is terminal and cannot be worked",
                    stage
                )));
            }
            let worker_id = worker_id.unwrap_or_else(|| format!("cli-{}", std::process::id()));
            let processed = runtime.run_stage_batch(stage, &worker_id, limit).await;
            print_response(&StageResponse::processed(processed))?;
        }
        Command::Persist { limit, skip_embedding, worker_id } => {
            let worker_id = worker_id.unwrap_or_else(|| format!("cli-{}", std::process::id()));
            let response = runtime
                .persist_worker
                .run_batch(&worker_id, limit, skip_embedding)
                .await?;
            print_response(&response)?;
        }
        Command::Heal { source_id, mode } => {
            let source_id = SourceId::from_string(&source_id)?;
            let healer = runtime.healer.as_ref().ok_or_else(|| {
                HarvestError::invalid_config("healing requires an LLM provider to be configured")
            })?;
            match mode.as_str() {
                "revert" => healer.revert(source_id).await?,
                _ => {
                    let outcome = healer.repair(source_id).await?;
                    logger.info(&format!("healing outcome: {:?}", outcome));
                }
            }
        }
        Command::SweepGeo { limit } => {
            let response = runtime.enrich_worker.run_geo_sweep("cli-geo-sweep", limit).await?;
            print_response(&response)?;
        }
        Command::Serve { workers } => {
            logger.info(&format!("serving with {} workers per stage", workers));
            let shutdown = ShutdownCoordinator::default();
            let token = shutdown.token();

            #[cfg(unix)]
            {
                let shutdown = shutdown.clone();
                let handler = event_harvester_bootstrap::UnixSignalHandler::new();
                tokio::spawn(async move {
                    handler
                        .wait_for_signal(Box::new(move || shutdown.initiate_shutdown()))
                        .await;
                });
            }

            runtime.serve(workers, token).await;
            shutdown.complete_shutdown();
        }
    }
    Ok(())
}

fn print_response(response: &StageResponse) -> Result<(), HarvestError> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! keep-notion-sync command line
//!
//! `sync` copies Keep workouts into the Notion database; `weather-page`
//! writes the daily weather-only entry.

use chrono::Duration as ChronoDuration;
use clap::{Parser, Subcommand, ValueEnum};
use keep_notion_sync::{
    config::{Config, ConfigScope, FetchMode},
    db::NotionDb,
    error::SyncError,
    services::{
        aborted_line, cancel_pair, Credentials, HttpAssetProbe, KeepClient, KeepService,
        OpenWeatherClient, RetryPolicy, SyncEngine, SyncOptions, WeatherService,
    },
    time_utils::local_today,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "keep-notion-sync")]
#[command(about = "Sync Keep workouts into a Notion database")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy new Keep activities into Notion (default)
    Sync {
        /// `all` or `per-type`; overrides KEEP_FETCH_MODE
        #[arg(long)]
        fetch_mode: Option<FetchMode>,
        /// Records processed concurrently; overrides SYNC_WORKERS
        #[arg(long)]
        workers: Option<usize>,
        /// List the destination once instead of querying per record
        #[arg(long)]
        prefetch_index: bool,
    },
    /// Write the weather-only page for one day
    WeatherPage {
        #[arg(long, value_enum, default_value_t = Day::Today)]
        day: Day,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Day {
    Today,
    Tomorrow,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Sync {
        fetch_mode: None,
        workers: None,
        prefetch_index: false,
    });
    let scope = match command {
        Commands::Sync { .. } => ConfigScope::Sync,
        Commands::WeatherPage { .. } => ConfigScope::WeatherPage,
    };

    let mut config = match Config::from_env_for(scope) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Commands::Sync {
        fetch_mode,
        workers,
        prefetch_index,
    } = &command
    {
        if let Some(mode) = fetch_mode {
            config.fetch_mode = *mode;
        }
        if let Some(n) = workers {
            config.workers = (*n).max(1);
        }
        config.prefetch_index |= *prefetch_index;
    }

    tracing::info!(config = ?config, "Starting keep-notion-sync");

    let engine = match build_engine(&config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{}", aborted_line(&e));
            return ExitCode::from(1);
        }
    };

    match command {
        Commands::Sync { .. } => run_sync(&engine, &config).await,
        Commands::WeatherPage { day } => {
            let today = local_today(config.utc_offset());
            let date = match day {
                Day::Today => today,
                Day::Tomorrow => today + ChronoDuration::days(1),
            };
            match engine.write_weather_page(date).await {
                Ok(outcome) => {
                    println!("{}", outcome);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!(error = %e, "Weather page failed");
                    eprintln!("weather page failed: {}", e);
                    ExitCode::from(1)
                }
            }
        }
    }
}

async fn run_sync(engine: &SyncEngine, config: &Config) -> ExitCode {
    let (handle, cancel) = cancel_pair();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight writes");
            handle.cancel();
        }
    });

    let credentials = Credentials {
        mobile: config.keep_mobile.clone(),
        password: config.keep_password.clone(),
    };

    match engine.run(&credentials, &cancel).await {
        Ok(summary) => {
            if !summary.failed_types.is_empty() {
                tracing::warn!(types = ?summary.failed_types, "Some sport types could not be fetched");
            }
            println!("{}", summary.report_line());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Sync aborted");
            println!("{}", aborted_line(&e));
            ExitCode::from(1)
        }
    }
}

fn build_engine(config: &Config) -> Result<SyncEngine, SyncError> {
    let retry = RetryPolicy::default();

    let keep_client = KeepClient::new(&config.keep_api_base, config.http_timeout)?;
    let keep = KeepService::new(Arc::new(keep_client), retry.clone(), config.max_pages);

    let notion = NotionDb::new(
        &config.notion_api_base,
        &config.notion_token,
        &config.notion_database_id,
        config.http_timeout,
    )?;

    let weather_client = OpenWeatherClient::new(
        &config.openweather_api_base,
        &config.openweather_api_key,
        config.http_timeout,
    )?;
    let weather = WeatherService::new(Arc::new(weather_client), retry.clone(), config.utc_offset());

    let probe = HttpAssetProbe::new(config.track_probe_timeout)?;

    Ok(SyncEngine::new(
        keep,
        Arc::new(notion),
        weather,
        Arc::new(probe),
        retry,
        SyncOptions::from_config(config),
    ))
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("keep_notion_sync=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}

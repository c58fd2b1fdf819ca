//! # School Ops CLI
//!
//! Loads configuration, seeds the sample data and prints dashboard views as
//! JSON on stdout. Logs go to stderr.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use school_ops::{
    config::ConfigLoader,
    models::Actor,
    query::Filters,
    seeds::seed_sample_data,
    service::{DashboardService, ServiceSettings},
    stats::{Snapshot, StatsKind},
    telemetry::init_tracing,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "school-ops")]
#[command(about = "School equipment deployment dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List schools
    Schools(ListArgs),
    /// List issues with school name and ticket aging
    Issues(ListArgs),
    /// List shipments with courier, school and part
    Shipments(ListArgs),
    /// Compute the metrics of one collection
    Stats {
        /// schools, issues or shipments
        kind: StatsKind,
    },
    /// Headline stats and recent issues
    Dashboard,
    /// Courier integrations and their status
    Couriers,
    /// Take stats snapshots on the configured interval until Ctrl-C, then print them
    Watch,
}

#[derive(clap::Args)]
struct ListArgs {
    /// Free-text search
    #[arg(short, long, default_value = "")]
    query: String,
    /// Categorical filter as field=value; repeatable
    #[arg(short, long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
}

impl ListArgs {
    fn filters(&self) -> Filters {
        self.filters.iter().cloned().collect()
    }
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got '{}'", raw))?;
    Ok((field.trim().to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    init_tracing(&config).context("initializing tracing")?;
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(profile = %config.profile, config = %redacted_json, "Loaded configuration");
    }

    let service = DashboardService::in_memory(ServiceSettings::from(&config));
    if config.seed_sample_data {
        let actor = Actor::new(config.system_user_id.clone(), config.system_user_name.clone());
        seed_sample_data(&service, &actor)
            .await
            .context("seeding sample data")?;
    }

    match cli.command {
        Command::Schools(args) => print_json(&service.list_schools(&args.filters(), &args.query)?),
        Command::Issues(args) => print_json(&service.list_issues(&args.filters(), &args.query)?),
        Command::Shipments(args) => {
            print_json(&service.list_shipments(&args.filters(), &args.query)?)
        }
        Command::Stats { kind } => print_json(&service.compute_stats(kind)),
        Command::Dashboard => print_json(&service.dashboard_summary()),
        Command::Couriers => print_json(&service.courier_integrations()),
        Command::Watch => watch(&service).await,
    }
}

async fn watch(service: &DashboardService) -> Result<()> {
    let shutdown = CancellationToken::new();
    let scheduler = tokio::spawn(service.snapshot_scheduler().run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    shutdown.cancel();
    scheduler.await.context("joining snapshot scheduler")?;

    let history: BTreeMap<StatsKind, Vec<Snapshot>> = StatsKind::ALL
        .iter()
        .map(|kind| (*kind, service.snapshots(*kind)))
        .collect();
    print_json(&history)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|err| anyhow!("rendering output: {}", err))?;
    println!("{}", rendered);
    Ok(())
}

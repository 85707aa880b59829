//! PTP leap file E2E CLI
//!
//! Runs the leap file scenario against a cluster, or applies the leap record
//! edits to a local file for inspection.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leapfile::{extract_announcement, remove_last_announcement_line, Announcement};
use ptp_e2e::{
    cluster, KubePtpCluster, LeapFileScenario, PrometheusClient, PrometheusConfig,
    ScenarioConfig, ScenarioSettings,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// End-to-end checks for PTP leap-second handling
#[derive(Parser)]
#[command(name = "ptp-leap-e2e")]
#[command(about = "End-to-end checks for PTP leap-second handling")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    scenario: ScenarioConfig,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove the last leap announcement, restart the daemon and verify it is regenerated
    Run {
        /// Write the JSON report to this file instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the announcement extracted from a local leap file
    Show {
        #[arg(long)]
        file: PathBuf,
    },
    /// Remove the last announcement line from a local leap file
    Strip {
        #[arg(long)]
        file: PathBuf,

        /// Rewrite the file instead of printing the result
        #[arg(long)]
        in_place: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("ptp_e2e=debug,leapfile=debug,info")
        } else {
            EnvFilter::new("ptp_e2e=info,leapfile=info,warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Run { report } => run_scenario(&cli.scenario, report.as_deref()).await,
        Commands::Show { file } => {
            show(&file)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Strip { file, in_place } => {
            strip(&file, in_place)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_scenario(config: &ScenarioConfig, report_path: Option<&Path>) -> Result<ExitCode> {
    info!(
        namespace = %config.namespace,
        configmap = %config.leap_configmap,
        prometheus = %config.prometheus_url,
        "Starting PTP leap file scenario"
    );

    let client = cluster::connect(config.kubeconfig.as_deref()).await?;
    let prometheus = PrometheusClient::new(PrometheusConfig::from(config))?;
    if !prometheus.health_check().await? {
        warn!(url = %prometheus.base_url(), "Prometheus health check failed, continuing");
    }

    let scenario = LeapFileScenario::new(
        KubePtpCluster::new(client, config),
        prometheus,
        ScenarioSettings::from(config),
    );
    let report = scenario.execute().await;

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    match report_path {
        Some(path) => tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?,
        None => println!("{json}"),
    }

    if report.passed() {
        info!(nodes = report.nodes.len(), "Leap file scenario passed");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn read_leap_file(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn show(file: &Path) -> Result<()> {
    let content = read_leap_file(file)?;
    let line = extract_announcement(&content)
        .with_context(|| format!("No announcement found in {}", file.display()))?;

    match line.parse::<Announcement>() {
        Ok(announcement) => {
            let effective = announcement
                .effective_at()
                .map_or_else(|| "out of range".to_string(), |at| at.to_rfc3339());
            println!("{line}");
            println!("  ntp seconds: {}", announcement.ntp_seconds);
            println!("  tai offset:  {}", announcement.tai_offset);
            println!("  effective:   {effective}");
        }
        Err(_) => println!("{line}"),
    }

    Ok(())
}

fn strip(file: &Path, in_place: bool) -> Result<()> {
    let content = read_leap_file(file)?;
    let stripped = remove_last_announcement_line(&content);

    if stripped == content {
        warn!(file = %file.display(), "No announcement line to remove");
    }

    if in_place {
        std::fs::write(file, stripped)
            .with_context(|| format!("Failed to write {}", file.display()))?;
        info!(file = %file.display(), "Removed last announcement line");
    } else {
        print!("{stripped}");
    }

    Ok(())
}

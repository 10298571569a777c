//! IISRecon - Correlate AppDynamics .NET agent configuration with IIS topology.

mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use iisrecon_collector::{Collector, CollectorConfig};
use iisrecon_common::{Error, Settings, Timestamp};
use iisrecon_correlator::{
    assemble_registry, run_host, CorrelationOptions, DescriptorError, HostInput, HostRun,
    Topology, TopologyError,
};
use iisrecon_report_schema::Verdict;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "iisrecon")]
#[command(
    author,
    version,
    about = "Map agent-instrumented IIS applications to identifier groups and assess migration readiness"
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan an IIS host and write its report
    Scan {
        /// Target host (hostname or IP, or "localhost" for local collection)
        #[arg(long)]
        target: String,

        /// Collection mode (remote, local)
        #[arg(long, default_value = "remote")]
        mode: String,

        /// Output directory
        #[arg(long, short)]
        out: PathBuf,

        /// WinRM port
        #[arg(long, default_value = "5985")]
        winrm_port: u16,

        /// WinRM user
        #[arg(long)]
        winrm_user: Option<String>,

        /// WinRM password
        #[arg(long)]
        winrm_password: Option<String>,

        /// Use HTTPS for WinRM
        #[arg(long)]
        winrm_https: bool,

        /// Accept self-signed WinRM certificates
        #[arg(long, requires = "winrm_https")]
        winrm_insecure: bool,

        /// Per-host timeout in seconds (overrides the settings file)
        #[arg(long)]
        timeout: Option<u64>,

        /// Leave standalone applications out of the report
        #[arg(long)]
        exclude_standalone: bool,
    },

    /// Correlate a saved agent configuration with a topology snapshot
    Correlate {
        /// Agent configuration file (XML)
        #[arg(long)]
        agent_config: Option<PathBuf>,

        /// Topology snapshot (JSON)
        #[arg(long)]
        topology: Option<PathBuf>,

        /// Host name recorded in the report
        #[arg(long)]
        host: String,

        /// Output directory
        #[arg(long, short)]
        out: PathBuf,

        /// Leave standalone applications out of the report
        #[arg(long)]
        exclude_standalone: bool,
    },

    /// Build the identifier registry from a report
    Registry {
        /// Input report file
        #[arg(long)]
        report: PathBuf,

        /// Output registry file
        #[arg(long, short)]
        out: PathBuf,
    },

    /// Validate a report against the report schema
    ValidateReport {
        /// Input report file
        #[arg(long, short = 'i')]
        r#in: PathBuf,

        /// Verify checksums.json next to the report
        #[arg(long)]
        verify_checksums: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            target,
            mode,
            out,
            winrm_port,
            winrm_user,
            winrm_password,
            winrm_https,
            winrm_insecure,
            timeout,
            exclude_standalone,
        } => {
            if let Some(seconds) = timeout {
                if seconds == 0 {
                    return Err(Error::Config("--timeout must be greater than zero".into()).into());
                }
                settings.host_timeout_seconds = seconds;
            }
            settings.exclude_standalone_applications |= exclude_standalone;
            let options = correlation_options(&settings);

            info!("Scanning {} ({})", target, mode);
            let config = CollectorConfig {
                target,
                mode: mode.parse()?,
                winrm_port,
                winrm_user,
                winrm_password,
                winrm_https,
                winrm_insecure,
                settings,
            };

            let scan = Collector::new(config).collect().await?;
            if let Some(path) = &scan.agent_config_path {
                info!("Agent configuration read from {}", path);
            }
            let run = run_host(scan.host_input(), &options);
            finish(&run, &out)?;
        }

        Commands::Correlate {
            agent_config,
            topology,
            host,
            out,
            exclude_standalone,
        } => {
            settings.exclude_standalone_applications |= exclude_standalone;
            let started_at = Timestamp::now();

            let descriptor = agent_config
                .as_deref()
                .map(|path| {
                    std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))
                })
                .transpose()?;
            let topology = load_topology(topology.as_deref());

            let input = HostInput {
                host,
                descriptor: descriptor.as_deref().ok_or(DescriptorError::NotFound),
                topology,
                started_at,
            };
            let run = run_host(input, &correlation_options(&settings));
            finish(&run, &out)?;
        }

        Commands::Registry { report, out } => {
            info!("Building registry from {:?}", report);
            let report = output::read_report(&report)?;
            let registry = assemble_registry(&report);
            output::write_registry(&registry, &out)?;
            info!(
                "Registry written to {:?} ({} group(s), {} unassigned)",
                out,
                registry.entries.len(),
                registry.unassigned.len()
            );
        }

        Commands::ValidateReport {
            r#in: input,
            verify_checksums,
        } => {
            info!("Validating report: {:?}", input);
            let result = output::validate_report_file(&input, verify_checksums)?;

            if result.valid {
                println!("Report is valid");
            } else {
                println!("Report validation failed:");
                for error in &result.errors {
                    println!("  - {}", error);
                }
            }

            if !result.warnings.is_empty() {
                println!("Warnings:");
                for warning in &result.warnings {
                    println!("  - {}", warning);
                }
            }

            if !result.valid {
                return Err(Error::InvalidReport(format!(
                    "{} error(s) in {:?}",
                    result.errors.len(),
                    input
                ))
                .into());
            }
        }
    }

    Ok(())
}

fn correlation_options(settings: &Settings) -> CorrelationOptions {
    CorrelationOptions {
        exclude_standalone_applications: settings.exclude_standalone_applications,
    }
}

/// A missing or unreadable snapshot leaves the topology unavailable.
fn load_topology(path: Option<&Path>) -> Result<Topology, TopologyError> {
    let Some(path) = path else {
        return Err(TopologyError::EnumerationUnavailable(
            "no topology snapshot supplied".to_string(),
        ));
    };
    Topology::load(path).map_err(|e| {
        warn!("Topology snapshot {:?} unusable: {:#}", path, e);
        TopologyError::EnumerationUnavailable(format!("{:#}", e))
    })
}

fn finish(run: &HostRun, out: &Path) -> anyhow::Result<()> {
    output::write_run(run, out)?;
    info!(
        "{}: {} entr(ies) in {} group(s), {} conflict(s)",
        run.report.metadata.host,
        run.report.entry_count(),
        run.report.groups.len(),
        run.report.conflicts.len()
    );
    print_verdict(&run.report.verdict);
    Ok(())
}

fn print_verdict(verdict: &Verdict) {
    println!(
        "Verdict: {} / {}",
        verdict.overall_status, verdict.migration_readiness
    );
    for note in &verdict.notes {
        println!("  - {}", note);
    }
}

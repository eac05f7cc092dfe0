//! Command-line interface.
//!
//! `run` executes a comparison described by a JSON config; the remaining
//! subcommands inspect and move baseline stores.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use crate::archive::{self, ConflictAction};
use crate::baseline_runner::{self, BaselineRunner};
use crate::config::RunConfig;
use crate::outcome::{ComparisonResult, MatchStatus};
use crate::protocol::{BaselineOp, ComparisonMode, Protocol};
use crate::runner::ComparisonRunner;
use crate::store::BaselineStore;
use crate::transport::{HttpTransport, TokenTemplate};

#[derive(Parser)]
#[command(name = "apidrift", version, about = "Regression comparison testing for networked APIs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a comparison run from a JSON configuration file
    Run {
        /// Path to the run configuration
        config: PathBuf,
        /// Write the full results as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List services present in a baseline store
    Services {
        #[arg(long, default_value = "baselines")]
        dir: PathBuf,
        /// Restrict the listing to one protocol subtree
        #[arg(long, value_enum)]
        protocol: Option<ProtocolArg>,
    },
    /// List capture dates for a service
    Dates {
        service: String,
        #[arg(long, default_value = "baselines")]
        dir: PathBuf,
    },
    /// List runs captured for a service on a date
    Runs {
        service: String,
        date: String,
        #[arg(long, default_value = "baselines")]
        dir: PathBuf,
    },
    /// Print a stored run as result records
    Show {
        service: String,
        date: String,
        run_id: String,
        #[arg(long, default_value = "baselines")]
        dir: PathBuf,
    },
    /// Full-text search across stored baselines
    Search {
        query: String,
        /// Match whole words only
        #[arg(long)]
        exact: bool,
        #[arg(long, default_value = "baselines")]
        dir: PathBuf,
    },
    /// Export baselines into a zip archive
    Export {
        /// Destination archive path
        output: PathBuf,
        /// Export a single service instead of the whole store
        #[arg(long)]
        service: Option<String>,
        #[arg(long, default_value = "baselines")]
        dir: PathBuf,
    },
    /// Import baselines from a zip archive
    Import {
        archive: PathBuf,
        /// What to do with services that already exist locally
        #[arg(long, value_enum, default_value = "overwrite")]
        on_conflict: OnConflict,
        #[arg(long, default_value = "baselines")]
        dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProtocolArg {
    Rest,
    Soap,
    Jms,
}

impl From<ProtocolArg> for Protocol {
    fn from(value: ProtocolArg) -> Self {
        match value {
            ProtocolArg::Rest => Protocol::Rest,
            ProtocolArg::Soap => Protocol::Soap,
            ProtocolArg::Jms => Protocol::Jms,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OnConflict {
    Overwrite,
    Skip,
}

pub fn run() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { config, output } => run_comparison(&config, output.as_deref()),
        Command::Services { dir, protocol } => {
            let store = BaselineStore::new(dir);
            for service in store.list_services(protocol.map(Into::into)) {
                println!("{service}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Dates { service, dir } => {
            let store = BaselineStore::new(dir);
            for date in store.list_dates(&service) {
                println!("{date}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Runs { service, date, dir } => {
            let store = BaselineStore::new(dir);
            for run in store.list_runs(&service, &date)? {
                let description = run.description.as_deref().unwrap_or("-");
                println!(
                    "{}\t{} iterations\t{}\t{}",
                    run.run_id, run.total_iterations, run.timestamp, description
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Show {
            service,
            date,
            run_id,
            dir,
        } => {
            let config = RunConfig::default();
            let store = BaselineStore::new(dir);
            let transport = HttpTransport::new(None)?;
            let runner = BaselineRunner::new(&config, store, &transport, &TokenTemplate);
            let results = runner.baseline_as_results(&service, &date, &run_id)?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Search { query, exact, dir } => {
            let store = BaselineStore::new(dir);
            let hits = store.search(&query, exact)?;
            for hit in &hits {
                println!("{}\t{}", hit.file_path, hit.snippet);
            }
            info!(hits = hits.len(), "search finished");
            Ok(ExitCode::SUCCESS)
        }
        Command::Export {
            output,
            service,
            dir,
        } => {
            let store = BaselineStore::new(dir);
            let archive = archive::export_baselines(&store, service.as_deref())?;
            std::fs::copy(archive.path(), &output)
                .with_context(|| format!("cannot write archive to {}", output.display()))?;
            println!("Exported baselines to {}", output.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Import {
            archive: archive_path,
            on_conflict,
            dir,
        } => {
            let store = BaselineStore::new(dir);
            let open = || {
                std::fs::File::open(&archive_path)
                    .with_context(|| format!("cannot open {}", archive_path.display()))
            };
            let conflicts = archive::detect_conflicts(open()?, &store)?;
            if !conflicts.is_empty() {
                eprintln!("Existing services in the target store: {}", conflicts.join(", "));
            }
            let action = match on_conflict {
                OnConflict::Overwrite => ConflictAction::Overwrite,
                OnConflict::Skip => ConflictAction::Skip,
            };
            let imported = archive::import_baselines(open()?, &store, action)?;
            println!("Imported {} files", imported.len());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_comparison(config_path: &std::path::Path, output: Option<&std::path::Path>) -> anyhow::Result<ExitCode> {
    let config = RunConfig::load(config_path)?;
    let transport_a = HttpTransport::new(resolve_auth_a(&config)?)?;
    let transport_b = HttpTransport::new(
        config
            .endpoint_b
            .as_ref()
            .and_then(|e| e.authentication.clone()),
    )?;
    let runner = ComparisonRunner::new(
        config,
        Box::new(transport_a),
        Box::new(transport_b),
        Box::new(TokenTemplate),
    );
    let results = runner.execute();
    report(&results, output)
}

/// Endpoint A credentials for the run. COMPARE replays prefer the
/// authentication context saved with the baseline, with certificate paths
/// resolved against the run directory.
fn resolve_auth_a(config: &RunConfig) -> anyhow::Result<Option<crate::config::Authentication>> {
    let configured = config
        .endpoint_a
        .as_ref()
        .and_then(|e| e.authentication.clone());
    if config.comparison_mode != ComparisonMode::Baseline {
        return Ok(configured);
    }
    let Some(baseline) = config.baseline.as_ref().filter(|b| b.operation == BaselineOp::Compare)
    else {
        return Ok(configured);
    };
    let (Some(service), Some(date), Some(run_id)) = (
        baseline.service_name.as_deref(),
        baseline.compare_date.as_deref(),
        baseline.compare_run_id.as_deref(),
    ) else {
        return Ok(configured);
    };
    let store = BaselineStore::new(baseline.storage_dir.clone());
    match baseline_runner::replay_authentication(&store, service, date, run_id)? {
        Some(saved) => {
            info!("using authentication context saved with the baseline");
            Ok(Some(saved))
        }
        None => Ok(configured),
    }
}

fn report(results: &[ComparisonResult], output: Option<&std::path::Path>) -> anyhow::Result<ExitCode> {
    let matches = results.iter().filter(|r| r.status == MatchStatus::Match).count();
    let mismatches = results
        .iter()
        .filter(|r| r.status == MatchStatus::Mismatch)
        .count();
    let errors = results.iter().filter(|r| r.status == MatchStatus::Error).count();

    for result in results {
        println!(
            "{}\t{}\t{:?}",
            format!("{:?}", result.status).to_uppercase(),
            result.operation_name,
            result.iteration_tokens
        );
        for difference in &result.differences {
            println!("    {difference}");
        }
        if let Some(message) = &result.error_message {
            println!("    {message}");
        }
    }
    println!("\n{} match, {} mismatch, {} error", matches, mismatches, errors);

    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(results)?)
            .with_context(|| format!("cannot write results to {}", path.display()))?;
        info!(path = %path.display(), "results written");
    }

    Ok(if errors > 0 {
        ExitCode::from(2)
    } else if mismatches > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

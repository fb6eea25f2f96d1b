//! cloudcost - price a batch of cloud resources through cost plugins.
//!
//! Reads a JSON array of resource descriptors, launches the given plugin
//! executables, and prints the aggregated result as a table or JSON.

use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use cloudcost_core::adapter::TimeRange;
use cloudcost_core::engine::{render_json, render_table, CostEngine};
use cloudcost_core::plugin::PluginHost;
use cloudcost_core::resource::ResourceDescriptor;
use cloudcost_core::types::ProviderDefaults;
use cloudcost_core::{Config, Error};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "cloudcost", about = "Cloud cost estimation through cost plugins")]
struct Cli {
    /// JSON config file; `CLOUDCOST_*` variables override it.
    #[arg(long, env = "CLOUDCOST_CONFIG")]
    config: Option<PathBuf>,

    /// Plugin executable to launch. Repeatable.
    #[arg(long = "plugin", value_name = "PATH")]
    plugins: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Suppress protocol compatibility warnings.
    #[arg(long)]
    skip_version_check: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Projected monthly cost.
    Projected {
        /// Resource descriptors (JSON array); `-` reads stdin.
        resources: PathBuf,
    },
    /// Billing-derived cost, estimated from runtime where billing is missing.
    Actual {
        resources: PathBuf,
        /// Start of the window (RFC 3339).
        #[arg(long)]
        start: chrono::DateTime<chrono::Utc>,
        /// End of the window (RFC 3339); defaults to now.
        #[arg(long)]
        end: Option<chrono::DateTime<chrono::Utc>>,
    },
    /// Cost-saving recommendations.
    Recommendations { resources: PathBuf },
    /// Field support each plugin reports for a resource type.
    DryRun {
        #[arg(value_name = "RESOURCE_TYPE")]
        resource_type: String,
    },
    /// Launch every plugin and report its compatibility.
    Plugins,
}

fn load_config(cli: &Cli) -> Result<Config, Error> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.providers = config.providers.fill_from(ProviderDefaults::from_env());
    if cli.skip_version_check {
        config.plugins.skip_version_check = true;
    }
    config.apply_env()
}

fn load_resources(path: &PathBuf) -> Result<Vec<ResourceDescriptor>, Error> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    cloudcost_core::observability::init_tracing_with(&config.observability);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling in-flight plugin calls");
            on_signal.cancel();
        }
    });

    let report = PluginHost::launch_all(&cli.plugins, &config, &cancel).await;
    tracing::info!(
        "{} plugin(s) ready, {} failed to launch",
        report.registry.len(),
        report.failures.len()
    );
    let engine = CostEngine::from_launch(&report, &config, cancel.clone());

    let outcome = run(&cli, &engine, &report).await;
    report.host.shutdown_all().await;
    outcome
}

async fn run(
    cli: &Cli,
    engine: &CostEngine,
    report: &cloudcost_core::plugin::LaunchReport,
) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Command::Projected { resources } => {
            let batch = engine.projected_cost(&load_resources(resources)?).await?;
            print_batch(cli.format, &batch)?;
        }
        Command::Actual {
            resources,
            start,
            end,
        } => {
            let range = TimeRange::between(*start, end.unwrap_or_else(chrono::Utc::now));
            let batch = engine
                .actual_cost(&load_resources(resources)?, range)
                .await?;
            print_batch(cli.format, &batch)?;
        }
        Command::Recommendations { resources } => {
            let batch = engine.recommendations(&load_resources(resources)?).await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&batch)?),
                OutputFormat::Table => {
                    for item in &batch.recommendations {
                        println!(
                            "{:<40} {:<16} {:<12} {:>10.2} {}",
                            item.resource_id,
                            item.plugin,
                            item.recommendation.action_type,
                            item.recommendation.estimated_savings,
                            item.recommendation.description
                        );
                    }
                    for (currency, savings) in batch.savings_by_currency() {
                        println!("estimated savings: {:.2} {}", savings, currency);
                    }
                    for error in &batch.errors {
                        eprintln!("error: {}", error);
                    }
                }
            }
        }
        Command::DryRun { resource_type } => {
            let reports = engine.dry_run(resource_type).await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
                OutputFormat::Table => {
                    for dry_run in &reports {
                        if let Some(error) = &dry_run.error {
                            println!("{}: {}", dry_run.plugin, error);
                            continue;
                        }
                        println!("{}:", dry_run.plugin);
                        for field in &dry_run.fields {
                            println!(
                                "  {:<28} {:?} {}",
                                field.field_name, field.support_status, field.condition
                            );
                        }
                    }
                }
            }
        }
        Command::Plugins => {
            let compat = report.host.compatibility();
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "plugins": compat
                            .iter()
                            .map(|(name, c)| serde_json::json!({ "name": name, "compatibility": c }))
                            .collect::<Vec<_>>(),
                        "failures": &report.failures,
                    }))?
                ),
                OutputFormat::Table => {
                    for (name, c) in &compat {
                        println!(
                            "{:<24} {:<16} {}",
                            name,
                            c.state,
                            c.plugin_spec_version.as_deref().unwrap_or("-")
                        );
                    }
                    for failure in &report.failures {
                        println!("{:<24} {:<16} {}", failure.plugin, "UNAVAILABLE", failure.error);
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_batch(
    format: OutputFormat,
    batch: &cloudcost_core::engine::CostResultWithErrors,
) -> Result<(), Error> {
    match format {
        OutputFormat::Json => println!("{}", render_json(batch)?),
        OutputFormat::Table => print!("{}", render_table(batch)),
    }
    Ok(())
}

//! ecotrace - energy, carbon and cost reporting for hosted AI deployments
//!
//! ## Usage
//!
//! ```bash
//! # Report on synthetic demo data
//! ecotrace report --demo
//!
//! # Report on exported inventory, metrics and billing files
//! ecotrace report --inventory inventory.json --usage metrics.json --costs costs.json
//!
//! # Same data for a Swedish grid, as JSON
//! ecotrace report --demo --region "Europe (Sweden)" --json
//!
//! # Per-sample CSV export
//! ecotrace export --demo --out impact.csv
//!
//! # List grid intensities
//! ecotrace regions
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use ecotrace_config::ImpactConfig;
use ecotrace_core::{EcoError, LogGuard, init_logging};
use ecotrace_impact::inventory::group_by_account;
use ecotrace_impact::{
    DemoSource, Discovery, FileSource, ImpactError, Pipeline, PipelineReport, Session,
    write_enriched_csv, write_grouped_csv,
};
use tracing::{error, info};

/// Energy, carbon and cost reporting for hosted AI deployments
///
/// Estimates the energy use and CO2 emissions of model deployments from
/// their usage metrics and lines them up with billed cost in SEK.
#[derive(Parser, Debug)]
#[command(name = "ecotrace")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.ecotrace/logs/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Config file (defaults to ~/.ecotrace/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print impact and cost summaries
    Report {
        #[command(flatten)]
        input: InputArgs,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write enriched rows as CSV
    Export {
        #[command(flatten)]
        input: InputArgs,

        /// Output file (defaults to stdout)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Sum rows per timestamp, account, model and type
        #[arg(long)]
        grouped: bool,
    },

    /// List grid-intensity regions
    Regions,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Use generated demo data
    #[arg(long, conflicts_with_all = ["inventory", "usage", "costs"])]
    demo: bool,

    /// Seed for the demo data generator
    #[arg(long, requires = "demo")]
    seed: Option<u64>,

    /// Inventory JSON: accounts with their deployments
    #[arg(long)]
    inventory: Option<PathBuf>,

    /// Metrics JSON: hourly usage samples
    #[arg(long)]
    usage: Option<PathBuf>,

    /// Billing JSON: cost rows or a cost-management query result
    #[arg(long)]
    costs: Option<PathBuf>,

    /// Subscription the data belongs to
    #[arg(long, default_value = "local")]
    subscription: String,

    /// Limit discovery to one resource group
    #[arg(long)]
    resource_group: Option<String>,

    /// Report on one named account instead of discovering accounts
    #[arg(long, requires = "resource_group")]
    resource_name: Option<String>,

    /// Grid region for carbon figures
    #[arg(long)]
    region: Option<String>,

    /// USD to SEK rate
    #[arg(long)]
    usd_rate: Option<f64>,

    /// Query window in days
    #[arg(long)]
    days: Option<u32>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("ecotrace error: {:#}", e);
            eprintln!("{}", user_message(&e));
            ExitCode::from(exit_status(&e))
        }
    }
}

/// Message shown on stderr, with guidance where the error carries some.
fn user_message(e: &anyhow::Error) -> String {
    if let Some(impact) = e.downcast_ref::<ImpactError>() {
        return impact.friendly_message();
    }
    match e.downcast_ref::<EcoError>() {
        Some(eco) => match eco.guidance() {
            Some(hint) => format!("{}. {}", eco, hint),
            None => format!("Error: {}", eco),
        },
        None => format!("Error: {:#}", e),
    }
}

/// Exit status 2 for configuration problems, 1 for everything else.
fn exit_status(e: &anyhow::Error) -> u8 {
    let config_error = match e.downcast_ref::<ImpactError>() {
        Some(ImpactError::Config(eco)) => eco.is_config_error(),
        Some(ImpactError::UnknownRegion(_)) => true,
        Some(_) => false,
        None => e
            .downcast_ref::<EcoError>()
            .is_some_and(EcoError::is_config_error),
    };
    if config_error { 2 } else { 1 }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> ecotrace_core::Result<LogGuard> {
    let debug = cli.verbose > 0;
    init_logging(cli.log_dir.clone(), debug)
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ImpactConfig> {
    let config = match path {
        Some(path) => ImpactConfig::load_from(path)?,
        None => ImpactConfig::load()?,
    };
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Regions => {
            print_regions(&config);
            Ok(())
        }
        Command::Report { input, json } => {
            let report = run_pipeline(config, &input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(())
        }
        Command::Export { input, out, grouped } => {
            let report = run_pipeline(config, &input)?;
            let records = &report.impact.records;

            let mut writer: Box<dyn Write> = match &out {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path)
                        .with_context(|| format!("creating {}", path.display()))?,
                )),
                None => Box::new(io::stdout().lock()),
            };
            if grouped {
                write_grouped_csv(&mut writer, records)?;
            } else {
                write_enriched_csv(&mut writer, records)?;
            }

            if let Some(path) = out {
                info!(path = %path.display(), rows = records.len(), "export written");
                eprintln!("Wrote {} rows to {}", records.len(), path.display());
            }
            Ok(())
        }
    }
}

/// Apply per-run overrides and run the pipeline on a fresh runtime.
fn run_pipeline(mut config: ImpactConfig, input: &InputArgs) -> anyhow::Result<PipelineReport> {
    if let Some(region) = &input.region {
        config.region = region.clone();
    }
    if let Some(rate) = input.usd_rate {
        config.usd_rate = rate;
    }
    if let Some(days) = input.days {
        config.window_days = days;
    }

    let pipeline = if input.demo {
        let source = match input.seed {
            Some(seed) => DemoSource::new(seed),
            None => DemoSource::default(),
        };
        Pipeline::with_source(config, source)
    } else {
        if input.inventory.is_none() && input.resource_name.is_none() {
            bail!("no input: pass --demo, --inventory, or --resource-group with --resource-name");
        }

        let mut source = FileSource::new();
        if let Some(path) = &input.inventory {
            source = source.with_inventory(path);
        }
        if let Some(path) = &input.usage {
            source = source.with_metrics(path);
        }
        if let Some(path) = &input.costs {
            source = source.with_costs(path);
        }
        Pipeline::with_source(config, source)
    };

    let discovery = match (&input.resource_group, &input.resource_name) {
        (Some(group), Some(name)) => Discovery::Manual {
            resource_group: group.clone(),
            resource_name: name.clone(),
        },
        (group, _) => Discovery::Scan {
            resource_group: group.clone(),
        },
    };

    let session = Session::new(input.subscription.clone());
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    let report = runtime.block_on(pipeline.run(&session, &discovery))?;
    Ok(report)
}

fn print_regions(config: &ImpactConfig) {
    for region in &config.regions {
        let marker = if region.name == config.region { "*" } else { " " };
        println!("{} {:<24} {:>6.0} g CO2/kWh", marker, region.name, region.intensity);
    }
}

fn print_report(report: &PipelineReport) {
    let impact = &report.impact;
    let totals = &impact.totals;

    println!("Region: {} ({:.0} g CO2/kWh)", impact.region, impact.grid_intensity);
    println!();
    println!("Energy        {:>12.4} kWh", totals.energy_kwh);
    println!("Carbon        {:>12.2} g CO2e", totals.carbon_grams);
    println!("Tree-days     {:>12.2}", totals.tree_days);
    println!("Input tokens  {:>12.0}", totals.input_tokens);
    println!("Output tokens {:>12.0}", totals.output_tokens);
    println!("Images        {:>12.0}", totals.images);
    println!("Models        {:>12}", totals.models_tracked);

    if !report.inventory.is_empty() {
        println!();
        println!("Inventory");
        for (_, items) in group_by_account(&report.inventory) {
            let first = items[0];
            println!("  {} [{}]", first.account_name, first.project);
            for item in items {
                println!("    {:<28} {:<20} {}", item.deployment_name, item.model_name, item.usage_type);
            }
        }
    }

    if !impact.by_model.is_empty() {
        println!();
        println!("{:<28} {:>10} {:>12} {:>12}", "Model", "Samples", "kWh", "g CO2e");
        for row in &impact.by_model {
            println!(
                "{:<28} {:>10} {:>12.4} {:>12.2}",
                row.group_key, row.record_count, row.energy_kwh, row.carbon_grams
            );
        }
    }

    if !impact.project_costs.is_empty() {
        println!();
        println!("{:<28} {:>12} {:>12} {:>12}", "Project", "SEK", "g CO2e", "Tokens");
        for row in &impact.project_costs {
            println!(
                "{:<28} {:>12.2} {:>12.2} {:>12.0}",
                row.project_name,
                row.cost_sek,
                row.carbon_grams,
                row.input_tokens + row.output_tokens
            );
        }
    }

    println!();
    if impact.cost.is_empty() {
        if let Some(usd) = impact.estimated_cost_usd {
            println!("No billing data; estimated {:.2} USD from token volume", usd);
        }
    } else {
        println!(
            "Cost: {:.2} SEK total, {:.2} SEK/day, {:.2} SEK projected per month",
            impact.cost.total_sek, impact.cost.daily_average, impact.cost.projected_monthly
        );
    }

    if let Some(message) = &report.cost_error {
        println!();
        println!("{}", message);
    }
    for message in &report.errors {
        eprintln!("{}", message);
    }
}

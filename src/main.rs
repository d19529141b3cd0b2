use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use trade_history_builder::{format_count, PipelineConfig, TradeHistoryProcessor};

#[derive(Parser)]
#[command(name = "trade-history")]
#[command(about = "Convert cumulative trade tables into monthly records and update the ledger")]
#[command(version)]
#[command(after_help = "\
Examples:
  trade-history data/FTS_uptoAsoj_208283.xlsx data/done.csv
  trade-history data/cumulative.csv data/done.csv --output done_2082.csv
  trade-history data/FTS.xlsx data/done.csv --append --cumulative cumulative.csv")]
struct Cli {
    /// Cumulative source (.xlsx, .xls, .xlsm, .ods, or .csv with a Direction column)
    source: PathBuf,

    /// Historical ledger CSV
    ledger: PathBuf,

    /// Name of the reconciled ledger written beside LEDGER
    #[arg(long, short = 'o')]
    output: Option<String>,

    /// Name of the monthly-only file written beside LEDGER
    #[arg(long)]
    monthly: Option<String>,

    /// Also write the combined cumulative table under this name
    #[arg(long)]
    cumulative: Option<String>,

    /// Append without replacing existing rows for the same month
    #[arg(long)]
    append: bool,

    /// JSON pipeline configuration
    #[arg(long, env = "TRADE_HISTORY_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(output) = cli.output {
        config.ledger_output_name = output;
    }
    if let Some(monthly) = cli.monthly {
        config.monthly_file_name = monthly;
    }
    if cli.cumulative.is_some() {
        config.cumulative_file_name = cli.cumulative;
    }
    if cli.append {
        config.replace_existing = false;
    }

    let processor = TradeHistoryProcessor::new(config)?;
    let report = processor
        .run(&cli.source, &cli.ledger)
        .with_context(|| format!("processing {}", cli.source.display()))?;

    info!(
        "Done: {} monthly records for {}/{} (I:{}, E:{}), ledger {} -> {} records",
        format_count(report.monthly_rows),
        report.metadata.year,
        report.metadata.target_month,
        format_count(report.import_rows),
        format_count(report.export_rows),
        format_count(report.reconcile.total - report.reconcile.appended + report.reconcile.removed),
        format_count(report.reconcile.total)
    );
    info!("Monthly file: {}", report.monthly_path.display());
    info!("Ledger file: {}", report.ledger_path.display());

    Ok(())
}

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use rusty_series::cache::ChangeStatus;
use rusty_series::data::filter::{apply_filter, init_filter};
use rusty_series::data::rolling::rolling_all;
use rusty_series::{PipelineState, Settings};

/// Rolling-average summaries of spreadsheet exports and the Parquet snapshot.
#[derive(Parser)]
#[command(name = "rusty-series", version, about)]
struct Cli {
    /// JSON settings file (defaults: public snapshot only)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Moving-average window, 1-50
    #[arg(long, short = 'w', default_value = "6")]
    window: usize,

    /// Only show these sources (repeatable)
    #[arg(long = "source", short = 's')]
    sources: Vec<String>,

    /// Length of the period ending at the newest point, in days
    #[arg(long, default_value = "30")]
    days: u64,

    /// Re-run every N seconds instead of once
    #[arg(long)]
    watch: Option<u64>,

    /// Swap in newer workbook exports without asking
    #[arg(long)]
    accept_updates: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    let mut state = PipelineState::new(settings).context("starting pipeline")?;

    loop {
        run_once(&mut state, &cli)?;
        let Some(secs) = cli.watch else {
            return Ok(());
        };
        thread::sleep(Duration::from_secs(secs));
        check_workbooks(&mut state, cli.accept_updates);
    }
}

fn check_workbooks(state: &mut PipelineState, accept: bool) {
    for (name, status) in state.poll_workbooks() {
        let ChangeStatus::PendingUpdate { .. } = status else {
            continue;
        };
        if !accept {
            warn!("workbook '{name}' has a newer export; rerun with --accept-updates to load it");
            continue;
        }
        match state.confirm_update(&name) {
            Ok(_) => info!("workbook '{name}' updated"),
            Err(e) => error!("workbook '{name}': {e}"),
        }
    }
}

fn run_once(state: &mut PipelineState, cli: &Cli) -> Result<()> {
    let report = state.load_all();
    for (source, err) in &report.errors {
        eprintln!("! {source}: {err}");
    }

    let Some(mut filter) = init_filter(&report.series) else {
        println!("No data available.");
        return Ok(());
    };
    if !cli.sources.is_empty() {
        filter.sources = cli.sources.iter().cloned().collect();
    }
    filter.start = filter
        .end
        .checked_sub_days(chrono::Days::new(cli.days))
        .unwrap_or(filter.start);

    let selected = apply_filter(&report.series, &filter);
    if selected.is_empty() {
        println!("No data found in the selected period.");
        return Ok(());
    }

    let results = rolling_all(&selected, cli.window).context("computing moving averages")?;
    println!(
        "Moving averages - {} periods, {} to {}",
        cli.window, filter.start, filter.end
    );
    for result in results {
        let Some((last, mean)) = result.series_with_mean.last() else {
            continue;
        };
        println!(
            "{:<24} {:>6} pts  last {}  value {:>10.4}  mean {:>10.4}",
            result.source_id,
            result.series_with_mean.len(),
            last.timestamp,
            last.value,
            mean
        );
    }
    Ok(())
}

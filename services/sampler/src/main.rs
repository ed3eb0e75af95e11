//! Training-sample acquisition service.
//!
//! Draws random space-time candidates across a span of days, probes the
//! NOAA open-data archives for coverage and live convection, and builds an
//! aligned predictor/label store pair for every accepted candidate.

use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use acquisition::Archives;
use labeling::LabelRule;
use sampler::orchestrator::{Orchestrator, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "sampler")]
#[command(about = "Builds convective-initiation training samples from the NOAA archives")]
struct Args {
    /// First day to sample, YYYYMMDD
    #[arg(long)]
    start: String,

    /// Last day to sample, YYYYMMDD (inclusive)
    #[arg(long)]
    end: String,

    /// Time sections per day (must divide 24)
    #[arg(long, default_value_t = 4)]
    files: u32,

    /// Samples per time section
    #[arg(long, default_value_t = 1)]
    grids: u32,

    /// Keep raw downloads and intermediates under backup/
    #[arg(long)]
    backup: bool,

    /// Sample output directory
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Elevation source file
    #[arg(long, default_value = "perm_elev.nc")]
    elevation_file: PathBuf,

    /// RNG seed for reproducible candidate draws; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let start = NaiveDate::parse_from_str(&args.start, "%Y%m%d")
        .with_context(|| format!("bad --start: {}", args.start))?;
    let end = NaiveDate::parse_from_str(&args.end, "%Y%m%d")
        .with_context(|| format!("bad --end: {}", args.end))?;
    anyhow::ensure!(start <= end, "--start must not be after --end");
    anyhow::ensure!(
        args.files > 0 && 24 % args.files == 0,
        "--files must divide 24"
    );
    anyhow::ensure!(args.grids > 0, "--grids must be at least 1");

    // Cells outside a source's domain stay NaN so validation can see
    // coverage gaps instead of silently extended edges.
    storm_common::set_remap_extrapolate(false);

    let config = RunConfig {
        start,
        end,
        files_per_day: args.files,
        grids_per_step: args.grids,
        keep_backup: args.backup,
        data_dir: args.data_dir,
        elevation_file: args.elevation_file,
        // Acquisition always labels with the production thresholds; the
        // labeler service is the place to relabel with different ones.
        rule: LabelRule::default(),
    };

    info!(
        start = %config.start,
        end = %config.end,
        files = config.files_per_day,
        grids = config.grids_per_step,
        "Starting sample acquisition"
    );

    let archives = Archives::open_noaa()?;
    let orchestrator = Orchestrator::new(config, archives)?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let summary = orchestrator.run(&mut rng).await?;

    println!("{}", summary.summary_line(orchestrator.config()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_with_defaults() {
        let args =
            Args::try_parse_from(["sampler", "--start", "20230601", "--end", "20230602"]).unwrap();
        assert_eq!(args.files, 4);
        assert_eq!(args.grids, 1);
        assert!(!args.backup);
    }

    #[test]
    fn label_thresholds_are_not_configurable_here() {
        // Threshold knobs live on the labeler; acquisition labels with the
        // fixed production rule.
        assert!(Args::try_parse_from([
            "sampler", "--start", "20230601", "--end", "20230602", "--ref", "40"
        ])
        .is_err());
    }
}

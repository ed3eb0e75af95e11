//! Standalone relabeler.
//!
//! Rebuilds every existing sample's target store under a new initiation
//! rule, without touching the predictor or radar stores (unless told to
//! drop the radar store once it is no longer needed). Samples are labeled
//! concurrently; the instance log is rewritten from scratch.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use futures::stream::{self, StreamExt};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use labeling::{error_line, instance_line, label_sample, LabelRule};
use storm_common::{DataInfo, StormError, StormResult};
use storm_store::RADAR_STORE;

#[derive(Parser, Debug)]
#[command(name = "labeler")]
#[command(about = "Relabels existing samples under a new initiation rule")]
struct Args {
    /// Sample directory to relabel
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Minimum -10C reflectivity in dBz for a label hit
    #[arg(long = "ref", default_value_t = 35.0)]
    ref_dbz: f32,

    /// Minimum MUCAPE in J/kg for a label hit
    #[arg(long, default_value_t = 100.0)]
    cape: f32,

    /// Most negative MUCIN in J/kg still allowed for a label hit
    #[arg(long, default_value_t = -50.0)]
    cin: f32,

    /// Other active points a label hit's neighborhood must hold
    #[arg(long, default_value_t = 3)]
    touch: u32,

    /// Samples labeled concurrently
    #[arg(long, default_value_t = 4)]
    num: usize,

    /// Delete each sample's radar store after a successful relabel
    #[arg(long)]
    remove: bool,

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

    let rule = LabelRule {
        ref_dbz: args.ref_dbz,
        cape: args.cape,
        cin: args.cin,
        touch: args.touch,
    };

    let info_dir = match args.data_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join("data_info"),
        _ => PathBuf::from("data_info"),
    };
    let info = DataInfo::open(info_dir)?;
    // The relabel replaces the instance log wholesale; warnings, retries,
    // and timings from the acquisition run stay.
    let _ = std::fs::remove_file(info.path().join("instances.txt"));

    let mut samples: Vec<String> = Vec::new();
    for entry in std::fs::read_dir(&args.data_dir)
        .with_context(|| format!("reading {}", args.data_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        // Sample directories are date-stamped; skip grid.txt and strays.
        if entry.file_type()?.is_dir() && name.starts_with("20") {
            samples.push(name);
        }
    }
    samples.sort_unstable();
    info!("Relabeling {} sample(s) under: {}", samples.len(), rule.banner());

    let results: Vec<(String, StormResult<usize>)> = stream::iter(samples.into_iter().map(
        |name| {
            let sample_dir = args.data_dir.join(&name);
            let remove = args.remove;
            async move {
                let dir = sample_dir.clone();
                let joined = tokio::task::spawn_blocking(move || -> StormResult<usize> {
                    let count = label_sample(&dir, &rule)?;
                    if remove {
                        std::fs::remove_dir_all(dir.join(RADAR_STORE))?;
                    }
                    Ok(count)
                })
                .await;
                let outcome = match joined {
                    Ok(result) => result,
                    Err(e) => Err(StormError::Io(format!("labeling task panicked: {}", e))),
                };
                (name, outcome)
            }
        },
    ))
    .buffer_unordered(args.num.max(1))
    .collect()
    .await;

    let mut labeled = 0usize;
    for (name, outcome) in results {
        match outcome {
            Ok(count) => {
                labeled += 1;
                info.instance(&instance_line(&name, count))?;
            }
            Err(e) => {
                warn!("{} failed to label: {}", name, e);
                info.instance(&error_line(&name, &e))?;
            }
        }
    }
    info.finalize_instances(&rule.banner())?;

    info!("Relabeled {} sample(s)", labeled);
    Ok(())
}

//! Run orchestration: candidate selection, probing, fetching, retries, and
//! deferred validation.
//!
//! The run walks days and time sections, drawing random candidates until
//! each section has filled its quota. An accepted candidate is fetched by
//! four concurrent stages with individual deadlines; the previous sample's
//! validation and labeling runs in the background while the current one
//! downloads, so the pipeline never idles on the largely CPU-bound label
//! step.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::NaiveDate;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use acquisition::fetch::{
    ModelFetcher, RadarFetcher, SatelliteFetcher, SourceFetcher, TerrainFetcher, RADAR_STAGE,
};
use acquisition::{merge, probe, Archives, Resampler, SamplePaths, TaskGroup};
use labeling::LabelRule;
use storm_common::{DataInfo, GridSpec, SampleWindow, StormError, StormResult};
use storm_store::{validate, INPUTS_STORE, RADAR_STORE};

/// Whole-sample attempts before an incomplete sample is kept as-is.
pub const MAX_ATTEMPTS: u32 = 6;
/// Viability rejections before a slot is written off.
pub const MAX_REJECTIONS: u32 = 36;
/// Wall-clock budget per stage.
pub const STAGE_TIMEOUT: StdDuration = StdDuration::from_secs(500);

/// Everything a run needs to know up front.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// First day sampled.
    pub start: NaiveDate,
    /// Last day sampled, inclusive.
    pub end: NaiveDate,
    /// Time sections per day; must divide 24.
    pub files_per_day: u32,
    /// Samples per time section.
    pub grids_per_step: u32,
    /// Keep raw downloads and intermediates under `backup/`.
    pub keep_backup: bool,
    pub data_dir: PathBuf,
    pub elevation_file: PathBuf,
    pub rule: LabelRule,
}

impl RunConfig {
    /// Report directory, a sibling of the data directory.
    pub fn data_info_dir(&self) -> PathBuf {
        match self.data_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join("data_info"),
            _ => PathBuf::from("data_info"),
        }
    }
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub files: usize,
    pub seconds: f64,
}

impl RunSummary {
    /// The closing line printed when a run ends.
    pub fn summary_line(&self, config: &RunConfig) -> String {
        format!(
            "Completed {} files from {} to {} with {} files per day and {} grids per step in {:.1} seconds",
            self.files,
            config.start.format("%Y%m%d"),
            config.end.format("%Y%m%d"),
            config.files_per_day,
            config.grids_per_step,
            self.seconds
        )
    }
}

pub struct Orchestrator {
    config: RunConfig,
    archives: Archives,
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    resampler: Resampler,
    info: DataInfo,
    stage_timeout: StdDuration,
}

impl Orchestrator {
    /// Builds an orchestrator with the production fetchers.
    pub fn new(config: RunConfig, archives: Archives) -> StormResult<Self> {
        let resampler = Resampler::new(storm_common::remap_extrapolate());
        let fetchers: Vec<Arc<dyn SourceFetcher>> = vec![
            Arc::new(RadarFetcher::new(Arc::clone(&archives.radar), resampler)),
            Arc::new(ModelFetcher::new(Arc::clone(&archives.model), resampler)),
            Arc::new(SatelliteFetcher::new(Arc::clone(&archives.satellite), resampler)),
            Arc::new(TerrainFetcher::new(config.elevation_file.clone(), resampler)),
        ];
        Self::with_fetchers(config, archives, fetchers)
    }

    /// Builds an orchestrator around caller-supplied fetchers.
    pub fn with_fetchers(
        config: RunConfig,
        archives: Archives,
        fetchers: Vec<Arc<dyn SourceFetcher>>,
    ) -> StormResult<Self> {
        let info = DataInfo::reset(config.data_info_dir())?;
        Ok(Self {
            resampler: Resampler::new(storm_common::remap_extrapolate()),
            config,
            archives,
            fetchers,
            info,
            stage_timeout: STAGE_TIMEOUT,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn data_info(&self) -> &DataInfo {
        &self.info
    }

    pub fn set_stage_timeout(&mut self, deadline: StdDuration) {
        self.stage_timeout = deadline;
    }

    /// Runs the full acquisition loop.
    pub async fn run(&self, rng: &mut StdRng) -> StormResult<RunSummary> {
        let run_start = Instant::now();
        std::fs::create_dir_all(&self.config.data_dir)?;

        let mut files = 0usize;
        let mut previous: Option<String> = None;

        let mut day = self.config.start;
        while day <= self.config.end {
            for section in 0..self.config.files_per_day {
                let mut taken: HashSet<String> = HashSet::new();
                let mut slots = 0u32;
                let mut rejections = 0u32;
                while slots < self.config.grids_per_step {
                    let mut window =
                        SampleWindow::draw(rng, day, section, self.config.files_per_day);
                    while taken.contains(&window.dir_name()) {
                        window = SampleWindow::draw(rng, day, section, self.config.files_per_day);
                    }
                    let grid = GridSpec::random(rng, 250, 250, 0.02, 0.02);

                    let availability = probe::check_availability(&self.archives, &window).await;
                    if !availability.is_available() {
                        let line = availability.warning_line(&window.dir_name());
                        warn!("{}", line);
                        self.info.warning(&line)?;
                        slots += 1;
                        continue;
                    }

                    let viable = probe::check_viability(
                        &self.archives.radar,
                        &window,
                        &grid,
                        &self.resampler,
                    )
                    .await;
                    if !viable {
                        rejections += 1;
                        if rejections >= MAX_REJECTIONS {
                            let line = format!("Grid not found for {}", window.display_time());
                            warn!("{}", line);
                            self.info.warning(&line)?;
                            rejections = 0;
                            slots += 1;
                        }
                        continue;
                    }

                    info!("{} has been found", window.display_time());
                    let dir_name = window.dir_name();
                    taken.insert(dir_name.clone());
                    // Working copy of the grid for anyone watching the run.
                    std::fs::write(
                        self.config.data_dir.join("grid.txt"),
                        grid.to_grid_text(),
                    )?;

                    let deferred = previous.take().map(|name| self.spawn_deferred(name));
                    let paths = SamplePaths::new(self.config.data_dir.join(&dir_name));
                    let sample_start = Instant::now();

                    let complete = self.fetch_sample(&window, &grid, &paths, deferred).await?;
                    if !complete {
                        warn!("{} is incomplete after {} attempts", dir_name, MAX_ATTEMPTS);
                    }

                    if !self.config.keep_backup {
                        paths.purge_backup()?;
                    }
                    std::fs::write(paths.sample_dir.join("grid.txt"), grid.to_grid_text())?;
                    let line = format!(
                        "{} done in {:.3} seconds",
                        dir_name,
                        sample_start.elapsed().as_secs_f64()
                    );
                    info!("{}", line);
                    self.info.timing(&line)?;

                    previous = Some(dir_name);
                    files += 1;
                    slots += 1;
                    rejections = 0;
                }
            }
            day = day
                .succ_opt()
                .ok_or_else(|| StormError::InvalidTime(format!("no day after {}", day)))?;
        }

        // The last sample has no successor to hide behind; validate it now.
        if let Some(dir_name) = previous.take() {
            if timeout(self.stage_timeout, self.spawn_deferred(dir_name))
                .await
                .is_err()
            {
                warn!("Final validation missed its deadline");
            }
        }
        if files > 0 {
            self.info.finalize_instances(&self.config.rule.banner())?;
        }

        Ok(RunSummary {
            files,
            seconds: run_start.elapsed().as_secs_f64(),
        })
    }

    /// Fetches one accepted sample, retrying whole attempts until both
    /// stores exist or the attempt budget runs out. Returns completeness.
    ///
    /// `deferred` is the previous sample's validation job; it gets the
    /// first slice of each attempt's budget so its report lines land
    /// before this sample's own.
    pub async fn fetch_sample(
        &self,
        window: &SampleWindow,
        grid: &GridSpec,
        paths: &SamplePaths,
        mut deferred: Option<JoinHandle<()>>,
    ) -> StormResult<bool> {
        let mut complete = false;

        for attempt in 1..=MAX_ATTEMPTS {
            paths.reset()?;

            let mut group = TaskGroup::new();
            let mut names = Vec::with_capacity(self.fetchers.len());
            for fetcher in &self.fetchers {
                let name = fetcher.name();
                names.push(name);
                let fetcher = Arc::clone(fetcher);
                let window = *window;
                let grid = grid.clone();
                let stage_paths = paths.clone();
                group.spawn(name, async move {
                    fetcher.run(window, grid, stage_paths).await
                });
            }

            if let Some(handle) = deferred.as_mut() {
                if timeout(self.stage_timeout, &mut *handle).await.is_ok() {
                    deferred = None;
                } else {
                    warn!("Deferred validation is still running");
                }
            }

            for name in names.iter().copied().filter(|n| *n != RADAR_STAGE) {
                let outcome = group.join(name, self.stage_timeout).await;
                if let Err(e) = &outcome.result {
                    warn!(stage = outcome.name, "Stage failed: {}", e);
                }
            }

            let merge_paths = paths.clone();
            let merge_task = tokio::task::spawn_blocking(move || merge::merge_inputs(&merge_paths));
            match timeout(self.stage_timeout, merge_task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!("Merge failed: {}", e),
                Ok(Err(e)) => warn!("Merge panicked: {}", e),
                Err(_) => warn!("Merge missed its deadline"),
            }

            if names.contains(&RADAR_STAGE) {
                let outcome = group.join(RADAR_STAGE, self.stage_timeout).await;
                if let Err(e) = &outcome.result {
                    warn!(stage = outcome.name, "Stage failed: {}", e);
                }
            }

            complete =
                paths.store(INPUTS_STORE).is_dir() && paths.store(RADAR_STORE).is_dir();
            if complete {
                break;
            }
            if attempt < MAX_ATTEMPTS {
                if paths.sample_dir.exists() {
                    std::fs::remove_dir_all(&paths.sample_dir)?;
                }
                let line = format!(
                    "{} retry #{} (attempt #{})",
                    window.dir_name(),
                    attempt,
                    attempt + 1
                );
                warn!("{}", line);
                self.info.retry(&line)?;
                tokio::time::sleep(StdDuration::from_secs(1)).await;
            }
        }

        // An attempt budget spent entirely on timeouts can leave the job
        // unjoined; give it one last window rather than losing its lines.
        if let Some(handle) = deferred.take() {
            if timeout(self.stage_timeout, handle).await.is_err() {
                warn!("Abandoning the deferred validation job");
            }
        }
        Ok(complete)
    }

    fn spawn_deferred(&self, dir_name: String) -> JoinHandle<()> {
        let data_dir = self.config.data_dir.clone();
        let info = self.info.clone();
        let rule = self.config.rule;
        tokio::task::spawn_blocking(move || finish_sample(&data_dir, &info, &rule, &dir_name))
    }
}

/// Validates and labels one finished sample, appending its report lines.
/// Never fails; problems become warning or error lines.
pub fn finish_sample(data_dir: &Path, info: &DataInfo, rule: &LabelRule, dir_name: &str) {
    let sample_dir = data_dir.join(dir_name);
    for line in validate::validate_sample(&sample_dir, dir_name) {
        warn!("{}", line);
        if let Err(e) = info.warning(&line) {
            error!("Could not record warning: {}", e);
        }
    }
    let line = match labeling::label_sample(&sample_dir, rule) {
        Ok(count) => labeling::instance_line(dir_name, count),
        Err(e) => labeling::error_line(dir_name, &e),
    };
    if let Err(e) = info.instance(&line) {
        error!("Could not record instance count: {}", e);
    }
}

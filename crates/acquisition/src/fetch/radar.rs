//! Radar fetcher: the -10C reflectivity scans that become the label store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use tracing::{debug, info, instrument};

use storm_common::{GridSpec, SampleWindow, StormError, StormResult};
use storm_store::{GridStack, RADAR_STORE, REFLECTIVITY_VAR};

use crate::archive::{mrms_name_matches, ArchiveKeys, RemoteArchive};
use crate::fetch::{SourceFetcher, RADAR_STAGE};
use crate::grib2;
use crate::resample::Resampler;
use crate::{stash_raw, SamplePaths};

/// Scans collected per sample: the label hour on the mosaic's 2-minute
/// cadence, plus one scan either side for interpolation.
const SCANS: usize = 31;
/// Candidate minutes examined before giving up on a gap-ridden day.
const MAX_SCAN_STEPS: usize = 90;

pub struct RadarFetcher {
    archive: Arc<dyn RemoteArchive>,
    resampler: Resampler,
}

impl RadarFetcher {
    pub fn new(archive: Arc<dyn RemoteArchive>, resampler: Resampler) -> Self {
        Self { archive, resampler }
    }

    /// First candidate scan minute: three minutes before the anchor,
    /// floored to the mosaic's even-minute cadence, plus one step.
    pub fn scan_start(anchor: DateTime<Utc>) -> DateTime<Utc> {
        let lead = anchor - Duration::minutes(3);
        let floored = lead - Duration::minutes(i64::from(lead.minute() % 2));
        floored + Duration::minutes(2)
    }
}

#[async_trait]
impl SourceFetcher for RadarFetcher {
    fn name(&self) -> &'static str {
        RADAR_STAGE
    }

    #[instrument(skip(self, grid, paths))]
    async fn run(
        &self,
        window: SampleWindow,
        grid: GridSpec,
        paths: SamplePaths,
    ) -> StormResult<()> {
        let scratch = paths.scratch_dir(RADAR_STAGE);
        let mut listings: HashMap<NaiveDate, Vec<String>> = HashMap::new();

        let mut scan_time = Self::scan_start(window.anchor);
        let mut scans: Vec<(DateTime<Utc>, Vec<f32>)> = Vec::with_capacity(SCANS);
        let mut steps = 0usize;

        while scans.len() < SCANS {
            if steps >= MAX_SCAN_STEPS {
                return Err(StormError::MissingData(format!(
                    "only {} of {} radar scans found near {}",
                    scans.len(),
                    SCANS,
                    window.display_time()
                )));
            }
            steps += 1;

            let day = scan_time.date_naive();
            if !listings.contains_key(&day) {
                let prefix = ArchiveKeys::mrms_day(crate::probe::RADAR_PRODUCT, day);
                listings.insert(day, self.archive.list(&prefix).await?);
            }
            let day_keys = &listings[&day];

            if let Some(key) = day_keys.iter().find(|k| mrms_name_matches(k, scan_time)) {
                let raw = self.archive.get(key).await?;
                let file_name = key.rsplit('/').next().unwrap_or(key);
                stash_raw(&scratch, file_name, &raw);

                let (values, source) = grib2::decode_mrms(&raw)?;
                let plane = self.resampler.plane(&source, &values, &grid)?;
                scans.push((scan_time, plane));
            } else {
                debug!(minute = %scan_time.format("%H:%M"), "No mosaic at this scan minute");
            }
            scan_time += Duration::minutes(2);
        }

        let times: Vec<DateTime<Utc>> = scans.iter().map(|(t, _)| *t).collect();
        let mut data = Vec::with_capacity(SCANS * grid.len());
        for (_, plane) in &scans {
            data.extend_from_slice(plane);
        }
        let mut stack = GridStack::new(times, grid.lats(), grid.lons());
        stack.add_var(REFLECTIVITY_VAR, data)?;

        // Mosaic sentinels (no coverage, no echo) become plain zero dBZ.
        stack.range_to_missing(-1000.0, 0.0);
        stack.missing_to(0.0);

        // Pin the axis to the nominal cadence before interpolating onto the
        // label steps; actual scan stamps jitter by a minute or two.
        stack.relabel_time(window.anchor + Duration::minutes(5), Duration::minutes(2));
        let aligned = stack.interp_time(&window.radar_axis())?;

        storm_store::netcdf::write_stack(&paths.intermediate("rf-10.nc"), &aligned)?;
        storm_store::zarr::write_store(&paths.store(RADAR_STORE), &aligned)?;
        info!(sample = %window.dir_name(), scans = SCANS, "Radar store written");
        Ok(())
    }
}

//! Model fetcher: HRRR analysis fields bracketing the predictor hour.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use tracing::{debug, info, instrument};

use storm_common::{GridSpec, SampleWindow, StormError, StormResult};
use storm_store::GridStack;

use crate::archive::{ArchiveKeys, RemoteArchive};
use crate::fetch::{SourceFetcher, MODEL_STAGE};
use crate::projection::LambertConformal;
use crate::resample::{Resampler, SourceGrid};
use crate::{grib2, idx, stash_raw, SamplePaths};

pub struct ModelFetcher {
    archive: Arc<dyn RemoteArchive>,
    resampler: Resampler,
}

impl ModelFetcher {
    pub fn new(archive: Arc<dyn RemoteArchive>, resampler: Resampler) -> Self {
        Self { archive, resampler }
    }

    /// The analysis cycle at or before the start of the predictor hour.
    ///
    /// The predictor axis opens 60 minutes before the anchor; backing off
    /// 115 minutes and flooring to the hour lands on the last cycle whose
    /// valid time is not after that opening.
    pub fn base_cycle(anchor: DateTime<Utc>) -> DateTime<Utc> {
        let lead = anchor - Duration::hours(1) - Duration::minutes(55);
        lead - Duration::minutes(i64::from(lead.minute()))
    }

    /// Downloads and decodes one cycle's predictor fields onto the grid.
    async fn fetch_cycle(
        &self,
        cycle: DateTime<Utc>,
        grid: &GridSpec,
        source: &SourceGrid,
        paths: &SamplePaths,
    ) -> StormResult<GridStack> {
        let key = ArchiveKeys::hrrr_analysis(cycle);
        let idx_key = ArchiveKeys::hrrr_index(cycle);
        let scratch = paths.scratch_dir(MODEL_STAGE);

        let sidecar = self.archive.get(&idx_key).await?;
        let file_size = self.archive.size(&key).await?;
        let records = idx::parse_idx(&String::from_utf8_lossy(&sidecar), file_size);

        let mut stack = GridStack::new(vec![cycle], grid.lats(), grid.lons());
        for record in records {
            let Some(name) = idx::hrrr_store_name(&record.var, &record.level) else {
                continue;
            };
            debug!(var = name, cycle = %cycle.format("%Y%m%d %Hz"), "Fetching analysis field");
            let raw = self.archive.get_range(&key, record.range.clone()).await?;
            stash_raw(&scratch, &format!("{}_t{:02}z.grib2", name, cycle.hour()), &raw);

            let values = grib2::decode_first_message(raw.to_vec())?;
            let plane = self.resampler.plane(source, &values, grid)?;
            stack.add_var(name, plane)?;
        }

        derive_convective_depth(&mut stack)?;
        Ok(stack)
    }
}

/// Replaces the two level-height fields with their difference, the depth of
/// the convectively buoyant layer. Cells with no defined level count as
/// surface, and a free-convection level above the equilibrium level means
/// zero depth.
fn derive_convective_depth(stack: &mut GridStack) -> StormResult<()> {
    let equilibrium = stack.remove_var("HGT_equilibriumlevel").ok_or_else(|| {
        StormError::MissingData("equilibrium level height missing from analysis".to_string())
    })?;
    let free_convection = stack.remove_var("HGT_leveloffreeconvection").ok_or_else(|| {
        StormError::MissingData("free convection level height missing from analysis".to_string())
    })?;

    let depth: Vec<f32> = equilibrium
        .iter()
        .zip(free_convection.iter())
        .map(|(eq, lfc)| {
            let eq = if eq.is_nan() { 0.0 } else { *eq };
            let lfc = if lfc.is_nan() { 0.0 } else { *lfc };
            (eq - lfc).max(0.0)
        })
        .collect();
    stack.add_var("convdepth", depth)
}

#[async_trait]
impl SourceFetcher for ModelFetcher {
    fn name(&self) -> &'static str {
        MODEL_STAGE
    }

    #[instrument(skip(self, grid, paths))]
    async fn run(
        &self,
        window: SampleWindow,
        grid: GridSpec,
        paths: SamplePaths,
    ) -> StormResult<()> {
        let base = Self::base_cycle(window.anchor);
        let source = SourceGrid::Lambert(LambertConformal::hrrr());

        let mut cycles = Vec::with_capacity(2);
        for cycle in [base, base + Duration::hours(1)] {
            cycles.push(self.fetch_cycle(cycle, &grid, &source, &paths).await?);
        }
        let merged = GridStack::merge_time(cycles)?;

        // Hourly analyses to 5-minute steps, then onto the predictor axis.
        let five_minute: Vec<DateTime<Utc>> = (0..13)
            .map(|i| base + Duration::minutes(5 * i))
            .collect();
        let mut aligned = merged.interp_time(&five_minute)?;
        aligned.relabel_time(window.anchor - Duration::minutes(60), Duration::minutes(5));

        storm_store::netcdf::write_stack(&paths.intermediate("hrrr.nc"), &aligned)?;
        info!(sample = %window.dir_name(), vars = aligned.vars.len(), "Model fields aligned");
        Ok(())
    }
}

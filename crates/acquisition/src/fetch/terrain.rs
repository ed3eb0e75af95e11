//! Terrain fetcher: static elevation resampled onto the sample grid.
//!
//! The only source that never touches the network; elevation comes from a
//! local NetCDF file shared by every sample.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Duration;
use tracing::{info, instrument};

use storm_common::{GridSpec, SampleWindow, StormError, StormResult};
use storm_store::GridStack;

use crate::fetch::{SourceFetcher, TERRAIN_STAGE};
use crate::resample::{Resampler, SourceGrid};
use crate::SamplePaths;

/// Elevation variable name in the source file and the predictor store.
pub const ELEVATION_VAR: &str = "elev";

pub struct TerrainFetcher {
    elevation_file: PathBuf,
    resampler: Resampler,
}

impl TerrainFetcher {
    pub fn new(elevation_file: impl Into<PathBuf>, resampler: Resampler) -> Self {
        Self {
            elevation_file: elevation_file.into(),
            resampler,
        }
    }
}

#[async_trait]
impl SourceFetcher for TerrainFetcher {
    fn name(&self) -> &'static str {
        TERRAIN_STAGE
    }

    #[instrument(skip(self, grid, paths))]
    async fn run(
        &self,
        window: SampleWindow,
        grid: GridSpec,
        paths: SamplePaths,
    ) -> StormResult<()> {
        let plane = read_elevation(&self.elevation_file, &grid, &self.resampler)?;

        // Stamp the constant field at both ends of the predictor hour and
        // interpolate; the result is the same plane on all 13 steps, on
        // exactly the same axis as the live sources.
        let ends = vec![
            window.anchor - Duration::minutes(60),
            window.anchor,
        ];
        let mut stack = GridStack::new(ends, grid.lats(), grid.lons());
        let mut data = plane.clone();
        data.extend_from_slice(&plane);
        stack.add_var(ELEVATION_VAR, data)?;
        let aligned = stack.interp_time(&window.inputs_axis())?;

        storm_store::netcdf::write_stack(&paths.intermediate("elev.nc"), &aligned)?;
        info!(sample = %window.dir_name(), "Elevation aligned");
        Ok(())
    }
}

/// Reads the elevation file and resamples it onto the sample grid. Fill
/// values become sea level.
fn read_elevation(path: &Path, grid: &GridSpec, resampler: &Resampler) -> StormResult<Vec<f32>> {
    storm_store::netcdf::silence_hdf5_errors();
    let file = netcdf::open(path).map_err(|e| StormError::NetCdf(e.to_string()))?;

    let lats: Vec<f64> = coord_values(&file, &["latitude", "lat"])?;
    let lons: Vec<f64> = coord_values(&file, &["longitude", "lon"])?;
    let source = SourceGrid::RegularLatLon { lats, lons };

    let var = file
        .variable(ELEVATION_VAR)
        .ok_or_else(|| StormError::NetCdf(format!("missing variable {}", ELEVATION_VAR)))?;
    let mut values: Vec<f32> = var
        .get_values(..)
        .map_err(|e| StormError::NetCdf(e.to_string()))?;
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = 0.0;
        }
    }
    let mut plane = resampler.plane(&source, &values, grid)?;
    for v in plane.iter_mut() {
        if v.is_nan() {
            *v = 0.0;
        }
    }
    Ok(plane)
}

/// Loads the first coordinate variable present under any of `names`.
fn coord_values(file: &netcdf::File, names: &[&str]) -> StormResult<Vec<f64>> {
    for name in names {
        if let Some(var) = file.variable(name) {
            return var
                .get_values(..)
                .map_err(|e| StormError::NetCdf(e.to_string()));
        }
    }
    Err(StormError::NetCdf(format!(
        "no coordinate variable among {:?}",
        names
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn write_elevation(path: &Path) {
        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("lat", 3).unwrap();
        file.add_dimension("lon", 3).unwrap();

        let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
        lat.put_values(&[30.0, 30.5, 31.0], ..).unwrap();
        let mut lon = file.add_variable::<f64>("lon", &["lon"]).unwrap();
        lon.put_values(&[-101.0, -100.5, -100.0], ..).unwrap();

        let mut elev = file
            .add_variable::<f32>(ELEVATION_VAR, &["lat", "lon"])
            .unwrap();
        elev.put_values(
            &[100.0, 200.0, 300.0, 400.0, f32::NAN, 600.0, 700.0, 800.0, 900.0],
            ..,
        )
        .unwrap();
    }

    #[test]
    fn elevation_resamples_and_fills_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perm_elev.nc");
        write_elevation(&path);

        let grid = GridSpec::new(3, 3, -101.0, 30.0, 0.5, 0.5);
        let plane = read_elevation(&path, &grid, &Resampler::new(false)).unwrap();
        assert_eq!(
            plane,
            vec![100.0, 200.0, 300.0, 400.0, 0.0, 600.0, 700.0, 800.0, 900.0]
        );
    }

    #[tokio::test]
    async fn fetcher_writes_a_constant_hour_of_elevation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perm_elev.nc");
        write_elevation(&path);

        let paths = SamplePaths::new(dir.path().join("20230601_1200"));
        paths.reset().unwrap();
        let window =
            SampleWindow::new(Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap());
        let grid = GridSpec::new(2, 2, -101.0, 30.0, 0.5, 0.5);

        let fetcher = TerrainFetcher::new(&path, Resampler::new(false));
        fetcher.run(window, grid, paths.clone()).await.unwrap();

        let stack = storm_store::netcdf::read_stack(&paths.intermediate("elev.nc")).unwrap();
        assert_eq!(stack.times, window.inputs_axis());
        // Constant in time: every step carries the same plane.
        let first = stack.plane(ELEVATION_VAR, 0).unwrap().to_vec();
        for step in 1..13 {
            assert_eq!(stack.plane(ELEVATION_VAR, step).unwrap(), &first[..]);
        }
        assert_eq!(first, vec![100.0, 200.0, 400.0, 0.0]);
    }
}

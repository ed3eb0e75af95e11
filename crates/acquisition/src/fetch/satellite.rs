//! Satellite fetcher: GOES-16 multi-band imagery for the predictor hour.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};

use storm_common::{GridSpec, SampleWindow, StormError, StormResult};
use storm_store::GridStack;

use crate::archive::{goes_name_matches, ArchiveKeys, RemoteArchive};
use crate::fetch::{SourceFetcher, SATELLITE_STAGE};
use crate::probe::GOES_FETCH_PRODUCT;
use crate::projection::Geostationary;
use crate::resample::{Resampler, SourceGrid};
use crate::SamplePaths;

/// ABI bands fetched per frame: visible red, shortwave IR, clean longwave IR.
pub const BANDS: [&str; 3] = ["CMI_C02", "CMI_C07", "CMI_C13"];

/// Frames per sample, one per predictor step.
const FRAMES: usize = 13;
/// Candidate scan minutes examined before giving up.
const MAX_FRAME_STEPS: usize = 120;

pub struct SatelliteFetcher {
    archive: Arc<dyn RemoteArchive>,
    resampler: Resampler,
}

impl SatelliteFetcher {
    pub fn new(archive: Arc<dyn RemoteArchive>, resampler: Resampler) -> Self {
        Self { archive, resampler }
    }
}

#[async_trait]
impl SourceFetcher for SatelliteFetcher {
    fn name(&self) -> &'static str {
        SATELLITE_STAGE
    }

    #[instrument(skip(self, grid, paths))]
    async fn run(
        &self,
        window: SampleWindow,
        grid: GridSpec,
        paths: SamplePaths,
    ) -> StormResult<()> {
        let scratch = paths.scratch_dir(SATELLITE_STAGE);
        let mut listings: HashMap<String, Vec<String>> = HashMap::new();

        // Walk backward minute by minute from just before the anchor; CONUS
        // scans start roughly every five minutes but the exact minute moved
        // between scan modes over the years.
        let mut scan_time = window.anchor - Duration::minutes(5);
        let mut frames: Vec<(DateTime<Utc>, Vec<Vec<f32>>)> = Vec::with_capacity(FRAMES);
        let mut steps = 0usize;

        while frames.len() < FRAMES {
            if steps >= MAX_FRAME_STEPS {
                return Err(StormError::MissingData(format!(
                    "only {} of {} satellite frames found before {}",
                    frames.len(),
                    FRAMES,
                    window.display_time()
                )));
            }
            steps += 1;

            let prefix = ArchiveKeys::goes_hour(GOES_FETCH_PRODUCT, scan_time);
            if !listings.contains_key(&prefix) {
                let keys = self.archive.list(&prefix).await?;
                listings.insert(prefix.clone(), keys);
            }
            let hour_keys = &listings[&prefix];

            if let Some(key) = hour_keys.iter().find(|k| goes_name_matches(k, scan_time)) {
                let raw = self.archive.get(key).await?;
                // The scratch copy doubles as the decode handle; the C
                // netcdf library only reads from a real file.
                let path = scratch.join(format!("{}.nc", scan_time.format("%Y%m%d-%H%M")));
                std::fs::write(&path, &raw)?;
                let planes = read_frame(&path, &grid, &self.resampler)?;
                frames.push((scan_time, planes));
            } else {
                debug!(minute = %scan_time.format("%H:%M"), "No CONUS scan at this minute");
            }
            scan_time -= Duration::minutes(1);
        }

        frames.sort_by_key(|(t, _)| *t);

        // Frames sit on the nominal predictor axis; the actual scan stamps
        // are close but never exact, so the axis is imposed rather than
        // interpolated.
        let mut stack = GridStack::new(window.inputs_axis(), grid.lats(), grid.lons());
        for (band_index, band) in BANDS.iter().enumerate() {
            let mut data = Vec::with_capacity(FRAMES * grid.len());
            for (_, planes) in &frames {
                data.extend_from_slice(&planes[band_index]);
            }
            stack.add_var(*band, data)?;
        }
        stack.missing_to(0.0);

        storm_store::netcdf::write_stack(&paths.intermediate("goes.nc"), &stack)?;
        info!(sample = %window.dir_name(), frames = FRAMES, "Satellite bands aligned");
        Ok(())
    }
}

/// Decodes one MCMIP file: builds the fixed-grid geometry from its
/// projection metadata, then unpacks and resamples each band.
fn read_frame(path: &Path, grid: &GridSpec, resampler: &Resampler) -> StormResult<Vec<Vec<f32>>> {
    storm_store::netcdf::silence_hdf5_errors();
    let file = netcdf::open(path).map_err(|e| StormError::NetCdf(e.to_string()))?;

    let source = SourceGrid::Geostationary(frame_geometry(&file)?);

    let mut planes = Vec::with_capacity(BANDS.len());
    for band in BANDS {
        let var = file
            .variable(band)
            .ok_or_else(|| StormError::NetCdf(format!("missing band {}", band)))?;
        let raw: Vec<i16> = var
            .get_values(..)
            .map_err(|e| StormError::NetCdf(e.to_string()))?;

        let scale = get_f32_attr(&var, "scale_factor").unwrap_or(1.0);
        let offset = get_f32_attr(&var, "add_offset").unwrap_or(0.0);
        let fill = get_i16_attr(&var, "_FillValue").unwrap_or(-1);

        let values: Vec<f32> = raw
            .iter()
            .map(|v| {
                if *v == fill {
                    f32::NAN
                } else {
                    f32::from(*v) * scale + offset
                }
            })
            .collect();
        planes.push(resampler.plane(&source, &values, grid)?);
    }
    Ok(planes)
}

/// Fixed-grid geometry of one ABI file, from its `goes_imager_projection`
/// container and `x`/`y` coordinate metadata.
fn frame_geometry(file: &netcdf::File) -> StormResult<Geostationary> {
    let proj = file
        .variable("goes_imager_projection")
        .ok_or_else(|| StormError::NetCdf("missing goes_imager_projection".to_string()))?;
    let height = proj_attr(&proj, "perspective_point_height")?;
    let semi_major = proj_attr(&proj, "semi_major_axis")?;
    let semi_minor = proj_attr(&proj, "semi_minor_axis")?;
    let nadir_lon = proj_attr(&proj, "longitude_of_projection_origin")?;

    let x = file
        .variable("x")
        .ok_or_else(|| StormError::NetCdf("missing x coordinate".to_string()))?;
    let y = file
        .variable("y")
        .ok_or_else(|| StormError::NetCdf("missing y coordinate".to_string()))?;
    // Packed coordinates: scan angle = index * scale + offset, so the
    // offset is the first column/row and the scale is the spacing.
    let dx = proj_attr(&x, "scale_factor")?;
    let x_origin = proj_attr(&x, "add_offset")?;
    let dy = proj_attr(&y, "scale_factor")?;
    let y_origin = proj_attr(&y, "add_offset")?;
    let nx = file
        .dimension("x")
        .ok_or_else(|| StormError::NetCdf("missing x dimension".to_string()))?
        .len();
    let ny = file
        .dimension("y")
        .ok_or_else(|| StormError::NetCdf("missing y dimension".to_string()))?
        .len();

    Ok(Geostationary::new(
        height, semi_major, semi_minor, nadir_lon, x_origin, y_origin, dx, dy, nx, ny,
    ))
}

fn proj_attr(var: &netcdf::Variable, name: &str) -> StormResult<f64> {
    get_f64_attr(var, name)
        .ok_or_else(|| StormError::NetCdf(format!("missing attribute {} on {}", name, var.name())))
}

fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f32_attr(var: &netcdf::Variable, name: &str) -> Option<f32> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f32::try_from(attr_value).ok()
}

fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

fn get_i16_attr(var: &netcdf::Variable, name: &str) -> Option<i16> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    i16::try_from(attr_value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Writes a miniature MCMIP-shaped file: a 4x3 fixed grid centered on
    /// the CONUS sector with three packed bands.
    fn write_frame(path: &Path) {
        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("y", 3).unwrap();
        file.add_dimension("x", 4).unwrap();

        // A coarse grid over the middle of the CONUS sector.
        let mut x = file.add_variable::<i16>("x", &["x"]).unwrap();
        x.put_attribute("scale_factor", 0.01f64).unwrap();
        x.put_attribute("add_offset", -0.02f64).unwrap();
        x.put_values(&[0i16, 1, 2, 3], ..).unwrap();
        let mut y = file.add_variable::<i16>("y", &["y"]).unwrap();
        y.put_attribute("scale_factor", -0.01f64).unwrap();
        y.put_attribute("add_offset", 0.09f64).unwrap();
        y.put_values(&[0i16, 1, 2], ..).unwrap();

        let mut proj = file
            .add_variable::<i32>("goes_imager_projection", &[])
            .unwrap();
        proj.put_attribute("perspective_point_height", 35786023.0f64)
            .unwrap();
        proj.put_attribute("semi_major_axis", 6378137.0f64).unwrap();
        proj.put_attribute("semi_minor_axis", 6356752.31414f64)
            .unwrap();
        proj.put_attribute("longitude_of_projection_origin", -75.0f64)
            .unwrap();

        for (i, band) in BANDS.iter().enumerate() {
            let mut var = file.add_variable::<i16>(band, &["y", "x"]).unwrap();
            var.put_attribute("scale_factor", 0.5f32).unwrap();
            var.put_attribute("add_offset", 10.0f32).unwrap();
            var.put_attribute("_FillValue", -1i16).unwrap();
            let mut values = vec![i as i16 + 1; 12];
            values[5] = -1;
            var.put_values(&values, ..).unwrap();
        }
    }

    #[test]
    fn frame_geometry_comes_from_the_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.nc");
        write_frame(&path);

        let file = netcdf::open(&path).unwrap();
        let geometry = frame_geometry(&file).unwrap();
        assert_eq!(geometry.nx, 4);
        assert_eq!(geometry.ny, 3);
        // The first cell's scan angles resolve to a point the satellite
        // can see.
        assert!(geometry.scan_to_geo(-0.02, 0.09).is_some());
    }

    #[test]
    fn bands_unpack_with_scale_offset_and_fill() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.nc");
        write_frame(&path);

        // One target cell pinned to the frame's own first cell so the
        // nearest-neighbor lookup is exact.
        let file = netcdf::open(&path).unwrap();
        let geometry = frame_geometry(&file).unwrap();
        let (lat, lon) = geometry.scan_to_geo(-0.02, 0.09).unwrap();
        drop(file);
        let grid = GridSpec::new(1, 1, lon, lat, 0.02, 0.02);

        let planes = read_frame(&path, &grid, &Resampler::new(false)).unwrap();
        assert_eq!(planes.len(), 3);
        // Band values are raw * 0.5 + 10.
        assert_eq!(planes[0][0], 10.5);
        assert_eq!(planes[1][0], 11.0);
        assert_eq!(planes[2][0], 11.5);
    }

    #[test]
    fn frame_walk_starts_five_minutes_before_the_anchor() {
        let anchor = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let window = SampleWindow::new(anchor);
        let start = window.anchor - Duration::minutes(5);
        assert_eq!(start, Utc.with_ymd_and_hms(2023, 6, 1, 11, 55, 0).unwrap());
    }
}

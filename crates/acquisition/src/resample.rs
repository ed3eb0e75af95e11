//! Nearest-neighbor regridding onto the sample grid.

use storm_common::{GridSpec, StormError, StormResult};

use crate::projection::{Geostationary, LambertConformal};

/// Geometry of a decoded source field, row-major to match its values.
pub enum SourceGrid {
    /// Regular latitude/longitude axes (MRMS products, elevation files).
    /// Axes may run in either direction.
    RegularLatLon { lats: Vec<f64>, lons: Vec<f64> },
    /// Lambert conformal grid (HRRR).
    Lambert(LambertConformal),
    /// Geostationary fixed grid (GOES ABI).
    Geostationary(Geostationary),
}

impl SourceGrid {
    pub fn len(&self) -> usize {
        match self {
            SourceGrid::RegularLatLon { lats, lons } => lats.len() * lons.len(),
            SourceGrid::Lambert(p) => p.nx * p.ny,
            SourceGrid::Geostationary(p) => p.nx * p.ny,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major index of the source cell nearest to (`lat`, `lon`), plus
    /// whether the point fell inside the source domain. `None` when no
    /// source cell exists at all for the point (off-Earth for a
    /// geostationary view).
    fn nearest(&self, lat: f64, lon: f64) -> Option<(usize, bool)> {
        match self {
            SourceGrid::RegularLatLon { lats, lons } => {
                let (y, y_inside) = nearest_on_axis(lats, lat)?;
                let (x, x_inside) = nearest_on_axis(lons, lon)?;
                Some((y * lons.len() + x, y_inside && x_inside))
            }
            SourceGrid::Lambert(p) => {
                let (i, j) = p.geo_to_grid(lat, lon);
                Some(snap(i, j, p.nx, p.ny))
            }
            SourceGrid::Geostationary(p) => {
                let (i, j) = p.geo_to_grid(lat, lon)?;
                Some(snap(i, j, p.nx, p.ny))
            }
        }
    }
}

/// Rounds fractional indices to the nearest cell, clamped into the grid;
/// the flag reports whether the unclamped point was inside.
fn snap(i: f64, j: f64, nx: usize, ny: usize) -> (usize, bool) {
    let ri = i.round();
    let rj = j.round();
    let inside =
        ri >= 0.0 && ri < nx as f64 && rj >= 0.0 && rj < ny as f64 && i.is_finite() && j.is_finite();
    let ci = ri.clamp(0.0, nx as f64 - 1.0) as usize;
    let cj = rj.clamp(0.0, ny as f64 - 1.0) as usize;
    (cj * nx + ci, inside)
}

/// Index of the axis value nearest `v`, plus whether `v` lies between the
/// axis ends. Handles ascending and descending axes.
fn nearest_on_axis(axis: &[f64], v: f64) -> Option<(usize, bool)> {
    if axis.is_empty() {
        return None;
    }
    let last = axis.len() - 1;
    let ascending = axis[0] <= axis[last];
    let inside = if ascending {
        v >= axis[0] && v <= axis[last]
    } else {
        v <= axis[0] && v >= axis[last]
    };

    let p = if ascending {
        axis.partition_point(|a| *a < v)
    } else {
        axis.partition_point(|a| *a > v)
    };
    let idx = if p == 0 {
        0
    } else if p > last {
        last
    } else if (axis[p - 1] - v).abs() <= (axis[p] - v).abs() {
        p - 1
    } else {
        p
    };
    Some((idx, inside))
}

/// Nearest-neighbor resampler.
///
/// With extrapolation off, target cells outside the source domain become
/// NaN; with it on, they take the nearest edge cell.
#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    extrapolate: bool,
}

impl Resampler {
    pub fn new(extrapolate: bool) -> Self {
        Self { extrapolate }
    }

    /// Resamples one source plane onto the target grid, row-major
    /// latitude-outer to match stack layout.
    pub fn plane(
        &self,
        source: &SourceGrid,
        values: &[f32],
        target: &GridSpec,
    ) -> StormResult<Vec<f32>> {
        if values.len() != source.len() {
            return Err(StormError::ShapeMismatch {
                expected: source.len(),
                got: values.len(),
            });
        }

        let lats = target.lats();
        let lons = target.lons();
        let mut out = Vec::with_capacity(lats.len() * lons.len());
        for lat in &lats {
            for lon in &lons {
                let value = match source.nearest(*lat, *lon) {
                    Some((idx, inside)) if inside || self.extrapolate => values[idx],
                    _ => f32::NAN,
                };
                out.push(value);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular_source() -> (SourceGrid, Vec<f32>) {
        // 4x4 source, ascending axes, value = row * 10 + col.
        let lats: Vec<f64> = (0..4).map(|i| 30.0 + 0.1 * i as f64).collect();
        let lons: Vec<f64> = (0..4).map(|i| -100.0 + 0.1 * i as f64).collect();
        let values: Vec<f32> = (0..16).map(|i| ((i / 4) * 10 + i % 4) as f32).collect();
        (SourceGrid::RegularLatLon { lats, lons }, values)
    }

    #[test]
    fn identity_when_target_matches_source() {
        let (source, values) = regular_source();
        let target = GridSpec::new(4, 4, -100.0, 30.0, 0.1, 0.1);
        let out = Resampler::new(false).plane(&source, &values, &target).unwrap();
        assert_eq!(out, values);
    }

    #[test]
    fn offset_target_picks_nearest_cells() {
        let (source, values) = regular_source();
        // Shifted by under half a cell: still snaps to the same column/row.
        let target = GridSpec::new(2, 2, -99.96, 30.04, 0.1, 0.1);
        let out = Resampler::new(false).plane(&source, &values, &target).unwrap();
        assert_eq!(out, vec![0.0, 1.0, 10.0, 11.0]);
    }

    #[test]
    fn outside_cells_are_nan_without_extrapolation() {
        let (source, values) = regular_source();
        let target = GridSpec::new(2, 1, -100.2, 30.0, 0.2, 0.1);
        let out = Resampler::new(false).plane(&source, &values, &target).unwrap();
        assert!(out[0].is_nan(), "west of the domain should be NaN");
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn outside_cells_clamp_with_extrapolation() {
        let (source, values) = regular_source();
        let target = GridSpec::new(2, 1, -100.2, 30.0, 0.2, 0.1);
        let out = Resampler::new(true).plane(&source, &values, &target).unwrap();
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn descending_latitude_axis_is_handled() {
        // MRMS grids run north to south.
        let lats: Vec<f64> = (0..4).map(|i| 30.3 - 0.1 * i as f64).collect();
        let lons: Vec<f64> = (0..4).map(|i| -100.0 + 0.1 * i as f64).collect();
        let values: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let source = SourceGrid::RegularLatLon { lats, lons };

        let target = GridSpec::new(1, 1, -100.0, 30.3, 0.1, 0.1);
        let out = Resampler::new(false).plane(&source, &values, &target).unwrap();
        // 30.3 is the first source row.
        assert_eq!(out, vec![0.0]);
    }

    #[test]
    fn lambert_source_resolves_through_the_projection() {
        let proj = LambertConformal::new(
            35.0, -100.0, -97.5, 38.5, 38.5, 3000.0, 3000.0, 10, 10,
        );
        let (lat, lon) = proj.grid_to_geo(4.0, 5.0);
        let source = SourceGrid::Lambert(proj);
        let values: Vec<f32> = (0..100).map(|i| i as f32).collect();

        let target = GridSpec::new(1, 1, lon, lat, 0.02, 0.02);
        let out = Resampler::new(false).plane(&source, &values, &target).unwrap();
        assert_eq!(out, vec![54.0]);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let (source, _) = regular_source();
        let target = GridSpec::new(2, 2, -100.0, 30.0, 0.1, 0.1);
        let err = Resampler::new(false)
            .plane(&source, &[1.0; 3], &target)
            .unwrap_err();
        assert!(matches!(err, StormError::ShapeMismatch { .. }));
    }
}

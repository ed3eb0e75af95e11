//! Target grid descriptor and its on-disk text form.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{StormError, StormResult};

/// Longitude bounds for random grid origins (CONUS interior).
pub const ORIGIN_LON_RANGE: (f64, f64) = (-116.1, -76.1);
/// Latitude bounds for random grid origins.
pub const ORIGIN_LAT_RANGE: (f64, f64) = (25.0, 45.0);

/// Specification of a regular lat/lon sample grid.
///
/// Cell centers sit at `first + i * inc` along each axis; rows run south to
/// north, columns west to east.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Number of points in X (longitude) direction
    pub nx: usize,
    /// Number of points in Y (latitude) direction
    pub ny: usize,
    /// First grid point longitude
    pub first_x: f64,
    /// First grid point latitude
    pub first_y: f64,
    /// Grid increment in degrees longitude
    pub dx: f64,
    /// Grid increment in degrees latitude
    pub dy: f64,
}

impl GridSpec {
    /// Create a new grid specification.
    pub fn new(nx: usize, ny: usize, first_x: f64, first_y: f64, dx: f64, dy: f64) -> Self {
        Self {
            nx,
            ny,
            first_x,
            first_y,
            dx,
            dy,
        }
    }

    /// Production sample grid: 250x250 cells at 0.02 degrees.
    pub fn sample_default(first_x: f64, first_y: f64) -> Self {
        Self::new(250, 250, first_x, first_y, 0.02, 0.02)
    }

    /// Draw a grid with a uniformly random origin inside the CONUS bounds,
    /// rounded to two decimal places.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, nx: usize, ny: usize, dx: f64, dy: f64) -> Self {
        let first_x = round2(rng.gen_range(ORIGIN_LON_RANGE.0..=ORIGIN_LON_RANGE.1));
        let first_y = round2(rng.gen_range(ORIGIN_LAT_RANGE.0..=ORIGIN_LAT_RANGE.1));
        Self::new(nx, ny, first_x, first_y, dx, dy)
    }

    /// Longitude of each column center.
    pub fn lons(&self) -> Vec<f64> {
        (0..self.nx)
            .map(|i| self.first_x + i as f64 * self.dx)
            .collect()
    }

    /// Latitude of each row center.
    pub fn lats(&self) -> Vec<f64> {
        (0..self.ny)
            .map(|j| self.first_y + j as f64 * self.dy)
            .collect()
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    /// Check if grid is empty.
    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0
    }

    /// Render the text form persisted as `grid.txt` alongside each sample.
    pub fn to_grid_text(&self) -> String {
        format!(
            "gridtype = lonlat\n\
             xsize    = {}\n\
             ysize    = {}\n\
             xfirst   = {}\n\
             xinc     = {}\n\
             yfirst   = {}\n\
             yinc     = {}\n",
            self.nx, self.ny, self.first_x, self.dx, self.first_y, self.dy
        )
    }

    /// Parse the `grid.txt` text form. Tolerates leading whitespace and
    /// ignores unknown keys.
    pub fn parse_grid_text(text: &str) -> StormResult<Self> {
        let mut gridtype = None;
        let mut xsize = None;
        let mut ysize = None;
        let mut xfirst = None;
        let mut xinc = None;
        let mut yfirst = None;
        let mut yinc = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| StormError::InvalidGrid(format!("malformed line: {}", line)))?;
            let key = key.trim();
            let value = value.trim();
            match key {
                "gridtype" => gridtype = Some(value.to_string()),
                "xsize" => xsize = Some(parse_num::<usize>(key, value)?),
                "ysize" => ysize = Some(parse_num::<usize>(key, value)?),
                "xfirst" => xfirst = Some(parse_num::<f64>(key, value)?),
                "xinc" => xinc = Some(parse_num::<f64>(key, value)?),
                "yfirst" => yfirst = Some(parse_num::<f64>(key, value)?),
                "yinc" => yinc = Some(parse_num::<f64>(key, value)?),
                _ => {}
            }
        }

        match gridtype.as_deref() {
            Some("lonlat") => {}
            Some(other) => {
                return Err(StormError::InvalidGrid(format!(
                    "unsupported gridtype: {}",
                    other
                )))
            }
            None => return Err(StormError::InvalidGrid("missing gridtype".to_string())),
        }

        Ok(Self {
            nx: xsize.ok_or_else(|| StormError::InvalidGrid("missing xsize".to_string()))?,
            ny: ysize.ok_or_else(|| StormError::InvalidGrid("missing ysize".to_string()))?,
            first_x: xfirst.ok_or_else(|| StormError::InvalidGrid("missing xfirst".to_string()))?,
            first_y: yfirst.ok_or_else(|| StormError::InvalidGrid("missing yfirst".to_string()))?,
            dx: xinc.ok_or_else(|| StormError::InvalidGrid("missing xinc".to_string()))?,
            dy: yinc.ok_or_else(|| StormError::InvalidGrid("missing yinc".to_string()))?,
        })
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> StormResult<T> {
    value
        .parse::<T>()
        .map_err(|_| StormError::InvalidGrid(format!("bad value for {}: {}", key, value)))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_grid_text_round_trip() {
        let grid = GridSpec::sample_default(-101.53, 31.27);
        let text = grid.to_grid_text();
        let parsed = GridSpec::parse_grid_text(&text).unwrap();
        assert_eq!(parsed, grid);
        assert_eq!(parsed.to_grid_text(), text);
    }

    #[test]
    fn test_parse_tolerates_indentation() {
        let text = "gridtype = lonlat\n  xsize = 10\n\tysize = 20\nxfirst = -100.0\nxinc = 0.02\nyfirst = 30.0\nyinc = 0.02\n";
        let parsed = GridSpec::parse_grid_text(text).unwrap();
        assert_eq!(parsed.nx, 10);
        assert_eq!(parsed.ny, 20);
    }

    #[test]
    fn test_parse_rejects_other_gridtypes() {
        let text = "gridtype = gaussian\nxsize = 10\nysize = 10\nxfirst = 0\nxinc = 1\nyfirst = 0\nyinc = 1\n";
        assert!(GridSpec::parse_grid_text(text).is_err());
    }

    #[test]
    fn test_random_origin_inside_bounds() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut lo_x = f64::INFINITY;
        let mut hi_x = f64::NEG_INFINITY;
        for _ in 0..2000 {
            let g = GridSpec::random(&mut rng, 250, 250, 0.02, 0.02);
            assert!(g.first_x >= ORIGIN_LON_RANGE.0 && g.first_x <= ORIGIN_LON_RANGE.1);
            assert!(g.first_y >= ORIGIN_LAT_RANGE.0 && g.first_y <= ORIGIN_LAT_RANGE.1);
            // two decimal places
            assert!((g.first_x * 100.0 - (g.first_x * 100.0).round()).abs() < 1e-6);
            lo_x = lo_x.min(g.first_x);
            hi_x = hi_x.max(g.first_x);
        }
        // draws spread over most of the range rather than clustering
        assert!(lo_x < ORIGIN_LON_RANGE.0 + 4.0);
        assert!(hi_x > ORIGIN_LON_RANGE.1 - 4.0);
    }

    #[test]
    fn test_coordinate_vectors() {
        let grid = GridSpec::new(3, 2, -100.0, 30.0, 0.5, 0.25);
        assert_eq!(grid.lons(), vec![-100.0, -99.5, -99.0]);
        assert_eq!(grid.lats(), vec![30.0, 30.25]);
        assert_eq!(grid.len(), 6);
    }
}

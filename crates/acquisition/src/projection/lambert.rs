//! Lambert Conformal Conic, the HRRR native projection.

use std::f64::consts::PI;

/// Lambert Conformal Conic grid.
///
/// Cone constants and the projected position of the first grid point are
/// precomputed at construction; `geo_to_grid` is pure arithmetic after that.
#[derive(Debug, Clone)]
pub struct LambertConformal {
    /// Central meridian in radians.
    lon0: f64,
    /// Grid spacing in meters.
    dx: f64,
    dy: f64,
    pub nx: usize,
    pub ny: usize,
    earth_radius: f64,
    /// Cone constant.
    n: f64,
    f: f64,
    rho0: f64,
    /// Projected coordinates of the first grid point, meters.
    x0: f64,
    y0: f64,
}

impl LambertConformal {
    /// Builds a projection from GRIB2-style grid parameters, all angles in
    /// degrees: first grid point, central meridian (LoV), and the two
    /// standard parallels.
    pub fn new(
        first_lat: f64,
        first_lon: f64,
        lov: f64,
        latin1: f64,
        latin2: f64,
        dx: f64,
        dy: f64,
        nx: usize,
        ny: usize,
    ) -> Self {
        let to_rad = PI / 180.0;
        let lat1 = first_lat * to_rad;
        let lon1 = first_lon * to_rad;
        let lon0 = lov * to_rad;
        let latin1 = latin1 * to_rad;
        let latin2 = latin2 * to_rad;

        let earth_radius = 6371229.0;

        // Tangent cone when the parallels coincide, secant otherwise.
        let n = if (latin1 - latin2).abs() < 1e-10 {
            latin1.sin()
        } else {
            (latin1.cos() / latin2.cos()).ln()
                / ((PI / 4.0 + latin2 / 2.0).tan() / (PI / 4.0 + latin1 / 2.0).tan()).ln()
        };
        let f = (latin1.cos() * (PI / 4.0 + latin1 / 2.0).tan().powf(n)) / n;
        let rho0 = earth_radius * f / (PI / 4.0 + lat1 / 2.0).tan().powf(n);

        let theta0 = n * normalize(lon1 - lon0);
        let x0 = rho0 * theta0.sin();
        let y0 = rho0 - rho0 * theta0.cos();

        Self {
            lon0,
            dx,
            dy,
            nx,
            ny,
            earth_radius,
            n,
            f,
            rho0,
            x0,
            y0,
        }
    }

    /// The operational HRRR CONUS grid: 1799 x 1059 points at 3 km, first
    /// point 21.138123N 122.719528W, LoV 97.5W, both parallels 38.5N.
    pub fn hrrr() -> Self {
        Self::new(
            21.138123,
            -122.719528,
            -97.5,
            38.5,
            38.5,
            3000.0,
            3000.0,
            1799,
            1059,
        )
    }

    /// Geographic coordinates in degrees to fractional grid indices
    /// `(i, j)`, column-first. Indices outside `[0, n)` mean the point falls
    /// off the grid.
    pub fn geo_to_grid(&self, lat: f64, lon: f64) -> (f64, f64) {
        let to_rad = PI / 180.0;
        let lat = lat * to_rad;
        let dlon = normalize(lon * to_rad - self.lon0);

        let rho = self.earth_radius * self.f / (PI / 4.0 + lat / 2.0).tan().powf(self.n);
        let theta = self.n * dlon;

        let x = rho * theta.sin();
        let y = self.rho0 - rho * theta.cos();

        ((x - self.x0) / self.dx, (y - self.y0) / self.dy)
    }

    /// Fractional grid indices back to geographic degrees `(lat, lon)`.
    pub fn grid_to_geo(&self, i: f64, j: f64) -> (f64, f64) {
        let x = self.x0 + i * self.dx;
        let y = self.y0 + j * self.dy;

        let rho = (x * x + (self.rho0 - y) * (self.rho0 - y)).sqrt();
        let rho = if self.n < 0.0 { -rho } else { rho };
        let theta = (x / (self.rho0 - y)).atan();

        let lat = 2.0 * ((self.earth_radius * self.f / rho).powf(1.0 / self.n)).atan() - PI / 2.0;
        let lon = self.lon0 + theta / self.n;

        (lat * 180.0 / PI, lon * 180.0 / PI)
    }
}

/// Wraps a longitude difference into `[-PI, PI]`.
fn normalize(mut dlon: f64) -> f64 {
    while dlon > PI {
        dlon -= 2.0 * PI;
    }
    while dlon < -PI {
        dlon += 2.0 * PI;
    }
    dlon
}

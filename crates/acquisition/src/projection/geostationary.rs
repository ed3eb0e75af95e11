//! GOES-R geostationary projection.
//!
//! Scan-angle math follows the GOES-R Product Definition and Users' Guide,
//! Volume 4, Section 4.2.8.

/// Geostationary view geometry plus the fixed-grid layout of one ABI file.
///
/// The grid layout (origin, spacing, shape) comes from the file's `x`/`y`
/// coordinate variables; the view geometry from its
/// `goes_imager_projection` attributes.
#[derive(Debug, Clone)]
pub struct Geostationary {
    /// Satellite distance from Earth center in meters.
    h: f64,
    /// Ellipsoid semi-major axis in meters.
    req: f64,
    /// Ellipsoid semi-minor axis in meters.
    rpol: f64,
    /// Satellite nadir longitude in radians.
    lambda0: f64,
    /// Scan angle of the first column/row in radians.
    x_origin: f64,
    y_origin: f64,
    /// Scan-angle step per column/row in radians (dy is negative, rows run
    /// north to south).
    dx: f64,
    dy: f64,
    pub nx: usize,
    pub ny: usize,
}

impl Geostationary {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        perspective_point_height: f64,
        semi_major_axis: f64,
        semi_minor_axis: f64,
        nadir_lon_deg: f64,
        x_origin: f64,
        y_origin: f64,
        dx: f64,
        dy: f64,
        nx: usize,
        ny: usize,
    ) -> Self {
        Self {
            h: perspective_point_height + semi_major_axis,
            req: semi_major_axis,
            rpol: semi_minor_axis,
            lambda0: nadir_lon_deg.to_radians(),
            x_origin,
            y_origin,
            dx,
            dy,
            nx,
            ny,
        }
    }

    /// The GOES-16 CONUS sector on the 2 km fixed grid (MCMIP layout).
    pub fn goes16_conus() -> Self {
        Self::new(
            35786023.0,
            6378137.0,
            6356752.31414,
            -75.0,
            -0.101332,
            0.128212,
            0.000056,
            -0.000056,
            2500,
            1500,
        )
    }

    /// Geographic degrees to scan angles in radians. `None` when the point
    /// is beyond the limb as seen from the satellite.
    pub fn geo_to_scan(&self, lat_deg: f64, lon_deg: f64) -> Option<(f64, f64)> {
        let lat = lat_deg.to_radians();
        let lon = lon_deg.to_radians();

        // Geocentric latitude on the oblate ellipsoid.
        let phi_c = ((self.rpol / self.req).powi(2) * lat.tan()).atan();
        let e2 = 1.0 - (self.rpol / self.req).powi(2);
        let rc = self.rpol / (1.0 - e2 * phi_c.cos().powi(2)).sqrt();

        let sx = self.h - rc * phi_c.cos() * (lon - self.lambda0).cos();
        let sy = -rc * phi_c.cos() * (lon - self.lambda0).sin();
        let sz = rc * phi_c.sin();

        // Visibility test from the PUG: the sight line must not pass
        // through the ellipsoid.
        if self.h * (self.h - sx) < sy * sy + (self.req / self.rpol).powi(2) * sz * sz {
            return None;
        }

        let x = (-sy).atan2(sx);
        let y = sz.atan2(sx.hypot(sy));
        Some((x, y))
    }

    /// Scan angles in radians back to geographic degrees `(lat, lon)`.
    /// `None` when the scan angle points past the Earth into space.
    pub fn scan_to_geo(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let (sin_x, cos_x) = x.sin_cos();
        let (sin_y, cos_y) = y.sin_cos();

        let a = sin_x.powi(2)
            + cos_x.powi(2) * (cos_y.powi(2) + (self.req / self.rpol).powi(2) * sin_y.powi(2));
        let b = -2.0 * self.h * cos_x * cos_y;
        let c = self.h.powi(2) - self.req.powi(2);

        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return None;
        }
        let rs = (-b - disc.sqrt()) / (2.0 * a);

        let sx = rs * cos_x * cos_y;
        let sy = -rs * sin_x;
        let sz = rs * cos_x * sin_y;

        let lat = ((self.req / self.rpol).powi(2) * sz / (self.h - sx).hypot(sy)).atan();
        let lon = self.lambda0 - sy.atan2(self.h - sx);

        Some((lat.to_degrees(), lon.to_degrees()))
    }

    /// Geographic degrees to fractional grid indices `(i, j)`. `None` when
    /// the point is not visible from the satellite at all.
    pub fn geo_to_grid(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        let (x, y) = self.geo_to_scan(lat, lon)?;
        Some(((x - self.x_origin) / self.dx, (y - self.y_origin) / self.dy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nadir_scan_angle_is_the_subsatellite_point() {
        let proj = Geostationary::goes16_conus();
        let (lat, lon) = proj.scan_to_geo(0.0, 0.0).unwrap();
        assert!(lat.abs() < 0.1, "nadir latitude should be ~0, got {}", lat);
        assert!(
            (lon + 75.0).abs() < 0.1,
            "nadir longitude should be ~-75, got {}",
            lon
        );
    }

    #[test]
    fn scan_round_trip_through_geo() {
        let proj = Geostationary::goes16_conus();
        let (lat, lon) = proj.scan_to_geo(-0.02, 0.08).unwrap();
        let (x, y) = proj.geo_to_scan(lat, lon).unwrap();
        assert!((x + 0.02).abs() < 1e-9);
        assert!((y - 0.08).abs() < 1e-9);
    }

    #[test]
    fn conus_interior_lands_inside_the_sector() {
        let proj = Geostationary::goes16_conus();
        let (i, j) = proj.geo_to_grid(39.0, -95.0).unwrap();
        assert!(i > 0.0 && i < 2500.0, "i out of sector: {}", i);
        assert!(j > 0.0 && j < 1500.0, "j out of sector: {}", j);
    }

    #[test]
    fn far_side_of_earth_is_not_visible() {
        let proj = Geostationary::goes16_conus();
        assert!(proj.geo_to_scan(0.0, 105.0).is_none());
    }
}

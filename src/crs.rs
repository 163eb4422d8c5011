//! CRS normalization
//!
//! Converts points between the geographic frame (EPSG:4326 degrees) and a
//! metric UTM frame on the GRS80 ellipsoid (ETRS89 / UTM, EPSG:258xx).
//! Distances are only ever measured between `MetricPoint`s; geometry that is
//! stored or exported stays geographic.
//!
//! The projection is transverse Mercator evaluated with the Krüger series to
//! sixth order in the third flattening, which keeps forward/inverse round trips
//! well below a millimetre inside a UTM zone.

use crate::error::ComputeError;
use crate::types::{GeoPoint, MetricPoint};

/// GRS80 semi-major axis (m)
const GRS80_A: f64 = 6_378_137.0;
/// GRS80 flattening
const GRS80_F: f64 = 1.0 / 298.257_222_101;
/// UTM scale factor on the central meridian
const UTM_K0: f64 = 0.9996;
/// UTM false easting (m)
const UTM_FALSE_EASTING: f64 = 500_000.0;
/// Farthest longitude from the central meridian the series is trusted for
const MAX_MERIDIAN_OFFSET_DEG: f64 = 60.0;

/// Transverse Mercator projection for one northern-hemisphere UTM zone
#[derive(Debug, Clone)]
pub struct UtmProjection {
    zone: u8,
    central_meridian: f64,
    /// First eccentricity
    e: f64,
    /// Rectifying radius scaled by k0
    k0_a: f64,
    alpha: [f64; 6],
    beta: [f64; 6],
}

impl UtmProjection {
    /// Create a projection for the given UTM zone (1-60)
    pub fn new(zone: u8) -> Result<Self, ComputeError> {
        if !(1..=60).contains(&zone) {
            return Err(ComputeError::Projection(format!(
                "UTM zone must be within 1..=60, got {zone}"
            )));
        }

        let n = GRS80_F / (2.0 - GRS80_F);
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;
        let n6 = n5 * n;

        let rectifying = GRS80_A / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0 + n6 / 256.0);

        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0 + 41.0 * n4 / 180.0 - 127.0 * n5 / 288.0
                + 7891.0 * n6 / 37800.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0 + 557.0 * n4 / 1440.0 + 281.0 * n5 / 630.0
                - 1_983_433.0 * n6 / 1_935_360.0,
            61.0 * n3 / 240.0 - 103.0 * n4 / 140.0 + 15061.0 * n5 / 26880.0
                + 167_603.0 * n6 / 181_440.0,
            49561.0 * n4 / 161_280.0 - 179.0 * n5 / 168.0 + 6_601_661.0 * n6 / 7_257_600.0,
            34729.0 * n5 / 80640.0 - 3_418_889.0 * n6 / 1_995_840.0,
            212_378_941.0 * n6 / 319_334_400.0,
        ];

        let beta = [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0 - n4 / 360.0 - 81.0 * n5 / 512.0
                + 96199.0 * n6 / 604_800.0,
            n2 / 48.0 + n3 / 15.0 - 437.0 * n4 / 1440.0 + 46.0 * n5 / 105.0
                - 1_118_711.0 * n6 / 3_870_720.0,
            17.0 * n3 / 480.0 - 37.0 * n4 / 840.0 - 209.0 * n5 / 4480.0 + 5569.0 * n6 / 90720.0,
            4397.0 * n4 / 161_280.0 - 11.0 * n5 / 504.0 - 830_251.0 * n6 / 7_257_600.0,
            4583.0 * n5 / 161_280.0 - 108_847.0 * n6 / 3_991_680.0,
            20_648_693.0 * n6 / 638_668_800.0,
        ];

        Ok(Self {
            zone,
            central_meridian: f64::from(zone) * 6.0 - 183.0,
            e: (GRS80_F * (2.0 - GRS80_F)).sqrt(),
            k0_a: UTM_K0 * rectifying,
            alpha,
            beta,
        })
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    /// Central meridian of the zone (degrees)
    pub fn central_meridian(&self) -> f64 {
        self.central_meridian
    }

    /// Project a geographic point into the metric frame
    pub fn to_metric(&self, point: &GeoPoint) -> Result<MetricPoint, ComputeError> {
        if !point.is_valid() || point.lat.abs() >= 90.0 {
            return Err(ComputeError::Projection(format!(
                "coordinates out of range: lon={}, lat={}",
                point.lon, point.lat
            )));
        }
        let dlon_deg = point.lon - self.central_meridian;
        if dlon_deg.abs() > MAX_MERIDIAN_OFFSET_DEG {
            return Err(ComputeError::Projection(format!(
                "longitude {} is too far from the zone {} central meridian",
                point.lon, self.zone
            )));
        }

        let phi = point.lat.to_radians();
        let dlon = dlon_deg.to_radians();
        let e = self.e;

        // Conformal latitude, as its tangent
        let sin_phi = phi.sin();
        let t = (sin_phi.atanh() - e * (e * sin_phi).atanh()).sinh();

        let xi_prime = t.atan2(dlon.cos());
        let eta_prime = (dlon.sin() / (1.0 + t * t).sqrt()).atanh();

        let mut xi = xi_prime;
        let mut eta = eta_prime;
        for (j, a) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j as f64 + 1.0);
            xi += a * (k * xi_prime).sin() * (k * eta_prime).cosh();
            eta += a * (k * xi_prime).cos() * (k * eta_prime).sinh();
        }

        Ok(MetricPoint {
            easting: UTM_FALSE_EASTING + self.k0_a * eta,
            northing: self.k0_a * xi,
        })
    }

    /// Unproject a metric point back into the geographic frame
    pub fn to_geographic(&self, point: &MetricPoint) -> Result<GeoPoint, ComputeError> {
        if !point.easting.is_finite() || !point.northing.is_finite() {
            return Err(ComputeError::Projection(format!(
                "non-finite metric coordinates: easting={}, northing={}",
                point.easting, point.northing
            )));
        }

        let xi = point.northing / self.k0_a;
        let eta = (point.easting - UTM_FALSE_EASTING) / self.k0_a;

        let mut xi_prime = xi;
        let mut eta_prime = eta;
        for (j, b) in self.beta.iter().enumerate() {
            let k = 2.0 * (j as f64 + 1.0);
            xi_prime -= b * (k * xi).sin() * (k * eta).cosh();
            eta_prime -= b * (k * xi).cos() * (k * eta).sinh();
        }

        let chi = (xi_prime.sin() / eta_prime.cosh()).asin();
        let dlon = eta_prime.sinh().atan2(xi_prime.cos());
        let phi = self.geodetic_latitude(chi);

        Ok(GeoPoint {
            lon: self.central_meridian + dlon.to_degrees(),
            lat: phi.to_degrees(),
        })
    }

    /// Recover geodetic latitude from conformal latitude by fixed-point iteration
    fn geodetic_latitude(&self, chi: f64) -> f64 {
        let e = self.e;
        let half_pi = std::f64::consts::FRAC_PI_2;
        let base = (std::f64::consts::FRAC_PI_4 + chi / 2.0).tan();

        let mut phi = chi;
        for _ in 0..20 {
            let es = e * phi.sin();
            let next = 2.0 * (base * ((1.0 + es) / (1.0 - es)).powf(e / 2.0)).atan() - half_pi;
            if (next - phi).abs() < 1e-14 {
                return next;
            }
            phi = next;
        }
        phi
    }
}

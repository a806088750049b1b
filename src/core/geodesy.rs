//! UTM zone handling and transverse Mercator projection
//!
//! Soundings are georeferenced in the UTM zone the ship is in, and crossline
//! zones must be reconciled with the reference surface zone, so the
//! projection has to round-trip cleanly. The forward and inverse mappings
//! use the Krueger series in the third flattening, which is accurate to
//! well under a millimeter over a zone; the direct WGS84 implementation
//! keeps the pipeline free of external projection databases.

use std::fmt;
use std::str::FromStr;

use crate::types::{SwathError, SwathResult};

/// WGS84 semi-major axis (meters)
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// UTM central scale factor
const K0: f64 = 0.9996;
/// UTM false easting (meters)
const FALSE_EASTING: f64 = 500_000.0;
/// UTM false northing on the southern hemisphere (meters)
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A UTM zone: longitudinal band number plus hemisphere
///
/// The canonical text form is the zone number followed by a hemisphere
/// letter, `19N` or `19S`. MGRS latitude band letters are accepted on parse
/// (bands C through M are southern, N through X northern) but never emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtmZone {
    pub number: u8,
    pub south: bool,
}

impl UtmZone {
    pub fn new(number: u8, south: bool) -> SwathResult<Self> {
        if !(1..=60).contains(&number) {
            return Err(SwathError::InvalidInput(format!(
                "UTM zone number {} outside 1-60",
                number
            )));
        }
        Ok(UtmZone { number, south })
    }

    /// Zone containing a geographic position
    pub fn for_position(lat_deg: f64, lon_deg: f64) -> Self {
        let lon = normalize_lon(lon_deg);
        let number = ((lon + 180.0) / 6.0).floor() as u8 + 1;
        UtmZone {
            number: number.min(60),
            south: lat_deg < 0.0,
        }
    }

    /// Central meridian of the zone (degrees)
    pub fn central_meridian_deg(&self) -> f64 {
        (self.number as f64 - 1.0) * 6.0 - 180.0 + 3.0
    }

    fn false_northing(&self) -> f64 {
        if self.south {
            FALSE_NORTHING_SOUTH
        } else {
            0.0
        }
    }
}

impl fmt::Display for UtmZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, if self.south { 'S' } else { 'N' })
    }
}

impl FromStr for UtmZone {
    type Err = SwathError;

    fn from_str(s: &str) -> SwathResult<Self> {
        let s = s.trim();
        let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
        let rest = s[digits.len()..].trim();
        let number: u8 = digits
            .parse()
            .map_err(|_| SwathError::InvalidInput(format!("unparseable UTM zone '{}'", s)))?;
        let mut letters = rest.chars();
        let (letter, trailing) = (letters.next(), letters.next());
        let south = match (letter.map(|c| c.to_ascii_uppercase()), trailing) {
            (Some('S'), None) => true,
            (Some('N'), None) => false,
            // MGRS latitude bands: C-M south of the equator, N-X north
            (Some(band @ 'C'..='X'), None) if band != 'I' && band != 'O' => band < 'N',
            _ => {
                return Err(SwathError::InvalidInput(format!(
                    "unparseable UTM zone '{}'",
                    s
                )))
            }
        };
        UtmZone::new(number, south)
    }
}

fn normalize_lon(lon_deg: f64) -> f64 {
    let mut lon = (lon_deg + 180.0) % 360.0;
    if lon < 0.0 {
        lon += 360.0;
    }
    lon - 180.0
}

/// Third flattening and derived series constants, shared by both directions
struct Krueger {
    /// Rectifying radius
    radius: f64,
    /// First eccentricity
    e: f64,
    /// Forward series coefficients
    alpha: [f64; 6],
    /// Inverse series coefficients
    beta: [f64; 6],
}

impl Krueger {
    fn wgs84() -> Self {
        let n = WGS84_F / (2.0 - WGS84_F);
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;
        let n6 = n5 * n;

        let radius = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0 + n6 / 256.0);
        let e = (WGS84_F * (2.0 - WGS84_F)).sqrt();

        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0 + 41.0 * n4 / 180.0 - 127.0 * n5 / 288.0
                + 7891.0 * n6 / 37800.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0 + 557.0 * n4 / 1440.0 + 281.0 * n5 / 630.0
                - 1983433.0 * n6 / 1935360.0,
            61.0 * n3 / 240.0 - 103.0 * n4 / 140.0 + 15061.0 * n5 / 26880.0
                + 167603.0 * n6 / 181440.0,
            49561.0 * n4 / 161280.0 - 179.0 * n5 / 168.0 + 6601661.0 * n6 / 7257600.0,
            34729.0 * n5 / 80640.0 - 3418889.0 * n6 / 1995840.0,
            212378941.0 * n6 / 319334400.0,
        ];
        let beta = [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0 - n4 / 360.0 - 81.0 * n5 / 512.0
                + 96199.0 * n6 / 604800.0,
            n2 / 48.0 + n3 / 15.0 - 437.0 * n4 / 1440.0 + 46.0 * n5 / 105.0
                - 1118711.0 * n6 / 3870720.0,
            17.0 * n3 / 480.0 - 37.0 * n4 / 840.0 - 209.0 * n5 / 4480.0 + 5569.0 * n6 / 90720.0,
            4397.0 * n4 / 161280.0 - 11.0 * n5 / 504.0 - 830251.0 * n6 / 7257600.0,
            4583.0 * n5 / 161280.0 - 108847.0 * n6 / 3991680.0,
            20648693.0 * n6 / 638668800.0,
        ];
        Krueger {
            radius,
            e,
            alpha,
            beta,
        }
    }
}

/// Project a geographic position into a given UTM zone
///
/// Returns (easting, northing) in meters. Valid for survey latitudes (away
/// from the poles); the zone need not be the one containing the position,
/// which is what makes neighboring-zone reconciliation possible.
pub fn geodetic_to_utm(lat_deg: f64, lon_deg: f64, zone: UtmZone) -> (f64, f64) {
    let k = Krueger::wgs84();
    let lat = lat_deg.to_radians();
    let dlon = (normalize_lon(lon_deg) - zone.central_meridian_deg()).to_radians();

    let sin_lat = lat.sin();
    // Conformal latitude via the isometric latitude
    let t = (sin_lat.atanh() - k.e * (k.e * sin_lat).atanh()).sinh();

    let xi_p = t.atan2(dlon.cos());
    let eta_p = (dlon.sin() / (t * t + dlon.cos() * dlon.cos()).sqrt()).asinh();

    let mut xi = xi_p;
    let mut eta = eta_p;
    for (j, a) in k.alpha.iter().enumerate() {
        let w = 2.0 * (j as f64 + 1.0);
        xi += a * (w * xi_p).sin() * (w * eta_p).cosh();
        eta += a * (w * xi_p).cos() * (w * eta_p).sinh();
    }

    let easting = FALSE_EASTING + K0 * k.radius * eta;
    let northing = zone.false_northing() + K0 * k.radius * xi;
    (easting, northing)
}

/// Invert a UTM position back to geographic coordinates
///
/// Returns (latitude, longitude) in degrees.
pub fn utm_to_geodetic(easting: f64, northing: f64, zone: UtmZone) -> (f64, f64) {
    let k = Krueger::wgs84();
    let xi = (northing - zone.false_northing()) / (K0 * k.radius);
    let eta = (easting - FALSE_EASTING) / (K0 * k.radius);

    let mut xi_p = xi;
    let mut eta_p = eta;
    for (j, b) in k.beta.iter().enumerate() {
        let w = 2.0 * (j as f64 + 1.0);
        xi_p -= b * (w * xi).sin() * (w * eta).cosh();
        eta_p -= b * (w * xi).cos() * (w * eta).sinh();
    }

    let t = xi_p.sin() / (eta_p.sinh().powi(2) + xi_p.cos().powi(2)).sqrt();
    let psi = t.asinh();

    // Fixed-point recovery of sin(lat) from the conformal latitude
    let mut s = psi.tanh();
    for _ in 0..20 {
        let next = (psi + k.e * (k.e * s).atanh()).tanh();
        if (next - s).abs() < 1e-15 {
            s = next;
            break;
        }
        s = next;
    }

    let lat = s.asin().to_degrees();
    let lon = zone.central_meridian_deg() + eta_p.sinh().atan2(xi_p.cos()).to_degrees();
    (lat, normalize_lon(lon))
}

/// Re-project UTM coordinates from one zone into another
///
/// Same-zone input is returned unchanged, so the transform is idempotent.
pub fn utm_to_utm(easting: f64, northing: f64, from: UtmZone, to: UtmZone) -> (f64, f64) {
    if from == to {
        return (easting, northing);
    }
    let (lat, lon) = utm_to_geodetic(easting, northing, from);
    geodetic_to_utm(lat, lon, to)
}

/// Project a geographic position into its own UTM zone
pub fn utm_for_position(lat_deg: f64, lon_deg: f64) -> (f64, f64, UtmZone) {
    let zone = UtmZone::for_position(lat_deg, lon_deg);
    let (easting, northing) = geodetic_to_utm(lat_deg, lon_deg, zone);
    (easting, northing, zone)
}

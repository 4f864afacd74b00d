//! Pure-Rust WGS84 ↔ UTM / Web Mercator transforms (Snyder 1987, USGS formulas).
//!
//! Covers EPSG 4326, 3857, 326xx (UTM North) and 327xx (UTM South), which
//! handles every Sentinel-2 tile CRS. No libproj.

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const E2: f64 = 2.0 * F - F * F; // eccentricity squared
const E_PRIME2: f64 = E2 / (1.0 - E2); // second eccentricity squared
const K0: f64 = 0.9996; // UTM scale factor
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Edge samples used when projecting a bounding box.
const BOUNDS_DENSIFY: usize = 21;

/// Projection math for a supported CRS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Longitude/latitude in degrees (EPSG:4326)
    Geographic,
    /// Spherical Web Mercator in metres (EPSG:3857)
    WebMercator,
    /// Universal Transverse Mercator zone in metres
    Utm { zone: u32, north: bool },
}

impl Projection {
    /// Resolve an EPSG code, `None` if unsupported.
    ///
    /// - EPSG 326xx → zone xx, North hemisphere
    /// - EPSG 327xx → zone xx, South hemisphere
    pub fn from_epsg(epsg: u32) -> Option<Self> {
        match epsg {
            4326 => Some(Self::Geographic),
            3857 => Some(Self::WebMercator),
            32601..=32660 => Some(Self::Utm {
                zone: epsg - 32600,
                north: true,
            }),
            32701..=32760 => Some(Self::Utm {
                zone: epsg - 32700,
                north: false,
            }),
            _ => None,
        }
    }

    /// Project WGS84 (lon, lat) degrees into this projection.
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        match *self {
            Self::Geographic => (lon, lat),
            Self::WebMercator => {
                let x = A * lon.to_radians();
                let y = A * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
                (x, y)
            }
            Self::Utm { zone, north } => wgs84_to_utm(lon, lat, zone, north),
        }
    }

    /// Unproject coordinates of this projection back to WGS84 (lon, lat).
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Self::Geographic => (x, y),
            Self::WebMercator => {
                let lon = (x / A).to_degrees();
                let lat = (2.0 * (y / A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
                (lon, lat)
            }
            Self::Utm { zone, north } => utm_to_wgs84(x, y, zone, north),
        }
    }

    /// Transform a point from `self` into `to`.
    pub fn transform(&self, to: &Projection, x: f64, y: f64) -> (f64, f64) {
        if self == to {
            return (x, y);
        }
        let (lon, lat) = self.inverse(x, y);
        to.forward(lon, lat)
    }
}

/// EPSG code of the UTM zone containing (lon, lat).
pub fn utm_epsg_for(lon: f64, lat: f64) -> u32 {
    let zone = (((lon + 180.0) / 6.0).floor() as i64).clamp(0, 59) as u32 + 1;
    if lat >= 0.0 {
        32600 + zone
    } else {
        32700 + zone
    }
}

/// Project a bounding box `(min_x, min_y, max_x, max_y)` and return the
/// envelope of the densified outline in the target projection.
pub fn transform_bounds(
    from: &Projection,
    to: &Projection,
    bounds: (f64, f64, f64, f64),
) -> (f64, f64, f64, f64) {
    let (min_x, min_y, max_x, max_y) = bounds;
    if from == to {
        return bounds;
    }

    let mut out = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    let steps = BOUNDS_DENSIFY - 1;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = min_x + t * (max_x - min_x);
        let y = min_y + t * (max_y - min_y);
        for (px, py) in [(x, min_y), (x, max_y), (min_x, y), (max_x, y)] {
            let (tx, ty) = from.transform(to, px, py);
            out.0 = out.0.min(tx);
            out.1 = out.1.min(ty);
            out.2 = out.2.max(tx);
            out.3 = out.3.max(ty);
        }
    }
    out
}

// ── UTM (Snyder 1987, USGS Prof. Paper 1395, pp. 61-64) ──────────────────

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = central_meridian(zone);

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a_coeff = cos_lat * (lon - lon0);
    let m = meridional_arc(lat);

    let a2 = a_coeff * a_coeff;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    // Snyder eq. 8-9
    let easting = K0
        * n
        * (a_coeff
            + (1.0 - t + c) * a2 * a_coeff / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a_coeff / 120.0)
        + FALSE_EASTING;

    // Snyder eq. 8-10
    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    if north {
        (easting, northing)
    } else {
        (easting, northing + FALSE_NORTHING_SOUTH)
    }
}

fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let sqrt_1_e2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);

    // Footpoint latitude (Snyder eq. 3-26, 7-19)
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi = phi1.sin();
    let cos_phi = phi1.cos();
    let tan_phi = phi1.tan();

    let c1 = E_PRIME2 * cos_phi * cos_phi;
    let t1 = tan_phi * tan_phi;
    let denom = 1.0 - E2 * sin_phi * sin_phi;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / denom.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    // Snyder eq. 8-17, 8-18
    let lat = phi1
        - (n1 * tan_phi / r1)
            * (d2 / 2.0 - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * E_PRIME2 - 3.0 * c1 * c1)
                    * d6
                    / 720.0);
    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos_phi;

    (lon.to_degrees(), lat.to_degrees())
}

/// Meridional arc from equator to latitude `lat` (radians). Snyder eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

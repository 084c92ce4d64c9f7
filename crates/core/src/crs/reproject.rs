//! Pure-Rust WGS84 → UTM reprojection (Snyder 1987, USGS formulas).
//!
//! NAD83 codes (4269, 269xx) are accepted as aliases of their WGS84
//! counterparts.
//!
//! Training-site and study-area polygons are commonly digitised in WGS84
//! while Landsat and Sentinel-2 scenes ship in UTM (EPSG 326xx / 327xx).
//! No external C dependencies (no libproj).

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::FeatureCollection;
use geo::MapCoords;
use geo_types::{Coord, Geometry};

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const E2: f64 = 2.0 * F - F * F; // eccentricity squared
const E_PRIME2: f64 = E2 / (1.0 - E2); // second eccentricity squared
const K0: f64 = 0.9996; // UTM scale factor
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A coordinate transform between two supported CRSs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Source and target are the same CRS
    Identity,
    /// WGS84 geographic (lon, lat) → UTM (easting, northing)
    Wgs84ToUtm { zone: u32, north: bool },
}

/// Where an EPSG code sits once NAD83 is taken as coincident with WGS84.
///
/// The two datums differ by one to two metres, well under a Landsat or
/// Sentinel-2 cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Geographic,
    Utm { zone: u32, north: bool },
}

fn frame_of(epsg: u32) -> Option<Frame> {
    if is_wgs84(epsg) || is_nad83(epsg) {
        return Some(Frame::Geographic);
    }
    parse_utm_epsg(epsg)
        .or_else(|| parse_nad83_utm_epsg(epsg))
        .map(|(zone, north)| Frame::Utm { zone, north })
}

impl Projection {
    /// Resolve the transform taking coordinates in `from` into `to`.
    pub fn between(from: &CRS, to: &CRS) -> Result<Self> {
        if from.is_equivalent(to) {
            return Ok(Projection::Identity);
        }

        let frames = (from.epsg().and_then(frame_of), to.epsg().and_then(frame_of));
        match frames {
            (Some(a), Some(b)) if a == b => Ok(Projection::Identity),
            (Some(Frame::Geographic), Some(Frame::Utm { zone, north })) => {
                Ok(Projection::Wgs84ToUtm { zone, north })
            }
            _ => Err(Error::CrsMismatch(from.to_string(), to.to_string())),
        }
    }

    /// Transform a single coordinate.
    pub fn apply(&self, c: Coord<f64>) -> Coord<f64> {
        match *self {
            Projection::Identity => c,
            Projection::Wgs84ToUtm { zone, north } => {
                let (x, y) = wgs84_to_utm(c.x, c.y, zone, north);
                Coord { x, y }
            }
        }
    }

    /// Transform every vertex of a geometry.
    pub fn apply_geometry(&self, geom: &Geometry<f64>) -> Geometry<f64> {
        match self {
            Projection::Identity => geom.clone(),
            _ => geom.map_coords(|c| self.apply(c)),
        }
    }
}

/// Reproject all features of a collection into `target`.
///
/// Collections without a CRS are assumed to already be in `target`.
pub fn reproject_features(features: &FeatureCollection, target: &CRS) -> Result<FeatureCollection> {
    let Some(source) = features.crs.as_ref() else {
        let mut out = features.clone();
        out.crs = Some(target.clone());
        return Ok(out);
    };

    let projection = Projection::between(source, target)?;
    let mut out = features.clone();
    for feature in out.features.iter_mut() {
        if let Some(geom) = feature.geometry.as_ref() {
            feature.geometry = Some(projection.apply_geometry(geom));
        }
    }
    out.crs = Some(target.clone());
    Ok(out)
}

/// Check if an EPSG code represents WGS84 geographic.
pub fn is_wgs84(epsg: u32) -> bool {
    epsg == 4326
}

/// Check if an EPSG code represents NAD83 geographic.
pub fn is_nad83(epsg: u32) -> bool {
    epsg == 4269
}

/// NAD83 / UTM (EPSG 26901-26923, northern hemisphere): `Some((zone, true))`.
pub fn parse_nad83_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    (26901..=26923).contains(&epsg).then(|| (epsg - 26900, true))
}

/// Parse an EPSG code into UTM zone info: `Some((zone, is_north))`.
///
/// - EPSG 326xx → zone xx, North hemisphere
/// - EPSG 327xx → zone xx, South hemisphere
pub fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    if (32601..=32660).contains(&epsg) {
        Some((epsg - 32600, true))
    } else if (32701..=32760).contains(&epsg) {
        Some((epsg - 32700, false))
    } else {
        None
    }
}

// ── Core projection (Snyder 1987, USGS Prof. Paper 1395, pp. 61-64) ─────

/// Convert WGS84 (longitude, latitude) in degrees to UTM (easting, northing)
/// in metres for the given zone and hemisphere.
pub fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();

    let lon0 = ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

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
    let easting = K0 * n
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

/// Meridional arc from equator to latitude `lat` (radians). Snyder eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Feature;
    use geo_types::{polygon, Point};

    fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
        let diff = (a - b).abs();
        assert!(diff < tol, "{msg}: expected {b}, got {a}, diff {diff} exceeds {tol}");
    }

    #[test]
    fn parse_utm_codes() {
        assert_eq!(parse_utm_epsg(32630), Some((30, true)));
        assert_eq!(parse_utm_epsg(32721), Some((21, false)));
        assert_eq!(parse_utm_epsg(4326), None);
        assert_eq!(parse_utm_epsg(32600), None);
        assert_eq!(parse_utm_epsg(32761), None);
    }

    // pyproj: Transformer.from_crs(4326, 32630, always_xy=True)
    //   .transform(-3.7037, 40.4168) → (440298.94, 4474257.31)
    #[test]
    fn madrid_wgs84_to_utm30n() {
        let (e, n) = wgs84_to_utm(-3.7037, 40.4168, 30, true);
        assert_close(e, 440_298.94, 1.0, "easting");
        assert_close(n, 4_474_257.31, 1.0, "northing");
    }

    #[test]
    fn buenos_aires_wgs84_to_utm21s() {
        let (e, n) = wgs84_to_utm(-58.3816, -34.6037, 21, false);
        assert_close(e, 373_317.50, 1.0, "easting");
        assert_close(n, 6_170_036.17, 1.0, "northing");
    }

    #[test]
    fn projection_resolution() {
        let wgs = CRS::wgs84();
        let utm = CRS::from_epsg(32630);
        assert_eq!(Projection::between(&utm, &utm).unwrap(), Projection::Identity);
        assert_eq!(
            Projection::between(&wgs, &utm).unwrap(),
            Projection::Wgs84ToUtm { zone: 30, north: true }
        );
        assert!(Projection::between(&utm, &wgs).is_err());
        assert!(Projection::between(&wgs, &CRS::from_epsg(3857)).is_err());
    }

    #[test]
    fn nad83_resolves_like_wgs84() {
        let nad83_utm = CRS::from_epsg(26911);
        let wgs84_utm = CRS::from_epsg(32611);
        assert_eq!(Projection::between(&nad83_utm, &wgs84_utm).unwrap(), Projection::Identity);
        assert_eq!(
            Projection::between(&CRS::from_epsg(4269), &nad83_utm).unwrap(),
            Projection::Wgs84ToUtm { zone: 11, north: true }
        );
        assert_eq!(
            Projection::between(&CRS::wgs84(), &nad83_utm).unwrap(),
            Projection::Wgs84ToUtm { zone: 11, north: true }
        );
        assert!(Projection::between(&nad83_utm, &CRS::from_epsg(26912)).is_err());
        assert_eq!(parse_nad83_utm_epsg(26924), None);
    }

    #[test]
    fn prj_layer_in_raster_crs_is_left_alone() {
        let prj = r#"PROJCS["NAD_1983_UTM_Zone_11N",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]]],PROJECTION["Transverse_Mercator"]]"#;
        let mut fc = FeatureCollection::new();
        fc.crs = Some(CRS::from_prj_wkt(prj));
        fc.push(Feature::new(Geometry::Point(Point::new(450_000.0, 3_800_000.0))));

        let out = reproject_features(&fc, &CRS::from_epsg(26911)).unwrap();
        match out.features[0].geometry.as_ref().unwrap() {
            Geometry::Point(p) => assert_eq!((p.x(), p.y()), (450_000.0, 3_800_000.0)),
            other => panic!("unexpected geometry {other:?}"),
        }
    }

    #[test]
    fn reproject_feature_collection() {
        let square = polygon![
            (x: -3.75, y: 40.40),
            (x: -3.70, y: 40.40),
            (x: -3.70, y: 40.45),
            (x: -3.75, y: 40.45),
            (x: -3.75, y: 40.40),
        ];
        let mut fc = FeatureCollection::new();
        fc.crs = Some(CRS::wgs84());
        fc.push(Feature::new(Geometry::Polygon(square)));
        fc.push(Feature::new(Geometry::Point(Point::new(-3.0, 0.0))));

        let out = reproject_features(&fc, &CRS::from_epsg(32630)).unwrap();
        assert_eq!(out.crs.as_ref().and_then(|c| c.epsg()), Some(32630));

        match out.features[1].geometry.as_ref().unwrap() {
            Geometry::Point(p) => {
                assert_close(p.x(), 500_000.0, 0.01, "easting at CM");
                assert_close(p.y(), 0.0, 0.01, "northing at equator");
            }
            other => panic!("unexpected geometry {other:?}"),
        }
        match out.features[0].geometry.as_ref().unwrap() {
            Geometry::Polygon(p) => assert!(p.exterior().0[0].x > 100_000.0),
            other => panic!("unexpected geometry {other:?}"),
        }
    }

    #[test]
    fn reproject_without_crs_assumes_target() {
        let mut fc = FeatureCollection::new();
        fc.push(Feature::new(Geometry::Point(Point::new(10.0, 20.0))));
        let out = reproject_features(&fc, &CRS::from_epsg(32633)).unwrap();
        match out.features[0].geometry.as_ref().unwrap() {
            Geometry::Point(p) => assert_eq!((p.x(), p.y()), (10.0, 20.0)),
            other => panic!("unexpected geometry {other:?}"),
        }
    }
}

//! Coordinate Reference System handling

pub mod reproject;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation (primary)
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
    /// PROJ string if available
    proj: Option<String>,
}

fn utm_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)PROJCS\["[^"]*UTM[ _]zone[ _](\d{1,2})([NS])"#)
            .expect("UTM zone pattern is a valid regex")
    })
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
            proj: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
            proj: None,
        }
    }

    /// Create a CRS from a PROJ string
    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            wkt: None,
            epsg: None,
            proj: Some(proj.into()),
        }
    }

    /// Create a CRS from the ESRI WKT found in a shapefile's `.prj` sidecar.
    ///
    /// WGS84 and NAD83 definitions (geographic, or UTM) resolve to their
    /// EPSG codes so they compare equal to rasters carrying GeoKey EPSG
    /// codes. Anything else is kept as WKT only.
    pub fn from_prj_wkt(wkt: &str) -> Self {
        let wkt = wkt.trim();
        let upper = wkt.to_ascii_uppercase();
        let nad83 = ["NAD_1983", "NAD83", "NAD 83", "NORTH_AMERICAN_1983", "NORTH AMERICAN 1983"]
            .iter()
            .any(|name| upper.contains(name));
        let wgs84 = !nad83 && upper.contains("WGS") && upper.contains("84");
        let with_epsg = |code: u32| Self {
            wkt: Some(wkt.to_string()),
            epsg: Some(code),
            proj: None,
        };

        if let Some(caps) = utm_name_pattern().captures(wkt) {
            let zone: u32 = caps[1].parse().unwrap_or(0);
            let north = caps[2].eq_ignore_ascii_case("N");
            if wgs84 && (1..=60).contains(&zone) {
                let base = if north { 32600 } else { 32700 };
                return with_epsg(base + zone);
            }
            // EPSG defines NAD83 / UTM for the northern zones 1-23 only
            if nad83 && north && (1..=23).contains(&zone) {
                return with_epsg(26900 + zone);
            }
        }

        if upper.starts_with("GEOGCS") {
            if nad83 {
                return with_epsg(4269);
            }
            if upper.contains("GCS_WGS_1984") || upper.contains("\"WGS 84\"") {
                return with_epsg(4326);
            }
        }

        Self::from_wkt(wkt)
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Get PROJ string
    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        // Textual comparison; does not normalise WKT
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        if let (Some(a), Some(b)) = (&self.proj, &other.proj) {
            return a == b;
        }

        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(proj) = &self.proj {
            return proj.clone();
        }
        if let Some(wkt) = &self.wkt {
            let head: String = wkt.chars().take(50).collect();
            return format!("WKT:{}", head);
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

//! Reading polygon layers: ESRI shapefiles and GeoJSON

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};
use geojson::{GeoJson, JsonValue};
use shapefile::dbase::FieldValue;
use shapefile::Shape;
use std::collections::HashMap;
use std::path::Path;

/// Read a vector layer, choosing the driver from the file extension.
///
/// - `.shp`: geometry from the `.shp`, attributes from the sibling `.dbf`,
///   CRS from the sibling `.prj` when present.
/// - `.geojson` / `.json`: RFC 7946 (WGS84) unless a legacy `crs` member
///   names an EPSG code.
pub fn read_features<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "shp" => read_shapefile(path),
        "geojson" | "json" => read_geojson(path),
        _ => Err(Error::Vector(format!(
            "unsupported vector format: {} (expected .shp, .geojson or .json)",
            path.display()
        ))),
    }
}

/// Read an ESRI shapefile with its `.dbf` attributes.
pub fn read_shapefile<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let path = path.as_ref();
    let mut reader = shapefile::Reader::from_path(path)?;

    let mut collection = FeatureCollection::new();
    for (index, item) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = item?;

        let geometry = match shape {
            Shape::NullShape => None,
            other => Some(geo_types::Geometry::<f64>::try_from(other).map_err(|e| {
                Error::Vector(format!("feature {index}: unsupported shape ({e:?})"))
            })?),
        };

        let fields: HashMap<String, FieldValue> = record.into();
        let properties = fields
            .into_iter()
            .map(|(name, value)| (name, field_to_attribute(value)))
            .collect();

        collection.push(Feature {
            geometry,
            properties,
            id: Some(index.to_string()),
        });
    }

    let prj = path.with_extension("prj");
    if prj.exists() {
        let wkt = std::fs::read_to_string(&prj)?;
        collection.crs = Some(CRS::from_prj_wkt(&wkt));
    }

    Ok(collection)
}

fn field_to_attribute(value: FieldValue) -> AttributeValue {
    match value {
        FieldValue::Character(Some(s)) => AttributeValue::String(s),
        FieldValue::Memo(s) => AttributeValue::String(s),
        FieldValue::Numeric(Some(n)) => AttributeValue::Float(n),
        FieldValue::Float(Some(f)) => AttributeValue::Float(f as f64),
        FieldValue::Double(d) => AttributeValue::Float(d),
        FieldValue::Currency(c) => AttributeValue::Float(c),
        FieldValue::Integer(i) => AttributeValue::Int(i as i64),
        FieldValue::Logical(Some(b)) => AttributeValue::Bool(b),
        _ => AttributeValue::Null,
    }
}

/// Read a GeoJSON FeatureCollection, Feature or bare Geometry.
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_geojson(&text)
}

/// Parse GeoJSON text into a [`FeatureCollection`].
pub fn parse_geojson(text: &str) -> Result<FeatureCollection> {
    let geojson: GeoJson = text.parse()?;

    let (features, crs) = match geojson {
        GeoJson::FeatureCollection(fc) => {
            let crs = fc
                .foreign_members
                .as_ref()
                .and_then(|m| m.get("crs"))
                .and_then(legacy_crs);
            (fc.features, crs)
        }
        GeoJson::Feature(f) => (vec![f], None),
        GeoJson::Geometry(g) => (vec![geojson::Feature::from(g)], None),
    };

    let mut collection = FeatureCollection::new();
    collection.crs = Some(crs.unwrap_or_else(CRS::wgs84));

    for (index, feature) in features.into_iter().enumerate() {
        let geometry = feature
            .geometry
            .map(geo_types::Geometry::<f64>::try_from)
            .transpose()?;

        let properties = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, json_to_attribute(v)))
            .collect();

        let id = match feature.id {
            Some(geojson::feature::Id::String(s)) => Some(s),
            Some(geojson::feature::Id::Number(n)) => Some(n.to_string()),
            None => Some(index.to_string()),
        };

        collection.push(Feature {
            geometry,
            properties,
            id,
        });
    }

    Ok(collection)
}

/// `{"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32633"}}`
fn legacy_crs(value: &JsonValue) -> Option<CRS> {
    let name = value.get("properties")?.get("name")?.as_str()?;
    if name.contains("CRS84") {
        return Some(CRS::wgs84());
    }
    let code = name.rsplit(':').next()?.parse::<u32>().ok()?;
    Some(CRS::from_epsg(code))
}

fn json_to_attribute(value: JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(b) => AttributeValue::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Float),
        },
        JsonValue::String(s) => AttributeValue::String(s),
        other => AttributeValue::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Geometry;

    const SITES: &str = r#"{
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32633"}},
        "features": [
            {"type": "Feature", "id": 7,
             "properties": {"class": "water", "area": 12.5},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
            {"type": "Feature",
             "properties": {"class": 2, "valid": true, "note": null},
             "geometry": null}
        ]
    }"#;

    #[test]
    fn parses_feature_collection_with_legacy_crs() {
        let fc = parse_geojson(SITES).unwrap();
        assert_eq!(fc.len(), 2);
        assert_eq!(fc.crs.as_ref().and_then(|c| c.epsg()), Some(32633));

        let first = &fc.features[0];
        assert_eq!(first.id.as_deref(), Some("7"));
        assert!(matches!(first.geometry, Some(Geometry::Polygon(_))));
        assert_eq!(
            first.get_property("class"),
            Some(&AttributeValue::String("water".into()))
        );
        assert_eq!(first.get_property("area"), Some(&AttributeValue::Float(12.5)));

        let second = &fc.features[1];
        assert!(second.geometry.is_none());
        assert_eq!(second.id.as_deref(), Some("1"));
        assert_eq!(second.get_property("class"), Some(&AttributeValue::Int(2)));
        assert_eq!(second.get_property("valid"), Some(&AttributeValue::Bool(true)));
        assert_eq!(second.get_property("note"), Some(&AttributeValue::Null));
    }

    #[test]
    fn bare_geometry_defaults_to_wgs84() {
        let fc = parse_geojson(r#"{"type": "Point", "coordinates": [12.5, 41.9]}"#).unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.crs.as_ref().and_then(|c| c.epsg()), Some(4326));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = read_features("sites.kml").unwrap_err();
        assert!(matches!(err, Error::Vector(_)));
    }

    const UTM_33N_PRJ: &str = r#"PROJCS["WGS_1984_UTM_Zone_33N",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",15.0],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

    fn write_sites_shapefile(path: &Path) {
        use shapefile::dbase::{FieldName, Record, TableWriterBuilder};
        use shapefile::{Point, Polygon, PolygonRing};

        let table = TableWriterBuilder::new()
            .add_character_field(FieldName::try_from("class").unwrap(), 20)
            .add_numeric_field(FieldName::try_from("area").unwrap(), 10, 2);
        let mut writer = shapefile::Writer::from_path(path, table).unwrap();

        for (class, x0, area) in [("water", 500_000.0, 1.5), ("forest", 500_100.0, 2.25)] {
            // outer rings run clockwise
            let ring = vec![
                Point::new(x0, 4_600_000.0),
                Point::new(x0, 4_600_050.0),
                Point::new(x0 + 50.0, 4_600_050.0),
                Point::new(x0 + 50.0, 4_600_000.0),
                Point::new(x0, 4_600_000.0),
            ];
            let polygon = Polygon::new(PolygonRing::Outer(ring));
            let mut record = Record::default();
            record.insert("class".to_string(), FieldValue::Character(Some(class.to_string())));
            record.insert("area".to_string(), FieldValue::Numeric(Some(area)));
            writer.write_shape_and_record(&polygon, &record).unwrap();
        }
        drop(writer);

        std::fs::write(path.with_extension("prj"), UTM_33N_PRJ).unwrap();
    }

    #[test]
    fn reads_shapefile_with_dbf_and_prj() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.shp");
        write_sites_shapefile(&path);

        let fc = read_features(&path).unwrap();
        assert_eq!(fc.len(), 2);
        assert_eq!(fc.crs.as_ref().and_then(|c| c.epsg()), Some(32633));

        let labels: Vec<String> = fc
            .iter()
            .filter_map(|f| f.get_property("class").and_then(AttributeValue::as_label))
            .map(|l| l.trim().to_string())
            .collect();
        assert_eq!(labels, vec!["water", "forest"]);
        assert_eq!(fc.features[1].get_property("area"), Some(&AttributeValue::Float(2.25)));

        for feature in fc.iter() {
            assert!(matches!(
                feature.geometry,
                Some(Geometry::Polygon(_)) | Some(Geometry::MultiPolygon(_))
            ));
        }
        assert_eq!(fc.features[0].id.as_deref(), Some("0"));
    }

    #[test]
    fn shapefile_without_prj_has_no_crs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.shp");
        write_sites_shapefile(&path);
        std::fs::remove_file(path.with_extension("prj")).unwrap();

        let fc = read_features(&path).unwrap();
        assert_eq!(fc.len(), 2);
        assert!(fc.crs.is_none());
    }

    #[test]
    fn reads_geojson_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.geojson");
        std::fs::write(&path, SITES).unwrap();
        let fc = read_features(&path).unwrap();
        assert_eq!(fc.len(), 2);
    }
}

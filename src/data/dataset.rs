use std::collections::{BTreeSet, HashMap};
use std::io;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::data::results::GeocodedAddress;
use crate::data::schema::KEY_COLUMN;

/// One row of a caller's dataset.
pub type Record = Map<String, Value>;

pub const ORIGINAL_SUFFIX: &str = "_orig";
pub const GEOCODER_SUFFIX: &str = "_geocoder";

/// Columns the geocoder adds to each record.
pub const GEOCODER_COLUMNS: &[&str] =
    &["rating", "norm_address", "longitude", "latitude", "geometry"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeSummary {
    pub total_rows: usize,
    pub rows_with_geometry: usize,
    pub percent_geocoded: f64,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: i64,
}

impl GeocodeSummary {
    pub fn new(records: &[Record], started_at: DateTime<Utc>) -> GeocodeSummary {
        let total_rows = records.len();
        let rows_with_geometry = records
            .iter()
            .filter(|r| geometry_of(r).map_or(false, |g| !g.is_null()))
            .count();
        let percent_geocoded = if total_rows == 0 {
            0.0
        } else {
            (10_000.0 * rows_with_geometry as f64 / total_rows as f64).round() / 100.0
        };
        GeocodeSummary {
            total_rows,
            rows_with_geometry,
            percent_geocoded,
            started_at,
            elapsed_ms: (Utc::now() - started_at).num_milliseconds(),
        }
    }
}

fn geometry_of(record: &Record) -> Option<&Value> {
    record
        .get("geometry")
        .or_else(|| record.get(&format!("geometry{}", GEOCODER_SUFFIX)))
}

fn geometry_json(address: &GeocodedAddress) -> Value {
    match &address.geometry {
        Some(geometry) => {
            let geojson = geojson::Geometry::new(geojson::Value::from(geometry));
            Value::Object(geojson::JsonObject::from(&geojson))
        }
        None => Value::Null,
    }
}

fn geocoder_values(address: Option<&GeocodedAddress>) -> Vec<(&'static str, Value)> {
    let values = match address {
        Some(a) => vec![
            a.rating.map(Value::from).unwrap_or(Value::Null),
            a.norm_address.clone().map(Value::from).unwrap_or(Value::Null),
            a.longitude.map(Value::from).unwrap_or(Value::Null),
            a.latitude.map(Value::from).unwrap_or(Value::Null),
            geometry_json(a),
        ],
        None => vec![Value::Null; GEOCODER_COLUMNS.len()],
    };
    GEOCODER_COLUMNS.iter().copied().zip(values).collect()
}

/// Left-joins geocoder output onto `records` by `full_address`.
///
/// Every input record comes back, in order. An original column that clashes
/// with a geocoder column is renamed with `_orig` and the geocoder's copy
/// with `_geocoder`.
pub fn merge_geocoded(records: Vec<Record>, geocoded: &[GeocodedAddress]) -> Vec<Record> {
    let by_address = geocoded
        .iter()
        .map(|g| (g.full_address.as_str(), g))
        .collect::<HashMap<&str, &GeocodedAddress>>();

    let clashing = records
        .iter()
        .flat_map(|r| r.keys())
        .filter(|k| GEOCODER_COLUMNS.contains(&k.as_str()))
        .cloned()
        .collect::<BTreeSet<String>>();

    records
        .into_iter()
        .map(|record| {
            let address = match record.get(KEY_COLUMN) {
                Some(Value::String(address)) => by_address.get(address.as_str()).copied(),
                _ => None,
            };

            let mut merged = Record::new();
            for (key, value) in record {
                if clashing.contains(&key) {
                    merged.insert(format!("{}{}", key, ORIGINAL_SUFFIX), value);
                } else {
                    merged.insert(key, value);
                }
            }
            for (key, value) in geocoder_values(address) {
                if clashing.contains(key) {
                    merged.insert(format!("{}{}", key, GEOCODER_SUFFIX), value);
                } else {
                    merged.insert(key.to_string(), value);
                }
            }
            merged
        })
        .collect()
}

/// Reads a headed CSV into records with every cell as a string.
pub fn records_from_csv<R: io::Read>(reader: R) -> Result<Vec<Record>, csv::Error> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record = headers
            .iter()
            .zip(row.iter())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect::<Record>();
        records.push(record);
    }
    Ok(records)
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Writes records as CSV. Columns are ordered by first appearance.
pub fn records_to_csv(records: &[Record]) -> Result<Vec<u8>, csv::Error> {
    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    for record in records {
        writer.write_record(columns.iter().map(|c| csv_cell(record.get(*c))))?;
    }
    writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))
}

#[cfg(test)]
mod tests {
    use geo::{Geometry, GeometryCollection, LineString, Point};
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn matched(address: &str) -> GeocodedAddress {
        GeocodedAddress {
            full_address: address.to_string(),
            rating: Some(0),
            norm_address: Some("100 MAIN ST, SPRINGFIELD, IL 62701".into()),
            longitude: Some(-89.64),
            latitude: Some(39.78),
            geometry: Some(Geometry::Point(Point::new(-89.64, 39.78))),
            srid: 4269,
        }
    }

    #[test]
    fn test_left_join_keeps_every_record() {
        let records = vec![
            record(json!({"id": 1, "full_address": "100 Main St"})),
            record(json!({"id": 2, "full_address": "unknown"})),
            record(json!({"id": 3, "full_address": null})),
        ];
        let merged = merge_geocoded(records, &[matched("100 Main St")]);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0]["rating"], json!(0));
        assert_eq!(merged[0]["latitude"], json!(39.78));
        assert_eq!(
            merged[0]["geometry"],
            json!({"type": "Point", "coordinates": [-89.64, 39.78]})
        );
        assert_eq!(merged[1]["id"], json!(2));
        assert_eq!(merged[1]["geometry"], Value::Null);
        assert_eq!(merged[2]["rating"], Value::Null);
    }

    #[test]
    fn test_geometry_is_written_as_geojson() {
        let line = GeocodedAddress {
            geometry: Some(Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.5)]))),
            ..matched("1 Elm St")
        };
        assert_eq!(
            geometry_json(&line),
            json!({"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.5]]})
        );

        let collection = GeocodedAddress {
            geometry: Some(Geometry::GeometryCollection(GeometryCollection(vec![Geometry::Point(
                Point::new(1.0, 2.0),
            )]))),
            ..matched("1 Elm St")
        };
        assert_eq!(
            geometry_json(&collection),
            json!({"type": "GeometryCollection", "geometries": [{"type": "Point", "coordinates": [1.0, 2.0]}]})
        );

        assert_eq!(geometry_json(&GeocodedAddress { geometry: None, ..matched("1 Elm St") }), Value::Null);
    }

    #[test]
    fn test_clashing_columns_get_suffixes() {
        let records = vec![record(json!({"full_address": "100 Main St", "latitude": "old"}))];
        let merged = merge_geocoded(records, &[matched("100 Main St")]);

        assert_eq!(merged[0]["latitude_orig"], json!("old"));
        assert_eq!(merged[0]["latitude_geocoder"], json!(39.78));
        assert!(merged[0].get("latitude").is_none());
        assert_eq!(merged[0]["longitude"], json!(-89.64));
    }

    #[test]
    fn test_summary_counts_geometries() {
        let records = merge_geocoded(
            vec![
                record(json!({"full_address": "100 Main St"})),
                record(json!({"full_address": "nowhere"})),
                record(json!({"full_address": "also nowhere"})),
            ],
            &[matched("100 Main St")],
        );
        let summary = GeocodeSummary::new(&records, Utc::now());
        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.rows_with_geometry, 1);
        assert_eq!(summary.percent_geocoded, 33.33);
        assert_eq!(GeocodeSummary::new(&[], Utc::now()).percent_geocoded, 0.0);
    }

    #[test]
    fn test_csv_in_and_out() {
        let input = "id,address\n1,\"100 Main St, Springfield, IL 62701\"\n2,\n";
        let records = records_from_csv(input.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["address"], json!("100 Main St, Springfield, IL 62701"));

        let mut merged = records.clone();
        merged[0].insert("rating".into(), json!(0));
        let out = String::from_utf8(records_to_csv(&merged).unwrap()).unwrap();
        assert_eq!(
            out,
            "id,address,rating\n1,\"100 Main St, Springfield, IL 62701\",0\n2,,\n"
        );
    }
}

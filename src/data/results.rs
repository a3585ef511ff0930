use geo::Geometry;
use log::info;

use crate::data::error::{GeocoderError, Phase};
use crate::data::ident::{Ident, TableRef};
use crate::data::metadata::find_geometry_srid;
use crate::data::schema::GEOMETRY_COLUMN;
use crate::data::store::StagingStore;
use crate::data::wkb;

/// A staging row with its geometry decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedAddress {
    pub full_address: String,
    pub rating: Option<i32>,
    pub norm_address: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub geometry: Option<Geometry<f64>>,
    pub srid: i32,
}

/// Reads back every row of `table`, matched or not.
pub fn read_geocoded<S: StagingStore>(
    store: &S,
    table: &TableRef,
) -> Result<Vec<GeocodedAddress>, GeocoderError> {
    let srid = find_geometry_srid(store, table, &Ident::from_static(GEOMETRY_COLUMN))?;
    let rows = store
        .load_geocoded(table, srid)
        .map_err(|err| GeocoderError::query(Phase::ReadBack, err))?;

    let mut addresses = Vec::with_capacity(rows.len());
    for row in rows {
        let geometry = wkb::decode_hex(row.geometry.as_deref())?.map(|decoded| decoded.geometry);
        addresses.push(GeocodedAddress {
            full_address: row.full_address,
            rating: row.rating,
            norm_address: row.norm_address,
            longitude: row.longitude,
            latitude: row.latitude,
            geometry,
            srid,
        });
    }
    info!("Read {} rows back from {} (srid {})", addresses.len(), table, srid);
    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use geo::Point;

    use super::*;
    use crate::data::batch::{BatchOperation, BatchRunner, NO_MATCH_RATING};
    use crate::data::fake::{Candidate, MemoryStore};
    use crate::data::schema::{ensure_staging_schema, TableKind};

    #[test]
    fn test_reads_matched_and_unmatched_rows() {
        let table = TableRef::parse("user_data", "address_table").unwrap();
        let store = MemoryStore::new();
        ensure_staging_schema(&store, &table, TableKind::Normalized).unwrap();
        store
            .insert_addresses(&table, &["1 Elm St".to_string(), "9 Nowhere Rd".to_string()])
            .unwrap();
        store.set_geocoder(|address| {
            if address.contains("Elm") {
                Some(Candidate { rating: 3, lon: -89.64, lat: 39.78 })
            } else {
                None
            }
        });
        let runner = BatchRunner::new(&store, 100).unwrap();
        runner.run(&table, BatchOperation::Normalize).unwrap();
        runner
            .run(&table, BatchOperation::Geocode { source: TableKind::Normalized, rating_threshold: 22 })
            .unwrap();

        let rows = read_geocoded(&store, &table).unwrap();
        assert_eq!(rows.len(), 2);

        let elm = rows.iter().find(|r| r.full_address == "1 Elm St").unwrap();
        assert_eq!(elm.rating, Some(3));
        assert_eq!(elm.geometry, Some(Geometry::Point(Point::new(-89.64, 39.78))));
        assert_eq!(elm.srid, 4269);

        let nowhere = rows.iter().find(|r| r.full_address == "9 Nowhere Rd").unwrap();
        assert_eq!(nowhere.rating, Some(NO_MATCH_RATING));
        assert_eq!(nowhere.geometry, None);
        assert_eq!(nowhere.latitude, None);
    }

    #[test]
    fn test_missing_table_fails_in_catalog() {
        let table = TableRef::parse("user_data", "address_table").unwrap();
        let store = MemoryStore::new();
        assert!(matches!(
            read_geocoded(&store, &table),
            Err(GeocoderError::Metadata { .. })
        ));
    }
}

//! One-off calls into the TIGER geocoder, outside the batch pipeline.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Array, Bool, Double, Integer, Nullable, Text};
use log::info;
use serde::Serialize;

use crate::data::batch::PAGC_TABLES;
use crate::data::error::{GeocoderError, Phase};
use crate::data::schema::STANDARDIZATION_COLUMNS;
use crate::data::wkb;
use crate::db::Pool;

const LIST_PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, PartialEq, QueryableByName, Serialize)]
pub struct AddressCandidate {
    #[diesel(sql_type = Nullable<Integer>)]
    pub rating: Option<i32>,
    #[diesel(sql_type = Nullable<Double>)]
    pub latitude: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub longitude: Option<f64>,
    #[diesel(sql_type = Nullable<Text>)]
    pub geocoded_address: Option<String>,
    #[diesel(sql_type = Nullable<Integer>)]
    pub street_num: Option<i32>,
    #[diesel(sql_type = Nullable<Text>)]
    pub street_dir: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub street_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub street_type: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub city: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub state: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub zip: Option<String>,
}

#[derive(QueryableByName)]
struct ReverseRow {
    #[diesel(sql_type = Integer)]
    rank: i32,
    #[diesel(sql_type = Nullable<Text>)]
    point: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    norm_address: Option<String>,
    #[diesel(sql_type = Nullable<Integer>)]
    address: Option<i32>,
    #[diesel(sql_type = Nullable<Text>)]
    predirabbrev: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    streetname: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    streettypeabbrev: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    postdirabbrev: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    internal: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    location: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    stateabbrev: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    zip: Option<String>,
    #[diesel(sql_type = Nullable<Bool>)]
    parsed: Option<bool>,
    #[diesel(sql_type = Nullable<Text>)]
    zip4: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    address_alphanumeric: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    street: Option<String>,
}

/// The normalized address parts of a reverse geocoding candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedAddress {
    pub address: Option<i32>,
    pub predirabbrev: Option<String>,
    pub streetname: Option<String>,
    pub streettypeabbrev: Option<String>,
    pub postdirabbrev: Option<String>,
    pub internal: Option<String>,
    pub location: Option<String>,
    pub stateabbrev: Option<String>,
    pub zip: Option<String>,
    pub parsed: Option<bool>,
    pub zip4: Option<String>,
    pub address_alphanumeric: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReverseCandidate {
    pub rank: i32,
    /// Interpolated point on the street segment, in the geocoder's SRID.
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub srid: Option<i32>,
    pub norm_address: Option<String>,
    pub parts: NormalizedAddress,
    pub cross_street: Option<String>,
}

impl ReverseRow {
    fn into_candidate(self) -> Result<ReverseCandidate, GeocoderError> {
        let decoded = wkb::decode_hex(self.point.as_deref())?;
        let point = decoded.as_ref().and_then(|d| d.as_point());
        Ok(ReverseCandidate {
            rank: self.rank,
            longitude: point.map(|p| p.x()),
            latitude: point.map(|p| p.y()),
            srid: decoded.and_then(|d| d.srid),
            norm_address: self.norm_address,
            parts: NormalizedAddress {
                address: self.address,
                predirabbrev: self.predirabbrev,
                streetname: self.streetname,
                streettypeabbrev: self.streettypeabbrev,
                postdirabbrev: self.postdirabbrev,
                internal: self.internal,
                location: self.location,
                stateabbrev: self.stateabbrev,
                zip: self.zip,
                parsed: self.parsed,
                zip4: self.zip4,
                address_alphanumeric: self.address_alphanumeric,
            },
            cross_street: self.street,
        })
    }
}

#[derive(Debug, Clone, PartialEq, QueryableByName, Serialize)]
pub struct GeocodeSetting {
    #[diesel(sql_type = Text)]
    pub name: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub setting: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub unit: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub category: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub short_desc: Option<String>,
}

/// A candidate for one address of a list, scored against the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub raw_address: String,
    #[serde(flatten)]
    pub candidate: AddressCandidate,
    /// Case-insensitive normalized Levenshtein similarity between the input
    /// and `geocoded_address`, from 0 to 1.
    pub addr_similarity_ratio: Option<f64>,
}

/// `standardize_address` output for one input address.
#[derive(Debug, Clone, PartialEq, QueryableByName, Serialize)]
pub struct StandardizedAddress {
    #[diesel(sql_type = Text)]
    pub raw_address: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub building: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub house_num: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub predir: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub qual: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub pretype: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub suftype: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub sufdir: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub ruralroute: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub extra: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub city: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub state: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub country: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub postcode: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    #[serde(rename = "box")]
    pub po_box: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub unit: Option<String>,
}

pub fn similarity_ratio(raw: &str, geocoded: &str) -> f64 {
    strsim::normalized_levenshtein(&raw.to_uppercase(), &geocoded.to_uppercase())
}

fn check_lookup(address: &str, max_results: i32, restrict_geom: Option<&str>) -> Result<(), GeocoderError> {
    if address.trim().is_empty() {
        return Err(GeocoderError::InvalidOption("address must not be empty".into()));
    }
    if max_results <= 0 {
        return Err(GeocoderError::InvalidOption(format!(
            "max_results must be positive, got {}",
            max_results
        )));
    }
    if restrict_geom.map_or(false, |geom| geom.trim().is_empty()) {
        return Err(GeocoderError::InvalidOption("restrict_geom must not be empty".into()));
    }
    Ok(())
}

fn check_list(addresses: &[String]) -> Result<(), GeocoderError> {
    if addresses.is_empty() {
        return Err(GeocoderError::InvalidOption("addresses must not be empty".into()));
    }
    Ok(())
}

/// `restrict_geom` is (E)WKT, e.g. `SRID=4269;POLYGON(...)`; candidates
/// outside it are dropped by the geocoder.
fn load_candidates(
    conn: &mut PgConnection,
    address: &str,
    max_results: i32,
    restrict_geom: Option<&str>,
) -> Result<Vec<AddressCandidate>, diesel::result::Error> {
    diesel::sql_query(
        "SELECT g.rating AS rating, \
         round(ST_Y(g.geomout)::numeric, 6)::float8 AS latitude, \
         round(ST_X(g.geomout)::numeric, 6)::float8 AS longitude, \
         pprint_addy(g.addy)::text AS geocoded_address, \
         (g.addy).address AS street_num, \
         (g.addy).predirabbrev::text AS street_dir, \
         (g.addy).streetname::text AS street_name, \
         (g.addy).streettypeabbrev::text AS street_type, \
         (g.addy).location::text AS city, \
         (g.addy).stateabbrev::text AS state, \
         (g.addy).zip::text AS zip \
         FROM geocode($1, $2, ST_GeomFromEWKT($3)) AS g \
         ORDER BY g.rating",
    )
    .bind::<Text, _>(address)
    .bind::<Integer, _>(max_results)
    .bind::<Nullable<Text>, _>(restrict_geom)
    .load::<AddressCandidate>(conn)
}

/// Geocodes one address, best rated candidate first.
pub fn geocode_address(
    pool: &Pool,
    address: &str,
    max_results: i32,
    restrict_geom: Option<&str>,
) -> Result<Vec<AddressCandidate>, GeocoderError> {
    check_lookup(address, max_results, restrict_geom)?;

    let mut conn = pool
        .get()
        .map_err(|err| GeocoderError::query(Phase::Geocode, err))?;
    load_candidates(&mut conn, address, max_results, restrict_geom)
        .map_err(|err| GeocoderError::query(Phase::Geocode, err))
}

/// Geocodes each address in turn and scores every candidate against the
/// address it came from.
pub fn geocode_addresses(
    pool: &Pool,
    addresses: &[String],
    max_results: i32,
    restrict_geom: Option<&str>,
) -> Result<Vec<ScoredCandidate>, GeocoderError> {
    check_list(addresses)?;
    for address in addresses {
        check_lookup(address, max_results, restrict_geom)?;
    }

    let mut conn = pool
        .get()
        .map_err(|err| GeocoderError::query(Phase::Geocode, err))?;
    info!("Geocoding {} addresses", addresses.len());

    let mut scored = Vec::new();
    for (i, address) in addresses.iter().enumerate() {
        let candidates = load_candidates(&mut conn, address, max_results, restrict_geom)
            .map_err(|err| GeocoderError::query(Phase::Geocode, err))?;
        scored.extend(candidates.into_iter().map(|candidate| ScoredCandidate {
            raw_address: address.clone(),
            addr_similarity_ratio: candidate
                .geocoded_address
                .as_deref()
                .map(|geocoded| similarity_ratio(address, geocoded)),
            candidate,
        }));

        let left = addresses.len() - i - 1;
        if left > 0 && left % LIST_PROGRESS_EVERY == 0 {
            info!("{} addresses left to geocode", left);
        }
    }
    Ok(scored)
}

fn standardize_sql() -> String {
    let fields = STANDARDIZATION_COLUMNS
        .iter()
        .map(|c| match c.name {
            "box" => "s.box::text AS po_box".to_string(),
            name => format!("s.{0}::text AS {0}", name),
        })
        .collect::<Vec<String>>()
        .join(", ");
    format!(
        "SELECT a.address::text AS raw_address, {fields} \
         FROM unnest($1::varchar[]) WITH ORDINALITY AS a(address, ord) \
         LEFT JOIN LATERAL standardize_address({pagc}, a.address) AS s ON true \
         ORDER BY a.ord",
        fields = fields,
        pagc = PAGC_TABLES,
    )
}

/// Standardizes addresses without a staging table, in input order.
pub fn standardize_addresses(
    pool: &Pool,
    addresses: &[String],
) -> Result<Vec<StandardizedAddress>, GeocoderError> {
    check_list(addresses)?;

    let mut conn = pool
        .get()
        .map_err(|err| GeocoderError::query(Phase::Standardize, err))?;
    diesel::sql_query(standardize_sql())
        .bind::<Array<Text>, _>(addresses.to_vec())
        .load::<StandardizedAddress>(&mut conn)
        .map_err(|err| GeocoderError::query(Phase::Standardize, err))
}

/// Every address candidate `reverse_geocode` finds for the point.
pub fn reverse_geocode(
    pool: &Pool,
    lat: f64,
    lon: f64,
    srid: i32,
) -> Result<Vec<ReverseCandidate>, GeocoderError> {
    let mut conn = pool
        .get()
        .map_err(|err| GeocoderError::query(Phase::ReverseGeocode, err))?;
    let rows = diesel::sql_query(
        "SELECT s.i AS rank, rg.intpt[s.i]::text AS point, \
         pprint_addy(rg.addy[s.i])::text AS norm_address, \
         (rg.addy[s.i]).address AS address, \
         (rg.addy[s.i]).predirabbrev::text AS predirabbrev, \
         (rg.addy[s.i]).streetname::text AS streetname, \
         (rg.addy[s.i]).streettypeabbrev::text AS streettypeabbrev, \
         (rg.addy[s.i]).postdirabbrev::text AS postdirabbrev, \
         (rg.addy[s.i]).internal::text AS internal, \
         (rg.addy[s.i]).location::text AS location, \
         (rg.addy[s.i]).stateabbrev::text AS stateabbrev, \
         (rg.addy[s.i]).zip::text AS zip, \
         (rg.addy[s.i]).parsed AS parsed, \
         (rg.addy[s.i]).zip4::text AS zip4, \
         (rg.addy[s.i]).address_alphanumeric::text AS address_alphanumeric, \
         rg.street[s.i]::text AS street \
         FROM reverse_geocode(ST_SetSRID(ST_Point($2, $1), $3), true) AS rg \
         CROSS JOIN LATERAL generate_subscripts(rg.addy, 1) AS s(i) \
         ORDER BY s.i",
    )
    .bind::<Double, _>(lat)
    .bind::<Double, _>(lon)
    .bind::<Integer, _>(srid)
    .load::<ReverseRow>(&mut conn)
    .map_err(|err| GeocoderError::query(Phase::ReverseGeocode, err))?;

    rows.into_iter().map(ReverseRow::into_candidate).collect()
}

pub fn geocode_settings(pool: &Pool) -> Result<Vec<GeocodeSetting>, GeocoderError> {
    let mut conn = pool
        .get()
        .map_err(|err| GeocoderError::query(Phase::Catalog, err))?;
    diesel::sql_query(
        "SELECT name::text AS name, setting::text AS setting, unit::text AS unit, \
         category::text AS category, short_desc::text AS short_desc \
         FROM tiger.geocode_settings ORDER BY name",
    )
    .load::<GeocodeSetting>(&mut conn)
    .map_err(|err| GeocoderError::query(Phase::Catalog, err))
}

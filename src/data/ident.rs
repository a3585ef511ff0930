use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::data::error::GeocoderError;

pub const DEFAULT_SCHEMA: &str = "user_data";

lazy_static! {
    // Unquoted Postgres identifiers only, so names fold the same way in
    // DDL and in information_schema lookups.
    static ref IDENT_RE: Regex = Regex::new(r"^[a-z_][a-z0-9_]{0,62}$")
        .expect("Could not create identifier regex");
}

/// Postgres keywords that cannot name a schema, table or column unquoted.
const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "binary", "both", "case", "cast", "check", "collate", "collation",
    "column", "concurrently", "constraint", "create", "cross", "current_catalog",
    "current_date", "current_role", "current_schema", "current_time", "current_timestamp",
    "current_user", "default", "deferrable", "desc", "distinct", "do", "else", "end",
    "except", "false", "fetch", "for", "foreign", "freeze", "from", "full", "grant", "group",
    "having", "ilike", "in", "initially", "inner", "intersect", "into", "is", "isnull", "join",
    "lateral", "leading", "left", "like", "limit", "localtime", "localtimestamp", "natural",
    "not", "notnull", "null", "offset", "on", "only", "or", "order", "outer", "overlaps",
    "placing", "primary", "references", "returning", "right", "select", "session_user",
    "similar", "some", "symmetric", "system_user", "table", "tablesample", "then", "to",
    "trailing", "true", "union", "unique", "user", "using", "variadic", "verbose", "when",
    "where", "window", "with",
];

fn is_valid(name: &str) -> bool {
    IDENT_RE.is_match(name) && !RESERVED_WORDS.contains(&name)
}

/// A schema, table or column name that is safe to interpolate into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: &str) -> Result<Ident, GeocoderError> {
        if is_valid(name) {
            Ok(Ident(name.to_owned()))
        } else {
            Err(GeocoderError::InvalidIdentifier(name.to_owned()))
        }
    }

    /// Names baked into this crate.
    pub(crate) fn from_static(name: &'static str) -> Ident {
        debug_assert!(is_valid(name), "bad built-in identifier {}", name);
        Ident(name.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Ident {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ident::new(&name).map_err(serde::de::Error::custom)
    }
}

/// A schema-qualified table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: Ident,
    pub table: Ident,
}

impl TableRef {
    pub fn new(schema: Ident, table: Ident) -> TableRef {
        TableRef { schema, table }
    }

    pub fn parse(schema: &str, table: &str) -> Result<TableRef, GeocoderError> {
        Ok(TableRef::new(Ident::new(schema)?, Ident::new(table)?))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

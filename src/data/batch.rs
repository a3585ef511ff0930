//! The null-sentinel sweep loop that drives a staging table through the
//! TIGER functions.
//!
//! A phase counts the rows whose sentinel column is still NULL, works out
//! how many `LIMIT`-bounded sweeps that backlog needs, and runs exactly that
//! many. Each sweep is one `UPDATE ... FROM (SELECT ... ORDER BY key LIMIT $1)
//! LEFT JOIN LATERAL f(...)` statement, so an interrupted run leaves every row
//! either fully processed or untouched, and re-running picks up where it
//! stopped.

use indicatif::ProgressBar;
use log::{debug, error, info};

use crate::data::error::{GeocoderError, Phase};
use crate::data::ident::{Ident, TableRef};
use crate::data::schema::{ColumnDef, TableKind, KEY_COLUMN, NORMALIZATION_COLUMNS, STANDARDIZATION_COLUMNS};
use crate::data::store::StagingStore;

pub const DEFAULT_BATCH_SIZE: i64 = 100;
pub const DEFAULT_RATING_THRESHOLD: i32 = 22;
/// Stored in `rating` when no acceptable candidate was found.
pub const NO_MATCH_RATING: i32 = -1;

pub(crate) const PAGC_TABLES: &str = "'tiger.pagc_lex', 'tiger.pagc_gaz', 'tiger.pagc_rules'";

/// One of the three per-sweep statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Normalize,
    Standardize,
    /// Geocodes the parsed fields of a `source` layout table. Candidates
    /// rated at or above `rating_threshold` are rejected.
    Geocode { source: TableKind, rating_threshold: i32 },
}

impl BatchOperation {
    pub fn phase(&self) -> Phase {
        match self {
            BatchOperation::Normalize => Phase::Normalize,
            BatchOperation::Standardize => Phase::Standardize,
            BatchOperation::Geocode { .. } => Phase::Geocode,
        }
    }

    /// The first phase of a pipeline variant.
    pub fn parse_phase(kind: TableKind) -> BatchOperation {
        match kind {
            TableKind::Normalized => BatchOperation::Normalize,
            TableKind::Standardized => BatchOperation::Standardize,
        }
    }

    /// The column this phase fills in. NULL marks a row it has not reached.
    pub fn sentinel(&self) -> Ident {
        match self {
            BatchOperation::Normalize => Ident::from_static(TableKind::Normalized.parse_sentinel()),
            BatchOperation::Standardize => {
                Ident::from_static(TableKind::Standardized.parse_sentinel())
            }
            BatchOperation::Geocode { .. } => Ident::from_static("rating"),
        }
    }

    /// A column an earlier phase must have filled before this one may run.
    pub fn requires(&self) -> Option<Ident> {
        match self {
            BatchOperation::Normalize | BatchOperation::Standardize => None,
            BatchOperation::Geocode { source, .. } => Some(Ident::from_static(source.parse_sentinel())),
        }
    }

    /// The `WHERE` predicate selecting the rows still pending for this phase.
    pub fn pending_filter(&self) -> String {
        match self.requires() {
            Some(required) => format!("{} IS NULL AND {} IS NOT NULL", self.sentinel(), required),
            None => format!("{} IS NULL", self.sentinel()),
        }
    }

    /// The sweep statement. `$1` is the batch size, `$2` the key the
    /// previous sweep of this run stopped at (NULL for the first) and, for
    /// geocoding, `$3` the rating threshold. It yields one row holding the
    /// number of rows updated and the greatest key among them.
    pub fn sql(&self, table: &TableRef) -> String {
        let update = match self {
            BatchOperation::Normalize => normalize_sql(table, &self.pending_rows(table, KEY_COLUMN)),
            BatchOperation::Standardize => standardize_sql(table, &self.pending_rows(table, KEY_COLUMN)),
            BatchOperation::Geocode { source, .. } => {
                let columns = format!("{}, ({})::norm_addy AS addy", KEY_COLUMN, norm_addy_fields(*source));
                geocode_sql(table, &self.pending_rows(table, &columns))
            }
        };
        format!(
            "WITH swept AS ({update} RETURNING {t}.{key}) \
             SELECT COUNT(*) AS count, MAX({key}) AS last_key FROM swept",
            update = update,
            t = table,
            key = KEY_COLUMN,
        )
    }

    /// Pending rows past the cursor, in key order, so a row that stays
    /// pending is not selected twice in one run.
    fn pending_rows(&self, table: &TableRef, columns: &str) -> String {
        format!(
            "SELECT {columns} FROM {t} WHERE {filter} \
             AND ($2::varchar IS NULL OR {key} > $2) ORDER BY {key} LIMIT $1",
            columns = columns,
            t = table,
            filter = self.pending_filter(),
            key = KEY_COLUMN,
        )
    }
}

fn column_list(prefix: &str, columns: &[ColumnDef]) -> String {
    columns
        .iter()
        .map(|c| format!("{}{}", prefix, c.name))
        .collect::<Vec<String>>()
        .join(", ")
}

fn normalize_sql(table: &TableRef, pending: &str) -> String {
    format!(
        "UPDATE {t} SET ({targets}) = ({values}) \
         FROM ({pending}) AS a \
         LEFT JOIN LATERAL normalize_address(a.{key}) AS na ON true \
         WHERE a.{key} = {t}.{key}",
        t = table,
        key = KEY_COLUMN,
        pending = pending,
        targets = column_list("", NORMALIZATION_COLUMNS),
        values = column_list("(na).", NORMALIZATION_COLUMNS),
    )
}

fn standardize_sql(table: &TableRef, pending: &str) -> String {
    format!(
        "UPDATE {t} SET ({targets}) = ({values}) \
         FROM ({pending}) AS a \
         LEFT JOIN LATERAL standardize_address({pagc}, a.{key}) AS sa ON true \
         WHERE a.{key} = {t}.{key}",
        t = table,
        key = KEY_COLUMN,
        pending = pending,
        pagc = PAGC_TABLES,
        targets = column_list("", STANDARDIZATION_COLUMNS),
        values = column_list("(sa).", STANDARDIZATION_COLUMNS),
    )
}

fn norm_addy_fields(source: TableKind) -> String {
    match source {
        TableKind::Normalized => column_list("", NORMALIZATION_COLUMNS),
        // stdaddr has no zip4 / alphanumeric house number
        TableKind::Standardized => {
            "house_num, predir, name, suftype, sufdir, unit, city, state, postcode, true, NULL, NULL"
                .to_string()
        }
    }
}

fn geocode_sql(table: &TableRef, pending: &str) -> String {
    format!(
        "UPDATE {t} SET (rating, norm_address, geomout) = \
         (COALESCE((g).rating, {no_match}), pprint_addy((g).addy), (g).geomout) \
         FROM ({pending}) AS a \
         LEFT JOIN LATERAL geocode(a.addy, 1) AS g ON ((g).rating < $3) \
         WHERE a.{key} = {t}.{key}",
        t = table,
        key = KEY_COLUMN,
        pending = pending,
        no_match = NO_MATCH_RATING,
    )
}

/// Sweeps needed to clear `remaining` rows at `batch_size` rows per sweep.
pub fn sweeps_needed(remaining: i64, batch_size: i64) -> u64 {
    if remaining <= 0 || batch_size <= 0 {
        return 0;
    }
    ((remaining - 1) / batch_size + 1) as u64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub phase: Phase,
    pub remaining: i64,
    pub sweeps: u64,
    pub rows_updated: usize,
}

pub struct BatchRunner<'a, S> {
    store: &'a S,
    batch_size: i64,
    show_progress: bool,
}

impl<'a, S: StagingStore> BatchRunner<'a, S> {
    pub fn new(store: &'a S, batch_size: i64) -> Result<Self, GeocoderError> {
        if batch_size <= 0 {
            return Err(GeocoderError::InvalidOption(format!(
                "batch size must be positive, got {}",
                batch_size
            )));
        }
        Ok(BatchRunner { store, batch_size, show_progress: false })
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Runs `operation` until the backlog counted at the start is cleared.
    ///
    /// Sweeps walk the table in key order, so each pending row is offered
    /// to the phase once per run even when it comes back unparsed. Rows
    /// added after the count are left for the next run. A failing
    /// sweep aborts the phase; its rows keep a NULL sentinel and are picked
    /// up again when the phase is re-run.
    pub fn run(&self, table: &TableRef, operation: BatchOperation) -> Result<BatchReport, GeocoderError> {
        let phase = operation.phase();

        let remaining = self
            .store
            .count_unprocessed(table, &operation)
            .map_err(|err| GeocoderError::query(Phase::Count, err))?;
        let sweeps = sweeps_needed(remaining, self.batch_size);
        info!(
            "{}: {} rows of {} pending, {} sweeps of {}",
            phase, remaining, table, sweeps, self.batch_size
        );

        let progress_bar = if self.show_progress {
            ProgressBar::new(sweeps)
        } else {
            ProgressBar::hidden()
        };

        let mut rows_updated = 0;
        let mut after: Option<String> = None;
        for sweep in 1..=sweeps {
            match self.store.run_sweep(table, &operation, self.batch_size, after.as_deref()) {
                Ok(outcome) => {
                    debug!(
                        "{}: sweep {}/{} updated {} rows",
                        phase, sweep, sweeps, outcome.rows_updated
                    );
                    rows_updated += outcome.rows_updated;
                    if let Some(last_key) = outcome.last_key {
                        after = Some(last_key);
                    }
                    progress_bar.inc(1);
                }
                Err(err) => {
                    progress_bar.abandon();
                    error!("{}: sweep {}/{} failed: {}", phase, sweep, sweeps, err);
                    return Err(GeocoderError::query(phase, err));
                }
            }
        }
        progress_bar.finish();

        Ok(BatchReport { phase, remaining, sweeps, rows_updated })
    }
}

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::{parse_records, plain_timestamp, DataKind, Error, RecordStore, Result};
use crate::core::{filter_by_date, DateRange, Transaction, DATE_FORMAT};

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Deserialize)]
struct TransactionsDocument {
    #[serde(default)]
    transactions: Vec<Value>,
}

/// Rewrites every date-time string found in `value` to its calendar date
/// (`YYYY-MM-DD`), descending into objects and arrays.
pub fn normalize_dates(value: Value) -> Value {
    match value {
        Value::String(s) => match calendar_date(&s) {
            Some(date) => Value::String(date.format(DATE_FORMAT).to_string()),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_dates).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_dates(v)))
                .collect(),
        ),
        other => other,
    }
}

fn calendar_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local().date());
    }

    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}

/// Writes `contents` next to `path` first and only moves it into place once
/// the write went through, so `path` never holds a partial document.
fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");

    let written = fs::write(&tmp, contents).and_then(|_| {
        if path.exists() {
            fs::remove_file(path)?;
        }
        fs::rename(&tmp, path)
    });

    if let Err(err) = written {
        if tmp.exists() {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                warn!("Failed to remove {}: {}", tmp.display(), cleanup);
            }
        }
        return Err(err.into());
    }

    Ok(())
}

fn read_transactions(path: &Path) -> Result<Vec<Transaction>> {
    let raw = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)?;
    let doc: TransactionsDocument = serde_json::from_value(value)?;

    Ok(parse_records(doc.transactions, DataKind::Transactions))
}

impl RecordStore {
    /// Replaces the stored transactions of `user_id` with `transactions`.
    #[tracing::instrument(skip(self, transactions), fields(count = transactions.len()))]
    pub fn save_transactions(&self, user_id: &str, transactions: &[Transaction]) -> Result<()> {
        let result = self.user_file(user_id, DataKind::Transactions).and_then(|path| {
            let doc = json!({
                "last_updated": plain_timestamp(),
                "transactions": normalize_dates(serde_json::to_value(transactions)?),
            });
            replace_file(&path, serde_json::to_string_pretty(&doc)?.as_bytes())
        });

        match &result {
            Ok(()) => info!("Saved {} transactions for user {}", transactions.len(), user_id),
            Err(err) => error!("Error saving transactions: {}", err),
        }

        result
    }

    /// Returns the stored transactions of `user_id`, limited to
    /// `start..=end` when both bounds are given.
    ///
    /// Reading never fails: a file that is not valid JSON is deleted, and
    /// any other problem is logged. Both cases yield no transactions.
    #[tracing::instrument(skip(self))]
    pub fn get_transactions(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Vec<Transaction> {
        let path = match self.user_file(user_id, DataKind::Transactions) {
            Ok(path) => path,
            Err(err) => {
                error!("Unexpected error reading transactions: {}", err);
                return vec![];
            }
        };

        if !path.exists() {
            return vec![];
        }

        let transactions = match read_transactions(&path) {
            Ok(transactions) => transactions,
            Err(Error::Parse(err)) if err.is_syntax() || err.is_eof() => {
                warn!("Error reading transactions file {}: {}", path.display(), err);
                if let Err(err) = fs::remove_file(&path) {
                    error!("Failed to remove corrupt file {}: {}", path.display(), err);
                }
                return vec![];
            }
            Err(err) => {
                error!("Unexpected error reading transactions: {}", err);
                return vec![];
            }
        };

        match DateRange::from_bounds(start, end) {
            Some(range) => filter_by_date(transactions, range),
            None => transactions,
        }
    }
}

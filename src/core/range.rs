use chrono::NaiveDate;
use tracing::warn;

use super::Transaction;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Builds a range only when both bounds are present.
    pub fn from_bounds(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<Self> {
        match (start, end) {
            (Some(start), Some(end)) => Some(Self::new(start, end)),
            _ => None,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Keeps the transactions dated inside `range`. Transactions without a
/// parseable date are dropped.
pub fn filter_by_date(transactions: Vec<Transaction>, range: DateRange) -> Vec<Transaction> {
    transactions
        .into_iter()
        .filter(|txn| {
            let date = match txn.date.as_deref() {
                Some(d) => d,
                None => {
                    warn!(transaction = %txn.transaction_id, "transaction has no date, skipping");
                    return false;
                }
            };

            match NaiveDate::parse_from_str(date, DATE_FORMAT) {
                Ok(date) => range.contains(date),
                Err(err) => {
                    warn!(transaction = %txn.transaction_id, "error parsing transaction date {:?}: {}", date, err);
                    false
                }
            }
        })
        .collect()
}

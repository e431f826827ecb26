use serde::{Deserialize, Deserializer};

mod account;
mod range;
mod txn;

pub use account::{Account, UNKNOWN_INSTITUTION};
pub use range::{filter_by_date, DateRange, DATE_FORMAT};
pub use txn::{Transaction, UNCATEGORIZED};

/// Reads `null` the same as a missing value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

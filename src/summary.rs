//! Grouped views over a user's stored accounts and transactions.
//!
//! Summaries are computed on demand and never persisted.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::core::{Account, Transaction};
use crate::store::{self, plain_timestamp, RecordStore};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{field} of {id} is not a number: {value}")]
    NonNumeric {
        field: &'static str,
        id: String,
        value: String,
    },
    #[error(transparent)]
    Store(#[from] store::Error),
}

type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountGroup {
    pub accounts: Vec<Account>,
    pub total_balance: f64,
    pub recent_transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryGroup {
    pub transactions: Vec<Transaction>,
    pub total_amount: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub total_balance: f64,
    /// Sum of the amounts of the transactions in range.
    pub total_recent_transactions: f64,
    pub institutions: BTreeMap<String, AccountGroup>,
    pub account_types: BTreeMap<String, AccountGroup>,
    pub categories: BTreeMap<String, CategoryGroup>,
    pub last_updated: String,
}

/// Reads a monetary value. Missing values count as zero, numeric strings
/// are accepted, anything else is an error.
fn amount(value: Option<&Value>, field: &'static str, id: &str) -> Result<f64> {
    let value = match value {
        None | Some(Value::Null) => return Ok(0.0),
        Some(value) => value,
    };

    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| Error::NonNumeric {
        field,
        id: id.to_string(),
        value: value.to_string(),
    })
}

fn balance(account: &Account) -> Result<f64> {
    amount(
        account.balances.current.as_ref(),
        "balances.current",
        &account.account_id,
    )
}

fn transaction_amount(txn: &Transaction) -> Result<f64> {
    amount(txn.amount.as_ref(), "amount", &txn.transaction_id)
}

/// Groups `accounts` under `key` and attaches to every group the
/// transactions booked on its accounts.
fn group_accounts<'a, F>(
    accounts: &'a [Account],
    transactions: &[Transaction],
    key: F,
) -> Result<BTreeMap<String, AccountGroup>>
where
    F: Fn(&'a Account) -> &'a str,
{
    let mut groups: BTreeMap<String, AccountGroup> = BTreeMap::new();
    for account in accounts {
        let group = groups.entry(key(account).to_string()).or_default();
        group.total_balance += balance(account)?;
        group.accounts.push(account.clone());
    }

    for group in groups.values_mut() {
        let ids: HashSet<&str> = group.accounts.iter().map(|a| a.account_id.as_str()).collect();
        group.recent_transactions = transactions
            .iter()
            .filter(|t| ids.contains(t.account_id.as_str()))
            .cloned()
            .collect();
    }

    Ok(groups)
}

fn group_categories(transactions: &[Transaction]) -> Result<BTreeMap<String, CategoryGroup>> {
    let mut groups: BTreeMap<String, CategoryGroup> = BTreeMap::new();
    for txn in transactions {
        let group = groups.entry(txn.primary_category().to_string()).or_default();
        group.total_amount += transaction_amount(txn)?;
        group.count += 1;
        group.transactions.push(txn.clone());
    }

    Ok(groups)
}

/// Builds the summary of `accounts` and the already date-filtered
/// `transactions`.
pub fn summarize(accounts: &[Account], transactions: &[Transaction]) -> Result<AccountSummary> {
    let institutions = group_accounts(accounts, transactions, Account::institution)?;
    for (name, group) in &institutions {
        debug!(
            institution = %name,
            accounts = group.accounts.len(),
            transactions = group.recent_transactions.len(),
            "total balance ${:.2}",
            group.total_balance
        );
    }

    let account_types = group_accounts(accounts, transactions, Account::account_type)?;
    let categories = group_categories(transactions)?;

    let total_balance = accounts
        .iter()
        .map(balance)
        .sum::<Result<f64>>()?;
    let total_recent_transactions = transactions
        .iter()
        .map(transaction_amount)
        .sum::<Result<f64>>()?;

    Ok(AccountSummary {
        total_balance,
        total_recent_transactions,
        institutions,
        account_types,
        categories,
        last_updated: plain_timestamp(),
    })
}

/// Loads the data of `user_id` and summarizes it for the given range. Both
/// bounds must be present for the range to apply.
#[tracing::instrument(skip(store))]
pub fn get_account_summary(
    store: &RecordStore,
    user_id: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<AccountSummary> {
    let result = store
        .get_accounts(user_id)
        .map_err(Error::from)
        .and_then(|accounts| {
            let transactions = store.get_transactions(user_id, start, end);
            summarize(&accounts, &transactions)
        });

    match &result {
        Ok(summary) => info!(
            institutions = summary.institutions.len(),
            categories = summary.categories.len(),
            "Built summary for user {}",
            user_id
        ),
        Err(err) => error!("Error getting summary: {}", err),
    }

    result
}

//! Turns a public token handed over by the frontend into stored accounts
//! and transactions.

use std::time::Duration;

use chrono::{Local, NaiveDate};
use plaid_link::LinkError;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::{DateRange, Transaction, DATE_FORMAT, UNKNOWN_INSTITUTION};
use crate::store::{self, RecordStore};
use crate::upstream::Upstream;

const MAX_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_HISTORY_DAYS: i64 = 365 * 5;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid date format. Use YYYY-MM-DD")]
    InvalidDate(#[from] chrono::ParseError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Store(#[from] store::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeRequest {
    pub public_token: String,
    pub user_id: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub institution_name: String,
    pub accounts: usize,
    pub transactions: usize,
}

/// The range of history to pull: the requested one when both bounds are
/// given, otherwise the last five years up to `today`.
pub fn history_range(
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<DateRange, Error> {
    match (start, end) {
        (Some(start), Some(end)) => Ok(DateRange::new(
            NaiveDate::parse_from_str(start, DATE_FORMAT)?,
            NaiveDate::parse_from_str(end, DATE_FORMAT)?,
        )),
        _ => Ok(DateRange::new(
            today - chrono::Duration::days(DEFAULT_HISTORY_DAYS),
            today,
        )),
    }
}

async fn fetch_transactions(
    upstream: &dyn Upstream,
    access_token: &str,
    range: DateRange,
) -> Result<Vec<Transaction>, LinkError> {
    let mut attempt = 1;
    loop {
        info!(
            "Fetching transaction information (attempt {}/{})",
            attempt, MAX_ATTEMPTS
        );

        match upstream
            .transactions(access_token, range.start, range.end)
            .await
        {
            Ok(transactions) => return Ok(transactions),
            Err(err) if err.is_product_not_ready() && attempt < MAX_ATTEMPTS => {
                info!("Product not ready, waiting {:?} before retry", RETRY_DELAY);
                tokio::time::sleep(RETRY_DELAY).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[tracing::instrument(skip(upstream, store, req), fields(user_id = %req.user_id))]
pub async fn exchange_and_store(
    upstream: &dyn Upstream,
    store: &RecordStore,
    req: &ExchangeRequest,
) -> Result<LinkOutcome, Error> {
    let range = history_range(
        req.start_date.as_deref(),
        req.end_date.as_deref(),
        Local::now().date_naive(),
    )?;

    let token = upstream.exchange_public_token(&req.public_token).await?;
    info!("Exchanged public token for item {}", token.item_id);

    let institution_name = match upstream.institution_name(&token.access_token).await {
        Ok(name) => name,
        Err(err) => {
            warn!("Failed to get institution name: {}", err);
            UNKNOWN_INSTITUTION.to_string()
        }
    };

    let mut accounts = upstream.accounts(&token.access_token).await?;
    for account in accounts.iter_mut() {
        account.institution_name = Some(institution_name.clone());
    }
    let account_count = accounts.len();
    store.save_accounts(&req.user_id, accounts)?;

    info!("Requesting transactions from {} to {}", range.start, range.end);
    let transactions = fetch_transactions(upstream, &token.access_token, range).await?;
    store.save_transactions(&req.user_id, &transactions)?;

    Ok(LinkOutcome {
        institution_name,
        accounts: account_count,
        transactions: transactions.len(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::tests::{account, temp_store, transaction};
    use crate::upstream::testing::FakeUpstream;

    fn ymd(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn request(start: Option<&str>, end: Option<&str>) -> ExchangeRequest {
        ExchangeRequest {
            public_token: "public-sandbox-1".to_string(),
            user_id: "u1".to_string(),
            start_date: start.map(String::from),
            end_date: end.map(String::from),
        }
    }

    fn upstream() -> FakeUpstream {
        FakeUpstream {
            institution: Some("Bank A".to_string()),
            accounts: vec![
                account(json!({"account_id": "a1", "type": "depository", "balances": {"current": 100}})),
                account(json!({"account_id": "a2", "type": "credit", "balances": {"current": 20}})),
            ],
            transactions: vec![
                transaction(json!({"transaction_id": "t1", "account_id": "a1", "amount": 5, "date": "2024-01-15"})),
                transaction(json!({"transaction_id": "t2", "account_id": "a2", "amount": 8, "date": "2024-02-15"})),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn uses_requested_range() {
        let range = history_range(Some("2024-01-01"), Some("2024-01-31"), ymd("2025-01-01")).unwrap();
        assert_eq!(range, DateRange::new(ymd("2024-01-01"), ymd("2024-01-31")));
    }

    #[test]
    fn defaults_to_five_years() {
        let today = ymd("2025-06-30");
        for (start, end) in [(None, None), (Some("2024-01-01"), None), (None, Some("2024-01-01"))] {
            let range = history_range(start, end, today).unwrap();
            assert_eq!(range.end, today);
            assert_eq!((range.end - range.start).num_days(), DEFAULT_HISTORY_DAYS);
        }
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(matches!(
            history_range(Some("01/01/2024"), Some("2024-01-31"), ymd("2025-01-01")),
            Err(Error::InvalidDate(_))
        ));
    }

    #[tokio::test]
    async fn stores_accounts_and_transactions() {
        let (_dir, store) = temp_store();
        let upstream = upstream();

        let outcome = exchange_and_store(&upstream, &store, &request(Some("2024-01-01"), Some("2024-01-31")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            LinkOutcome {
                institution_name: "Bank A".to_string(),
                accounts: 2,
                transactions: 1,
            }
        );

        let accounts = store.get_accounts("u1").unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|a| a.institution() == "Bank A"));

        let stored = store.get_transactions("u1", None, None);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].transaction_id, "t1");
    }

    #[tokio::test]
    async fn falls_back_to_unknown_institution() {
        let (_dir, store) = temp_store();
        let upstream = FakeUpstream {
            institution: None,
            ..upstream()
        };

        let outcome = exchange_and_store(&upstream, &store, &request(None, None))
            .await
            .unwrap();

        assert_eq!(outcome.institution_name, UNKNOWN_INSTITUTION);
        assert!(store
            .get_accounts("u1")
            .unwrap()
            .iter()
            .all(|a| a.institution() == UNKNOWN_INSTITUTION));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_product_is_ready() {
        let (_dir, store) = temp_store();
        let upstream = FakeUpstream {
            not_ready: 2,
            ..upstream()
        };

        let outcome = exchange_and_store(&upstream, &store, &request(Some("2024-01-01"), Some("2024-12-31")))
            .await
            .unwrap();

        assert_eq!(upstream.calls(), 3);
        assert_eq!(outcome.transactions, 2);
        assert_eq!(store.get_transactions("u1", None, None).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts() {
        let (_dir, store) = temp_store();
        let upstream = FakeUpstream {
            not_ready: 10,
            ..upstream()
        };

        let err = exchange_and_store(&upstream, &store, &request(None, None))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Link(LinkError::ProductNotReady)));
        assert_eq!(upstream.calls(), MAX_ATTEMPTS);
        // Accounts are saved before transactions are requested.
        assert_eq!(store.get_accounts("u1").unwrap().len(), 2);
        assert!(store.get_transactions("u1", None, None).is_empty());
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let (_dir, store) = temp_store();
        let upstream = FakeUpstream {
            reject_transactions: true,
            ..upstream()
        };

        let err = exchange_and_store(&upstream, &store, &request(None, None))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Link(LinkError::InvalidArgument(_))));
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn bad_dates_fail_before_exchange() {
        let (_dir, store) = temp_store();
        let upstream = upstream();

        let err = exchange_and_store(&upstream, &store, &request(Some("2024-13-01"), Some("2024-12-31")))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidDate(_)));
        assert!(store.get_accounts("u1").unwrap().is_empty());
    }
}

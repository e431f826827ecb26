pub mod plaid;

use axum::async_trait;
use chrono::NaiveDate;
use plaid_link::{LinkError, Token};

use crate::core::{Account, Transaction};

#[async_trait]
pub trait LinkSource {
    async fn create_link_token(&self, client_user_id: &str) -> Result<String, LinkError>;
    async fn exchange_public_token(&self, public_token: &str) -> Result<Token, LinkError>;
    async fn institution_name(&self, access_token: &str) -> Result<String, LinkError>;
}

#[async_trait]
pub trait AccountSource {
    async fn accounts(&self, access_token: &str) -> Result<Vec<Account>, LinkError>;
}

#[async_trait]
pub trait TransactionSource {
    async fn transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>, LinkError>;
}

/// Everything the link workflow needs from the aggregation API.
pub trait Upstream: LinkSource + AccountSource + TransactionSource + Send + Sync {}

impl<T> Upstream for T where T: LinkSource + AccountSource + TransactionSource + Send + Sync {}

use axum::async_trait;
use chrono::NaiveDate;
use plaid_link::{LinkClient, LinkError, Token};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::{Account, Transaction};
use crate::upstream::{AccountSource, LinkSource, TransactionSource};

pub struct Source {
    client: LinkClient,
}

impl Source {
    pub fn new(client: LinkClient) -> Self {
        Self { client }
    }
}

fn to_canonical<T: DeserializeOwned>(values: Vec<Value>) -> Result<Vec<T>, LinkError> {
    values
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(LinkError::ParseError))
        .collect()
}

#[async_trait]
impl LinkSource for Source {
    async fn create_link_token(&self, client_user_id: &str) -> Result<String, LinkError> {
        self.client.create_link_token(client_user_id).await
    }

    async fn exchange_public_token(&self, public_token: &str) -> Result<Token, LinkError> {
        self.client.exchange_public_token(public_token).await
    }

    async fn institution_name(&self, access_token: &str) -> Result<String, LinkError> {
        self.client.institution_name(access_token).await
    }
}

#[async_trait]
impl AccountSource for Source {
    async fn accounts(&self, access_token: &str) -> Result<Vec<Account>, LinkError> {
        to_canonical(self.client.accounts(access_token).await?)
    }
}

#[async_trait]
impl TransactionSource for Source {
    async fn transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>, LinkError> {
        to_canonical(self.client.transactions(access_token, start, end).await?)
    }
}

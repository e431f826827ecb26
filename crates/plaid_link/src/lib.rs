use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use futures_lite::StreamExt;
use rplaid::client::{Builder, Credentials, Environment, Plaid};
use rplaid::model::*;
use rplaid::HttpClient;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

pub static CLIENT_NAME: &str = "Personal Finance App";
static PRODUCTS: [&str; 1] = ["transactions"];
static COUNTRY_CODES: [&str; 1] = ["CA"];

const PRODUCT_NOT_READY: &str = "PRODUCT_NOT_READY";

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("the requested product is not ready yet ({PRODUCT_NOT_READY})")]
    ProductNotReady,
    #[error("unable to parse upstream payload")]
    ParseError(#[from] serde_json::Error),
    #[error("upstream link call failed: {0:?}")]
    LinkClientError(#[from] rplaid::client::ClientError),
}

impl LinkError {
    /// Plaid answers with `PRODUCT_NOT_READY` while an item is still being
    /// prepared after a fresh exchange. Callers may retry those.
    pub fn is_product_not_ready(&self) -> bool {
        match self {
            LinkError::ProductNotReady => true,
            LinkError::LinkClientError(err) => format!("{:?}", err).contains(PRODUCT_NOT_READY),
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            LinkError::ParseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for LinkError {
    fn into_response(self) -> Response {
        let detail = match &self {
            LinkError::InvalidArgument(s) => s.clone(),
            LinkError::ParseError(_) => format!("Internal server error: {}", self),
            _ => format!("Plaid API error: {}", self),
        };

        (self.status(), Json(json!({ "detail": detail }))).into_response()
    }
}

/// Maps a configured environment name onto a Plaid environment.
pub fn environment(name: &str) -> Result<Environment, LinkError> {
    match name.to_lowercase().as_str() {
        "sandbox" => Ok(Environment::Sandbox),
        "development" => Ok(Environment::Development),
        "production" => Ok(Environment::Production),
        _ => Err(LinkError::InvalidArgument(
            "Plaid client environment must be one of SANDBOX, DEVELOPMENT, or PRODUCTION".into(),
        )),
    }
}

/// Token are a set of credentials for the given `item_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The Plaid item ID the access token belongs to.
    pub item_id: String,
    /// The access token to access data for the item.
    pub access_token: String,
}

pub struct LinkClient {
    client: Plaid<Box<dyn HttpClient>>,
}

impl LinkClient {
    pub fn new(client_id: &str, secret: &str, env: &str) -> Result<Self, LinkError> {
        if client_id.is_empty() || secret.is_empty() {
            return Err(LinkError::InvalidArgument(
                "Plaid credentials not found in configuration".into(),
            ));
        }

        let client = Builder::new()
            .with_credentials(Credentials {
                client_id: client_id.to_string(),
                secret: secret.to_string(),
            })
            .with_env(environment(env)?)
            .build();

        Ok(Self { client })
    }

    pub fn client(&self) -> &Plaid<Box<dyn HttpClient>> {
        &self.client
    }

    /// Creates a link token bound to `user_id` for the frontend Link widget.
    pub async fn create_link_token(&self, user_id: &str) -> Result<String, LinkError> {
        let req = CreateLinkTokenRequest {
            client_name: CLIENT_NAME,
            user: LinkUser::new(user_id),
            language: "en",
            country_codes: &COUNTRY_CODES,
            products: &PRODUCTS,
            ..CreateLinkTokenRequest::default()
        };

        let res = self.client.create_link_token(&req).await?;
        info!("Link token created for user {}", user_id);

        Ok(res.link_token)
    }

    pub async fn exchange_public_token(&self, public_token: &str) -> Result<Token, LinkError> {
        if public_token.is_empty() {
            return Err(LinkError::InvalidArgument("Public token is required".into()));
        }

        let res = self
            .client
            .exchange_public_token(public_token.to_string())
            .await?;

        Ok(Token {
            item_id: res.item_id,
            access_token: res.access_token,
        })
    }

    pub async fn institution_name(&self, access_token: &str) -> Result<String, LinkError> {
        let item = self.client.item(access_token).await?;
        let id = item.institution_id.ok_or_else(|| {
            LinkError::InvalidArgument("no institution associated with item".into())
        })?;

        let ins = self
            .client
            .get_institution_by_id(&InstitutionGetRequest {
                institution_id: id.as_str(),
                country_codes: &COUNTRY_CODES,
                options: None,
            })
            .await?;

        Ok(ins.name)
    }

    pub async fn accounts(&self, access_token: &str) -> Result<Vec<Value>, LinkError> {
        let accounts = self.client.accounts(access_token).await?;
        debug!("Retrieved {} accounts", accounts.len());

        accounts
            .into_iter()
            .map(|account| serde_json::to_value(account).map_err(LinkError::ParseError))
            .collect()
    }

    /// Drains the item's transaction sync stream and keeps the entries dated
    /// within `start..=end`.
    pub async fn transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Value>, LinkError> {
        let pages = self.client.transactions_sync_iter(SyncTransactionsRequest {
            access_token: access_token.to_string(),
            cursor: None,
            count: Some(500),
            options: Some(SyncTransactionsRequestOptions {
                include_personal_finance_category: Some(true),
                include_original_description: Some(false),
            }),
        });
        futures_lite::pin!(pages);

        let mut txns: Vec<Transaction> = vec![];
        while let Some(page) = pages.next().await {
            for entry in page? {
                match entry {
                    TransactionStream::Added(txn) => txns.push(txn),
                    TransactionStream::Modified(txn) => {
                        match txns
                            .iter()
                            .position(|t| t.transaction_id == txn.transaction_id)
                        {
                            Some(pos) => txns[pos] = txn,
                            None => txns.push(txn),
                        }
                    }
                    TransactionStream::Removed(id) => txns.retain(|t| t.transaction_id != id),
                    TransactionStream::Done(_) => {}
                }
            }
        }

        let mut out = Vec::with_capacity(txns.len());
        for txn in txns {
            match NaiveDate::parse_from_str(&txn.date, "%Y-%m-%d") {
                Ok(date) if start <= date && date <= end => out.push(serde_json::to_value(txn)?),
                _ => continue,
            }
        }
        info!("Retrieved {} transactions from {} to {}", out.len(), start, end);

        Ok(out)
    }
}

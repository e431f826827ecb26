use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Extension, Path, Query},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use plaid_link::LinkError;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::core::{DateRange, DATE_FORMAT};
use crate::link::{self, ExchangeRequest};
use crate::store::{self, RecordStore};
use crate::summary::{self, AccountSummary};
use crate::upstream::Upstream;

const DEFAULT_RANGE_DAYS: i64 = 30;
const MAX_RANGE_DAYS: i64 = 3650;

/// Shared handles passed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub upstream: Arc<dyn Upstream>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Store(#[from] store::Error),
    #[error(transparent)]
    Summary(#[from] summary::Error),
}

impl From<link::Error> for ApiError {
    fn from(err: link::Error) -> Self {
        match err {
            link::Error::InvalidDate(_) => ApiError::BadRequest(err.to_string()),
            link::Error::Link(err) => ApiError::Link(err),
            link::Error::Store(err) => ApiError::Store(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("{}", self);

        let (status, detail) = match self {
            ApiError::Link(err) => return err.into_response(),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
            ApiError::Store(err @ store::Error::InvalidUserId(_))
            | ApiError::Summary(summary::Error::Store(err @ store::Error::InvalidUserId(_))) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            err => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error: {}", err),
            ),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl RangeQuery {
    /// The requested range, or the last 30 days up to `today` when a bound
    /// is missing.
    fn resolve(&self, today: NaiveDate) -> Result<DateRange, ApiError> {
        let present = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());

        let range = match (present(&self.start_date), present(&self.end_date)) {
            (Some(start), Some(end)) => {
                let parse = |s: &str| {
                    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| {
                        ApiError::BadRequest("Invalid date format. Use YYYY-MM-DD".into())
                    })
                };
                DateRange::new(parse(&start)?, parse(&end)?)
            }
            _ => DateRange::new(today - chrono::Duration::days(DEFAULT_RANGE_DAYS), today),
        };

        if (range.end - range.start).num_days() > MAX_RANGE_DAYS {
            return Err(ApiError::BadRequest(
                "Date range cannot exceed 10 years".into(),
            ));
        }

        Ok(range)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CleanQuery {
    pub user_id: Option<String>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to Personal Finance API" }))
}

async fn create_link_token(
    Extension(state): Extension<AppState>,
) -> Result<Json<Value>, ApiError> {
    let user_id = ulid::Ulid::new().to_string();
    info!("Generated unique user ID: {}", user_id);

    let link_token = state.upstream.create_link_token(&user_id).await?;

    Ok(Json(json!({ "link_token": link_token })))
}

async fn exchange_token(
    Extension(state): Extension<AppState>,
    Json(req): Json<ExchangeRequest>,
) -> Result<Json<Value>, ApiError> {
    info!("Attempting to exchange public token for user {}", req.user_id);
    let outcome = link::exchange_and_store(state.upstream.as_ref(), &state.store, &req).await?;
    info!(
        accounts = outcome.accounts,
        transactions = outcome.transactions,
        "Data saved successfully"
    );

    Ok(Json(json!({
        "message": "Successfully connected account",
        "institution_name": outcome.institution_name,
    })))
}

async fn accounts(
    Path(user_id): Path<String>,
    Extension(state): Extension<AppState>,
) -> Result<Json<Value>, ApiError> {
    let accounts = state.store.get_accounts(&user_id)?;

    Ok(Json(json!({ "accounts": accounts })))
}

async fn transactions(
    Path(user_id): Path<String>,
    Query(query): Query<RangeQuery>,
    Extension(state): Extension<AppState>,
) -> Result<Json<Value>, ApiError> {
    let range = query.resolve(today())?;
    let transactions = state
        .store
        .get_transactions(&user_id, Some(range.start), Some(range.end));

    Ok(Json(json!({ "transactions": transactions })))
}

async fn account_summary(
    Path(user_id): Path<String>,
    Query(query): Query<RangeQuery>,
    Extension(state): Extension<AppState>,
) -> Result<Json<AccountSummary>, ApiError> {
    let range = query.resolve(today())?;
    let summary =
        summary::get_account_summary(&state.store, &user_id, Some(range.start), Some(range.end))?;

    Ok(Json(summary))
}

async fn clean_test_data(
    Query(query): Query<CleanQuery>,
    Extension(state): Extension<AppState>,
) -> Result<Json<Value>, ApiError> {
    let user_id = query.user_id.as_deref().filter(|s| !s.is_empty());
    state.store.clean_test_data(user_id).map_err(|err| match err {
        store::Error::InvalidUserId(_) => ApiError::Store(err),
        err => ApiError::Internal(format!("Error cleaning test data: {}", err)),
    })?;

    Ok(Json(json!({ "message": "Test data cleaned successfully" })))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/create_link_token", post(create_link_token))
        .route("/exchange_token", post(exchange_token))
        .route("/accounts/:user_id", get(accounts))
        .route("/transactions/:user_id", get(transactions))
        .route("/summary/:user_id", get(account_summary))
        .route("/clean_test_data", post(clean_test_data))
        .layer(Extension(state))
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let origins = allowed_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin {:?}", o))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, starting graceful shutdown");
}

pub async fn serve(state: AppState, addr: SocketAddr, allowed_origins: &[String]) -> Result<()> {
    let router = build_router(state)
        .layer(cors_layer(allowed_origins)?)
        .layer(TraceLayer::new_for_http());

    info!("Listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

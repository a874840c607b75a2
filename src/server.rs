//! HTTP surface
//!
//! `GET /?addr=` and `POST /` (form field `addr`) fund an address. Failures
//! are rendered as problem documents: request errors as 400 `bad_request`,
//! unknown routes as 404 `not_found`, everything else as 500 `server_error`.
//! `/metrics` exposes the Prometheus registry and `/health` answers once the
//! pool is up.

use std::sync::Arc;

use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn, Instrument};

use crate::address::classify;
use crate::bot::Bot;
use crate::ledger::NetworkClient;
use crate::metrics::metrics;
use crate::minion::FundError;
use crate::observability::{fund_span, CorrelationId, REQUEST_ID_HEADER};

const BAD_REQUEST_TYPE: &str = "https://stellar.org/friendbot-errors/bad_request";
const SERVER_ERROR_TYPE: &str = "https://stellar.org/friendbot-errors/server_error";
const NOT_FOUND_TYPE: &str = "https://stellar.org/friendbot-errors/not_found";

/// Problem details document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<Value>,
}

impl Problem {
    /// 400 problem blaming the `addr` parameter
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            kind: BAD_REQUEST_TYPE.to_string(),
            title: "Bad Request".to_string(),
            status: StatusCode::BAD_REQUEST.as_u16(),
            detail: "The request you sent was invalid in some way.".to_string(),
            extras: Some(serde_json::json!({
                "invalid_field": "addr",
                "reason": reason.into(),
            })),
        }
    }

    /// 400 for a destination that already holds the starting balance
    pub fn already_funded() -> Self {
        Self {
            kind: BAD_REQUEST_TYPE.to_string(),
            title: "Bad Request".to_string(),
            status: StatusCode::BAD_REQUEST.as_u16(),
            detail: FundError::AlreadyFunded.to_string(),
            extras: None,
        }
    }

    pub fn not_found() -> Self {
        Self {
            kind: NOT_FOUND_TYPE.to_string(),
            title: "Resource Missing".to_string(),
            status: StatusCode::NOT_FOUND.as_u16(),
            detail: "The resource at the url requested was not found.  This usually occurs for one \
                     of two reasons:  The url requested is not valid, or no data in our database \
                     could be found with the parameters provided."
                .to_string(),
            extras: None,
        }
    }

    pub fn server_error() -> Self {
        Self {
            kind: SERVER_ERROR_TYPE.to_string(),
            title: "Internal Server Error".to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: "An error occurred while processing this request. This is usually due to a \
                     bug within the server software. Trying this request again may succeed if the \
                     bug is transient."
                .to_string(),
            extras: None,
        }
    }

    fn from_fund_error(err: &FundError) -> Self {
        match err {
            FundError::AlreadyFunded => Self::already_funded(),
            FundError::InvalidAddress(e) => Self::bad_request(e.to_string()),
            _ => Self::server_error(),
        }
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            Json(self),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct FundRequest {
    #[serde(default)]
    addr: Option<String>,
}

/// Shared handler state
pub struct ServerState<C> {
    bot: Arc<Bot<C>>,
}

impl<C> Clone for ServerState<C> {
    fn clone(&self) -> Self {
        Self {
            bot: Arc::clone(&self.bot),
        }
    }
}

impl<C: NetworkClient + 'static> ServerState<C> {
    pub fn new(bot: Arc<Bot<C>>) -> Self {
        Self { bot }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(fund_get::<C>).post(fund_post::<C>))
            .route("/health", get(health))
            .route("/metrics", get(export_metrics))
            .fallback(not_found)
            .with_state(self)
    }
}

async fn fund_get<C: NetworkClient + 'static>(
    State(state): State<ServerState<C>>,
    headers: HeaderMap,
    Query(req): Query<FundRequest>,
) -> Response {
    fund(state, headers, req).await
}

async fn fund_post<C: NetworkClient + 'static>(
    State(state): State<ServerState<C>>,
    headers: HeaderMap,
    Form(req): Form<FundRequest>,
) -> Response {
    fund(state, headers, req).await
}

async fn fund<C: NetworkClient + 'static>(
    state: ServerState<C>,
    headers: HeaderMap,
    req: FundRequest,
) -> Response {
    let addr = req.addr.unwrap_or_default();
    let destination = match classify(&addr) {
        Ok(destination) => destination,
        Err(e) => {
            metrics().record_fund_outcome("invalid_address");
            return Problem::bad_request(e.to_string()).into_response();
        }
    };

    let correlation_id = CorrelationId::from_header(
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    let span = fund_span(&correlation_id, &destination);
    let outcome = state.bot.fund(&destination).instrument(span.clone()).await;

    span.in_scope(|| match outcome {
        Ok(result) => {
            info!(hash = %result.hash, "funded");
            Json(result).into_response()
        }
        Err(err) => {
            warn!(error = %err, outcome = err.outcome(), "funding failed");
            Problem::from_fund_error(&err).into_response()
        }
    })
}

async fn not_found() -> Response {
    Problem::not_found().into_response()
}

async fn health() -> &'static str {
    "ok"
}

async fn export_metrics() -> Response {
    match metrics().gather_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "failed to encode metrics");
            Problem::server_error().into_response()
        }
    }
}

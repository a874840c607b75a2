//! Horizon backend: synchronous submission over REST

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{transport_error, AccountDetails, NetworkClient, NetworkError, SimulationResult};
use crate::types::parse_amount;

const BAD_SEQ_CODE: &str = "tx_bad_seq";

/// Client for a Horizon server
#[derive(Debug, Clone)]
pub struct HorizonClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    sequence: String,
    #[serde(default)]
    balances: Vec<BalanceLine>,
}

#[derive(Debug, Deserialize)]
struct BalanceLine {
    balance: String,
    asset_type: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default = "default_true")]
    successful: bool,
    #[serde(default)]
    result_xdr: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Horizon problem document
#[derive(Debug, Default, Deserialize)]
struct Problem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    extras: Option<ProblemExtras>,
}

#[derive(Debug, Default, Deserialize)]
struct ProblemExtras {
    #[serde(default)]
    result_codes: Option<ResultCodes>,
    #[serde(default)]
    result_xdr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultCodes {
    #[serde(default)]
    transaction: String,
    #[serde(default)]
    operations: Vec<String>,
}

impl HorizonClient {
    /// Create a client with a request timeout covering Horizon's own
    /// submission timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("friendbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetworkError::other(format!("building http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

fn problem_error(status: StatusCode, body: &str) -> NetworkError {
    let problem: Problem = serde_json::from_str(body).unwrap_or_default();
    classify_problem(status, problem)
}

fn classify_problem(status: StatusCode, problem: Problem) -> NetworkError {
    let extras = problem.extras.unwrap_or_default();
    let codes = extras.result_codes.unwrap_or_default();
    let message = format!(
        "horizon error: {} (status {}): {} [tx: {}, ops: {:?}]",
        if problem.title.is_empty() { status.as_str() } else { problem.title.as_str() },
        status.as_u16(),
        problem.detail,
        codes.transaction,
        codes.operations,
    );

    let err = if status == StatusCode::NOT_FOUND {
        NetworkError::not_found(message)
    } else if codes.transaction == BAD_SEQ_CODE {
        NetworkError::bad_sequence(message)
    } else if status == StatusCode::GATEWAY_TIMEOUT
        || problem.status == StatusCode::GATEWAY_TIMEOUT.as_u16()
    {
        NetworkError::timeout(message)
    } else {
        NetworkError::other(message)
    };
    match extras.result_xdr {
        Some(xdr) => err.with_result_xdr(xdr),
        None => err,
    }
}

#[async_trait]
impl NetworkClient for HorizonClient {
    #[instrument(skip(self, envelope_xdr), fields(backend = "horizon"))]
    async fn submit_transaction(&self, envelope_xdr: &str) -> Result<(), NetworkError> {
        let url = format!("{}/transactions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .form(&[("tx", envelope_xdr)])
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(problem_error(status, &body));
        }
        let parsed: SubmitResponse = serde_json::from_str(&body)
            .map_err(|e| NetworkError::other(format!("decoding submit response: {e}")))?;
        if !parsed.successful {
            let err = NetworkError::other("horizon reported an unsuccessful transaction");
            return Err(match parsed.result_xdr {
                Some(xdr) => err.with_result_xdr(xdr),
                None => err,
            });
        }
        debug!("transaction applied");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "horizon"))]
    async fn get_account_details(&self, account_id: &str) -> Result<AccountDetails, NetworkError> {
        let url = format!("{}/accounts/{}", self.base_url, account_id);
        let resp = self.http.get(&url).send().await.map_err(transport_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(problem_error(status, &body));
        }

        let account: AccountResponse = serde_json::from_str(&body)
            .map_err(|e| NetworkError::other(format!("decoding account response: {e}")))?;
        let sequence = account
            .sequence
            .parse::<i64>()
            .map_err(|e| NetworkError::other(format!("invalid sequence {:?}: {e}", account.sequence)))?;
        let balance = match account.balances.iter().find(|b| b.asset_type == "native") {
            Some(line) => parse_amount(&line.balance)
                .map_err(|e| NetworkError::other(format!("invalid native balance: {e}")))?,
            None => 0,
        };
        Ok(AccountDetails { sequence, balance })
    }

    async fn simulate_transaction(
        &self,
        _envelope_xdr: &str,
    ) -> Result<SimulationResult, NetworkError> {
        Err(NetworkError::unsupported(
            "horizon does not support transaction simulation",
        ))
    }
}

//! RPC backend: asynchronous submission over JSON-RPC
//!
//! `sendTransaction` only queues the transaction; the outcome is observed by
//! polling `getTransaction` under [`PollConfig`] until the transaction is
//! applied, fails, or the deadline elapses.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stellar_xdr::curr::{
    LedgerEntryData, LedgerKey, LedgerKeyAccount, Limits, ReadXdr, ScVal,
    SorobanAuthorizationEntry, SorobanTransactionData, WriteXdr,
};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use super::ledger_errors::{decode_transaction_result, is_bad_sequence_result};
use super::{
    transport_error, AccountDetails, NetworkClient, NetworkError, PollConfig, SimulationResult,
};
use crate::tx_builder::operations::account_id;

/// Client for an RPC server
#[derive(Debug, Clone)]
pub struct RpcClient {
    url: String,
    http: reqwest::Client,
    poll: PollConfig,
    next_id: Arc<AtomicU64>,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetLedgerEntriesResponse {
    #[serde(default)]
    entries: Option<Vec<LedgerEntryResult>>,
}

#[derive(Debug, Deserialize)]
struct LedgerEntryResult {
    xdr: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendTransactionResponse {
    status: String,
    hash: String,
    #[serde(default)]
    error_result_xdr: Option<String>,
    #[serde(default)]
    diagnostic_events_xdr: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetTransactionResponse {
    status: String,
    #[serde(default)]
    result_xdr: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulateTransactionResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    transaction_data: Option<String>,
    #[serde(default)]
    min_resource_fee: Option<String>,
    #[serde(default)]
    results: Option<Vec<SimulateHostFunctionResult>>,
    #[serde(default)]
    events: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SimulateHostFunctionResult {
    #[serde(default)]
    auth: Vec<String>,
    #[serde(default)]
    xdr: Option<String>,
}

fn decode_xdr<T: ReadXdr>(what: &str, raw: &str) -> Result<T, NetworkError> {
    let bytes = STANDARD
        .decode(raw)
        .map_err(|e| NetworkError::other(format!("decoding {what} base64: {e}")))?;
    T::from_xdr(bytes, Limits::none())
        .map_err(|e| NetworkError::other(format!("decoding {what} xdr: {e}")))
}

impl RpcClient {
    pub fn new(
        url: impl Into<String>,
        request_timeout: Duration,
        poll: PollConfig,
    ) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("friendbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetworkError::other(format!("building http client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            poll,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, NetworkError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let resp = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NetworkError::other(format!("{method}: http status {status}")));
        }
        let envelope: RpcEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| NetworkError::other(format!("{method}: decoding response: {e}")))?;
        if let Some(err) = envelope.error {
            return Err(NetworkError::other(format!(
                "{method}: rpc error {}: {}",
                err.code, err.message
            )));
        }
        envelope
            .result
            .ok_or_else(|| NetworkError::other(format!("{method}: empty result")))
    }

    /// Poll `getTransaction` until a terminal status. Unbounded on its own;
    /// the caller applies the deadline.
    async fn wait_for_transaction(&self, hash: &str) -> Result<(), NetworkError> {
        let mut attempt = 0u32;
        loop {
            sleep(self.poll.backoff(attempt)).await;
            attempt = attempt.saturating_add(1);

            let resp: GetTransactionResponse =
                match self.call("getTransaction", json!({ "hash": hash })).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        warn!(hash, attempt, error = %e, "getTransaction failed, still polling");
                        continue;
                    }
                };
            match resp.status.as_str() {
                "SUCCESS" => return Ok(()),
                "FAILED" => {
                    let err = NetworkError::other(format!("transaction {hash} failed"));
                    return Err(match resp.result_xdr {
                        Some(xdr) => err.with_result_xdr(xdr),
                        None => err,
                    });
                }
                status => debug!(hash, attempt, status, "transaction not final yet"),
            }
        }
    }
}

#[async_trait]
impl NetworkClient for RpcClient {
    #[instrument(skip(self, envelope_xdr), fields(backend = "rpc"))]
    async fn submit_transaction(&self, envelope_xdr: &str) -> Result<(), NetworkError> {
        let started = Instant::now();
        let sent: SendTransactionResponse = self
            .call("sendTransaction", json!({ "transaction": envelope_xdr }))
            .await?;
        let events = sent.diagnostic_events_xdr.unwrap_or_default();

        match sent.status.as_str() {
            "PENDING" | "DUPLICATE" => {}
            "ERROR" => {
                let result_xdr = sent.error_result_xdr.unwrap_or_default();
                let bad_seq = decode_transaction_result(&result_xdr)
                    .map(|r| is_bad_sequence_result(&r))
                    .unwrap_or(false);
                let message = format!("transaction {} rejected", sent.hash);
                let err = if bad_seq {
                    NetworkError::bad_sequence(message)
                } else {
                    NetworkError::other(message)
                };
                return Err(err.with_result_xdr(result_xdr).with_diagnostic_events(events));
            }
            other => {
                return Err(NetworkError::other(format!(
                    "transaction {} not accepted: {other}",
                    sent.hash
                )))
            }
        }

        match tokio::time::timeout(self.poll.deadline, self.wait_for_transaction(&sent.hash)).await
        {
            Ok(outcome) => {
                debug!(
                    hash = %sent.hash,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ok = outcome.is_ok(),
                    "transaction reached terminal state"
                );
                outcome
            }
            Err(_) => Err(NetworkError::timeout(format!(
                "transaction {} not final after {:?}",
                sent.hash, self.poll.deadline
            ))),
        }
    }

    #[instrument(skip(self), fields(backend = "rpc"))]
    async fn get_account_details(&self, account: &str) -> Result<AccountDetails, NetworkError> {
        let key = LedgerKey::Account(LedgerKeyAccount {
            account_id: account_id(account)
                .map_err(|e| NetworkError::other(e.to_string()))?,
        });
        let key_xdr = key
            .to_xdr(Limits::none())
            .map_err(|e| NetworkError::other(format!("encoding ledger key: {e}")))?;
        let resp: GetLedgerEntriesResponse = self
            .call("getLedgerEntries", json!({ "keys": [STANDARD.encode(key_xdr)] }))
            .await?;

        let entries = resp.entries.unwrap_or_default();
        let [entry] = entries.as_slice() else {
            return Err(NetworkError::not_found(format!(
                "account {account} not found ({} entries)",
                entries.len()
            )));
        };
        match decode_xdr::<LedgerEntryData>("ledger entry", &entry.xdr)? {
            LedgerEntryData::Account(acc) => Ok(AccountDetails {
                sequence: acc.seq_num.0,
                balance: acc.balance,
            }),
            _ => Err(NetworkError::other(format!(
                "ledger entry for {account} is not an account"
            ))),
        }
    }

    #[instrument(skip(self, envelope_xdr), fields(backend = "rpc"))]
    async fn simulate_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<SimulationResult, NetworkError> {
        let resp: SimulateTransactionResponse = self
            .call("simulateTransaction", json!({ "transaction": envelope_xdr }))
            .await?;
        if let Some(error) = resp.error {
            return Err(NetworkError::other(format!("simulation failed: {error}"))
                .with_diagnostic_events(resp.events.unwrap_or_default()));
        }

        let transaction_data = resp
            .transaction_data
            .ok_or_else(|| NetworkError::other("simulation returned no transaction data"))?;
        let transaction_data: SorobanTransactionData =
            decode_xdr("transaction data", &transaction_data)?;
        let min_resource_fee = resp
            .min_resource_fee
            .as_deref()
            .unwrap_or("0")
            .parse::<i64>()
            .map_err(|e| NetworkError::other(format!("invalid minResourceFee: {e}")))?;

        let (auth, result) = match resp.results.unwrap_or_default().into_iter().next() {
            Some(host_fn) => {
                let auth = host_fn
                    .auth
                    .iter()
                    .map(|a| decode_xdr::<SorobanAuthorizationEntry>("auth entry", a))
                    .collect::<Result<Vec<_>, _>>()?;
                let result = host_fn
                    .xdr
                    .as_deref()
                    .map(|x| decode_xdr::<ScVal>("result value", x))
                    .transpose()?;
                (auth, result)
            }
            None => (Vec::new(), None),
        };

        Ok(SimulationResult {
            min_resource_fee,
            transaction_data,
            auth,
            result,
        })
    }
}

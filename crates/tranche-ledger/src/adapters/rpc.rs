//! JSON-RPC adapter for a real ledger node.
//!
//! Speaks the `{method, params: [{..}]}` request shape over HTTP. Only three
//! methods are used: `account_info` for balances and sequences, `submit` for
//! signed blobs, and `tx` for validation status.
//!
//! The submitted blob is [`SignedTransaction::to_blob`]: hex of the signed
//! JSON transaction. Only a node that understands that encoding accepts it;
//! public networks expect their binary codec and will refuse it.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tranche_core::{Address, Amount, Operation};
use tranche_crypto::AccountHandle;

use crate::error::LedgerError;
use crate::traits::LedgerClient;
use crate::types::{codes, FinalResult, SignedTransaction, SubmissionHandle};

const ACCOUNT_NOT_FOUND: &str = "actNotFound";
const TRANSACTION_NOT_FOUND: &str = "txnNotFound";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    id: u64,
    method: &'a str,
    params: [Value; 1],
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
}

/// Why a call did not produce a usable result.
#[derive(Debug)]
enum CallError {
    /// HTTP or connection failure.
    Transport(String),
    /// The node answered with `status: "error"`.
    Node { error: String, message: String },
    /// The answer did not have the expected shape.
    Malformed(String),
}

impl From<CallError> for LedgerError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Transport(msg) => LedgerError::Network(msg),
            CallError::Node { error, message } => LedgerError::MalformedResponse(format!(
                "node error {error}: {message}"
            )),
            CallError::Malformed(msg) => LedgerError::MalformedResponse(msg),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccountData {
    #[serde(rename = "Balance")]
    balance: String,
    #[serde(rename = "Sequence")]
    sequence: u32,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    account_data: AccountData,
}

#[derive(Debug, Deserialize)]
struct SubmitResult {
    engine_result: String,
    #[serde(default)]
    engine_result_message: String,
    #[serde(default)]
    tx_json: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TxMeta {
    #[serde(rename = "TransactionResult")]
    transaction_result: String,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    validated: bool,
    #[serde(default)]
    meta: Option<TxMeta>,
    #[serde(default)]
    ledger_index: Option<u32>,
    #[serde(rename = "Fee", default)]
    fee: Option<String>,
}

/// Ledger client for a node reachable over JSON-RPC.
pub struct JsonRpcLedger {
    client: Client,
    url: String,
    fee: Amount,
    poll_interval: Duration,
    request_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(
        url: impl Into<String>,
        fee: Amount,
        poll_interval: Duration,
        request_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            fee,
            poll_interval,
            request_id: AtomicU64::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, CallError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest {
            id,
            method,
            params: [params],
        };

        tracing::trace!(method, id, "rpc call");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Transport(format!("HTTP {status} - {body}")));
        }

        let rpc_response: RpcResponse = response
            .json()
            .await
            .map_err(|e| CallError::Malformed(e.to_string()))?;
        let result = rpc_response
            .result
            .ok_or_else(|| CallError::Malformed(format!("{method}: empty response")))?;

        if result.get("status").and_then(Value::as_str) == Some("error") {
            let field = |name: &str| {
                result
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            return Err(CallError::Node {
                error: field("error"),
                message: field("error_message"),
            });
        }

        serde_json::from_value(result).map_err(|e| CallError::Malformed(format!("{method}: {e}")))
    }

    async fn account_info(&self, address: &Address) -> Result<AccountInfo, CallError> {
        self.call(
            "account_info",
            json!({ "account": address.as_str(), "ledger_index": "validated" }),
        )
        .await
    }

    /// One status poll. `Ok(None)` means not yet validated.
    async fn poll_once(&self, handle: &SubmissionHandle) -> Result<Option<FinalResult>, LedgerError> {
        let tx: TxResult = match self
            .call("tx", json!({ "transaction": handle.transaction_id }))
            .await
        {
            Ok(tx) => tx,
            Err(CallError::Node { error, .. }) if error == TRANSACTION_NOT_FOUND => return Ok(None),
            Err(CallError::Transport(reason)) => {
                return Err(LedgerError::FinalityUnknown {
                    transaction_id: handle.transaction_id.clone(),
                    reason,
                })
            }
            Err(other) => return Err(other.into()),
        };

        if !tx.validated {
            return Ok(None);
        }

        let outcome_code = tx
            .meta
            .map(|m| m.transaction_result)
            .ok_or_else(|| LedgerError::MalformedResponse("validated tx without meta".into()))?;
        let fee = match tx.fee {
            Some(drops) => parse_drops(&drops)?,
            None => self.fee,
        };

        Ok(Some(FinalResult {
            committed: outcome_code == codes::SUCCESS,
            transaction_id: handle.transaction_id.clone(),
            outcome_code,
            fee,
            ledger_sequence: tx.ledger_index.unwrap_or_default(),
        }))
    }
}

fn parse_drops(drops: &str) -> Result<Amount, LedgerError> {
    drops
        .parse::<u64>()
        .map(Amount::from_drops)
        .map_err(|e| LedgerError::MalformedResponse(format!("bad drops value {drops:?}: {e}")))
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    async fn submit(
        &self,
        operation: &Operation,
        signer: &AccountHandle,
    ) -> Result<SubmissionHandle, LedgerError> {
        let source = operation.source();
        if signer.address() != source {
            return Err(LedgerError::rejected(
                codes::BAD_AUTH,
                format!("{} cannot sign for {source}", signer.address()),
            ));
        }

        let sequence = match self.account_info(source).await {
            Ok(info) => info.account_data.sequence,
            Err(CallError::Node { error, message }) if error == ACCOUNT_NOT_FOUND => {
                return Err(LedgerError::rejected(codes::NO_ACCOUNT, message));
            }
            Err(other) => return Err(other.into()),
        };

        let signed = SignedTransaction::sign(operation, signer, sequence, self.fee);
        let result: SubmitResult = self
            .call("submit", json!({ "tx_blob": signed.to_blob() }))
            .await?;

        if !codes::accepted_at_submission(&result.engine_result) {
            tracing::warn!(
                source = %source,
                code = %result.engine_result,
                "submission refused by node"
            );
            return Err(LedgerError::RejectedByNetwork {
                code: result.engine_result,
                message: result.engine_result_message,
            });
        }

        let transaction_id = result
            .tx_json
            .as_ref()
            .and_then(|tx| tx.get("hash"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| signed.transaction_id());

        tracing::debug!(
            tx = %transaction_id,
            kind = %operation.kind(),
            source = %source,
            sequence,
            code = %result.engine_result,
            "submission accepted"
        );

        Ok(SubmissionHandle {
            transaction_id,
            source: source.clone(),
            sequence,
            submitted_at: Utc::now(),
        })
    }

    async fn await_finality(
        &self,
        handle: &SubmissionHandle,
        timeout: Duration,
    ) -> Result<FinalResult, LedgerError> {
        let poll = async {
            loop {
                if let Some(result) = self.poll_once(handle).await? {
                    return Ok::<_, LedgerError>(result);
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(tx = %handle.transaction_id, ?timeout, "no validation within bound");
                Err(LedgerError::Timeout(timeout))
            }
        }
    }

    async fn get_balance(&self, address: &Address) -> Result<Amount, LedgerError> {
        match self.account_info(address).await {
            Ok(info) => parse_drops(&info.account_data.balance),
            Err(CallError::Node { error, .. }) if error == ACCOUNT_NOT_FOUND => Ok(Amount::ZERO),
            Err(other) => Err(other.into()),
        }
    }

    fn ledger_id(&self) -> &str {
        "jsonrpc"
    }
}

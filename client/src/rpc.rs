use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration, Instant};

use crate::error::{ClientError, Result};

#[derive(Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Deserialize, Debug)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Deserialize, Debug)]
struct StatusesResult {
    value: Vec<Option<StatusValue>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct StatusValue {
    err: Option<serde_json::Value>,
    confirmation_status: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Not seen yet, or seen but below the confirmed commitment.
    Pending,
    Confirmed,
    Failed(String),
}

/// Looks up the landing status of a submitted transaction.
#[async_trait]
pub trait SignatureConfirmer: Send + Sync {
    async fn status(&self, signature: &str) -> Result<SignatureStatus>;
}

pub struct RpcConfirmer {
    http: reqwest::Client,
    rpc_url: String,
}

impl RpcConfirmer {
    pub fn new(rpc_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url: rpc_url.to_string(),
        }
    }
}

#[async_trait]
impl SignatureConfirmer for RpcConfirmer {
    async fn status(&self, signature: &str) -> Result<SignatureStatus> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "getSignatureStatuses",
            params: vec![
                serde_json::json!([signature]),
                serde_json::json!({
                    "searchTransactionHistory": true
                }),
            ],
        };

        let response = self.http.post(&self.rpc_url).json(&request).send().await?;
        let rpc_response: RpcResponse<StatusesResult> = response.json().await?;
        parse_statuses(rpc_response)
    }
}

fn parse_statuses(rpc_response: RpcResponse<StatusesResult>) -> Result<SignatureStatus> {
    if let Some(error) = rpc_response.error {
        return Err(ClientError::Rpc(format!("{} ({})", error.message, error.code)));
    }

    let status = rpc_response
        .result
        .and_then(|result| result.value.into_iter().next().flatten());
    Ok(match status {
        None => SignatureStatus::Pending,
        Some(StatusValue { err: Some(err), .. }) if !err.is_null() => SignatureStatus::Failed(err.to_string()),
        Some(StatusValue {
            confirmation_status: Some(level),
            ..
        }) if level == "confirmed" || level == "finalized" => SignatureStatus::Confirmed,
        Some(_) => SignatureStatus::Pending,
    })
}

/// Poll until the signature reaches a terminal status or `timeout` passes.
/// Returns [`SignatureStatus::Pending`] on timeout.
pub async fn wait_for_confirmation(
    confirmer: &dyn SignatureConfirmer,
    signature: &str,
    poll: Duration,
    timeout: Duration,
) -> Result<SignatureStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match confirmer.status(signature).await {
            Ok(SignatureStatus::Pending) => {}
            Ok(terminal) => return Ok(terminal),
            Err(e) => tracing::warn!("Signature status lookup failed: {}", e),
        }
        if Instant::now() + poll > deadline {
            return Ok(SignatureStatus::Pending);
        }
        sleep(poll).await;
    }
}

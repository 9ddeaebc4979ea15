use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::BoardKeypair;
use crate::error::LedgerError;
use crate::session::Identity;

// JSON-RPC error code the program uses for signature/authority mismatches.
const UNAUTHORIZED_CODE: i64 = -32401;

/// Fixed reference to the remote account holding the board. Derived once at
/// startup from the persisted keypair and the program identifier; immutable
/// for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardHandle {
    pub account: String,
    pub program: String,
}

impl BoardHandle {
    pub fn derive(keypair: &BoardKeypair, program_id: &str) -> Self {
        Self {
            account: keypair.address.clone(),
            program: program_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    pub submitter: String,
}

/// What the controller needs from the remote account. `RpcGateway` is the
/// production implementation; tests script a fake.
///
/// None of these retry: retry policy belongs to whoever drives the state
/// machine, not to the transport.
pub trait LedgerGateway {
    async fn fetch_links(&self, handle: &BoardHandle) -> Result<Vec<Link>, LedgerError>;
    async fn initialize_board(
        &self,
        handle: &BoardHandle,
        authority: &Identity,
    ) -> Result<(), LedgerError>;
    async fn append_link(
        &self,
        handle: &BoardHandle,
        authority: &Identity,
        url: &str,
    ) -> Result<(), LedgerError>;
}

pub struct RpcGateway {
    client: Client,
    rpc_url: String,
    board_secret: Zeroizing<String>,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

// Minimal schema of the account payload. The program may store more; the
// client only relies on the link list.
#[derive(Deserialize)]
struct AccountPayload {
    #[serde(default)]
    links: Vec<Link>,
}

impl RpcGateway {
    pub fn new(rpc_url: String, board_secret: Zeroizing<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            rpc_url,
            board_secret,
        }
    }

    async fn call(
        &self,
        rpc_method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": Uuid::new_v4().to_string(),
            "method": rpc_method,
            "params": params,
        });

        let resp = self.client.post(&self.rpc_url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LedgerError::Remote(format!("http {}", status)));
        }

        let parsed: RpcResponse = resp.json().await?;

        if let Some(err) = parsed.error {
            if err.code == UNAUTHORIZED_CODE {
                return Err(LedgerError::Unauthorized(err.message));
            }
            return Err(LedgerError::Remote(format!(
                "rpc {}: {}",
                err.code, err.message
            )));
        }

        parsed
            .result
            .ok_or_else(|| LedgerError::Remote("rpc response missing result".to_string()))
    }
}

impl LedgerGateway for RpcGateway {
    async fn fetch_links(&self, handle: &BoardHandle) -> Result<Vec<Link>, LedgerError> {
        let result = self
            .call("getAccountInfo", json!([handle.account]))
            .await?;

        // A null value is the node's way of saying the account was never
        // created. Expected outcome, not a failure.
        let value = &result["value"];
        if value.is_null() {
            return Err(LedgerError::AccountNotFound);
        }

        let data = value["data"]
            .as_str()
            .ok_or_else(|| LedgerError::Remote("account data missing".to_string()))?;
        let bytes = STANDARD
            .decode(data)
            .map_err(|e| LedgerError::Remote(format!("account data is not base64: {}", e)))?;
        let payload: AccountPayload = serde_json::from_slice(&bytes)
            .map_err(|e| LedgerError::Remote(format!("account data malformed: {}", e)))?;

        Ok(payload.links)
    }

    async fn initialize_board(
        &self,
        handle: &BoardHandle,
        authority: &Identity,
    ) -> Result<(), LedgerError> {
        self.call(
            "initializeBoard",
            json!({
                "account": handle.account,
                "program": handle.program,
                "authority": authority.as_str(),
                "ownerSecret": self.board_secret.as_str(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn append_link(
        &self,
        handle: &BoardHandle,
        authority: &Identity,
        url: &str,
    ) -> Result<(), LedgerError> {
        self.call(
            "appendLink",
            json!({
                "account": handle.account,
                "program": handle.program,
                "authority": authority.as_str(),
                "url": url,
            }),
        )
        .await?;
        Ok(())
    }
}

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::WalletError;
use crate::session::Identity;

// The native analog of a browser-injected wallet object: a local agent
// daemon that owns keys and trust decisions. The client only ever asks it
// to connect; it never sees key material.
pub trait WalletProvider {
    async fn is_available(&self) -> bool;
    async fn connect_silent(&self) -> Result<Identity, WalletError>;
    async fn connect_interactive(&self) -> Result<Identity, WalletError>;
}

pub struct AgentWallet {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct ConnectRequest {
    only_if_trusted: bool,
}

#[derive(Deserialize)]
struct ConnectResponse {
    pubkey: String,
}

impl AgentWallet {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn connect(&self, only_if_trusted: bool) -> Result<Identity, WalletError> {
        let url = format!("{}/connect", self.base_url);
        let mut builder = self
            .client
            .post(url)
            .json(&ConnectRequest { only_if_trusted });

        // An interactive connect blocks on a human approving inside the
        // agent; give it far longer than the transport default.
        if !only_if_trusted {
            builder = builder.timeout(Duration::from_secs(120));
        }

        let res = builder.send().await;

        match res {
            Err(e) if e.is_connect() => Err(WalletError::NoProvider),
            Err(e) => Err(WalletError::Provider(e.to_string())),
            Ok(resp) => match resp.status() {
                StatusCode::OK => {
                    let body: ConnectResponse = resp
                        .json()
                        .await
                        .map_err(|e| WalletError::Provider(e.to_string()))?;
                    Ok(Identity::new(body.pubkey))
                }
                StatusCode::FORBIDDEN => Err(WalletError::Rejected),
                status => Err(WalletError::Provider(format!(
                    "unexpected status {} from wallet agent",
                    status
                ))),
            },
        }
    }
}

impl WalletProvider for AgentWallet {
    async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        matches!(
            self.client.get(url).send().await,
            Ok(resp) if resp.status() == StatusCode::OK
        )
    }

    async fn connect_silent(&self) -> Result<Identity, WalletError> {
        self.connect(true).await
    }

    async fn connect_interactive(&self) -> Result<Identity, WalletError> {
        self.connect(false).await
    }
}

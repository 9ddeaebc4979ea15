use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::WalletError;
use crate::logger::log;
use crate::wallet::WalletProvider;

/// Public identifier of the connected wallet account. Opaque and stable for
/// the lifetime of a session; both connect paths yield the same canonical
/// value for the same wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for headers and list rows: `abcd..wxyz`.
    pub fn short(&self) -> String {
        shorten(&self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn shorten(id: &str) -> String {
    if id.len() <= 12 {
        id.to_string()
    } else {
        format!("{}..{}", &id[..4], &id[id.len() - 4..])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected(Identity),
}

pub struct Session<W> {
    provider: W,
    state: SessionState,
}

impl<W: WalletProvider> Session<W> {
    pub fn new(provider: W) -> Self {
        Self {
            provider,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Connected(id) => Some(id),
            SessionState::Disconnected => None,
        }
    }

    pub fn provider(&self) -> &W {
        &self.provider
    }

    /// Trusted reconnection, attempted once at startup. Succeeds only if the
    /// wallet previously granted trust; never prompts.
    pub async fn connect_silent(&mut self) -> Result<Identity, WalletError> {
        if let SessionState::Connected(id) = &self.state {
            return Ok(id.clone());
        }
        let identity = self.provider.connect_silent().await?;
        log(&format!("session: silent connect as {}", identity.short()));
        self.state = SessionState::Connected(identity.clone());
        Ok(identity)
    }

    /// User-initiated connection; the wallet agent may prompt for approval.
    pub async fn connect_interactive(&mut self) -> Result<Identity, WalletError> {
        if let SessionState::Connected(id) = &self.state {
            return Ok(id.clone());
        }
        let identity = self.provider.connect_interactive().await?;
        log(&format!("session: connected as {}", identity.short()));
        self.state = SessionState::Connected(identity.clone());
        Ok(identity)
    }

    // Not reachable from the UI yet; kept so a future disconnect action is a
    // one-line wiring change.
    #[allow(dead_code)]
    pub fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
    }
}

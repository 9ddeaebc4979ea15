use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("No wallet agent found. Install one and run it before connecting.")]
    NoProvider,

    #[error("Connection request was rejected by the wallet")]
    Rejected,

    #[error("Wallet agent error: {0}")]
    Provider(String),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Board account does not exist yet")]
    AccountNotFound,

    #[error("Write rejected by the program: {0}")]
    Unauthorized(String),

    #[error("Ledger RPC error: {0}")]
    Remote(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        LedgerError::Remote(e.to_string())
    }
}

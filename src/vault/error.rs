#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Invalid Vault address {0:?}: {1}")]
    InvalidAddress(String, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Api(String),

    #[error("HTTP status {0}: {1}")]
    HttpStatus(u16, String),

    #[error("Vault is already initialized")]
    AlreadyInitialized,

    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Error from reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

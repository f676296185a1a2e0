//! Error taxonomy of the provider's lifecycle operations.

use crate::k8s::KubeError;
use crate::vault::VaultError;
use std::path::PathBuf;

/// Failures while importing a saved init response.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("invalid import id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("unsupported scheme {0:?}, expected file://")]
    UnsupportedScheme(String),

    #[error("failed reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed parsing init response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider block cannot produce a usable client.
    #[error("{0}")]
    Config(String),

    /// Resource data does not match its schema.
    #[error("{0}")]
    State(String),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Kube(#[from] KubeError),

    #[error(transparent)]
    Import(#[from] ImportError),
}

impl ProviderError {
    pub fn config(msg: impl Into<String>) -> Self {
        ProviderError::Config(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        ProviderError::State(msg.into())
    }
}

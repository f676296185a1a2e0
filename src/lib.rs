//! vaultoperator - Terraform provider for Vault's one-time initialization
//!
//! This crate implements the `vaultoperator` provider. It exposes a single
//! managed resource and a data source, both named `vaultoperator_init`:
//!
//! - the resource calls Vault's `sys/init` endpoint once and keeps the unseal
//!   keys, recovery keys and root token in state
//! - the data source reports whether Vault is already initialized
//!
//! ## Architecture
//!
//! - `provider` module - schemas, configuration and the lifecycle entry points
//! - `vault` module - HTTP client for the Vault `sys/init` API
//! - `k8s` module - Kubernetes client and the port-forward used to reach Vault
//!   running inside a cluster
//! - `cli` module - command-line host driving the provider lifecycle
//! - `error` module - provider-level errors
//!
//! The plugin host only ever sees [`provider::Diagnostics`]; every lower-level
//! error is carried into them with its message unchanged.

pub mod cli;
pub mod error;
pub mod k8s;
pub mod provider;
pub mod vault;

pub use error::{ImportError, ProviderError};
pub use provider::{Diagnostics, Provider};

/// Initialize logging for tests
#[cfg(test)]
#[allow(dead_code)]
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

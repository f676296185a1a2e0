//! Vault module for the vaultoperator provider
//!
//! This module implements the small slice of the HashiCorp Vault HTTP API the
//! provider needs: `sys/init` to initialize a server and to query whether it
//! already is.
//!
//! ## Testing strategy:
//! - Each module contains its own unit tests within a `#[cfg(test)] mod tests` block
//! - Tests against a real server use Docker containers via `test_utils.rs` and are `#[ignore]`d
//! - Integration tests in the `tests/` directory run against an in-process mock Vault

pub mod client;
pub mod common;
pub mod error;
pub mod init;
pub mod status;
#[cfg(test)]
pub mod test_utils;

// Re-export key types for convenience
pub use client::{ClientOptions, VaultClient};
pub use error::VaultError;
pub use init::{init_vault, InitRequest, InitResponse};
pub use status::init_status;

//! Provider configuration: turns the provider block into a ready client.
//!
//! The Vault address is taken from the first non-empty of `vault_addr`,
//! `vault_url` (deprecated), the `VAULT_ADDR` environment variable, and
//! finally `http://localhost:<local_port>` when a `kube_config` block is
//! present. Only the last of these routes traffic through a port-forward.

use crate::error::ProviderError;
use crate::k8s::{ExecSpec, KubeConn, KubeSettings};
use crate::provider::data::ResourceData;
use crate::provider::diag::Diagnostics;
use crate::provider::{
    ARG_EXEC, ARG_KUBE_CONFIG, ARG_KUBE_CONFIG_PATH, ARG_LOCAL_PORT, ARG_NAMESPACE,
    ARG_REMOTE_PORT, ARG_REQUEST_HEADERS, ARG_SERVICE_NAME, ARG_VAULT_ADDR, ARG_VAULT_SKIP_VERIFY,
    ARG_VAULT_URL,
};
use crate::vault::{ClientOptions, VaultClient};
use std::collections::HashMap;
use std::env::VarError;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, warn};

pub const ENV_VAULT_ADDR: &str = "VAULT_ADDR";
pub const ENV_VAULT_SKIP_VERIFY: &str = "VAULT_SKIP_VERIFY";

/// Read access to environment variables.
pub trait ReadEnv {
    fn var(&self, key: &str) -> Result<String, VarError>;
}

/// Delegates to the process environment.
pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    #[inline]
    fn var(&self, key: &str) -> Result<String, VarError> {
        std::env::var(key)
    }
}

impl ReadEnv for HashMap<String, String> {
    fn var(&self, key: &str) -> Result<String, VarError> {
        self.get(key).cloned().ok_or(VarError::NotPresent)
    }
}

/// Which input the Vault address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    VaultAddr,
    VaultUrl,
    Environment,
    KubeForward,
}

/// Resolved provider block. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub address: String,
    pub source: AddressSource,
    pub client_options: ClientOptions,
    pub kube: Option<KubeSettings>,
}

impl ProviderConfig {
    /// Resolves the provider block. Deprecation warnings are added to `diags`.
    pub fn resolve<E: ReadEnv>(
        d: &ResourceData,
        env: &E,
        diags: &mut Diagnostics,
    ) -> Result<Self, ProviderError> {
        let kube = d
            .get_block(ARG_KUBE_CONFIG)
            .map(|block| kube_settings(&block, env))
            .transpose()?;

        let (address, source) = if d.is_set(ARG_VAULT_ADDR) {
            (d.get_string(ARG_VAULT_ADDR), AddressSource::VaultAddr)
        } else if d.is_set(ARG_VAULT_URL) {
            let msg = format!(
                "{:?} is deprecated, please use {:?} instead",
                ARG_VAULT_URL, ARG_VAULT_ADDR
            );
            warn!("{}", msg);
            diags.warning(msg, Some(ARG_VAULT_URL));
            (d.get_string(ARG_VAULT_URL), AddressSource::VaultUrl)
        } else if let Some(addr) = env.var(ENV_VAULT_ADDR).ok().filter(|a| !a.is_empty()) {
            (addr, AddressSource::Environment)
        } else if let Some(kube) = &kube {
            (
                format!("http://localhost:{}", kube.local_port),
                AddressSource::KubeForward,
            )
        } else {
            return Err(ProviderError::config(format!(
                "argument '{}' is required, or set {} environment variable",
                ARG_VAULT_ADDR, ENV_VAULT_ADDR
            )));
        };
        debug!("Resolved Vault address {} from {:?}", address, source);

        let skip_verify = d.get_bool(ARG_VAULT_SKIP_VERIFY)
            || env
                .var(ENV_VAULT_SKIP_VERIFY)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true"))
                .unwrap_or(false);

        Ok(Self {
            address,
            source,
            client_options: ClientOptions {
                skip_verify,
                request_headers: d.get_string_map(ARG_REQUEST_HEADERS),
            },
            kube,
        })
    }

    /// Whether Create has to open a port-forward before reaching Vault.
    pub fn uses_port_forward(&self) -> bool {
        self.source == AddressSource::KubeForward
    }
}

fn kube_settings<E: ReadEnv>(block: &ResourceData, env: &E) -> Result<KubeSettings, ProviderError> {
    let namespace = block.get_string(ARG_NAMESPACE);
    if namespace.is_empty() {
        return Err(ProviderError::config("Vault namespace is not specified"));
    }

    let service = block.get_string(ARG_SERVICE_NAME);
    if service.is_empty() {
        return Err(ProviderError::config("Vault service name is not specified"));
    }

    let exec = block.get_block(ARG_EXEC).map(|spec| ExecSpec {
        api_version: spec.get_string("api_version"),
        command: spec.get_string("command"),
        args: spec.get_string_list("args"),
        env: spec.get_string_map("env"),
    });
    if let Some(exec) = &exec {
        exec.to_exec_config()
            .map_err(|e| ProviderError::config(format!("Failed to parse exec: {}", e)))?;
    }

    Ok(KubeSettings {
        path: expand_home(&block.get_string(ARG_KUBE_CONFIG_PATH), env)?,
        namespace,
        service,
        local_port: parse_port(ARG_LOCAL_PORT, &block.get_string(ARG_LOCAL_PORT))?,
        remote_port: parse_port(ARG_REMOTE_PORT, &block.get_string(ARG_REMOTE_PORT))?,
        exec,
    })
}

fn parse_port(name: &str, value: &str) -> Result<u16, ProviderError> {
    value.parse().map_err(|_| {
        ProviderError::config(format!("{} must be a port number, got {:?}", name, value))
    })
}

/// Expands a leading `~` to the caller's home directory.
pub fn expand_home<E: ReadEnv>(path: &str, env: &E) -> Result<PathBuf, ProviderError> {
    match path.strip_prefix('~') {
        Some(rest) => {
            let home = env
                .var("HOME")
                .ok()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| ProviderError::config("unable to get HOME directory"))?;
            Ok(PathBuf::from(format!("{}{}", home, rest)))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// The configured provider: a Vault client and, when Vault is reached through
/// Kubernetes, the cluster connection used to open the tunnel.
#[derive(Clone)]
pub struct ApiClient {
    pub config: ProviderConfig,
    pub vault: VaultClient,
    pub kube: Option<KubeConn>,
}

impl ApiClient {
    pub async fn connect(config: ProviderConfig) -> Result<Self, ProviderError> {
        let vault = VaultClient::new(&config.address, &config.client_options).map_err(|e| {
            error!("failed to create Vault API client: {}", e);
            ProviderError::config(format!("failed to create Vault API client: {}", e))
        })?;

        let kube = match (&config.kube, config.uses_port_forward()) {
            (Some(settings), true) => Some(
                KubeConn::connect(settings)
                    .await
                    .map_err(|e| ProviderError::config(format!("failed to configure: {}", e)))?,
            ),
            _ => None,
        };

        Ok(Self { config, vault, kube })
    }

    /// Address of the Vault server, also used as resource id.
    pub fn address(&self) -> &str {
        self.vault.address()
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("vault", &self.vault)
            .field("kube", &self.kube.as_ref().map(|k| (&k.namespace, &k.service)))
            .finish()
    }
}

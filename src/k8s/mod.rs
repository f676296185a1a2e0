//! Kubernetes access used to reach a Vault pod before calling its API.
//!
//! A `KubeConn` is built once from the provider's `kube_config` block. The
//! tunnel itself is only opened by the init resource's Create, see
//! [`portforward::establish`].

pub mod error;
pub mod portforward;
pub mod signal;
#[cfg(test)]
pub mod test_utils;

pub use error::KubeError;

use k8s_openapi::api::core::v1::Pod;
use kube::config::{ExecConfig, KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Exec-style credential plugin, as given in the `exec` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecSpec {
    pub api_version: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl ExecSpec {
    /// Converts into the kubeconfig representation of an exec plugin.
    pub fn to_exec_config(&self) -> Result<ExecConfig, KubeError> {
        if self.api_version.is_empty() || self.command.is_empty() {
            return Err(KubeError::InvalidExec(
                "api_version and command are required".to_string(),
            ));
        }

        let env: Vec<_> = self
            .env
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();

        serde_json::from_value(json!({
            "apiVersion": self.api_version,
            "command": self.command,
            "args": self.args,
            "env": env,
        }))
        .map_err(|e| KubeError::InvalidExec(e.to_string()))
    }
}

/// Resolved `kube_config` block.
#[derive(Debug, Clone, PartialEq)]
pub struct KubeSettings {
    /// Kubeconfig path with `~` already expanded.
    pub path: PathBuf,
    pub namespace: String,
    pub service: String,
    pub local_port: u16,
    pub remote_port: u16,
    pub exec: Option<ExecSpec>,
}

/// A live Kubernetes client plus the coordinates of the Vault service.
#[derive(Clone)]
pub struct KubeConn {
    pub namespace: String,
    pub service: String,
    pub local_port: u16,
    pub remote_port: u16,
    pub client: Client,
}

impl KubeConn {
    /// Loads the kubeconfig, applies the exec override and builds a client.
    pub async fn connect(settings: &KubeSettings) -> Result<Self, KubeError> {
        debug!("Loading kubeconfig from {}", settings.path.display());
        let mut kubeconfig = Kubeconfig::read_from(&settings.path)?;

        if let Some(exec) = &settings.exec {
            let exec = exec.to_exec_config()?;
            for named in kubeconfig.auth_infos.iter_mut() {
                if let Some(auth_info) = named.auth_info.as_mut() {
                    auth_info.exec = Some(exec.clone());
                }
            }
        }

        let config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        let client = Client::try_from(config)?;

        Ok(Self {
            namespace: settings.namespace.clone(),
            service: settings.service.clone(),
            local_port: settings.local_port,
            remote_port: settings.remote_port,
            client,
        })
    }
}

/// Renders a label map as a `k=v,k=v` selector.
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Name of the first pod in `Running` phase.
pub fn pick_live_pod(pods: &[Pod]) -> Result<String, KubeError> {
    pods.iter()
        .filter(|pod| {
            pod.status
                .as_ref()
                .and_then(|status| status.phase.as_deref())
                == Some("Running")
        })
        .find_map(|pod| pod.metadata.name.clone())
        .ok_or(KubeError::NoLivePods)
}

#[derive(Debug, thiserror::Error)]
pub enum KubeError {
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("invalid exec configuration: {0}")]
    InvalidExec(String),

    #[error("service {0:?} has no pod selector")]
    MissingSelector(String),

    #[error("no Vault pods found behind service {0:?}")]
    NoPods(String),

    #[error("no live pods behind the service")]
    NoLivePods,

    #[error("port {0} is not available on the forwarded connection")]
    StreamUnavailable(u16),

    #[error("port-forward failed: {0}")]
    Forward(String),

    #[error("port-forward was cancelled")]
    Cancelled,

    #[error("port-forward setup ended without becoming ready")]
    SetupAborted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

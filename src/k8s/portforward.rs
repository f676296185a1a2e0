//! Local port-forward to a Vault pod.
//!
//! A `PortForward` owns a listener on `127.0.0.1:<local_port>` and relays each
//! accepted connection to the pod through the Kubernetes API. It stays up
//! until its cancellation token fires, which happens on [`PortForward::close`],
//! on drop, or on SIGINT/SIGTERM.

use crate::k8s::{pick_live_pod, selector_string, KubeConn, KubeError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, ListParams};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where accepted local connections are relayed to.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// Relays one client connection until either side closes it.
    async fn relay(&self, conn: TcpStream) -> Result<(), KubeError>;
}

/// Relays connections to a port on a pod via the pod's `portforward` subresource.
pub struct PodUpstream {
    pods: Api<Pod>,
    pod: String,
    port: u16,
}

#[async_trait]
impl Upstream for PodUpstream {
    async fn relay(&self, mut conn: TcpStream) -> Result<(), KubeError> {
        let mut forwarder = self.pods.portforward(&self.pod, &[self.port]).await?;
        let mut upstream = forwarder
            .take_stream(self.port)
            .ok_or(KubeError::StreamUnavailable(self.port))?;

        tokio::io::copy_bidirectional(&mut conn, &mut upstream).await?;
        drop(upstream);

        forwarder
            .join()
            .await
            .map_err(|e| KubeError::Forward(e.to_string()))
    }
}

/// A running tunnel. Dropping it tears the tunnel down.
pub struct PortForward {
    local_addr: SocketAddr,
    token: CancellationToken,
}

impl PortForward {
    /// Binds the local listener and starts relaying to `upstream`.
    ///
    /// The tunnel is ready for traffic once this returns.
    pub async fn bind(
        local_port: u16,
        upstream: Arc<dyn Upstream>,
        token: CancellationToken,
    ) -> Result<Self, KubeError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, local_port)).await?;
        let local_addr = listener.local_addr()?;
        debug!("Port-forward listening on {}", local_addr);

        tokio::spawn(accept_loop(listener, upstream, token.clone()));

        Ok(Self { local_addr, token })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stops accepting connections and aborts in-flight relays.
    pub fn close(&self) {
        if !self.token.is_cancelled() {
            info!("Stopping port-forward on {}", self.local_addr);
            self.token.cancel();
        }
    }
}

impl Drop for PortForward {
    fn drop(&mut self) {
        self.close();
    }
}

async fn accept_loop(listener: TcpListener, upstream: Arc<dyn Upstream>, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    debug!("Forwarding connection from {}", peer);
                    let upstream = upstream.clone();
                    let token = token.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => {}
                            res = upstream.relay(conn) => {
                                if let Err(e) = res {
                                    warn!("Forwarded connection from {} failed: {}", peer, e);
                                }
                            }
                        }
                    });
                }
                Err(e) => warn!("Failed to accept forwarded connection: {}", e),
            }
        }
    }
}

/// Finds a running Vault pod behind the configured service and forwards
/// `local_port` to its `remote_port`.
///
/// Discovery and setup run on a background task; this waits for whichever
/// comes first of the ready signal, the setup error, or cancellation.
pub async fn establish(
    conn: &KubeConn,
    token: CancellationToken,
) -> Result<PortForward, KubeError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (err_tx, err_rx) = oneshot::channel();

    let setup_conn = conn.clone();
    let setup_token = token.clone();
    let mut setup = tokio::spawn(async move {
        match setup_forward(&setup_conn, setup_token).await {
            Ok(forward) => {
                let _ = ready_tx.send(forward);
            }
            Err(e) => {
                debug!("Port-forward setup failed: {}", e);
                let _ = err_tx.send(e);
            }
        }
    });

    let result = tokio::select! {
        biased;
        Ok(forward) = ready_rx => {
            debug!("Port-forwarding is ready to handle traffic");
            Ok(forward)
        }
        Ok(err) = err_rx => Err(err),
        _ = &mut setup => Err(KubeError::SetupAborted),
        _ = token.cancelled() => Err(KubeError::Cancelled),
    };

    setup.abort();
    result
}

async fn setup_forward(
    conn: &KubeConn,
    token: CancellationToken,
) -> Result<PortForward, KubeError> {
    let services: Api<Service> = Api::namespaced(conn.client.clone(), &conn.namespace);
    let svc = services.get(&conn.service).await?;

    let selector = svc
        .spec
        .and_then(|spec| spec.selector)
        .map(|labels| selector_string(&labels))
        .filter(|selector| !selector.is_empty())
        .ok_or_else(|| KubeError::MissingSelector(conn.service.clone()))?;

    let pods: Api<Pod> = Api::namespaced(conn.client.clone(), &conn.namespace);
    let list = pods.list(&ListParams::default().labels(&selector)).await?;
    if list.items.is_empty() {
        return Err(KubeError::NoPods(conn.service.clone()));
    }

    let pod = pick_live_pod(&list.items)?;
    info!(
        "Forwarding 127.0.0.1:{} to {}/{}:{}",
        conn.local_port, conn.namespace, pod, conn.remote_port
    );

    let upstream = Arc::new(PodUpstream {
        pods,
        pod,
        port: conn.remote_port,
    });
    PortForward::bind(conn.local_port, upstream, token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::test_utils::{
        conn_to, free_port, pod, service, wait_port_released, MockCluster, SERVICE,
    };
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Echoes everything back, standing in for a pod.
    struct EchoUpstream;

    #[async_trait]
    impl Upstream for EchoUpstream {
        async fn relay(&self, conn: TcpStream) -> Result<(), KubeError> {
            let (mut reader, mut writer) = conn.into_split();
            tokio::io::copy(&mut reader, &mut writer).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_forward_relays_traffic() -> Result<(), Box<dyn std::error::Error>> {
        let forward = PortForward::bind(0, Arc::new(EchoUpstream), CancellationToken::new()).await?;

        let mut client = TcpStream::connect(forward.local_addr()).await?;
        client.write_all(b"sys/init").await?;
        let mut buf = [0u8; 8];
        client.read_exact(&mut buf).await?;
        assert_eq!(&buf, b"sys/init");
        Ok(())
    }

    #[tokio::test]
    async fn test_close_stops_listener() -> Result<(), Box<dyn std::error::Error>> {
        let forward = PortForward::bind(0, Arc::new(EchoUpstream), CancellationToken::new()).await?;
        let addr = forward.local_addr();
        forward.close();
        assert!(forward.is_closed());

        // Give the accept loop a chance to observe the cancellation.
        let mut refused = false;
        for _ in 0..50 {
            if TcpStream::connect(addr).await.is_err() {
                refused = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(refused, "listener should be closed after close()");
        Ok(())
    }

    #[tokio::test]
    async fn test_drop_cancels_token() -> Result<(), Box<dyn std::error::Error>> {
        let token = CancellationToken::new();
        let forward = PortForward::bind(0, Arc::new(EchoUpstream), token.clone()).await?;
        drop(forward);
        assert!(token.is_cancelled());
        Ok(())
    }

    #[tokio::test]
    async fn test_establish_reports_unreachable_api() {
        let conn = conn_to("http://127.0.0.1:9", 0);
        let result = establish(&conn, CancellationToken::new()).await;
        assert!(matches!(result, Err(KubeError::Api(_))));
    }

    #[tokio::test]
    async fn test_establish_cancelled_before_ready() {
        let conn = conn_to("http://127.0.0.1:9", 0);
        let token = CancellationToken::new();
        token.cancel();
        let err = establish(&conn, token).await.err().unwrap();
        assert!(matches!(err, KubeError::Cancelled));
        assert_eq!(err.to_string(), "port-forward was cancelled");
    }

    #[actix_rt::test]
    async fn test_establish_without_pods() {
        let cluster = MockCluster::start(service(Some(json!({"app": "vault"}))), vec![], 0);
        let err = establish(&cluster.conn, CancellationToken::new()).await.err().unwrap();
        assert!(matches!(err, KubeError::NoPods(ref svc) if svc == SERVICE));
        cluster.stop().await;
    }

    #[actix_rt::test]
    async fn test_establish_without_selector() {
        let cluster = MockCluster::start(service(None), vec![pod("vault-0", "Running")], 0);
        let err = establish(&cluster.conn, CancellationToken::new()).await.err().unwrap();
        assert!(matches!(err, KubeError::MissingSelector(_)));
        cluster.stop().await;
    }

    #[actix_rt::test]
    async fn test_establish_without_running_pod() {
        let cluster = MockCluster::start(
            service(Some(json!({"app": "vault"}))),
            vec![pod("vault-0", "Pending"), pod("vault-1", "Failed")],
            0,
        );
        let err = establish(&cluster.conn, CancellationToken::new()).await.err().unwrap();
        assert!(matches!(err, KubeError::NoLivePods));
        cluster.stop().await;
    }

    #[actix_rt::test]
    async fn test_establish_ready_binds_local_port() {
        let port = free_port();
        let cluster = MockCluster::start(
            service(Some(json!({"app": "vault"}))),
            vec![pod("vault-0", "Pending"), pod("vault-1", "Running")],
            port,
        );
        let token = CancellationToken::new();

        let forward = establish(&cluster.conn, token.clone()).await.unwrap();
        assert_eq!(forward.local_addr().port(), port);
        assert!(!forward.is_closed());

        drop(forward);
        assert!(token.is_cancelled());
        assert!(wait_port_released(port).await);
        cluster.stop().await;
    }

    #[tokio::test]
    async fn test_bind_fails_on_busy_port() -> Result<(), Box<dyn std::error::Error>> {
        let first = PortForward::bind(0, Arc::new(EchoUpstream), CancellationToken::new()).await?;
        let port = first.local_addr().port();
        let second =
            PortForward::bind(port, Arc::new(EchoUpstream), CancellationToken::new()).await;
        assert!(matches!(second, Err(KubeError::Io(_))));
        Ok(())
    }
}

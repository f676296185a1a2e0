//! A stand-in Kubernetes API server for port-forward tests.
//!
//! Serves one Service and one Pod list from an actix-web server on an
//! ephemeral port. Must run on an actix system (`#[actix_rt::test]`).

use crate::k8s::KubeConn;
use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpResponse, HttpServer};
use kube::{Client, Config};
use serde_json::{json, Value};
use std::net::TcpListener;

pub const NAMESPACE: &str = "vault";
pub const SERVICE: &str = "vault";

struct Objects {
    service: Value,
    pods: Value,
}

pub struct MockCluster {
    pub conn: KubeConn,
    handle: ServerHandle,
}

impl MockCluster {
    pub fn start(service: Value, pods: Vec<Value>, local_port: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());

        let objects = web::Data::new(Objects {
            service,
            pods: json!({
                "apiVersion": "v1",
                "kind": "PodList",
                "metadata": {},
                "items": pods,
            }),
        });
        let server = HttpServer::new(move || {
            App::new()
                .app_data(objects.clone())
                .route(
                    "/api/v1/namespaces/{namespace}/services/{name}",
                    web::get().to(get_service),
                )
                .route("/api/v1/namespaces/{namespace}/pods", web::get().to(list_pods))
        })
        .workers(1)
        .disable_signals()
        .listen(listener)
        .unwrap()
        .run();

        let handle = server.handle();
        actix_rt::spawn(server);

        MockCluster {
            conn: conn_to(&uri, local_port),
            handle,
        }
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
    }
}

async fn get_service(objects: web::Data<Objects>) -> HttpResponse {
    HttpResponse::Ok().json(&objects.service)
}

async fn list_pods(objects: web::Data<Objects>) -> HttpResponse {
    HttpResponse::Ok().json(&objects.pods)
}

/// A connection to an API server at `uri` with no credentials.
pub fn conn_to(uri: &str, local_port: u16) -> KubeConn {
    let config = Config::new(uri.parse().unwrap());
    KubeConn {
        namespace: NAMESPACE.to_string(),
        service: SERVICE.to_string(),
        local_port,
        remote_port: 8200,
        client: Client::try_from(config).unwrap(),
    }
}

pub fn service(selector: Option<Value>) -> Value {
    let mut spec = json!({ "ports": [{ "port": 8200 }] });
    if let Some(selector) = selector {
        spec["selector"] = selector;
    }
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": SERVICE, "namespace": NAMESPACE },
        "spec": spec,
    })
}

pub fn pod(name: &str, phase: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": name, "namespace": NAMESPACE },
        "status": { "phase": phase },
    })
}

/// A local port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Waits until nothing listens on `port` any more.
pub async fn wait_port_released(port: u16) -> bool {
    for _ in 0..50 {
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    false
}

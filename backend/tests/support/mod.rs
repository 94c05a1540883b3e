//! Shared helpers for integration tests: real downstream HTTP servers.

use std::net::SocketAddr;

use actix_web::dev::ServerHandle;
use actix_web::{App, HttpServer, web};
use url::Url;

/// A downstream service listening on an ephemeral local port.
pub struct Downstream {
    addr: SocketAddr,
    handle: ServerHandle,
}

impl Downstream {
    /// Base URL of the server, optionally scoped under `prefix`.
    pub fn url(&self, prefix: &str) -> Url {
        Url::parse(&format!("http://{}/{}", self.addr, prefix.trim_start_matches('/')))
            .expect("downstream url")
    }

    /// Stop accepting connections.
    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

/// Start a single-worker downstream server on `127.0.0.1:0`.
pub fn spawn_downstream<F>(configure: F) -> Downstream
where
    F: Fn(&mut web::ServiceConfig) + Send + Clone + 'static,
{
    let server = HttpServer::new(move || App::new().configure(configure.clone()))
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("bind downstream");
    let addr = server.addrs().first().copied().expect("bound address");
    let server = server.run();
    let handle = server.handle();
    actix_rt::spawn(server);
    Downstream { addr, handle }
}

//! Minimal `/healthz` and `/metrics` surface. No HTTP framework in the
//! dependency stack for this, so requests are parsed by hand off a raw
//! `TcpListener` — just enough to satisfy a liveness probe and a
//! Prometheus scrape, nothing that warrants routing or middleware.

use relayer_core::resolver::Resolver;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::warn;

pub async fn serve(addr: SocketAddr, resolver: Arc<Resolver>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "health/metrics listener started");
    loop {
        let (mut stream, _) = listener.accept().await?;
        let resolver = resolver.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let n = match stream.read(&mut buf).await {
                Ok(n) => n,
                Err(err) => {
                    warn!(error = %err, "health connection read failed");
                    return;
                }
            };
            let request = String::from_utf8_lossy(&buf[..n]);
            let path = request
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(1))
                .unwrap_or("/");

            let response = match path {
                "/metrics" => {
                    let body = relayer_core::metrics::render();
                    http_response("200 OK", "text/plain; version=0.0.4", &body)
                }
                "/healthz" => {
                    let stats = resolver.stats();
                    let body = serde_json::to_string(&stats).unwrap_or_default();
                    http_response("200 OK", "application/json", &body)
                }
                _ => http_response("404 Not Found", "text/plain", "not found"),
            };

            if let Err(err) = stream.write_all(response.as_bytes()).await {
                warn!(error = %err, "health connection write failed");
            }
        });
    }
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{body}",
        status = status,
        content_type = content_type,
        len = body.len(),
        body = body,
    )
}

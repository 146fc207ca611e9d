//! reqwest-backed [`ControlApi`] implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tc_core::error::TcError;
use tracing::{debug, info};

use crate::ControlApi;
use crate::types::{BuildInfo, ConfigRequest, ConfigResponse};

/// Turn a non-2xx status into [`TcError::Http`].
fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(TcError::Http(format!("{what} returned {status}")).into())
    }
}

pub struct ControlClient {
    http: reqwest::Client,
    /// REST base URL (e.g. `http://127.0.0.1:8000`).
    base_url: String,
}

impl ControlClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        let base_url = base_url.trim_end_matches('/').to_owned();
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ControlApi for ControlClient {
    async fn build_info(&self) -> Result<BuildInfo> {
        let url = self.url("/build");
        let resp = self.http.get(&url).send().await.context("GET /build")?;
        let info: BuildInfo = check_status(resp, "GET /build")?.json().await?;
        info!(
            "[control] producer build {} ({:?})",
            info.build_id, info.server_time
        );
        Ok(info)
    }

    async fn apply_config(&self, request: &ConfigRequest) -> Result<ConfigResponse> {
        let url = self.url("/config");
        debug!("[control] POST {url} {request:?}");
        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .context("POST /config")?;
        let applied: ConfigResponse = check_status(resp, "POST /config")?.json().await?;
        info!(
            "[control] applied sensitivity={} price_noise={} soprano_rhythm={}",
            applied.sensitivity, applied.price_noise, applied.soprano_rhythm
        );
        Ok(applied)
    }

    async fn reset(&self) -> Result<()> {
        let url = self.url("/reset");
        let resp = self.http.post(&url).send().await.context("POST /reset")?;
        check_status(resp, "POST /reset")?;
        info!("[control] producer reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned JSON response and return the request head.
    async fn serve_once(
        status: &str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let status = status.to_owned();
        let task = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let len = body.len();
            let resp = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
                 content-length: {len}\r\nconnection: close\r\n\r\n{body}"
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        });
        (format!("http://{addr}/"), task)
    }

    #[tokio::test]
    async fn fetches_build_info() {
        let body = r#"{"build_id":"B1","server_path":"/srv/main.py"}"#;
        let (base, server) = serve_once("200 OK", body).await;
        let client = ControlClient::new(&base, Duration::from_secs(5)).unwrap();
        let info = client.build_info().await.unwrap();
        assert_eq!(info.build_id, "B1");
        let head = server.await.unwrap();
        assert!(head.starts_with("GET /build "));
    }

    #[tokio::test]
    async fn http_errors_are_reported() {
        let (base, server) = serve_once("500 Internal Server Error", "{}").await;
        let client = ControlClient::new(&base, Duration::from_secs(5)).unwrap();
        assert!(client.reset().await.is_err());
        assert!(server.await.unwrap().starts_with("POST /reset "));
    }

    #[tokio::test]
    async fn unreachable_server_fails() {
        let client = ControlClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        assert!(client.build_info().await.is_err());
    }
}

// ABOUTME: HTTP health probe over a raw hyper connection.
// ABOUTME: Healthy on 2xx; connection errors and timeouts are reported as failures.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::Empty;
use hyper::Uri;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

/// Result of a single HTTP probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The endpoint returned 2xx.
    Healthy,
    /// The endpoint answered with a non-2xx status.
    Unhealthy,
    /// The probe could not complete (bad URL, connection error, timeout).
    Failed,
}

impl ProbeResult {
    pub fn is_healthy(self) -> bool {
        self == ProbeResult::Healthy
    }
}

/// GET `url` and classify the response. Only plain `http://` is supported;
/// services are probed on their local listeners.
pub async fn http_probe(url: &str, timeout: Duration) -> ProbeResult {
    let uri: Uri = match url.parse() {
        Ok(uri) => uri,
        Err(e) => {
            debug!(error = %e, %url, "invalid health check url");
            return ProbeResult::Failed;
        }
    };

    let Some(host) = uri.host().map(str::to_string) else {
        debug!(%url, "health check url has no host");
        return ProbeResult::Failed;
    };
    let port = uri.port_u16().unwrap_or(80);
    let authority = format!("{host}:{port}");
    let path = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let result = tokio::time::timeout(timeout, async {
        let stream = match TcpStream::connect(&authority).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %url, "health probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %url, "health probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let request = match hyper::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", &authority)
            .header("user-agent", concat!("keystone/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<Bytes>::new())
        {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, %url, "failed to build health probe request");
                return ProbeResult::Failed;
            }
        };

        match sender.send_request(request).await {
            Ok(response) if response.status().is_success() => ProbeResult::Healthy,
            Ok(response) => {
                debug!(status = %response.status(), %url, "health probe non-2xx");
                ProbeResult::Unhealthy
            }
            Err(e) => {
                debug!(error = %e, %url, "health probe request failed");
                ProbeResult::Failed
            }
        }
    })
    .await;

    result.unwrap_or_else(|_| {
        debug!(%url, "health probe timed out");
        ProbeResult::Failed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!("{status_line}\r\ncontent-length: 0\r\n\r\n");
            let _ = socket.write_all(response.as_bytes()).await;
        });
        format!("http://{addr}/health")
    }

    #[tokio::test]
    async fn success_status_is_healthy() {
        let url = serve_once("HTTP/1.1 200 OK").await;
        assert_eq!(
            http_probe(&url, Duration::from_secs(2)).await,
            ProbeResult::Healthy
        );
    }

    #[tokio::test]
    async fn error_status_is_unhealthy() {
        let url = serve_once("HTTP/1.1 503 Service Unavailable").await;
        assert_eq!(
            http_probe(&url, Duration::from_secs(2)).await,
            ProbeResult::Unhealthy
        );
    }

    #[tokio::test]
    async fn invalid_url_fails() {
        assert_eq!(
            http_probe("not a url", Duration::from_secs(1)).await,
            ProbeResult::Failed
        );
    }
}

//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use upstream_guard::resilience::supervisor::ChunkStream;
use upstream_guard::UpstreamError;

/// Start a programmable mock upstream. Each accepted connection asks the
/// callback for a `(status, body)` pair.
pub async fn start_programmable_upstream<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Operation for the supervisor that GETs `url` with reqwest and forwards
/// the body as a chunk stream, translating errors the way the embedding
/// chat controller would.
pub fn http_operation(
    url: String,
) -> impl Fn(
    CancellationToken,
) -> std::pin::Pin<
    Box<dyn Future<Output = Result<ChunkStream, UpstreamError>> + Send>,
> + Send
       + 'static {
    move |cancel: CancellationToken| {
        let url = url.clone();
        Box::pin(async move {
            let client = reqwest::Client::builder()
                .pool_max_idle_per_host(0)
                .no_proxy()
                .build()
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;

            let send = client.get(&url).send();
            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                result = send => result.map_err(|e| UpstreamError::Transport(e.to_string()))?,
            };

            let status = response.status();
            if !status.is_success() {
                return Err(UpstreamError::Status {
                    code: status.as_u16(),
                });
            }

            let stream = response
                .bytes_stream()
                .map(|item| -> Result<Bytes, UpstreamError> {
                    item.map_err(|e| UpstreamError::Stream(e.to_string()))
                });
            Ok(Box::pin(stream) as ChunkStream)
        })
    }
}

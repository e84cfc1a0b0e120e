use crate::error::{FetchError, Result};
use satstore::config::NetworkSection;
use std::future::Future;
use std::time::Duration;

const USER_AGENT: &str = concat!("satfetcher/", env!("CARGO_PKG_VERSION"));

/// A fetched page. Any HTTP status counts as an answer.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    pub body: String,
}

/// reqwest client with a per-request timeout and bounded, fixed-delay retry.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpSource {
    pub fn new(network: &NetworkSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(network.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            max_attempts: network.max_attempts.max(1),
            retry_delay: Duration::from_millis(network.retry_delay_ms),
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Downloads `url`. Transport errors and non-success statuses are retried.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.with_retry(url, || self.bytes_once(url)).await
    }

    /// Fetches `url` as text. Only transport errors are retried, a 404 is an answer.
    pub async fn get_page(&self, url: &str) -> Result<Page> {
        self.with_retry(url, || self.page_once(url)).await
    }

    async fn bytes_once(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn page_once(&self, url: &str) -> Result<Page> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(Page { status, body })
    }

    async fn with_retry<T, F, Fut>(&self, url: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts => {
                    log::warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        self.max_attempts,
                        url,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        last: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP/1.1 server answering every request through `respond(path, hit)`.
    /// `hit` counts connections from 0.
    pub async fn serve<F>(respond: F) -> (SocketAddr, Arc<AtomicUsize>)
    where
        F: Fn(&str, usize) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let respond = Arc::new(respond);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let hit = counter.fetch_add(1, Ordering::SeqCst);
                let respond = Arc::clone(&respond);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut read = 0;
                    while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf[read..]).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => read += n,
                        }
                        if read == buf.len() {
                            break;
                        }
                    }
                    let request = String::from_utf8_lossy(&buf[..read]);
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, body) = respond(&path, hit);
                    // status 0 drops the connection without an answer
                    if status == 0 {
                        return;
                    }
                    let response = format!(
                        "HTTP/1.1 {status} X\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (addr, hits)
    }
}

#[cfg(test)]
mod tests {
    use super::test_server::serve;
    use super::*;
    use std::sync::atomic::Ordering;

    fn network(max_attempts: u32) -> NetworkSection {
        NetworkSection {
            max_attempts,
            retry_delay_ms: 1,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_get_bytes_retries_server_errors() {
        let (addr, hits) = serve(|_, hit| {
            if hit < 2 {
                (503, "busy".to_string())
            } else {
                (200, "1957-001A\n".to_string())
            }
        })
        .await;

        let http = HttpSource::new(&network(3)).unwrap();
        let bytes = http.get_bytes(&format!("http://{addr}/satcat.txt")).await.unwrap();
        assert_eq!(bytes, b"1957-001A\n");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_get_bytes_gives_up_after_max_attempts() {
        let (addr, hits) = serve(|_, _| (500, "down".to_string())).await;

        let http = HttpSource::new(&network(2)).unwrap();
        let err = http
            .get_bytes(&format!("http://{addr}/satcat.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { attempts: 2, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_page_returns_not_found_without_retry() {
        let (addr, hits) = serve(|_, _| (404, "missing".to_string())).await;

        let http = HttpSource::new(&network(3)).unwrap();
        let page = http.get_page(&format!("http://{addr}/wiki/X")).await.unwrap();
        assert_eq!(page.status, 404);
        assert_eq!(page.body, "missing");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

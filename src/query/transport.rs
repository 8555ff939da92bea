//! Internode Transport
//!
//! The coordinator only needs one terminal answer per target: a response
//! (which may carry a remote execution error) or a transport error.

use super::protocol::{ENDPOINT_INTERNAL_REDUCE, ReduceRequest, ReduceResponse};
use crate::membership::types::Node;

use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait Transport: Send + Sync {
    /// Sends one target's scan request. `Err` means the node was not reached
    /// or its answer could not be read.
    fn dispatch<'a>(
        &'a self,
        node: &'a Node,
        request: ReduceRequest,
    ) -> BoxFuture<'a, Result<ReduceResponse>>;
}

/// JSON over HTTP to the target's internal reduce endpoint.
pub struct HttpTransport {
    http_client: reqwest::Client,
    request_timeout: Duration,
    attempts: usize,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration, attempts: usize) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            request_timeout,
            attempts: attempts.max(1),
        }
    }

    async fn post_with_retry<T: serde::Serialize>(
        &self,
        url: String,
        payload: &T,
    ) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let response = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(self.request_timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == self.attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    tracing::debug!("POST {} failed (attempt {}): {}", url, attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 3)
    }
}

impl Transport for HttpTransport {
    fn dispatch<'a>(
        &'a self,
        node: &'a Node,
        request: ReduceRequest,
    ) -> BoxFuture<'a, Result<ReduceResponse>> {
        Box::pin(async move {
            let url = format!("http://{}{}", node.http_addr, ENDPOINT_INTERNAL_REDUCE);
            let response = self.post_with_retry(url, &request).await?;
            let status = response.status();

            match response.json::<ReduceResponse>().await {
                Ok(body) => Ok(body),
                Err(e) if status.is_success() => {
                    Err(anyhow::anyhow!("Malformed reply from {}: {}", node.id, e))
                }
                Err(_) => Err(anyhow::anyhow!("Reduce request to {} failed {}", node.id, status)),
            }
        })
    }
}

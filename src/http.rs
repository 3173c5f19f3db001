use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::{debug, warn};
use tokio::runtime::Handle as RtHandle;

use crate::backoff::RetryPolicy;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn is_retryable(&self) -> bool {
        self.status >= 500
    }
}

pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse>;
}

/// reqwest on a tokio runtime. Must not be called from a runtime worker
/// thread.
pub struct ReqwestTransport {
    rt: RtHandle,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(rt: RtHandle, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("unable to create HTTP client: {}", e))?;
        Ok(Self { rt, client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        self.rt.block_on(async {
            let mut request = self.client.get(url);
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let response = request
                .send()
                .await
                .map_err(|e| anyhow!("unable to get {}: {}", url, e))?;
            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| anyhow!("unable to read response body from {}: {}", url, e))?;
            Ok(HttpResponse {
                status,
                body: body.to_vec(),
            })
        })
    }
}

pub struct RetryClient {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl RetryClient {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn get(&self, url: &str, headers: &[(String, String)]) -> Result<Vec<u8>> {
        let attempts = self.policy.attempts();
        let mut attempt = 1;
        loop {
            debug!("GET {} (attempt {}/{})", url, attempt, attempts);
            let error = match self.transport.get(url, headers) {
                Ok(response) if response.is_success() => return Ok(response.body),
                Ok(response) if !response.is_retryable() => {
                    return Err(anyhow!(
                        "unable to get {}: status code {}",
                        url,
                        response.status
                    ));
                }
                Ok(response) => anyhow!("status code {}", response.status),
                Err(e) => e,
            };
            if attempt >= attempts {
                return Err(anyhow!(
                    "unable to get {} after {} attempts: {}",
                    url,
                    attempts,
                    error
                ));
            }
            warn!("GET {} failed, retrying: {}", url, error);
            self.policy.sleep();
            attempt += 1;
        }
    }
}

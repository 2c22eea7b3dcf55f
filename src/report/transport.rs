//! Delivery of serialized report bodies.

use crate::error::{Result, VisionError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "report-http")]
use std::time::Duration;

/// Where report bodies go.
#[async_trait::async_trait]
pub trait ReportTransport: Send + Sync {
    /// Submit one body. Any non-success outcome is an error.
    async fn post(&self, body: String) -> Result<()>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "transport"
    }
}

/// HTTP POST to a fixed URL with a fixed content type.
#[cfg(feature = "report-http")]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    content_type: String,
}

#[cfg(feature = "report-http")]
impl HttpTransport {
    pub fn new(endpoint: &str, content_type: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VisionError::Report {
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            content_type: content_type.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(feature = "report-http")]
#[async_trait::async_trait]
impl ReportTransport for HttpTransport {
    async fn post(&self, body: String) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, &self.content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| VisionError::Report {
                message: format!("POST {} failed: {e}", self.endpoint),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VisionError::Report {
                message: format!("POST {} returned {}", self.endpoint, status),
            });
        }

        let reply = response.text().await.unwrap_or_default();
        tracing::debug!("report accepted ({status}): {reply}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// In-memory transport for testing
///
/// Records every body it is given. Clones share the record.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    bodies: Arc<Mutex<Vec<String>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to reject every submission
    pub fn with_failure(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    /// Bodies received so far, including rejected ones.
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.bodies.lock().len()
    }
}

#[async_trait::async_trait]
impl ReportTransport for MemoryTransport {
    async fn post(&self, body: String) -> Result<()> {
        self.bodies.lock().push(body);
        if self.fail.load(Ordering::SeqCst) {
            return Err(VisionError::Report {
                message: "collector unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

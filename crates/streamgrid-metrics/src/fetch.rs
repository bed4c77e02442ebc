//! Counter fetch — capability trait plus the HTTP implementation.
//!
//! The rater depends on the [`CounterFetcher`] trait rather than a concrete
//! transport so tests can substitute deterministic fakes. The production
//! implementation speaks HTTP/1.1 to each replica's metrics endpoint.

use std::future::Future;
use std::pin::Pin;

use http_body_util::BodyExt;
use tracing::debug;

use crate::error::FetchError;
use crate::parse::sum_counter;

/// Boxed future alias for counter fetch results.
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<f64, FetchError>> + Send + 'a>>;

/// Fetches one cumulative counter value from a replica — injected for
/// testability.
///
/// Implementations must not apply their own retry or unbounded waits; the
/// caller wraps each fetch in a per-replica timeout.
pub trait CounterFetcher: Send + Sync {
    /// Fetch the current cumulative counter value for `replica`.
    fn fetch_counter<'a>(&'a self, replica: &'a str) -> FetchFuture<'a>;
}

/// HTTP fetcher that scrapes `http://{replica}:{port}{path}` and extracts
/// a single named counter, summed across partition labels.
///
/// The replica identity must be a resolvable host name (for example a pod
/// name under a headless service).
pub struct HttpCounterFetcher {
    port: u16,
    path: String,
    metric: String,
    required_labels: Vec<(String, String)>,
}

impl HttpCounterFetcher {
    /// Create a fetcher for `metric` on the given metrics port.
    ///
    /// Defaults to the `/metrics` path with no label filter.
    pub fn new(port: u16, metric: impl Into<String>) -> Self {
        Self {
            port,
            path: "/metrics".to_string(),
            metric: metric.into(),
            required_labels: Vec::new(),
        }
    }

    /// Override the metrics endpoint path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Require a `key="value"` label on every sample counted into the sum.
    ///
    /// Used to pin the counter to one pipeline and stage when a replica
    /// exposes metrics for more than one.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.required_labels.push((key.into(), value.into()));
        self
    }

    async fn fetch(&self, replica: &str) -> Result<f64, FetchError> {
        let address = format!("{replica}:{}", self.port);
        let uri = format!("http://{address}{}", self.path);

        let stream = tokio::net::TcpStream::connect(&address)
            .await
            .map_err(|e| FetchError::Connect(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| FetchError::Handshake(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", &address)
            .header("user-agent", "streamgrid-rater/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            debug!(status = %resp.status(), %uri, "metrics scrape non-2xx");
            return Err(FetchError::Status(resp.status().as_u16()));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?
            .to_bytes();
        let text = String::from_utf8_lossy(&body);

        let required: Vec<(&str, &str)> = self
            .required_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        sum_counter(&text, &self.metric, &required)
            .ok_or_else(|| FetchError::MetricMissing(self.metric.clone()))
    }
}

impl CounterFetcher for HttpCounterFetcher {
    fn fetch_counter<'a>(&'a self, replica: &'a str) -> FetchFuture<'a> {
        Box::pin(self.fetch(replica))
    }
}

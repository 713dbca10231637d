//! One request/response cycle and its timing

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use http::Request;

use crate::diagnostics::ServerErrorLog;
use crate::metrics::ReportRecord;
use crate::request::RequestBody;
use crate::traits::{HttpClient, TransportError};

/// Sends requests and writes their outcome into records
///
/// Latency is taken against the run-start instant: the executor notes the
/// offset before the call and subtracts it afterwards.
pub struct RequestExecutor {
    client: Arc<dyn HttpClient>,
    timeout: Option<Duration>,
    diagnostics: Arc<ServerErrorLog>,
}

impl RequestExecutor {
    /// Create an executor around a shared client
    ///
    /// `timeout` bounds the whole exchange, body drain included.
    pub fn new(
        client: Arc<dyn HttpClient>,
        timeout: Option<Duration>,
        diagnostics: Arc<ServerErrorLog>,
    ) -> Self {
        Self {
            client,
            timeout,
            diagnostics,
        }
    }

    /// Run one exchange and fill `record` with cost, status and error
    ///
    /// On failure the status code is left untouched and `error` carries
    /// the description. On success `error` is cleared.
    pub async fn execute(
        &self,
        request: Request<RequestBody>,
        run_start: Instant,
        record: &mut ReportRecord,
    ) {
        let t0 = run_start.elapsed();

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(request, run_start, t0))
                .await
                .unwrap_or(Err(TransportError::Timeout(limit))),
            None => self.exchange(request, run_start, t0).await,
        };

        record.cost = run_start.elapsed().saturating_sub(t0);
        match outcome {
            Ok(code) => {
                record.code = code;
                record.error.clear();
            }
            Err(e) => {
                record.error.clear();
                let _ = write!(record.error, "{e}");
            }
        }
    }

    async fn exchange(
        &self,
        request: Request<RequestBody>,
        run_start: Instant,
        t0: Duration,
    ) -> Result<u16, TransportError> {
        let response = self.client.send(request).await?;
        let status = response.status();
        let mirror = status.is_server_error();

        if mirror {
            let elapsed = run_start.elapsed().saturating_sub(t0);
            if let Err(e) = self
                .diagnostics
                .log_head(status, elapsed, response.version(), response.headers())
                .await
            {
                tracing::debug!(error = %e, "Failed to write server error diagnostics");
            }
        }

        let mut body = response.into_body();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if mirror {
                if let Err(e) = self.diagnostics.write_body(chunk).await {
                    tracing::debug!(error = %e, "Failed to write server error body");
                }
            }
        }

        Ok(status.as_u16())
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("client", &self.client.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

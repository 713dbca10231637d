//! Everything a run needs from the client side, in one value

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BodySource, RunOptions};
use crate::metrics::ByteCounters;
use crate::request::RequestTemplate;
use crate::traits::HttpClient;

/// A constructed client with the request it sends and the counters its
/// connections report into
///
/// Built once from [`RunOptions`] and handed whole to the requester, so the
/// body, the per-request timeout and the byte counters always match the
/// client that was built.
#[derive(Clone)]
pub struct ClientCapability {
    /// Client shared by every worker
    pub client: Arc<dyn HttpClient>,
    /// Canonical request copied per attempt
    pub template: RequestTemplate,
    /// Body sent with every request
    pub body: BodySource,
    /// Bound on each exchange, body drain included
    pub request_timeout: Option<Duration>,
    /// Wire byte totals written by the client's connections
    pub counters: ByteCounters,
}

impl ClientCapability {
    /// Bundle `client` with the request settings of `options`
    ///
    /// `counters` must be the ones the client's connections write into.
    pub fn new(
        client: Arc<dyn HttpClient>,
        template: RequestTemplate,
        options: &RunOptions,
        counters: ByteCounters,
    ) -> Self {
        Self {
            client,
            template,
            body: options.body.clone(),
            request_timeout: options.request_timeout,
            counters,
        }
    }
}

impl std::fmt::Debug for ClientCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCapability")
            .field("client", &self.client.name())
            .field("template", &self.template)
            .field("body", &self.body)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

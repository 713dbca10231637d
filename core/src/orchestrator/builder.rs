//! Builder pattern for Requester construction

use std::sync::Arc;

use crate::capability::ClientCapability;
use crate::channel::{record_channel, ChannelConfig, CloseGuard, RecordReceiver};
use crate::config::LoadConfig;
use crate::diagnostics::ServerErrorLog;
use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;
use crate::metrics::RecordPool;

use super::executor::Requester;

/// Builder for creating a Requester with proper configuration
///
/// # Example
///
/// ```ignore
/// let (requester, records) = RequesterBuilder::new()
///     .load(LoadConfig::new(10).with_requests(1000))
///     .capability(build_client(&options)?)
///     .build()?;
///
/// let consumer = tokio::spawn(summarize(records));
/// let stats = requester.run().await;
/// ```
pub struct RequesterBuilder {
    load: LoadConfig,
    capability: Option<ClientCapability>,
    diagnostics: Option<Arc<ServerErrorLog>>,
    channel_config: Option<ChannelConfig>,
}

impl RequesterBuilder {
    /// Create a new builder with the default load shape
    pub fn new() -> Self {
        Self {
            load: LoadConfig::default(),
            capability: None,
            diagnostics: None,
            channel_config: None,
        }
    }

    /// Set the full load configuration
    pub fn load(mut self, load: LoadConfig) -> Self {
        self.load = load;
        self
    }

    /// Set the concurrency level
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.load.concurrency = concurrency;
        self
    }

    /// Set the client, request and counters the requester owns for the run
    pub fn capability(mut self, capability: ClientCapability) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Sink for 5xx diagnostics (stderr when unset)
    pub fn diagnostics(mut self, log: ServerErrorLog) -> Self {
        self.diagnostics = Some(Arc::new(log));
        self
    }

    /// Override the channel configuration
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = Some(config);
        self
    }

    /// Build the requester and return it along with the record receiver
    ///
    /// # Errors
    ///
    /// Returns an error if no client capability was set, or if the load
    /// configuration does not validate.
    pub fn build(self) -> Result<(Requester, RecordReceiver)> {
        let capability = self.capability.ok_or(Error::MissingConfig("client"))?;
        self.load.validate()?;

        let channel_config = self
            .channel_config
            .unwrap_or_else(|| ChannelConfig::for_concurrency(self.load.concurrency));
        let guard = CloseGuard::new();
        let pool = Arc::new(RecordPool::default());
        let (sender, receiver) = record_channel(&channel_config, guard.clone(), Arc::clone(&pool));
        let lifecycle = Arc::new(Lifecycle::new(guard));

        let requester = Requester {
            load: self.load,
            capability,
            diagnostics: self
                .diagnostics
                .unwrap_or_else(|| Arc::new(ServerErrorLog::stderr())),
            pool,
            records: sender,
            lifecycle,
        };

        Ok((requester, receiver))
    }
}

impl Default for RequesterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

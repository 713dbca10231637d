//! CLI argument parsing and run orchestration

use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use tracing::{debug, info, warn};

use volley_core::config::DEFAULT_MAX_CONNS;
use volley_core::{BodySource, LoadConfig, RequesterBuilder, RunOptions, ServerErrorLog};
use volley_report::{render_json, render_text};
use volley_transport::build_client;

/// volley - concurrent HTTP load generator
#[derive(Parser, Debug)]
#[command(name = "volley")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Target URL
    #[arg(env = "VOLLEY_URL")]
    pub url: String,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 1)]
    pub concurrency: usize,

    /// Total requests to send, -1 for no limit
    #[arg(short = 'n', long, default_value_t = -1, allow_negative_numbers = true)]
    pub requests: i64,

    /// Run duration (e.g. "10s", "2m")
    #[arg(short, long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Requests per second across all workers
    #[arg(long)]
    pub rate: Option<f64>,

    /// Workers started per ramp-up step, defaults to all at once
    #[arg(long)]
    pub ramp_up: Option<usize>,

    /// Pause between ramp-up steps
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    pub ramp_interval: Duration,

    /// HTTP method
    #[arg(short, long, default_value = "GET")]
    pub method: String,

    /// Request header as "name: value", repeatable
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Request body; a leading '@' reads it from the named file per request
    #[arg(short, long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// File streamed as the request body, reopened for every request
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Content-Type header
    #[arg(short = 'T', long)]
    pub content_type: Option<String>,

    /// Host header override; TLS still verifies the URL host
    #[arg(long)]
    pub host: Option<String>,

    /// Client certificate chain (PEM)
    #[arg(long, requires = "key")]
    pub cert: Option<PathBuf>,

    /// Client private key (PEM)
    #[arg(long, requires = "cert")]
    pub key: Option<PathBuf>,

    /// Skip server certificate verification
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// Maximum open connections, 0 for no cap
    #[arg(long, default_value_t = DEFAULT_MAX_CONNS)]
    pub max_conns: usize,

    /// Overall timeout per request
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Timeout per socket read
    #[arg(long, value_parser = humantime::parse_duration)]
    pub read_timeout: Option<Duration>,

    /// Timeout per socket write
    #[arg(long, value_parser = humantime::parse_duration)]
    pub write_timeout: Option<Duration>,

    /// Connect timeout, proxy handshake included
    #[arg(long, value_parser = humantime::parse_duration)]
    pub dial_timeout: Option<Duration>,

    /// Proxy address: "host:port" or socks5:// for SOCKS5, http:// for CONNECT
    #[arg(long)]
    pub proxy: Option<String>,

    /// Write 5xx responses here instead of stderr
    #[arg(long)]
    pub error_log: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Client options described by the flags
    pub fn run_options(&self) -> RunOptions {
        let mut options = RunOptions::new(&self.url)
            .with_method(&self.method)
            .with_body(self.body_source())
            .with_insecure(self.insecure)
            .with_max_conns(self.max_conns);

        options.headers = self.headers.clone();
        options.cert_path = self.cert.clone();
        options.key_path = self.key.clone();
        options.request_timeout = self.timeout;
        options.read_timeout = self.read_timeout;
        options.write_timeout = self.write_timeout;
        options.dial_timeout = self.dial_timeout;
        options.proxy = self.proxy.clone();
        options.content_type = self.content_type.clone();
        options.host = self.host.clone();
        options
    }

    /// Load shape described by the flags
    pub fn load_config(&self) -> LoadConfig {
        let mut load = LoadConfig::new(self.concurrency)
            .with_requests(self.requests)
            .with_ramp_interval(self.ramp_interval);
        if let Some(duration) = self.duration {
            load = load.with_duration(duration);
        }
        if let Some(rate) = self.rate {
            load = load.with_rate(rate);
        }
        if let Some(batch) = self.ramp_up {
            load = load.with_ramp_up(batch);
        }
        load
    }

    fn body_source(&self) -> BodySource {
        if let Some(path) = &self.body_file {
            return BodySource::File(path.clone());
        }
        match self.body.as_deref() {
            Some(body) => match body.strip_prefix('@') {
                Some(path) => BodySource::File(PathBuf::from(path)),
                None => BodySource::Bytes(Bytes::from(body.to_string())),
            },
            None => BodySource::Empty,
        }
    }

    fn diagnostics(&self) -> Result<ServerErrorLog> {
        match &self.error_log {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create error log {}", path.display()))?;
                Ok(ServerErrorLog::new(file))
            }
            None => Ok(ServerErrorLog::stderr()),
        }
    }

    /// Run the load test and print the summary to stdout
    pub async fn run(&self) -> Result<()> {
        let options = self.run_options();
        let load = self.load_config();
        load.validate().context("Invalid load configuration")?;

        let capability = build_client(&options).context("Failed to build HTTP client")?;
        let diagnostics = self.diagnostics()?;
        debug!(?options, ?load, "configuration");

        let (requester, records) = RequesterBuilder::new()
            .load(load)
            .capability(capability)
            .diagnostics(diagnostics)
            .build()
            .context("Failed to build requester")?;

        let consumer = tokio::spawn(volley_report::collect(records));
        let stats = requester.run().await;
        let collector = consumer.await.context("Report consumer failed")?;

        if stats.dropped > 0 {
            warn!(dropped = stats.dropped, "records dropped after the channel closed");
        }
        info!(
            attempts = stats.attempts,
            elapsed = ?stats.elapsed,
            stop_reason = ?stats.stop_reason,
            "run finished"
        );

        let summary = collector.finish(stats.elapsed);
        if self.json {
            println!("{}", render_json(&summary).context("Failed to serialize summary")?);
        } else {
            print!("{}", render_text(&summary));
        }
        Ok(())
    }
}

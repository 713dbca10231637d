//! Client construction from run options

use std::sync::Arc;

use tracing::{debug, info};

use volley_core::{ByteCounters, ClientCapability, RequestTemplate, Result, RunOptions};

use crate::client::{ClientSettings, HyperClient};
use crate::counting::CountingDialer;
use crate::dial::{Dial, DirectDialer};
use crate::proxy;
use crate::tls::TlsSetup;

/// Build the client, its request template and the byte counters its
/// connections write into
///
/// # Errors
/// Fails on an invalid URL, header or method, a malformed proxy address,
/// or unusable TLS material. Nothing is dialed here.
pub fn build_client(options: &RunOptions) -> Result<ClientCapability> {
    let counters = ByteCounters::new();
    let template = RequestTemplate::from_options(options)?;
    let target = template.target().clone();

    let base: Box<dyn Dial> =
        match proxy::resolve(options.proxy.as_deref(), template.is_tls(), &target.host)? {
            Some(spec) => {
                info!(kind = ?spec.kind, proxy = %spec.addr, "dialing through proxy");
                proxy::dialer(spec, options.dial_timeout)
            }
            None => Box::new(DirectDialer::new(options.dial_timeout)),
        };
    let dialer: Arc<dyn Dial> = Arc::new(CountingDialer::new(base, counters.clone()));

    let tls = if template.is_tls() {
        Some(TlsSetup::new(options, template.server_name())?)
    } else {
        None
    };

    let settings = ClientSettings {
        read_timeout: options.read_timeout,
        write_timeout: options.write_timeout,
        max_conns: options.max_conns,
    };
    debug!(target = %target, tls = tls.is_some(), ?settings, "built client");

    let client = HyperClient::new(dialer, tls, target, settings);
    Ok(ClientCapability::new(
        Arc::new(client),
        template,
        options,
        counters,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use volley_core::{BodySource, Error};

    #[test]
    fn test_build_plain_client() {
        let capability =
            build_client(&RunOptions::new("http://127.0.0.1:8080/x")).unwrap();
        assert_eq!(capability.client.name(), "hyper");
        assert_eq!(capability.template.target().port, 8080);
        assert!(format!("{capability:?}").contains("hyper"));
    }

    #[test]
    fn test_capability_carries_request_settings() {
        let options = RunOptions::new("http://127.0.0.1:8080/")
            .with_body(BodySource::bytes("payload"))
            .with_request_timeout(Duration::from_secs(3));
        let capability = build_client(&options).unwrap();
        assert_eq!(capability.body, BodySource::bytes("payload"));
        assert_eq!(capability.request_timeout, Some(Duration::from_secs(3)));
        assert_eq!(capability.counters.read(), 0);
    }

    #[test]
    fn test_build_tls_client() {
        let options = RunOptions::new("https://localhost/").with_insecure(true);
        let capability = build_client(&options).unwrap();
        assert!(capability.template.is_tls());
    }

    #[test]
    fn test_build_rejects_bad_header() {
        let options = RunOptions::new("http://localhost/").with_header("no colon here");
        assert!(matches!(
            build_client(&options),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_build_rejects_bad_proxy() {
        let options = RunOptions::new("http://localhost/").with_proxy("gopher://proxy:70");
        assert!(matches!(
            build_client(&options),
            Err(Error::Proxy(_))
        ));
    }

    #[test]
    fn test_build_rejects_half_client_cert() {
        let mut options = RunOptions::new("https://localhost/");
        options.key_path = Some("/tmp/key.pem".into());
        assert!(matches!(
            build_client(&options),
            Err(Error::Tls(_))
        ));
    }
}

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server answered that the resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("network failure: {0}")]
    Network(String),
    /// The locator cannot be fetched at all.
    #[error("malformed locator: {0}")]
    Malformed(String),
}

/// Opens a byte stream for a remote resource. Implementations must be
/// callable from worker threads.
pub trait Transport: Send + Sync {
    fn open_stream(&self, uri: &str) -> Result<Box<dyn Read + Send>, TransportError>;
}

#[derive(Clone, Debug)]
pub struct NetConfig {
    /// Applied to connect and to each read.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: concat!("mailview/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Blocking HTTP(S) transport over `ureq`, trusting the platform's native
/// root certificates.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(config: &NetConfig) -> Result<Self, TransportError> {
        let tls = native_tls_config()?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.timeout)
            .timeout_read(config.timeout)
            .user_agent(&config.user_agent)
            .tls_config(Arc::new(tls))
            .build();
        Ok(Self { agent })
    }
}

impl Transport for HttpTransport {
    fn open_stream(&self, uri: &str) -> Result<Box<dyn Read + Send>, TransportError> {
        log::debug!(target: "net", "GET {uri}");
        match self.agent.get(uri).call() {
            Ok(resp) => {
                log::trace!(
                    target: "net",
                    "{uri}: {} {}",
                    resp.status(),
                    resp.content_type()
                );
                Ok(Box::new(resp.into_reader()))
            }
            Err(ureq::Error::Status(code, _)) => Err(status_error(code, uri)),
            Err(ureq::Error::Transport(t)) => Err(transport_error(t.kind(), &t.to_string())),
        }
    }
}

fn status_error(code: u16, uri: &str) -> TransportError {
    match code {
        404 | 410 => TransportError::NotFound(format!("{code} {uri}")),
        _ => TransportError::Network(format!("HTTP {code} for {uri}")),
    }
}

fn transport_error(kind: ureq::ErrorKind, message: &str) -> TransportError {
    match kind {
        ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
            TransportError::Malformed(message.to_string())
        }
        _ => TransportError::Network(message.to_string()),
    }
}

fn native_tls_config() -> Result<rustls::ClientConfig, TransportError> {
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        log::warn!(target: "net", "skipping native certificate source: {err}");
    }
    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    log::debug!(target: "net", "loaded {added} native roots ({ignored} ignored)");

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Network(format!("tls setup: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gone_and_missing_are_not_found() {
        assert!(matches!(status_error(404, "u"), TransportError::NotFound(_)));
        assert!(matches!(status_error(410, "u"), TransportError::NotFound(_)));
        assert!(matches!(status_error(500, "u"), TransportError::Network(_)));
        assert!(matches!(status_error(403, "u"), TransportError::Network(_)));
    }

    #[test]
    fn bad_locators_are_malformed() {
        assert!(matches!(
            transport_error(ureq::ErrorKind::InvalidUrl, "x"),
            TransportError::Malformed(_)
        ));
        assert!(matches!(
            transport_error(ureq::ErrorKind::UnknownScheme, "x"),
            TransportError::Malformed(_)
        ));
        assert!(matches!(
            transport_error(ureq::ErrorKind::ConnectionFailed, "x"),
            TransportError::Network(_)
        ));
    }

    #[test]
    fn default_config_has_agent_and_timeout() {
        let config = NetConfig::default();
        assert!(config.user_agent.starts_with("mailview/"));
        assert_eq!(config.timeout, Duration::from_secs(10));
    }
}

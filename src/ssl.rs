//! TLS transport with [rustls](https://docs.rs/rustls)
//!
//! Accepted TCP connections are wrapped in a server TLS session. The
//! handshake runs on the session thread with the first read or write.
#![cfg(feature = "ssl-rustls")]

use std::io;
use std::sync::Arc;

use rustls::{ServerConfig, SupportedProtocolVersion};
use zeroize::Zeroizing;

/// Configuration of the server for SSL.
#[derive(Debug, Clone)]
pub struct SslConfig {
    config: Arc<ServerConfig>,
}

impl SslConfig {
    /// Uses an already prepared rustls `ServerConfig`
    #[must_use]
    pub fn from_config(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    /// Create `[SslConfig]` from a PEM certificate chain and a PEM private key
    ///
    /// The default protocol versions of rustls are enabled.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` with `InvalidInput` if the certificate or key can not be used
    ///
    pub fn from_pem(certificate: &[u8], private_key: Vec<u8>) -> io::Result<Self> {
        Self::from_pem_with_versions(certificate, private_key, rustls::DEFAULT_VERSIONS)
    }

    /// Create `[SslConfig]` from PEM data enabling only `versions`
    ///
    /// # Errors
    ///
    /// - `std::io::Error` with `InvalidInput` if the certificate or key can not be used
    ///
    pub fn from_pem_with_versions(
        certificate: &[u8],
        private_key: Vec<u8>,
        versions: &[&'static SupportedProtocolVersion],
    ) -> io::Result<Self> {
        let private_key = Zeroizing::new(private_key);

        let certs = rustls_pemfile::certs(&mut &certificate[..])
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid_input)?;
        if certs.is_empty() {
            return Err(invalid_input("no certificate found"));
        }
        let key = rustls_pemfile::private_key(&mut &private_key[..])
            .map_err(invalid_input)?
            .ok_or_else(|| invalid_input("no private key found"))?;

        let config = ServerConfig::builder_with_protocol_versions(versions)
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(invalid_input)?;

        Ok(Self::from_config(Arc::new(config)))
    }

    pub(crate) fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.config)
    }
}

fn invalid_input<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidInput, err)
}

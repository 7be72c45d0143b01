use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use crate::common::limits::{CompressionConfig, LimitsConfig};
use crate::ConfigListenAddr;
use crate::Scheduler;
use crate::SocketConfig;

/// Represents the config parameters required to create a server.
///
/// # Example
///
/// ```
/// # use tiny_httpd::{ServerConfig, ThreadPerTask};
/// # use std::sync::Arc;
/// let cfg = ServerConfig {
///     scheduler: Some(Arc::new(ThreadPerTask::new())),
///     shutdown_scheduler: true,
///     ..ServerConfig::default()
/// };
/// ```
///
#[derive(Clone)]
pub struct ServerConfig {
    /// The addresses to try to listen to.
    pub addr: ConfigListenAddr,

    /// Socket configuration
    /// See [SocketConfig]
    pub socket_config: SocketConfig,

    /// Buffer sizes of the sessions
    pub limits: LimitsConfig,

    /// Gzip compression of responses
    pub compression: CompressionConfig,

    /// Runs the sessions, `None` creates a [`TaskPool`](crate::TaskPool)
    /// owned by the server
    pub scheduler: Option<Arc<dyn Scheduler>>,

    /// Shut down `scheduler` when the server completes.
    /// A server always shuts down its own pool.
    pub shutdown_scheduler: bool,

    /// If `Some`, then the server will use SSL to encode the communications.
    #[cfg(feature = "ssl-rustls")]
    pub ssl: Option<crate::SslConfig>,
}

impl ServerConfig {
    /// Default config listening on `addr`
    #[must_use]
    pub fn with_addr(addr: ConfigListenAddr) -> Self {
        Self {
            addr,
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: ConfigListenAddr::IP(vec![SocketAddr::from((Ipv4Addr::LOCALHOST, 0))]),
            socket_config: SocketConfig::default(),
            limits: LimitsConfig::default(),
            compression: CompressionConfig::default(),
            scheduler: None,
            shutdown_scheduler: false,
            #[cfg(feature = "ssl-rustls")]
            ssl: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("ServerConfig");
        let _ = s
            .field("addr", &self.addr)
            .field("socket_config", &self.socket_config)
            .field("limits", &self.limits)
            .field("compression", &self.compression)
            .field("scheduler", &self.scheduler.as_ref().map(|_| "custom"))
            .field("shutdown_scheduler", &self.shutdown_scheduler);
        #[cfg(feature = "ssl-rustls")]
        let _ = s.field("ssl", &self.ssl);
        s.finish()
    }
}

//! Abstractions of Tcp and Unix socket types

#[cfg(unix)]
use std::os::unix::net as unix_net;
use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    path::PathBuf,
};
#[cfg(unix)]
use std::path::Path;

use crate::log;

use super::ConnectionStream;
use super::SocketConfig;

/// Unified listener. Either a [`TcpListener`] or [`std::os::unix::net::UnixListener`]
#[derive(Debug)]
pub(crate) enum Listener {
    /// [TcpListener] socket with [SocketConfig] applied to accepted streams
    Tcp(TcpListener, SocketConfig),
    /// [unix_net::UnixListener] socket and its path
    #[cfg(unix)]
    Unix(unix_net::UnixListener, PathBuf),
}

impl Listener {
    pub(crate) fn local_addr(&self) -> io::Result<ListenAddr> {
        match self {
            Self::Tcp(l, _cfg) => l.local_addr().map(ListenAddr::from),
            #[cfg(unix)]
            Self::Unix(l, _) => l.local_addr().map(ListenAddr::from),
        }
    }

    pub(crate) fn accept(&self) -> io::Result<ConnectionStream> {
        match self {
            Self::Tcp(l, cfg) => l.accept().map(|(mut stream, _addr)| {
                if let Err(err) = SocketConfig::set_socket_cfg(&mut stream, cfg) {
                    log::error!("socket config fail: {err:?}");
                    let _ = err;
                }
                ConnectionStream::from(stream)
            }),
            #[cfg(unix)]
            Self::Unix(l, _) => l.accept().map(|(stream, _)| ConnectionStream::from(stream)),
        }
    }

    /// Connects to the listener so a blocked [`accept`](Listener::accept) returns
    pub(crate) fn wake(&self) -> io::Result<()> {
        match self {
            Self::Tcp(l, _) => {
                let mut addr = l.local_addr()?;
                if addr.ip().is_unspecified() {
                    addr.set_ip(if addr.is_ipv4() {
                        Ipv4Addr::LOCALHOST.into()
                    } else {
                        Ipv6Addr::LOCALHOST.into()
                    });
                }
                TcpStream::connect(addr).map(drop)
            }
            #[cfg(unix)]
            Self::Unix(_, path) => unix_net::UnixStream::connect(path).map(drop),
        }
    }

    /// Removes the socket file of a Unix listener
    pub(crate) fn cleanup(&self) {
        match self {
            Self::Tcp(..) => {}
            #[cfg(unix)]
            Self::Unix(_, path) => {
                if let Err(err) = std::fs::remove_file(path) {
                    log::warn!("unix socket {} not removed: {err}", path.display());
                    let _ = err;
                }
            }
        }
    }
}

/// Address of configuration
/// Unified listen socket address. Either a `Vec` of [`SocketAddr`] or the path of a Unix socket.
#[derive(Debug, Clone)]
pub enum ConfigListenAddr {
    /// [SocketAddr] for IP net, the first one that can be bound is used
    IP(Vec<SocketAddr>),
    /// Path of a Unix socket
    #[cfg(unix)]
    Unix {
        /// Filesystem path of the socket, removed when the server completes
        path: PathBuf,
        /// Remove an existing file at `path` before binding
        delete_if_exists: bool,
    },
}

impl ConfigListenAddr {
    /// Create `[ConfigListenAddr]` from `IP` addresses
    ///
    /// # Errors
    ///
    /// - `std::io::Error` when `addrs` are no socket addresses
    ///
    pub fn from_socket_addrs<A: ToSocketAddrs>(addrs: A) -> io::Result<Self> {
        addrs.to_socket_addrs().map(|it| Self::IP(it.collect()))
    }

    /// Create `[ConfigListenAddr]` from `path`
    #[cfg(unix)]
    pub fn unix_from_path<P: Into<PathBuf>>(path: P, delete_if_exists: bool) -> Self {
        Self::Unix {
            path: path.into(),
            delete_if_exists,
        }
    }

    #[cfg(feature = "socket2")]
    pub(crate) fn bind(&self, config: &SocketConfig) -> io::Result<Listener> {
        match self {
            Self::IP(addresses) => {
                log::debug!("addresses: {addresses:?}");

                let mut last_err = None;
                let mut found = None;

                for address in addresses {
                    let socket = socket2::Socket::new(
                        socket2::Domain::for_address(*address),
                        socket2::Type::STREAM,
                        None,
                    )?;
                    socket.set_reuse_address(true)?;

                    if let Err(e) = socket.bind(&(*address).into()) {
                        last_err = Some(e);
                        continue;
                    }
                    if let Err(e) = socket.listen(1024) {
                        last_err = Some(e);
                        continue;
                    }

                    found = Some(socket);
                    break;
                }

                let Some(socket) = found else {
                    let err = last_err.unwrap_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidInput, "no address to bind")
                    });
                    log::error!("socket bind fail: {err:?}");
                    return Err(err);
                };

                socket.set_linger(config.linger)?;
                if config.tcp_keep_alive {
                    if config.tcp_keepalive_time.is_zero() {
                        socket.set_keepalive(config.tcp_keep_alive)?;
                    } else {
                        let keepalive =
                            socket2::TcpKeepalive::new().with_time(config.tcp_keepalive_time);
                        socket.set_tcp_keepalive(&match config.tcp_keepalive_interval {
                            Some(interval) => keepalive.with_interval(interval),
                            None => keepalive,
                        })?;
                    }
                }
                socket.set_nodelay(config.no_delay)?;

                Ok(Listener::Tcp(socket.into(), config.clone()))
            }
            #[cfg(unix)]
            Self::Unix {
                path,
                delete_if_exists,
            } => bind_unix(path, *delete_if_exists),
        }
    }

    #[cfg(not(feature = "socket2"))]
    pub(crate) fn bind(&self, config: &SocketConfig) -> io::Result<Listener> {
        match self {
            Self::IP(addresses) => {
                log::debug!("addresses: {addresses:?}");
                TcpListener::bind(addresses.as_slice())
                    .map(|l| Listener::Tcp(l, config.clone()))
                    .map_err(|err| {
                        log::error!("socket bind fail: {err:?}");
                        err
                    })
            }
            #[cfg(unix)]
            Self::Unix {
                path,
                delete_if_exists,
            } => bind_unix(path, *delete_if_exists),
        }
    }
}

#[cfg(unix)]
fn bind_unix(path: &Path, delete_if_exists: bool) -> io::Result<Listener> {
    if delete_if_exists {
        match std::fs::remove_file(path) {
            Ok(()) => {
                log::debug!("removed existing {}", path.display());
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    unix_net::UnixListener::bind(path).map(|l| Listener::Unix(l, path.to_path_buf()))
}

/// Unified listen socket address. Either a [`SocketAddr`] or [`std::os::unix::net::SocketAddr`].
#[derive(Debug, Clone)]
pub enum ListenAddr {
    /// [SocketAddr] for IP net
    IP(SocketAddr),
    /// Unix [unix_net::SocketAddr]
    #[cfg(unix)]
    Unix(unix_net::SocketAddr),
}

impl ListenAddr {
    /// Get `[SocketAddr]` if it is an `IP` else `None`
    #[must_use]
    pub fn to_ip(self) -> Option<SocketAddr> {
        match self {
            Self::IP(s) => Some(s),
            #[cfg(unix)]
            Self::Unix(_) => None,
        }
    }

    /// Gets the Unix socket address.
    #[must_use]
    #[cfg(unix)]
    pub fn to_unix(self) -> Option<unix_net::SocketAddr> {
        match self {
            Self::IP(_) => None,
            Self::Unix(s) => Some(s),
        }
    }
}

impl From<SocketAddr> for ListenAddr {
    fn from(s: SocketAddr) -> Self {
        Self::IP(s)
    }
}

#[cfg(unix)]
impl From<unix_net::SocketAddr> for ListenAddr {
    fn from(s: unix_net::SocketAddr) -> Self {
        Self::Unix(s)
    }
}

impl std::fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IP(s) => std::fmt::Display::fmt(s, f),
            #[cfg(unix)]
            Self::Unix(s) => std::fmt::Debug::fmt(s, f),
        }
    }
}

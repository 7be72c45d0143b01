#[cfg(unix)]
use std::os::unix::net as unix_net;
use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
};
#[cfg(feature = "ssl-rustls")]
use std::sync::{Arc, Mutex, PoisonError};

#[cfg(feature = "ssl-rustls")]
type TlsStream = rustls::StreamOwned<rustls::ServerConnection, TcpStream>;

/// Unified stream. Either a [`TcpStream`], a [`std::os::unix::net::UnixStream`]
/// or a TLS session over a [`TcpStream`].
///
/// The reading and writing half of a session are clones of the same stream.
/// A TLS session has a single state, so its clones share it behind a mutex.
#[derive(Debug)]
pub(crate) enum ConnectionStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(unix_net::UnixStream),
    #[cfg(feature = "ssl-rustls")]
    Tls(Arc<Mutex<TlsStream>>),
}

impl ConnectionStream {
    /// Wraps `stream` in a server TLS session, the handshake happens on first use
    #[cfg(feature = "ssl-rustls")]
    pub(crate) fn tls(stream: TcpStream, config: &crate::SslConfig) -> io::Result<Self> {
        let conn = rustls::ServerConnection::new(config.server_config())
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        Ok(Self::Tls(Arc::new(Mutex::new(rustls::StreamOwned::new(
            conn, stream,
        )))))
    }

    /// Gets the peer's address. Some for TCP, None for Unix sockets.
    pub(crate) fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(s) => s.peer_addr().ok(),
            #[cfg(unix)]
            Self::Unix(_) => None,
            #[cfg(feature = "ssl-rustls")]
            Self::Tls(s) => lock(s).sock.peer_addr().ok(),
        }
    }

    /// Gets the address the connection was accepted on. None for Unix sockets.
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(s) => s.local_addr().ok(),
            #[cfg(unix)]
            Self::Unix(_) => None,
            #[cfg(feature = "ssl-rustls")]
            Self::Tls(s) => lock(s).sock.local_addr().ok(),
        }
    }

    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(s) => s.try_clone().map(Self::from),
            #[cfg(unix)]
            Self::Unix(s) => s.try_clone().map(Self::from),
            #[cfg(feature = "ssl-rustls")]
            Self::Tls(s) => Ok(Self::Tls(Arc::clone(s))),
        }
    }

    /// Handle to close the socket from another thread
    pub(crate) fn close_handle(&self) -> io::Result<CloseHandle> {
        match self {
            Self::Tcp(s) => s.try_clone().map(CloseHandle::Tcp),
            #[cfg(unix)]
            Self::Unix(s) => s.try_clone().map(CloseHandle::Unix),
            #[cfg(feature = "ssl-rustls")]
            Self::Tls(s) => lock(s).sock.try_clone().map(CloseHandle::Tcp),
        }
    }
}

#[cfg(feature = "ssl-rustls")]
fn lock(stream: &Mutex<TlsStream>) -> std::sync::MutexGuard<'_, TlsStream> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.read(buf),
            #[cfg(feature = "ssl-rustls")]
            Self::Tls(s) => lock(s).read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.write(buf),
            #[cfg(feature = "ssl-rustls")]
            Self::Tls(s) => lock(s).write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Self::Unix(s) => s.flush(),
            #[cfg(feature = "ssl-rustls")]
            Self::Tls(s) => lock(s).flush(),
        }
    }
}

impl From<TcpStream> for ConnectionStream {
    fn from(s: TcpStream) -> Self {
        Self::Tcp(s)
    }
}

#[cfg(unix)]
impl From<unix_net::UnixStream> for ConnectionStream {
    fn from(s: unix_net::UnixStream) -> Self {
        Self::Unix(s)
    }
}

/// Second handle of an accepted socket, kept in the session registry
#[derive(Debug)]
pub(crate) enum CloseHandle {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(unix_net::UnixStream),
}

impl CloseHandle {
    /// Shuts down both directions, blocked reads and writes of the session fail
    pub(crate) fn close(&self) {
        // NotConnected if the peer was faster
        let _ = match self {
            Self::Tcp(s) => s.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Self::Unix(s) => s.shutdown(Shutdown::Both),
        };
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    use super::ConnectionStream;

    #[test]
    fn clone_and_close_test() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();

        let stream = ConnectionStream::from(server);
        assert_eq!(stream.local_addr(), Some(listener.local_addr().unwrap()));
        assert_eq!(stream.peer_addr(), Some(client.local_addr().unwrap()));

        let mut writer = stream.try_clone().unwrap();
        writer.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        let mut reader = stream;
        stream_closed_by_handle(&mut reader);
    }

    fn stream_closed_by_handle(reader: &mut ConnectionStream) {
        reader.close_handle().unwrap().close();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap_or(0), 0);
    }

    #[cfg(unix)]
    #[test]
    fn unix_stream_test() {
        let (left, mut right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut stream = ConnectionStream::from(left);
        assert_eq!(stream.peer_addr(), None);
        stream.write_all(b"abc").unwrap();
        let mut buf = [0u8; 3];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
    }
}

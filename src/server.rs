//! [`Server`] accepting connections and running their sessions
//!
//! A server moves through the states of [`ServerState`]:
//!
//! ```text
//! Init --start()/run()--> Startup --bound--> Running --stop()--> Shutdown --> Complete
//! ```
//!
//! `stop()` on a server that was never started moves it directly to
//! `Complete`. When the accept loop notices the shutdown, every open
//! connection is closed, the scheduler is shut down if the server owns it
//! and the listening socket is closed.

use std::error::Error;
use std::io;
use std::net::ToSocketAddrs;
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::connection_stream::{CloseHandle, ConnectionStream};
use crate::handler::Handler;
use crate::log;
use crate::registry::{Registry, SessionId};
use crate::scheduler::{Scheduler, Task};
use crate::server_config::ServerConfig;
use crate::session::{Session, SessionConfig};
use crate::socket_listener::{ConfigListenAddr, ListenAddr, Listener};
use crate::util::TaskPool;

/// Pause after a failed `accept()`
const ACCEPT_ERROR_SLEEP_DURATION: Duration = Duration::from_millis(10);

/// Lifecycle state of a [`Server`]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum ServerState {
    /// Created, not started
    Init = 0,
    /// Binding the listening socket
    Startup = 1,
    /// Accepting connections
    Running = 2,
    /// Stop requested, accept loop not finished yet
    Shutdown = 3,
    /// All connections closed, nothing runs anymore
    Complete = 4,
}

impl ServerState {
    fn from_u8(state: u8) -> Self {
        match state {
            0 => ServerState::Init,
            1 => ServerState::Startup,
            2 => ServerState::Running,
            3 => ServerState::Shutdown,
            _ => ServerState::Complete,
        }
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ServerState::Init => "INIT",
            ServerState::Startup => "STARTUP",
            ServerState::Running => "RUNNING",
            ServerState::Shutdown => "SHUTDOWN",
            ServerState::Complete => "COMPLETE",
        })
    }
}

/// Failures of starting a [`Server`]
#[derive(Debug)]
pub enum ServerError {
    /// Server was already started or stopped, carries the state found
    NotInit(ServerState),
    /// Listening socket could not be created
    Bind(io::Error),
    /// TLS configuration is unusable
    Tls(io::Error),
    /// Accept thread could not be spawned
    Spawn(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::NotInit(state) => write!(f, "server not in state INIT but {state}"),
            ServerError::Bind(err) => write!(f, "bind failed: {err}"),
            ServerError::Tls(err) => write!(f, "tls configuration failed: {err}"),
            ServerError::Spawn(err) => write!(f, "accept thread not started: {err}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServerError::NotInit(_) => None,
            ServerError::Bind(err) | ServerError::Tls(err) | ServerError::Spawn(err) => Some(err),
        }
    }
}

#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by the server handle, the accept loop and the sessions
struct Shared {
    state: AtomicU8,
    config: ServerConfig,
    session_config: SessionConfig,
    handler: Arc<dyn Handler>,
    scheduler: Arc<dyn Scheduler>,
    owns_scheduler: bool,
    registry: Mutex<Registry<CloseHandle>>,
    listener: Mutex<Option<Arc<Listener>>>,
    local_addr: Mutex<Option<ListenAddr>>,
    terminated: (Mutex<bool>, Condvar),
}

impl Shared {
    fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: ServerState, to: ServerState) -> Result<(), ServerState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(drop)
            .map_err(ServerState::from_u8)
    }

    /// Binds the listening socket, the server must be in `Startup`
    fn bind(&self) -> Result<Arc<Listener>, ServerError> {
        #[cfg(feature = "ssl-rustls")]
        if let Some(ssl) = &self.config.ssl {
            let _ = rustls::ServerConnection::new(ssl.server_config()).map_err(|err| {
                self.finish(None);
                ServerError::Tls(io::Error::new(io::ErrorKind::InvalidInput, err))
            })?;
        }

        let listener = match self.config.addr.bind(&self.config.socket_config) {
            Ok(listener) => Arc::new(listener),
            Err(err) => {
                self.finish(None);
                return Err(ServerError::Bind(err));
            }
        };
        let local_addr = listener.local_addr().ok();
        if let Some(addr) = &local_addr {
            log::info!("listening on {addr}");
            let _ = addr;
        }
        *lock(&self.local_addr) = local_addr;
        *lock(&self.listener) = Some(Arc::clone(&listener));
        Ok(listener)
    }

    /// Accepts connections until the server leaves `Running`
    fn accept_loop(self: &Arc<Self>, listener: &Listener) {
        while self.state() == ServerState::Running {
            match listener.accept() {
                Ok(stream) => {
                    if self.state() != ServerState::Running {
                        break;
                    }
                    self.dispatch(stream);
                }
                Err(err) => {
                    log::warn!("error on connection accept: {err}");
                    let _ = err;
                    thread::sleep(ACCEPT_ERROR_SLEEP_DURATION);
                }
            }
        }
        self.finish(Some(listener));
    }

    /// Registers the connection and hands its session to the scheduler
    fn dispatch(self: &Arc<Self>, stream: ConnectionStream) {
        #[cfg(feature = "ssl-rustls")]
        let stream = match (&self.config.ssl, stream) {
            (Some(ssl), ConnectionStream::Tcp(tcp)) => match ConnectionStream::tls(tcp, ssl) {
                Ok(stream) => stream,
                Err(err) => {
                    log::warn!("tls session not created: {err}");
                    let _ = err;
                    return;
                }
            },
            (_, stream) => stream,
        };

        let (close_handle, writer) = match stream
            .close_handle()
            .and_then(|handle| Ok((handle, stream.try_clone()?)))
        {
            Ok(handles) => handles,
            Err(err) => {
                log::error!("connection not usable: {err}");
                let _ = err;
                return;
            }
        };

        let id = match lock(&self.registry).register(close_handle) {
            Ok(id) => id,
            Err(close_handle) => {
                close_handle.close();
                return;
            }
        };
        let guard = SessionGuard {
            shared: Arc::clone(self),
            id,
        };

        let addrs = (stream.peer_addr(), stream.local_addr());
        let session = Session::new(
            stream,
            writer,
            Arc::clone(&self.handler),
            self.session_config,
            addrs,
        );
        let task: Task = Box::new(move || {
            let _guard = guard;
            session.run();
        });

        // a rejected task is dropped, its guard closes the connection
        if let Err(err) = self.scheduler.execute(task) {
            log::error!("session not scheduled: {err}");
            let _ = err;
        }
    }

    fn end_session(&self, id: SessionId) {
        let handle = lock(&self.registry).unregister(id);
        if let Some(handle) = handle {
            handle.close();
        }
    }

    /// Closes every open session and enters `Complete`
    fn finish(&self, listener: Option<&Listener>) {
        let handles = lock(&self.registry).complete();
        for handle in handles {
            handle.close();
        }
        self.state
            .store(ServerState::Complete as u8, Ordering::Release);

        if self.owns_scheduler {
            self.scheduler.shutdown();
        }
        if let Some(listener) = listener {
            listener.cleanup();
        }
        drop(lock(&self.listener).take());

        let (terminated, condvar) = &self.terminated;
        *lock(terminated) = true;
        condvar.notify_all();
        log::info!("server shutdown complete");
    }
}

/// Unregisters and closes the connection when the session task ends
struct SessionGuard {
    shared: Arc<Shared>,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.shared.end_session(self.id);
    }
}

/// The HTTP server
///
/// Every accepted connection gets a session that reads requests, calls the
/// [`Handler`] and writes the responses. Sessions run on the
/// [`Scheduler`] of the [`ServerConfig`], by default a [`TaskPool`].
///
/// Dropping the server stops it and waits for the termination.
///
/// # Example
///
/// ```no_run
/// use tiny_httpd::{HandlerError, Request, Response, Server, ServerConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let server = Server::new(
///     ServerConfig::default(),
///     |rq: &mut Request<'_>| -> Result<Response, HandlerError> {
///         Ok(Response::text(format!("you asked for {}", rq.path())))
///     },
/// );
/// server.start()?;
/// println!("listening on {}", server.local_addr().unwrap());
/// server.await_termination();
/// # Ok(())
/// # }
/// ```
pub struct Server {
    shared: Arc<Shared>,
    accept_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Server {
    /// Creates a server in state [`ServerState::Init`]
    pub fn new<H>(config: ServerConfig, handler: H) -> Server
    where
        H: Handler + 'static,
    {
        let (scheduler, owns_scheduler): (Arc<dyn Scheduler>, bool) = match &config.scheduler {
            Some(scheduler) => (Arc::clone(scheduler), config.shutdown_scheduler),
            None => (Arc::new(TaskPool::new()), true),
        };
        let session_config = SessionConfig {
            limits: config.limits,
            compression: config.compression,
        };

        Server {
            shared: Arc::new(Shared {
                state: AtomicU8::new(ServerState::Init as u8),
                config,
                session_config,
                handler: Arc::new(handler),
                scheduler,
                owns_scheduler,
                registry: Mutex::new(Registry::new()),
                listener: Mutex::new(None),
                local_addr: Mutex::new(None),
                terminated: (Mutex::new(false), Condvar::new()),
            }),
            accept_thread: Mutex::new(None),
        }
    }

    /// Creates and starts a server listening on `addr`
    ///
    /// # Errors
    ///
    /// - [`ServerError::Bind`] if `addr` can not be resolved or bound
    ///
    pub fn http<A, H>(addr: A, handler: H) -> Result<Server, ServerError>
    where
        A: ToSocketAddrs,
        H: Handler + 'static,
    {
        let addr = ConfigListenAddr::from_socket_addrs(addr).map_err(ServerError::Bind)?;
        let server = Server::new(ServerConfig::with_addr(addr), handler);
        server.start()?;
        Ok(server)
    }

    /// Creates and starts a server with TLS listening on `addr`
    ///
    /// # Errors
    ///
    /// - [`ServerError::Bind`] if `addr` can not be resolved or bound
    /// - [`ServerError::Tls`] if the TLS configuration is unusable
    ///
    #[cfg(feature = "ssl-rustls")]
    pub fn https<A, H>(addr: A, ssl: crate::SslConfig, handler: H) -> Result<Server, ServerError>
    where
        A: ToSocketAddrs,
        H: Handler + 'static,
    {
        let addr = ConfigListenAddr::from_socket_addrs(addr).map_err(ServerError::Bind)?;
        let config = ServerConfig {
            ssl: Some(ssl),
            ..ServerConfig::with_addr(addr)
        };
        let server = Server::new(config, handler);
        server.start()?;
        Ok(server)
    }

    /// Creates and starts a server listening on the Unix socket `path`
    ///
    /// # Errors
    ///
    /// - [`ServerError::Bind`] if the socket can not be bound
    ///
    #[cfg(unix)]
    pub fn http_unix<P, H>(path: P, handler: H) -> Result<Server, ServerError>
    where
        P: Into<PathBuf>,
        H: Handler + 'static,
    {
        let addr = ConfigListenAddr::unix_from_path(path, false);
        let server = Server::new(ServerConfig::with_addr(addr), handler);
        server.start()?;
        Ok(server)
    }

    /// Binds the listening socket and runs the accept loop on a new thread
    ///
    /// # Errors
    ///
    /// - [`ServerError::NotInit`] if the server was started or stopped before
    /// - [`ServerError::Bind`] if the listening socket can not be created
    /// - [`ServerError::Tls`] if the TLS configuration is unusable
    /// - [`ServerError::Spawn`] if the accept thread can not be started
    ///
    pub fn start(&self) -> Result<(), ServerError> {
        let listener = self.startup()?;
        let shared = Arc::clone(&self.shared);
        let accept_thread = thread::Builder::new()
            .name("tiny-httpd-accept".to_string())
            .spawn(move || shared.accept_loop(&listener));
        match accept_thread {
            Ok(jh) => {
                *lock(&self.accept_thread) = Some(jh);
                Ok(())
            }
            Err(err) => {
                self.shared.finish(None);
                Err(ServerError::Spawn(err))
            }
        }
    }

    /// Binds the listening socket and runs the accept loop on the calling
    /// thread until the server is stopped from another thread
    ///
    /// # Errors
    ///
    /// Like [`start`](Server::start)
    ///
    pub fn run(&self) -> Result<(), ServerError> {
        let listener = self.startup()?;
        self.shared.accept_loop(&listener);
        Ok(())
    }

    /// Binds the listening socket and moves the server to `Running`
    ///
    /// A concurrent `stop()` leaves the server in `Shutdown`, the accept loop
    /// then completes it without accepting.
    fn startup(&self) -> Result<Arc<Listener>, ServerError> {
        self.shared
            .transition(ServerState::Init, ServerState::Startup)
            .map_err(ServerError::NotInit)?;
        let listener = self.shared.bind()?;
        if let Err(state) = self
            .shared
            .transition(ServerState::Startup, ServerState::Running)
        {
            log::debug!("server left startup early: {state:?}");
            let _ = state;
        }
        Ok(listener)
    }

    /// Stops accepting connections and closes all open ones
    ///
    /// Returns immediately, [`await_termination`](Server::await_termination)
    /// waits for the end.
    pub fn stop(&self) {
        loop {
            let state = self.shared.state();
            match state {
                ServerState::Init => {
                    if self
                        .shared
                        .transition(ServerState::Init, ServerState::Complete)
                        .is_ok()
                    {
                        self.shared.finish(None);
                        return;
                    }
                }
                ServerState::Startup | ServerState::Running => {
                    if self.shared.transition(state, ServerState::Shutdown).is_ok() {
                        log::info!("server shutdown requested");
                        let listener = lock(&self.shared.listener).clone();
                        if let Some(listener) = listener {
                            if let Err(err) = listener.wake() {
                                log::debug!("accept loop not woken: {err}");
                                let _ = err;
                            }
                        }
                        return;
                    }
                }
                ServerState::Shutdown | ServerState::Complete => return,
            }
        }
    }

    /// Blocks until the server reached [`ServerState::Complete`]
    pub fn await_termination(&self) {
        let (terminated, condvar) = &self.shared.terminated;
        let mut done = lock(terminated);
        while !*done {
            done = condvar.wait(done).unwrap_or_else(PoisonError::into_inner);
        }
        drop(done);
        self.join_accept_thread();
    }

    /// Blocks at most `timeout` until the server reached [`ServerState::Complete`]
    ///
    /// Returns `true` if the server completed.
    pub fn await_termination_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (terminated, condvar) = &self.shared.terminated;
        let mut done = lock(terminated);
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            done = condvar
                .wait_timeout(done, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        drop(done);
        self.join_accept_thread();
        true
    }

    fn join_accept_thread(&self) {
        let jh = lock(&self.accept_thread).take();
        if let Some(jh) = jh {
            if jh.thread().id() != thread::current().id() && jh.join().is_err() {
                log::error!("accept thread panicked");
            }
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.shared.state()
    }

    /// `true` while connections are accepted
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Address of the listening socket, `None` before it is bound
    #[must_use]
    pub fn local_addr(&self) -> Option<ListenAddr> {
        lock(&self.shared.local_addr).clone()
    }

    /// Number of currently open sessions
    #[must_use]
    pub fn num_sessions(&self) -> usize {
        lock(&self.shared.registry).len()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
        self.await_termination();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("num_sessions", &self.num_sessions())
            .finish_non_exhaustive()
    }
}

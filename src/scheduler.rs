//! Execution of connection tasks

use std::{
    io,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

/// Unit of work handed to a [`Scheduler`], one per accepted connection
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs the session of every accepted connection
///
/// The engine brings [`TaskPool`](crate::TaskPool) (default) and [`ThreadPerTask`].
/// An own implementation can be set in [`ServerConfig::scheduler`](crate::ServerConfig::scheduler).
pub trait Scheduler: Send + Sync {
    /// Runs `task` on some thread
    ///
    /// # Errors
    ///
    /// If the task can not be run, the connection of the task is closed.
    fn execute(&self, task: Task) -> io::Result<()>;

    /// Stops accepting tasks, called on server shutdown if the server owns the scheduler
    fn shutdown(&self) {}
}

/// Starts a new OS thread for every task
#[derive(Debug, Default)]
pub struct ThreadPerTask {
    seq: AtomicUsize,
}

impl ThreadPerTask {
    /// Creates the scheduler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for ThreadPerTask {
    fn execute(&self, task: Task) -> io::Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = thread::Builder::new()
            .name(format!("tiny-httpd-session-{seq}"))
            .spawn(task)?;
        Ok(())
    }
}

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use super::Registration;
use crate::log;
use crate::scheduler::{Scheduler, Task};

/// Cached pool of worker threads
///
/// A new thread is created every time all the existing threads are busy.
/// Threads above [`MIN_THREADS`] die after being idle for a few seconds.
pub struct TaskPool {
    sharing: Arc<Sharing>,
}

struct Sharing {
    // list of the queued tasks to be done by worker threads
    queue: Mutex<VecDeque<Task>>,

    // condvar that will be notified whenever a task is added to `queue`
    condvar: Condvar,

    // flag to decide to run or exit
    run: AtomicBool,

    // number of idle worker threads
    threads_idle: AtomicUsize,

    // number of total worker threads running
    threads_total: AtomicUsize,

    // source of the worker thread names
    thread_seq: AtomicUsize,
}

/// Minimum number of active threads.
pub(crate) const MIN_THREADS: usize = 4;

/// Minimum number of idle threads.
const MIN_IDLE_THREADS: usize = 1;

/// Time threads stay alive without working task
const IDLE_TIME: Duration = Duration::from_millis(5000);

impl TaskPool {
    /// Creates the pool and starts [`MIN_THREADS`] workers
    #[must_use]
    pub fn new() -> TaskPool {
        let pool = TaskPool {
            sharing: Arc::new(Sharing {
                queue: Mutex::new(VecDeque::new()),
                condvar: Condvar::new(),
                run: AtomicBool::from(true),
                threads_total: AtomicUsize::default(),
                threads_idle: AtomicUsize::default(),
                thread_seq: AtomicUsize::default(),
            }),
        };

        for _ in 0..MIN_THREADS {
            if let Err(err) = pool.add_thread(None) {
                log::warn!("worker thread not started: {err}");
                let _ = err;
            }
        }

        pool
    }

    /// Executes a function in a thread.
    ///
    /// If no thread is available, spawns a new one.
    fn spawn_task(&self, code: Task) -> io::Result<()> {
        if !self.sharing.run.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "task pool is shut down",
            ));
        }

        let mut queue = self
            .sharing
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.sharing.threads_idle.load(Ordering::Acquire) == 0
            || queue.len() > self.sharing.threads_total.load(Ordering::Acquire)
        {
            drop(queue);
            self.add_thread(Some(code))
        } else {
            queue.push_back(code);
            self.sharing.condvar.notify_one();
            Ok(())
        }
    }

    fn add_thread(&self, initial_fn: Option<Task>) -> io::Result<()> {
        let sharing = Arc::clone(&self.sharing);
        let seq = self.sharing.thread_seq.fetch_add(1, Ordering::Relaxed);

        let _ = thread::Builder::new()
            .name(format!("tiny-httpd-worker-{seq}"))
            .spawn(move || {
                let sharing = sharing;
                let _active_guard = Registration::new(&sharing.threads_total);

                if let Some(f) = initial_fn {
                    f();
                }

                while sharing.run.load(Ordering::Acquire) {
                    let task: Task = {
                        let mut queue = sharing.queue.lock().unwrap_or_else(PoisonError::into_inner);

                        let task;
                        loop {
                            if let Some(new_task) = queue.pop_front() {
                                task = new_task;
                                break;
                            }
                            if !sharing.run.load(Ordering::Acquire) {
                                return;
                            }
                            let _waiting_guard = Registration::new(&sharing.threads_idle);

                            let received =
                                if sharing.threads_total.load(Ordering::Acquire) <= MIN_THREADS {
                                    queue = sharing
                                        .condvar
                                        .wait(queue)
                                        .unwrap_or_else(PoisonError::into_inner);
                                    true
                                } else {
                                    let (new_lock, wait_res) = sharing
                                        .condvar
                                        .wait_timeout(queue, IDLE_TIME)
                                        .unwrap_or_else(PoisonError::into_inner);
                                    queue = new_lock;
                                    !wait_res.timed_out()
                                };

                            if !received {
                                if !sharing.run.load(Ordering::Acquire) {
                                    return;
                                } else if sharing.threads_idle.load(Ordering::Acquire)
                                    <= MIN_IDLE_THREADS
                                    || sharing.threads_total.load(Ordering::Acquire)
                                        <= MIN_THREADS
                                {
                                    continue;
                                } else if queue.is_empty() {
                                    return;
                                }
                            }
                        }

                        task
                    };

                    task();
                }
            })?;

        Ok(())
    }

    /// Number of total threads in pool
    #[must_use]
    #[inline]
    pub fn threads_total(&self) -> usize {
        self.sharing.threads_total.load(Ordering::Relaxed)
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TaskPool {
    fn execute(&self, task: Task) -> io::Result<()> {
        self.spawn_task(task)
    }

    /// Workers finish their current task and exit, queued tasks are dropped
    fn shutdown(&self) {
        self.sharing.run.store(false, Ordering::Release);
        let queued = std::mem::take(
            &mut *self
                .sharing
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        self.sharing.condvar.notify_all();
        drop(queued);
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Make sure spawned threads run to return or last task and doesn't continue
        self.sharing.run.store(false, Ordering::Release);
        self.sharing.condvar.notify_all();
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("threads_total", &self.threads_total())
            .field(
                "threads_idle",
                &self.sharing.threads_idle.load(Ordering::Relaxed),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{atomic::Ordering, mpsc},
        thread,
        time::{Duration, Instant},
    };

    use super::{TaskPool, MIN_THREADS};
    use crate::Scheduler;

    fn wait_for_threads(tp: &TaskPool, total: usize) {
        let now = Instant::now();
        while tp.sharing.threads_total.load(Ordering::Relaxed) != total {
            thread::sleep(Duration::from_millis(5));
            assert!(now.elapsed() < Duration::from_millis(5000));
        }
    }

    #[test]
    fn task_pool_constructor_test() {
        let tp = TaskPool::new();
        assert!(tp.sharing.threads_total.load(Ordering::Relaxed) <= MIN_THREADS);
        wait_for_threads(&tp, MIN_THREADS);
    }

    #[test]
    fn task_pool_task_test() {
        let tp = TaskPool::new();
        wait_for_threads(&tp, MIN_THREADS);

        let (tx, rx) = mpsc::channel();
        for n in 0..20 {
            let tx = tx.clone();
            tp.execute(Box::new(move || {
                thread::sleep(Duration::from_millis(5));
                tx.send(n).unwrap();
            }))
            .unwrap();
        }

        let mut received: Vec<i32> = rx.iter().take(20).collect();
        received.sort_unstable();
        assert_eq!(received, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn task_pool_grows_test() {
        let tp = TaskPool::new();
        wait_for_threads(&tp, MIN_THREADS);

        let (tx, rx) = mpsc::channel::<()>();
        let rx = std::sync::Arc::new(std::sync::Mutex::new(rx));
        for _ in 0..(MIN_THREADS * 2) {
            let rx = std::sync::Arc::clone(&rx);
            tp.execute(Box::new(move || {
                let _ = rx.lock().unwrap().recv_timeout(Duration::from_millis(500));
            }))
            .unwrap();
            thread::sleep(Duration::from_millis(2));
        }

        assert!(tp.threads_total() > MIN_THREADS, "{tp:?}");
        drop(tx);
    }

    #[test]
    fn task_pool_shutdown_test() {
        let tp = TaskPool::new();
        tp.shutdown();
        assert!(tp.execute(Box::new(|| {})).is_err());
        wait_for_threads(&tp, 0);
    }
}

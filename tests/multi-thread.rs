#![allow(unused_crate_dependencies)]

use std::io::{self, BufReader, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use tiny_httpd::{
    HandlerError, HeaderField, Request, Response, Scheduler, Server, ServerConfig, ServerState,
    Task, ThreadPerTask,
};

#[allow(dead_code)]
mod support;

fn wait_for<F: Fn() -> bool>(condition: F) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < Duration::from_secs(5), "timed out");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn concurrent_clients() {
    let server = Arc::new(support::new_server(
        ServerConfig::default(),
        support::hello_world,
    ));

    let clients: Vec<_> = (0..20)
        .map(|_| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                let mut client = support::connect(&server);
                for _ in 0..5 {
                    write!(client, "GET / HTTP/1.1\r\n\r\n").unwrap();
                }
                write!(client, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
                support::read_responses(client)
            })
        })
        .collect();

    for client in clients {
        let responses = client.join().unwrap();
        assert_eq!(responses.len(), 6);
        assert!(responses.iter().all(|r| r.text() == "hello world"));
    }
}

lazy_static! {
    static ref SHARED: Response = Response::text("shared body")
        .with_content_type("text/plain")
        .with_header(HeaderField::new("x-shared").unwrap(), "prototype")
        .freeze()
        .unwrap();
}

/// `/tagged/<n>` answers a changed clone of [`SHARED`], everything else the clone as is
fn shared_response(rq: &mut Request<'_>) -> Result<Response, HandlerError> {
    match rq.path().strip_prefix("/tagged/") {
        Some(tag) => Ok(SHARED
            .clone()
            .with_header(HeaderField::new("x-shared").unwrap(), format!("changed-{tag}"))
            .with_header(HeaderField::new("x-request").unwrap(), tag)),
        None => Ok(SHARED.clone()),
    }
}

#[test]
fn frozen_response_shared_by_sessions() {
    let server = Arc::new(support::new_server(ServerConfig::default(), shared_response));

    let clients: Vec<_> = (0..16)
        .map(|client| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                let mut stream = support::connect(&server);
                for n in 0..10 {
                    if (client + n) % 2 == 0 {
                        write!(stream, "GET /tagged/{client}-{n} HTTP/1.1\r\n\r\n").unwrap();
                    } else {
                        write!(stream, "GET /plain HTTP/1.1\r\n\r\n").unwrap();
                    }
                }
                write!(stream, "GET /plain HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
                (client, support::read_responses(stream))
            })
        })
        .collect();

    for client in clients {
        let (client, responses) = client.join().unwrap();
        assert_eq!(responses.len(), 11);
        for (n, response) in responses.iter().enumerate() {
            assert_eq!(response.status, 200);
            assert_eq!(response.text(), "shared body");
            assert_eq!(response.header("content-type"), Some("text/plain"));
            if n < 10 && (client + n) % 2 == 0 {
                let tag = format!("{client}-{n}");
                assert_eq!(response.header("x-request"), Some(tag.as_str()));
                assert_eq!(
                    response.header("x-shared"),
                    Some(format!("changed-{tag}").as_str())
                );
            } else {
                assert_eq!(response.header("x-request"), None);
                assert_eq!(response.header("x-shared"), Some("prototype"));
            }
        }
    }

    assert!(SHARED.is_frozen());
    assert_eq!(SHARED.headers().len(), 2);
    assert_eq!(
        SHARED.headers().first(&HeaderField::new("x-shared").unwrap()),
        Some("prototype")
    );
}

#[test]
fn sessions_run_in_parallel() {
    const CLIENTS: usize = 4;
    let barrier = Arc::new(Barrier::new(CLIENTS));
    let rq_barrier = Arc::clone(&barrier);
    let server = Arc::new(support::new_server(
        ServerConfig::default(),
        move |_rq: &mut Request<'_>| -> Result<Response, HandlerError> {
            // every handler waits for all the others
            let _ = rq_barrier.wait();
            Ok(Response::text("together"))
        },
    ));

    let clients: Vec<_> = (0..CLIENTS)
        .map(|_| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                let mut client = support::connect(&server);
                write!(client, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
                support::read_responses(client)
            })
        })
        .collect();

    for client in clients {
        assert_eq!(client.join().unwrap()[0].text(), "together");
    }
}

#[test]
fn thread_per_task_scheduler() {
    let server = support::new_server(
        ServerConfig {
            scheduler: Some(Arc::new(ThreadPerTask::new())),
            ..ServerConfig::default()
        },
        |_rq: &mut Request<'_>| -> Result<Response, HandlerError> {
            let name = thread::current().name().unwrap_or_default().to_string();
            Ok(Response::text(name))
        },
    );

    for _ in 0..3 {
        let mut client = support::connect(&server);
        write!(client, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        let responses = support::read_responses(client);
        assert!(
            responses[0].text().starts_with("tiny-httpd-session-"),
            "{}",
            responses[0].text()
        );
    }
}

/// Runs the tasks on new threads and counts them
#[derive(Default)]
struct Counting {
    executed: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl Scheduler for Counting {
    fn execute(&self, task: Task) -> io::Result<()> {
        let _ = self.executed.fetch_add(1, Ordering::SeqCst);
        let _ = thread::spawn(task);
        Ok(())
    }

    fn shutdown(&self) {
        let _ = self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn custom_scheduler() {
    let scheduler = Arc::new(Counting::default());

    for shutdown_scheduler in [false, true] {
        let server = support::new_server(
            ServerConfig {
                scheduler: Some(Arc::clone(&scheduler) as Arc<dyn Scheduler>),
                shutdown_scheduler,
                ..ServerConfig::default()
            },
            support::hello_world,
        );
        let mut client = support::connect(&server);
        write!(client, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        assert_eq!(support::read_responses(client).len(), 1);

        server.stop();
        server.await_termination();
    }

    assert_eq!(scheduler.executed.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.shutdowns.load(Ordering::SeqCst), 1);
}

/// Fails every task
struct Rejecting;

impl Scheduler for Rejecting {
    fn execute(&self, _task: Task) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "no capacity"))
    }
}

#[test]
fn rejected_task_closes_connection() {
    let server = support::new_server(
        ServerConfig {
            scheduler: Some(Arc::new(Rejecting)),
            ..ServerConfig::default()
        },
        support::hello_world,
    );

    let mut client = support::connect(&server);
    let mut content = Vec::new();
    let _ = client.read_to_end(&mut content).unwrap();
    assert!(content.is_empty());
    wait_for(|| server.num_sessions() == 0);
    assert!(server.is_running());
}

#[test]
fn stop_closes_open_connections() {
    #[cfg(unix)]
    let connections = {
        let (soft, _hard) = rlimit::Resource::NOFILE.get().unwrap();
        // a client and a server socket per connection
        usize::try_from(soft / 4).unwrap_or(usize::MAX).min(50)
    };
    #[cfg(not(unix))]
    let connections = 50;

    let server = support::new_server(ServerConfig::default(), support::hello_world);

    let mut clients = Vec::new();
    for _ in 0..connections {
        let client = support::connect(&server);
        let mut reader = BufReader::new(client);
        write!(reader.get_mut(), "GET / HTTP/1.1\r\n\r\n").unwrap();
        let response = support::read_response(&mut reader, false).unwrap();
        assert_eq!(response.status, 200);
        clients.push(reader);
    }
    wait_for(|| server.num_sessions() == connections);

    server.stop();
    assert!(server.await_termination_timeout(Duration::from_secs(5)));
    assert_eq!(server.state(), ServerState::Complete);
    assert_eq!(server.num_sessions(), 0);

    for mut reader in clients {
        let mut rest = Vec::new();
        let _ = reader.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }
}

#[test]
fn stop_from_other_thread() {
    let server = Arc::new(Server::new(
        ServerConfig {
            addr: tiny_httpd::ConfigListenAddr::from_socket_addrs("127.0.0.1:0").unwrap(),
            ..ServerConfig::default()
        },
        support::hello_world,
    ));

    let runner = Arc::clone(&server);
    let jh = thread::spawn(move || runner.run());

    wait_for(|| server.is_running());
    let mut client = support::connect(&server);
    write!(client, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
    assert_eq!(support::read_responses(client)[0].text(), "hello world");

    server.stop();
    jh.join().unwrap().unwrap();
    server.await_termination();
    assert_eq!(server.state(), ServerState::Complete);
}

#[test]
fn drop_stops_server() {
    let server = support::new_server(ServerConfig::default(), support::hello_world);
    let addr = server.local_addr().unwrap().to_ip().unwrap();
    let mut client = support::connect(&server);

    drop(server);

    // not yet accepted connections are reset with the listener
    let mut content = Vec::new();
    let result = client.read_to_end(&mut content);
    assert!(result.map_or(true, |n| n == 0), "{content:?}");
    assert!(std::net::TcpStream::connect(addr).is_err());
}

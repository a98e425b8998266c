//! Minimal HTTP/1.1 server serving fixed routes for integration tests.
//!
//! Each response carries `Connection: close` so the client opens a fresh
//! connection per request and per-path request counts stay exact. Routes can
//! return a fixed status, delay every response, or stall only the first
//! request to a path (to provoke an attempt timeout that a retry recovers
//! from).

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

struct Route {
    body: Vec<u8>,
    status: u16,
    delay: Option<Duration>,
    stall_first: Option<Duration>,
    stalled: AtomicBool,
}

#[derive(Default)]
pub struct ServerStats {
    requests: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ServerStats {
    /// Number of requests seen for `path` (e.g. "/seg0.ts").
    pub fn request_count(&self, path: &str) -> usize {
        *self.requests.lock().unwrap().get(path).unwrap_or(&0)
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().values().sum()
    }

    /// Highest number of requests that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub struct HlsServer {
    routes: HashMap<String, Route>,
}

impl HlsServer {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Serves `body` with 200 OK at `path` (must start with '/').
    pub fn route(mut self, path: &str, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(
            path.to_string(),
            Route {
                body: body.into(),
                status: 200,
                delay: None,
                stall_first: None,
                stalled: AtomicBool::new(false),
            },
        );
        self
    }

    /// Serves `body` with a fixed non-200 status at `path`.
    pub fn route_with_status(mut self, path: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(
            path.to_string(),
            Route {
                body: body.into(),
                status,
                delay: None,
                stall_first: None,
                stalled: AtomicBool::new(false),
            },
        );
        self
    }

    /// Serves `body` at `path`, sleeping `delay` before every response.
    pub fn route_delayed(
        mut self,
        path: &str,
        body: impl Into<Vec<u8>>,
        delay: Duration,
    ) -> Self {
        self.routes.insert(
            path.to_string(),
            Route {
                body: body.into(),
                status: 200,
                delay: Some(delay),
                stall_first: None,
                stalled: AtomicBool::new(false),
            },
        );
        self
    }

    /// Serves `body` at `path`, but the first request stalls for `stall`
    /// before any response byte is written; later requests answer normally.
    pub fn route_stall_first(
        mut self,
        path: &str,
        body: impl Into<Vec<u8>>,
        stall: Duration,
    ) -> Self {
        self.routes.insert(
            path.to_string(),
            Route {
                body: body.into(),
                status: 200,
                delay: None,
                stall_first: Some(stall),
                stalled: AtomicBool::new(false),
            },
        );
        self
    }

    /// Starts the server in a background thread. Returns the base URL (e.g.
    /// "http://127.0.0.1:12345") and the shared request stats. The server
    /// runs until the process exits.
    pub fn start(self) -> (String, Arc<ServerStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let routes = Arc::new(self.routes);
        let stats = Arc::new(ServerStats::default());
        let server_stats = Arc::clone(&stats);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let routes = Arc::clone(&routes);
                let stats = Arc::clone(&server_stats);
                thread::spawn(move || handle(stream, &routes, &stats));
            }
        });
        (format!("http://127.0.0.1:{}", port), stats)
    }
}

fn handle(mut stream: TcpStream, routes: &HashMap<String, Route>, stats: &ServerStats) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(30)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(30)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let path = match parse_path(request) {
        Some(p) => p,
        None => return,
    };

    {
        let mut requests = stats.requests.lock().unwrap();
        *requests.entry(path.clone()).or_insert(0) += 1;
    }
    let in_flight = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    stats.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

    respond(&mut stream, routes.get(&path));

    stats.in_flight.fetch_sub(1, Ordering::SeqCst);
}

fn respond(stream: &mut TcpStream, route: Option<&Route>) {
    let Some(route) = route else {
        let _ = stream.write_all(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    };
    if let Some(stall) = route.stall_first {
        if !route.stalled.swap(true, Ordering::SeqCst) {
            thread::sleep(stall);
        }
    }
    if let Some(delay) = route.delay {
        thread::sleep(delay);
    }
    let reason = match route.status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    };
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        route.status,
        reason,
        route.body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&route.body);
}

/// Returns the request path from the first line ("GET /x HTTP/1.1").
fn parse_path(request: &str) -> Option<String> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    if !method.eq_ignore_ascii_case("GET") {
        return None;
    }
    Some(parts.next()?.to_string())
}

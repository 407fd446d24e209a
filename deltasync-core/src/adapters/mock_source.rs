//! Mock time-series API server for testing
//!
//! A tiny blocking HTTP server that answers `GET <path>?<params>` with a
//! canned JSON payload chosen by the value of one query parameter, so the
//! HTTP data source can be exercised end to end without a real API.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::Value as JsonValue;

/// Mock API server
pub struct MockDataSourceServer {
    port: u16,
    running: Arc<AtomicBool>,
    requests: Arc<Mutex<Vec<String>>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

/// Canned behaviour of the mock server
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Query parameter whose value selects the payload
    pub identifier_param: String,
    /// Payload per identifier value; unknown identifiers get a 404
    pub payloads: HashMap<String, JsonValue>,
    /// Raw (non-JSON) 200 bodies per identifier value
    pub raw_bodies: HashMap<String, String>,
    /// When set, requests without `apikey=<key>` get a 401
    pub required_api_key: Option<String>,
    /// Answer every request with this status instead
    pub force_status: Option<u16>,
}

impl MockConfig {
    pub fn new(identifier_param: &str) -> Self {
        Self {
            identifier_param: identifier_param.to_string(),
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, identifier: &str, payload: JsonValue) -> Self {
        self.payloads.insert(identifier.to_string(), payload);
        self
    }

    pub fn with_raw_body(mut self, identifier: &str, body: &str) -> Self {
        self.raw_bodies.insert(identifier.to_string(), body.to_string());
        self
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.required_api_key = Some(key.to_string());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.force_status = Some(status);
        self
    }
}

impl MockDataSourceServer {
    /// Start a new mock server on a random available port
    pub fn start(config: MockConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let requests = Arc::new(Mutex::new(Vec::new()));

        // Non-blocking so the accept loop can notice shutdown
        listener.set_nonblocking(true)?;

        let running_clone = running.clone();
        let requests_clone = requests.clone();
        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let _ = stream.set_nonblocking(false);
                        handle_connection(stream, &config, &requests_clone);
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            running,
            requests,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Request targets (path and query) received so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockDataSourceServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_connection(mut stream: TcpStream, config: &MockConfig, requests: &Mutex<Vec<String>>) {
    let mut buffer = [0; 8192];
    let n = match stream.read(&mut buffer) {
        Ok(n) => n,
        Err(_) => return,
    };
    let request = String::from_utf8_lossy(&buffer[..n]);

    let first_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = first_line.split_whitespace().collect();
    if parts.len() < 2 {
        send_response(&mut stream, 400, "Bad Request", r#"{"error": "Invalid request"}"#);
        return;
    }
    let target = parts[1];
    if let Ok(mut log) = requests.lock() {
        log.push(target.to_string());
    }

    if parts[0] != "GET" {
        send_response(&mut stream, 405, "Method Not Allowed", r#"{"error": "Method not allowed"}"#);
        return;
    }

    if let Some(status) = config.force_status {
        send_response(&mut stream, status, "Forced", r#"{"error": "forced status"}"#);
        return;
    }

    let query = parse_query(target);

    if let Some(key) = &config.required_api_key {
        if query.get("apikey") != Some(key) {
            send_response(&mut stream, 401, "Unauthorized", r#"{"error": "Invalid API key"}"#);
            return;
        }
    }

    let identifier = query.get(&config.identifier_param).cloned().unwrap_or_default();
    if let Some(body) = config.raw_bodies.get(&identifier) {
        send_response(&mut stream, 200, "OK", body);
    } else if let Some(payload) = config.payloads.get(&identifier) {
        send_response(&mut stream, 200, "OK", &payload.to_string());
    } else {
        send_response(&mut stream, 404, "Not Found", r#"{"error": "Unknown identifier"}"#);
    }
}

fn parse_query(target: &str) -> HashMap<String, String> {
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

fn send_response(stream: &mut TcpStream, status: u16, status_text: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

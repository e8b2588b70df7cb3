//! In-process stand-in for the quote server.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quotefetch_core::{
    ClientFactory, HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse,
};
use serde_json::{json, Value};

/// What the fake server does with one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16),
    Error(HttpError),
    /// Wait, then answer.
    After(Duration, Box<Reply>),
}

impl Reply {
    pub fn after(delay: Duration, reply: Reply) -> Self {
        Self::After(delay, Box::new(reply))
    }
}

type Router = dyn Fn(&HttpRequest, usize) -> Reply + Send + Sync;

/// Routes requests through a closure receiving the request and its 0-based call number.
pub struct FakeQuoteServer {
    router: Box<Router>,
    calls: Mutex<Vec<HttpRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    connects: AtomicUsize,
}

impl FakeQuoteServer {
    pub fn new<F>(router: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest, usize) -> Reply + Send + Sync + 'static,
    {
        Arc::new(Self {
            router: Box::new(router),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub fn calls_to(&self, path_suffix: &str) -> Vec<HttpRequest> {
        self.calls()
            .into_iter()
            .filter(|request| request.url.ends_with(path_suffix))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl HttpClient for FakeQuoteServer {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        let reply = {
            let mut calls = self.calls.lock().expect("calls lock");
            let reply = (self.router)(&request, calls.len());
            calls.push(request);
            reply
        };

        Box::pin(async move {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            let mut reply = reply;
            loop {
                match reply {
                    Reply::After(delay, next) => {
                        tokio::time::sleep(delay).await;
                        reply = *next;
                    }
                    Reply::Json(body) => return Ok(HttpResponse::ok_json(body.to_string())),
                    Reply::Status(status) => {
                        return Ok(HttpResponse::with_status(status, "upstream error"))
                    }
                    Reply::Error(error) => return Err(error),
                }
            }
        })
    }
}

/// Hands out the same fake server to every batch and counts connections.
pub struct FakeClients(pub Arc<FakeQuoteServer>);

impl ClientFactory for FakeClients {
    fn connect(&self, _capacity: usize) -> Result<Arc<dyn HttpClient>, HttpError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        let client: Arc<dyn HttpClient> = self.0.clone();
        Ok(client)
    }
}

pub fn param<'a>(request: &'a HttpRequest, key: &str) -> Option<&'a str> {
    request
        .query
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

pub fn envelope(format: &[&str], rows: Value) -> Value {
    json!({
        "header": {
            "id": 7,
            "latency_ms": 3,
            "error_type": "null",
            "error_msg": "null",
            "format": format,
        },
        "response": rows,
    })
}

pub fn list_envelope(rows: Value) -> Value {
    json!({
        "header": {"id": 7, "latency_ms": 1, "error_type": null, "error_msg": null, "format": null},
        "response": rows,
    })
}

pub fn error_envelope(error_type: &str, message: &str) -> Value {
    json!({
        "header": {
            "id": 7,
            "latency_ms": 2,
            "error_type": error_type,
            "error_msg": message,
            "format": null,
        },
        "response": [],
    })
}

pub fn no_data() -> Value {
    error_envelope("NO_DATA", "No data for the specified timeframe & contract.")
}

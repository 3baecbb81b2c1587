// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction for talking to the remote authority.
//!
//! Provides a trait-based transport layer that enables:
//! - Real HTTP requests for production ([`HttpTransport`])
//! - Scripted transports for unit testing
//!
//! A transport also reports connectivity. The coordinator never probes the
//! network itself; it asks [`Transport::is_online`] and listens for changes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use ss_core::MutationType;

use crate::observer::{ObserverList, Subscription};

/// HTTP status the remote uses to report a write/write conflict.
pub const STATUS_CONFLICT: u16 = 409;

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request never produced a response (DNS, connect, reset, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The response body could not be read.
    #[error("failed to read response: {0}")]
    Decode(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Callback invoked with the new connectivity state.
pub type OnlineHandler = Box<dyn Fn(bool) + Send + Sync>;

/// HTTP method of an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Method used to transmit a mutation of the given type.
    pub fn for_mutation(mutation_type: MutationType) -> Self {
        match mutation_type {
            MutationType::Create => Method::Post,
            MutationType::Update => Method::Patch,
            MutationType::Delete => Method::Delete,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// An outgoing request, minus its URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method) -> Self {
        Request {
            method,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Look up a header value, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of a request that reached the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// True for 2xx statuses.
    pub ok: bool,
    pub status: u16,
    /// Decoded body: JSON if it parses, a string otherwise, null if empty.
    pub data: Value,
}

impl Response {
    pub fn new(status: u16, data: Value) -> Self {
        Response {
            ok: (200..300).contains(&status),
            status,
            data,
        }
    }

    pub fn is_conflict(&self) -> bool {
        !self.ok && self.status == STATUS_CONFLICT
    }
}

/// Transport trait for request/response communication with the remote.
///
/// This trait abstracts over the actual transport mechanism, allowing
/// for easy testing with mock implementations.
pub trait Transport: Send + Sync {
    /// Send a request and wait for its response.
    fn request(&self, url: &str, request: Request) -> BoxFuture<'_, TransportResult<Response>>;

    /// Whether the remote is believed reachable.
    fn is_online(&self) -> bool;

    /// Register for connectivity transitions.
    fn on_online_change(&self, handler: OnlineHandler) -> Subscription;
}

/// Connectivity flag with change notification.
///
/// Handlers fire only on real transitions, never for a repeated value.
/// Transitions are serialized: handlers see them in the order the flag took
/// them. A handler must not call [`set_online`](Self::set_online) on the
/// same instance.
#[derive(Debug)]
pub struct Connectivity {
    online: AtomicBool,
    transitions: Mutex<()>,
    observers: ObserverList<bool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Connectivity {
            online: AtomicBool::new(online),
            transitions: Mutex::new(()),
            observers: ObserverList::new(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Update the flag. Returns true if it changed (and handlers ran).
    pub fn set_online(&self, online: bool) -> bool {
        let _transition = self
            .transitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = self.online.swap(online, Ordering::AcqRel);
        if previous == online {
            return false;
        }
        debug!("Connectivity changed: online={}", online);
        self.observers.emit(&online);
        true
    }

    pub fn subscribe(&self, handler: OnlineHandler) -> Subscription {
        self.observers.subscribe(move |online: &bool| handler(*online))
    }

    /// Number of registered connectivity handlers.
    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// HTTP transport implementation using reqwest.
///
/// Connectivity is driven externally through [`set_online`](Self::set_online),
/// typically from the platform's reachability notifications.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    connectivity: Connectivity,
}

impl HttpTransport {
    /// Create a transport that starts out online.
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Create a transport around a preconfigured client (timeouts, proxies).
    pub fn with_client(client: reqwest::Client) -> Self {
        HttpTransport {
            client,
            connectivity: Connectivity::new(true),
        }
    }

    pub fn set_online(&self, online: bool) -> bool {
        self.connectivity.set_online(online)
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn request(&self, url: &str, request: Request) -> BoxFuture<'_, TransportResult<Response>> {
        let url = url.to_string();
        Box::pin(async move {
            let mut builder = self.client.request(request.method.into(), &url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_builder() {
                    TransportError::InvalidRequest(e.to_string())
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

            let status = response.status().as_u16();
            let text = response
                .text()
                .await
                .map_err(|e| TransportError::Decode(e.to_string()))?;

            debug!("{} {} -> {}", request.method, url, status);
            Ok(Response::new(status, decode_body(&text)))
        })
    }

    fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    fn on_online_change(&self, handler: OnlineHandler) -> Subscription {
        self.connectivity.subscribe(handler)
    }
}

/// Decode a response body: JSON when it parses, raw text otherwise.
pub fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

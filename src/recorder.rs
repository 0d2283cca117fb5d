//! Ordered store of trace events for one test run.
//!
//! A [`Recorder`] is created once per run, shared (behind an `Arc`) by every
//! proxy the run creates, and read by the report generator once the test's
//! database work is done and every row set has been closed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{Error, Result};

/// Default participant name for the system under test.
pub const SYSTEM_UNDER_TEST: &str = "sut";

/// A message exchanged between two participants of the trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub source: String,
    pub target: String,
    pub header: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        header: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            header: header.into(),
            body: body.into(),
            timestamp: Utc::now(),
        }
    }
}

/// An HTTP request observed by the test harness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpRequest {
    pub source: String,
    pub target: String,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// An HTTP response observed by the test harness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResponse {
    pub source: String,
    pub target: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// One entry of the trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    HttpRequest(HttpRequest),
    HttpResponse(HttpResponse),
    MessageRequest(Message),
    MessageResponse(Message),
}

impl Event {
    pub fn source(&self) -> &str {
        match self {
            Event::HttpRequest(e) => &e.source,
            Event::HttpResponse(e) => &e.source,
            Event::MessageRequest(m) | Event::MessageResponse(m) => &m.source,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Event::HttpRequest(e) => &e.target,
            Event::HttpResponse(e) => &e.target,
            Event::MessageRequest(m) | Event::MessageResponse(m) => &m.target,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::HttpRequest(e) => e.timestamp,
            Event::HttpResponse(e) => e.timestamp,
            Event::MessageRequest(m) | Event::MessageResponse(m) => m.timestamp,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Event::HttpRequest(_) | Event::MessageRequest(_))
    }

    /// The message payload, for message events.
    pub fn message(&self) -> Option<&Message> {
        match self {
            Event::MessageRequest(m) | Event::MessageResponse(m) => Some(m),
            _ => None,
        }
    }
}

/// Read-only copy of a recorded run, handed to report generators.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trace {
    pub title: String,
    pub subtitle: String,
    pub meta: BTreeMap<String, serde_json::Value>,
    pub events: Vec<Event>,
}

/// Shared, internally synchronized event store.
///
/// Appends from concurrent callers are serialized by a mutex. Their relative
/// order is the order in which the lock was granted.
#[derive(Debug, Default)]
pub struct Recorder {
    state: Mutex<Trace>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&self, event: Event) -> &Self {
        self.state.lock().events.push(event);
        self
    }

    pub fn add_http_request(&self, request: HttpRequest) -> &Self {
        self.add_event(Event::HttpRequest(request))
    }

    pub fn add_http_response(&self, response: HttpResponse) -> &Self {
        self.add_event(Event::HttpResponse(response))
    }

    pub fn add_message_request(&self, message: Message) -> &Self {
        self.add_event(Event::MessageRequest(message))
    }

    pub fn add_message_response(&self, message: Message) -> &Self {
        self.add_event(Event::MessageResponse(message))
    }

    pub fn add_title(&self, title: impl Into<String>) -> &Self {
        self.state.lock().title = title.into();
        self
    }

    pub fn add_subtitle(&self, subtitle: impl Into<String>) -> &Self {
        self.state.lock().subtitle = subtitle.into();
        self
    }

    /// Set one metadata entry; report generators use these for naming.
    pub fn add_meta(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> &Self {
        self.state.lock().meta.insert(key.into(), value.into());
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn title(&self) -> String {
        self.state.lock().title.clone()
    }

    pub fn subtitle(&self) -> String {
        self.state.lock().subtitle.clone()
    }

    pub fn meta(&self) -> BTreeMap<String, serde_json::Value> {
        self.state.lock().meta.clone()
    }

    /// Copy of the whole run.
    pub fn snapshot(&self) -> Trace {
        self.state.lock().clone()
    }

    /// Status code of the response that closed the run.
    pub fn response_status(&self) -> Result<u16> {
        let state = self.state.lock();
        match state.events.last() {
            None => Err(Error::NoEvents),
            Some(Event::HttpResponse(response)) => Ok(response.status),
            Some(_) => Err(Error::MissingFinalResponse),
        }
    }

    /// Drop all events and metadata.
    pub fn reset(&self) {
        *self.state.lock() = Trace::default();
    }
}

//! # sql-recorder
//!
//! Records the SQL a system under test issues, so an API test report can show
//! it next to the HTTP traffic.
//!
//! The crate wraps any driver implementing the [`driver`] protocol in a
//! recording proxy. The proxy forwards every call unchanged and appends
//! ordered request/response events to a shared [`Recorder`], which a report
//! generator reads once the test is done.
//!
//! ## Features
//!
//! - **Capability transparency**: every proxy layer (driver, connector,
//!   connection, statement) exposes exactly the optional operations of the
//!   object it wraps, so callers that detect capabilities behave the same
//! - **Invisible on the error path**: results and errors pass through
//!   untouched, and failed calls record nothing
//! - **Row counting**: query responses report how many rows were read,
//!   written when the row set is closed
//! - **Opt-in diagnostics**: a [`DiagnosticHook`] sees every intercepted call;
//!   [`TracingHook`] forwards them to `tracing`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sql_recorder::{database, wrap_with_recorder, Context, Recorder};
//!
//! let recorder = Arc::new(Recorder::new());
//! database::register("sqlite3WithRecorder", wrap_with_recorder("sqlite3", recorder.clone())?)?;
//!
//! let db = database::Database::open("sqlite3WithRecorder", "./foo.db")?;
//! db.exec(&Context::background(), "DELETE FROM users WHERE id = ?", &[1.into()]).await?;
//!
//! // request "DELETE FROM users WHERE id = ? [1]", response "Affected rows: 1"
//! assert_eq!(recorder.len(), 2);
//! ```
//!
//! ## Trace Events
//!
//! | Call | Request body | Response body |
//! |------|--------------|---------------|
//! | query, statement query | query text, then `[args]` if any | `Rows returned: N`, on close |
//! | exec, statement exec | query text, then `[args]` if any | `Affected rows: N` |
//!
//! Prepare, begin, ping and close are forwarded without recording.

pub mod capability;
mod config;
mod connection;
mod context;
pub mod database;
pub mod driver;
mod error;
mod hook;
mod instrument;
mod parser;
mod recorder;
mod recording_driver;
mod rows;
mod statement;
mod value;

pub use capability::{
    probe, Capability, CapabilitySet, ConnCapability, ConnectorCapability, DriverCapability,
    StmtCapability,
};
pub use config::{ProxyConfig, SQL_QUERY_HEADER, SQL_RESULT_HEADER};
pub use connection::RecordingConn;
pub use context::Context;
pub use error::{BoxError, Error, Layer, Result};
pub use hook::{DiagnosticHook, NoopHook, Operation, TracingHook};
pub use instrument::request_body;
pub use parser::{SqlSummary, SqlVerb};
pub use recorder::{
    Event, HttpRequest, HttpResponse, Message, Recorder, Trace, SYSTEM_UNDER_TEST,
};
pub use recording_driver::{
    wrap_with_config, wrap_with_recorder, RecordingConnector, RecordingDriver, RecordingExt,
};
pub use rows::RecordingRows;
pub use statement::RecordingStmt;
pub use value::{render_args, IsolationLevel, NamedValue, TxOptions, Value};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::database::Database;
    pub use crate::{
        wrap_with_config, wrap_with_recorder, Context, ProxyConfig, Recorder, RecordingExt,
        Value,
    };
}

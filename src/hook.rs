//! Diagnostics about the proxies themselves.
//!
//! Trace events go to the [`Recorder`](crate::Recorder). A
//! [`DiagnosticHook`] is a second, opt-in channel that sees every intercepted
//! call, including those that record nothing, which helps when a trace looks
//! incomplete.

use std::fmt;

use crate::error::{Error, Layer};
use crate::parser::SqlSummary;

/// The intercepted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Open,
    OpenConnector,
    Connect,
    Prepare,
    PrepareContext,
    Query,
    QueryContext,
    Exec,
    ExecContext,
    Begin,
    BeginTx,
    Ping,
    Next,
    Close,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Open => "open",
            Operation::OpenConnector => "open_connector",
            Operation::Connect => "connect",
            Operation::Prepare => "prepare",
            Operation::PrepareContext => "prepare_context",
            Operation::Query => "query",
            Operation::QueryContext => "query_context",
            Operation::Exec => "exec",
            Operation::ExecContext => "exec_context",
            Operation::Begin => "begin",
            Operation::BeginTx => "begin_tx",
            Operation::Ping => "ping",
            Operation::Next => "next",
            Operation::Close => "close",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer of proxy activity. Both methods default to doing nothing.
pub trait DiagnosticHook: fmt::Debug + Send + Sync {
    /// Called before an intercepted call is forwarded.
    fn intercepted(&self, _layer: Layer, _operation: Operation, _query: Option<&str>) {}

    /// Called when an intercepted call failed, whether the wrapped object
    /// returned the error or the proxy rejected the call before forwarding it.
    /// The error is returned to the caller as is.
    fn failed(&self, _layer: Layer, _operation: Operation, _error: &Error) {}
}

/// Hook that ignores everything. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl DiagnosticHook for NoopHook {}

/// Hook that emits `tracing` debug events.
///
/// ```rust,ignore
/// use sql_recorder::{ProxyConfig, TracingHook};
///
/// tracing_subscriber::fmt().with_env_filter("sql_recorder=debug").init();
/// let config = ProxyConfig::default().with_hook(TracingHook);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

impl DiagnosticHook for TracingHook {
    fn intercepted(&self, layer: Layer, operation: Operation, query: Option<&str>) {
        match query {
            Some(sql) => {
                let summary = SqlSummary::parse(sql);
                tracing::debug!(
                    db.layer = %layer,
                    db.operation = %operation,
                    db.verb = %summary.verb,
                    db.sql.table = summary.table.as_deref().unwrap_or(""),
                    "intercepted {}",
                    summary.label()
                );
            }
            None => {
                tracing::debug!(
                    db.layer = %layer,
                    db.operation = %operation,
                    "intercepted {} {}",
                    layer,
                    operation
                );
            }
        }
    }

    fn failed(&self, layer: Layer, operation: Operation, error: &Error) {
        tracing::debug!(
            db.layer = %layer,
            db.operation = %operation,
            error.message = %error,
            "wrapped call failed, nothing recorded"
        );
    }
}

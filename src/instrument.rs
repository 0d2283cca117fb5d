//! Trace recording shared by every proxy layer.

use std::sync::Arc;

use crate::config::ProxyConfig;
use crate::driver::ExecResult;
use crate::error::{Error, Layer, Result};
use crate::hook::Operation;
use crate::recorder::{Message, Recorder};
use crate::value::{render_args, NamedValue, Value};

/// Recorder, configuration and participant name shared by all proxies
/// created from one wrapped driver.
#[derive(Debug)]
pub(crate) struct Recording {
    recorder: Arc<Recorder>,
    config: Arc<ProxyConfig>,
    source: String,
}

impl Recording {
    pub(crate) fn new(recorder: Arc<Recorder>, config: ProxyConfig, driver_name: &str) -> Self {
        let source = config
            .source_name
            .clone()
            .unwrap_or_else(|| driver_name.to_string());
        Self {
            recorder,
            config: Arc::new(config),
            source,
        }
    }

    pub(crate) fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn intercept(&self, layer: Layer, operation: Operation, query: Option<&str>) {
        self.config.hook.intercepted(layer, operation, query);
    }

    /// Report a failed call to the hook and hand the result back.
    pub(crate) fn settle<T>(
        &self,
        layer: Layer,
        operation: Operation,
        outcome: Result<T>,
    ) -> Result<T> {
        if let Err(err) = &outcome {
            self.config.hook.failed(layer, operation, err);
        }
        outcome
    }

    /// Append the request event for a call that was forwarded successfully.
    pub(crate) fn request(&self, query: &str, args: &[Value]) {
        let body = if self.config.log_parameters {
            request_body(query, args)
        } else {
            query.to_string()
        };
        self.recorder.add_message_request(Message::new(
            self.config.system_under_test.as_str(),
            self.source.as_str(),
            self.config.request_header.as_str(),
            body,
        ));
    }

    /// Append the response event of an exec call. Drivers that cannot report
    /// affected rows are recorded as zero.
    pub(crate) fn affected_rows(&self, result: &dyn ExecResult) {
        let affected = result.rows_affected().unwrap_or(0);
        self.response(format!("Affected rows: {affected}"));
    }

    /// Append the response event of a closed row set.
    pub(crate) fn rows_returned(&self, count: u64) {
        self.response(format!("Rows returned: {count}"));
    }

    fn response(&self, body: String) {
        self.recorder.add_message_response(Message::new(
            self.source.as_str(),
            self.config.system_under_test.as_str(),
            self.config.response_header.as_str(),
            body,
        ));
    }
}

/// `query`, or `query [a b]` when arguments are bound.
pub fn request_body(query: &str, args: &[Value]) -> String {
    if args.is_empty() {
        query.to_string()
    } else {
        format!("{} {}", query, render_args(args))
    }
}

/// Strip ordinals from context-aware arguments, rejecting named parameters.
pub(crate) fn positional(args: &[NamedValue]) -> Result<Vec<Value>> {
    args.iter()
        .map(|arg| match arg.param_name() {
            Some(name) => Err(Error::NamedParameter {
                name: name.to_string(),
            }),
            None => Ok(arg.value.clone()),
        })
        .collect()
}

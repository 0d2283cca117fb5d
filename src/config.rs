//! Configuration for the recording proxies.

use std::sync::Arc;

use crate::hook::{DiagnosticHook, NoopHook, TracingHook};
use crate::recorder::SYSTEM_UNDER_TEST;

/// Header of every request event.
pub const SQL_QUERY_HEADER: &str = "SQL Query";

/// Header of every response event.
pub const SQL_RESULT_HEADER: &str = "SQL Result";

/// Configuration options for recording proxies.
///
/// # Example
///
/// ```rust
/// use sql_recorder::ProxyConfig;
///
/// let config = ProxyConfig::default()
///     .with_source_name("users-db")
///     .with_parameter_logging(false);
/// ```
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Participant name of the code issuing the SQL.
    /// Default: `"sut"`
    pub system_under_test: String,

    /// Participant name of the database in trace events.
    /// Default: `None`, which uses the wrapped driver's registered name.
    pub source_name: Option<String>,

    /// Whether bound arguments are appended to request bodies.
    /// Default: `true`
    pub log_parameters: bool,

    /// Header of request events.
    /// Default: `"SQL Query"`
    pub request_header: String,

    /// Header of response events.
    /// Default: `"SQL Result"`
    pub response_header: String,

    /// Observer of proxy activity.
    /// Default: [`NoopHook`]
    pub hook: Arc<dyn DiagnosticHook>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            system_under_test: SYSTEM_UNDER_TEST.to_string(),
            source_name: None,
            log_parameters: true,
            request_header: SQL_QUERY_HEADER.to_string(),
            response_header: SQL_RESULT_HEADER.to_string(),
            hook: Arc::new(NoopHook),
        }
    }
}

impl ProxyConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_under_test(mut self, name: impl Into<String>) -> Self {
        self.system_under_test = name.into();
        self
    }

    /// Name the database participant instead of using the driver name.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Enable or disable rendering of bound arguments in request bodies.
    ///
    /// Arguments often carry user input; disable this when traces are shared
    /// outside the team.
    pub fn with_parameter_logging(mut self, enabled: bool) -> Self {
        self.log_parameters = enabled;
        self
    }

    pub fn with_request_header(mut self, header: impl Into<String>) -> Self {
        self.request_header = header.into();
        self
    }

    pub fn with_response_header(mut self, header: impl Into<String>) -> Self {
        self.response_header = header.into();
        self
    }

    pub fn with_hook(mut self, hook: impl DiagnosticHook + 'static) -> Self {
        self.hook = Arc::new(hook);
        self
    }

    /// Defaults plus [`TracingHook`], for debugging the proxies themselves.
    pub fn development() -> Self {
        Self::default().with_hook(TracingHook)
    }
}

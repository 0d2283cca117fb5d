//! In-memory fake driver whose optional capabilities are configurable.
#![allow(dead_code)]

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use sql_recorder::driver::{
    Conn, ConnBeginTx, ConnPrepareContext, Connector, ConnectorCloser, Driver, DriverContext,
    ExecResult, Execer, ExecerContext, Pinger, Queryer, QueryerContext, Rows, Stmt,
    StmtExecContext, StmtQueryContext, Tx,
};
use sql_recorder::{
    CapabilitySet, ConnCapability, Context, Error, Event, NamedValue, Recorder, Result,
    StmtCapability, TxOptions, Value,
};

/// Error raised by the fake for queries containing `FAIL`.
#[derive(Debug, PartialEq)]
pub struct FakeError(pub String);

impl fmt::Display for FakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fake driver error: {}", self.0)
    }
}

impl std::error::Error for FakeError {}

/// Settings shared by everything a fake driver hands out.
#[derive(Debug)]
pub struct FakeState {
    pub conn_caps: CapabilitySet<ConnCapability>,
    pub stmt_caps: CapabilitySet<StmtCapability>,
    pub connector: bool,
    pub connector_close: bool,
    pub rows: Vec<Vec<Value>>,
    pub affected: Option<i64>,
    /// Every call the fake received, as `"operation: query args"`.
    pub calls: Mutex<Vec<String>>,
    pub opened: AtomicUsize,
}

impl FakeState {
    fn log(&self, operation: &str, query: &str, args: &str) {
        let mut line = format!("{operation}:");
        for part in [query, args] {
            if !part.is_empty() {
                line.push(' ');
                line.push_str(part);
            }
        }
        self.calls.lock().push(line);
    }

    fn check(&self, query: &str) -> Result<()> {
        if query.contains("FAIL") {
            return Err(Error::driver(FakeError(query.to_string())));
        }
        Ok(())
    }

    fn result(&self) -> Box<dyn ExecResult> {
        Box::new(FakeResult(self.affected))
    }

    fn rows(&self) -> Box<dyn Rows> {
        Box::new(FakeRows {
            rows: self.rows.clone(),
            cursor: 0,
        })
    }
}

/// Builder for fake drivers.
pub struct FakeDriverBuilder {
    state: FakeState,
}

impl FakeDriverBuilder {
    pub fn conn_caps(mut self, caps: CapabilitySet<ConnCapability>) -> Self {
        self.state.conn_caps = caps;
        self
    }

    pub fn stmt_caps(mut self, caps: CapabilitySet<StmtCapability>) -> Self {
        self.state.stmt_caps = caps;
        self
    }

    pub fn connector(mut self, closable: bool) -> Self {
        self.state.connector = true;
        self.state.connector_close = closable;
        self
    }

    pub fn rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.state.rows = rows;
        self
    }

    pub fn affected(mut self, affected: Option<i64>) -> Self {
        self.state.affected = affected;
        self
    }

    pub fn build(self) -> FakeDriver {
        FakeDriver {
            state: Arc::new(self.state),
        }
    }
}

#[derive(Clone)]
pub struct FakeDriver {
    pub state: Arc<FakeState>,
}

impl FakeDriver {
    pub fn builder() -> FakeDriverBuilder {
        FakeDriverBuilder {
            state: FakeState {
                conn_caps: CapabilitySet::empty(),
                stmt_caps: CapabilitySet::empty(),
                connector: false,
                connector_close: false,
                rows: Vec::new(),
                affected: Some(1),
                calls: Mutex::new(Vec::new()),
                opened: AtomicUsize::new(0),
            },
        }
    }

    /// Only the required operations.
    pub fn basic() -> FakeDriver {
        Self::builder().build()
    }

    /// Synchronous query and exec on the connection.
    pub fn synchronous() -> FakeDriver {
        Self::builder()
            .conn_caps(
                CapabilitySet::empty()
                    .with(ConnCapability::Query)
                    .with(ConnCapability::Exec),
            )
            .build()
    }

    /// Every context-aware operation, transactions and ping, plus a connector.
    pub fn context_aware() -> FakeDriver {
        Self::builder()
            .conn_caps(
                CapabilitySet::empty()
                    .with(ConnCapability::QueryContext)
                    .with(ConnCapability::ExecContext)
                    .with(ConnCapability::PrepareContext)
                    .with(ConnCapability::BeginTx)
                    .with(ConnCapability::Ping),
            )
            .stmt_caps(CapabilitySet::all())
            .connector(true)
            .build()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().clone()
    }

    pub fn arc(&self) -> Arc<dyn Driver> {
        Arc::new(self.clone())
    }
}

impl Driver for FakeDriver {
    fn open(&self, dsn: &str) -> Result<Box<dyn Conn>> {
        if dsn == "unreachable" {
            return Err(Error::driver(FakeError("connection refused".into())));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConn {
            state: self.state.clone(),
        }))
    }

    fn as_driver_context(&self) -> Option<&dyn DriverContext> {
        self.state.connector.then_some(self as &dyn DriverContext)
    }
}

impl DriverContext for FakeDriver {
    fn open_connector(&self, dsn: &str) -> Result<Box<dyn Connector>> {
        Ok(Box::new(FakeConnector {
            driver: self.clone(),
            dsn: dsn.to_string(),
        }))
    }
}

pub struct FakeConnector {
    driver: FakeDriver,
    dsn: String,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, ctx: &Context) -> Result<Box<dyn Conn>> {
        ctx.check()?;
        self.driver.open(&self.dsn)
    }

    fn driver(&self) -> Arc<dyn Driver> {
        self.driver.arc()
    }

    fn as_closer(&self) -> Option<&dyn ConnectorCloser> {
        self.driver
            .state
            .connector_close
            .then_some(self as &dyn ConnectorCloser)
    }
}

impl ConnectorCloser for FakeConnector {
    fn close(&self) -> Result<()> {
        self.driver.state.log("connector_close", "", "");
        Ok(())
    }
}

pub struct FakeConn {
    state: Arc<FakeState>,
}

impl FakeConn {
    fn has(&self, capability: ConnCapability) -> bool {
        self.state.conn_caps.contains(capability)
    }

    fn stmt(&self, query: &str) -> Box<dyn Stmt> {
        Box::new(FakeStmt {
            state: self.state.clone(),
            query: query.to_string(),
        })
    }
}

impl Conn for FakeConn {
    fn prepare(&self, query: &str) -> Result<Box<dyn Stmt>> {
        self.state.log("prepare", query, "");
        if query.contains("BAD PREPARE") {
            return Err(Error::driver(FakeError(query.to_string())));
        }
        Ok(self.stmt(query))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn begin(&self) -> Result<Box<dyn Tx>> {
        self.state.log("begin", "", "");
        Ok(Box::new(FakeTx {
            state: self.state.clone(),
        }))
    }

    fn as_queryer(&self) -> Option<&dyn Queryer> {
        self.has(ConnCapability::Query).then_some(self as &dyn Queryer)
    }

    fn as_queryer_context(&self) -> Option<&dyn QueryerContext> {
        self.has(ConnCapability::QueryContext)
            .then_some(self as &dyn QueryerContext)
    }

    fn as_execer(&self) -> Option<&dyn Execer> {
        self.has(ConnCapability::Exec).then_some(self as &dyn Execer)
    }

    fn as_execer_context(&self) -> Option<&dyn ExecerContext> {
        self.has(ConnCapability::ExecContext)
            .then_some(self as &dyn ExecerContext)
    }

    fn as_prepare_context(&self) -> Option<&dyn ConnPrepareContext> {
        self.has(ConnCapability::PrepareContext)
            .then_some(self as &dyn ConnPrepareContext)
    }

    fn as_begin_tx(&self) -> Option<&dyn ConnBeginTx> {
        self.has(ConnCapability::BeginTx)
            .then_some(self as &dyn ConnBeginTx)
    }

    fn as_pinger(&self) -> Option<&dyn Pinger> {
        self.has(ConnCapability::Ping).then_some(self as &dyn Pinger)
    }
}

fn render(args: &[Value]) -> String {
    sql_recorder::render_args(args)
}

fn render_named(args: &[NamedValue]) -> String {
    let parts: Vec<String> = args
        .iter()
        .map(|a| match &a.name {
            Some(name) => format!("{name}={}", a.value),
            None => a.value.to_string(),
        })
        .collect();
    format!("[{}]", parts.join(" "))
}

impl Queryer for FakeConn {
    fn query(&self, query: &str, args: &[Value]) -> Result<Box<dyn Rows>> {
        self.state.log("query", query, &render(args));
        self.state.check(query)?;
        Ok(self.state.rows())
    }
}

#[async_trait]
impl QueryerContext for FakeConn {
    async fn query_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>> {
        self.state.log("query_context", query, &render_named(args));
        ctx.check()?;
        self.state.check(query)?;
        Ok(self.state.rows())
    }
}

impl Execer for FakeConn {
    fn exec(&self, query: &str, args: &[Value]) -> Result<Box<dyn ExecResult>> {
        self.state.log("exec", query, &render(args));
        self.state.check(query)?;
        Ok(self.state.result())
    }
}

#[async_trait]
impl ExecerContext for FakeConn {
    async fn exec_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn ExecResult>> {
        self.state.log("exec_context", query, &render_named(args));
        ctx.check()?;
        self.state.check(query)?;
        Ok(self.state.result())
    }
}

#[async_trait]
impl ConnPrepareContext for FakeConn {
    async fn prepare_context(&self, ctx: &Context, query: &str) -> Result<Box<dyn Stmt>> {
        self.state.log("prepare_context", query, "");
        ctx.check()?;
        if query.contains("BAD PREPARE") {
            return Err(Error::driver(FakeError(query.to_string())));
        }
        Ok(self.stmt(query))
    }
}

#[async_trait]
impl ConnBeginTx for FakeConn {
    async fn begin_tx(&self, ctx: &Context, opts: TxOptions) -> Result<Box<dyn Tx>> {
        self.state
            .log("begin_tx", "", &format!("read_only={}", opts.read_only));
        ctx.check()?;
        Ok(Box::new(FakeTx {
            state: self.state.clone(),
        }))
    }
}

#[async_trait]
impl Pinger for FakeConn {
    async fn ping(&self, ctx: &Context) -> Result<()> {
        self.state.log("ping", "", "");
        ctx.check()
    }
}

pub struct FakeStmt {
    state: Arc<FakeState>,
    query: String,
}

impl Stmt for FakeStmt {
    fn close(&self) -> Result<()> {
        self.state.log("stmt_close", &self.query, "");
        Ok(())
    }

    fn num_input(&self) -> Option<usize> {
        Some(self.query.matches('?').count())
    }

    fn exec(&self, args: &[Value]) -> Result<Box<dyn ExecResult>> {
        self.state.log("stmt_exec", &self.query, &render(args));
        self.state.check(&self.query)?;
        Ok(self.state.result())
    }

    fn query(&self, args: &[Value]) -> Result<Box<dyn Rows>> {
        self.state.log("stmt_query", &self.query, &render(args));
        self.state.check(&self.query)?;
        Ok(self.state.rows())
    }

    fn as_exec_context(&self) -> Option<&dyn StmtExecContext> {
        self.state
            .stmt_caps
            .contains(StmtCapability::ExecContext)
            .then_some(self as &dyn StmtExecContext)
    }

    fn as_query_context(&self) -> Option<&dyn StmtQueryContext> {
        self.state
            .stmt_caps
            .contains(StmtCapability::QueryContext)
            .then_some(self as &dyn StmtQueryContext)
    }
}

#[async_trait]
impl StmtExecContext for FakeStmt {
    async fn exec_context(
        &self,
        ctx: &Context,
        args: &[NamedValue],
    ) -> Result<Box<dyn ExecResult>> {
        self.state
            .log("stmt_exec_context", &self.query, &render_named(args));
        ctx.check()?;
        self.state.check(&self.query)?;
        Ok(self.state.result())
    }
}

#[async_trait]
impl StmtQueryContext for FakeStmt {
    async fn query_context(&self, ctx: &Context, args: &[NamedValue]) -> Result<Box<dyn Rows>> {
        self.state
            .log("stmt_query_context", &self.query, &render_named(args));
        ctx.check()?;
        self.state.check(&self.query)?;
        Ok(self.state.rows())
    }
}

pub struct FakeRows {
    rows: Vec<Vec<Value>>,
    cursor: usize,
}

impl Rows for FakeRows {
    fn columns(&self) -> Vec<String> {
        vec!["id".to_string(), "name".to_string()]
    }

    fn next(&mut self, dest: &mut [Value]) -> Result<bool> {
        let Some(row) = self.rows.get(self.cursor) else {
            return Ok(false);
        };
        for (slot, value) in dest.iter_mut().zip(row) {
            *slot = value.clone();
        }
        self.cursor += 1;
        Ok(true)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct FakeResult(Option<i64>);

impl ExecResult for FakeResult {
    fn last_insert_id(&self) -> Result<i64> {
        Ok(42)
    }

    fn rows_affected(&self) -> Result<i64> {
        self.0
            .ok_or_else(|| Error::driver(FakeError("rows affected unavailable".into())))
    }
}

pub struct FakeTx {
    state: Arc<FakeState>,
}

impl Tx for FakeTx {
    fn commit(&self) -> Result<()> {
        self.state.log("commit", "", "");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.state.log("rollback", "", "");
        Ok(())
    }
}

/// Three rows of `(id, name)`.
pub fn three_users() -> Vec<Vec<Value>> {
    vec![
        vec![Value::from(1), Value::from("ada")],
        vec![Value::from(2), Value::from("grace")],
        vec![Value::from(3), Value::from("barbara")],
    ]
}

/// A driver name no other test uses; the registry is process-wide.
pub fn unique_name(prefix: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!("{prefix}-{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// `(is_request, header, body)` of every message event.
pub fn messages(recorder: &Recorder) -> Vec<(bool, String, String)> {
    recorder
        .events()
        .iter()
        .filter_map(|e| {
            e.message()
                .map(|m| (matches!(e, Event::MessageRequest(_)), m.header.clone(), m.body.clone()))
        })
        .collect()
}

/// Bodies of every message event.
pub fn bodies(recorder: &Recorder) -> Vec<String> {
    messages(recorder).into_iter().map(|(_, _, body)| body).collect()
}

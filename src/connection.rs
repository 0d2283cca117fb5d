//! Connection proxy.

use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::{probe, Capability, CapabilitySet, ConnCapability};
use crate::context::Context;
use crate::driver::{
    Conn, ConnBeginTx, ConnPrepareContext, ExecResult, Execer, ExecerContext, Pinger, Queryer,
    QueryerContext, Rows, Stmt, Tx,
};
use crate::error::{Error, Layer, Result};
use crate::hook::Operation;
use crate::instrument::{positional, Recording};
use crate::rows::RecordingRows;
use crate::statement::RecordingStmt;
use crate::value::{NamedValue, TxOptions, Value};

const LAYER: Layer = Layer::Connection;

/// A recording wrapper around a driver connection.
///
/// The proxy answers the `as_*` capability accessors of [`Conn`] from the set
/// probed on the wrapped connection, so code that checks for, say,
/// [`QueryerContext`] takes the same path it would with the real driver.
/// Each optional capability is forwarded by its own trait impl below.
///
/// Query and exec calls append a request event once the wrapped call
/// succeeded. Exec calls append their response right away, queries when the
/// returned rows are closed. Failed calls append nothing.
pub struct RecordingConn {
    inner: Box<dyn Conn>,
    capabilities: CapabilitySet<ConnCapability>,
    recording: Arc<Recording>,
}

impl RecordingConn {
    /// Wrap `conn`, exposing exactly the capabilities it implements.
    pub(crate) fn new(conn: Box<dyn Conn>, recording: Arc<Recording>) -> Result<Self> {
        let capabilities = probe::<ConnCapability>(&*conn);
        Self::with_capabilities(conn, capabilities, recording)
    }

    /// Wrap `conn`, exposing only `capabilities`. Fails if `conn` does not
    /// implement all of them.
    pub(crate) fn with_capabilities(
        conn: Box<dyn Conn>,
        capabilities: CapabilitySet<ConnCapability>,
        recording: Arc<Recording>,
    ) -> Result<Self> {
        let available = probe::<ConnCapability>(&*conn);
        if let Some(missing) = capabilities.difference(&available).next() {
            return Err(Error::CapabilityMismatch {
                layer: LAYER,
                capability: missing.name(),
            });
        }
        Ok(Self {
            inner: conn,
            capabilities,
            recording,
        })
    }

    pub fn capabilities(&self) -> CapabilitySet<ConnCapability> {
        self.capabilities
    }

    /// The wrapped object's implementation of `capability`. A missing or
    /// unexposed capability is reported to the hook like any failed call.
    fn delegate<'a, T: ?Sized + 'a>(
        &'a self,
        operation: Operation,
        capability: ConnCapability,
        access: impl FnOnce(&'a dyn Conn) -> Option<&'a T>,
    ) -> Result<&'a T> {
        let found = if self.capabilities.contains(capability) {
            access(&*self.inner)
        } else {
            None
        };
        let found = found.ok_or(Error::Unsupported {
            layer: LAYER,
            capability: capability.name(),
        });
        self.recording.settle(LAYER, operation, found)
    }

    /// Positional values of context-aware arguments. Named parameters fail
    /// before anything is forwarded.
    fn arguments(&self, operation: Operation, args: &[NamedValue]) -> Result<Vec<Value>> {
        self.recording.settle(LAYER, operation, positional(args))
    }

    fn exposes(&self, capability: ConnCapability) -> bool {
        self.capabilities.contains(capability)
    }

    fn wrap_stmt(&self, stmt: Box<dyn Stmt>, query: &str) -> Result<Box<dyn Stmt>> {
        Ok(Box::new(RecordingStmt::new(
            stmt,
            query,
            self.recording.clone(),
        )?))
    }

    fn record_query(&self, query: &str, args: &[Value], rows: Box<dyn Rows>) -> Box<dyn Rows> {
        self.recording.request(query, args);
        Box::new(RecordingRows::new(rows, self.recording.clone()))
    }

    fn record_exec(&self, query: &str, args: &[Value], result: &dyn ExecResult) {
        self.recording.request(query, args);
        self.recording.affected_rows(result);
    }
}

impl Conn for RecordingConn {
    fn prepare(&self, query: &str) -> Result<Box<dyn Stmt>> {
        self.recording.intercept(LAYER, Operation::Prepare, Some(query));
        let stmt = self
            .recording
            .settle(LAYER, Operation::Prepare, self.inner.prepare(query))?;
        self.wrap_stmt(stmt, query)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }

    fn begin(&self) -> Result<Box<dyn Tx>> {
        self.inner.begin()
    }

    fn as_queryer(&self) -> Option<&dyn Queryer> {
        self.exposes(ConnCapability::Query)
            .then_some(self as &dyn Queryer)
    }

    fn as_queryer_context(&self) -> Option<&dyn QueryerContext> {
        self.exposes(ConnCapability::QueryContext)
            .then_some(self as &dyn QueryerContext)
    }

    fn as_execer(&self) -> Option<&dyn Execer> {
        self.exposes(ConnCapability::Exec)
            .then_some(self as &dyn Execer)
    }

    fn as_execer_context(&self) -> Option<&dyn ExecerContext> {
        self.exposes(ConnCapability::ExecContext)
            .then_some(self as &dyn ExecerContext)
    }

    fn as_prepare_context(&self) -> Option<&dyn ConnPrepareContext> {
        self.exposes(ConnCapability::PrepareContext)
            .then_some(self as &dyn ConnPrepareContext)
    }

    fn as_begin_tx(&self) -> Option<&dyn ConnBeginTx> {
        self.exposes(ConnCapability::BeginTx)
            .then_some(self as &dyn ConnBeginTx)
    }

    fn as_pinger(&self) -> Option<&dyn Pinger> {
        self.exposes(ConnCapability::Ping)
            .then_some(self as &dyn Pinger)
    }
}

impl Queryer for RecordingConn {
    fn query(&self, query: &str, args: &[Value]) -> Result<Box<dyn Rows>> {
        self.recording.intercept(LAYER, Operation::Query, Some(query));
        let inner = self.delegate(Operation::Query, ConnCapability::Query, |c| c.as_queryer())?;
        let rows = self
            .recording
            .settle(LAYER, Operation::Query, inner.query(query, args))?;
        Ok(self.record_query(query, args, rows))
    }
}

#[async_trait]
impl QueryerContext for RecordingConn {
    async fn query_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>> {
        self.recording
            .intercept(LAYER, Operation::QueryContext, Some(query));
        let values = self.arguments(Operation::QueryContext, args)?;
        let inner = self.delegate(
            Operation::QueryContext,
            ConnCapability::QueryContext,
            |c| c.as_queryer_context(),
        )?;
        let rows = self.recording.settle(
            LAYER,
            Operation::QueryContext,
            inner.query_context(ctx, query, args).await,
        )?;
        Ok(self.record_query(query, &values, rows))
    }
}

impl Execer for RecordingConn {
    fn exec(&self, query: &str, args: &[Value]) -> Result<Box<dyn ExecResult>> {
        self.recording.intercept(LAYER, Operation::Exec, Some(query));
        let inner = self.delegate(Operation::Exec, ConnCapability::Exec, |c| c.as_execer())?;
        let result = self
            .recording
            .settle(LAYER, Operation::Exec, inner.exec(query, args))?;
        self.record_exec(query, args, &*result);
        Ok(result)
    }
}

#[async_trait]
impl ExecerContext for RecordingConn {
    async fn exec_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn ExecResult>> {
        self.recording
            .intercept(LAYER, Operation::ExecContext, Some(query));
        let values = self.arguments(Operation::ExecContext, args)?;
        let inner = self.delegate(
            Operation::ExecContext,
            ConnCapability::ExecContext,
            |c| c.as_execer_context(),
        )?;
        let result = self.recording.settle(
            LAYER,
            Operation::ExecContext,
            inner.exec_context(ctx, query, args).await,
        )?;
        self.record_exec(query, &values, &*result);
        Ok(result)
    }
}

#[async_trait]
impl ConnPrepareContext for RecordingConn {
    async fn prepare_context(&self, ctx: &Context, query: &str) -> Result<Box<dyn Stmt>> {
        self.recording
            .intercept(LAYER, Operation::PrepareContext, Some(query));
        let inner = self.delegate(
            Operation::PrepareContext,
            ConnCapability::PrepareContext,
            |c| c.as_prepare_context(),
        )?;
        let stmt = self.recording.settle(
            LAYER,
            Operation::PrepareContext,
            inner.prepare_context(ctx, query).await,
        )?;
        self.wrap_stmt(stmt, query)
    }
}

#[async_trait]
impl ConnBeginTx for RecordingConn {
    async fn begin_tx(&self, ctx: &Context, opts: TxOptions) -> Result<Box<dyn Tx>> {
        self.recording.intercept(LAYER, Operation::BeginTx, None);
        let inner = self.delegate(
            Operation::BeginTx,
            ConnCapability::BeginTx,
            |c| c.as_begin_tx(),
        )?;
        self.recording
            .settle(LAYER, Operation::BeginTx, inner.begin_tx(ctx, opts).await)
    }
}

#[async_trait]
impl Pinger for RecordingConn {
    async fn ping(&self, ctx: &Context) -> Result<()> {
        self.recording.intercept(LAYER, Operation::Ping, None);
        let inner = self.delegate(Operation::Ping, ConnCapability::Ping, |c| c.as_pinger())?;
        self.recording
            .settle(LAYER, Operation::Ping, inner.ping(ctx).await)
    }
}

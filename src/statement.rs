//! Prepared statement proxy.

use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::{probe, Capability, CapabilitySet, StmtCapability};
use crate::context::Context;
use crate::driver::{ExecResult, Rows, Stmt, StmtExecContext, StmtQueryContext};
use crate::error::{Error, Layer, Result};
use crate::hook::Operation;
use crate::instrument::{positional, Recording};
use crate::rows::RecordingRows;
use crate::value::{NamedValue, Value};

const LAYER: Layer = Layer::Statement;

/// Records executions of a prepared statement.
///
/// Keeps the query text from `prepare`, since statement execution does not
/// repeat it.
pub struct RecordingStmt {
    inner: Box<dyn Stmt>,
    capabilities: CapabilitySet<StmtCapability>,
    query: String,
    recording: Arc<Recording>,
}

impl RecordingStmt {
    /// Wrap `stmt`, exposing exactly the capabilities it implements.
    pub(crate) fn new(stmt: Box<dyn Stmt>, query: &str, recording: Arc<Recording>) -> Result<Self> {
        let capabilities = probe::<StmtCapability>(&*stmt);
        Self::with_capabilities(stmt, capabilities, query, recording)
    }

    pub(crate) fn with_capabilities(
        stmt: Box<dyn Stmt>,
        capabilities: CapabilitySet<StmtCapability>,
        query: &str,
        recording: Arc<Recording>,
    ) -> Result<Self> {
        let available = probe::<StmtCapability>(&*stmt);
        if let Some(missing) = capabilities.difference(&available).next() {
            return Err(Error::CapabilityMismatch {
                layer: LAYER,
                capability: missing.name(),
            });
        }
        Ok(Self {
            inner: stmt,
            capabilities,
            query: query.to_string(),
            recording,
        })
    }

    pub fn capabilities(&self) -> CapabilitySet<StmtCapability> {
        self.capabilities
    }

    pub fn query_text(&self) -> &str {
        &self.query
    }

    /// The wrapped object's implementation of `capability`. A missing or
    /// unexposed capability is reported to the hook like any failed call.
    fn delegate<'a, T: ?Sized + 'a>(
        &'a self,
        operation: Operation,
        capability: StmtCapability,
        access: impl FnOnce(&'a dyn Stmt) -> Option<&'a T>,
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

    fn record_exec(&self, args: &[Value], result: &dyn ExecResult) {
        self.recording.request(&self.query, args);
        self.recording.affected_rows(result);
    }

    fn record_query(&self, args: &[Value], rows: Box<dyn Rows>) -> Box<dyn Rows> {
        self.recording.request(&self.query, args);
        Box::new(RecordingRows::new(rows, self.recording.clone()))
    }
}

impl Stmt for RecordingStmt {
    fn close(&self) -> Result<()> {
        self.inner.close()
    }

    fn num_input(&self) -> Option<usize> {
        self.inner.num_input()
    }

    fn exec(&self, args: &[Value]) -> Result<Box<dyn ExecResult>> {
        self.recording.intercept(LAYER, Operation::Exec, Some(&self.query));
        let result = self
            .recording
            .settle(LAYER, Operation::Exec, self.inner.exec(args))?;
        self.record_exec(args, &*result);
        Ok(result)
    }

    fn query(&self, args: &[Value]) -> Result<Box<dyn Rows>> {
        self.recording.intercept(LAYER, Operation::Query, Some(&self.query));
        let rows = self
            .recording
            .settle(LAYER, Operation::Query, self.inner.query(args))?;
        Ok(self.record_query(args, rows))
    }

    fn as_exec_context(&self) -> Option<&dyn StmtExecContext> {
        self.capabilities
            .contains(StmtCapability::ExecContext)
            .then_some(self as &dyn StmtExecContext)
    }

    fn as_query_context(&self) -> Option<&dyn StmtQueryContext> {
        self.capabilities
            .contains(StmtCapability::QueryContext)
            .then_some(self as &dyn StmtQueryContext)
    }
}

#[async_trait]
impl StmtExecContext for RecordingStmt {
    async fn exec_context(
        &self,
        ctx: &Context,
        args: &[NamedValue],
    ) -> Result<Box<dyn ExecResult>> {
        self.recording
            .intercept(LAYER, Operation::ExecContext, Some(&self.query));
        let values = self.arguments(Operation::ExecContext, args)?;
        let inner = self.delegate(
            Operation::ExecContext,
            StmtCapability::ExecContext,
            |s| s.as_exec_context(),
        )?;
        let result = self.recording.settle(
            LAYER,
            Operation::ExecContext,
            inner.exec_context(ctx, args).await,
        )?;
        self.record_exec(&values, &*result);
        Ok(result)
    }
}

#[async_trait]
impl StmtQueryContext for RecordingStmt {
    async fn query_context(&self, ctx: &Context, args: &[NamedValue]) -> Result<Box<dyn Rows>> {
        self.recording
            .intercept(LAYER, Operation::QueryContext, Some(&self.query));
        let values = self.arguments(Operation::QueryContext, args)?;
        let inner = self.delegate(
            Operation::QueryContext,
            StmtCapability::QueryContext,
            |s| s.as_query_context(),
        )?;
        let rows = self.recording.settle(
            LAYER,
            Operation::QueryContext,
            inner.query_context(ctx, args).await,
        )?;
        Ok(self.record_query(&values, rows))
    }
}

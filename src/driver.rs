//! The pluggable driver protocol.
//!
//! A database driver is a stack of five layers: [`Driver`] hands out
//! connections (directly, or through a [`Connector`]), a [`Conn`] prepares
//! [`Stmt`]s, and statements produce [`Rows`] or an [`ExecResult`].
//!
//! Each layer has a small required contract. Everything beyond it is an
//! optional capability, discovered at runtime through the `as_*` accessors:
//! a driver that implements, say, [`QueryerContext`] overrides
//! [`Conn::as_queryer_context`] to return `Some(self)`. Callers must not
//! assume any optional capability is present.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::value::{NamedValue, TxOptions, Value};

/// Entry point of a driver implementation.
pub trait Driver: Send + Sync {
    /// Open a new connection using a driver specific data source name.
    fn open(&self, dsn: &str) -> Result<Box<dyn Conn>>;

    fn as_driver_context(&self) -> Option<&dyn DriverContext> {
        None
    }
}

/// Drivers that can parse the data source name once and hand out a
/// [`Connector`] for repeated connects.
pub trait DriverContext: Send + Sync {
    fn open_connector(&self, dsn: &str) -> Result<Box<dyn Connector>>;
}

/// A data source bound to fixed connection settings.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, ctx: &Context) -> Result<Box<dyn Conn>>;

    /// The driver this connector belongs to.
    fn driver(&self) -> Arc<dyn Driver>;

    fn as_closer(&self) -> Option<&dyn ConnectorCloser> {
        None
    }
}

/// Connectors holding resources that must be released when the pool closes.
pub trait ConnectorCloser: Send + Sync {
    fn close(&self) -> Result<()>;
}

/// A single connection. Used by one caller at a time.
pub trait Conn: Send + Sync {
    fn prepare(&self, query: &str) -> Result<Box<dyn Stmt>>;

    fn close(&self) -> Result<()>;

    fn begin(&self) -> Result<Box<dyn Tx>>;

    fn as_queryer(&self) -> Option<&dyn Queryer> {
        None
    }

    fn as_queryer_context(&self) -> Option<&dyn QueryerContext> {
        None
    }

    fn as_execer(&self) -> Option<&dyn Execer> {
        None
    }

    fn as_execer_context(&self) -> Option<&dyn ExecerContext> {
        None
    }

    fn as_prepare_context(&self) -> Option<&dyn ConnPrepareContext> {
        None
    }

    fn as_begin_tx(&self) -> Option<&dyn ConnBeginTx> {
        None
    }

    fn as_pinger(&self) -> Option<&dyn Pinger> {
        None
    }
}

/// Query without preparing a statement first.
pub trait Queryer: Send + Sync {
    fn query(&self, query: &str, args: &[Value]) -> Result<Box<dyn Rows>>;
}

#[async_trait]
pub trait QueryerContext: Send + Sync {
    async fn query_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>>;
}

/// Execute without preparing a statement first.
pub trait Execer: Send + Sync {
    fn exec(&self, query: &str, args: &[Value]) -> Result<Box<dyn ExecResult>>;
}

#[async_trait]
pub trait ExecerContext: Send + Sync {
    async fn exec_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn ExecResult>>;
}

#[async_trait]
pub trait ConnPrepareContext: Send + Sync {
    async fn prepare_context(&self, ctx: &Context, query: &str) -> Result<Box<dyn Stmt>>;
}

#[async_trait]
pub trait ConnBeginTx: Send + Sync {
    async fn begin_tx(&self, ctx: &Context, opts: TxOptions) -> Result<Box<dyn Tx>>;
}

#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, ctx: &Context) -> Result<()>;
}

/// A prepared statement.
pub trait Stmt: Send + Sync {
    fn close(&self) -> Result<()>;

    /// Number of placeholders, or `None` when the driver cannot tell.
    fn num_input(&self) -> Option<usize>;

    fn exec(&self, args: &[Value]) -> Result<Box<dyn ExecResult>>;

    fn query(&self, args: &[Value]) -> Result<Box<dyn Rows>>;

    fn as_exec_context(&self) -> Option<&dyn StmtExecContext> {
        None
    }

    fn as_query_context(&self) -> Option<&dyn StmtQueryContext> {
        None
    }
}

#[async_trait]
pub trait StmtExecContext: Send + Sync {
    async fn exec_context(&self, ctx: &Context, args: &[NamedValue])
        -> Result<Box<dyn ExecResult>>;
}

#[async_trait]
pub trait StmtQueryContext: Send + Sync {
    async fn query_context(&self, ctx: &Context, args: &[NamedValue]) -> Result<Box<dyn Rows>>;
}

/// Iterator over a query result.
pub trait Rows: Send {
    fn columns(&self) -> Vec<String>;

    /// Fill `dest` with the next row. Returns `Ok(false)` once the rows are
    /// exhausted; end of data is not an error.
    fn next(&mut self, dest: &mut [Value]) -> Result<bool>;

    fn close(&mut self) -> Result<()>;
}

pub trait Tx: Send + Sync {
    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;
}

/// Outcome of an exec call.
pub trait ExecResult: Send + Sync {
    fn last_insert_id(&self) -> Result<i64>;

    fn rows_affected(&self) -> Result<i64>;
}

/// An [`ExecResult`] that only knows how many rows were affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected(pub i64);

impl ExecResult for RowsAffected {
    fn last_insert_id(&self) -> Result<i64> {
        Err(Error::NoLastInsertId)
    }

    fn rows_affected(&self) -> Result<i64> {
        Ok(self.0)
    }
}

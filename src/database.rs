//! A minimal SQL access layer over the driver protocol.
//!
//! Drivers are registered by name in a process-wide registry and opened
//! through [`Database`], which picks the best operation each connection
//! offers: the context-aware variant when present, otherwise the synchronous
//! one, otherwise a prepared statement. This is the same capability detection
//! a recording proxy has to reproduce faithfully.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{Mutex, RwLock};

use async_trait::async_trait;

use crate::context::Context;
use crate::driver::{Conn, Connector, Driver, ExecResult, Rows, Stmt, Tx};
use crate::error::{Error, Layer, Result};
use crate::value::{NamedValue, TxOptions, Value};

static DRIVERS: Lazy<RwLock<HashMap<String, Arc<dyn Driver>>>> = Lazy::new(Default::default);

/// Make a driver available under `name`. Names cannot be reused.
pub fn register(name: impl Into<String>, driver: Arc<dyn Driver>) -> Result<()> {
    let name = name.into();
    let mut drivers = DRIVERS.write();
    if drivers.contains_key(&name) {
        return Err(Error::DuplicateDriver(name));
    }
    drivers.insert(name, driver);
    Ok(())
}

/// The driver registered under `name`.
pub fn lookup(name: &str) -> Result<Arc<dyn Driver>> {
    DRIVERS
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| Error::UnknownDriver(name.to_string()))
}

/// Sorted names of all registered drivers.
pub fn drivers() -> Vec<String> {
    let mut names: Vec<String> = DRIVERS.read().keys().cloned().collect();
    names.sort();
    names
}

/// Connector for drivers that only support [`Driver::open`].
struct DsnConnector {
    driver: Arc<dyn Driver>,
    dsn: String,
}

#[async_trait]
impl Connector for DsnConnector {
    async fn connect(&self, _ctx: &Context) -> Result<Box<dyn Conn>> {
        self.driver.open(&self.dsn)
    }

    fn driver(&self) -> Arc<dyn Driver> {
        self.driver.clone()
    }
}

/// A handle to a database, holding a small pool of idle connections.
///
/// Opening a handle does not connect; the first operation does.
pub struct Database {
    driver: Arc<dyn Driver>,
    dsn: String,
    connector: OnceCell<Box<dyn Connector>>,
    idle: Mutex<Vec<Box<dyn Conn>>>,
    closed: AtomicBool,
}

impl Database {
    pub fn open(driver_name: &str, dsn: &str) -> Result<Self> {
        Ok(Self::with_driver(lookup(driver_name)?, dsn))
    }

    pub fn with_driver(driver: Arc<dyn Driver>, dsn: &str) -> Self {
        Self {
            driver,
            dsn: dsn.to_string(),
            connector: OnceCell::new(),
            idle: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// The driver backing this handle.
    pub fn driver(&self) -> Arc<dyn Driver> {
        match self.connector.get() {
            Some(connector) => connector.driver(),
            None => self.driver.clone(),
        }
    }

    fn connector(&self) -> Result<&dyn Connector> {
        let connector = self.connector.get_or_try_init(|| -> Result<Box<dyn Connector>> {
            match self.driver.as_driver_context() {
                Some(driver) => driver.open_connector(&self.dsn),
                None => Ok(Box::new(DsnConnector {
                    driver: self.driver.clone(),
                    dsn: self.dsn.clone(),
                })),
            }
        })?;
        Ok(connector.as_ref())
    }

    async fn conn(&self, ctx: &Context) -> Result<PooledConn<'_>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::DatabaseClosed);
        }
        ctx.check()?;
        let idle = self.idle.lock().pop();
        let conn = match idle {
            Some(conn) => conn,
            None => self.connector()?.connect(ctx).await?,
        };
        Ok(PooledConn {
            db: self,
            conn: Some(conn),
        })
    }

    fn release(&self, conn: Box<dyn Conn>) {
        if self.closed.load(Ordering::Acquire) {
            let _ = conn.close();
        } else {
            self.idle.lock().push(conn);
        }
    }

    /// Run a query and return its rows. The rows keep their connection out
    /// of the pool until they are closed.
    pub async fn query(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> Result<QueryRows<'_>> {
        let conn = self.conn(ctx).await?;
        let rows = query_on(conn.get(), ctx, query, args).await?;
        Ok(rows.holding(conn))
    }

    /// Run a statement that returns no rows.
    pub async fn exec(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> Result<Box<dyn ExecResult>> {
        let conn = self.conn(ctx).await?;
        exec_on(conn.get(), ctx, query, args).await
    }

    /// Prepare a statement on a connection it keeps until closed.
    pub async fn prepare(&self, ctx: &Context, query: &str) -> Result<Statement<'_>> {
        let conn = self.conn(ctx).await?;
        let stmt = prepare_on(conn.get(), ctx, query).await?;
        Ok(Statement {
            stmt,
            conn: Some(conn),
            closed: false,
        })
    }

    /// Start a transaction. Non-default options need a driver that supports
    /// them.
    pub async fn begin(&self, ctx: &Context, opts: TxOptions) -> Result<Transaction<'_>> {
        let conn = self.conn(ctx).await?;
        let tx = match conn.get().as_begin_tx() {
            Some(begin) => begin.begin_tx(ctx, opts).await?,
            None if opts.is_default() => conn.get().begin()?,
            None => {
                return Err(Error::Unsupported {
                    layer: Layer::Connection,
                    capability: "begin_tx",
                })
            }
        };
        Ok(Transaction {
            conn,
            tx: Some(tx),
        })
    }

    /// Check that the database is reachable.
    pub async fn ping(&self, ctx: &Context) -> Result<()> {
        let conn = self.conn(ctx).await?;
        match conn.get().as_pinger() {
            Some(pinger) => pinger.ping(ctx).await,
            None => Ok(()),
        }
    }

    /// Number of idle pooled connections.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    /// Close idle connections and the connector. Connections in use are
    /// closed when they are released.
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        let idle: Vec<Box<dyn Conn>> = std::mem::take(&mut *self.idle.lock());
        let mut first_err = None;
        for conn in idle {
            if let Err(err) = conn.close() {
                first_err.get_or_insert(err);
            }
        }
        if let Some(closer) = self.connector.get().and_then(|c| c.as_closer()) {
            if let Err(err) = closer.close() {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A connection borrowed from the pool, returned on drop.
struct PooledConn<'a> {
    db: &'a Database,
    conn: Option<Box<dyn Conn>>,
}

impl PooledConn<'_> {
    fn get(&self) -> &dyn Conn {
        self.conn
            .as_deref()
            .expect("pooled connection is present until dropped")
    }
}

impl Drop for PooledConn<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.db.release(conn);
        }
    }
}

async fn prepare_on(conn: &dyn Conn, ctx: &Context, query: &str) -> Result<Box<dyn Stmt>> {
    match conn.as_prepare_context() {
        Some(prepare) => prepare.prepare_context(ctx, query).await,
        None => {
            ctx.check()?;
            conn.prepare(query)
        }
    }
}

async fn query_on<'a>(
    conn: &dyn Conn,
    ctx: &Context,
    query: &str,
    args: &[Value],
) -> Result<QueryRows<'a>> {
    if let Some(queryer) = conn.as_queryer_context() {
        let rows = queryer
            .query_context(ctx, query, &NamedValue::from_values(args))
            .await?;
        return Ok(QueryRows::new(rows, None));
    }
    if let Some(queryer) = conn.as_queryer() {
        ctx.check()?;
        return Ok(QueryRows::new(queryer.query(query, args)?, None));
    }

    let stmt = prepare_on(conn, ctx, query).await?;
    let rows = match stmt_query(&*stmt, ctx, args).await {
        Ok(rows) => rows,
        Err(err) => {
            let _ = stmt.close();
            return Err(err);
        }
    };
    Ok(QueryRows::new(rows, Some(stmt)))
}

async fn exec_on(
    conn: &dyn Conn,
    ctx: &Context,
    query: &str,
    args: &[Value],
) -> Result<Box<dyn ExecResult>> {
    if let Some(execer) = conn.as_execer_context() {
        return execer
            .exec_context(ctx, query, &NamedValue::from_values(args))
            .await;
    }
    if let Some(execer) = conn.as_execer() {
        ctx.check()?;
        return execer.exec(query, args);
    }

    let stmt = prepare_on(conn, ctx, query).await?;
    let result = stmt_exec(&*stmt, ctx, args).await;
    let closed = stmt.close();
    let result = result?;
    closed?;
    Ok(result)
}

async fn stmt_query(stmt: &dyn Stmt, ctx: &Context, args: &[Value]) -> Result<Box<dyn Rows>> {
    match stmt.as_query_context() {
        Some(query) => query.query_context(ctx, &NamedValue::from_values(args)).await,
        None => {
            ctx.check()?;
            stmt.query(args)
        }
    }
}

async fn stmt_exec(stmt: &dyn Stmt, ctx: &Context, args: &[Value]) -> Result<Box<dyn ExecResult>> {
    match stmt.as_exec_context() {
        Some(exec) => exec.exec_context(ctx, &NamedValue::from_values(args)).await,
        None => {
            ctx.check()?;
            stmt.exec(args)
        }
    }
}

/// Rows of a query.
///
/// Closed automatically once exhausted, on a read error and on drop. Rows
/// read through [`Database::query`] return their connection to the pool
/// when closed.
pub struct QueryRows<'a> {
    rows: Box<dyn Rows>,
    stmt: Option<Box<dyn Stmt>>,
    conn: Option<PooledConn<'a>>,
    columns: Vec<String>,
    closed: bool,
}

impl<'a> QueryRows<'a> {
    fn new(rows: Box<dyn Rows>, stmt: Option<Box<dyn Stmt>>) -> Self {
        let columns = rows.columns();
        Self {
            rows,
            stmt,
            conn: None,
            columns,
            closed: false,
        }
    }

    fn holding(mut self, conn: PooledConn<'a>) -> Self {
        self.conn = Some(conn);
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The next row, or `None` once the rows are exhausted.
    pub fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        if self.closed {
            return Ok(None);
        }
        let mut row = vec![Value::Null; self.columns.len()];
        match self.rows.next(&mut row) {
            Ok(true) => Ok(Some(row)),
            Ok(false) => {
                self.close()?;
                Ok(None)
            }
            Err(err) => {
                let _ = self.close();
                Err(err)
            }
        }
    }

    /// Read every remaining row.
    pub fn collect_rows(&mut self) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut result = self.rows.close();
        if let Some(stmt) = self.stmt.take() {
            let closed = stmt.close();
            if result.is_ok() {
                result = closed;
            }
        }
        self.conn = None;
        result
    }
}

impl Drop for QueryRows<'_> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// A prepared statement. Closed on drop, which also returns its connection
/// to the pool.
pub struct Statement<'a> {
    stmt: Box<dyn Stmt>,
    conn: Option<PooledConn<'a>>,
    closed: bool,
}

impl Statement<'_> {

    pub fn num_input(&self) -> Option<usize> {
        self.stmt.num_input()
    }

    pub async fn exec(&self, ctx: &Context, args: &[Value]) -> Result<Box<dyn ExecResult>> {
        stmt_exec(&*self.stmt, ctx, args).await
    }

    /// Rows borrow the statement, so it stays open while they are read.
    pub async fn query(&self, ctx: &Context, args: &[Value]) -> Result<QueryRows<'_>> {
        let rows = stmt_query(&*self.stmt, ctx, args).await?;
        Ok(QueryRows::new(rows, None))
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let closed = self.stmt.close();
        self.conn = None;
        closed
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// A transaction pinned to one pooled connection. Rolled back on drop
/// unless committed.
pub struct Transaction<'a> {
    conn: PooledConn<'a>,
    tx: Option<Box<dyn Tx>>,
}

impl Transaction<'_> {
    pub async fn query(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> Result<QueryRows<'_>> {
        query_on(self.conn.get(), ctx, query, args).await
    }

    pub async fn exec(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Value],
    ) -> Result<Box<dyn ExecResult>> {
        exec_on(self.conn.get(), ctx, query, args).await
    }

    pub fn commit(mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.commit(),
            None => Ok(()),
        }
    }

    pub fn rollback(mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback(),
            None => Ok(()),
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenRows;

    impl Rows for BrokenRows {
        fn columns(&self) -> Vec<String> {
            vec!["id".to_string()]
        }

        fn next(&mut self, _dest: &mut [Value]) -> Result<bool> {
            Ok(false)
        }

        fn close(&mut self) -> Result<()> {
            Err(Error::driver("rows close failed"))
        }
    }

    struct BrokenStmt;

    impl Stmt for BrokenStmt {
        fn close(&self) -> Result<()> {
            Err(Error::driver("statement close failed"))
        }

        fn num_input(&self) -> Option<usize> {
            None
        }

        fn exec(&self, _args: &[Value]) -> Result<Box<dyn ExecResult>> {
            Err(Error::driver("unused"))
        }

        fn query(&self, _args: &[Value]) -> Result<Box<dyn Rows>> {
            Err(Error::driver("unused"))
        }
    }

    #[test]
    fn test_close_reports_rows_error_first() {
        let mut rows = QueryRows::new(Box::new(BrokenRows), Some(Box::new(BrokenStmt)));
        let err = rows.close().unwrap_err();
        assert_eq!(err.to_string(), "rows close failed");
        assert!(rows.is_closed());
        assert!(rows.close().is_ok());
    }

    #[test]
    fn test_close_reports_statement_error() {
        struct QuietRows;

        impl Rows for QuietRows {
            fn columns(&self) -> Vec<String> {
                Vec::new()
            }

            fn next(&mut self, _dest: &mut [Value]) -> Result<bool> {
                Ok(false)
            }

            fn close(&mut self) -> Result<()> {
                Ok(())
            }
        }

        let mut rows = QueryRows::new(Box::new(QuietRows), Some(Box::new(BrokenStmt)));
        let err = rows.close().unwrap_err();
        assert_eq!(err.to_string(), "statement close failed");
    }

    #[test]
    fn test_registry_rejects_unknown_names() {
        assert!(matches!(
            lookup("database-tests-missing"),
            Err(Error::UnknownDriver(_))
        ));
    }
}

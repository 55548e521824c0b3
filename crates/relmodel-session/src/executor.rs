//! Statement execution and result materialization.
//!
//! An [`Executor`] owns at most one connection, opened on first use, and at
//! most one transaction on it. Dropping an executor with an open
//! transaction rolls the transaction back.

use crate::binding::bind;
use crate::cache::ResultCache;
use relmodel_core::{Connection, ConnectionFactory, Dialect, Error, FromValue, Result, Row, Statement, Value};
use relmodel_query::{Persist, Select};
use relmodel_schema::Model;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

/// Anything that renders to a [`Statement`].
pub trait ToStatement {
    fn to_statement(&self) -> Result<Statement>;

    /// Entity the statement reads, attached to transport errors.
    fn entity(&self) -> Option<&str> {
        None
    }
}

impl ToStatement for Statement {
    fn to_statement(&self) -> Result<Statement> {
        Ok(self.clone())
    }
}

impl ToStatement for Select {
    fn to_statement(&self) -> Result<Statement> {
        self.build()
    }

    fn entity(&self) -> Option<&str> {
        Some(self.entity_name())
    }
}

/// Runs statements on one lazily opened connection.
pub struct Executor {
    model: Arc<Model>,
    dialect: Dialect,
    db_name: String,
    factory: Arc<dyn ConnectionFactory>,
    cache: Arc<ResultCache>,
    conn: Option<Box<dyn Connection>>,
    in_transaction: bool,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("dialect", &self.dialect)
            .field("connected", &self.conn.is_some())
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(model: Arc<Model>, dialect: Dialect, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            model,
            dialect,
            db_name: String::new(),
            factory,
            cache: Arc::new(ResultCache::default()),
            conn: None,
            in_transaction: false,
        }
    }

    /// Share a result cache with other executors.
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Schema name used by [`Executor::next_value`] on MySQL.
    pub fn with_db_name(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = db_name.into();
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    fn connection(&mut self) -> Result<&mut dyn Connection> {
        if self.conn.is_none() {
            let conn = self.factory.open()?;
            if conn.dialect() != self.dialect {
                tracing::warn!(
                    expected = %self.dialect,
                    actual = %conn.dialect(),
                    "Connection dialect differs from model dialect"
                );
            }
            tracing::debug!(dialect = %self.dialect, "Opened connection");
            self.conn = Some(conn);
        }
        match self.conn.as_deref_mut() {
            Some(conn) => Ok(conn),
            None => Err(Error::usage("connection unavailable")),
        }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(Error::usage("transaction already open"));
        }
        tracing::info!("Beginning transaction");
        self.connection()?.begin()?;
        self.in_transaction = true;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(Error::usage("commit without an open transaction"));
        }
        tracing::info!("Committing transaction");
        self.connection()?.commit()?;
        self.in_transaction = false;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(Error::usage("rollback without an open transaction"));
        }
        tracing::warn!("Rolling back transaction");
        self.in_transaction = false;
        self.connection()?.rollback()
    }

    /// Run the whole batch as one command in one transaction.
    #[tracing::instrument(level = "debug", skip(self, persist), fields(statements = persist.len()))]
    pub fn transaction(&mut self, persist: &Persist) -> Result<u64> {
        let stmt = persist.statement()?;
        let entity = persist.entities().first().map(|e| (*e).to_string());
        self.begin()?;
        let affected = match self.execute_bound(stmt, entity.as_deref()) {
            Ok(affected) => affected,
            Err(source) => return Err(self.abort(0, source)),
        };
        if let Err(source) = self.commit() {
            return Err(self.abort(0, source));
        }
        Ok(affected)
    }

    /// Run the batch one statement at a time in one transaction.
    ///
    /// The first failure rolls everything back; nothing is committed.
    #[tracing::instrument(level = "debug", skip(self, persist), fields(statements = persist.len()))]
    pub fn transaction_split(&mut self, persist: &Persist) -> Result<u64> {
        let stmts = persist.statements()?;
        let stmts_len = stmts.len();
        let entities = persist.entities();
        self.begin()?;
        let mut total = 0;
        for (i, stmt) in stmts.into_iter().enumerate() {
            match self.execute_bound(stmt, entities.get(i).copied()) {
                Ok(affected) => total += affected,
                Err(source) => return Err(self.abort(i, source)),
            }
        }
        if let Err(source) = self.commit() {
            return Err(self.abort(stmts_len.saturating_sub(1), source));
        }
        Ok(total)
    }

    fn abort(&mut self, statement: usize, source: Error) -> Error {
        if let Err(e) = self.rollback() {
            tracing::warn!(error = %e, "Rollback failed");
        }
        Error::Transaction {
            statement,
            source: Box::new(source),
        }
    }

    // ========================================================================
    // Execution
    // ========================================================================

    fn execute_bound(&mut self, stmt: Statement, entity: Option<&str>) -> Result<u64> {
        let command = bind(stmt)?;
        tracing::debug!(sql = %command.text, "Executing");
        let result = self.connection()?.execute(&command);
        result.map_err(|e| attach(e, entity))
    }

    /// Run a statement that does not return rows.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn exec(&mut self, query: &impl ToStatement) -> Result<u64> {
        let stmt = query.to_statement()?;
        self.execute_bound(stmt, query.entity())
    }

    /// All rows of a query.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn rows(&mut self, query: &impl ToStatement) -> Result<Vec<Row>> {
        let command = bind(query.to_statement()?)?;
        tracing::debug!(sql = %command.text, "Querying");
        let result = self.connection()?.query(&command);
        let rows = result.map_err(|e| attach(e, query.entity()))?;
        tracing::debug!(rows = rows.len(), "Query returned");
        Ok(rows)
    }

    /// Rows of a select, served from the shared cache when possible.
    pub fn rows_cached(&mut self, select: &Select) -> Result<Arc<Vec<Row>>> {
        let key = select.cache_key()?;
        if let Some(rows) = self.cache.get(&key) {
            tracing::trace!(entity = %select.entity_name(), "Cache hit");
            return Ok(rows);
        }
        let rows = self.rows(select)?;
        Ok(self.cache.insert(key, rows))
    }

    /// Rows deserialized into `T` by column name.
    pub fn objects<T: DeserializeOwned>(&mut self, query: &impl ToStatement) -> Result<Vec<T>> {
        self.rows(query)?
            .iter()
            .map(|row| serde_json::from_value(row.to_json()).map_err(Error::from))
            .collect()
    }

    /// First row, if any.
    pub fn row(&mut self, query: &impl ToStatement) -> Result<Option<Row>> {
        Ok(self.rows(query)?.into_iter().next())
    }

    pub fn object<T: DeserializeOwned>(&mut self, query: &impl ToStatement) -> Result<Option<T>> {
        self.row(query)?
            .map(|row| serde_json::from_value(row.to_json()).map_err(Error::from))
            .transpose()
    }

    /// First column of every row.
    pub fn column<T: FromValue>(&mut self, query: &impl ToStatement) -> Result<Vec<T>> {
        self.column_at(query, 0)
    }

    /// Column `index` of every row.
    pub fn column_at<T: FromValue>(&mut self, query: &impl ToStatement, index: usize) -> Result<Vec<T>> {
        self.rows(query)?
            .iter()
            .map(|row| T::from_value(row.get_index(index).unwrap_or(&Value::Null)))
            .collect()
    }

    /// First column of the first row; `None` when there is no row or the
    /// value is NULL.
    pub fn value<T: FromValue>(&mut self, query: &impl ToStatement) -> Result<Option<T>> {
        match self.row(query)? {
            Some(row) => match row.get_index(0) {
                Some(v) if !v.is_null() => T::from_value(v).map(Some),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    // ========================================================================
    // Symbolic defaults
    // ========================================================================

    /// Next identity value the database will assign in `entity`.
    pub fn next_value(&mut self, entity: &str) -> Result<i64> {
        self.model.entity(entity)?;
        let mut stmt = Statement::new(self.dialect.next_value_sql()).with_named("table", entity);
        if self.dialect == Dialect::MySql {
            stmt = stmt.with_named("db", self.db_name.clone());
        }
        let next = self.value::<i64>(&stmt).map_err(|e| attach(e, Some(entity)))?;
        Ok(next.unwrap_or(1))
    }

    /// Current maximum of `field` in `entity`, 0 for an empty table.
    pub fn max_value(&mut self, entity: &str, field: &str) -> Result<i64> {
        let select = Select::new(Arc::clone(&self.model), self.dialect, entity)?.select_max_value(field);
        Ok(self.value::<i64>(&select)?.unwrap_or(0))
    }
}

fn attach(err: Error, entity: Option<&str>) -> Error {
    match entity {
        Some(name) => err.with_entity(name),
        None => err,
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if !self.in_transaction {
            return;
        }
        tracing::warn!("Executor dropped with an open transaction, rolling back");
        self.in_transaction = false;
        if let Some(conn) = self.conn.as_deref_mut() {
            if let Err(e) = conn.rollback() {
                tracing::warn!(error = %e, "Rollback on drop failed");
            }
        }
    }
}

//! Relational table/view pipe.

use async_trait::async_trait;
use datapipe_core::binding::{Binding, SourceHandle};
use datapipe_core::{AddPipe, Expr, Pipe, PipeError, QueryPipe, Record, RecordStream};
use futures_util::stream::{self, StreamExt};
use tracing::warn;

use super::compiler::{sql_literal, SqlCompiler};
use super::database::Database;

/// A relational table or view exposed as a [`Pipe`].
///
/// Binding is available iff a primary-key column is configured: bound
/// records write `UPDATE`/`DELETE` back through the shared [`Database`].
/// The write-back runs detached on the runtime — `Record::set` stays
/// synchronous and failures are logged, not propagated.
pub struct Table {
    name: String,
    primary_key: Option<String>,
    db: Database,
    compiler: SqlCompiler,
}

impl Table {
    /// A table without binding support.
    #[must_use]
    pub fn new(name: impl Into<String>, db: Database) -> Self {
        Self {
            name: name.into(),
            primary_key: None,
            db,
            compiler: SqlCompiler::new(),
        }
    }

    /// A table whose `primary_key` column enables two-way binding.
    #[must_use]
    pub fn with_primary_key(
        name: impl Into<String>,
        primary_key: impl Into<String>,
        db: Database,
    ) -> Self {
        Self {
            name: name.into(),
            primary_key: Some(primary_key.into()),
            db,
            compiler: SqlCompiler::new(),
        }
    }

    /// Replaces the predicate compiler, e.g. to register vendor-specific
    /// call renderers.
    #[must_use]
    pub fn with_compiler(mut self, compiler: SqlCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    fn bindable(&self) -> bool {
        self.primary_key.is_some()
    }

    fn where_clause(&self, predicate: Option<&Expr>) -> Result<String, PipeError> {
        match predicate {
            None => Ok(String::new()),
            Some(expr) => Ok(format!(" WHERE {}", self.compiler.compile(expr)?)),
        }
    }

    /// Wires a fresh binding onto `record`, keyed by the primary-key value
    /// the record carries.
    fn wire_binding(&self, record: &Record) -> Result<(), PipeError> {
        let key_column = self
            .primary_key
            .clone()
            .ok_or_else(|| PipeError::unsupported("table has no primary key for binding"))?;
        let key = record.get(&key_column)?;
        let binding = Binding::new(SourceHandle::Row {
            table: self.name.clone(),
            key_column: key_column.clone(),
            key: key.clone(),
        });

        let key_literal = sql_literal(&key);
        let db = self.db.clone();
        let table = self.name.clone();
        let pk = key_column.clone();
        let key_lit = key_literal.clone();
        binding.subscribe_update(move |name, value| {
            let sql = format!(
                "UPDATE {table} SET {name} = {} WHERE {pk} = {key_lit}",
                sql_literal(value)
            );
            spawn_write_back(db.clone(), sql);
        });

        let db = self.db.clone();
        let sql = format!(
            "DELETE FROM {} WHERE {key_column} = {key_literal}",
            self.name
        );
        binding.subscribe_delete(move || {
            spawn_write_back(db.clone(), sql.clone());
        });

        record.bind(binding)
    }
}

/// Runs a write-back statement detached from the caller.
fn spawn_write_back(db: Database, sql: String) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = db.execute(&[sql]).await {
                    warn!(error = %e, "relational write-back failed");
                }
            });
        }
        Err(_) => warn!(sql, "no async runtime available for relational write-back"),
    }
}

#[async_trait]
impl QueryPipe for Table {
    fn can_binding(&self) -> bool {
        self.bindable()
    }

    async fn query(
        &self,
        predicate: Option<&Expr>,
        want_binding: bool,
    ) -> Result<RecordStream, PipeError> {
        if want_binding && !self.bindable() {
            return Err(PipeError::unsupported(
                "binding requires a primary-key column",
            ));
        }
        let sql = format!(
            "SELECT * FROM {}{}",
            self.name,
            self.where_clause(predicate)?
        );
        // Fully materialized: the transaction scope ended inside
        // Database::query, before the caller consumes anything.
        let records = self.db.query(&sql).await?;
        if want_binding {
            for record in &records {
                self.wire_binding(record)?;
            }
        }
        Ok(stream::iter(records.into_iter().map(Ok)).boxed())
    }
}

#[async_trait]
impl AddPipe for Table {
    fn can_binding(&self) -> bool {
        self.bindable()
    }

    async fn add(&self, records: Vec<Record>, want_binding: bool) -> Result<(), PipeError> {
        if want_binding && !self.bindable() {
            return Err(PipeError::unsupported(
                "binding requires a primary-key column",
            ));
        }
        let mut statements = Vec::with_capacity(records.len());
        for record in &records {
            let fields = record.fields();
            if fields.is_empty() {
                continue;
            }
            let columns: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
            let values: Vec<String> = fields.iter().map(|(_, v)| sql_literal(v)).collect();
            statements.push(format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.name,
                columns.join(", "),
                values.join(", ")
            ));
        }
        if !statements.is_empty() {
            self.db.execute(&statements).await?;
        }
        if want_binding {
            for record in &records {
                self.wire_binding(record)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Pipe for Table {
    async fn delete(&self, predicate: Option<&Expr>) -> Result<(), PipeError> {
        let sql = format!(
            "DELETE FROM {}{}",
            self.name,
            self.where_clause(predicate)?
        );
        self.db.execute(&[sql]).await?;
        Ok(())
    }
}

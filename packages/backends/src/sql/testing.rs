//! Scripted connection doubles shared by the relational tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::{Connection, ConnectionFactory, Row};

/// Connection that logs every call and replays scripted rows.
pub(crate) struct ScriptedConnection {
    log: Arc<Mutex<Vec<String>>>,
    rows: Vec<Row>,
    fail_on_execute: bool,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn begin(&mut self) -> anyhow::Result<()> {
        self.log.lock().push("BEGIN".into());
        Ok(())
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        self.log.lock().push("COMMIT".into());
        Ok(())
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        self.log.lock().push("ROLLBACK".into());
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> anyhow::Result<Vec<Row>> {
        self.log.lock().push(sql.to_string());
        Ok(self.rows.clone())
    }

    async fn execute(&mut self, sql: &str) -> anyhow::Result<u64> {
        self.log.lock().push(sql.to_string());
        if self.fail_on_execute {
            anyhow::bail!("constraint violation");
        }
        Ok(1)
    }
}

/// Factory producing [`ScriptedConnection`]s sharing one call log.
pub(crate) struct ScriptedFactory {
    pub log: Arc<Mutex<Vec<String>>>,
    pub rows: Vec<Row>,
    pub fail_on_execute: bool,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            rows: Vec::new(),
            fail_on_execute: false,
        }
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::new()
        }
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    async fn connect(&self) -> anyhow::Result<Box<dyn Connection>> {
        Ok(Box::new(ScriptedConnection {
            log: Arc::clone(&self.log),
            rows: self.rows.clone(),
            fail_on_execute: self.fail_on_execute,
        }))
    }
}

//! PostgreSQL implementation of the connection contract, behind the
//! `postgres` feature.
//!
//! Transaction control is issued as plain `BEGIN`/`COMMIT`/`ROLLBACK`
//! statements because [`Connection`] exposes explicit phases rather than a
//! scoped transaction object. Column values are decoded by the reported
//! Postgres type name.

use anyhow::Context;
use async_trait::async_trait;
use datapipe_core::Value;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Connection as _, Row as _, TypeInfo};

use crate::connection::{Connection, ConnectionFactory, Row};

/// Factory producing one [`PgConnection`] per call from a connection URL.
pub struct PgFactory {
    url: String,
}

impl PgFactory {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ConnectionFactory for PgFactory {
    async fn connect(&self) -> anyhow::Result<Box<dyn Connection>> {
        let conn = PgConnection::connect(&self.url)
            .await
            .context("connecting to postgres")?;
        Ok(Box::new(PgBackend { conn }))
    }
}

struct PgBackend {
    conn: PgConnection,
}

fn decode_column(row: &PgRow, ordinal: usize, type_name: &str) -> anyhow::Result<Value> {
    let value = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(ordinal)?
            .map_or(Value::Null, Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(ordinal)?
            .map_or(Value::Null, |v| Value::Int(i64::from(v))),
        "INT4" => row
            .try_get::<Option<i32>, _>(ordinal)?
            .map_or(Value::Null, |v| Value::Int(i64::from(v))),
        "INT8" => row
            .try_get::<Option<i64>, _>(ordinal)?
            .map_or(Value::Null, Value::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(ordinal)?
            .map_or(Value::Null, |v| Value::Float(f64::from(v))),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(ordinal)?
            .map_or(Value::Null, Value::Float),
        _ => row
            .try_get::<Option<String>, _>(ordinal)?
            .map_or(Value::Null, Value::Text),
    };
    Ok(value)
}

#[async_trait]
impl Connection for PgBackend {
    async fn begin(&mut self) -> anyhow::Result<()> {
        sqlx::query("BEGIN").execute(&mut self.conn).await?;
        Ok(())
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        sqlx::query("COMMIT").execute(&mut self.conn).await?;
        Ok(())
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        sqlx::query("ROLLBACK").execute(&mut self.conn).await?;
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> anyhow::Result<Vec<Row>> {
        let rows: Vec<PgRow> = sqlx::query(sql).fetch_all(&mut self.conn).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut fields = Row::with_capacity(row.columns().len());
            for (ordinal, column) in row.columns().iter().enumerate() {
                let value = decode_column(row, ordinal, column.type_info().name())
                    .with_context(|| format!("decoding column {}", column.name()))?;
                fields.push((column.name().to_string(), value));
            }
            out.push(fields);
        }
        Ok(out)
    }

    async fn execute(&mut self, sql: &str) -> anyhow::Result<u64> {
        let done = sqlx::query(sql).execute(&mut self.conn).await?;
        Ok(done.rows_affected())
    }
}

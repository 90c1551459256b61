//! Database access seam and the PostgreSQL implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgColumn, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as _, Executor, Row, Statement as _, TypeInfo};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::error::DbError;
use crate::sql::to_postgres;
use crate::values::SqlValue;

/// Column type classes the reader distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    SmallInt,
    Double,
    Timestamp,
    Text,
}

impl ColumnType {
    /// Classify a driver type name.
    pub fn from_type_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "INT4" | "INT8" | "INTEGER" | "BIGINT" => ColumnType::Integer,
            "INT2" | "SMALLINT" => ColumnType::SmallInt,
            "FLOAT4" | "FLOAT8" | "DOUBLE PRECISION" | "REAL" => ColumnType::Double,
            "TIMESTAMP" | "TIMESTAMPTZ" => ColumnType::Timestamp,
            _ => ColumnType::Text,
        }
    }

    /// Convert a raw value to this column type.
    pub fn coerce(&self, value: SqlValue) -> SqlValue {
        match (self, value) {
            (_, SqlValue::Null) => SqlValue::Null,
            (ColumnType::Integer | ColumnType::SmallInt, SqlValue::Text(s)) => {
                s.trim().parse().map(SqlValue::Integer).unwrap_or(SqlValue::Text(s))
            }
            (ColumnType::Double, SqlValue::Integer(v)) => SqlValue::Double(v as f64),
            (ColumnType::Double, SqlValue::Text(s)) => {
                s.trim().parse().map(SqlValue::Double).unwrap_or(SqlValue::Text(s))
            }
            (ColumnType::Timestamp, SqlValue::Text(s)) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| SqlValue::Timestamp(dt.with_timezone(&Utc)))
                .unwrap_or(SqlValue::Text(s)),
            (ColumnType::Text, SqlValue::Text(s)) => SqlValue::Text(s),
            (ColumnType::Text, other) => SqlValue::Text(other.to_string()),
            (_, other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnMeta {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
        }
    }
}

/// Rows returned by one statement execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRows {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultRows {
    /// Index of the column named `name`, ignoring case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Every value of column `index`, typed by the column metadata.
    pub fn column_values(&self, index: usize) -> Vec<SqlValue> {
        let column_type = self
            .columns
            .get(index)
            .map_or(ColumnType::Text, |c| c.column_type);
        self.rows
            .iter()
            .map(|row| {
                let raw = row.get(index).cloned().unwrap_or(SqlValue::Null);
                column_type.coerce(raw)
            })
            .collect()
    }
}

/// Opens connections to the metadata database.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>, DbError>;
}

/// A live connection. SQL uses `?` bind markers.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Check that `sql` can be prepared.
    async fn prepare(&self, sql: &str) -> Result<(), DbError>;

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<ResultRows, DbError>;
}

/// PostgreSQL connector backed by an sqlx pool.
pub struct PgConnector {
    config: DatabaseConfig,
}

impl PgConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    pub fn shared(config: DatabaseConfig) -> Arc<dyn Connector> {
        Arc::new(Self::new(config))
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .connect(&self.config.url)
            .await?;
        // One round-trip so an unreachable server fails here.
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(Box::new(PgConnection { pool }))
    }
}

struct PgConnection {
    pool: PgPool,
}

#[async_trait]
impl Connection for PgConnection {
    async fn prepare(&self, sql: &str) -> Result<(), DbError> {
        let sql = to_postgres(sql);
        self.pool.prepare(sql.as_str()).await?;
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<ResultRows, DbError> {
        let sql = to_postgres(sql);
        // Column metadata comes from the statement so empty results keep it.
        let statement = self.pool.prepare(sql.as_str()).await?;
        let mut query = sqlx::query(&sql);
        for param in params {
            query = match param {
                SqlValue::Integer(v) => query.bind(*v),
                SqlValue::Double(v) => query.bind(*v),
                SqlValue::Timestamp(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.clone()),
                SqlValue::Null => query.bind(None::<String>),
            };
        }
        let rows = query.fetch_all(&self.pool).await?;
        debug!(sql = %sql, rows = rows.len(), "Query executed");
        Ok(to_result_rows(statement.columns(), &rows))
    }
}

fn to_result_rows(described: &[PgColumn], rows: &[PgRow]) -> ResultRows {
    let columns: Vec<ColumnMeta> = described
        .iter()
        .map(|c| ColumnMeta::new(c.name(), ColumnType::from_type_name(c.type_info().name())))
        .collect();
    let rows = rows
        .iter()
        .map(|row| {
            described
                .iter()
                .enumerate()
                .map(|(i, c)| decode(row, i, c.type_info().name()))
                .collect()
        })
        .collect();
    ResultRows { columns, rows }
}

fn decode(row: &PgRow, index: usize, type_name: &str) -> SqlValue {
    let value = match type_name {
        "INT2" => row.try_get::<Option<i16>, _>(index).map(|v| v.map(|v| SqlValue::Integer(v.into()))),
        "INT4" => row.try_get::<Option<i32>, _>(index).map(|v| v.map(|v| SqlValue::Integer(v.into()))),
        "INT8" => row.try_get::<Option<i64>, _>(index).map(|v| v.map(SqlValue::Integer)),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index).map(|v| v.map(|v| SqlValue::Double(v.into()))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map(|v| v.map(SqlValue::Double)),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .map(|v| v.map(SqlValue::Timestamp)),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .map(|v| v.map(|v| SqlValue::Timestamp(v.and_utc()))),
        _ => row.try_get::<Option<String>, _>(index).map(|v| v.map(SqlValue::Text)),
    };
    match value {
        Ok(Some(v)) => v,
        Ok(None) => SqlValue::Null,
        Err(e) => {
            debug!(column = index, type_name, error = %e, "Undecodable column value");
            SqlValue::Null
        }
    }
}

//! In-memory database double for reader tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use generic_reader::{
    ColumnMeta, ColumnType, Connection, Connector, DatabaseConfig, DbError, QueriesConfig,
    QueryTemplate, ReaderConfig, ResultRows, SqlValue,
};

/// Shared state behind every connection the connector hands out.
#[derive(Default)]
pub struct FakeDatabase {
    responses: Mutex<HashMap<String, ResultRows>>,
    failures: Mutex<VecDeque<DbError>>,
    connect_failures: Mutex<VecDeque<DbError>>,
    prepare_failures: Mutex<HashMap<String, usize>>,
    executed: Mutex<Vec<(String, Vec<SqlValue>)>>,
    connects: AtomicUsize,
}

impl FakeDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `sql` with a single text column.
    pub fn respond_text(&self, sql: &str, column: &str, rows: &[&str]) {
        self.respond(
            sql,
            ResultRows {
                columns: vec![ColumnMeta::new(column, ColumnType::Text)],
                rows: rows.iter().map(|r| vec![SqlValue::text(*r)]).collect(),
            },
        );
    }

    pub fn respond(&self, sql: &str, rows: ResultRows) {
        self.responses.lock().unwrap().insert(sql.to_string(), rows);
    }

    /// Fail the next query with `error`.
    pub fn fail_next_query(&self, error: DbError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Fail the next connection attempt with `error`.
    pub fn fail_next_connect(&self, error: DbError) {
        self.connect_failures.lock().unwrap().push_back(error);
    }

    /// Fail preparing `sql` on the first `connections` connections.
    pub fn fail_prepare(&self, sql: &str, connections: usize) {
        self.prepare_failures
            .lock()
            .unwrap()
            .insert(sql.to_string(), connections);
    }

    pub fn executed(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.executed.lock().unwrap().clone()
    }

    pub fn executed_count(&self, sql: &str) -> usize {
        self.executed().iter().filter(|(s, _)| s == sql).count()
    }

    pub fn clear_executed(&self) {
        self.executed.lock().unwrap().clear();
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

pub struct FakeConnector {
    pub db: Arc<FakeDatabase>,
}

impl FakeConnector {
    pub fn shared(db: &Arc<FakeDatabase>) -> Arc<dyn Connector> {
        Arc::new(Self { db: Arc::clone(db) })
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        let ordinal = self.db.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.db.connect_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(Box::new(FakeConnection {
            db: Arc::clone(&self.db),
            ordinal,
        }))
    }
}

struct FakeConnection {
    db: Arc<FakeDatabase>,
    ordinal: usize,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn prepare(&self, sql: &str) -> Result<(), DbError> {
        if sql.contains("BROKEN") {
            return Err(DbError::new("syntax error").with_sql_state("42601"));
        }
        let failing = self.db.prepare_failures.lock().unwrap().get(sql).copied();
        if failing.is_some_and(|connections| self.ordinal < connections) {
            return Err(DbError::new("relation is being rebuilt").with_sql_state("42P01"));
        }
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<ResultRows, DbError> {
        self.db
            .executed
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        if let Some(error) = self.db.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self
            .db
            .responses
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn template(name: &str, sql: &str, variables: &[&str]) -> QueryTemplate {
    QueryTemplate {
        name: name.to_string(),
        sql: sql.to_string(),
        variables: variables.iter().map(|v| v.to_string()).collect(),
    }
}

pub fn config(queries: QueriesConfig) -> ReaderConfig {
    ReaderConfig {
        database: DatabaseConfig {
            url: "postgres://fake/metadata".to_string(),
            max_connections: 1,
        },
        threaded: false,
        queries,
    }
}

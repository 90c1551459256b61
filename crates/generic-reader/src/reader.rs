//! Configuration-driven metadata reader.
//!
//! At startup the reader connects, runs the static queries, resolves every
//! `${name}` placeholder and prepares the parameterized statements. A request
//! names variables (or whole queries); each backing statement runs once and
//! its columns are collected into [`Values`]. Names answered by a static
//! parameter never reach the database.
//!
//! A failing statement is logged and skipped so the remaining statements can
//! still contribute. A lost connection is the exception: the reader reconnects
//! once and fails the request with a retryable error.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{QueriesConfig, QueryTemplate, ReaderConfig};
use crate::connection::{Connection, Connector, PgConnector, ResultRows};
use crate::error::{DbError, ReaderError, Result};
use crate::sql::{count_bind_parameters, fill_parameters, resolve_placeholders, Resolution};
use crate::values::{SqlValue, Values};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        })
    }
}

/// Step at which a statement failed, for diagnostics.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Connecting,
    Preparing,
    FillingParams,
    Executing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Connecting => "connecting",
            Phase::Preparing => "preparing",
            Phase::FillingParams => "filling_params",
            Phase::Executing => "executing",
        })
    }
}

/// A prepared parameterized query.
#[derive(Debug, Clone)]
struct Statement {
    name: String,
    sql: String,
    variables: Vec<String>,
    bind_count: usize,
}

/// Statements and static parameters produced by one (re)connection.
#[derive(Default)]
struct Compiled {
    main: Option<String>,
    statements: Vec<Statement>,
    var_statements: HashMap<String, usize>,
    query_statements: HashMap<String, usize>,
    static_parameters: BTreeMap<String, String>,
}

/// One connection with its compiled statements. Names found to be unbound
/// are remembered here, so a reconnect forgets them with the statements.
struct Session {
    connection: Arc<dyn Connection>,
    compiled: Compiled,
    unbounded: Mutex<HashSet<String>>,
}

/// How a requested name maps to statement columns.
#[derive(Clone, Copy)]
enum Lookup {
    Variable,
    Query,
}

pub struct GenericReader {
    config: ReaderConfig,
    connector: Arc<dyn Connector>,
    session: RwLock<Arc<Session>>,
    state: Mutex<ConnectionState>,
}

const RECONNECTING_MESSAGE: &str = "The service is trying to reconnect to the database, retry the request";

impl GenericReader {
    /// Connect through `connector` and compile the configured queries.
    pub async fn new(config: ReaderConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let session = establish(&config.queries, connector.as_ref()).await?;
        info!(
            statements = session.compiled.statements.len(),
            static_parameters = session.compiled.static_parameters.len(),
            "Generic reader initialized"
        );
        Ok(Self {
            config,
            connector,
            session: RwLock::new(Arc::new(session)),
            state: Mutex::new(ConnectionState::Connected),
        })
    }

    /// Connect to the PostgreSQL database named in the configuration.
    pub async fn connect(config: ReaderConfig) -> Result<Self> {
        let connector = PgConnector::shared(config.database.clone());
        Self::new(config, connector).await
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn is_thread_enabled(&self) -> bool {
        self.config.threaded
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Static parameters after the static queries ran.
    pub async fn static_parameters(&self) -> BTreeMap<String, String> {
        self.session.read().await.compiled.static_parameters.clone()
    }

    /// Values of the named variables. Each backing statement runs once with
    /// `parameters`; only the requested variables are collected.
    #[instrument(skip(self, parameters), fields(params = parameters.len()))]
    pub async fn load_data(&self, variables: &[&str], parameters: &[SqlValue]) -> Result<Values> {
        self.load(variables, parameters, Lookup::Variable).await
    }

    /// Every declared variable of the named queries.
    #[instrument(skip(self, parameters), fields(params = parameters.len()))]
    pub async fn load_query(&self, queries: &[&str], parameters: &[SqlValue]) -> Result<Values> {
        self.load(queries, parameters, Lookup::Query).await
    }

    /// Identifiers returned by the main query.
    pub async fn all_identifiers(&self) -> Result<Vec<String>> {
        let session = self.active_session().await?;
        let sql = session.compiled.main.clone().ok_or_else(|| {
            ReaderError::Configuration("no main query configured".to_string())
        })?;
        match session.connection.query(&sql, &[]).await {
            Ok(rows) => Ok(rows
                .column_values(0)
                .into_iter()
                .filter(|v| !v.is_null())
                .map(|v| v.to_string())
                .collect()),
            Err(e) if e.is_connection_lost() => Err(self.reconnect(&e).await),
            Err(e) => {
                log_failure(Phase::Executing, "main", &[], &sql, &e);
                Err(ReaderError::Database(e))
            }
        }
    }

    async fn load(&self, names: &[&str], parameters: &[SqlValue], lookup: Lookup) -> Result<Values> {
        let session = self.active_session().await?;
        let compiled = &session.compiled;

        let mut values = Values::new();
        // statement index -> variables to collect
        let mut selected: BTreeMap<usize, BTreeSet<&str>> = BTreeMap::new();

        for &name in names {
            if session.unbounded.lock().await.contains(name) {
                warn!(name, "No statement or static parameter bound to this name");
                continue;
            }
            let statement = match lookup {
                Lookup::Variable => compiled.var_statements.get(name),
                Lookup::Query => compiled.query_statements.get(name),
            };
            if let Some(&index) = statement {
                let columns = selected.entry(index).or_default();
                match lookup {
                    Lookup::Variable => {
                        columns.insert(name);
                    }
                    Lookup::Query => {
                        columns.extend(compiled.statements[index].variables.iter().map(String::as_str));
                    }
                }
            } else if let Some(value) = compiled.static_parameters.get(name) {
                values.add_value(name, SqlValue::Text(value.clone()));
            } else {
                warn!(name, "No statement or static parameter bound to this name");
                session.unbounded.lock().await.insert(name.to_string());
            }
        }

        for (index, columns) in selected {
            let statement = &compiled.statements[index];
            let Some(rows) = self.execute(&session, statement, parameters).await? else {
                continue;
            };
            values.merge(collect_columns(statement, &rows, &columns));
        }
        Ok(values)
    }

    /// Run one statement. `Ok(None)` means it failed and was skipped.
    async fn execute(
        &self,
        session: &Session,
        statement: &Statement,
        parameters: &[SqlValue],
    ) -> Result<Option<ResultRows>> {
        let filled = match fill_parameters(statement.bind_count, parameters) {
            Ok(filled) => filled,
            Err(e) => {
                error!(
                    phase = %Phase::FillingParams,
                    statement = %statement.name,
                    variables = ?statement.variables,
                    sql = %statement.sql,
                    error = %e,
                    "Statement skipped"
                );
                return Ok(None);
            }
        };

        match session.connection.query(&statement.sql, &filled).await {
            Ok(rows) => {
                debug!(statement = %statement.name, rows = rows.rows.len(), "Statement executed");
                Ok(Some(rows))
            }
            Err(e) if e.is_connection_lost() => Err(self.reconnect(&e).await),
            Err(e) => {
                log_failure(Phase::Executing, &statement.name, &statement.variables, &statement.sql, &e);
                Ok(None)
            }
        }
    }

    /// The current session, or a retryable error while the connection is down.
    async fn active_session(&self) -> Result<Arc<Session>> {
        let state = *self.state.lock().await;
        match state {
            ConnectionState::Connected => Ok(Arc::clone(&*self.session.read().await)),
            ConnectionState::Reconnecting => Err(ReaderError::MetadataIo {
                message: RECONNECTING_MESSAGE.to_string(),
                retryable: true,
            }),
            ConnectionState::Failed => {
                if self.try_reconnect().await {
                    Ok(Arc::clone(&*self.session.read().await))
                } else {
                    Err(ReaderError::MetadataIo {
                        message: RECONNECTING_MESSAGE.to_string(),
                        retryable: true,
                    })
                }
            }
        }
    }

    /// Handle a lost connection: reconnect once, then fail the request.
    async fn reconnect(&self, cause: &DbError) -> ReaderError {
        warn!(
            sql_state = ?cause.sql_state,
            vendor_code = ?cause.vendor_code,
            error = %cause,
            "Database connection lost"
        );
        self.try_reconnect().await;
        ReaderError::MetadataIo {
            message: RECONNECTING_MESSAGE.to_string(),
            retryable: true,
        }
    }

    /// Only the caller that moves the state to `Reconnecting` reconnects.
    async fn try_reconnect(&self) -> bool {
        {
            let mut state = self.state.lock().await;
            if *state == ConnectionState::Reconnecting {
                return false;
            }
            *state = ConnectionState::Reconnecting;
        }

        match establish(&self.config.queries, self.connector.as_ref()).await {
            Ok(session) => {
                *self.session.write().await = Arc::new(session);
                *self.state.lock().await = ConnectionState::Connected;
                info!("Reconnected to the metadata database");
                true
            }
            Err(e) => {
                *self.state.lock().await = ConnectionState::Failed;
                error!(error = %e, "Reconnection failed");
                false
            }
        }
    }
}

/// Values of `columns` from `rows`. A column is found by name, else by the
/// variable's position in the statement's declared list. Every requested
/// variable gets a list, empty when the statement returned no rows.
fn collect_columns(statement: &Statement, rows: &ResultRows, columns: &BTreeSet<&str>) -> Values {
    let mut values = Values::new();
    for &variable in columns {
        values.declare(variable);
        let index = rows.column_index(variable).or_else(|| {
            statement
                .variables
                .iter()
                .position(|v| v == variable)
                .filter(|&i| i < rows.columns.len())
        });
        match index {
            Some(index) => {
                for value in rows.column_values(index) {
                    values.add_value(variable, value);
                }
            }
            None => warn!(statement = %statement.name, variable, "Variable has no result column"),
        }
    }
    values
}

fn log_failure(phase: Phase, statement: &str, variables: &[String], sql: &str, e: &DbError) {
    error!(
        phase = %phase,
        statement,
        variables = ?variables,
        sql,
        sql_state = ?e.sql_state,
        vendor_code = ?e.vendor_code,
        error = %e.message,
        "Statement failed"
    );
}

/// Connect and compile every configured query.
async fn establish(queries: &QueriesConfig, connector: &dyn Connector) -> Result<Session> {
    let connection: Arc<dyn Connection> = match connector.connect().await {
        Ok(connection) => Arc::from(connection),
        Err(e) => {
            log_failure(Phase::Connecting, "-", &[], "-", &e);
            return Err(ReaderError::Database(e));
        }
    };
    let compiled = compile(queries, connection.as_ref()).await?;
    Ok(Session {
        connection,
        compiled,
        unbounded: Mutex::new(HashSet::new()),
    })
}

async fn compile(queries: &QueriesConfig, connection: &dyn Connection) -> Result<Compiled> {
    let mut compiled = Compiled {
        static_parameters: queries.parameters.clone(),
        ..Default::default()
    };

    run_static_queries(&queries.statics, connection, &mut compiled.static_parameters).await?;

    if let Some(main) = &queries.main {
        compiled.main = Some(resolve_template(main, &compiled.static_parameters)?);
    }

    for template in &queries.queries {
        let sql = resolve_template(template, &compiled.static_parameters)?;
        if let Err(e) = connection.prepare(&sql).await {
            if e.is_connection_lost() {
                return Err(ReaderError::Database(e));
            }
            log_failure(Phase::Preparing, &template.name, &template.variables, &sql, &e);
            continue;
        }

        let index = compiled.statements.len();
        compiled.statements.push(Statement {
            name: template.name.clone(),
            bind_count: count_bind_parameters(&sql),
            sql,
            variables: template.variables.clone(),
        });
        compiled.query_statements.insert(template.name.clone(), index);
        for variable in &template.variables {
            if let Some(previous) = compiled.var_statements.insert(variable.clone(), index) {
                if previous != index {
                    warn!(
                        variable = %variable,
                        previous = %compiled.statements[previous].name,
                        statement = %template.name,
                        "Variable bound by several queries, keeping the last"
                    );
                }
            }
        }
    }
    Ok(compiled)
}

/// Run the static queries, folding each single-column result into the
/// parameters as a comma-joined list. Queries depending on another static
/// query's result get a second pass.
async fn run_static_queries(
    statics: &[QueryTemplate],
    connection: &dyn Connection,
    parameters: &mut BTreeMap<String, String>,
) -> Result<()> {
    let mut pending: Vec<&QueryTemplate> = statics.iter().collect();
    for pass in 0..2 {
        let mut deferred = Vec::new();
        for template in pending {
            let sql = match resolve_placeholders(&template.sql, parameters)? {
                Resolution::Resolved(sql) => sql,
                Resolution::Missing(_) if pass == 0 => {
                    deferred.push(template);
                    continue;
                }
                Resolution::Missing(name) => {
                    return Err(ReaderError::Configuration(format!(
                        "static query '{}' references unknown parameter '{}'",
                        template.name, name
                    )))
                }
            };
            if count_bind_parameters(&sql) > 0 {
                return Err(ReaderError::Configuration(format!(
                    "static query '{}' must not take bind parameters",
                    template.name
                )));
            }

            match connection.query(&sql, &[]).await {
                Ok(rows) => {
                    let joined = rows
                        .column_values(0)
                        .iter()
                        .filter(|v| !v.is_null())
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(",");
                    debug!(name = %template.name, value = %joined, "Static parameter computed");
                    parameters.insert(template.name.clone(), joined);
                }
                Err(e) if e.is_connection_lost() => return Err(ReaderError::Database(e)),
                Err(e) => log_failure(Phase::Executing, &template.name, &[], &sql, &e),
            }
        }
        pending = deferred;
    }
    Ok(())
}

fn resolve_template(template: &QueryTemplate, parameters: &BTreeMap<String, String>) -> Result<String> {
    match resolve_placeholders(&template.sql, parameters)? {
        Resolution::Resolved(sql) => Ok(sql),
        Resolution::Missing(name) => Err(ReaderError::Configuration(format!(
            "query '{}' references unknown static parameter '{}'",
            template.name, name
        ))),
    }
}

//! Data-source access: introspection and read-only execution
//!
//! The engine consumes the source database through two traits so the
//! driver stays a collaborator behind a seam:
//! - [`SchemaIntrospector`]: connectivity check, table/column/constraint
//!   enumeration, bounded row sampling
//! - [`SqlExecutor`]: read-only statement execution with row limit and
//!   timeout
//!
//! `PgIntrospector`/`PgExecutor` implement both over a shared sqlx pool;
//! [`MemoryBackend`] serves a fixed schema for tests and the `memory://`
//! development scheme.

use crate::schema::Column;
use async_trait::async_trait;
use querybridge_common::config::{DatabaseConfig, DiscoveryConfig};
use querybridge_common::errors::{AppError, Result};
use querybridge_common::types::{ConnectionId, JsonMap};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as _, Row, TypeInfo};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// A declared foreign-key constraint
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// Read-only schema enumeration against a data source
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Validate connectivity. Failure here is a hard `Connectivity` error.
    async fn ping(&self) -> Result<()>;

    /// Enumerate table names in discovery order
    async fn table_names(&self) -> Result<Vec<String>>;

    /// Columns of one table, in declaration order
    async fn columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Declared foreign keys of one table
    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;

    /// A bounded, read-only row sample
    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<JsonMap>>;
}

/// Read-only SQL execution with a row cap
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute_read(&self, sql: &str, max_rows: usize) -> Result<Vec<JsonMap>>;
}

/// Bound a database future by a deadline; elapsed deadlines surface as
/// recoverable `Timeout` errors.
async fn bounded<T, F>(operation: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AppError::Database {
            message: format!("{}: {}", operation, e),
        }),
        Err(_) => Err(AppError::Timeout {
            operation: operation.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Quote a Postgres identifier
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Postgres-backed introspector
pub struct PgIntrospector {
    pool: PgPool,
    timeout: Duration,
}

impl PgIntrospector {
    /// Connect to the source and validate reachability. Connection or
    /// authentication failures map to `Connectivity`.
    pub async fn connect(
        connection: &ConnectionId,
        db_config: &DatabaseConfig,
        discovery_config: &DiscoveryConfig,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(db_config.max_connections)
            .acquire_timeout(Duration::from_secs(db_config.connect_timeout_secs))
            .connect(connection.as_str())
            .await
            .map_err(|e| AppError::Connectivity {
                message: format!("cannot reach {}: {}", connection, e),
            })?;

        Ok(Self {
            pool,
            timeout: Duration::from_secs(discovery_config.introspection_timeout_secs),
        })
    }

    /// Reuse an existing pool (the executor shares it)
    pub fn from_pool(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SchemaIntrospector for PgIntrospector {
    async fn ping(&self) -> Result<()> {
        match tokio::time::timeout(self.timeout, sqlx::query("SELECT 1").execute(&self.pool)).await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AppError::Connectivity {
                message: format!("connectivity check failed: {}", e),
            }),
            Err(_) => Err(AppError::Connectivity {
                message: format!(
                    "connectivity check timed out after {}ms",
                    self.timeout.as_millis()
                ),
            }),
        }
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let rows = bounded(
            "table enumeration",
            self.timeout,
            sqlx::query(
                r#"
                SELECT table_name
                FROM information_schema.tables
                WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
                ORDER BY table_name
                "#,
            )
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("table_name")
                    .map_err(|e| AppError::Database {
                        message: format!("table enumeration: {}", e),
                    })
            })
            .collect()
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let rows = bounded(
            "column introspection",
            self.timeout,
            sqlx::query(
                r#"
                SELECT column_name, data_type
                FROM information_schema.columns
                WHERE table_schema = 'public' AND table_name = $1
                ORDER BY ordinal_position
                "#,
            )
            .bind(table)
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("column_name").map_err(|e| AppError::Database {
                    message: format!("column introspection: {}", e),
                })?;
                let declared: String = row.try_get("data_type").map_err(|e| AppError::Database {
                    message: format!("column introspection: {}", e),
                })?;
                Ok(Column::new(name, declared))
            })
            .collect()
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows = bounded(
            "constraint introspection",
            self.timeout,
            sqlx::query(
                r#"
                SELECT
                    kcu.column_name,
                    ccu.table_name AS referenced_table,
                    ccu.column_name AS referenced_column
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                  ON tc.constraint_name = kcu.constraint_name
                 AND tc.table_schema = kcu.table_schema
                JOIN information_schema.constraint_column_usage ccu
                  ON tc.constraint_name = ccu.constraint_name
                 AND tc.table_schema = ccu.table_schema
                WHERE tc.constraint_type = 'FOREIGN KEY'
                  AND tc.table_schema = 'public'
                  AND tc.table_name = $1
                "#,
            )
            .bind(table)
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ForeignKey {
                    column: row.try_get("column_name").map_err(db_err)?,
                    referenced_table: row.try_get("referenced_table").map_err(db_err)?,
                    referenced_column: row.try_get("referenced_column").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<JsonMap>> {
        let sql = format!("SELECT * FROM {} LIMIT {}", quote_ident(table), limit);
        let rows = bounded("row sampling", self.timeout, sqlx::query(&sql).fetch_all(&self.pool))
            .await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::Database {
        message: e.to_string(),
    }
}

/// Postgres-backed read-only executor
pub struct PgExecutor {
    pool: PgPool,
    timeout: Duration,
}

impl PgExecutor {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute_read(&self, sql: &str, max_rows: usize) -> Result<Vec<JsonMap>> {
        debug!(rows_cap = max_rows, "Executing read statement");
        let rows = bounded("sql execution", self.timeout, sqlx::query(sql).fetch_all(&self.pool))
            .await?;
        Ok(rows.iter().take(max_rows).map(row_to_json).collect())
    }
}

/// Decode a dynamically-typed row into a JSON object. Values the decoder
/// does not recognize fall back to their string form, then to null.
fn row_to_json(row: &PgRow) -> JsonMap {
    use serde_json::Value;

    let mut map = JsonMap::new();
    for (i, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name().to_uppercase();
        let value = match type_name.as_str() {
            "BOOL" => row
                .try_get::<Option<bool>, _>(i)
                .map(|v| v.map(Value::Bool))
                .unwrap_or(None),
            "INT2" => row
                .try_get::<Option<i16>, _>(i)
                .map(|v| v.map(|n| Value::from(n as i64)))
                .unwrap_or(None),
            "INT4" => row
                .try_get::<Option<i32>, _>(i)
                .map(|v| v.map(|n| Value::from(n as i64)))
                .unwrap_or(None),
            "INT8" => row
                .try_get::<Option<i64>, _>(i)
                .map(|v| v.map(Value::from))
                .unwrap_or(None),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(i)
                .map(|v| v.and_then(|n| serde_json::Number::from_f64(n as f64).map(Value::Number)))
                .unwrap_or(None),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(i)
                .map(|v| v.and_then(|n| serde_json::Number::from_f64(n).map(Value::Number)))
                .unwrap_or(None),
            "NUMERIC" => row
                .try_get::<Option<sqlx::types::Decimal>, _>(i)
                .map(|v| {
                    v.map(|d| {
                        d.to_string()
                            .parse::<f64>()
                            .ok()
                            .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
                            .unwrap_or_else(|| Value::String(d.to_string()))
                    })
                })
                .unwrap_or(None),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(i)
                .map(|v| v.map(|u| Value::String(u.to_string())))
                .unwrap_or(None),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(i)
                .map(|v| v.map(|d| Value::String(d.to_string())))
                .unwrap_or(None),
            "TIME" => row
                .try_get::<Option<chrono::NaiveTime>, _>(i)
                .map(|v| v.map(|t| Value::String(t.to_string())))
                .unwrap_or(None),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(i)
                .map(|v| v.map(|t| Value::String(t.to_string())))
                .unwrap_or(None),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
                .map(|v| v.map(|t| Value::String(t.to_rfc3339())))
                .unwrap_or(None),
            "JSON" | "JSONB" => row
                .try_get::<Option<serde_json::Value>, _>(i)
                .unwrap_or(None),
            _ => row
                .try_get::<Option<String>, _>(i)
                .map(|v| v.map(Value::String))
                .unwrap_or(None),
        };
        map.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    map
}

struct MemoryTable {
    name: String,
    columns: Vec<Column>,
    rows: Vec<JsonMap>,
    foreign_keys: Vec<ForeignKey>,
}

/// In-memory data source serving a fixed schema.
///
/// Backs the `memory://` scheme and the test suite. SQL execution returns
/// canned results registered by statement fragment; unmatched statements
/// return no rows.
pub struct MemoryBackend {
    tables: Vec<MemoryTable>,
    failing_tables: Vec<String>,
    canned: Mutex<Vec<(String, Vec<JsonMap>)>>,
}

impl MemoryBackend {
    pub fn empty() -> Self {
        Self {
            tables: Vec::new(),
            failing_tables: Vec::new(),
            canned: Mutex::new(Vec::new()),
        }
    }

    /// The HR fixture: `departments(id, name)` and
    /// `employees(id, first_name, last_name, salary, department_id)` with
    /// a declared foreign key and a small row sample.
    pub fn hr_fixture() -> Self {
        let mut backend = Self::empty();

        backend.add_table(
            "departments",
            &[("id", "integer"), ("name", "text")],
            vec![
                json_row(&[("id", serde_json::json!(1)), ("name", serde_json::json!("Engineering"))]),
                json_row(&[("id", serde_json::json!(2)), ("name", serde_json::json!("Sales"))]),
            ],
            vec![],
        );

        backend.add_table(
            "employees",
            &[
                ("id", "integer"),
                ("first_name", "text"),
                ("last_name", "text"),
                ("salary", "numeric"),
                ("department_id", "integer"),
            ],
            vec![
                json_row(&[
                    ("id", serde_json::json!(1)),
                    ("first_name", serde_json::json!("Ada")),
                    ("last_name", serde_json::json!("Lovelace")),
                    ("salary", serde_json::json!(120000)),
                    ("department_id", serde_json::json!(1)),
                ]),
                json_row(&[
                    ("id", serde_json::json!(2)),
                    ("first_name", serde_json::json!("Grace")),
                    ("last_name", serde_json::json!("Hopper")),
                    ("salary", serde_json::json!(125000)),
                    ("department_id", serde_json::json!(1)),
                ]),
                json_row(&[
                    ("id", serde_json::json!(3)),
                    ("first_name", serde_json::json!("Jean")),
                    ("last_name", serde_json::json!("Bartik")),
                    ("salary", serde_json::json!(95000)),
                    ("department_id", serde_json::json!(2)),
                ]),
            ],
            vec![ForeignKey {
                column: "department_id".to_string(),
                referenced_table: "departments".to_string(),
                referenced_column: "id".to_string(),
            }],
        );

        backend
    }

    /// Add a table to the fixture
    pub fn add_table(
        &mut self,
        name: &str,
        columns: &[(&str, &str)],
        rows: Vec<JsonMap>,
        foreign_keys: Vec<ForeignKey>,
    ) {
        self.tables.push(MemoryTable {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(n, t)| Column::new(*n, *t))
                .collect(),
            rows,
            foreign_keys,
        });
    }

    /// Make one table's column introspection fail (partial-failure tests)
    pub fn with_failing_table(mut self, name: &str) -> Self {
        self.failing_tables.push(name.to_string());
        self
    }

    /// Register a canned result served for statements containing `fragment`
    /// (case-insensitive)
    pub fn register_result(&self, fragment: &str, rows: Vec<JsonMap>) {
        self.canned
            .lock()
            .expect("canned results lock")
            .push((fragment.to_lowercase(), rows));
    }

    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| AppError::Database {
                message: format!("unknown table {}", name),
            })
    }
}

/// Build a JSON row from (column, value) pairs
pub fn json_row(pairs: &[(&str, serde_json::Value)]) -> JsonMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[async_trait]
impl SchemaIntrospector for MemoryBackend {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        if self.failing_tables.iter().any(|t| t == table) {
            return Err(AppError::Database {
                message: format!("simulated introspection failure for {}", table),
            });
        }
        Ok(self.table(table)?.columns.clone())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        Ok(self.table(table)?.foreign_keys.clone())
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<JsonMap>> {
        Ok(self.table(table)?.rows.iter().take(limit).cloned().collect())
    }
}

#[async_trait]
impl SqlExecutor for MemoryBackend {
    async fn execute_read(&self, sql: &str, max_rows: usize) -> Result<Vec<JsonMap>> {
        let lowered = sql.to_lowercase();
        let canned = self.canned.lock().expect("canned results lock");
        for (fragment, rows) in canned.iter() {
            if lowered.contains(fragment) {
                return Ok(rows.iter().take(max_rows).cloned().collect());
            }
        }
        Ok(Vec::new())
    }
}

/// Open introspection + execution handles for a connection string.
///
/// `postgres://`/`postgresql://` schemes get sqlx-backed handles sharing
/// one pool; `memory://` serves the HR fixture for development.
pub async fn connect_source(
    connection: &ConnectionId,
    db_config: &DatabaseConfig,
    discovery_config: &DiscoveryConfig,
) -> Result<(Arc<dyn SchemaIntrospector>, Arc<dyn SqlExecutor>)> {
    match connection.scheme() {
        "postgres" | "postgresql" => {
            let introspector =
                PgIntrospector::connect(connection, db_config, discovery_config).await?;
            let executor = PgExecutor::new(
                introspector.pool().clone(),
                Duration::from_secs(db_config.statement_timeout_secs),
            );
            Ok((Arc::new(introspector), Arc::new(executor)))
        }
        "memory" => {
            let backend = Arc::new(MemoryBackend::hr_fixture());
            Ok((backend.clone(), backend))
        }
        other => Err(AppError::Validation {
            message: format!("unsupported connection scheme: {}", other),
            field: Some("connection_string".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("employees"), "\"employees\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[tokio::test]
    async fn test_memory_backend_enumeration() {
        let backend = MemoryBackend::hr_fixture();
        let names = backend.table_names().await.unwrap();
        assert_eq!(names, vec!["departments", "employees"]);

        let columns = backend.columns("employees").await.unwrap();
        assert_eq!(columns.len(), 5);
        assert_eq!(columns[3].name, "salary");
    }

    #[tokio::test]
    async fn test_memory_backend_sample_limit() {
        let backend = MemoryBackend::hr_fixture();
        let rows = backend.sample_rows("employees", 2).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_memory_backend_canned_results() {
        let backend = MemoryBackend::hr_fixture();
        backend.register_result(
            "avg(salary)",
            vec![json_row(&[
                ("name", serde_json::json!("Engineering")),
                ("average_salary", serde_json::json!(122500.0)),
            ])],
        );

        let rows = backend
            .execute_read("SELECT name, AVG(salary) AS average_salary FROM employees", 100)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let empty = backend.execute_read("SELECT 1", 100).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_memory_backend_failing_table() {
        let backend = MemoryBackend::hr_fixture().with_failing_table("employees");
        assert!(backend.columns("employees").await.is_err());
        assert!(backend.columns("departments").await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_source_rejects_unknown_scheme() {
        let connection = ConnectionId::from_connection_string("mysql://localhost/db").unwrap();
        let result = connect_source(
            &connection,
            &querybridge_common::config::AppConfig::default().database,
            &querybridge_common::config::AppConfig::default().discovery,
        )
        .await;
        assert!(result.is_err());
    }
}

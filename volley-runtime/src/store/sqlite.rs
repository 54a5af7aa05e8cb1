use super::{from_unix_millis, now_millis, unix_millis, RunStore, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
#[allow(unused)]
use tracing::{debug, error, info, warn};
use volley_core::{RunId, RunRecord, RunResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    run_id       TEXT PRIMARY KEY NOT NULL,
    url          TEXT NOT NULL,
    requests     INTEGER NOT NULL,
    concurrency  INTEGER NOT NULL,
    outcomes     TEXT NOT NULL,
    stats        TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    created_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS runs_created_at ON runs (created_at);
";

const COLUMNS: &str =
    "run_id, url, requests, concurrency, outcomes, stats, completed_at, created_at";

/// SQLite-backed store with one row per run. Outcomes and stats are stored as JSON text and
/// `created_at` as unix milliseconds.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and ensures the schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        info!("Connecting to database: {url}");

        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let mut pool = SqlitePoolOptions::new();
        if url.contains(":memory:") {
            // NOTE: Every connection to `:memory:` is its own database, so the pool must hold
            // exactly one connection forever.
            pool = pool
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }
        let pool = pool.connect_with(options).await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        debug!("Database schema ready");

        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn select(
        &self,
        sql: &str,
        bounds: Option<(i64, i64)>,
    ) -> Result<Vec<RunRecord>, StoreError> {
        let mut query = sqlx::query(sql);
        if let Some((start, end)) = bounds {
            query = query.bind(start).bind(end);
        }

        query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(record_from_row)
            .collect()
    }
}

impl RunStore for SqliteStore {
    async fn upsert(&self, result: RunResult) -> Result<RunRecord, StoreError> {
        let outcomes = serde_json::to_string(&result.outcomes)?;
        let stats = serde_json::to_string(&result.stats)?;
        let completed_at = result
            .completed_at
            .format(&Rfc3339)
            .map_err(|err| StoreError::Timestamp(err.to_string()))?;

        // NOTE: `created_at` is never updated, so redeliveries keep the first one.
        let row = sqlx::query(
            "INSERT INTO runs (run_id, url, requests, concurrency, outcomes, stats, completed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(run_id) DO UPDATE SET
                url = excluded.url,
                requests = excluded.requests,
                concurrency = excluded.concurrency,
                outcomes = excluded.outcomes,
                stats = excluded.stats,
                completed_at = excluded.completed_at
             RETURNING created_at",
        )
        .bind(result.run_id.as_str())
        .bind(&result.target_url)
        .bind(result.num_requests as i64)
        .bind(result.concurrency as i64)
        .bind(outcomes)
        .bind(stats)
        .bind(completed_at)
        .bind(unix_millis(now_millis()?))
        .fetch_one(&self.pool)
        .await?;

        let created_at = from_unix_millis(row.try_get("created_at")?)?;
        Ok(RunRecord { result, created_at })
    }

    async fn get(&self, run_id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM runs WHERE run_id = ?1");
        sqlx::query(&sql)
            .bind(run_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(record_from_row)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<RunRecord>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM runs ORDER BY created_at, run_id");
        self.select(&sql, None).await
    }

    async fn created_between(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<RunRecord>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM runs WHERE created_at BETWEEN ?1 AND ?2 ORDER BY created_at, run_id"
        );
        self.select(&sql, Some((unix_millis(start), unix_millis(end))))
            .await
    }
}

fn record_from_row(row: &SqliteRow) -> Result<RunRecord, StoreError> {
    let outcomes: String = row.try_get("outcomes")?;
    let stats: String = row.try_get("stats")?;
    let completed_at: String = row.try_get("completed_at")?;
    let requests: i64 = row.try_get("requests")?;
    let concurrency: i64 = row.try_get("concurrency")?;

    let result = RunResult {
        run_id: RunId::new(row.try_get::<String, _>("run_id")?),
        target_url: row.try_get("url")?,
        num_requests: requests as u64,
        concurrency: concurrency as usize,
        outcomes: serde_json::from_str(&outcomes)?,
        stats: serde_json::from_str(&stats)?,
        completed_at: OffsetDateTime::parse(&completed_at, &Rfc3339)
            .map_err(|err| StoreError::Timestamp(err.to_string()))?,
    };

    Ok(RunRecord {
        result,
        created_at: from_unix_millis(row.try_get("created_at")?)?,
    })
}

// src/database.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::{EvalError, Result};
use crate::models::{EvaluationResult, EvaluationRun, RunUpdate, Score, TestCase, TestCaseUpdate};
use crate::repository::Repository;

/// Opens (creating if needed) the SQLite file at `db_path` and runs migrations.
pub async fn init_db(db_path: &Path) -> Result<SqlitePool> {
    // Create parent directory BEFORE attempting to connect
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let absolute_path = if db_path.is_relative() {
        std::env::current_dir()?.join(db_path)
    } else {
        db_path.to_path_buf()
    };

    let db_url = format!("sqlite://{}?mode=rwc", absolute_path.display());
    log::info!("Connecting to database at {}", absolute_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    log::info!("Database migrations completed");

    Ok(pool)
}

/// Resolves a `sqlite:<path>` URL to a file path.
pub fn db_path_from_url(db_url: &str) -> Result<PathBuf> {
    let path = db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"))
        .ok_or_else(|| EvalError::Config("DATABASE_URL must start with 'sqlite:'".to_string()))?;
    if path.is_empty() {
        return Err(EvalError::Config("DATABASE_URL has an empty path".to_string()));
    }
    Ok(PathBuf::from(path))
}

/// Default database location under the user's local data directory.
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agent-eval")
        .join("evals.db")
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| EvalError::Validation(format!("invalid stored timestamp '{}': {}", value, e)))
}

fn parse_opt_time(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_time).transpose()
}

fn test_case_from_row(row: &SqliteRow) -> Result<TestCase> {
    let tags: String = row.try_get("tags")?;
    Ok(TestCase {
        id: row.try_get("id")?,
        input: row.try_get("input")?,
        expected_output: row.try_get("expected_output")?,
        description: row.try_get("description")?,
        tags: serde_json::from_str(&tags)?,
        created_at: parse_time(&row.try_get::<String, _>("created_at")?)?,
        modified_at: parse_time(&row.try_get::<String, _>("modified_at")?)?,
    })
}

fn run_from_row(row: &SqliteRow) -> Result<EvaluationRun> {
    let test_case_ids: String = row.try_get("test_case_ids")?;
    let grader_ids: String = row.try_get("grader_ids")?;
    let status: String = row.try_get("status")?;
    let result_count: i64 = row.try_get("result_count")?;
    Ok(EvaluationRun {
        id: row.try_get("id")?,
        test_case_ids: serde_json::from_str(&test_case_ids)?,
        agent_endpoint_url: row.try_get("agent_endpoint_url")?,
        grader_ids: serde_json::from_str(&grader_ids)?,
        status: status.parse()?,
        created_at: parse_time(&row.try_get::<String, _>("created_at")?)?,
        started_at: parse_opt_time(row.try_get("started_at")?)?,
        completed_at: parse_opt_time(row.try_get("completed_at")?)?,
        result_count: u32::try_from(result_count).unwrap_or(0),
        error_message: row.try_get("error_message")?,
    })
}

fn result_from_row(row: &SqliteRow) -> Result<EvaluationResult> {
    let status: String = row.try_get("response_status")?;
    let latency: Option<i64> = row.try_get("response_latency_ms")?;
    Ok(EvaluationResult {
        id: row.try_get("id")?,
        run_id: row.try_get("run_id")?,
        test_case_id: row.try_get("test_case_id")?,
        agent_response: row.try_get("agent_response")?,
        response_latency_ms: latency.map(|ms| ms.max(0) as u64),
        response_status: status.parse()?,
        error_message: row.try_get("error_message")?,
        created_at: parse_time(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn score_from_row(row: &SqliteRow) -> Result<Score> {
    let details: Option<String> = row.try_get("details")?;
    let passed: i64 = row.try_get("passed")?;
    Ok(Score {
        id: row.try_get("id")?,
        result_id: row.try_get("result_id")?,
        grader_id: row.try_get("grader_id")?,
        passed: passed != 0,
        score: row.try_get("score")?,
        details: details.as_deref().map(serde_json::from_str).transpose()?,
        created_at: parse_time(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn page_bounds(skip: usize, limit: usize) -> (i64, i64) {
    (
        i64::try_from(limit).unwrap_or(i64::MAX),
        i64::try_from(skip).unwrap_or(i64::MAX),
    )
}

/// Repository backed by a SQLite pool.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(db_path: &Path) -> Result<Self> {
        Ok(Self::new(init_db(db_path).await?))
    }

    /// A private in-memory database. One connection, so every query sees the
    /// same data.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn create_test_case(&self, test_case: &TestCase) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO test_cases (id, input, expected_output, description, tags, created_at, modified_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&test_case.id)
        .bind(&test_case.input)
        .bind(&test_case.expected_output)
        .bind(&test_case.description)
        .bind(serde_json::to_string(&test_case.tags)?)
        .bind(test_case.created_at.to_rfc3339())
        .bind(test_case.modified_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_test_case(&self, id: &str) -> Result<Option<TestCase>> {
        sqlx::query("SELECT * FROM test_cases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(test_case_from_row)
            .transpose()
    }

    async fn list_test_cases(&self, skip: usize, limit: usize) -> Result<Vec<TestCase>> {
        let (limit, offset) = page_bounds(skip, limit);
        sqlx::query("SELECT * FROM test_cases ORDER BY seq LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(test_case_from_row)
            .collect()
    }

    async fn update_test_case(&self, id: &str, update: TestCaseUpdate) -> Result<Option<TestCase>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM test_cases WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut test_case = test_case_from_row(&row)?;
        update.apply(&mut test_case);

        sqlx::query(
            r#"
            UPDATE test_cases
            SET input = ?, expected_output = ?, description = ?, tags = ?, modified_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&test_case.input)
        .bind(&test_case.expected_output)
        .bind(&test_case.description)
        .bind(serde_json::to_string(&test_case.tags)?)
        .bind(test_case.modified_at.to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(test_case))
    }

    async fn delete_test_case(&self, id: &str) -> Result<bool> {
        let done = sqlx::query("DELETE FROM test_cases WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn create_run(&self, run: &EvaluationRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO evaluation_runs (id, test_case_ids, agent_endpoint_url, grader_ids, status, created_at, started_at, completed_at, result_count, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(serde_json::to_string(&run.test_case_ids)?)
        .bind(&run.agent_endpoint_url)
        .bind(serde_json::to_string(&run.grader_ids)?)
        .bind(run.status.as_str())
        .bind(run.created_at.to_rfc3339())
        .bind(run.started_at.map(|t| t.to_rfc3339()))
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .bind(i64::from(run.result_count))
        .bind(&run.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Option<EvaluationRun>> {
        sqlx::query("SELECT * FROM evaluation_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(run_from_row)
            .transpose()
    }

    async fn list_runs(&self, skip: usize, limit: usize) -> Result<Vec<EvaluationRun>> {
        let (limit, offset) = page_bounds(skip, limit);
        sqlx::query("SELECT * FROM evaluation_runs ORDER BY seq LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(run_from_row)
            .collect()
    }

    async fn update_run(&self, id: &str, update: RunUpdate) -> Result<EvaluationRun> {
        let done = sqlx::query(
            r#"
            UPDATE evaluation_runs
            SET status = COALESCE(?, status),
                started_at = COALESCE(?, started_at),
                completed_at = COALESCE(?, completed_at),
                result_count = COALESCE(?, result_count),
                error_message = COALESCE(?, error_message)
            WHERE id = ?
            "#,
        )
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.started_at.map(|t| t.to_rfc3339()))
        .bind(update.completed_at.map(|t| t.to_rfc3339()))
        .bind(update.result_count.map(i64::from))
        .bind(update.error_message)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            return Err(EvalError::not_found("EvaluationRun", id));
        }
        self.get_run(id)
            .await?
            .ok_or_else(|| EvalError::not_found("EvaluationRun", id))
    }

    async fn begin_run(&self, id: &str, started_at: DateTime<Utc>) -> Result<bool> {
        let done = sqlx::query(
            "UPDATE evaluation_runs SET status = 'running', started_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(started_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 1 {
            return Ok(true);
        }
        match self.get_run(id).await? {
            Some(_) => Ok(false),
            None => Err(EvalError::not_found("EvaluationRun", id)),
        }
    }

    async fn create_result(&self, result: &EvaluationResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO evaluation_results (id, run_id, test_case_id, agent_response, response_latency_ms, response_status, error_message, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&result.id)
        .bind(&result.run_id)
        .bind(&result.test_case_id)
        .bind(&result.agent_response)
        .bind(result.response_latency_ms.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)))
        .bind(result.response_status.as_str())
        .bind(&result.error_message)
        .bind(result.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_results(&self, run_id: &str) -> Result<Vec<EvaluationResult>> {
        sqlx::query("SELECT * FROM evaluation_results WHERE run_id = ? ORDER BY seq")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(result_from_row)
            .collect()
    }

    async fn upsert_score(&self, score: &Score) -> Result<()> {
        let details = score.details.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO scores (id, result_id, grader_id, passed, score, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(result_id, grader_id) DO UPDATE SET
                id = excluded.id,
                passed = excluded.passed,
                score = excluded.score,
                details = excluded.details,
                created_at = excluded.created_at
            "#,
        )
        .bind(&score.id)
        .bind(&score.result_id)
        .bind(&score.grader_id)
        .bind(score.passed)
        .bind(score.score)
        .bind(details)
        .bind(score.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_scores(&self, result_id: &str) -> Result<Vec<Score>> {
        sqlx::query("SELECT * FROM scores WHERE result_id = ? ORDER BY seq")
            .bind(result_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(score_from_row)
            .collect()
    }

    async fn list_all_scores(&self, run_id: &str) -> Result<Vec<Score>> {
        sqlx::query(
            r#"
            SELECT s.* FROM scores s
            JOIN evaluation_results r ON s.result_id = r.id
            WHERE r.run_id = ?
            ORDER BY s.seq
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(score_from_row)
        .collect()
    }
}

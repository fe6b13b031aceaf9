//! MySQL-backed job tracker.
//!
//! Keeps jobs, table comparisons and chunk records in three tables inside the
//! tracking database (`_data_checksum` by default).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use mysql_async::prelude::*;
use mysql_async::{params, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row as MySqlRow};
use tracing::info;

use super::backend::{
    chunk_status_to_str, comparison_status_to_str, job_status_to_str, str_to_comparison_status,
    JobTracker,
};
use super::{
    make_job_id, unique_job_id, ChunkComparison, ComparisonStatus, JobStatus, JobSummary,
    TableComparison, TableComparisonUpdate,
};
use crate::config::TrackingConfig;
use crate::core::{qualify_mysql, quote_mysql, TablePair, TableRef, DATETIME_FORMAT};
use crate::error::{ChecksumError, Result};

/// Job tracker writing to MySQL through mysql_async.
pub struct MysqlJobTracker {
    pool: Pool,
    database: String,
}

impl MysqlJobTracker {
    /// Connect to the tracking server and verify the connection.
    pub async fn connect(config: &TrackingConfig) -> Result<Self> {
        let builder = OptsBuilder::default()
            .ip_or_hostname(config.host.as_str())
            .tcp_port(config.port)
            .user(Some(config.user.as_str()))
            .pass(Some(config.password.as_str()))
            .init(vec!["SET NAMES utf8mb4"]);

        let constraints = PoolConstraints::new(1, 4)
            .ok_or_else(|| ChecksumError::Config("invalid tracking pool size".into()))?;
        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();
        let pool = Pool::new(opts);

        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| ChecksumError::tracking(e, "connecting to tracking database"))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| ChecksumError::tracking(e, "testing tracking connection"))?;
        drop(conn);

        info!(
            "Connected to tracking database: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self::new(pool, &config.database))
    }

    pub fn new(pool: Pool, database: &str) -> Self {
        Self {
            pool,
            database: database.to_string(),
        }
    }

    fn table(&self, name: &str) -> Result<String> {
        qualify_mysql(&self.database, name)
    }

    async fn conn(&self, context: &str) -> Result<mysql_async::Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| ChecksumError::tracking(e, context))
    }

    /// Disconnect the pool.
    pub async fn close(self) -> Result<()> {
        self.pool
            .disconnect()
            .await
            .map_err(|e| ChecksumError::tracking(e, "closing tracking pool"))
    }

    async fn load_comparisons(
        &self,
        job_id: &str,
        statuses: &[ComparisonStatus],
    ) -> Result<Vec<TableComparison>> {
        let mut conn = self.conn("getting tracking connection").await?;
        let statuses = statuses
            .iter()
            .map(|s| format!("'{}'", comparison_status_to_str(*s)))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "SELECT comparison_id, job_id, source_database, source_table,
                    target_database, target_table, status,
                    source_row_count, target_row_count,
                    chunks_processed, chunks_equal, chunks_different,
                    CAST(is_equal AS SIGNED) AS is_equal, error,
                    DATE_FORMAT(start_time, '%Y-%m-%d %H:%i:%s.%f') AS start_time,
                    DATE_FORMAT(end_time, '%Y-%m-%d %H:%i:%s.%f') AS end_time
             FROM {}
             WHERE job_id = ? AND status IN ({})
             ORDER BY comparison_id",
            self.table("table_comparisons")?,
            statuses
        );

        let rows: Vec<MySqlRow> = conn
            .exec(&sql, (job_id,))
            .await
            .map_err(|e| ChecksumError::tracking(e, "loading table comparisons"))?;

        rows.into_iter().map(comparison_from_row).collect()
    }
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).ok())
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}

fn to_u64(value: Option<i64>) -> u64 {
    value.map_or(0, |v| u64::try_from(v).unwrap_or(0))
}

fn comparison_from_row(row: MySqlRow) -> Result<TableComparison> {
    let status: String = row.get("status").unwrap_or_default();
    let pair = TablePair::new(
        TableRef::new(
            row.get::<String, _>("source_database").unwrap_or_default(),
            row.get::<String, _>("source_table").unwrap_or_default(),
        ),
        TableRef::new(
            row.get::<String, _>("target_database").unwrap_or_default(),
            row.get::<String, _>("target_table").unwrap_or_default(),
        ),
    );

    Ok(TableComparison {
        comparison_id: row.get("comparison_id").unwrap_or_default(),
        job_id: row.get("job_id").unwrap_or_default(),
        pair,
        status: str_to_comparison_status(&status)?,
        source_row_count: row.get::<Option<i64>, _>("source_row_count").flatten(),
        target_row_count: row.get::<Option<i64>, _>("target_row_count").flatten(),
        chunks_processed: to_u64(row.get::<Option<i64>, _>("chunks_processed").flatten()),
        chunks_equal: to_u64(row.get::<Option<i64>, _>("chunks_equal").flatten()),
        chunks_different: to_u64(row.get::<Option<i64>, _>("chunks_different").flatten()),
        is_equal: row
            .get::<Option<i64>, _>("is_equal")
            .flatten()
            .map(|v| v != 0),
        error: row.get::<Option<String>, _>("error").flatten(),
        started_at: parse_timestamp(row.get::<Option<String>, _>("start_time").flatten()),
        finished_at: parse_timestamp(row.get::<Option<String>, _>("end_time").flatten()),
    })
}

#[async_trait]
impl JobTracker for MysqlJobTracker {
    async fn init_schema(&self) -> Result<()> {
        let mut conn = self.conn("getting tracking connection").await?;

        let sql = format!(
            "CREATE DATABASE IF NOT EXISTS {}",
            quote_mysql(&self.database)?
        );
        conn.query_drop(&sql)
            .await
            .map_err(|e| ChecksumError::tracking(e, "creating tracking database"))?;

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                job_id VARCHAR(255) NOT NULL,
                source_host VARCHAR(255) NOT NULL,
                target_host VARCHAR(255) NOT NULL,
                status VARCHAR(20) NOT NULL,
                start_time DATETIME(6) NOT NULL,
                end_time DATETIME(6),
                total_tables BIGINT NOT NULL DEFAULT 0,
                tables_equal BIGINT NOT NULL DEFAULT 0,
                tables_different BIGINT NOT NULL DEFAULT 0,
                tables_failed BIGINT NOT NULL DEFAULT 0,
                PRIMARY KEY (job_id)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            self.table("checksum_jobs")?
        );
        conn.query_drop(&sql)
            .await
            .map_err(|e| ChecksumError::tracking(e, "creating checksum_jobs table"))?;

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                comparison_id BIGINT NOT NULL AUTO_INCREMENT,
                job_id VARCHAR(255) NOT NULL,
                source_database VARCHAR(64) NOT NULL,
                source_table VARCHAR(64) NOT NULL,
                target_database VARCHAR(64) NOT NULL,
                target_table VARCHAR(64) NOT NULL,
                status VARCHAR(20) NOT NULL,
                source_row_count BIGINT,
                target_row_count BIGINT,
                chunks_processed BIGINT NOT NULL DEFAULT 0,
                chunks_equal BIGINT NOT NULL DEFAULT 0,
                chunks_different BIGINT NOT NULL DEFAULT 0,
                is_equal TINYINT,
                error TEXT,
                start_time DATETIME(6),
                end_time DATETIME(6),
                PRIMARY KEY (comparison_id),
                INDEX idx_job_status (job_id, status)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            self.table("table_comparisons")?
        );
        conn.query_drop(&sql)
            .await
            .map_err(|e| ChecksumError::tracking(e, "creating table_comparisons table"))?;

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                chunk_id BIGINT NOT NULL AUTO_INCREMENT,
                comparison_id BIGINT NOT NULL,
                chunk_number BIGINT NOT NULL,
                range_start JSON,
                range_end JSON,
                status VARCHAR(20) NOT NULL,
                source_checksum TEXT,
                target_checksum TEXT,
                processing_time_ms BIGINT NOT NULL DEFAULT 0,
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                PRIMARY KEY (chunk_id),
                INDEX idx_comparison (comparison_id, chunk_number)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            self.table("chunk_comparisons")?
        );
        conn.query_drop(&sql)
            .await
            .map_err(|e| ChecksumError::tracking(e, "creating chunk_comparisons table"))?;

        Ok(())
    }

    async fn create_job(&self, source_host: &str, target_host: &str) -> Result<String> {
        let base = make_job_id(source_host, target_host, Utc::now());
        let mut conn = self.conn("getting tracking connection").await?;

        let sql = format!(
            "SELECT job_id FROM {} WHERE job_id LIKE CONCAT(?, '%')",
            self.table("checksum_jobs")?
        );
        let taken: Vec<String> = conn
            .exec(&sql, (base.as_str(),))
            .await
            .map_err(|e| ChecksumError::tracking(e, "checking job id"))?;
        let job_id = unique_job_id(&base, |id| taken.iter().any(|t| t == id));

        let sql = format!(
            "INSERT INTO {} (job_id, source_host, target_host, status, start_time)
             VALUES (:job_id, :source_host, :target_host, :status, NOW(6))",
            self.table("checksum_jobs")?
        );
        conn.exec_drop(
            &sql,
            params! {
                "job_id" => &job_id,
                "source_host" => source_host,
                "target_host" => target_host,
                "status" => job_status_to_str(JobStatus::Running),
            },
        )
        .await
        .map_err(|e| ChecksumError::tracking(e, "creating job"))?;

        Ok(job_id)
    }

    async fn register_table(&self, job_id: &str, pair: &TablePair) -> Result<i64> {
        let mut conn = self.conn("getting tracking connection").await?;

        let sql = format!(
            "INSERT INTO {}
             (job_id, source_database, source_table, target_database, target_table, status)
             VALUES (:job_id, :source_database, :source_table, :target_database, :target_table, :status)",
            self.table("table_comparisons")?
        );
        conn.exec_drop(
            &sql,
            params! {
                "job_id" => job_id,
                "source_database" => &pair.source.database,
                "source_table" => &pair.source.table,
                "target_database" => &pair.target.database,
                "target_table" => &pair.target.table,
                "status" => comparison_status_to_str(ComparisonStatus::Pending),
            },
        )
        .await
        .map_err(|e| ChecksumError::tracking(e, "registering table comparison"))?;

        let id = conn
            .last_insert_id()
            .ok_or_else(|| ChecksumError::Tracking("no id returned for table comparison".into()))?;
        i64::try_from(id).map_err(|e| ChecksumError::tracking(e, "reading comparison id"))
    }

    async fn start_table(&self, comparison_id: i64) -> Result<()> {
        let mut conn = self.conn("getting tracking connection").await?;

        let sql = format!(
            "UPDATE {} SET status = :status, start_time = NOW(6), end_time = NULL, error = NULL
             WHERE comparison_id = :comparison_id",
            self.table("table_comparisons")?
        );
        conn.exec_drop(
            &sql,
            params! {
                "status" => comparison_status_to_str(ComparisonStatus::Running),
                "comparison_id" => comparison_id,
            },
        )
        .await
        .map_err(|e| ChecksumError::tracking(e, "starting table comparison"))
    }

    async fn record_chunk(&self, chunk: &ChunkComparison) -> Result<()> {
        let mut conn = self.conn("getting tracking connection").await?;

        let sql = format!(
            "INSERT INTO {}
             (comparison_id, chunk_number, range_start, range_end, status,
              source_checksum, target_checksum, processing_time_ms)
             VALUES (:comparison_id, :chunk_number, :range_start, :range_end, :status,
                     :source_checksum, :target_checksum, :processing_time_ms)",
            self.table("chunk_comparisons")?
        );
        conn.exec_drop(
            &sql,
            params! {
                "comparison_id" => chunk.comparison_id,
                "chunk_number" => chunk.chunk_number,
                "range_start" => chunk.range_start.to_string(),
                "range_end" => chunk.range_end.to_string(),
                "status" => chunk_status_to_str(chunk.status),
                "source_checksum" => &chunk.source_checksum,
                "target_checksum" => &chunk.target_checksum,
                "processing_time_ms" => chunk.processing_time_ms,
            },
        )
        .await
        .map_err(|e| ChecksumError::tracking(e, "recording chunk"))
    }

    async fn finish_table(&self, comparison_id: i64, update: &TableComparisonUpdate) -> Result<()> {
        let mut conn = self.conn("getting tracking connection").await?;

        let sql = format!(
            "UPDATE {} SET
                status = :status,
                source_row_count = :source_row_count,
                target_row_count = :target_row_count,
                chunks_processed = :chunks_processed,
                chunks_equal = :chunks_equal,
                chunks_different = :chunks_different,
                is_equal = :is_equal,
                error = :error,
                end_time = NOW(6)
             WHERE comparison_id = :comparison_id",
            self.table("table_comparisons")?
        );
        conn.exec_drop(
            &sql,
            params! {
                "status" => comparison_status_to_str(update.status),
                "source_row_count" => update.source_row_count,
                "target_row_count" => update.target_row_count,
                "chunks_processed" => update.chunks_processed,
                "chunks_equal" => update.chunks_equal,
                "chunks_different" => update.chunks_different,
                "is_equal" => update.is_equal.map(i64::from),
                "error" => &update.error,
                "comparison_id" => comparison_id,
            },
        )
        .await
        .map_err(|e| ChecksumError::tracking(e, "finishing table comparison"))
    }

    async fn complete_job(&self, job_id: &str, summary: &JobSummary) -> Result<()> {
        let mut conn = self.conn("getting tracking connection").await?;

        let sql = format!(
            "UPDATE {} SET
                status = :status,
                end_time = NOW(6),
                total_tables = :total_tables,
                tables_equal = :tables_equal,
                tables_different = :tables_different,
                tables_failed = :tables_failed
             WHERE job_id = :job_id",
            self.table("checksum_jobs")?
        );
        conn.exec_drop(
            &sql,
            params! {
                "status" => job_status_to_str(summary.status),
                "total_tables" => summary.total_tables,
                "tables_equal" => summary.tables_equal,
                "tables_different" => summary.tables_different,
                "tables_failed" => summary.tables_failed,
                "job_id" => job_id,
            },
        )
        .await
        .map_err(|e| ChecksumError::tracking(e, "completing job"))
    }

    async fn pending_tables(&self, job_id: &str) -> Result<Vec<TableComparison>> {
        self.load_comparisons(job_id, &[ComparisonStatus::Pending, ComparisonStatus::Running])
            .await
    }

    async fn finished_tables(&self, job_id: &str) -> Result<Vec<TableComparison>> {
        self.load_comparisons(job_id, &[ComparisonStatus::Completed, ComparisonStatus::Failed])
            .await
    }

    fn backend_type(&self) -> &'static str {
        "mysql"
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        let parsed = parse_timestamp(Some("2024-03-01 10:20:30".to_string())).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T10:20:30+00:00");
        let micros = parse_timestamp(Some("2024-03-01 10:20:30.000250".to_string())).unwrap();
        assert_eq!(micros.timestamp_subsec_micros(), 250);
        assert!(parse_timestamp(None).is_none());
        assert!(parse_timestamp(Some("yesterday".to_string())).is_none());
    }

    #[test]
    fn test_negative_tallies_read_as_zero() {
        assert_eq!(to_u64(Some(-1)), 0);
        assert_eq!(to_u64(Some(7)), 7);
        assert_eq!(to_u64(None), 0);
    }
}

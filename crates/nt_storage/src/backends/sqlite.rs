use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nt_core::{
    AnalysisResult, AnalysisStatus, AnalysisType, ArticleStorage, EnrichmentRecord, Error, NormalizedArticle,
    Result,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

pub const DEFAULT_DB_PATH: &str = "articles.db";

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id TEXT PRIMARY KEY,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        source TEXT NOT NULL,
        source_type TEXT NOT NULL,
        published_at TEXT,
        batch_id TEXT NOT NULL,
        summary TEXT,
        sentiment_score REAL,
        sentiment_label TEXT,
        relevance_score REAL,
        bias_score REAL,
        topics TEXT NOT NULL,
        processed_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS analysis_cache (
        article_id TEXT NOT NULL REFERENCES articles(id),
        analysis_type TEXT NOT NULL,
        result TEXT NOT NULL,
        confidence_score REAL NOT NULL,
        model_used TEXT NOT NULL,
        processing_time_ms INTEGER NOT NULL,
        attempts INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (article_id, analysis_type)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source)",
];

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> Error {
    move |e| Error::Database(format!("{}: {}", context, e))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("Failed to parse date '{}': {}", value, e)))
}

pub struct SQLiteStorage {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(db_error("Invalid database path"))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_error("Failed to connect to database"))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }

        tracing::debug!(path = %db_path.display(), "SQLite storage ready");
        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    fn record_from_row(row: &SqliteRow) -> Result<EnrichmentRecord> {
        let get_err = db_error("Failed to read article row");
        let published_at: Option<String> = row.try_get("published_at").map_err(&get_err)?;
        let processed_at: String = row.try_get("processed_at").map_err(&get_err)?;
        let batch_id: String = row.try_get("batch_id").map_err(&get_err)?;
        let topics: String = row.try_get("topics").map_err(&get_err)?;

        Ok(EnrichmentRecord {
            article: NormalizedArticle {
                id: row.try_get("id").map_err(&get_err)?,
                title: row.try_get("title").map_err(&get_err)?,
                content: row.try_get("content").map_err(&get_err)?,
                url: row.try_get("url").map_err(&get_err)?,
                source: row.try_get("source").map_err(&get_err)?,
                published_at: published_at.as_deref().map(parse_time).transpose()?,
            },
            source_type: row.try_get("source_type").map_err(&get_err)?,
            batch_id: Uuid::parse_str(&batch_id)
                .map_err(|e| Error::Database(format!("Invalid batch id '{}': {}", batch_id, e)))?,
            summary: row.try_get("summary").map_err(&get_err)?,
            sentiment_score: row.try_get("sentiment_score").map_err(&get_err)?,
            sentiment_label: row.try_get("sentiment_label").map_err(&get_err)?,
            relevance_score: row.try_get("relevance_score").map_err(&get_err)?,
            bias_score: row.try_get("bias_score").map_err(&get_err)?,
            topics: serde_json::from_str(&topics)?,
            processed_at: parse_time(&processed_at)?,
        })
    }

    fn analysis_from_row(row: &SqliteRow) -> Result<AnalysisResult> {
        let get_err = db_error("Failed to read analysis row");
        let analysis_type: String = row.try_get("analysis_type").map_err(&get_err)?;
        let result: String = row.try_get("result").map_err(&get_err)?;
        let processing_time_ms: i64 = row.try_get("processing_time_ms").map_err(&get_err)?;
        let attempts: i64 = row.try_get("attempts").map_err(&get_err)?;

        Ok(AnalysisResult {
            article_id: row.try_get("article_id").map_err(&get_err)?,
            analysis_type: AnalysisType::parse(&analysis_type)
                .ok_or_else(|| Error::Database(format!("Unknown analysis type '{}'", analysis_type)))?,
            result: serde_json::from_str(&result)?,
            confidence_score: row.try_get("confidence_score").map_err(&get_err)?,
            model_used: row.try_get("model_used").map_err(&get_err)?,
            processing_time_ms: processing_time_ms.max(0) as u64,
            attempts: attempts.max(0) as u32,
            status: AnalysisStatus::Succeeded,
            error_message: None,
        })
    }
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    async fn persist_enrichment(&self, record: &EnrichmentRecord, results: &[AnalysisResult]) -> Result<()> {
        let article = &record.article;
        let topics = serde_json::to_string(&record.topics)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(db_error("Failed to begin transaction"))?;

        sqlx::query(
            r#"
            INSERT INTO articles
            (id, url, title, content, source, source_type, published_at, batch_id, summary,
             sentiment_score, sentiment_label, relevance_score, bias_score, topics, processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                content = excluded.content,
                source = excluded.source,
                source_type = excluded.source_type,
                published_at = excluded.published_at,
                batch_id = excluded.batch_id,
                summary = excluded.summary,
                sentiment_score = excluded.sentiment_score,
                sentiment_label = excluded.sentiment_label,
                relevance_score = excluded.relevance_score,
                bias_score = excluded.bias_score,
                topics = excluded.topics,
                processed_at = excluded.processed_at
            "#,
        )
        .bind(&article.id)
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.source)
        .bind(&record.source_type)
        .bind(article.published_at.map(|d| d.to_rfc3339()))
        .bind(record.batch_id.to_string())
        .bind(record.summary.as_deref())
        .bind(record.sentiment_score)
        .bind(record.sentiment_label.as_deref())
        .bind(record.relevance_score)
        .bind(record.bias_score)
        .bind(topics)
        .bind(record.processed_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to store article"))?;

        sqlx::query("DELETE FROM analysis_cache WHERE article_id = ?")
            .bind(&article.id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to clear analysis cache"))?;

        for result in results.iter().filter(|r| r.is_success()) {
            sqlx::query(
                r#"
                INSERT INTO analysis_cache
                (article_id, analysis_type, result, confidence_score, model_used, processing_time_ms, attempts, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&article.id)
            .bind(result.analysis_type.as_str())
            .bind(serde_json::to_string(&result.result)?)
            .bind(result.confidence_score)
            .bind(&result.model_used)
            .bind(result.processing_time_ms as i64)
            .bind(result.attempts as i64)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to store analysis"))?;
        }

        // Dropping an uncommitted transaction rolls it back, so any early
        // return above leaves no partial rows.
        tx.commit().await.map_err(db_error("Failed to commit transaction"))?;
        Ok(())
    }

    async fn get_article(&self, id: &str) -> Result<Option<EnrichmentRecord>> {
        let row = sqlx::query("SELECT * FROM articles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get article"))?;
        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn get_analyses(&self, id: &str) -> Result<Vec<AnalysisResult>> {
        let rows = sqlx::query("SELECT * FROM analysis_cache WHERE article_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to get analyses"))?;
        let mut results = rows.iter().map(Self::analysis_from_row).collect::<Result<Vec<_>>>()?;
        results.sort_by_key(|r| r.analysis_type);
        Ok(results)
    }

    async fn get_by_source(&self, source: &str) -> Result<Vec<EnrichmentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM articles
            WHERE source = ?
            ORDER BY processed_at DESC
            "#,
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to get articles by source"))?;
        rows.iter().map(Self::record_from_row).collect()
    }
}

use crate::models::{AnalyticsSnapshot, Link, ReferrerCount, VisitRecord};
use crate::storage::{NewLink, Storage, StorageError, StorageResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const LINK_COLUMNS: &str = "short_code, original_url, created_at, expires_at, total_visits, unique_visitors, device_types, referrers";

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    short_code: String,
    original_url: String,
    created_at: i64,
    expires_at: Option<i64>,
    total_visits: i64,
    unique_visitors: i64,
    device_types: String,
    referrers: String,
}

#[derive(sqlx::FromRow)]
struct VisitRow {
    visited_at: i64,
    ip: String,
    user_agent: String,
    referrer: String,
    device_type: String,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        if !database_url.contains(":memory:") {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn hydrate(conn: &mut SqliteConnection, row: LinkRow) -> StorageResult<Link> {
        let tags = sqlx::query_scalar::<_, String>(
            r#"
            SELECT tag FROM link_tags
            WHERE short_code = ?
            ORDER BY position
            "#,
        )
        .bind(&row.short_code)
        .fetch_all(&mut *conn)
        .await?;

        let visits = sqlx::query_as::<_, VisitRow>(
            r#"
            SELECT visited_at, ip, user_agent, referrer, device_type
            FROM visits
            WHERE short_code = ?
            ORDER BY seq
            "#,
        )
        .bind(&row.short_code)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(VisitRecord::try_from)
        .collect::<StorageResult<Vec<_>>>()?;

        let device_types: BTreeMap<String, u64> =
            serde_json::from_str(&row.device_types).map_err(|e| StorageError::Other(e.into()))?;
        let referrers: Vec<ReferrerCount> =
            serde_json::from_str(&row.referrers).map_err(|e| StorageError::Other(e.into()))?;

        Ok(Link {
            short_code: row.short_code,
            original_url: row.original_url,
            tags,
            created_at: from_millis(row.created_at)?,
            expires_at: row.expires_at.map(from_millis).transpose()?,
            analytics: AnalyticsSnapshot::restore(
                row.total_visits as u64,
                row.unique_visitors as u64,
                device_types,
                referrers,
                visits,
            ),
        })
    }

    async fn load_many(&self, sql: &str, bind: Option<&str>) -> StorageResult<Vec<Link>> {
        let mut tx = self.pool.begin().await?;

        let mut query = sqlx::query_as::<_, LinkRow>(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&mut *tx).await?;

        let mut links = Vec::with_capacity(rows.len());
        for row in rows {
            links.push(Self::hydrate(&mut *tx, row).await?);
        }

        tx.commit().await?;
        Ok(links)
    }
}

impl TryFrom<VisitRow> for VisitRecord {
    type Error = StorageError;

    fn try_from(row: VisitRow) -> StorageResult<Self> {
        Ok(VisitRecord {
            timestamp: from_millis(row.visited_at)?,
            ip: row
                .ip
                .parse()
                .map_err(|e| StorageError::Other(anyhow!("stored visit has invalid ip {}: {e}", row.ip)))?,
            user_agent: row.user_agent,
            referrer: row.referrer,
            device_type: row.device_type,
        })
    }
}

fn from_millis(millis: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Other(anyhow!("timestamp out of range: {millis}")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                short_code TEXT PRIMARY KEY,
                original_url TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                total_visits INTEGER NOT NULL DEFAULT 0,
                unique_visitors INTEGER NOT NULL DEFAULT 0,
                device_types TEXT NOT NULL,
                referrers TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_created_at ON links(created_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_expires_at ON links(expires_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS link_tags (
                short_code TEXT NOT NULL REFERENCES links(short_code),
                position INTEGER NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY (short_code, position)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_link_tags_tag ON link_tags(tag)")
            .execute(self.pool.as_ref())
            .await?;

        // Append-only visit log; (short_code, seq) doubles as a write fence
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visits (
                short_code TEXT NOT NULL REFERENCES links(short_code),
                seq INTEGER NOT NULL,
                visited_at INTEGER NOT NULL,
                ip TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                referrer TEXT NOT NULL,
                device_type TEXT NOT NULL,
                PRIMARY KEY (short_code, seq)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create_link(&self, new: NewLink) -> StorageResult<Link> {
        let created_at = from_millis(Utc::now().timestamp_millis())?;
        let expires_at = new
            .expires_at
            .map(|at| from_millis(at.timestamp_millis()))
            .transpose()?;
        let link = Link::new(
            new.short_code,
            new.original_url,
            new.tags,
            created_at,
            expires_at,
        );

        let device_types = serde_json::to_string(&link.analytics.device_types)
            .map_err(|e| StorageError::Other(e.into()))?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO links (short_code, original_url, created_at, expires_at, device_types)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(short_code) DO NOTHING
            "#,
        )
        .bind(&link.short_code)
        .bind(&link.original_url)
        .bind(created_at.timestamp_millis())
        .bind(expires_at.map(|at| at.timestamp_millis()))
        .bind(device_types)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::DuplicateCode);
        }

        for (position, tag) in link.tags.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO link_tags (short_code, position, tag)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(&link.short_code)
            .bind(position as i64)
            .bind(tag)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(link)
    }

    async fn find_by_short_code(&self, short_code: &str) -> StorageResult<Option<Link>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {LINK_COLUMNS} FROM links WHERE short_code = ?");
        let row = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(short_code)
            .fetch_optional(&mut *tx)
            .await?;

        let link = match row {
            Some(row) => Some(Self::hydrate(&mut *tx, row).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(link)
    }

    async fn save(&self, link: &Link) -> StorageResult<()> {
        let snapshot = &link.analytics;
        let base = snapshot.persisted_visits() as i64;

        let device_types = serde_json::to_string(&snapshot.device_types)
            .map_err(|e| StorageError::Other(e.into()))?;
        let referrers = serde_json::to_string(&snapshot.referrers)
            .map_err(|e| StorageError::Other(e.into()))?;

        let mut tx = self.pool.begin().await?;

        // total_visits always equals the persisted log length, so it
        // doubles as the version this snapshot was loaded at
        let result = sqlx::query(
            r#"
            UPDATE links
            SET total_visits = ?, unique_visitors = ?, device_types = ?, referrers = ?
            WHERE short_code = ? AND total_visits = ?
            "#,
        )
        .bind(snapshot.total_visits as i64)
        .bind(snapshot.unique_visitors as i64)
        .bind(device_types)
        .bind(referrers)
        .bind(&link.short_code)
        .bind(base)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, i64>("SELECT 1 FROM links WHERE short_code = ?")
                .bind(&link.short_code)
                .fetch_optional(&mut *tx)
                .await?;

            return Err(match exists {
                Some(_) => StorageError::Conflict,
                None => StorageError::NotFound,
            });
        }

        for (offset, visit) in snapshot.pending_visits().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO visits (short_code, seq, visited_at, ip, user_agent, referrer, device_type)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&link.short_code)
            .bind(base + offset as i64)
            .bind(visit.timestamp.timestamp_millis())
            .bind(visit.ip.to_string())
            .bind(&visit.user_agent)
            .bind(&visit.referrer)
            .bind(&visit.device_type)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::Conflict
                } else {
                    e.into()
                }
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_tag(&self, tag: &str) -> StorageResult<Vec<Link>> {
        let sql = format!(
            r#"
            SELECT {LINK_COLUMNS} FROM links
            WHERE short_code IN (SELECT short_code FROM link_tags WHERE tag = ?)
            ORDER BY created_at DESC, rowid DESC
            "#
        );
        self.load_many(&sql, Some(tag)).await
    }

    async fn find_all(&self) -> StorageResult<Vec<Link>> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM links ORDER BY created_at DESC, rowid DESC");
        self.load_many(&sql, None).await
    }
}

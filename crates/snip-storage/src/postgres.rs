use async_trait::async_trait;
use snip_core::{DeleteTask, Result, SavedUrl, Stats, Storage, StorageError};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use tracing::{debug, info};

/// Name of the primary key constraint; a violation means the short id is taken.
const PRIMARY_KEY: &str = "short_urls_pkey";

/// Idempotent schema setup, run in order by [`Storage::init`].
///
/// The trailing statements migrate tables created before `user_id` and
/// `is_deleted` existed, and replace the old column-wide unique constraint on
/// `original_url` with one that only covers live rows.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS short_urls (
        short_url    TEXT PRIMARY KEY,
        original_url TEXT NOT NULL,
        user_id      TEXT NOT NULL DEFAULT '',
        is_deleted   BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    "ALTER TABLE short_urls ADD COLUMN IF NOT EXISTS user_id TEXT NOT NULL DEFAULT ''",
    "ALTER TABLE short_urls ADD COLUMN IF NOT EXISTS is_deleted BOOLEAN NOT NULL DEFAULT FALSE",
    "ALTER TABLE short_urls DROP CONSTRAINT IF EXISTS short_urls_original_url_key",
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS short_urls_live_original_url_idx
        ON short_urls (original_url)
        WHERE NOT is_deleted
    "#,
];

/// Inserts a row, or on a live-URL conflict returns the existing short id
/// without a separate read.
const UPSERT: &str = r#"
    INSERT INTO short_urls (short_url, original_url, user_id)
    VALUES ($1, $2, $3)
    ON CONFLICT (original_url) WHERE NOT is_deleted
    DO UPDATE SET original_url = EXCLUDED.original_url
    RETURNING short_url, (xmax = 0) AS inserted
"#;

/// PostgreSQL implementation of the [`Storage`] contract.
///
/// Uniqueness of live URLs is enforced by a partial unique index. Soft delete
/// flips `is_deleted`; rows are never removed except by [`Storage::clean`].
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a storage from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a storage by opening a new connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_short_id_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db_err| {
        db_err.is_unique_violation() && db_err.constraint() == Some(PRIMARY_KEY)
    })
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn decode_row(row: &PgRow) -> Result<SavedUrl> {
    Ok(SavedUrl {
        short_id: row.try_get("short_url").map_err(map_sqlx_error)?,
        original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
        owner_id: row.try_get("user_id").map_err(map_sqlx_error)?,
        is_deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
    })
}

fn decode_count(row: &PgRow, column: &str) -> Result<u64> {
    let count: i64 = row.try_get(column).map_err(map_sqlx_error)?;
    u64::try_from(count)
        .map_err(|_| StorageError::InvalidData(format!("negative {column} count: {count}")))
}

/// Runs the upsert and converts the outcome into the storage contract.
async fn insert_or_conflict<'e, E: PgExecutor<'e>>(executor: E, url: &SavedUrl) -> Result<()> {
    let result = sqlx::query(UPSERT)
        .bind(&url.short_id)
        .bind(&url.original_url)
        .bind(&url.owner_id)
        .fetch_one(executor)
        .await;

    let row = match result {
        Ok(row) => row,
        Err(err) if is_short_id_violation(&err) => {
            return Err(StorageError::ShortIdTaken(url.short_id.clone()))
        }
        Err(err) => return Err(map_sqlx_error(err)),
    };

    // A row that took the update path was already live under this URL.
    let inserted: bool = row.try_get("inserted").map_err(map_sqlx_error)?;
    if !inserted {
        let stored: String = row.try_get("short_url").map_err(map_sqlx_error)?;
        return Err(StorageError::Conflict(stored));
    }
    Ok(())
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Initialization(e.to_string()))?;
        }
        info!("postgres schema is up to date");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn save(&self, url: &SavedUrl) -> Result<()> {
        insert_or_conflict(&self.pool, url).await?;
        debug!(short_id = %url.short_id, "saved url");
        Ok(())
    }

    async fn save_array(&self, urls: &[SavedUrl]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Dropping `tx` on an early return rolls the whole batch back.
        for url in urls {
            insert_or_conflict(&mut *tx, url).await?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(count = urls.len(), "saved url batch");
        Ok(())
    }

    async fn get(&self, short_id: &str) -> Result<SavedUrl> {
        let row = sqlx::query(
            r#"
            SELECT short_url, original_url, user_id, is_deleted
            FROM short_urls
            WHERE short_url = $1
            "#,
        )
        .bind(short_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(short_id.to_string()));
        };
        decode_row(&row)
    }

    async fn get_by_user(&self, owner_id: &str) -> Result<Vec<SavedUrl>> {
        let rows = sqlx::query(
            r#"
            SELECT short_url, original_url, user_id, is_deleted
            FROM short_urls
            WHERE user_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if rows.is_empty() {
            return Err(StorageError::NotFound(format!("no urls for owner {owner_id}")));
        }
        rows.iter().map(decode_row).collect()
    }

    async fn delete(&self, tasks: &[DeleteTask]) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let (short_ids, owner_ids): (Vec<String>, Vec<String>) = tasks
            .iter()
            .map(|task| (task.short_id.clone(), task.owner_id.clone()))
            .unzip();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // One round trip for the whole batch; pairs are matched positionally.
        let result = sqlx::query(
            r#"
            UPDATE short_urls AS u
            SET is_deleted = TRUE
            FROM UNNEST($1::text[], $2::text[]) AS t(short_url, user_id)
            WHERE u.short_url = t.short_url
              AND u.user_id = t.user_id
              AND NOT u.is_deleted
            "#,
        )
        .bind(&short_ids)
        .bind(&owner_ids)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(
            tasks = tasks.len(),
            flipped = result.rows_affected(),
            "soft-deleted urls"
        );
        Ok(())
    }

    async fn is_owner_known(&self, owner_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM short_urls WHERE user_id = $1) AS known")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.try_get("known").map_err(map_sqlx_error)
    }

    async fn get_stats(&self) -> Result<Stats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) FILTER (WHERE NOT is_deleted) AS urls,
                   COUNT(DISTINCT user_id) FILTER (WHERE NOT is_deleted) AS users
            FROM short_urls
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Stats {
            urls: decode_count(&row, "urls")?,
            users: decode_count(&row, "users")?,
        })
    }

    async fn clean(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE short_urls")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

//! libSQL storage layer (local, embedded).
//!
//! The [`Storage`] struct wraps a libSQL database holding the channel
//! registry cache, the subscriber list, the digest archive and the
//! per-recipient delivery records.
//!
//! **Access rules:**
//! - The digest service: read-write (sole writer) via [`Storage::open`]
//! - Inspection tooling: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;

use newsdigest_shared::{
    Channel, DeliveryOutcome, DeliveryRecord, Digest, NewsDigestError, Result, Subscriber,
    SubscriberStatus,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Map any libSQL error into the storage variant.
fn storage_err(e: impl std::fmt::Display) -> NewsDigestError {
    NewsDigestError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NewsDigestError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        NewsDigestError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(NewsDigestError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Channel operations
    // -----------------------------------------------------------------------

    /// Insert or refresh a channel by handle, stamping `last_checked_at`.
    /// Returns the stored row, whose `id` is stable across refreshes.
    pub async fn upsert_channel(&self, handle: &str, title: &str) -> Result<Channel> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO channels (handle, title, added_at, last_checked_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(handle) DO UPDATE SET
                   title = excluded.title,
                   last_checked_at = excluded.last_checked_at",
                params![handle, title, now.as_str()],
            )
            .await
            .map_err(storage_err)?;

        self.get_channel(handle).await?.ok_or_else(|| {
            NewsDigestError::Storage(format!("channel @{handle} vanished after upsert"))
        })
    }

    /// Get a channel by handle.
    pub async fn get_channel(&self, handle: &str) -> Result<Option<Channel>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, handle, title, last_checked_at FROM channels WHERE handle = ?1",
                params![handle],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_channel(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// List all known channels in insertion order.
    pub async fn list_channels(&self) -> Result<Vec<Channel>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, handle, title, last_checked_at FROM channels ORDER BY id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_channel(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Subscriber operations
    // -----------------------------------------------------------------------

    /// Register a subscriber, reactivating an inactive one.
    /// Returns `true` when the user was not previously active.
    pub async fn add_subscriber(&self, user_id: i64, username: Option<&str>) -> Result<bool> {
        self.check_writable()?;
        let was_active = matches!(
            self.get_subscriber(user_id).await?,
            Some(Subscriber {
                status: SubscriberStatus::Active,
                ..
            })
        );

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO subscribers (user_id, username, status, added_at, last_interaction_at)
                 VALUES (?1, ?2, 'active', ?3, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                   username = COALESCE(excluded.username, subscribers.username),
                   status = 'active',
                   last_interaction_at = excluded.last_interaction_at",
                params![user_id, username, now.as_str()],
            )
            .await
            .map_err(storage_err)?;

        Ok(!was_active)
    }

    /// Get a subscriber by user ID.
    pub async fn get_subscriber(&self, user_id: i64) -> Result<Option<Subscriber>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id, username, status, added_at, last_interaction_at
                 FROM subscribers WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_subscriber(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// All subscribers regardless of status, oldest registration first.
    pub async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id, username, status, added_at, last_interaction_at
                 FROM subscribers ORDER BY added_at, user_id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_subscriber(&row)?);
        }
        Ok(results)
    }

    /// User IDs of all active subscribers, oldest registration first.
    pub async fn active_subscribers(&self) -> Result<Vec<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id FROM subscribers WHERE status = 'active'
                 ORDER BY added_at, user_id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row.get::<i64>(0).map_err(storage_err)?);
        }
        Ok(results)
    }

    /// Refresh a subscriber's `last_interaction_at`.
    pub async fn mark_interaction(&self, user_id: i64) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE subscribers SET last_interaction_at = ?1 WHERE user_id = ?2",
                params![now.as_str(), user_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Transition a subscriber to inactive. The row is kept.
    pub async fn deactivate(&self, user_id: i64) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE subscribers SET status = 'inactive' WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Returns `(active, total)` subscriber counts.
    pub async fn subscriber_counts(&self) -> Result<(u64, u64)> {
        let mut rows = self
            .conn
            .query(
                "SELECT
                   COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0),
                   COUNT(*)
                 FROM subscribers",
                params![],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok((
                row.get::<i64>(0).map_err(storage_err)? as u64,
                row.get::<i64>(1).map_err(storage_err)? as u64,
            )),
            Ok(None) => Ok((0, 0)),
            Err(e) => Err(storage_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Digest archive
    // -----------------------------------------------------------------------

    /// Archive a digest, replacing any earlier digest for the same date.
    /// Returns the digest row ID.
    pub async fn save_digest(&self, digest: &Digest) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let date = digest.date.to_string();
        self.conn
            .execute(
                "INSERT INTO digests (id, digest_date, content, item_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(digest_date) DO UPDATE SET
                   content = excluded.content,
                   item_count = excluded.item_count,
                   created_at = excluded.created_at",
                params![
                    id.as_str(),
                    date.as_str(),
                    digest.content.as_str(),
                    digest.item_count as i64,
                    digest.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;

        let mut rows = self
            .conn
            .query(
                "SELECT id FROM digests WHERE digest_date = ?1",
                params![date.as_str()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => row.get::<String>(0).map_err(storage_err),
            Ok(None) => Err(NewsDigestError::Storage(format!(
                "digest for {date} vanished after upsert"
            ))),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Get the archived digest for a date.
    pub async fn get_digest(&self, date: NaiveDate) -> Result<Option<Digest>> {
        let mut rows = self
            .conn
            .query(
                "SELECT digest_date, content, item_count, created_at FROM digests
                 WHERE digest_date = ?1",
                params![date.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(Digest {
                date: parse_date(&row.get::<String>(0).map_err(storage_err)?)?,
                content: row.get::<String>(1).map_err(storage_err)?,
                item_count: row.get::<i64>(2).map_err(storage_err)? as usize,
                created_at: parse_timestamp(&row.get::<String>(3).map_err(storage_err)?)?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Append one delivery record for an archived digest.
    pub async fn record_delivery(&self, digest_id: &str, record: &DeliveryRecord) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO delivery_records
                   (digest_id, digest_date, user_id, outcome, chunks_sent, error, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    digest_id,
                    record.digest_date.to_string(),
                    record.user_id,
                    record.outcome.as_str(),
                    record.chunks_sent as i64,
                    record.error.as_deref(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// All delivery records filed for a digest date, in insertion order.
    pub async fn list_delivery_records(&self, date: NaiveDate) -> Result<Vec<DeliveryRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT digest_date, user_id, outcome, chunks_sent, error
                 FROM delivery_records WHERE digest_date = ?1 ORDER BY id",
                params![date.to_string()],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let outcome: String = row.get(2).map_err(storage_err)?;
            results.push(DeliveryRecord {
                digest_date: parse_date(&row.get::<String>(0).map_err(storage_err)?)?,
                user_id: row.get::<i64>(1).map_err(storage_err)?,
                outcome: outcome.parse::<DeliveryOutcome>()?,
                chunks_sent: row.get::<i64>(3).map_err(storage_err)? as usize,
                error: row.get::<String>(4).ok(),
            });
        }
        Ok(results)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| NewsDigestError::Storage(format!("invalid timestamp '{s}': {e}")))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    s.parse::<NaiveDate>()
        .map_err(|e| NewsDigestError::Storage(format!("invalid date '{s}': {e}")))
}

/// Convert a database row to a [`Channel`].
fn row_to_channel(row: &libsql::Row) -> Result<Channel> {
    Ok(Channel {
        id: row.get::<i64>(0).map_err(storage_err)?,
        handle: row.get::<String>(1).map_err(storage_err)?,
        title: row.get::<String>(2).map_err(storage_err)?,
        last_checked_at: match row.get::<String>(3).ok() {
            Some(s) => Some(parse_timestamp(&s)?),
            None => None,
        },
    })
}

/// Convert a database row to a [`Subscriber`].
fn row_to_subscriber(row: &libsql::Row) -> Result<Subscriber> {
    let status: String = row.get(2).map_err(storage_err)?;
    Ok(Subscriber {
        user_id: row.get::<i64>(0).map_err(storage_err)?,
        username: row.get::<String>(1).ok(),
        status: status.parse()?,
        added_at: parse_timestamp(&row.get::<String>(3).map_err(storage_err)?)?,
        last_interaction_at: match row.get::<String>(4).ok() {
            Some(s) => Some(parse_timestamp(&s)?),
            None => None,
        },
    })
}

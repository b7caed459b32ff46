use crate::error::Result;
use crate::models::{Label, Message};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{Row, sqlite::SqliteRow};
use std::str::FromStr;

/// Result of saving one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    /// A row with this id already existed.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    pub total: i64,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let schema = include_str!("../schema.sql");
        sqlx::query(schema).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn save_labels(&self, labels: &[Label]) -> Result<()> {
        for label in labels {
            sqlx::query(
                "INSERT INTO labels (id, name, type) VALUES (?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET name=excluded.name, type=excluded.type",
            )
            .bind(&label.id)
            .bind(&label.name)
            .bind(&label.label_type)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Labels sorted by name; `user_only` drops Gmail's own labels.
    pub async fn get_labels(&self, user_only: bool) -> Result<Vec<Label>> {
        let rows = sqlx::query("SELECT id, name, type FROM labels ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        let labels = rows
            .into_iter()
            .map(|row| Label {
                id: row.get(0),
                name: row.get(1),
                label_type: row.get(2),
            })
            .filter(|label| !user_only || !label.is_system())
            .collect();

        Ok(labels)
    }

    pub async fn find_label_id(&self, name: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT id FROM labels WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get(0)))
    }

    /// Stores a message, keyed on its id.
    ///
    /// A full record replaces an earlier partial one for the same id. A
    /// partial record never replaces anything, and a full record never
    /// replaces another full one. Each case is a single statement, so
    /// concurrent saves of one id report exactly one `Inserted`.
    pub async fn save_message(&self, msg: &Message) -> Result<SaveOutcome> {
        let result = if msg.is_partial() {
            sqlx::query(
                "INSERT OR IGNORE INTO messages (id, thread_id, url, date, to_address, cc_address, from_address, subject, body, snippet, label_ids, source, download_started_at)
                 VALUES (?, '', '', NULL, '', '', '', ?, '', '', '[]', '', ?)",
            )
            .bind(&msg.id)
            .bind(&msg.subject)
            .bind(msg.download_started_at.timestamp())
            .execute(&self.pool)
            .await?
        } else {
            let label_ids = serde_json::to_string(&msg.label_ids)?;
            sqlx::query(
                "INSERT INTO messages (id, thread_id, url, date, to_address, cc_address, from_address, subject, body, snippet, label_ids, source, download_started_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET thread_id=excluded.thread_id, url=excluded.url, date=excluded.date,
                 to_address=excluded.to_address, cc_address=excluded.cc_address, from_address=excluded.from_address,
                 subject=excluded.subject, body=excluded.body, snippet=excluded.snippet, label_ids=excluded.label_ids,
                 source=excluded.source, download_started_at=excluded.download_started_at
                 WHERE messages.date IS NULL",
            )
            .bind(&msg.id)
            .bind(&msg.thread_id)
            .bind(&msg.url)
            .bind(msg.date.map(|d| d.timestamp()))
            .bind(&msg.to)
            .bind(&msg.cc)
            .bind(&msg.from)
            .bind(&msg.subject)
            .bind(&msg.body)
            .bind(&msg.snippet)
            .bind(label_ids)
            .bind(&msg.source)
            .bind(msg.download_started_at.timestamp())
            .execute(&self.pool)
            .await?
        };

        Ok(if result.rows_affected() == 0 {
            SaveOutcome::Duplicate
        } else {
            SaveOutcome::Inserted
        })
    }

    pub async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let row = sqlx::query(
            "SELECT id, thread_id, url, date, to_address, cc_address, from_address, subject, body, snippet, label_ids, source, download_started_at
             FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| message_from_row(&r)).transpose()
    }

    /// Date range and count of complete records.
    pub async fn stats(&self) -> Result<Stats> {
        let row = sqlx::query(
            "SELECT MIN(date), MAX(date), COUNT(*) FROM messages WHERE date IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Stats {
            earliest: row.get::<Option<i64>, _>(0).and_then(from_seconds),
            latest: row.get::<Option<i64>, _>(1).and_then(from_seconds),
            total: row.get(2),
        })
    }
}

fn from_seconds(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    let label_ids: String = row.get(10);
    Ok(Message {
        id: row.get(0),
        thread_id: row.get(1),
        url: row.get(2),
        date: row.get::<Option<i64>, _>(3).and_then(from_seconds),
        to: row.get(4),
        cc: row.get(5),
        from: row.get(6),
        subject: row.get(7),
        body: row.get(8),
        snippet: row.get(9),
        label_ids: serde_json::from_str(&label_ids)?,
        source: row.get(11),
        download_started_at: from_seconds(row.get(12)).unwrap_or_default(),
    })
}

//! SQLite-backed job store: jobs, recipients, sender pools, outbound
//! messages, contact lists and campaigns in one database file.
//! Survives restarts; the boot reconciliation reads from here.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reachly_core::error::{ReachlyError, Result};
use reachly_core::traits::JobStore;
use reachly_core::types::{
    Campaign, ChangeEvent, ChangeOp, Job, JobKind, JobStatus, OutboundMessage, QualityRating,
    Recipient, SenderCandidate,
};
use rusqlite::OptionalExtension;
use rusqlite::types::Value;

use crate::listener::{ChangeSender, publish};

const JOB_COLUMNS: &str = "id, kind, action, payload, status, trigger_time, error, created_at";

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> ReachlyError {
    move |e| ReachlyError::Database(format!("{context}: {e}"))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ReachlyError::Database(format!("bad timestamp '{raw}': {e}")))
}

/// Raw `jobs` row, converted outside the rusqlite closure so parse errors
/// surface as [`ReachlyError`].
struct JobRow {
    id: String,
    kind: String,
    action: String,
    payload: String,
    status: String,
    trigger_time: String,
    error: Option<String>,
    created_at: String,
}

impl JobRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            action: row.get(2)?,
            payload: row.get(3)?,
            status: row.get(4)?,
            trigger_time: row.get(5)?,
            error: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_job(self) -> Result<Job> {
        Ok(Job {
            kind: self.kind.parse()?,
            action: self.action,
            payload: serde_json::from_str(&self.payload)?,
            status: self.status.parse()?,
            trigger_time: parse_time(&self.trigger_time)?,
            error: self.error,
            created_at: parse_time(&self.created_at)?,
            id: self.id,
        })
    }
}

pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
    feed: Option<ChangeSender>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path, feed: Option<ChangeSender>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path).map_err(db_err("DB open"))?;
        Self::init(conn, feed)
    }

    pub fn open_in_memory(feed: Option<ChangeSender>) -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::init(conn, feed)
    }

    fn init(conn: rusqlite::Connection, feed: Option<ChangeSender>) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            feed,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "
            -- Deferred work: campaign fan-outs, campaign logs, workflow logs
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,              -- 'campaign_fanout', 'campaign_log', 'workflow_log'
                action TEXT NOT NULL,            -- handler name
                payload TEXT NOT NULL,           -- JSON
                status TEXT NOT NULL DEFAULT 'PENDING',
                trigger_time TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, id);

            CREATE TABLE IF NOT EXISTS recipients (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                phone TEXT NOT NULL,
                scope_id TEXT NOT NULL,
                last_sender TEXT,                -- sticky sender identity
                last_contacted_at TEXT
            );

            -- Sender phone numbers per project
            CREATE TABLE IF NOT EXISTS senders (
                scope_id TEXT NOT NULL,
                identity TEXT NOT NULL,
                quality_rating TEXT NOT NULL DEFAULT 'UNKNOWN',
                access_credential TEXT NOT NULL,
                PRIMARY KEY (scope_id, identity)
            );

            CREATE TABLE IF NOT EXISTS outbound_messages (
                external_id TEXT PRIMARY KEY,    -- id assigned by the messaging API
                job_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                sender_identity TEXT NOT NULL,
                content TEXT NOT NULL,
                sent_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS contact_list_members (
                list_id TEXT NOT NULL,
                contact_id TEXT NOT NULL,
                added_at TEXT NOT NULL,
                PRIMARY KEY (list_id, contact_id)
            );

            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                scope_id TEXT NOT NULL,
                template TEXT NOT NULL,          -- JSON
                inclusions TEXT NOT NULL DEFAULT '[]',
                exclusions TEXT NOT NULL DEFAULT '[]',
                send_at TEXT,
                personalization TEXT NOT NULL DEFAULT '{}'
            );
            ",
            )
            .map_err(db_err("Migration"))?;
        Ok(())
    }

    fn emit(&self, op: ChangeOp, job: Job) {
        if let Some(feed) = &self.feed {
            publish(feed, ChangeEvent::new(op, job));
        }
    }

    fn load_job(conn: &rusqlite::Connection, id: &str) -> Result<Option<Job>> {
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            [id],
            JobRow::read,
        )
        .optional()
        .map_err(db_err("Load job"))?
        .map(JobRow::into_job)
        .transpose()
    }

    // ─── Seeding (admin / import paths) ──────────────────────

    pub fn put_recipient(&self, recipient: &Recipient) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO recipients (id, name, phone, scope_id, last_sender, last_contacted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    recipient.id,
                    recipient.name,
                    recipient.phone,
                    recipient.scope_id,
                    recipient.last_sender,
                    recipient.last_contacted_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(db_err("Save recipient"))?;
        Ok(())
    }

    pub fn put_sender(&self, scope_id: &str, sender: &SenderCandidate) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO senders (scope_id, identity, quality_rating, access_credential)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    scope_id,
                    sender.identity,
                    sender.quality_rating.as_str(),
                    sender.access_credential,
                ],
            )
            .map_err(db_err("Save sender"))?;
        Ok(())
    }

    pub fn put_campaign(&self, campaign: &Campaign) -> Result<()> {
        let template = serde_json::to_string(&campaign.template)?;
        let inclusions = serde_json::to_string(&campaign.inclusions)?;
        let exclusions = serde_json::to_string(&campaign.exclusions)?;
        let personalization = serde_json::to_string(&campaign.personalization)?;
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO campaigns (id, scope_id, template, inclusions, exclusions, send_at, personalization)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    campaign.id,
                    campaign.scope_id,
                    template,
                    inclusions,
                    exclusions,
                    campaign.send_at.map(|t| t.to_rfc3339()),
                    personalization,
                ],
            )
            .map_err(db_err("Save campaign"))?;
        Ok(())
    }

    /// Job counts per status, for dashboards.
    pub fn status_counts(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")
            .map_err(db_err("Count jobs"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(db_err("Count jobs"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Count jobs"))
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn fetch_jobs(
        &self,
        kinds: &[JobKind],
        statuses: &[JobStatus],
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Job>> {
        if kinds.is_empty() || statuses.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let marks = |n: usize| vec!["?"; n].join(", ");
        let mut sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE kind IN ({}) AND status IN ({})",
            marks(kinds.len()),
            marks(statuses.len())
        );
        let mut values: Vec<Value> = kinds
            .iter()
            .map(|k| Value::Text(k.as_str().to_string()))
            .chain(statuses.iter().map(|s| Value::Text(s.as_str().to_string())))
            .collect();
        if let Some(after) = after_id {
            sql.push_str(" AND id > ?");
            values.push(Value::Text(after.to_string()));
        }
        sql.push_str(" ORDER BY id LIMIT ?");
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&sql).map_err(db_err("Fetch jobs"))?;
            stmt.query_map(rusqlite::params_from_iter(values), JobRow::read)
                .map_err(db_err("Fetch jobs"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err("Fetch jobs"))?
        };
        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn fetch_job(&self, id: &str) -> Result<Option<Job>> {
        Self::load_job(&self.conn.lock(), id)
    }

    async fn insert_jobs(&self, jobs: &[Job]) -> Result<()> {
        let mut inserted = Vec::new();
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction().map_err(db_err("Begin insert"))?;
            let now = Utc::now().to_rfc3339();
            for job in jobs {
                let changed = tx
                    .execute(
                        "INSERT OR IGNORE INTO jobs
                         (id, kind, action, payload, status, trigger_time, error, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        rusqlite::params![
                            job.id,
                            job.kind.as_str(),
                            job.action,
                            job.payload.to_string(),
                            job.status.as_str(),
                            job.trigger_time.to_rfc3339(),
                            job.error,
                            job.created_at.to_rfc3339(),
                            now,
                        ],
                    )
                    .map_err(db_err("Insert job"))?;
                if changed == 1 {
                    inserted.push(job.clone());
                }
            }
            tx.commit().map_err(db_err("Commit insert"))?;
        }
        tracing::debug!("💾 Inserted {}/{} job(s)", inserted.len(), jobs.len());
        for job in inserted {
            self.emit(ChangeOp::Insert, job);
        }
        Ok(())
    }

    async fn update_job_status(&self, id: &str, status: JobStatus, error: Option<&str>) -> Result<()> {
        let updated = {
            let conn = self.conn.lock();
            let changed = conn
                .execute(
                    "UPDATE jobs SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
                    rusqlite::params![status.as_str(), error, Utc::now().to_rfc3339(), id],
                )
                .map_err(db_err("Update job"))?;
            if changed == 0 {
                return Err(ReachlyError::NotFound(format!("job {id}")));
            }
            Self::load_job(&conn, id)?
        };
        if let Some(job) = updated {
            self.emit(ChangeOp::Update, job);
        }
        Ok(())
    }

    async fn fetch_recipient(&self, id: &str) -> Result<Recipient> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT id, name, phone, scope_id, last_sender, last_contacted_at FROM recipients WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err("Load recipient"))?;
        let (id, name, phone, scope_id, last_sender, last_contacted_at) =
            row.ok_or_else(|| ReachlyError::NotFound(format!("recipient {id}")))?;
        Ok(Recipient {
            id,
            name,
            phone,
            scope_id,
            last_sender,
            last_contacted_at: last_contacted_at.as_deref().map(parse_time).transpose()?,
        })
    }

    async fn record_contact(&self, recipient_id: &str, sender_identity: &str, at: DateTime<Utc>) -> Result<()> {
        let changed = self
            .conn
            .lock()
            .execute(
                "UPDATE recipients SET last_sender = ?1, last_contacted_at = ?2 WHERE id = ?3",
                rusqlite::params![sender_identity, at.to_rfc3339(), recipient_id],
            )
            .map_err(db_err("Record contact"))?;
        if changed == 0 {
            return Err(ReachlyError::NotFound(format!("recipient {recipient_id}")));
        }
        Ok(())
    }

    async fn fetch_sender_pool(&self, scope_id: &str) -> Result<Vec<SenderCandidate>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT identity, quality_rating, access_credential FROM senders
                 WHERE scope_id = ?1 ORDER BY identity",
            )
            .map_err(db_err("Load senders"))?;
        let rows = stmt
            .query_map([scope_id], |row| {
                Ok(SenderCandidate {
                    identity: row.get(0)?,
                    quality_rating: QualityRating::parse(&row.get::<_, String>(1)?),
                    access_credential: row.get(2)?,
                })
            })
            .map_err(db_err("Load senders"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Load senders"))
    }

    async fn insert_outbound_message_if_absent(&self, message: OutboundMessage) -> Result<(OutboundMessage, bool)> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO outbound_messages
                 (external_id, job_id, recipient_id, sender_identity, content, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.external_id,
                    message.job_id,
                    message.recipient_id,
                    message.sender_identity,
                    message.content,
                    message.sent_at.to_rfc3339(),
                ],
            )
            .map_err(db_err("Insert outbound"))?;
        if changed == 1 {
            return Ok((message, true));
        }

        let (job_id, recipient_id, sender_identity, content, sent_at) = conn
            .query_row(
                "SELECT job_id, recipient_id, sender_identity, content, sent_at
                 FROM outbound_messages WHERE external_id = ?1",
                [&message.external_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .map_err(db_err("Load outbound"))?;
        let existing = OutboundMessage {
            external_id: message.external_id,
            job_id,
            recipient_id,
            sender_identity,
            content,
            sent_at: parse_time(&sent_at)?,
        };
        Ok((existing, false))
    }

    async fn fetch_campaign(&self, id: &str) -> Result<Campaign> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT id, scope_id, template, inclusions, exclusions, send_at, personalization
                 FROM campaigns WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err("Load campaign"))?;
        let (id, scope_id, template, inclusions, exclusions, send_at, personalization) =
            row.ok_or_else(|| ReachlyError::NotFound(format!("campaign {id}")))?;
        Ok(Campaign {
            id,
            scope_id,
            template: serde_json::from_str(&template)?,
            inclusions: serde_json::from_str(&inclusions)?,
            exclusions: serde_json::from_str(&exclusions)?,
            send_at: send_at.as_deref().map(parse_time).transpose()?,
            personalization: serde_json::from_str(&personalization)?,
        })
    }

    async fn list_members(&self, list_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT contact_id FROM contact_list_members WHERE list_id = ?1 ORDER BY rowid")
            .map_err(db_err("Load list"))?;
        let rows = stmt
            .query_map([list_id], |row| row.get::<_, String>(0))
            .map_err(db_err("Load list"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Load list"))
    }

    async fn add_to_contact_list(&self, contact_id: &str, list_id: &str) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT OR IGNORE INTO contact_list_members (list_id, contact_id, added_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![list_id, contact_id, Utc::now().to_rfc3339()],
            )
            .map_err(db_err("Add to list"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::change_feed;
    use reachly_core::types::{actions, MembershipRule, TemplateRef};

    fn job(id: &str) -> Job {
        Job::new(
            JobKind::CampaignLog,
            actions::SEND_TEMPLATE,
            serde_json::json!({"recipient_id": "r-1"}),
        )
        .with_id(id)
    }

    #[tokio::test]
    async fn test_open_and_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("reachly.db");
        let store = SqliteStore::open(&path, None).unwrap();
        assert!(store.fetch_job("missing").await.unwrap().is_none());
        assert!(path.exists());
        // Reopening runs migrations again without error.
        drop(store);
        SqliteStore::open(&path, None).unwrap();
    }

    #[tokio::test]
    async fn test_job_roundtrip_and_status() {
        let store = SqliteStore::open_in_memory(None).unwrap();
        let original = job("a");
        store.insert_jobs(std::slice::from_ref(&original)).await.unwrap();

        let loaded = store.fetch_job("a").await.unwrap().unwrap();
        assert_eq!(loaded.payload, original.payload);
        assert_eq!(loaded.trigger_time, original.trigger_time);
        assert_eq!(loaded.status, JobStatus::Pending);

        store
            .update_job_status("a", JobStatus::Failed, Some("rate limited"))
            .await
            .unwrap();
        let loaded = store.fetch_job("a").await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("rate limited"));

        assert!(matches!(
            store.update_job_status("nope", JobStatus::Completed, None).await,
            Err(ReachlyError::NotFound(_))
        ));
        assert_eq!(store.status_counts().unwrap(), vec![("FAILED".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_keyset_pagination() {
        let store = SqliteStore::open_in_memory(None).unwrap();
        let jobs: Vec<Job> = (0..5).map(|i| job(&format!("j{i}"))).collect();
        store.insert_jobs(&jobs).await.unwrap();
        store.update_job_status("j1", JobStatus::Completed, None).await.unwrap();

        let first = store
            .fetch_jobs(&JobKind::ALL, &JobStatus::RECONCILABLE, None, 2)
            .await
            .unwrap();
        assert_eq!(first.iter().map(|j| j.id.as_str()).collect::<Vec<_>>(), vec!["j0", "j2"]);
        let rest = store
            .fetch_jobs(&JobKind::ALL, &JobStatus::RECONCILABLE, Some("j2"), 10)
            .await
            .unwrap();
        assert_eq!(rest.iter().map(|j| j.id.as_str()).collect::<Vec<_>>(), vec!["j3", "j4"]);

        let none = store
            .fetch_jobs(&[JobKind::WorkflowLog], &JobStatus::RECONCILABLE, None, 10)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_outbound_unique_external_id() {
        let store = SqliteStore::open_in_memory(None).unwrap();
        let msg = OutboundMessage {
            external_id: "wamid.XYZ".into(),
            job_id: "j-1".into(),
            recipient_id: "r-1".into(),
            sender_identity: "pn-1".into(),
            content: "hello".into(),
            sent_at: Utc::now(),
        };
        let (_, first) = store.insert_outbound_message_if_absent(msg.clone()).await.unwrap();
        let (existing, second) = store
            .insert_outbound_message_if_absent(OutboundMessage { job_id: "j-2".into(), ..msg })
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(existing.job_id, "j-1");
    }

    #[tokio::test]
    async fn test_recipient_and_contact_bookkeeping() {
        let store = SqliteStore::open_in_memory(None).unwrap();
        store
            .put_recipient(&Recipient {
                id: "r-1".into(),
                name: "Hoa".into(),
                phone: "+84900000001".into(),
                scope_id: "proj".into(),
                last_sender: None,
                last_contacted_at: None,
            })
            .unwrap();
        let at = Utc::now();
        store.record_contact("r-1", "pn-9", at).await.unwrap();

        let r = store.fetch_recipient("r-1").await.unwrap();
        assert_eq!(r.last_sender.as_deref(), Some("pn-9"));
        assert_eq!(r.last_contacted_at, Some(at));
        assert!(matches!(
            store.fetch_recipient("r-2").await,
            Err(ReachlyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sender_pool_and_campaign() {
        let store = SqliteStore::open_in_memory(None).unwrap();
        for (id, rating) in [("pn-1", QualityRating::Green), ("pn-2", QualityRating::Red)] {
            store
                .put_sender(
                    "proj",
                    &SenderCandidate {
                        identity: id.into(),
                        quality_rating: rating,
                        access_credential: "tok".into(),
                    },
                )
                .unwrap();
        }
        let pool = store.fetch_sender_pool("proj").await.unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[1].quality_rating, QualityRating::Red);
        assert!(store.fetch_sender_pool("other").await.unwrap().is_empty());

        let campaign = Campaign {
            id: "c-1".into(),
            scope_id: "proj".into(),
            template: TemplateRef {
                name: "promo".into(),
                language: "vi".into(),
                components: serde_json::json!([]),
            },
            inclusions: vec![MembershipRule::ContactList("l-1".into())],
            exclusions: vec![MembershipRule::Contact("r-3".into())],
            send_at: Some(Utc::now()),
            personalization: Default::default(),
        };
        store.put_campaign(&campaign).unwrap();
        assert_eq!(store.fetch_campaign("c-1").await.unwrap(), campaign);

        store.add_to_contact_list("r-2", "l-1").await.unwrap();
        store.add_to_contact_list("r-1", "l-1").await.unwrap();
        store.add_to_contact_list("r-2", "l-1").await.unwrap();
        assert_eq!(store.list_members("l-1").await.unwrap(), vec!["r-2", "r-1"]);
    }

    #[tokio::test]
    async fn test_change_feed() {
        let (tx, mut rx) = change_feed();
        let store = SqliteStore::open_in_memory(Some(tx)).unwrap();
        store.insert_jobs(&[job("f")]).await.unwrap();
        store.insert_jobs(&[job("f")]).await.unwrap();
        store.update_job_status("f", JobStatus::Processing, None).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().op, ChangeOp::Insert);
        let update = rx.recv().await.unwrap();
        assert_eq!(update.op, ChangeOp::Update);
        assert_eq!(update.job.status, JobStatus::Processing);
        assert!(rx.try_recv().is_err());
    }
}

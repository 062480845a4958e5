//! [`SqliteStore`]: the SQLite implementation of [`MembershipStore`] and
//! [`AuditSink`].

use std::{collections::HashMap, path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, types::Value};
use tracing::{debug, trace};

use globalrights_core::{
  SubjectId,
  audit::{AuditSink, ChangeRecord},
  clock::{Clock, SystemClock},
  membership::{
    GroupMembership, MembershipSnapshot, normalize_expiry, validate_group,
    validate_subject,
  },
  store::{AppliedChanges, MembershipChanges, MembershipStore, UpsertOutcome},
};

use crate::{
  Error, Result,
  encode::{
    RawLogEntry, RawMembership, encode_list, encode_log_ts, encode_metadata,
    encode_ts, encode_uuid,
  },
  schema::SCHEMA,
};

/// Subjects per `IN (...)` list; stays well under SQLite's bound-parameter
/// limit.
const BULK_CHUNK: usize = 500;

const PURGE_SQL: &str = "DELETE FROM global_user_groups
   WHERE gug_expiry IS NOT NULL AND gug_expiry <= ?1";

const LIVE: &str = "(gug_expiry IS NULL OR gug_expiry > ?1)";

const DELETE_SQL: &str =
  "DELETE FROM global_user_groups WHERE gug_user = ?1 AND gug_group = ?2";

/// Insert a row, or rewrite its expiry when it differs.
///
/// A plain insert is tried first; on conflict the row is updated only if the
/// stored expiry differs. No lock is held across a read.
fn upsert_row(
  conn: &rusqlite::Connection,
  user: i64,
  group: &str,
  expiry: Option<&str>,
) -> rusqlite::Result<UpsertOutcome> {
  let inserted = conn.execute(
    "INSERT OR IGNORE INTO global_user_groups (gug_user, gug_group, gug_expiry)
     VALUES (?1, ?2, ?3)",
    rusqlite::params![user, group, expiry],
  )?;
  if inserted > 0 {
    return Ok(UpsertOutcome::Inserted);
  }

  let updated = match expiry {
    Some(e) => conn.execute(
      "UPDATE global_user_groups SET gug_expiry = ?3
       WHERE gug_user = ?1 AND gug_group = ?2
         AND (gug_expiry IS NULL OR gug_expiry != ?3)",
      rusqlite::params![user, group, e],
    )?,
    None => conn.execute(
      "UPDATE global_user_groups SET gug_expiry = NULL
       WHERE gug_user = ?1 AND gug_group = ?2
         AND gug_expiry IS NOT NULL",
      rusqlite::params![user, group],
    )?,
  };

  Ok(if updated > 0 { UpsertOutcome::Updated } else { UpsertOutcome::Unchanged })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Global memberships and the rights log, backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  clock:           Arc<dyn Clock>,
  read_only:       bool,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, clock: Arc::new(SystemClock), read_only: false })
  }

  /// Replace the time source used for expiry checks.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Refuse every write with [`Error::ReadOnly`]. Reads keep working.
  pub fn with_read_only(mut self, read_only: bool) -> Self {
    self.read_only = read_only;
    self
  }

  pub fn is_read_only(&self) -> bool { self.read_only }

  /// Close the shared connection. Calls through any remaining clone fail
  /// with a storage-unavailable error afterwards.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }

  fn ensure_writable(&self) -> Result<()> {
    if self.read_only {
      return Err(Error::ReadOnly);
    }
    Ok(())
  }

  fn now_str(&self) -> String { encode_ts(self.clock.now()) }

  /// Run one bulk chunk: live rows for `ids`.
  async fn select_live_for(&self, ids: Vec<i64>) -> Result<Vec<RawMembership>> {
    let now_str = self.now_str();

    let raws = self
      .conn
      .call(move |conn| {
        let placeholders = (0..ids.len())
          .map(|i| format!("?{}", i + 2))
          .collect::<Vec<_>>()
          .join(", ");
        let sql = format!(
          "SELECT gug_user, gug_group, gug_expiry
           FROM global_user_groups
           WHERE {LIVE} AND gug_user IN ({placeholders})"
        );

        let params = std::iter::once(Value::Text(now_str))
          .chain(ids.into_iter().map(Value::Integer));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawMembership::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws)
  }
}

// ─── MembershipStore impl ────────────────────────────────────────────────────

impl MembershipStore for SqliteStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn upsert(
    &self,
    subject: SubjectId,
    group: &str,
    expiry: Option<DateTime<Utc>>,
  ) -> Result<UpsertOutcome> {
    validate_subject(subject)?;
    validate_group(group)?;
    self.ensure_writable()?;

    let user       = subject.get();
    let group_str  = group.to_owned();
    let now_str    = self.now_str();
    let expiry_str = expiry.map(normalize_expiry).map(encode_ts);

    let (purged, outcome) = self
      .conn
      .call(move |conn| {
        // Lazy cleanup, so the insert below never collides with a lapsed row.
        let purged = conn.execute(PURGE_SQL, rusqlite::params![now_str])?;

        let outcome = upsert_row(conn, user, &group_str, expiry_str.as_deref())?;
        Ok((purged, outcome))
      })
      .await?;

    if purged > 0 {
      debug!(purged, "purged expired global memberships");
    }
    trace!(%subject, group, ?outcome, "upsert");
    Ok(outcome)
  }

  async fn remove(&self, subject: SubjectId, group: &str) -> Result<bool> {
    validate_subject(subject)?;
    validate_group(group)?;
    self.ensure_writable()?;

    let user      = subject.get();
    let group_str = group.to_owned();

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(DELETE_SQL, rusqlite::params![user, group_str])?)
      })
      .await?;

    trace!(%subject, group, deleted, "remove");
    Ok(deleted > 0)
  }

  async fn apply_changes(
    &self,
    subject: SubjectId,
    changes: &MembershipChanges,
  ) -> Result<AppliedChanges> {
    validate_subject(subject)?;
    for group in changes.remove.iter().chain(changes.add.iter().map(|(g, _)| g)) {
      validate_group(group)?;
    }
    self.ensure_writable()?;

    let user    = subject.get();
    let now_str = self.now_str();
    let remove  = changes.remove.clone();
    let add: Vec<(String, Option<String>)> = changes
      .add
      .iter()
      .map(|(g, e)| (g.clone(), e.map(normalize_expiry).map(encode_ts)))
      .collect();

    let (purged, applied) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let purged = tx.execute(PURGE_SQL, rusqlite::params![now_str])?;

        let mut applied = AppliedChanges::default();
        for group in remove {
          if tx.execute(DELETE_SQL, rusqlite::params![user, group])? > 0 {
            applied.removed.push(group);
          }
        }
        for (group, expiry) in add {
          if upsert_row(&tx, user, &group, expiry.as_deref())?.changed() {
            applied.added.push(group);
          }
        }

        tx.commit()?;
        Ok((purged, applied))
      })
      .await?;

    if purged > 0 {
      debug!(purged, "purged expired global memberships");
    }
    trace!(%subject, removed = ?applied.removed, added = ?applied.added, "apply changes");
    Ok(applied)
  }

  async fn purge_expired(&self) -> Result<u64> {
    self.ensure_writable()?;
    let now_str = self.now_str();

    let purged = self
      .conn
      .call(move |conn| Ok(conn.execute(PURGE_SQL, rusqlite::params![now_str])?))
      .await?;

    Ok(purged as u64)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_for_subject(&self, subject: SubjectId) -> Result<MembershipSnapshot> {
    if subject.is_anonymous() {
      return Ok(MembershipSnapshot::empty());
    }

    let user    = subject.get();
    let now     = self.clock.now();
    let now_str = encode_ts(now);

    let raws: Vec<RawMembership> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT gug_user, gug_group, gug_expiry
           FROM global_user_groups
           WHERE {LIVE} AND gug_user = ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![now_str, user], RawMembership::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let memberships = raws
      .into_iter()
      .map(RawMembership::into_membership)
      .collect::<Result<Vec<_>>>()?;

    Ok(MembershipSnapshot::from_rows(memberships, now))
  }

  async fn get_bulk_for_subjects(
    &self,
    subjects: &[SubjectId],
  ) -> Result<HashMap<SubjectId, MembershipSnapshot>> {
    let now = self.clock.now();

    let mut ids: Vec<i64> = subjects
      .iter()
      .filter(|s| !s.is_anonymous())
      .map(|s| s.get())
      .collect();
    ids.sort_unstable();
    ids.dedup();

    let mut rows: HashMap<SubjectId, Vec<GroupMembership>> = HashMap::new();
    for chunk in ids.chunks(BULK_CHUNK) {
      for raw in self.select_live_for(chunk.to_vec()).await? {
        let membership = raw.into_membership()?;
        rows.entry(membership.subject).or_default().push(membership);
      }
    }

    Ok(
      subjects
        .iter()
        .map(|s| {
          let snapshot = rows
            .get(s)
            .map(|r| MembershipSnapshot::from_rows(r.iter().cloned(), now))
            .unwrap_or_default();
          (*s, snapshot)
        })
        .collect(),
    )
  }

  async fn get_membership(
    &self,
    subject: SubjectId,
    group: &str,
  ) -> Result<Option<GroupMembership>> {
    if subject.is_anonymous() {
      return Ok(None);
    }

    let user      = subject.get();
    let group_str = group.to_owned();
    let now       = self.clock.now();
    let now_str   = encode_ts(now);

    let raw: Option<RawMembership> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT gug_user, gug_group, gug_expiry
                 FROM global_user_groups
                 WHERE {LIVE} AND gug_user = ?2 AND gug_group = ?3"
              ),
              rusqlite::params![now_str, user, group_str],
              RawMembership::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    let membership = raw.map(RawMembership::into_membership).transpose()?;
    Ok(membership.filter(|m| !m.is_expired(now)))
  }

  async fn list_members(&self, group: &str) -> Result<Vec<GroupMembership>> {
    let group_str = group.to_owned();
    let now_str   = self.now_str();

    let raws: Vec<RawMembership> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT gug_user, gug_group, gug_expiry
           FROM global_user_groups
           WHERE {LIVE} AND gug_group = ?2
           ORDER BY gug_user"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![now_str, group_str], RawMembership::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMembership::into_membership).collect()
  }

  async fn count_for_group(&self, group: &str) -> Result<u64> {
    let group_str = group.to_owned();
    let now_str   = self.now_str();

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "SELECT COUNT(*) FROM global_user_groups WHERE {LIVE} AND gug_group = ?2"
          ),
          rusqlite::params![now_str, group_str],
          |row| row.get(0),
        )?)
      })
      .await?;

    Ok(count as u64)
  }
}

// ─── AuditSink impl ──────────────────────────────────────────────────────────

impl AuditSink for SqliteStore {
  type Error = Error;

  async fn publish(&self, record: &ChangeRecord) -> Result<()> {
    self.ensure_writable()?;

    let log_id_str   = encode_uuid(record.log_id);
    let subject      = record.subject.get();
    let performer    = record.performer.clone();
    let at_str       = encode_log_ts(record.recorded_at);
    let old_groups   = encode_list(&record.old_groups)?;
    let new_groups   = encode_list(&record.new_groups)?;
    let old_metadata = encode_metadata(&record.old_metadata)?;
    let new_metadata = encode_metadata(&record.new_metadata)?;
    let reason       = record.reason.clone();
    let tags         = encode_list(&record.tags)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO global_rights_log (
             log_id, subject, performer, recorded_at,
             old_groups, new_groups, old_metadata, new_metadata,
             reason, tags
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            log_id_str,
            subject,
            performer,
            at_str,
            old_groups,
            new_groups,
            old_metadata,
            new_metadata,
            reason,
            tags,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  async fn entries_for(&self, subject: SubjectId) -> Result<Vec<ChangeRecord>> {
    let user = subject.get();

    let raws: Vec<RawLogEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT
             log_id, subject, performer, recorded_at,
             old_groups, new_groups, old_metadata, new_metadata,
             reason, tags
           FROM global_rights_log
           WHERE subject = ?1
           ORDER BY recorded_at DESC, rowid DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user], RawLogEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLogEntry::into_record).collect()
  }
}

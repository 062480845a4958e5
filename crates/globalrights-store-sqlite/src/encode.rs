//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Expiries and the "now" they are compared with are stored as fixed-width
//! RFC 3339 strings with whole seconds, so SQL text comparison is
//! chronological. Log timestamps keep nanoseconds, also fixed-width. Lists
//! and metadata are compact JSON. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use globalrights_core::{
  SubjectId,
  audit::{ChangeRecord, MembershipMeta},
  membership::GroupMembership,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Timestamps ──────────────────────────────────────────────────────────────

/// Second-precision form used for `gug_expiry` and for comparisons with it.
pub fn encode_ts(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Nanosecond-precision form used for log ordering.
pub fn encode_log_ts(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_ts(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_list(items: &[String]) -> Result<String> {
  Ok(serde_json::to_string(items)?)
}

pub fn decode_list(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_metadata(meta: &[MembershipMeta]) -> Result<String> {
  Ok(serde_json::to_string(meta)?)
}

pub fn decode_metadata(s: &str) -> Result<Vec<MembershipMeta>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `global_user_groups` row.
pub struct RawMembership {
  pub user:   i64,
  pub group:  String,
  pub expiry: Option<String>,
}

impl RawMembership {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user:   row.get(0)?,
      group:  row.get(1)?,
      expiry: row.get(2)?,
    })
  }

  pub fn into_membership(self) -> Result<GroupMembership> {
    let expiry = self.expiry.as_deref().map(decode_ts).transpose()?;
    Ok(GroupMembership::new(SubjectId(self.user), self.group, expiry))
  }
}

/// Raw values read directly from a `global_rights_log` row.
pub struct RawLogEntry {
  pub log_id:       String,
  pub subject:      i64,
  pub performer:    String,
  pub recorded_at:  String,
  pub old_groups:   String,
  pub new_groups:   String,
  pub old_metadata: String,
  pub new_metadata: String,
  pub reason:       String,
  pub tags:         String,
}

impl RawLogEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      log_id:       row.get(0)?,
      subject:      row.get(1)?,
      performer:    row.get(2)?,
      recorded_at:  row.get(3)?,
      old_groups:   row.get(4)?,
      new_groups:   row.get(5)?,
      old_metadata: row.get(6)?,
      new_metadata: row.get(7)?,
      reason:       row.get(8)?,
      tags:         row.get(9)?,
    })
  }

  pub fn into_record(self) -> Result<ChangeRecord> {
    Ok(ChangeRecord {
      log_id:       decode_uuid(&self.log_id)?,
      subject:      SubjectId(self.subject),
      performer:    self.performer,
      recorded_at:  decode_ts(&self.recorded_at)?,
      old_groups:   decode_list(&self.old_groups)?,
      new_groups:   decode_list(&self.new_groups)?,
      old_metadata: decode_metadata(&self.old_metadata)?,
      new_metadata: decode_metadata(&self.new_metadata)?,
      reason:       self.reason,
      tags:         decode_list(&self.tags)?,
    })
  }
}

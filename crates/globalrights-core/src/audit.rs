//! Audit Recorder. Turns before/after snapshots into rights-log records.
//!
//! A change is loggable when the group set differs *or* when any expiry
//! differs; renewing or shortening a membership is audited even though the
//! group set stays the same.

use std::{fmt, future::Future, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Result, SubjectId,
  error::audit_error,
  membership::{GroupMembership, MembershipSnapshot},
};

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Per-group metadata kept alongside the group lists in a log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipMeta {
  pub expiry: Option<DateTime<Utc>>,
}

impl From<&GroupMembership> for MembershipMeta {
  fn from(m: &GroupMembership) -> Self { Self { expiry: m.expiry } }
}

// ─── Diff ────────────────────────────────────────────────────────────────────

/// Group lists and aligned metadata before and after a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDiff {
  pub old_groups:   Vec<String>,
  pub new_groups:   Vec<String>,
  /// `old_metadata[i]` describes `old_groups[i]`.
  pub old_metadata: Vec<MembershipMeta>,
  /// `new_metadata[i]` describes `new_groups[i]`.
  pub new_metadata: Vec<MembershipMeta>,
}

/// Compare two snapshots of the same subject. Returns `None` when both the
/// group set and every expiry are identical.
///
/// The "after" list keeps the surviving groups in their "before" order and
/// appends the newly present ones.
pub fn diff(
  old: &MembershipSnapshot,
  new: &MembershipSnapshot,
) -> Option<SnapshotDiff> {
  if old == new {
    return None;
  }

  let old_groups: Vec<String> = old.groups().map(str::to_owned).collect();
  let new_groups: Vec<String> = old
    .groups()
    .filter(|g| new.contains(g))
    .chain(new.groups().filter(|g| !old.contains(g)))
    .map(str::to_owned)
    .collect();

  let old_metadata = old.iter().map(MembershipMeta::from).collect();
  let new_metadata = new_groups
    .iter()
    .filter_map(|g| new.get(g))
    .map(MembershipMeta::from)
    .collect();

  Some(SnapshotDiff { old_groups, new_groups, old_metadata, new_metadata })
}

// ─── ChangeRecord ────────────────────────────────────────────────────────────

/// Who made a change and why; everything a record needs besides the diff.
#[derive(Debug, Clone)]
pub struct ChangeContext {
  pub subject:     SubjectId,
  pub performer:   String,
  pub reason:      String,
  pub tags:        Vec<String>,
  pub recorded_at: DateTime<Utc>,
}

/// One entry of the global rights log. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
  pub log_id:       Uuid,
  pub subject:      SubjectId,
  pub performer:    String,
  pub recorded_at:  DateTime<Utc>,
  pub old_groups:   Vec<String>,
  pub new_groups:   Vec<String>,
  pub old_metadata: Vec<MembershipMeta>,
  pub new_metadata: Vec<MembershipMeta>,
  pub reason:       String,
  pub tags:         Vec<String>,
}

/// An expiry that changed on a group present both before and after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryChange {
  pub group: String,
  pub old:   Option<DateTime<Utc>>,
  pub new:   Option<DateTime<Utc>>,
}

impl SnapshotDiff {
  pub fn into_record(self, ctx: ChangeContext) -> ChangeRecord {
    ChangeRecord {
      log_id:       Uuid::new_v4(),
      subject:      ctx.subject,
      performer:    ctx.performer,
      recorded_at:  ctx.recorded_at,
      old_groups:   self.old_groups,
      new_groups:   self.new_groups,
      old_metadata: self.old_metadata,
      new_metadata: self.new_metadata,
      reason:       ctx.reason,
      tags:         ctx.tags,
    }
  }
}

impl ChangeRecord {
  pub fn added_groups(&self) -> Vec<&str> {
    self
      .new_groups
      .iter()
      .filter(|g| !self.old_groups.contains(g))
      .map(String::as_str)
      .collect()
  }

  pub fn removed_groups(&self) -> Vec<&str> {
    self
      .old_groups
      .iter()
      .filter(|g| !self.new_groups.contains(g))
      .map(String::as_str)
      .collect()
  }

  pub fn expiry_changes(&self) -> Vec<ExpiryChange> {
    self
      .old_groups
      .iter()
      .zip(&self.old_metadata)
      .filter_map(|(group, old)| {
        let idx = self.new_groups.iter().position(|g| g == group)?;
        let new = self.new_metadata.get(idx)?;
        (old.expiry != new.expiry).then(|| ExpiryChange {
          group: group.clone(),
          old:   old.expiry,
          new:   new.expiry,
        })
      })
      .collect()
  }
}

fn write_groups(
  f: &mut fmt::Formatter<'_>,
  groups: &[String],
  meta: &[MembershipMeta],
) -> fmt::Result {
  if groups.is_empty() {
    return f.write_str("(none)");
  }
  for (i, group) in groups.iter().enumerate() {
    if i > 0 {
      f.write_str(", ")?;
    }
    f.write_str(group)?;
    if let Some(expiry) = meta.get(i).and_then(|m| m.expiry) {
      write!(f, " (until {})", expiry.format("%Y-%m-%d %H:%M UTC"))?;
    }
  }
  Ok(())
}

impl fmt::Display for ChangeRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} changed global group membership for {} from ",
      self.performer, self.subject
    )?;
    write_groups(f, &self.old_groups, &self.old_metadata)?;
    f.write_str(" to ")?;
    write_groups(f, &self.new_groups, &self.new_metadata)?;
    if !self.reason.is_empty() {
      write!(f, ": {}", self.reason)?;
    }
    Ok(())
  }
}

// ─── Sink ────────────────────────────────────────────────────────────────────

/// Append-only destination for [`ChangeRecord`]s.
pub trait AuditSink: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  fn publish<'a>(
    &'a self,
    record: &'a ChangeRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Records about `subject`, newest first.
  fn entries_for(
    &self,
    subject: SubjectId,
  ) -> impl Future<Output = Result<Vec<ChangeRecord>, Self::Error>> + Send + '_;
}

// ─── Recorder ────────────────────────────────────────────────────────────────

/// Diffs snapshots and publishes the resulting record to a sink.
pub struct AuditRecorder<L> {
  sink: Arc<L>,
}

impl<L: AuditSink> AuditRecorder<L> {
  pub fn new(sink: Arc<L>) -> Self { Self { sink } }

  /// Publish a record if `old` and `new` differ. Returns the record that was
  /// published, if any.
  pub async fn record(
    &self,
    old: &MembershipSnapshot,
    new: &MembershipSnapshot,
    ctx: ChangeContext,
  ) -> Result<Option<ChangeRecord>> {
    let Some(changes) = diff(old, new) else {
      debug!(subject = %ctx.subject, "no membership change; nothing to log");
      return Ok(None);
    };

    let record = changes.into_record(ctx);
    self
      .sink
      .publish(&record)
      .await
      .map_err(audit_error)?;
    Ok(Some(record))
  }
}

//! Membership records and per-subject snapshots.
//!
//! A [`GroupMembership`] is one row of the membership table. A
//! [`MembershipSnapshot`] is the set of live rows for one subject at one point
//! in time; it is never persisted on its own.

use std::collections::{BTreeMap, btree_map};

use chrono::{DateTime, SubsecRound as _, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, SubjectId};

/// Longest group name the membership table accepts, in bytes.
pub const MAX_GROUP_NAME_LEN: usize = 255;

// ─── Validation ──────────────────────────────────────────────────────────────

/// Reject ids that cannot own a membership.
pub fn validate_subject(subject: SubjectId) -> Result<()> {
  if subject.is_anonymous() {
    return Err(Error::InvalidSubject(subject.get()));
  }
  Ok(())
}

/// Reject group names the table cannot hold.
pub fn validate_group(group: &str) -> Result<()> {
  if group.is_empty() {
    return Err(Error::EmptyGroupName);
  }
  if group.len() > MAX_GROUP_NAME_LEN {
    return Err(Error::GroupNameTooLong(group.len()));
  }
  Ok(())
}

/// Expiries are persisted with whole-second precision.
pub fn normalize_expiry(expiry: DateTime<Utc>) -> DateTime<Utc> {
  expiry.trunc_subsecs(0)
}

// ─── GroupMembership ─────────────────────────────────────────────────────────

/// One subject's membership in one global group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
  pub subject: SubjectId,
  pub group:   String,
  /// `None` means the membership is permanent.
  pub expiry:  Option<DateTime<Utc>>,
}

impl GroupMembership {
  pub fn new(
    subject: SubjectId,
    group: impl Into<String>,
    expiry: Option<DateTime<Utc>>,
  ) -> Self {
    Self {
      subject,
      group: group.into(),
      expiry: expiry.map(normalize_expiry),
    }
  }

  /// A membership whose expiry is at or before `now` is logically gone,
  /// even while the row is still stored.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expiry.is_some_and(|expiry| expiry <= now)
  }
}

// ─── MembershipSnapshot ──────────────────────────────────────────────────────

/// All live memberships of one subject, keyed (and ordered) by group name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipSnapshot {
  memberships: BTreeMap<String, GroupMembership>,
}

impl MembershipSnapshot {
  pub fn empty() -> Self { Self::default() }

  /// Build a snapshot from stored rows, dropping those expired at `now`.
  pub fn from_rows(
    rows: impl IntoIterator<Item = GroupMembership>,
    now: DateTime<Utc>,
  ) -> Self {
    let memberships = rows
      .into_iter()
      .filter(|m| !m.is_expired(now))
      .map(|m| (m.group.clone(), m))
      .collect();
    Self { memberships }
  }

  pub fn get(&self, group: &str) -> Option<&GroupMembership> {
    self.memberships.get(group)
  }

  pub fn contains(&self, group: &str) -> bool {
    self.memberships.contains_key(group)
  }

  /// Group names in snapshot order.
  pub fn groups(&self) -> impl Iterator<Item = &str> {
    self.memberships.keys().map(String::as_str)
  }

  pub fn iter(&self) -> btree_map::Values<'_, String, GroupMembership> {
    self.memberships.values()
  }

  pub fn len(&self) -> usize { self.memberships.len() }

  pub fn is_empty(&self) -> bool { self.memberships.is_empty() }
}

impl IntoIterator for MembershipSnapshot {
  type Item = GroupMembership;
  type IntoIter = btree_map::IntoValues<String, GroupMembership>;

  fn into_iter(self) -> Self::IntoIter { self.memberships.into_values() }
}

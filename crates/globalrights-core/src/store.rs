//! The `MembershipStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `globalrights-store-sqlite`). The resolver, the rights service and the
//! HTTP layer depend on this abstraction, not on any concrete backend.

use std::{collections::HashMap, future::Future};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  SubjectId,
  membership::{GroupMembership, MembershipSnapshot},
};

// ─── Upsert outcome ──────────────────────────────────────────────────────────

/// What an [`MembershipStore::upsert`] did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
  /// No row existed; one was inserted.
  Inserted,
  /// A row existed with a different (or lapsed) expiry and was rewritten.
  Updated,
  /// A row with the same expiry already existed, or a concurrent writer
  /// removed it between the insert and the update. Not an error.
  Unchanged,
}

impl UpsertOutcome {
  /// Whether any row was affected.
  pub fn changed(self) -> bool { !matches!(self, Self::Unchanged) }
}

// ─── Batches ─────────────────────────────────────────────────────────────────

/// Removals and additions for one subject, applied as a unit by
/// [`MembershipStore::apply_changes`]. Removals run first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipChanges {
  pub remove: Vec<String>,
  pub add:    Vec<(String, Option<DateTime<Utc>>)>,
}

/// The groups a batch actually touched, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedChanges {
  /// Groups whose row was deleted.
  pub removed: Vec<String>,
  /// Groups whose upsert reported [`UpsertOutcome::changed`].
  pub added:   Vec<String>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Persistence for `(subject, group, expiry)` rows.
///
/// `(subject, group)` is unique. Rows whose expiry has passed are invisible
/// to every read and are physically deleted by [`purge_expired`], which runs
/// before each upsert and may also run on a schedule.
///
/// Reads for anonymous subjects return empty results without touching
/// storage. Writes validate their arguments before any I/O.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
///
/// [`purge_expired`]: MembershipStore::purge_expired
pub trait MembershipStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert a membership, or rewrite the expiry of an existing one.
  ///
  /// A plain insert is attempted first; if it conflicts, the row is updated
  /// only when its stored expiry differs from `expiry`. No lock is held
  /// between the two statements.
  fn upsert<'a>(
    &'a self,
    subject: SubjectId,
    group: &'a str,
    expiry: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + 'a;

  /// Delete a membership. Returns `false` when there was nothing to delete.
  fn remove<'a>(
    &'a self,
    subject: SubjectId,
    group: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Apply every removal and upsert in `changes` to `subject`, or none of
  /// them. Expired rows are purged first, as for [`upsert`].
  ///
  /// [`upsert`]: MembershipStore::upsert
  fn apply_changes<'a>(
    &'a self,
    subject: SubjectId,
    changes: &'a MembershipChanges,
  ) -> impl Future<Output = Result<AppliedChanges, Self::Error>> + Send + 'a;

  /// Delete every expired row, for all subjects. Returns the number of rows
  /// deleted. Safe to run repeatedly and concurrently.
  fn purge_expired(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// All live memberships of `subject`.
  fn get_for_subject(
    &self,
    subject: SubjectId,
  ) -> impl Future<Output = Result<MembershipSnapshot, Self::Error>> + Send + '_;

  /// Batched [`get_for_subject`](MembershipStore::get_for_subject). Every
  /// requested id appears in the result, with an empty snapshot when it has
  /// no live memberships.
  fn get_bulk_for_subjects<'a>(
    &'a self,
    subjects: &'a [SubjectId],
  ) -> impl Future<Output = Result<HashMap<SubjectId, MembershipSnapshot>, Self::Error>>
  + Send
  + 'a;

  /// A single live membership, or `None` if absent or expired.
  fn get_membership<'a>(
    &'a self,
    subject: SubjectId,
    group: &'a str,
  ) -> impl Future<Output = Result<Option<GroupMembership>, Self::Error>> + Send + 'a;

  /// Live memberships of `group`, ordered by subject id.
  fn list_members<'a>(
    &'a self,
    group: &'a str,
  ) -> impl Future<Output = Result<Vec<GroupMembership>, Self::Error>> + Send + 'a;

  /// Number of live memberships in `group`.
  fn count_for_group<'a>(
    &'a self,
    group: &'a str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;
}

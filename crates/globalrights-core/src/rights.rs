//! Rights changes: the write path that ties store, permissions and audit
//! together.
//!
//! A change request is validated in full before any I/O, checked against the
//! actor's changeable groups, applied atomically as removals followed by
//! additions, and audited by diffing the subject's snapshot from before and
//! after.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
  Error, Result, SubjectId,
  audit::{AuditRecorder, AuditSink, ChangeContext, ChangeRecord},
  clock::{Clock, SystemClock},
  error::audit_error,
  membership::{MembershipSnapshot, validate_group, validate_subject},
  permission::{ChangeableGroups, PermissionChecker},
  store::{AppliedChanges, MembershipChanges, MembershipStore},
};

// ─── Request / outcome ───────────────────────────────────────────────────────

/// Groups to add and remove for one subject in one audited step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeRequest {
  #[serde(default)]
  pub add:      Vec<String>,
  #[serde(default)]
  pub remove:   Vec<String>,
  /// Expiry per added group. Added groups without an entry are permanent.
  #[serde(default)]
  pub expiries: HashMap<String, DateTime<Utc>>,
  #[serde(default)]
  pub reason:   String,
  /// Change tags attached to the log record.
  #[serde(default)]
  pub tags:     Vec<String>,
}

/// What a [`RightsService::change_groups`] call actually did.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeOutcome {
  /// Groups inserted or whose expiry was rewritten.
  pub added:   Vec<String>,
  /// Groups whose membership row was deleted.
  pub removed: Vec<String>,
  /// The published log record, or `None` if nothing changed.
  pub record:  Option<ChangeRecord>,
}

// ─── Service ─────────────────────────────────────────────────────────────────

pub struct RightsService<S, L, P> {
  store:       Arc<S>,
  recorder:    AuditRecorder<L>,
  sink:        Arc<L>,
  permissions: Arc<P>,
  clock:       Arc<dyn Clock>,
}

impl<S, L, P> RightsService<S, L, P>
where
  S: MembershipStore,
  L: AuditSink,
  P: PermissionChecker,
{
  pub fn new(store: Arc<S>, sink: Arc<L>, permissions: Arc<P>) -> Self {
    Self {
      store,
      recorder: AuditRecorder::new(Arc::clone(&sink)),
      sink,
      permissions,
      clock: Arc::new(SystemClock),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn changeable_groups(&self, actor: &str) -> ChangeableGroups {
    self.permissions.changeable_groups(actor)
  }

  /// Current snapshot of `subject`.
  pub async fn memberships(&self, subject: SubjectId) -> Result<MembershipSnapshot> {
    if subject.is_anonymous() {
      return Ok(MembershipSnapshot::empty());
    }
    self.store.get_for_subject(subject).await.map_err(Into::into)
  }

  /// Rights log entries about `subject`, newest first.
  pub async fn log_entries(&self, subject: SubjectId) -> Result<Vec<ChangeRecord>> {
    self
      .sink
      .entries_for(subject)
      .await
      .map_err(audit_error)
  }

  /// Apply `request` to `subject` on behalf of `actor`.
  pub async fn change_groups(
    &self,
    actor: &str,
    subject: SubjectId,
    request: ChangeRequest,
  ) -> Result<ChangeOutcome> {
    let now = self.clock.now();
    self.validate(subject, &request, now)?;
    self.authorize(actor, &request)?;

    let old = self.memberships(subject).await?;

    let changes = MembershipChanges {
      remove: request.remove.clone(),
      add:    request
        .add
        .iter()
        .map(|group| (group.clone(), request.expiries.get(group).copied()))
        .collect(),
    };
    let AppliedChanges { added, removed } = self
      .store
      .apply_changes(subject, &changes)
      .await
      .map_err(Into::<Error>::into)?;

    let new = self.memberships(subject).await?;
    debug!(%subject, old = ?old, new = ?new, "global memberships before and after");

    let ctx = ChangeContext {
      subject,
      performer: actor.to_string(),
      reason: request.reason,
      tags: request.tags,
      recorded_at: now,
    };
    let record = self.recorder.record(&old, &new, ctx).await?;

    if let Some(record) = &record {
      info!(
        %subject,
        actor,
        log_id = %record.log_id,
        added = ?record.added_groups(),
        removed = ?record.removed_groups(),
        "global groups changed"
      );
    }

    Ok(ChangeOutcome { added, removed, record })
  }

  fn validate(
    &self,
    subject: SubjectId,
    request: &ChangeRequest,
    now: DateTime<Utc>,
  ) -> Result<()> {
    validate_subject(subject)?;
    for group in request.remove.iter().chain(&request.add) {
      validate_group(group)?;
    }
    for group in &request.add {
      if let Some(expiry) = request.expiries.get(group)
        && *expiry <= now
      {
        return Err(Error::ExpiryInPast(group.clone()));
      }
    }
    Ok(())
  }

  fn authorize(&self, actor: &str, request: &ChangeRequest) -> Result<()> {
    let allowed = self.permissions.changeable_groups(actor);
    let denied = |action: &'static str, group: &str| Error::PermissionDenied {
      actor: actor.to_string(),
      action,
      group: group.to_string(),
    };

    if let Some(group) = request.add.iter().find(|g| !allowed.add.contains(g)) {
      return Err(denied("add", group));
    }
    if let Some(group) = request.remove.iter().find(|g| !allowed.remove.contains(g)) {
      return Err(denied("remove", group));
    }
    Ok(())
  }
}

//! Handlers for `/subjects/{id}/...` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/subjects/{id}/groups` | Live memberships, keyed by group |
//! | `POST` | `/subjects/{id}/groups` | Body: [`ChangeRequest`]; needs an [`Actor`] |
//! | `GET`  | `/subjects/{id}/groups/{group}` | `{"member":…,"membership":…}` |
//! | `GET`  | `/subjects/{id}/effective-groups` | Optional `?local=a,b` |
//! | `GET`  | `/subjects/{id}/log` | Newest first |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use globalrights_core::{
  Error as CoreError, SubjectId,
  audit::{AuditSink, ChangeRecord},
  identity::{DirectIdentity, IdentityResolver as _},
  membership::{GroupMembership, MembershipSnapshot},
  permission::PermissionChecker,
  rights::{ChangeOutcome, ChangeRequest},
  store::MembershipStore,
};
use serde::{Deserialize, Serialize};

use crate::{ApiState, actor::Actor, comma_list, error::ApiError};

// ─── Snapshot ─────────────────────────────────────────────────────────────────

/// `GET /subjects/{id}/groups`
pub async fn groups<S, P>(
  State(state): State<ApiState<S, P>>,
  Path(id): Path<i64>,
) -> Result<Json<MembershipSnapshot>, ApiError>
where
  S: MembershipStore + AuditSink,
  P: PermissionChecker,
{
  let snapshot = state.rights.memberships(SubjectId(id)).await?;
  Ok(Json(snapshot))
}

// ─── Change ───────────────────────────────────────────────────────────────────

/// `POST /subjects/{id}/groups`, body: `{"add":["sysop"],"remove":[],...}`
pub async fn change<S, P>(
  State(state): State<ApiState<S, P>>,
  Path(id): Path<i64>,
  actor: Actor,
  Json(body): Json<ChangeRequest>,
) -> Result<Json<ChangeOutcome>, ApiError>
where
  S: MembershipStore + AuditSink,
  P: PermissionChecker,
{
  let outcome = state
    .rights
    .change_groups(actor.name(), SubjectId(id), body)
    .await?;
  Ok(Json(outcome))
}

// ─── Single membership ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MembershipView {
  pub member:     bool,
  pub membership: Option<GroupMembership>,
}

/// `GET /subjects/{id}/groups/{group}`
pub async fn membership<S, P>(
  State(state): State<ApiState<S, P>>,
  Path((id, group)): Path<(i64, String)>,
) -> Result<Json<MembershipView>, ApiError>
where
  S: MembershipStore + AuditSink,
  P: PermissionChecker,
{
  let membership = state
    .rights
    .store()
    .get_membership(SubjectId(id), &group)
    .await
    .map_err(Into::<CoreError>::into)?;
  Ok(Json(MembershipView { member: membership.is_some(), membership }))
}

// ─── Effective groups ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct EffectiveParams {
  /// Comma-separated local group names to merge with, e.g. `user,autoconfirmed`.
  pub local: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EffectiveGroups {
  pub subject: SubjectId,
  pub groups:  Vec<String>,
  pub is_bot:  bool,
}

/// `GET /subjects/{id}/effective-groups[?local=a,b]`
pub async fn effective<S, P>(
  State(state): State<ApiState<S, P>>,
  Path(id): Path<i64>,
  Query(params): Query<EffectiveParams>,
) -> Result<Json<EffectiveGroups>, ApiError>
where
  S: MembershipStore + AuditSink,
  P: PermissionChecker,
{
  let local = comma_list(params.local.as_deref());
  let subject = DirectIdentity.central_id(&id);

  let groups = state
    .resolver
    .effective_groups_for(&DirectIdentity, &id, &local)
    .await?;
  let is_bot = state.resolver.is_bot(subject).await?;

  Ok(Json(EffectiveGroups { subject, groups, is_bot }))
}

// ─── Rights log ───────────────────────────────────────────────────────────────

/// A log record plus its human-readable one-line summary.
#[derive(Debug, Serialize)]
pub struct LogEntry {
  #[serde(flatten)]
  pub record:  ChangeRecord,
  pub summary: String,
}

/// `GET /subjects/{id}/log`
pub async fn log<S, P>(
  State(state): State<ApiState<S, P>>,
  Path(id): Path<i64>,
) -> Result<Json<Vec<LogEntry>>, ApiError>
where
  S: MembershipStore + AuditSink,
  P: PermissionChecker,
{
  let entries = state
    .rights
    .log_entries(SubjectId(id))
    .await?
    .into_iter()
    .map(|record| LogEntry { summary: record.to_string(), record })
    .collect();
  Ok(Json(entries))
}

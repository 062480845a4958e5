//! Handlers for `/groups` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/groups?subjects=1,2` | Snapshots keyed by subject id |
//! | `GET`  | `/groups/{group}/members` | Live memberships, by subject id |
//! | `GET`  | `/groups/{group}/count` | Optional `?local=N` |

use std::collections::BTreeMap;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use globalrights_core::{
  Error as CoreError, SubjectId,
  audit::AuditSink,
  membership::{GroupMembership, MembershipSnapshot},
  permission::PermissionChecker,
  store::MembershipStore,
};
use serde::{Deserialize, Serialize};

use crate::{ApiState, comma_list, error::ApiError};

// ─── Bulk ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct BulkParams {
  pub subjects: Option<String>,
}

/// `GET /groups?subjects=1,2,3`
///
/// Every requested id appears in the response, with an empty object when it
/// holds no live membership.
pub async fn bulk<S, P>(
  State(state): State<ApiState<S, P>>,
  Query(params): Query<BulkParams>,
) -> Result<Json<BTreeMap<SubjectId, MembershipSnapshot>>, ApiError>
where
  S: MembershipStore + AuditSink,
  P: PermissionChecker,
{
  let subjects = comma_list(params.subjects.as_deref())
    .into_iter()
    .map(|s| {
      s.parse::<i64>()
        .map(SubjectId)
        .map_err(|_| ApiError::BadRequest(format!("invalid subject id {s:?}")))
    })
    .collect::<Result<Vec<_>, _>>()?;

  let snapshots = state
    .rights
    .store()
    .get_bulk_for_subjects(&subjects)
    .await
    .map_err(Into::<CoreError>::into)?;

  Ok(Json(snapshots.into_iter().collect()))
}

// ─── Members ──────────────────────────────────────────────────────────────────

/// `GET /groups/{group}/members`
pub async fn members<S, P>(
  State(state): State<ApiState<S, P>>,
  Path(group): Path<String>,
) -> Result<Json<Vec<GroupMembership>>, ApiError>
where
  S: MembershipStore + AuditSink,
  P: PermissionChecker,
{
  let members = state
    .rights
    .store()
    .list_members(&group)
    .await
    .map_err(Into::<CoreError>::into)?;
  Ok(Json(members))
}

// ─── Count ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct CountParams {
  /// The host's own member count for the group, if it has one.
  pub local: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct GroupCount {
  pub group:  String,
  /// `null` for an untracked group queried without `local`.
  pub count:  Option<u64>,
  /// Whether `count` came from global memberships rather than `local`.
  pub global: bool,
}

/// `GET /groups/{group}/count[?local=N]`
pub async fn count<S, P>(
  State(state): State<ApiState<S, P>>,
  Path(group): Path<String>,
  Query(params): Query<CountParams>,
) -> Result<Json<GroupCount>, ApiError>
where
  S: MembershipStore + AuditSink,
  P: PermissionChecker,
{
  let count = state
    .stats
    .member_count(state.rights.store().as_ref(), &group, params.local)
    .await?;
  let global = state.stats.tracks(&group);

  Ok(Json(GroupCount { group, count, global }))
}

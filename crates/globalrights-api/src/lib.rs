//! JSON REST API for global group memberships.
//!
//! Exposes an axum [`Router`] backed by any store that implements both
//! [`MembershipStore`] and [`AuditSink`]. Authentication, TLS, and transport
//! concerns are the caller's responsibility: write routes expect an
//! [`Actor`] in the request extensions.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", globalrights_api::api_router(state))
//! ```

pub mod actor;
pub mod error;
pub mod groups;
pub mod subjects;

use std::sync::Arc;

use axum::{Router, routing::get};
use globalrights_core::{
  audit::AuditSink,
  permission::PermissionChecker,
  resolver::GroupResolver,
  rights::RightsService,
  stats::StatsCorrector,
  store::MembershipStore,
};

pub use actor::Actor;
pub use error::ApiError;

// ─── State ────────────────────────────────────────────────────────────────────

/// Services shared by every handler. One store backs memberships and the
/// rights log alike.
pub struct ApiState<S, P> {
  pub rights:   Arc<RightsService<S, S, P>>,
  pub resolver: GroupResolver<S>,
  pub stats:    Arc<StatsCorrector>,
}

impl<S, P> Clone for ApiState<S, P> {
  fn clone(&self) -> Self {
    Self {
      rights:   Arc::clone(&self.rights),
      resolver: self.resolver.clone(),
      stats:    Arc::clone(&self.stats),
    }
  }
}

impl<S, P> ApiState<S, P>
where
  S: MembershipStore + AuditSink,
  P: PermissionChecker,
{
  /// Default services over `store`: system clock, `globalbot` as the bot
  /// group, and the default tracked statistics groups.
  pub fn new(store: Arc<S>, permissions: Arc<P>) -> Self {
    Self {
      rights:   Arc::new(RightsService::new(
        Arc::clone(&store),
        Arc::clone(&store),
        permissions,
      )),
      resolver: GroupResolver::new(store),
      stats:    Arc::new(StatsCorrector::default()),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, P>(state: ApiState<S, P>) -> Router<()>
where
  S: MembershipStore + AuditSink + 'static,
  P: PermissionChecker + 'static,
{
  Router::new()
    // Per-subject
    .route(
      "/subjects/{id}/groups",
      get(subjects::groups::<S, P>).post(subjects::change::<S, P>),
    )
    .route("/subjects/{id}/groups/{group}", get(subjects::membership::<S, P>))
    .route("/subjects/{id}/effective-groups", get(subjects::effective::<S, P>))
    .route("/subjects/{id}/log", get(subjects::log::<S, P>))
    // Per-group
    .route("/groups", get(groups::bulk::<S, P>))
    .route("/groups/{group}/members", get(groups::members::<S, P>))
    .route("/groups/{group}/count", get(groups::count::<S, P>))
    .with_state(state)
}

/// Split a comma-separated query value, dropping blanks.
pub(crate) fn comma_list(raw: Option<&str>) -> Vec<String> {
  raw
    .map(|s| {
      s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
    })
    .unwrap_or_default()
}

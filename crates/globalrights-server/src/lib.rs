//! HTTP server for global group memberships.
//!
//! Wraps the JSON API from `globalrights-api` with Basic auth, request
//! tracing, and a background purge of expired memberships, all backed by an
//! in-process SQLite store.

pub mod auth;
pub mod permissions;
pub mod sweeper;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, middleware, routing::get};
use globalrights_api::ApiState;
use globalrights_core::{
  resolver::{DEFAULT_BOT_GROUP, GroupResolver},
  rights::RightsService,
  stats::{DEFAULT_TRACKED_GROUPS, StatsCorrector},
};
use globalrights_store_sqlite::SqliteStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{Accounts, require_basic_auth};
use permissions::ConfiguredPermissions;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `GLOBALRIGHTS_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  pub store_path:          PathBuf,
  /// Refuse every write with 503; reads keep working.
  #[serde(default)]
  pub read_only:           bool,
  /// Seconds between purge sweeps. `0` disables the sweeper.
  #[serde(default = "default_purge_interval")]
  pub purge_interval_secs: u64,
  #[serde(default = "default_bot_group")]
  pub bot_group:           String,
  /// Groups whose member counts come from global memberships.
  #[serde(default = "default_tracked_stat_groups")]
  pub tracked_stat_groups: Vec<String>,
  /// Groups that rights holders may grant. Empty means any group.
  #[serde(default)]
  pub known_groups:        Vec<String>,
  #[serde(default)]
  pub accounts:            Vec<AccountConfig>,
}

/// One API account.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
  pub username:      String,
  /// PHC string produced by `--hash-password`.
  pub password_hash: String,
  /// May add and remove global groups.
  #[serde(default)]
  pub global_rights: bool,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8420 }

fn default_purge_interval() -> u64 { 3600 }

fn default_bot_group() -> String { DEFAULT_BOT_GROUP.to_string() }

fn default_tracked_stat_groups() -> Vec<String> {
  DEFAULT_TRACKED_GROUPS.iter().map(|g| g.to_string()).collect()
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state behind the router.
#[derive(Clone)]
pub struct AppState {
  pub store:    Arc<SqliteStore>,
  pub api:      ApiState<SqliteStore, ConfiguredPermissions>,
  pub accounts: Arc<Accounts>,
}

impl AppState {
  /// Wire the services for `store` according to `config`.
  pub fn new(store: SqliteStore, config: &ServerConfig) -> Self {
    let store = Arc::new(store);
    let permissions = Arc::new(ConfiguredPermissions::from_config(config));

    let api = ApiState {
      rights:   Arc::new(RightsService::new(
        Arc::clone(&store),
        Arc::clone(&store),
        permissions,
      )),
      resolver: GroupResolver::new(Arc::clone(&store))
        .with_bot_group(config.bot_group.clone()),
      stats:    Arc::new(StatsCorrector::new(config.tracked_stat_groups.clone())),
    };

    Self {
      store,
      api,
      accounts: Arc::new(Accounts::from_config(&config.accounts)),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the server's axum [`Router`]: the authenticated API plus an open
/// `/health` check, all traced.
pub fn router(state: AppState) -> Router {
  globalrights_api::api_router(state.api)
    .layer(middleware::from_fn_with_state(state.accounts, require_basic_auth))
    .route("/health", get(health))
    .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str { "ok" }

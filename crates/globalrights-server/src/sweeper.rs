//! Background purge of expired memberships.
//!
//! Reads already hide expired rows and every upsert purges first, so the
//! sweep only keeps the table from accumulating dead rows between writes.

use std::{sync::Arc, time::Duration};

use globalrights_core::store::MembershipStore;
use tokio::sync::watch;
use tracing::{info, trace, warn};

/// Run one purge, logging the outcome. Errors are logged, not returned.
pub async fn sweep_once<S: MembershipStore>(store: &S) -> Option<u64> {
  match store.purge_expired().await {
    Ok(purged) if purged > 0 => {
      info!(purged, "Purge sweep: removed expired memberships");
      Some(purged)
    }
    Ok(_) => {
      trace!("Purge sweep: nothing expired");
      Some(0)
    }
    Err(e) => {
      warn!(error = %e, "Purge sweep: failed; retrying next cycle");
      None
    }
  }
}

/// Purge every `interval` until `shutdown` flips to `true` or its sender is
/// dropped.
pub async fn run_purge_loop<S: MembershipStore>(
  store: Arc<S>,
  interval: Duration,
  mut shutdown: watch::Receiver<bool>,
) {
  info!(interval_secs = interval.as_secs(), "Purge sweep loop started");

  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

  loop {
    let stopping = *shutdown.borrow();
    if stopping {
      break;
    }

    tokio::select! {
      _ = ticker.tick() => {
        sweep_once(store.as_ref()).await;
      }
      changed = shutdown.changed() => {
        if changed.is_err() {
          break;
        }
      }
    }
  }

  info!("Purge sweep loop stopped");
}

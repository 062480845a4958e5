//! Member-count correction for site statistics.
//!
//! Local statistics only count local memberships. For groups that are
//! handed out globally the displayed figure is replaced with the global
//! count.

use std::collections::BTreeSet;

use crate::{Error, Result, store::MembershipStore};

/// Groups whose statistics come from the global table by default.
pub const DEFAULT_TRACKED_GROUPS: [&str; 2] = ["staff", "globalbot"];

#[derive(Debug, Clone)]
pub struct StatsCorrector {
  tracked: BTreeSet<String>,
}

impl Default for StatsCorrector {
  fn default() -> Self {
    Self::new(DEFAULT_TRACKED_GROUPS.map(String::from))
  }
}

impl StatsCorrector {
  pub fn new(tracked: impl IntoIterator<Item = String>) -> Self {
    Self { tracked: tracked.into_iter().collect() }
  }

  pub fn tracks(&self, group: &str) -> bool { self.tracked.contains(group) }

  /// The member count to display for `group`.
  ///
  /// Tracked groups get the global count. Every other group keeps `local`,
  /// which stays `None` when the caller has no local figure.
  pub async fn member_count<S: MembershipStore>(
    &self,
    store: &S,
    group: &str,
    local: Option<u64>,
  ) -> Result<Option<u64>> {
    if !self.tracks(group) {
      return Ok(local);
    }
    let global = store.count_for_group(group).await.map_err(Into::<Error>::into)?;
    Ok(Some(global))
  }
}

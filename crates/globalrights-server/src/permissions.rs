//! Permission checker driven by the configured accounts.

use std::collections::BTreeSet;

use globalrights_core::permission::{ChangeableGroups, PermissionChecker};

use crate::ServerConfig;

/// Accounts flagged `global_rights` may add and remove every known group.
/// An empty `known_groups` list means every group. Other accounts may change
/// nothing.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredPermissions {
  rights_holders: BTreeSet<String>,
  known_groups:   BTreeSet<String>,
}

impl ConfiguredPermissions {
  pub fn from_config(config: &ServerConfig) -> Self {
    Self {
      rights_holders: config
        .accounts
        .iter()
        .filter(|a| a.global_rights)
        .map(|a| a.username.clone())
        .collect(),
      known_groups:   config.known_groups.iter().cloned().collect(),
    }
  }
}

impl PermissionChecker for ConfiguredPermissions {
  fn changeable_groups(&self, actor: &str) -> ChangeableGroups {
    if !self.rights_holders.contains(actor) {
      return ChangeableGroups::none();
    }
    if self.known_groups.is_empty() {
      ChangeableGroups::all()
    } else {
      ChangeableGroups::only(self.known_groups.iter().cloned())
    }
  }
}

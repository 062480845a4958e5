//! Which groups an actor may hand out or take away.
//!
//! The decision itself lives outside this crate; the rights service only asks.

use std::collections::BTreeSet;

/// A set of group names, or every group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSet {
  All,
  Only(BTreeSet<String>),
}

impl GroupSet {
  pub fn empty() -> Self { Self::Only(BTreeSet::new()) }

  pub fn contains(&self, group: &str) -> bool {
    match self {
      Self::All => true,
      Self::Only(groups) => groups.contains(group),
    }
  }
}

/// The groups an actor may add to and remove from a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeableGroups {
  pub add:    GroupSet,
  pub remove: GroupSet,
}

impl ChangeableGroups {
  pub fn none() -> Self { Self { add: GroupSet::empty(), remove: GroupSet::empty() } }

  pub fn all() -> Self { Self { add: GroupSet::All, remove: GroupSet::All } }

  /// Both directions restricted to the same set.
  pub fn only(groups: impl IntoIterator<Item = String>) -> Self {
    let set: BTreeSet<String> = groups.into_iter().collect();
    Self { add: GroupSet::Only(set.clone()), remove: GroupSet::Only(set) }
  }
}

/// Decides what an authenticated actor may change.
pub trait PermissionChecker: Send + Sync {
  fn changeable_groups(&self, actor: &str) -> ChangeableGroups;
}

/// Grants everything to everyone. For tests and trusted embedders.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
  fn changeable_groups(&self, _actor: &str) -> ChangeableGroups {
    ChangeableGroups::all()
  }
}

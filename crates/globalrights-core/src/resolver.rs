//! Group Resolver: the read view over a [`MembershipStore`].
//!
//! Holds no state of its own. Merging global groups into a subject's local
//! groups is a set union done here on request; nothing is cached.

use std::{collections::BTreeSet, sync::Arc};

use crate::{
  Error, Result, SubjectId, identity::IdentityResolver, store::MembershipStore,
};

/// Group that marks a subject as a bot on every wiki.
pub const DEFAULT_BOT_GROUP: &str = "globalbot";

/// Read-only queries over live global memberships.
pub struct GroupResolver<S> {
  store:     Arc<S>,
  bot_group: String,
}

impl<S> Clone for GroupResolver<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), bot_group: self.bot_group.clone() }
  }
}

impl<S: MembershipStore> GroupResolver<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, bot_group: DEFAULT_BOT_GROUP.to_string() }
  }

  pub fn with_bot_group(mut self, group: impl Into<String>) -> Self {
    self.bot_group = group.into();
    self
  }

  pub fn bot_group(&self) -> &str { &self.bot_group }

  /// Names of the live global groups of `subject`.
  pub async fn effective_groups(
    &self,
    subject: SubjectId,
  ) -> Result<BTreeSet<String>> {
    if subject.is_anonymous() {
      return Ok(BTreeSet::new());
    }
    let snapshot = self
      .store
      .get_for_subject(subject)
      .await
      .map_err(Into::<Error>::into)?;
    Ok(snapshot.groups().map(str::to_owned).collect())
  }

  /// Whether `subject` holds a live membership in `group`.
  pub async fn is_in_group(&self, subject: SubjectId, group: &str) -> Result<bool> {
    if subject.is_anonymous() {
      return Ok(false);
    }
    let membership = self
      .store
      .get_membership(subject, group)
      .await
      .map_err(Into::<Error>::into)?;
    Ok(membership.is_some())
  }

  /// Whether `subject` is a global bot.
  pub async fn is_bot(&self, subject: SubjectId) -> Result<bool> {
    self.is_in_group(subject, &self.bot_group).await
  }

  /// Resolve `user` to its central id and merge its global groups into
  /// `local`.
  pub async fn effective_groups_for<I>(
    &self,
    identity: &I,
    user: &I::User,
    local: &[String],
  ) -> Result<Vec<String>>
  where
    I: IdentityResolver,
  {
    let subject = identity.central_id(user);
    let global = self.effective_groups(subject).await?;
    Ok(merge_effective_groups(local.iter().cloned(), global))
  }
}

/// Union of local and global group names, local first, duplicates dropped
/// while keeping first occurrence order.
pub fn merge_effective_groups(
  local: impl IntoIterator<Item = String>,
  global: impl IntoIterator<Item = String>,
) -> Vec<String> {
  let mut seen = BTreeSet::new();
  local
    .into_iter()
    .chain(global)
    .filter(|group| seen.insert(group.clone()))
    .collect()
}

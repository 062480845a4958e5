//! In-memory store and sink for unit tests.

use std::{
  collections::{BTreeMap, HashMap},
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use chrono::{DateTime, Utc};

use crate::{
  Error, Result, SubjectId,
  audit::{AuditSink, ChangeRecord},
  clock::Clock,
  membership::{GroupMembership, MembershipSnapshot, validate_group, validate_subject},
  store::{AppliedChanges, MembershipChanges, MembershipStore, UpsertOutcome},
};

type Rows = BTreeMap<(SubjectId, String), Option<DateTime<Utc>>>;

/// Rows keyed by `(subject, group)`, plus a counter of calls that reached
/// the store.
///
/// Writes to the group named by [`fail_writes_to`](Self::fail_writes_to)
/// fail with [`Error::StorageUnavailable`], and [`go_offline`](Self::go_offline)
/// makes log reads fail the same way.
pub struct MemoryStore {
  rows:    Mutex<Rows>,
  log:     Mutex<Vec<ChangeRecord>>,
  clock:   Arc<dyn Clock>,
  calls:   AtomicUsize,
  failing: Mutex<Option<String>>,
  offline: AtomicBool,
}

impl MemoryStore {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      rows: Mutex::default(),
      log: Mutex::default(),
      clock,
      calls: AtomicUsize::new(0),
      failing: Mutex::default(),
      offline: AtomicBool::new(false),
    }
  }

  pub fn fail_writes_to(&self, group: &str) {
    *self.failing.lock().unwrap() = Some(group.to_string());
  }

  pub fn go_offline(&self) { self.offline.store(true, Ordering::SeqCst); }

  /// Every stored group of `subject`, expired or not.
  pub fn stored_groups(&self, subject: SubjectId) -> Vec<String> {
    let rows = self.rows.lock().unwrap();
    rows.keys().filter(|(s, _)| *s == subject).map(|(_, g)| g.clone()).collect()
  }

  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

  pub fn log(&self) -> Vec<ChangeRecord> { self.log.lock().unwrap().clone() }

  fn hit(&self) { self.calls.fetch_add(1, Ordering::SeqCst); }

  fn snapshot(&self, subject: SubjectId) -> MembershipSnapshot {
    let rows = self.rows.lock().unwrap();
    let live = rows
      .iter()
      .filter(|((s, _), _)| *s == subject)
      .map(|((s, g), e)| GroupMembership::new(*s, g.clone(), *e));
    MembershipSnapshot::from_rows(live, self.clock.now())
  }

  fn check_writable(&self, group: &str) -> Result<()> {
    match self.failing.lock().unwrap().as_deref() {
      Some(failing) if failing == group => {
        Err(Error::StorageUnavailable(format!("writes to {group} are failing")))
      }
      _ => Ok(()),
    }
  }
}

fn upsert_row(
  rows: &mut Rows,
  subject: SubjectId,
  group: &str,
  expiry: Option<DateTime<Utc>>,
) -> UpsertOutcome {
  let expiry = GroupMembership::new(subject, group, expiry).expiry;
  match rows.get_mut(&(subject, group.to_string())) {
    None => {
      rows.insert((subject, group.to_string()), expiry);
      UpsertOutcome::Inserted
    }
    Some(stored) if *stored != expiry => {
      *stored = expiry;
      UpsertOutcome::Updated
    }
    Some(_) => UpsertOutcome::Unchanged,
  }
}

impl MembershipStore for MemoryStore {
  type Error = crate::Error;

  async fn upsert(
    &self,
    subject: SubjectId,
    group: &str,
    expiry: Option<DateTime<Utc>>,
  ) -> Result<UpsertOutcome> {
    validate_subject(subject)?;
    validate_group(group)?;
    self.check_writable(group)?;
    self.purge_expired().await?;
    Ok(upsert_row(&mut self.rows.lock().unwrap(), subject, group, expiry))
  }

  async fn remove(&self, subject: SubjectId, group: &str) -> Result<bool> {
    validate_subject(subject)?;
    validate_group(group)?;
    self.check_writable(group)?;
    self.hit();
    Ok(self.rows.lock().unwrap().remove(&(subject, group.to_string())).is_some())
  }

  async fn apply_changes(
    &self,
    subject: SubjectId,
    changes: &MembershipChanges,
  ) -> Result<AppliedChanges> {
    validate_subject(subject)?;
    for group in changes.remove.iter().chain(changes.add.iter().map(|(g, _)| g)) {
      validate_group(group)?;
    }
    self.purge_expired().await?;

    // Work on a copy so a failure leaves the table untouched.
    let mut rows = self.rows.lock().unwrap().clone();
    let mut applied = AppliedChanges::default();
    for group in &changes.remove {
      self.check_writable(group)?;
      if rows.remove(&(subject, group.clone())).is_some() {
        applied.removed.push(group.clone());
      }
    }
    for (group, expiry) in &changes.add {
      self.check_writable(group)?;
      if upsert_row(&mut rows, subject, group, *expiry).changed() {
        applied.added.push(group.clone());
      }
    }
    *self.rows.lock().unwrap() = rows;
    Ok(applied)
  }

  async fn purge_expired(&self) -> Result<u64> {
    self.hit();
    let now = self.clock.now();
    let mut rows = self.rows.lock().unwrap();
    let before = rows.len();
    rows.retain(|_, expiry| !expiry.is_some_and(|e| e <= now));
    Ok((before - rows.len()) as u64)
  }

  async fn get_for_subject(&self, subject: SubjectId) -> Result<MembershipSnapshot> {
    if subject.is_anonymous() {
      return Ok(MembershipSnapshot::empty());
    }
    self.hit();
    Ok(self.snapshot(subject))
  }

  async fn get_bulk_for_subjects(
    &self,
    subjects: &[SubjectId],
  ) -> Result<HashMap<SubjectId, MembershipSnapshot>> {
    self.hit();
    Ok(subjects.iter().map(|s| (*s, self.snapshot(*s))).collect())
  }

  async fn get_membership(
    &self,
    subject: SubjectId,
    group: &str,
  ) -> Result<Option<GroupMembership>> {
    self.hit();
    Ok(self.snapshot(subject).get(group).cloned())
  }

  async fn list_members(&self, group: &str) -> Result<Vec<GroupMembership>> {
    self.hit();
    let now = self.clock.now();
    let rows = self.rows.lock().unwrap();
    // Keys sort by subject first.
    Ok(
      rows
        .iter()
        .filter(|((_, g), e)| g == group && !e.is_some_and(|e| e <= now))
        .map(|((s, g), e)| GroupMembership::new(*s, g.clone(), *e))
        .collect(),
    )
  }

  async fn count_for_group(&self, group: &str) -> Result<u64> {
    self.hit();
    let now = self.clock.now();
    let rows = self.rows.lock().unwrap();
    let count = rows
      .iter()
      .filter(|((_, g), e)| g == group && !e.is_some_and(|e| e <= now))
      .count();
    Ok(count as u64)
  }
}

impl AuditSink for MemoryStore {
  type Error = crate::Error;

  async fn publish(&self, record: &ChangeRecord) -> Result<()> {
    self.log.lock().unwrap().push(record.clone());
    Ok(())
  }

  async fn entries_for(&self, subject: SubjectId) -> Result<Vec<ChangeRecord>> {
    if self.offline.load(Ordering::SeqCst) {
      return Err(Error::StorageUnavailable("log is offline".into()));
    }
    let log = self.log.lock().unwrap();
    Ok(log.iter().rev().filter(|r| r.subject == subject).cloned().collect())
  }
}

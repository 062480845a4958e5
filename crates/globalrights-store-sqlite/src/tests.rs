//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use globalrights_core::{
  SubjectId,
  audit::AuditSink,
  clock::ManualClock,
  permission::AllowAll,
  rights::{ChangeRequest, RightsService},
  store::{AppliedChanges, MembershipChanges, MembershipStore, UpsertOutcome},
};

use crate::{Error, SqliteStore};

fn start() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() }

async fn store() -> (SqliteStore, Arc<ManualClock>) {
  let clock = Arc::new(ManualClock::new(start()));
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
    .with_clock(clock.clone());
  (store, clock)
}

// ─── Upsert / remove / purge ─────────────────────────────────────────────────

#[tokio::test]
async fn membership_lifecycle() {
  let (s, clock) = store().await;
  let subject = SubjectId(42);

  let outcome = s.upsert(subject, "sysop", None).await.unwrap();
  assert_eq!(outcome, UpsertOutcome::Inserted);

  let bot_expiry = start() + Duration::hours(1);
  s.upsert(subject, "bot", Some(bot_expiry)).await.unwrap();

  let snap = s.get_for_subject(subject).await.unwrap();
  assert_eq!(snap.groups().collect::<Vec<_>>(), ["bot", "sysop"]);
  assert_eq!(snap.get("bot").unwrap().expiry, Some(bot_expiry));

  clock.advance(Duration::hours(2));
  let snap = s.get_for_subject(subject).await.unwrap();
  assert_eq!(snap.groups().collect::<Vec<_>>(), ["sysop"]);

  assert_eq!(s.purge_expired().await.unwrap(), 1);
  assert_eq!(s.purge_expired().await.unwrap(), 0);

  assert!(s.remove(subject, "sysop").await.unwrap());
  assert!(s.get_for_subject(subject).await.unwrap().is_empty());
}

#[tokio::test]
async fn upsert_reports_whether_anything_changed() {
  let (s, _) = store().await;
  let subject = SubjectId(5);
  let expiry = start() + Duration::days(30);

  assert_eq!(
    s.upsert(subject, "staff", Some(expiry)).await.unwrap(),
    UpsertOutcome::Inserted
  );
  assert_eq!(
    s.upsert(subject, "staff", Some(expiry)).await.unwrap(),
    UpsertOutcome::Unchanged
  );
  assert_eq!(
    s.upsert(subject, "staff", Some(expiry + Duration::days(1))).await.unwrap(),
    UpsertOutcome::Updated
  );
  assert_eq!(
    s.upsert(subject, "staff", None).await.unwrap(),
    UpsertOutcome::Updated
  );
  assert_eq!(
    s.upsert(subject, "staff", None).await.unwrap(),
    UpsertOutcome::Unchanged
  );

  let m = s.get_membership(subject, "staff").await.unwrap().unwrap();
  assert_eq!(m.expiry, None);
}

#[tokio::test]
async fn expiry_is_stored_at_second_precision() {
  let (s, _) = store().await;
  let expiry = start() + Duration::hours(3) + Duration::milliseconds(750);

  s.upsert(SubjectId(9), "steward", Some(expiry)).await.unwrap();
  let m = s.get_membership(SubjectId(9), "steward").await.unwrap().unwrap();
  assert_eq!(m.expiry, Some(start() + Duration::hours(3)));

  // Same second, different fraction: nothing to rewrite.
  let outcome = s
    .upsert(SubjectId(9), "steward", Some(expiry + Duration::milliseconds(100)))
    .await
    .unwrap();
  assert_eq!(outcome, UpsertOutcome::Unchanged);
}

#[tokio::test]
async fn membership_expiring_exactly_now_is_gone() {
  let (s, clock) = store().await;
  let expiry = start() + Duration::minutes(10);
  s.upsert(SubjectId(3), "bot", Some(expiry)).await.unwrap();

  clock.set(expiry);
  assert!(s.get_membership(SubjectId(3), "bot").await.unwrap().is_none());
  assert_eq!(s.count_for_group("bot").await.unwrap(), 0);
}

#[tokio::test]
async fn upsert_revives_a_lapsed_row_as_an_insert() {
  let (s, clock) = store().await;
  s.upsert(SubjectId(8), "bot", Some(start() + Duration::minutes(1)))
    .await
    .unwrap();

  clock.advance(Duration::minutes(5));
  let outcome = s.upsert(SubjectId(8), "bot", None).await.unwrap();
  assert_eq!(outcome, UpsertOutcome::Inserted);
  assert!(s.get_for_subject(SubjectId(8)).await.unwrap().contains("bot"));
}

#[tokio::test]
async fn already_expired_upsert_is_purged() {
  let (s, _) = store().await;
  s.upsert(SubjectId(6), "bot", Some(start() - Duration::hours(1)))
    .await
    .unwrap();

  assert!(s.get_for_subject(SubjectId(6)).await.unwrap().is_empty());
  assert_eq!(s.purge_expired().await.unwrap(), 1);
  assert!(!s.get_for_subject(SubjectId(6)).await.unwrap().contains("bot"));
}

#[tokio::test]
async fn remove_missing_row_returns_false() {
  let (s, _) = store().await;
  assert!(!s.remove(SubjectId(1), "sysop").await.unwrap());
}

#[tokio::test]
async fn concurrent_upserts_leave_a_single_row() {
  let (s, _) = store().await;
  let (a, b) = tokio::join!(
    s.upsert(SubjectId(7), "steward", None),
    s.upsert(SubjectId(7), "steward", None),
  );

  let mut outcomes = [a.unwrap(), b.unwrap()];
  outcomes.sort_by_key(|o| o.changed());
  assert_eq!(outcomes, [UpsertOutcome::Unchanged, UpsertOutcome::Inserted]);
  assert_eq!(s.get_for_subject(SubjectId(7)).await.unwrap().len(), 1);
  assert_eq!(s.count_for_group("steward").await.unwrap(), 1);
}

// ─── Validation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn writes_reject_bad_arguments_before_touching_the_database() {
  let (s, _) = store().await;

  let err = s.upsert(SubjectId(0), "sysop", None).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(globalrights_core::Error::InvalidSubject(0))
  ));

  let err = s.upsert(SubjectId(1), "", None).await.unwrap_err();
  assert!(matches!(err, Error::Core(globalrights_core::Error::EmptyGroupName)));

  let long = "g".repeat(256);
  let err = s.remove(SubjectId(1), &long).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(globalrights_core::Error::GroupNameTooLong(256))
  ));
}

#[tokio::test]
async fn anonymous_reads_are_empty() {
  let (s, _) = store().await;
  assert!(s.get_for_subject(SubjectId::ANONYMOUS).await.unwrap().is_empty());
  assert!(s.get_membership(SubjectId(-4), "sysop").await.unwrap().is_none());
}

// ─── Bulk / count ────────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_lookup_covers_every_requested_subject() {
  let (s, clock) = store().await;
  s.upsert(SubjectId(1), "staff", None).await.unwrap();
  s.upsert(SubjectId(1), "sysop", None).await.unwrap();
  s.upsert(SubjectId(2), "bot", Some(start() + Duration::minutes(1)))
    .await
    .unwrap();
  clock.advance(Duration::minutes(2));

  let subjects = [SubjectId(1), SubjectId(2), SubjectId(3), SubjectId(0), SubjectId(1)];
  let bulk = s.get_bulk_for_subjects(&subjects).await.unwrap();

  assert_eq!(bulk.len(), 4);
  assert_eq!(bulk[&SubjectId(1)].groups().collect::<Vec<_>>(), ["staff", "sysop"]);
  assert!(bulk[&SubjectId(2)].is_empty());
  assert!(bulk[&SubjectId(3)].is_empty());
  assert!(bulk[&SubjectId(0)].is_empty());
}

#[tokio::test]
async fn bulk_lookup_spans_chunks() {
  let (s, _) = store().await;
  for id in 1..=1200 {
    if id % 100 == 0 {
      s.upsert(SubjectId(id), "staff", None).await.unwrap();
    }
  }

  let subjects: Vec<SubjectId> = (1..=1200).map(SubjectId).collect();
  let bulk = s.get_bulk_for_subjects(&subjects).await.unwrap();

  assert_eq!(bulk.len(), 1200);
  let members = bulk.values().filter(|snap| snap.contains("staff")).count();
  assert_eq!(members, 12);
}

#[tokio::test]
async fn count_ignores_expired_rows() {
  let (s, clock) = store().await;
  s.upsert(SubjectId(1), "staff", None).await.unwrap();
  s.upsert(SubjectId(2), "staff", Some(start() + Duration::hours(1)))
    .await
    .unwrap();
  s.upsert(SubjectId(3), "sysop", None).await.unwrap();

  assert_eq!(s.count_for_group("staff").await.unwrap(), 2);
  clock.advance(Duration::hours(1));
  assert_eq!(s.count_for_group("staff").await.unwrap(), 1);
  assert_eq!(s.count_for_group("nobody").await.unwrap(), 0);
}

#[tokio::test]
async fn members_are_listed_by_subject_without_expired_rows() {
  let (s, clock) = store().await;
  s.upsert(SubjectId(30), "staff", None).await.unwrap();
  s.upsert(SubjectId(10), "staff", Some(start() + Duration::hours(1)))
    .await
    .unwrap();
  s.upsert(SubjectId(20), "staff", None).await.unwrap();
  s.upsert(SubjectId(15), "sysop", None).await.unwrap();

  let subjects = |members: Vec<globalrights_core::membership::GroupMembership>| {
    members.into_iter().map(|m| m.subject.get()).collect::<Vec<_>>()
  };
  assert_eq!(subjects(s.list_members("staff").await.unwrap()), [10, 20, 30]);

  clock.advance(Duration::hours(1));
  let members = s.list_members("staff").await.unwrap();
  assert!(members.iter().all(|m| m.group == "staff" && m.expiry.is_none()));
  assert_eq!(subjects(members), [20, 30]);
  assert!(s.list_members("nobody").await.unwrap().is_empty());
}

// ─── Batches ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_reports_what_it_touched() {
  let (s, _) = store().await;
  let subject = SubjectId(8);
  s.upsert(subject, "staff", None).await.unwrap();
  s.upsert(subject, "sysop", None).await.unwrap();

  let changes = MembershipChanges {
    remove: vec!["staff".into(), "never-had".into()],
    add:    vec![("sysop".into(), None), ("bot".into(), Some(start() + Duration::days(1)))],
  };
  let applied = s.apply_changes(subject, &changes).await.unwrap();

  assert_eq!(applied, AppliedChanges {
    removed: vec!["staff".into()],
    added:   vec!["bot".into()],
  });
  let snap = s.get_for_subject(subject).await.unwrap();
  assert_eq!(snap.groups().collect::<Vec<_>>(), ["bot", "sysop"]);
}

#[tokio::test]
async fn failed_batch_rolls_back_every_change() {
  let (s, _) = store().await;
  let subject = SubjectId(1);
  s.upsert(subject, "staff", None).await.unwrap();
  s.conn
    .call(|conn| {
      conn.execute_batch(
        "CREATE TRIGGER reject_boom BEFORE INSERT ON global_user_groups
         WHEN NEW.gug_group = 'boom'
         BEGIN SELECT RAISE(ABORT, 'boom is not a group'); END;",
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let changes = MembershipChanges {
    remove: vec!["staff".into()],
    add:    vec![("sysop".into(), None), ("boom".into(), None)],
  };
  let err = s.apply_changes(subject, &changes).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)), "{err}");

  let snap = s.get_for_subject(subject).await.unwrap();
  assert_eq!(snap.groups().collect::<Vec<_>>(), ["staff"]);

  let store = Arc::new(s);
  let service = RightsService::new(store.clone(), store.clone(), Arc::new(AllowAll));
  let request = ChangeRequest {
    add: vec!["sysop".into(), "boom".into()],
    ..Default::default()
  };
  assert!(service.change_groups("Admin", subject, request).await.is_err());
  assert!(!store.get_for_subject(subject).await.unwrap().contains("sysop"));
  assert!(store.entries_for(subject).await.unwrap().is_empty());
}

// ─── Read-only ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn read_only_store_refuses_writes_but_serves_reads() {
  let (s, _) = store().await;
  s.upsert(SubjectId(4), "sysop", None).await.unwrap();

  let ro = s.with_read_only(true);
  assert!(ro.is_read_only());

  let err = ro.upsert(SubjectId(4), "staff", None).await.unwrap_err();
  assert!(matches!(err, Error::ReadOnly));
  assert!(matches!(
    globalrights_core::Error::from(err),
    globalrights_core::Error::StorageUnavailable(_)
  ));
  assert!(ro.remove(SubjectId(4), "sysop").await.is_err());
  assert!(ro.purge_expired().await.is_err());
  let changes = MembershipChanges { remove: vec!["sysop".into()], ..Default::default() };
  assert!(matches!(ro.apply_changes(SubjectId(4), &changes).await, Err(Error::ReadOnly)));

  assert!(ro.get_for_subject(SubjectId(4)).await.unwrap().contains("sysop"));
}

// ─── Rights log ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn rights_service_writes_through_to_the_log() {
  let (s, clock) = store().await;
  let store = Arc::new(s);
  let service = RightsService::new(store.clone(), store.clone(), Arc::new(AllowAll))
    .with_clock(clock.clone());

  let expiry = start() + Duration::days(7);
  let first = service
    .change_groups("Admin", SubjectId(42), ChangeRequest {
      add: vec!["sysop".into(), "bot".into()],
      expiries: [("bot".to_string(), expiry)].into(),
      reason: "promotion".into(),
      tags: vec!["api".into()],
      ..Default::default()
    })
    .await
    .unwrap();
  let first = first.record.expect("first change is logged");

  clock.advance(Duration::minutes(1));
  let second = service
    .change_groups("Admin", SubjectId(42), ChangeRequest {
      remove: vec!["bot".into()],
      ..Default::default()
    })
    .await
    .unwrap()
    .record
    .expect("second change is logged");

  let entries = store.entries_for(SubjectId(42)).await.unwrap();
  assert_eq!(entries, vec![second.clone(), first.clone()]);

  assert_eq!(first.old_groups, Vec::<String>::new());
  assert_eq!(first.new_groups, ["bot", "sysop"].map(String::from));
  assert_eq!(first.new_metadata[0].expiry, Some(expiry));
  assert_eq!(first.tags, ["api"]);
  assert_eq!(second.removed_groups(), ["bot"]);

  assert!(store.entries_for(SubjectId(43)).await.unwrap().is_empty());
}

#[tokio::test]
async fn no_op_change_is_not_logged() {
  let (s, clock) = store().await;
  let store = Arc::new(s);
  let service = RightsService::new(store.clone(), store.clone(), Arc::new(AllowAll))
    .with_clock(clock);

  let request = ChangeRequest { add: vec!["staff".into()], ..Default::default() };
  service
    .change_groups("Admin", SubjectId(11), request.clone())
    .await
    .unwrap();
  let repeat = service
    .change_groups("Admin", SubjectId(11), request)
    .await
    .unwrap();

  assert!(repeat.record.is_none());
  assert!(repeat.added.is_empty());
  assert_eq!(store.entries_for(SubjectId(11)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn closed_connection_makes_the_log_unavailable() {
  let (s, _) = store().await;
  let store = Arc::new(s.clone());
  s.close().await.unwrap();

  let service = RightsService::new(store.clone(), store, Arc::new(AllowAll));
  let err = service.log_entries(SubjectId(42)).await.unwrap_err();
  assert!(matches!(err, globalrights_core::Error::StorageUnavailable(_)), "{err}");
}

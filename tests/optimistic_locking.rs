use chrono::Utc;
use procstore::entity::builtin::{EventLogEntryEntity, TaskEntity};
use procstore::entity::{Entity, EntityKind};
use procstore::{ProcessStore, RetryPolicy, StoreConfig, StoreError, StoreErrorCode};
use std::cell::Cell;
use tempfile::tempdir;

fn open_store(dir: &std::path::Path, retry: RetryPolicy) -> ProcessStore {
    let config = StoreConfig::development(dir.join("engine.db")).with_retry(retry);
    ProcessStore::open(config).expect("open store")
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_wait_ms: 1,
        wait_increase_factor: 1.0,
    }
}

fn seed_task(store: &ProcessStore) -> String {
    store
        .execute(|session| {
            let task = session.insert(TaskEntity::new("review"))?;
            let id = task.borrow().id().unwrap_or_default().to_string();
            Ok(id)
        })
        .expect("seed task")
}

fn load_assignee(store: &ProcessStore, id: &str) -> Option<String> {
    store
        .execute(|session| {
            Ok(session
                .select_by_id::<TaskEntity>(id)?
                .and_then(|task| task.borrow().assignee.clone()))
        })
        .expect("load task")
}

#[test]
fn stale_update_is_rejected_and_first_writer_wins() {
    let dir = tempdir().expect("temp dir");
    let store = open_store(dir.path(), fast_retry(1));
    let id = seed_task(&store);

    let mut first = store.open_session().expect("first session");
    let mut second = store.open_session().expect("second session");
    let a = first
        .select_by_id::<TaskEntity>(&id)
        .expect("select")
        .expect("present");
    let b = second
        .select_by_id::<TaskEntity>(&id)
        .expect("select")
        .expect("present");
    assert_eq!(a.borrow().revision(), b.borrow().revision());

    a.borrow_mut().assignee = Some("alice".into());
    first.commit().expect("first writer commits");

    b.borrow_mut().assignee = Some("bob".into());
    let err = second.commit().expect_err("second writer holds a stale revision");
    match &err {
        StoreError::OptimisticLock { kind, id: conflicted } => {
            assert_eq!(*kind, EntityKind::Task);
            assert_eq!(conflicted, &id);
        }
        other => panic!("expected optimistic lock failure, got {other:?}"),
    }
    assert_eq!(err.code(), StoreErrorCode::OptimisticLock);
    assert!(err.is_retryable());
    assert_eq!(load_assignee(&store, &id).as_deref(), Some("alice"));
}

#[test]
fn stale_delete_is_rejected() {
    let dir = tempdir().expect("temp dir");
    let store = open_store(dir.path(), fast_retry(1));
    let id = seed_task(&store);

    let mut deleter = store.open_session().expect("deleter");
    let stale = deleter
        .select_by_id::<TaskEntity>(&id)
        .expect("select")
        .expect("present");

    store
        .execute(|session| {
            if let Some(task) = session.select_by_id::<TaskEntity>(&id)? {
                task.borrow_mut().priority = 80;
            }
            Ok(())
        })
        .expect("concurrent update");

    deleter.delete(&stale).expect("schedule delete");
    let err = deleter.commit().expect_err("revision moved on");
    assert!(err.is_optimistic_lock());
    assert!(
        store
            .execute(|session| Ok(session.select_by_id::<TaskEntity>(&id)?.is_some()))
            .expect("reload")
    );
}

#[test]
fn failed_commit_writes_nothing() {
    let dir = tempdir().expect("temp dir");
    let store = open_store(dir.path(), fast_retry(1));
    let id = seed_task(&store);

    let mut session = store.open_session().expect("session");
    let stale = session
        .select_by_id::<TaskEntity>(&id)
        .expect("select")
        .expect("present");
    let fresh = session.insert(TaskEntity::new("follow-up")).expect("insert");
    let fresh_id = fresh.borrow().id().unwrap_or_default().to_string();

    store
        .execute(|other| {
            if let Some(task) = other.select_by_id::<TaskEntity>(&id)? {
                task.borrow_mut().assignee = Some("carol".into());
            }
            Ok(())
        })
        .expect("concurrent update");

    stale.borrow_mut().assignee = Some("dave".into());
    assert!(session.commit().is_err());

    let present = store
        .execute(|other| Ok(other.select_by_id::<TaskEntity>(&fresh_id)?.is_some()))
        .expect("reload");
    assert!(!present, "the insert rolled back with the conflicting update");
    assert_eq!(load_assignee(&store, &id).as_deref(), Some("carol"));
}

#[test]
fn rolled_back_commit_keeps_loaded_revisions_for_the_next_attempt() {
    let dir = tempdir().expect("temp dir");
    let store = open_store(dir.path(), fast_retry(1));
    let first_id = seed_task(&store);
    let second_id = seed_task(&store);

    let mut session = store.open_session().expect("session");
    let first = session
        .select_by_id::<TaskEntity>(&first_id)
        .expect("select")
        .expect("present");
    let second = session
        .select_by_id::<TaskEntity>(&second_id)
        .expect("select")
        .expect("present");
    assert_eq!(first.borrow().revision(), Some(1));
    first.borrow_mut().assignee = Some("alice".into());
    second.borrow_mut().assignee = Some("bob".into());

    store
        .execute(|other| {
            if let Some(task) = other.select_by_id::<TaskEntity>(&second_id)? {
                task.borrow_mut().priority = 90;
            }
            Ok(())
        })
        .expect("concurrent update");

    let err = session.commit().expect_err("second task is stale");
    assert!(err.is_optimistic_lock());
    assert_eq!(first.borrow().revision(), Some(1), "rollback restores the loaded revision");
    assert_eq!(load_assignee(&store, &first_id), None);

    second.borrow_mut().assignee = None;
    session.commit().expect("pending change to the first task commits");
    assert_eq!(first.borrow().revision(), Some(2));
    assert_eq!(load_assignee(&store, &first_id).as_deref(), Some("alice"));
    assert_eq!(load_assignee(&store, &second_id), None);
}

#[test]
fn executor_reruns_commands_that_lost_a_race() {
    let dir = tempdir().expect("temp dir");
    let store = open_store(dir.path(), fast_retry(3));
    let id = seed_task(&store);
    let attempts = Cell::new(0);

    store
        .execute(|session| {
            attempts.set(attempts.get() + 1);
            let task = session
                .select_by_id::<TaskEntity>(&id)?
                .ok_or_else(|| StoreError::Validation("task vanished".into()))?;
            if attempts.get() == 1 {
                store.execute(|racer| {
                    if let Some(task) = racer.select_by_id::<TaskEntity>(&id)? {
                        task.borrow_mut().priority = 10;
                    }
                    Ok(())
                })?;
            }
            task.borrow_mut().assignee = Some("erin".into());
            Ok(())
        })
        .expect("second attempt succeeds");

    assert_eq!(attempts.get(), 2);
    assert_eq!(load_assignee(&store, &id).as_deref(), Some("erin"));
}

#[test]
fn executor_gives_up_after_the_attempt_limit() {
    let dir = tempdir().expect("temp dir");
    let store = open_store(dir.path(), fast_retry(2));
    let id = seed_task(&store);
    let attempts = Cell::new(0);

    let err = store
        .execute(|session| {
            attempts.set(attempts.get() + 1);
            let task = session.select_by_id::<TaskEntity>(&id)?;
            store.execute(|racer| {
                if let Some(task) = racer.select_by_id::<TaskEntity>(&id)? {
                    task.borrow_mut().priority += 1;
                }
                Ok(())
            })?;
            if let Some(task) = task {
                task.borrow_mut().assignee = Some("frank".into());
            }
            Ok(())
        })
        .expect_err("every attempt conflicts");

    assert!(err.is_optimistic_lock());
    assert_eq!(attempts.get(), 2);
}

#[test]
fn deleting_an_already_removed_event_log_entry_is_tolerated() {
    let dir = tempdir().expect("temp dir");
    let store = open_store(dir.path(), fast_retry(1));
    let id = store
        .execute(|session| {
            let entry = session.insert(EventLogEntryEntity::new("TASK_CREATED", Utc::now()))?;
            let id = entry.borrow().id().unwrap_or_default().to_string();
            Ok(id)
        })
        .expect("log entry");

    let mut first = store.open_session().expect("first");
    let mut second = store.open_session().expect("second");
    let a = first
        .select_by_id::<EventLogEntryEntity>(&id)
        .expect("select")
        .expect("present");
    let b = second
        .select_by_id::<EventLogEntryEntity>(&id)
        .expect("select")
        .expect("present");
    assert_eq!(a.borrow().revision(), None);

    first.delete(&a).expect("delete a");
    first.commit().expect("first delete");
    second.delete(&b).expect("delete b");
    second.commit().expect("non-revisioned rows have no version to conflict on");
}

use chrono::{DateTime, TimeZone, Utc};
use procstore::entity::builtin::{ExecutionEntity, JobEntity, SUSPENSION_SUSPENDED};
use procstore::{ManualClock, ProcessStore, StoreConfig};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const LOCK_TIME: Duration = Duration::from_secs(300);

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

fn open_store(dir: &std::path::Path, clock: Arc<ManualClock>) -> ProcessStore {
    ProcessStore::builder(StoreConfig::development(dir.join("engine.db")))
        .with_clock(clock)
        .build()
        .expect("open store")
}

fn insert_jobs(store: &ProcessStore, jobs: Vec<JobEntity>) {
    store
        .execute(move |session| {
            for job in jobs.clone() {
                session.insert(job)?;
            }
            Ok(())
        })
        .expect("insert jobs");
}

fn insert_instance(store: &ProcessStore, id: &str, suspension_state: i32) {
    store
        .execute(|session| {
            let mut instance = ExecutionEntity::new().with_id(id).with_process_instance(id);
            instance.suspension_state = suspension_state;
            session.insert(instance)?;
            Ok(())
        })
        .expect("insert process instance");
}

fn lock_owner(store: &ProcessStore, id: &str) -> Option<String> {
    store
        .execute(|session| {
            Ok(session
                .select_by_id::<JobEntity>(id)?
                .and_then(|job| job.borrow().lock_owner.clone()))
        })
        .expect("load job")
}

#[test]
fn racing_executors_split_the_jobs_without_overlap() {
    let dir = tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(start()));
    let store = open_store(dir.path(), clock);
    insert_jobs(
        &store,
        ["j1", "j2", "j3"]
            .into_iter()
            .map(|id| JobEntity::message("async").with_id(id).with_exclusive(false))
            .collect(),
    );

    let (a, b) = std::thread::scope(|scope| {
        let a = scope.spawn(|| store.acquire_jobs("node-a", 5, LOCK_TIME).expect("node-a"));
        let b = scope.spawn(|| store.acquire_jobs("node-b", 5, LOCK_TIME).expect("node-b"));
        (a.join().expect("thread a"), b.join().expect("thread b"))
    });

    let a_ids: HashSet<String> = a.job_ids().into_iter().collect();
    let b_ids: HashSet<String> = b.job_ids().into_iter().collect();
    assert!(a_ids.is_disjoint(&b_ids), "a={a_ids:?} b={b_ids:?}");
    let union: HashSet<String> = a_ids.union(&b_ids).cloned().collect();
    assert_eq!(union.len(), 3, "a={a_ids:?} b={b_ids:?}");

    for id in &a_ids {
        assert_eq!(lock_owner(&store, id).as_deref(), Some("node-a"));
    }
    for id in &b_ids {
        assert_eq!(lock_owner(&store, id).as_deref(), Some("node-b"));
    }
}

#[test]
fn expired_locks_can_be_taken_over() {
    let dir = tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(start()));
    let store = open_store(dir.path(), Arc::clone(&clock));
    insert_jobs(&store, vec![JobEntity::message("async").with_id("j1")]);

    let first = store.acquire_jobs("node-a", 1, LOCK_TIME).expect("node-a");
    assert!(first.contains("j1"));
    assert!(store.acquire_jobs("node-b", 1, LOCK_TIME).expect("node-b").is_empty());

    clock.advance(chrono::Duration::seconds(299));
    assert!(store.acquire_jobs("node-b", 1, LOCK_TIME).expect("still locked").is_empty());

    clock.advance(chrono::Duration::seconds(1));
    let taken = store.acquire_jobs("node-b", 1, LOCK_TIME).expect("after expiry");
    assert_eq!(taken.job_ids(), vec!["j1".to_string()]);
    assert_eq!(lock_owner(&store, "j1").as_deref(), Some("node-b"));
}

#[test]
fn timers_wait_for_their_due_date_and_exhausted_jobs_are_skipped() {
    let dir = tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(start()));
    let store = open_store(dir.path(), Arc::clone(&clock));
    let mut exhausted = JobEntity::message("async").with_id("dead");
    exhausted.retries = 0;
    insert_jobs(
        &store,
        vec![
            JobEntity::timer("timer-fire", start() + chrono::Duration::hours(1)).with_id("timer"),
            exhausted,
        ],
    );

    assert!(store.acquire_jobs("node-a", 5, LOCK_TIME).expect("cycle").is_empty());

    clock.advance(chrono::Duration::hours(1));
    let acquired = store.acquire_jobs("node-a", 5, LOCK_TIME).expect("cycle");
    assert_eq!(acquired.job_ids(), vec!["timer".to_string()]);
}

#[test]
fn exclusive_jobs_of_one_instance_are_locked_together() {
    let dir = tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(start()));
    let store = open_store(dir.path(), clock);
    insert_instance(&store, "pi-1", 1);
    insert_instance(&store, "pi-2", 1);
    insert_instance(&store, "pi-3", SUSPENSION_SUSPENDED);
    insert_jobs(
        &store,
        vec![
            JobEntity::message("async").with_id("a1").with_process_instance("pi-1"),
            JobEntity::message("async").with_id("a2").with_process_instance("pi-1"),
            JobEntity::message("async").with_id("b1").with_process_instance("pi-2"),
            JobEntity::message("async").with_id("c1").with_process_instance("pi-3"),
        ],
    );

    let first = store.acquire_jobs("node-a", 1, LOCK_TIME).expect("first cycle");
    assert_eq!(
        first.batches(),
        &[vec!["a1".to_string(), "a2".to_string()]],
        "the whole exclusive group arrives as one batch"
    );

    let second = store.acquire_jobs("node-b", 5, LOCK_TIME).expect("second cycle");
    assert_eq!(second.job_ids(), vec!["b1".to_string()]);
    assert_eq!(lock_owner(&store, "c1"), None, "suspended instances keep their jobs");
}

#[test]
fn release_clears_only_the_owners_locks() {
    let dir = tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(start()));
    let store = open_store(dir.path(), clock);
    insert_jobs(
        &store,
        ["j1", "j2", "j3"]
            .into_iter()
            .map(|id| JobEntity::message("async").with_id(id).with_exclusive(false))
            .collect(),
    );

    assert_eq!(store.acquire_jobs("node-a", 2, LOCK_TIME).expect("a").len(), 2);
    assert_eq!(store.acquire_jobs("node-b", 2, LOCK_TIME).expect("b").len(), 1);

    assert_eq!(store.release_owned_jobs("node-a").expect("release"), 2);
    assert_eq!(lock_owner(&store, "j1"), None);
    assert_eq!(lock_owner(&store, "j2"), None);
    assert_eq!(lock_owner(&store, "j3").as_deref(), Some("node-b"));

    let again = store.acquire_jobs("node-c", 5, LOCK_TIME).expect("c");
    assert_eq!(again.job_ids(), vec!["j1".to_string(), "j2".to_string()]);
}

mod common;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::{names, publish};
use scdcat::collection::Collection;
use scdcat::error::{CatalogError, TransportError};
use scdcat::persist::{PersistenceMode, Store};
use scdcat::refresh::{pending_marker, Fetch, LocalFetcher, RefreshOutcome};
use scdcat::schema::{Entity, RecordKind};
use scdcat::settings::Settings;
use tempfile::TempDir;

const NEW_DANCE: &str = "insert into dance (id, name, barsperrepeat, type_id) values (6, 'The Newly Published Reel', 32, 1);";
// a dataset on which replaying the marks breaks off
const BLOCK_MARKS: &str = "create trigger block_marks before update on dance begin select raise(abort, 'replay interrupted'); end;";

struct Unreachable;

impl Fetch for Unreachable {
    fn fetch(&self, _destination: &Path) -> Result<u64, TransportError> {
        Err(TransportError::Unreachable("connection refused".to_string()))
    }
}

struct Garbage;

impl Fetch for Garbage {
    fn fetch(&self, destination: &Path) -> Result<u64, TransportError> {
        let page = "<html>not a dataset</html>\n".repeat(64);
        fs::write(destination, &page).map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(page.len() as u64)
    }
}

// removes the dataset itself so that reconnecting cannot succeed
struct Vandal(PathBuf);

impl Fetch for Vandal {
    fn fetch(&self, _destination: &Path) -> Result<u64, TransportError> {
        fs::remove_file(&self.0).map_err(|e| TransportError::Other(e.to_string()))?;
        Err(TransportError::Other("server answered 500".to_string()))
    }
}

// parks the refresh inside the fetch until released
struct Parked {
    started: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl Fetch for Parked {
    fn fetch(&self, _destination: &Path) -> Result<u64, TransportError> {
        let _ = self.started.lock().expect("lock").send(());
        let _ = self.release.lock().expect("lock").recv();
        Err(TransportError::Unreachable("timed out".to_string()))
    }
}

fn settings(dir: &TempDir) -> Settings {
    Settings {
        dataset_path: dir.path().join("database").join("scddata.db"),
        snapshot_path: dir.path().join("database").join("ihave.txt"),
        source: dir.path().join("published.db").to_string_lossy().into_owned(),
        ..Settings::default()
    }
}

/// A file backed collection over the seed, with a few marks set.
fn marked(dir: &TempDir, settings: Settings, fetcher: Box<dyn Fetch>) -> Collection {
    fs::create_dir_all(dir.path().join("database")).expect("dir");
    let _ = fs::remove_file(&settings.dataset_path);
    publish(&settings.dataset_path, "");
    let store = Store::open(PersistenceMode::File(settings.dataset_path.clone())).expect("store");
    let collection = Collection::with_store(store, settings, fetcher);
    collection.set_owned(Entity::Dance, 3, true).expect("own");
    collection.set_tag(Entity::Dance, 3, Some("learn for Tuesday")).expect("tag");
    collection.set_owned(Entity::Album, 1, true).expect("own");
    collection
}

fn owned(collection: &Collection, entity: Entity) -> Vec<String> {
    names(
        &collection
            .search(entity, "", &HashMap::new(), true)
            .expect("query ok"),
    )
}

fn all_dances(collection: &Collection) -> Vec<String> {
    names(
        &collection
            .search(Entity::Dance, "", &HashMap::new(), false)
            .expect("query ok"),
    )
}

#[test]
fn successful_refresh_carries_marks_to_the_new_dataset() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = settings(&dir);
    publish(Path::new(&settings.source), NEW_DANCE);
    let fetcher = Box::new(LocalFetcher::new(&settings.source));
    let snapshot_path = settings.snapshot_path.clone();
    let collection = marked(&dir, settings, fetcher);

    let report = match collection.refresh() {
        RefreshOutcome::Updated(report) => report,
        other => panic!("expected an update, got {other:?}"),
    };
    // dance 3, album 1 and the two recordings on album 1
    assert_eq!(report.captured, Some(4));
    assert_eq!(report.restored, 4);
    assert_eq!(report.digest.len(), 64);
    assert!(report.bytes > 0);

    assert!(all_dances(&collection).contains(&"The Newly Published Reel".to_string()));
    assert_eq!(owned(&collection, Entity::Dance), vec!["Miss Gibson's Strathspey"]);
    assert_eq!(owned(&collection, Entity::Recording).len(), 2);
    let snapshot = fs::read_to_string(&snapshot_path).expect("snapshot file");
    assert!(snapshot.starts_with("dance 3 learn for Tuesday\n"), "{snapshot}");
    assert!(!collection.is_refreshing());
}

#[test]
fn unreachable_source_leaves_everything_in_place() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = settings(&dir);
    let dataset = settings.dataset_path.clone();
    let collection = marked(&dir, settings, Box::new(Unreachable));
    let before = collection.capture().expect("capture");

    assert_eq!(collection.refresh(), RefreshOutcome::Offline);
    assert_eq!(collection.capture().expect("capture"), before);
    assert_eq!(all_dances(&collection).len(), 5);
    assert!(!PathBuf::from(format!("{}.download", dataset.display())).exists());
}

#[test]
fn corrupt_download_fails_with_data_intact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = settings(&dir);
    let dataset = settings.dataset_path.clone();
    let snapshot_path = settings.snapshot_path.clone();
    let collection = marked(&dir, settings, Box::new(Garbage));

    match collection.refresh() {
        RefreshOutcome::Failed(message) => assert!(!message.is_empty()),
        other => panic!("expected a failure, got {other:?}"),
    }
    assert_eq!(owned(&collection, Entity::Dance), vec!["Miss Gibson's Strathspey"]);
    assert_eq!(all_dances(&collection).len(), 5);
    assert!(!PathBuf::from(format!("{}.download", dataset.display())).exists());
    // the previous dataset kept its marks, so no replay is owed
    assert!(!pending_marker(&snapshot_path).exists());
}

#[test]
fn failed_reconnect_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = settings(&dir);
    let fetcher = Box::new(Vandal(settings.dataset_path.clone()));
    let collection = marked(&dir, settings, fetcher);

    assert!(matches!(collection.refresh(), RefreshOutcome::Fatal(_)));
    let err = collection
        .search(Entity::Dance, "", &HashMap::new(), false)
        .expect_err("store is gone");
    assert!(matches!(err, CatalogError::Store(_)));
}

#[test]
fn snapshot_failure_can_abort_or_be_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut settings = settings(&dir);
    publish(Path::new(&settings.source), NEW_DANCE);
    // a directory where the snapshot file should go cannot be replaced by a file
    settings.snapshot_path = dir.path().join("blocked");
    fs::create_dir_all(settings.snapshot_path.join("inner")).expect("blocker");

    settings.abort_on_snapshot_failure = true;
    let fetcher = Box::new(LocalFetcher::new(&settings.source));
    let collection = marked(&dir, settings.clone(), fetcher);
    assert!(matches!(collection.refresh(), RefreshOutcome::Failed(_)));
    assert_eq!(all_dances(&collection).len(), 5, "dataset must not be replaced");
    assert_eq!(owned(&collection, Entity::Dance), vec!["Miss Gibson's Strathspey"]);
    drop(collection);

    settings.abort_on_snapshot_failure = false;
    let fetcher = Box::new(LocalFetcher::new(&settings.source));
    let collection = marked(&dir, settings, fetcher);
    match collection.refresh() {
        RefreshOutcome::Updated(report) => {
            assert_eq!(report.captured, None);
            assert_eq!(report.restored, 0);
        }
        other => panic!("expected an update, got {other:?}"),
    }
    assert_eq!(all_dances(&collection).len(), 6);
    assert!(owned(&collection, Entity::Dance).is_empty());
}

#[test]
fn interrupted_replay_keeps_marks_for_the_next_refresh() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = settings(&dir);
    let source = PathBuf::from(&settings.source);
    publish(&source, BLOCK_MARKS);
    let fetcher = Box::new(LocalFetcher::new(&source));
    let snapshot_path = settings.snapshot_path.clone();
    let collection = marked(&dir, settings, fetcher);

    match collection.refresh() {
        RefreshOutcome::Failed(message) => assert!(message.contains("replay interrupted"), "{message}"),
        other => panic!("expected a failure, got {other:?}"),
    }
    assert!(owned(&collection, Entity::Dance).is_empty());
    assert!(pending_marker(&snapshot_path).exists());
    let kept = fs::read_to_string(&snapshot_path).expect("snapshot file");
    assert!(kept.starts_with("dance 3 learn for Tuesday\n"), "{kept}");

    fs::remove_file(&source).expect("unpublish");
    publish(&source, NEW_DANCE);
    match collection.refresh() {
        RefreshOutcome::Updated(report) => {
            assert_eq!(report.captured, Some(4));
            assert_eq!(report.restored, 4);
        }
        other => panic!("expected an update, got {other:?}"),
    }
    assert_eq!(owned(&collection, Entity::Dance), vec!["Miss Gibson's Strathspey"]);
    assert_eq!(owned(&collection, Entity::Recording).len(), 2);
    assert!(!pending_marker(&snapshot_path).exists());
    let kept = fs::read_to_string(&snapshot_path).expect("snapshot file");
    assert!(kept.starts_with("dance 3 learn for Tuesday\n"), "{kept}");
}

#[test]
fn unfinished_replay_completes_when_the_collection_opens() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = settings(&dir);
    let source = PathBuf::from(&settings.source);
    publish(&source, BLOCK_MARKS);
    let fetcher = Box::new(LocalFetcher::new(&source));
    let collection = marked(&dir, settings.clone(), fetcher);
    assert!(matches!(collection.refresh(), RefreshOutcome::Failed(_)));
    drop(collection);

    let connection = rusqlite::Connection::open(&settings.dataset_path).expect("dataset");
    connection.execute_batch("drop trigger block_marks;").expect("unblock");
    drop(connection);

    let collection = Collection::open(settings.clone()).expect("reopen");
    assert_eq!(owned(&collection, Entity::Dance), vec!["Miss Gibson's Strathspey"]);
    assert_eq!(owned(&collection, Entity::Album), vec!["Scottish Dance Music"]);
    assert!(!pending_marker(&settings.snapshot_path).exists());
}

#[test]
fn in_memory_collections_cannot_refresh() {
    let collection = Collection::in_memory().expect("collection");
    assert!(matches!(collection.refresh(), RefreshOutcome::Failed(_)));
    assert!(collection
        .search(Entity::Album, "", &HashMap::new(), false)
        .expect("still usable")
        .is_empty());
}

#[test]
fn callers_are_turned_away_during_a_refresh() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = settings(&dir);
    let (started_tx, started_rx) = channel();
    let (release_tx, release_rx) = channel();
    let fetcher = Box::new(Parked {
        started: Mutex::new(started_tx),
        release: Mutex::new(release_rx),
    });
    let collection = Arc::new(marked(&dir, settings, fetcher));

    let refreshing = Arc::clone(&collection);
    let handle = thread::spawn(move || refreshing.refresh());
    started_rx.recv().expect("refresh started");

    assert!(collection.is_refreshing());
    assert!(matches!(
        collection.search(Entity::Dance, "", &HashMap::new(), false),
        Err(CatalogError::Busy)
    ));
    assert!(matches!(collection.set_owned(Entity::Dance, 1, true), Err(CatalogError::Busy)));
    assert!(matches!(collection.record(RecordKind::Dance, 3), Err(CatalogError::Busy)));
    assert!(matches!(collection.related("dance", "recordings", 1), Err(CatalogError::Busy)));
    assert!(matches!(collection.capture(), Err(CatalogError::Busy)));
    assert!(matches!(collection.refresh(), RefreshOutcome::Failed(_)));

    release_tx.send(()).expect("release");
    assert_eq!(handle.join().expect("join"), RefreshOutcome::Offline);
    assert!(!collection.is_refreshing());
    assert_eq!(owned(&collection, Entity::Dance), vec!["Miss Gibson's Strathspey"]);
}

#[test]
fn callers_already_waiting_are_turned_away_once_a_refresh_starts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = settings(&dir);
    let collection = Arc::new(marked(&dir, settings, Box::new(Unreachable)));

    // a long query holds the store
    let (held_tx, held_rx) = channel();
    let (release_tx, release_rx) = channel::<()>();
    let holding = Arc::clone(&collection);
    let holder = thread::spawn(move || {
        holding.with_connection(move |_| {
            let _ = held_tx.send(());
            let _ = release_rx.recv();
            Ok(())
        })
    });
    held_rx.recv().expect("store held");

    let (answer_tx, answer_rx) = channel();
    let waiting = Arc::clone(&collection);
    let waiter = thread::spawn(move || {
        let busy = matches!(waiting.record(RecordKind::Dance, 3), Err(CatalogError::Busy));
        let _ = answer_tx.send(busy);
    });
    thread::sleep(Duration::from_millis(50));

    let refreshing = Arc::clone(&collection);
    let refresher = thread::spawn(move || refreshing.refresh());
    for _ in 0..500 {
        if collection.is_refreshing() {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert!(collection.is_refreshing());

    let busy = answer_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("waiting caller answered while the refresh was queued");
    assert!(busy);

    release_tx.send(()).expect("release");
    holder.join().expect("join").expect("held query");
    waiter.join().expect("join");
    assert_eq!(refresher.join().expect("join"), RefreshOutcome::Offline);
    assert_eq!(owned(&collection, Entity::Dance), vec!["Miss Gibson's Strathspey"]);
}

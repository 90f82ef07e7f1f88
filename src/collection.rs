//! The handle callers hold: one store behind a gate plus the refresh machinery.
//!
//! All operations take `&self` so a `Collection` can be shared across threads
//! with an `Arc`. The store is reached through a mutex; while a refresh holds
//! that mutex, other callers are turned away with [`CatalogError::Busy`]
//! instead of queueing behind a download.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{CatalogError, Result};
use crate::ownership::{self, Propagation};
use crate::persist::{PersistenceMode, ResultSet, Store};
use crate::refresh::{fetcher_for, resume_pending, Fetch, Refresh, RefreshOutcome};
use crate::schema::{relation, Entity, RecordKind};
use crate::search;
use crate::settings::Settings;
use crate::snapshot::Snapshot;

pub struct Collection {
    store: Mutex<Store>,
    settings: Settings,
    fetcher: Box<dyn Fetch>,
    refreshing: AtomicBool,
}

const LOCK_RETRY: Duration = Duration::from_millis(1);

// lowers the in-flight flag however the refresh ends
struct RefreshGuard<'c>(&'c AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Collection {
    /// Opens the configured dataset, fetching from the configured source on refresh.
    pub fn open(settings: Settings) -> Result<Self> {
        let mut store = Store::open(PersistenceMode::File(settings.dataset_path.clone()))?;
        if let Err(e) = resume_pending(&mut store, &settings.snapshot_path) {
            warn!(error = %e, "marks from an unfinished replay are still pending");
        }
        let fetcher = fetcher_for(&settings.source, settings.fetch_timeout());
        info!(path = %settings.dataset_path.display(), source = %settings.source, "collection opened");
        Ok(Self::with_store(store, settings, fetcher))
    }
    pub fn with_store(store: Store, settings: Settings, fetcher: Box<dyn Fetch>) -> Self {
        Self {
            store: Mutex::new(store),
            settings,
            fetcher,
            refreshing: AtomicBool::new(false),
        }
    }
    /// An empty, unrefreshable collection.
    pub fn in_memory() -> Result<Self> {
        let settings = Settings::default();
        let fetcher = fetcher_for(&settings.source, settings.fetch_timeout());
        Ok(Self::with_store(Store::open(PersistenceMode::InMemory)?, settings, fetcher))
    }
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }
    // Never parks on the mutex: a refresh raising its flag while we wait turns us away.
    fn lock(&self) -> Result<MutexGuard<'_, Store>> {
        loop {
            if self.is_refreshing() {
                return Err(CatalogError::Busy);
            }
            match self.store.try_lock() {
                Ok(store) => return Ok(store),
                Err(TryLockError::WouldBlock) => thread::sleep(LOCK_RETRY),
                Err(TryLockError::Poisoned(e)) => return Err(CatalogError::Lock(e.to_string())),
            }
        }
    }
    /// Gives direct access to the store, e.g. to load data into an empty one.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut rusqlite::Connection) -> Result<T>) -> Result<T> {
        let mut store = self.lock()?;
        f(store.connection_mut()?)
    }

    // ------------- Queries -------------
    pub fn search(
        &self,
        entity: Entity,
        term: &str,
        facets: &HashMap<String, String>,
        owned_only: bool,
    ) -> Result<ResultSet> {
        let store = self.lock()?;
        let query = search::search(store.connection()?, entity, term, facets, owned_only)?;
        store.run(&query)
    }
    /// Related records by kind name, e.g. `("dance", "recordings", 7)`.
    pub fn related(&self, source: &str, target: &str, id: i64) -> Result<ResultSet> {
        self.related_to(RecordKind::parse(source)?, RecordKind::parse(target)?, id)
    }
    pub fn related_to(&self, source: RecordKind, target: RecordKind, id: i64) -> Result<ResultSet> {
        let query = search::related(relation(source, target)?, id);
        self.lock()?.run(&query)
    }
    pub fn record(&self, kind: RecordKind, id: i64) -> Result<ResultSet> {
        self.lock()?.run(&search::record(kind, id))
    }

    // ------------- Marks -------------
    pub fn set_owned(&self, entity: Entity, id: i64, owned: bool) -> Result<Propagation> {
        let mut store = self.lock()?;
        ownership::set_owned(store.connection_mut()?, entity, id, owned)
    }
    pub fn set_tag(&self, entity: Entity, id: i64, tag: Option<&str>) -> Result<Propagation> {
        let mut store = self.lock()?;
        ownership::set_tag(store.connection_mut()?, entity, id, tag)
    }
    pub fn remove_tag(&self, entity: Entity, id: i64) -> Result<Propagation> {
        let mut store = self.lock()?;
        ownership::remove_tag(store.connection_mut()?, entity, id)
    }
    pub fn capture(&self) -> Result<Snapshot> {
        Snapshot::capture(self.lock()?.connection()?)
    }

    // ------------- Refresh -------------
    /// Replaces the dataset with a freshly fetched one, carrying the marks over.
    pub fn refresh(&self) -> RefreshOutcome {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            return RefreshOutcome::Failed(CatalogError::Busy.to_string());
        }
        let _guard = RefreshGuard(&self.refreshing);
        let mut store = match self.store.lock() {
            Ok(store) => store,
            Err(e) => return RefreshOutcome::Failed(CatalogError::Lock(e.to_string()).to_string()),
        };
        let mut refresh = Refresh::new(&mut store, self.fetcher.as_ref(), &self.settings.snapshot_path)
            .abort_on_snapshot_failure(self.settings.abort_on_snapshot_failure);
        refresh.run()
    }
}

//! Replacing the reference dataset while keeping the user's marks.
//!
//! The sequence is snapshot → disconnect → fetch → reconnect → re-add the derived
//! columns → restore the snapshot. A replacement is downloaded next to the dataset
//! and only renamed over it once it has been verified, so any failure up to that
//! point leaves the previous file untouched and the previous connection can simply
//! be reopened. Only when even that reopening fails is the outcome fatal.
//!
//! A marker next to the snapshot file stays in place from a successful capture
//! until the marks have been replayed. While it exists the snapshot file is never
//! overwritten, only merged into, and [`resume_pending`] replays it when the
//! collection is next opened.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{CatalogError, Result, TransportError};
use crate::persist::{has_reference_tables, staging_path, Store};
use crate::snapshot::Snapshot;

// ------------- Transport -------------
/// Fetches the published dataset into `destination`, returning the bytes written.
pub trait Fetch: Send + Sync {
    fn fetch(&self, destination: &Path) -> std::result::Result<u64, TransportError>;
}

pub struct HttpFetcher {
    url: String,
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, destination: &Path) -> std::result::Result<u64, TransportError> {
        info!(url = %self.url, "downloading dataset");
        let response = self.agent.get(&self.url).call().map_err(classify)?;
        let mut file = File::create(destination).map_err(|e| TransportError::Other(e.to_string()))?;
        let bytes = io::copy(&mut response.into_reader(), &mut file).map_err(classify_io)?;
        file.sync_all().map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(bytes)
    }
}

fn classify(error: ureq::Error) -> TransportError {
    match error {
        ureq::Error::Status(code, _) => TransportError::Other(format!("server answered {code}")),
        ureq::Error::Transport(transport) => match transport.kind() {
            ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::Io => {
                TransportError::Unreachable(transport.to_string())
            }
            _ => TransportError::Other(transport.to_string()),
        },
    }
}

fn classify_io(error: io::Error) -> TransportError {
    match error.kind() {
        io::ErrorKind::TimedOut
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => TransportError::Unreachable(error.to_string()),
        _ => TransportError::Other(error.to_string()),
    }
}

/// Copies a dataset published on the local file system.
pub struct LocalFetcher {
    source: PathBuf,
}

impl LocalFetcher {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl Fetch for LocalFetcher {
    fn fetch(&self, destination: &Path) -> std::result::Result<u64, TransportError> {
        fs::copy(&self.source, destination)
            .map_err(|e| TransportError::Other(format!("{}: {e}", self.source.display())))
    }
}

/// Picks the fetcher matching the configured source.
pub fn fetcher_for(source: &str, timeout: Duration) -> Box<dyn Fetch> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Box::new(HttpFetcher::new(source, timeout))
    } else {
        Box::new(LocalFetcher::new(source))
    }
}

// ------------- Outcome -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefreshState {
    Idle,
    Snapshotting,
    Disconnected,
    Fetching,
    Reconnected,
    ColumnsRestored,
    SnapshotRestored,
    ErrorRecovered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Owned rows saved before the replacement, `None` when saving failed.
    pub captured: Option<usize>,
    /// Rows marked again in the new dataset.
    pub restored: usize,
    pub bytes: u64,
    /// blake3 digest of the installed dataset.
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum RefreshOutcome {
    Updated(RefreshReport),
    /// No connectivity, nothing changed.
    Offline,
    /// Something else failed; the store was reconnected.
    Failed(String),
    /// The store could not be reconnected; the application must restart.
    Fatal(String),
}

// ------------- Orchestration -------------
pub struct Refresh<'r> {
    store: &'r mut Store,
    fetcher: &'r dyn Fetch,
    snapshot_path: &'r Path,
    abort_on_snapshot_failure: bool,
    state: RefreshState,
    // a replay from an earlier run is still owed
    pending: bool,
    installed: bool,
}

impl<'r> Refresh<'r> {
    pub fn new(store: &'r mut Store, fetcher: &'r dyn Fetch, snapshot_path: &'r Path) -> Self {
        Self {
            store,
            fetcher,
            snapshot_path,
            abort_on_snapshot_failure: false,
            state: RefreshState::Idle,
            pending: false,
            installed: false,
        }
    }
    pub fn abort_on_snapshot_failure(mut self, abort: bool) -> Self {
        self.abort_on_snapshot_failure = abort;
        self
    }
    pub fn state(&self) -> RefreshState {
        self.state
    }
    fn enter(&mut self, state: RefreshState) {
        debug!(from = ?self.state, to = ?state, "refresh state");
        self.state = state;
    }
    pub fn run(&mut self) -> RefreshOutcome {
        let Some(dataset) = self.store.dataset_path().map(Path::to_path_buf) else {
            return RefreshOutcome::Failed("an in-memory store has no dataset file to replace".to_string());
        };
        self.pending = pending_marker(self.snapshot_path).exists();
        self.enter(RefreshState::Snapshotting);
        let captured = match self.capture() {
            Ok(count) => Some(count),
            Err(e) if self.abort_on_snapshot_failure => {
                error!(error = %e, "could not save ownership marks, refresh abandoned");
                self.enter(RefreshState::Idle);
                return RefreshOutcome::Failed(e.to_string());
            }
            Err(e) => {
                warn!(error = %e, "could not save ownership marks, refreshing without them");
                None
            }
        };
        match self.replace(&dataset, captured) {
            Ok(report) => {
                info!(restored = report.restored, digest = %report.digest, "dataset refreshed");
                RefreshOutcome::Updated(report)
            }
            Err(e) => self.recover(&dataset, e),
        }
    }
    fn capture(&mut self) -> Result<usize> {
        let mut snapshot = Snapshot::capture(self.store.connection()?)?;
        if self.pending {
            let owed = Snapshot::read(self.snapshot_path)?;
            warn!(owed = owed.len(), "an earlier replay did not finish, keeping its marks");
            snapshot = owed.merge(snapshot);
        }
        snapshot.write(self.snapshot_path)?;
        fs::write(pending_marker(self.snapshot_path), b"")?;
        Ok(snapshot.len())
    }
    fn replace(&mut self, dataset: &Path, captured: Option<usize>) -> Result<RefreshReport> {
        self.store.close()?;
        self.enter(RefreshState::Disconnected);

        self.enter(RefreshState::Fetching);
        let staging = staging_path(dataset, "download");
        let bytes = self.fetcher.fetch(&staging)?;
        verify_dataset(&staging)?;
        let digest = blake3::hash(&fs::read(&staging)?).to_hex().to_string();
        fs::rename(&staging, dataset)?;
        self.installed = true;
        info!(bytes, %digest, "dataset installed");

        self.store.connect()?;
        self.enter(RefreshState::Reconnected);
        self.store.add_derived_columns()?;
        self.enter(RefreshState::ColumnsRestored);

        // the file on disk is the durable copy; only trust it if it was written
        // this time or still holds marks owed from before
        let restored = if captured.is_some() || self.pending {
            Snapshot::read(self.snapshot_path)?.restore(self.store.connection_mut()?)?
        } else {
            0
        };
        settle(self.snapshot_path);
        self.enter(RefreshState::SnapshotRestored);
        Ok(RefreshReport {
            captured,
            restored,
            bytes,
            digest,
        })
    }
    fn recover(&mut self, dataset: &Path, cause: CatalogError) -> RefreshOutcome {
        warn!(error = %cause, state = ?self.state, "refresh failed, reconnecting");
        let staging = staging_path(dataset, "download");
        if staging.exists() {
            if let Err(e) = fs::remove_file(&staging) {
                warn!(error = %e, path = %staging.display(), "could not remove partial download");
            }
        }
        if let Err(e) = self.store.connect() {
            error!(error = %e, "could not reconnect to the dataset");
            return RefreshOutcome::Fatal(format!("{cause}; reconnecting failed: {e}"));
        }
        if self.installed {
            if pending_marker(self.snapshot_path).exists() {
                warn!(path = %self.snapshot_path.display(), "marks not replayed, they stay pending");
            }
        } else if !self.pending {
            // the previous dataset still carries its own marks
            settle(self.snapshot_path);
        }
        self.enter(RefreshState::ErrorRecovered);
        match cause {
            CatalogError::Transport(TransportError::Unreachable(_)) => RefreshOutcome::Offline,
            other => RefreshOutcome::Failed(other.to_string()),
        }
    }
}

/// Present while the snapshot at `snapshot_path` holds marks not yet replayed.
pub fn pending_marker(snapshot_path: &Path) -> PathBuf {
    staging_path(snapshot_path, "pending")
}

fn settle(snapshot_path: &Path) {
    let marker = pending_marker(snapshot_path);
    if marker.exists() {
        if let Err(e) = fs::remove_file(&marker) {
            warn!(error = %e, path = %marker.display(), "could not clear the pending replay marker");
        }
    }
}

/// Replays marks left behind by a refresh whose replay did not finish.
/// Returns `None` when nothing was pending.
pub fn resume_pending(store: &mut Store, snapshot_path: &Path) -> Result<Option<usize>> {
    if !pending_marker(snapshot_path).exists() {
        return Ok(None);
    }
    let restored = Snapshot::read(snapshot_path)?.restore(store.connection_mut()?)?;
    settle(snapshot_path);
    info!(restored, "unfinished replay completed");
    Ok(Some(restored))
}

/// Rejects anything that is not a SQLite file holding the taggable tables.
pub fn verify_dataset(path: &Path) -> Result<()> {
    let connection = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    if !has_reference_tables(&connection)? {
        return Err(CatalogError::Store(format!(
            "downloaded file {} is not a complete dataset",
            path.display()
        )));
    }
    Ok(())
}

//! Runtime settings: built-in defaults, then an optional `scdcat.toml` (or the
//! file given explicitly), then `SCDCAT_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_SOURCE: &str = "http://media.strathspey.org/scddata/scddata-2.0.db";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Local copy of the published dataset.
    pub dataset_path: PathBuf,
    /// Where ownership marks are saved while the dataset is replaced.
    pub snapshot_path: PathBuf,
    /// URL or local file the replacement dataset is fetched from.
    pub source: String,
    pub fetch_timeout_secs: u64,
    /// Give up on a refresh, rather than proceed without a snapshot, when marks cannot be saved.
    pub abort_on_snapshot_failure: bool,
    pub bind: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("database/scddata.db"),
            snapshot_path: PathBuf::from("database/ihave.txt"),
            source: DEFAULT_SOURCE.to_string(),
            fetch_timeout_secs: 120,
            abort_on_snapshot_failure: false,
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings, requiring `file` to exist when one is named.
    pub fn load(file: Option<&str>) -> Result<Self> {
        let defaults = Settings::default();
        let settings = Config::builder()
            .set_default("dataset_path", defaults.dataset_path.to_string_lossy().into_owned())?
            .set_default("snapshot_path", defaults.snapshot_path.to_string_lossy().into_owned())?
            .set_default("source", defaults.source)?
            .set_default("fetch_timeout_secs", defaults.fetch_timeout_secs as i64)?
            .set_default("abort_on_snapshot_failure", defaults.abort_on_snapshot_failure)?
            .set_default("bind", defaults.bind)?
            .add_source(File::with_name(file.unwrap_or("scdcat")).required(file.is_some()))
            .add_source(Environment::with_prefix("SCDCAT"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

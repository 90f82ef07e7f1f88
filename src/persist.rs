// used for persistence
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{CatalogError, Result};
use crate::predicate::Query;
use crate::schema::{Entity, DERIVED_COLUMNS, REFERENCE_SCHEMA};

// mirrors the statement timeout the dataset has always been queried with
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(PathBuf),
}

// ------------- Results -------------
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Cell {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Integer(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(t) => Some(t),
            _ => None,
        }
    }
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}
impl From<ValueRef<'_>> for Cell {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(i) => Cell::Integer(i),
            ValueRef::Real(r) => Cell::Real(r),
            ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Cell::Blob(b.to_vec()),
        }
    }
}

/// Materialized rows of a query, with their column names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
    pub fn value(&self, row: usize, column: &str) -> Option<&Cell> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }
    /// All values of one column as text, nulls skipped.
    pub fn texts(&self, column: &str) -> Vec<String> {
        let Some(index) = self.column_index(column) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|r| r[index].as_str().map(String::from))
            .collect()
    }
    pub fn ids(&self) -> Vec<i64> {
        let Some(index) = self.column_index("id") else {
            return Vec::new();
        };
        self.rows.iter().filter_map(|r| r[index].as_i64()).collect()
    }
}

// ------------- Store -------------
/// The single connection to the backing dataset.
///
/// The connection can be torn down and reopened, which is what the refresh
/// workflow does while the dataset file is being replaced. Every operation
/// fails with a store error while disconnected.
pub struct Store {
    mode: PersistenceMode,
    connection: Option<Connection>,
}

impl Store {
    /// Opens the dataset, creating an empty one if there is nothing there yet,
    /// and makes sure the derived columns exist.
    pub fn open(mode: PersistenceMode) -> Result<Self> {
        let connection = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open(path)?
            }
        };
        connection.busy_timeout(BUSY_TIMEOUT)?;
        if !has_reference_tables(&connection)? {
            info!(?mode, "no dataset found, creating an empty one");
            connection.execute_batch(REFERENCE_SCHEMA)?;
        }
        let store = Self {
            mode,
            connection: Some(connection),
        };
        store.add_derived_columns()?;
        Ok(store)
    }
    pub fn mode(&self) -> &PersistenceMode {
        &self.mode
    }
    pub fn dataset_path(&self) -> Option<&Path> {
        match &self.mode {
            PersistenceMode::InMemory => None,
            PersistenceMode::File(path) => Some(path.as_path()),
        }
    }
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
    pub fn connection(&self) -> Result<&Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| CatalogError::Store("not connected".to_string()))
    }
    pub fn connection_mut(&mut self) -> Result<&mut Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| CatalogError::Store("not connected".to_string()))
    }
    pub fn close(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            connection.close().map_err(|(_, e)| CatalogError::from(e))?;
            debug!("connection closed");
        }
        Ok(())
    }
    /// Reopens an existing dataset file as it is, without creating or altering anything.
    pub fn connect(&mut self) -> Result<()> {
        self.close()?;
        let path = self
            .dataset_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| CatalogError::Store("an in-memory store cannot be reopened".to_string()))?;
        let connection = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        // surfaces a missing or foreign file here rather than on the first query
        if !has_reference_tables(&connection)? {
            return Err(CatalogError::Store(format!(
                "{} does not hold the reference dataset",
                path.display()
            )));
        }
        self.connection = Some(connection);
        debug!(path = %path.display(), "connection opened");
        Ok(())
    }
    /// Adds `ihave` and `tag` to every taggable table that lacks them.
    pub fn add_derived_columns(&self) -> Result<()> {
        let connection = self.connection()?;
        for entity in Entity::ALL {
            for (column, definition) in DERIVED_COLUMNS {
                if !has_column(connection, entity.table(), column)? {
                    connection.execute_batch(&format!(
                        "ALTER TABLE {} ADD COLUMN {column} {definition}",
                        entity.table()
                    ))?;
                    debug!(table = entity.table(), column, "derived column added");
                }
            }
        }
        Ok(())
    }
    pub fn run(&self, query: &Query) -> Result<ResultSet> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(query.sql())?;
        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = statement.query(params_from_iter(query.params()))?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                cells.push(Cell::from(row.get_ref(i)?));
            }
            collected.push(cells);
        }
        Ok(ResultSet {
            columns,
            rows: collected,
        })
    }
}

/// True when the four taggable tables are present.
pub fn has_reference_tables(connection: &Connection) -> Result<bool> {
    let found: i64 = connection.query_row(
        "select count(*) from sqlite_master where type = 'table' and name in (?1, ?2, ?3, ?4)",
        [
            Entity::Dance.table(),
            Entity::Publication.table(),
            Entity::Recording.table(),
            Entity::Album.table(),
        ],
        |r| r.get(0),
    )?;
    Ok(found == Entity::ALL.len() as i64)
}

pub fn has_column(connection: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut statement = connection.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = statement.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Sibling of `path` used to stage a file before it is renamed into place.
pub fn staging_path(path: &Path, suffix: &str) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".");
    staging.push(suffix);
    PathBuf::from(staging)
}

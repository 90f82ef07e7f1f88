//! Serialized ownership marks, the only state that outlives a dataset replacement.
//!
//! One line per owned row, `<entity> <id> <tag>`, with the literal `null` for a
//! missing tag. Everything after the second space is the tag, so tags may hold
//! spaces; backslashes and line breaks inside a tag are escaped.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::error::{CatalogError, Result};
use crate::persist::staging_path;
use crate::schema::{Entity, IHAVE, TAG};

const NULL_TAG: &str = "null";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub entity: Entity,
    pub id: i64,
    pub tag: Option<String>,
}

impl SnapshotRecord {
    pub fn new(entity: Entity, id: i64, tag: Option<&str>) -> Self {
        Self {
            entity,
            id,
            tag: tag.map(String::from),
        }
    }
}
impl fmt::Display for SnapshotRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{} {} {}", self.entity, self.id, escape(tag)),
            None => write!(f, "{} {} {NULL_TAG}", self.entity, self.id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: Vec<SnapshotRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<SnapshotRecord>) -> Self {
        Self { records }
    }
    pub fn records(&self) -> &[SnapshotRecord] {
        &self.records
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    /// Adds `newer` on top of these records. A row present in both keeps the
    /// tag from `newer`; the result is back in snapshot order.
    pub fn merge(mut self, newer: Snapshot) -> Snapshot {
        for record in newer.records {
            match self
                .records
                .iter_mut()
                .find(|r| r.entity == record.entity && r.id == record.id)
            {
                Some(existing) => existing.tag = record.tag,
                None => self.records.push(record),
            }
        }
        self.records
            .sort_by_key(|r| Entity::ALL.iter().position(|e| *e == r.entity));
        self
    }
    /// Every owned row of every taggable entity, in snapshot order.
    pub fn capture(connection: &Connection) -> Result<Self> {
        let mut records = Vec::new();
        for entity in Entity::ALL {
            let failed = |e: rusqlite::Error| CatalogError::snapshot(format!("capturing {entity}: {e}"), None);
            let mut statement = connection
                .prepare(&format!("SELECT id, {TAG} FROM {} WHERE {IHAVE} = 1", entity.table()))
                .map_err(failed)?;
            let rows = statement
                .query_map([], |row| {
                    Ok(SnapshotRecord {
                        entity,
                        id: row.get(0)?,
                        tag: row.get(1)?,
                    })
                })
                .map_err(failed)?;
            for record in rows {
                records.push(record.map_err(failed)?);
            }
        }
        debug!(records = records.len(), "snapshot captured");
        Ok(Self { records })
    }
    /// Marks every recorded row as owned again and puts back its tag.
    ///
    /// Rows are written as recorded, without cascading, inside one transaction.
    /// Returns the number of rows found and updated.
    pub fn restore(&self, connection: &mut Connection) -> Result<usize> {
        let failed = |e: rusqlite::Error| CatalogError::snapshot(format!("restoring: {e}"), None);
        let transaction = connection.transaction().map_err(failed)?;
        let mut restored = 0;
        for record in &self.records {
            let table = record.entity.table();
            let changed = match &record.tag {
                Some(tag) => transaction.execute(
                    &format!("UPDATE {table} SET {IHAVE} = 1, {TAG} = ?1 WHERE id = ?2"),
                    params![tag, record.id],
                ),
                None => transaction.execute(
                    &format!("UPDATE {table} SET {IHAVE} = 1 WHERE id = ?1"),
                    params![record.id],
                ),
            }
            .map_err(failed)?;
            if changed == 0 {
                warn!(entity = %record.entity, id = record.id, "owned row is gone from the dataset");
            }
            restored += changed;
        }
        transaction.commit().map_err(failed)?;
        Ok(restored)
    }
    /// Writes the snapshot next to `path` first and renames it into place.
    pub fn write(&self, path: &Path) -> Result<()> {
        let failed = |e: std::io::Error| CatalogError::snapshot(format!("writing {}: {e}", path.display()), None);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(failed)?;
            }
        }
        let staging = staging_path(path, "partial");
        fs::write(&staging, self.to_string()).map_err(failed)?;
        fs::rename(&staging, path).map_err(failed)?;
        Ok(())
    }
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| CatalogError::snapshot(format!("reading {}: {e}", path.display()), None))?;
        text.parse()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            writeln!(f, "{record}")?;
        }
        Ok(())
    }
}

impl FromStr for Snapshot {
    type Err = CatalogError;
    fn from_str(text: &str) -> Result<Self> {
        let mut records = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            records.push(parse_line(line, index + 1)?);
        }
        Ok(Self { records })
    }
}

fn parse_line(line: &str, number: usize) -> Result<SnapshotRecord> {
    let mut fields = line.splitn(3, ' ');
    let name = fields.next().unwrap_or_default();
    let entity = name
        .parse::<Entity>()
        .map_err(|_| CatalogError::snapshot(format!("unknown entity '{name}'"), Some(number)))?;
    let id = fields
        .next()
        .ok_or_else(|| CatalogError::snapshot("missing id", Some(number)))?;
    let id = id
        .trim()
        .parse::<i64>()
        .map_err(|_| CatalogError::snapshot(format!("'{id}' is not an id"), Some(number)))?;
    let tag = match fields.next() {
        None | Some(NULL_TAG) => None,
        Some(raw) => Some(unescape(raw).ok_or_else(|| {
            CatalogError::snapshot(format!("bad escape in tag '{raw}'"), Some(number))
        })?),
    };
    Ok(SnapshotRecord { entity, id, tag })
}

fn escape(tag: &str) -> String {
    let mut escaped = String::with_capacity(tag.len());
    for c in tag.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape(raw: &str) -> Option<String> {
    let mut tag = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            tag.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => tag.push('\\'),
            'n' => tag.push('\n'),
            'r' => tag.push('\r'),
            _ => return None,
        }
    }
    Some(tag)
}

//! Ownership marks and tags, cascaded from parents to their mapped children.
//!
//! A publication passes its mark on to every dance it contains and an album to
//! every recording on it. Children never pass anything back up. The update of
//! the row itself and the cascade run in one transaction, so a failing cascade
//! leaves both untouched.

use rusqlite::types::Value;
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::schema::{Entity, IHAVE, TAG};

/// What a single mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Propagation {
    pub entity: Entity,
    pub id: i64,
    pub updated: usize,
    pub cascaded: usize,
}

pub fn set_owned(connection: &mut Connection, entity: Entity, id: i64, owned: bool) -> Result<Propagation> {
    apply(connection, entity, id, IHAVE, Value::Integer(owned as i64))
}

/// Sets or, with `None`, clears the tag.
pub fn set_tag(connection: &mut Connection, entity: Entity, id: i64, tag: Option<&str>) -> Result<Propagation> {
    let value = match tag {
        Some(text) => Value::Text(text.to_string()),
        None => Value::Null,
    };
    apply(connection, entity, id, TAG, value)
}

pub fn remove_tag(connection: &mut Connection, entity: Entity, id: i64) -> Result<Propagation> {
    set_tag(connection, entity, id, None)
}

fn apply(connection: &mut Connection, entity: Entity, id: i64, column: &str, value: Value) -> Result<Propagation> {
    let transaction = connection.transaction()?;
    let updated = transaction.execute(
        &format!("UPDATE {} SET {column} = ?1 WHERE id = ?2", entity.table()),
        params![value, id],
    )?;
    let cascaded = match entity.descriptor().cascade {
        Some(cascade) => transaction.execute(
            &format!(
                "UPDATE {} SET {column} = ?1 WHERE id IN (SELECT {} FROM {} WHERE {} = ?2)",
                cascade.child.table(),
                cascade.child_key,
                cascade.map_table,
                cascade.parent_key
            ),
            params![value, id],
        )?,
        None => 0,
    };
    transaction.commit()?;
    debug!(%entity, id, column, updated, cascaded, "mark applied");
    Ok(Propagation {
        entity,
        id,
        updated,
        cascaded,
    })
}

//! Catalog driven query building.
//!
//! [`search`] turns a name term and a loosely typed bag of facet values into a
//! [`Query`] over an entity's skeleton. Only facets the catalog declares for the
//! entity are looked at, in catalog order, so unknown keys are simply ignored.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension};

use crate::error::{CatalogError, Result};
use crate::facet;
use crate::predicate::{Comparison, Operand, Predicate, Query, Select, Subquery};
use crate::schema::{CompoundFacet, Entity, FacetKind, FacetSpec, RecordKind, RelationSpec, Skeleton};

lazy_static! {
    // optional operator followed by an integer, e.g. ">16", "<= 32" or "48"
    static ref COMPARISON: Regex = Regex::new(r"^\s*(<=|>=|<>|!=|==|=|<|>)?\s*(-?\d+)\s*$").unwrap();
}

pub fn search(
    connection: &Connection,
    entity: Entity,
    term: &str,
    facets: &HashMap<String, String>,
    owned_only: bool,
) -> Result<Query> {
    let descriptor = entity.descriptor();
    let skeleton = descriptor.skeleton;
    let mut select = Select::from(skeleton);
    if !term.is_empty() {
        select = select.filter(Predicate::contains(skeleton.name(), term));
    }
    for spec in descriptor.facets {
        let Some(raw) = facets.get(spec.key) else {
            continue;
        };
        if raw.trim().is_empty() {
            continue;
        }
        if let Some(predicate) = facet_predicate(connection, skeleton, spec, raw)? {
            select = select.filter(predicate);
        }
    }
    if owned_only {
        select = select.filter(Predicate::IsSet(descriptor.owned()));
    }
    Ok(select.grouped().build())
}

/// Rows of `relation.target` related to the `relation.source` record `id`,
/// each target record once even when the skeleton's joins fan out.
pub fn related(relation: &RelationSpec, id: i64) -> Query {
    let mut select = Select::from(relation.target.skeleton());
    for column in relation.columns {
        select = select.column(*column);
    }
    for join in relation.joins {
        select = select.join(*join);
    }
    select
        .filter(Predicate::equals(relation.key, id))
        .distinct()
        .order_by(relation.order_by)
        .build()
}

/// A single record with its display columns.
pub fn record(kind: RecordKind, id: i64) -> Query {
    let skeleton = kind.skeleton();
    Select::from(skeleton)
        .filter(Predicate::equals(skeleton.id(), id))
        .build()
}

/// Splits a raw comparison facet such as `>16` into its operator and operand.
pub fn comparison(facet: &str, raw: &str) -> Result<(Comparison, i64)> {
    let captures = COMPARISON
        .captures(raw)
        .ok_or_else(|| CatalogError::malformed(facet, format!("'{raw}' is not a comparison")))?;
    let op = match captures.get(1) {
        Some(token) => Comparison::parse(token.as_str())
            .ok_or_else(|| CatalogError::malformed(facet, format!("unknown operator in '{raw}'")))?,
        None => Comparison::Eq,
    };
    let value = captures[2]
        .parse::<i64>()
        .map_err(|e| CatalogError::malformed(facet, e.to_string()))?;
    Ok((op, value))
}

fn facet_predicate(
    connection: &Connection,
    skeleton: &Skeleton,
    spec: &FacetSpec,
    raw: &str,
) -> Result<Option<Predicate>> {
    let predicate = match &spec.kind {
        FacetKind::Equals(column) => Some(Predicate::equals(*column, raw)),
        FacetKind::Contains(column) => Some(Predicate::contains(*column, raw)),
        FacetKind::Comparison(column) => {
            let (op, value) = comparison(spec.key, raw)?;
            Some(Predicate::Compare {
                column: *column,
                op,
                value: Operand::Integer(value),
            })
        }
        FacetKind::Number(column) => {
            let value = raw.trim().parse::<i64>().map_err(|_| {
                CatalogError::malformed(spec.key, format!("'{raw}' is not a number"))
            })?;
            Some(Predicate::equals(*column, value))
        }
        FacetKind::Flag(column) => (raw.trim() == "1").then(|| Predicate::IsSet(*column)),
        FacetKind::Member(member) => (raw.trim() == "1").then(|| Predicate::In {
            column: skeleton.id(),
            subquery: Subquery {
                table: member.map_table,
                alias: member.map_alias,
                key: member.entity_key,
                joins: vec![member.related],
                filter: Box::new(Predicate::contains(member.column, member.needle)),
            },
        }),
        FacetKind::Compound(compound) => match facet::parse(spec.key, raw)? {
            Some(expr) => {
                let resolved =
                    expr.try_map(&mut |name: String| resolve(connection, spec.key, compound, &name))?;
                Some(facet::to_predicate(&resolved, skeleton.id(), compound))
            }
            None => None,
        },
    };
    Ok(predicate)
}

fn resolve(connection: &Connection, facet: &str, compound: &CompoundFacet, name: &str) -> Result<i64> {
    connection
        .query_row(
            &format!("SELECT id FROM {} WHERE name = ?1", compound.lookup_table),
            [name],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| {
            CatalogError::malformed(facet, format!("no {} named '{name}'", compound.lookup_table))
        })
}

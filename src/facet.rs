//! The compound facet mini-language used by `formation` and `steps`.
//!
//! A compound value is a `~` separated list of positional slots:
//! `term1 ~ connective1 ~ term2 ~ connective2 ~ term3`, where a slot made of `*`
//! (or nothing) is empty and a connective is `and`, `or` or `not` (`and not`).
//! The literal placeholder `*  *  *  *  *` switches the facet off entirely.
//!
//! ```
//! use scdcat::facet::{parse, BoolExpr, Connective};
//! let expr = parse("formation", "Advancing~and~Poussette~~~").unwrap().unwrap();
//! assert_eq!(expr.terms(), vec![&"Advancing".to_string(), &"Poussette".to_string()]);
//! assert!(matches!(expr, BoolExpr::Binary { op: Connective::And, .. }));
//! ```

use std::fmt;

use crate::error::{CatalogError, Result};
use crate::predicate::{Column, Predicate, Subquery};
use crate::schema::CompoundFacet;

pub const DISABLED: &str = "*  *  *  *  *";
const SLOTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
    AndNot,
}

impl Connective {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "and" => Some(Connective::And),
            "or" => Some(Connective::Or),
            "not" => Some(Connective::AndNot),
            _ => None,
        }
    }
}
impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Connective::And => "and",
            Connective::Or => "or",
            Connective::AndNot => "and not",
        })
    }
}

/// Left associative boolean combination of at most three terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoolExpr<T> {
    Term(T),
    Binary {
        op: Connective,
        left: Box<BoolExpr<T>>,
        right: Box<BoolExpr<T>>,
    },
}

impl<T> BoolExpr<T> {
    /// Terms in left to right order.
    pub fn terms(&self) -> Vec<&T> {
        match self {
            BoolExpr::Term(t) => vec![t],
            BoolExpr::Binary { left, right, .. } => {
                let mut terms = left.terms();
                terms.extend(right.terms());
                terms
            }
        }
    }
    /// Replaces every term, stopping at the first failure.
    pub fn try_map<U, F>(self, f: &mut F) -> Result<BoolExpr<U>>
    where
        F: FnMut(T) -> Result<U>,
    {
        Ok(match self {
            BoolExpr::Term(t) => BoolExpr::Term(f(t)?),
            BoolExpr::Binary { op, left, right } => {
                let left = left.try_map(f)?;
                let right = right.try_map(f)?;
                BoolExpr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
        })
    }
    fn combine(self, op: Connective, right: T) -> Self {
        BoolExpr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(BoolExpr::Term(right)),
        }
    }
}

fn slot(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '*' || c.is_whitespace()) {
        None
    } else {
        Some(trimmed)
    }
}

/// Parses a raw compound value into a tree of names.
///
/// Returns `Ok(None)` when the value does not filter anything: empty, the
/// disabled placeholder, or no first term. Pairs are only taken when both the
/// connective and its term are present, and the second pair only after the first.
pub fn parse(facet: &str, raw: &str) -> Result<Option<BoolExpr<String>>> {
    if raw.contains(DISABLED) {
        return Ok(None);
    }
    let mut slots: Vec<Option<&str>> = raw.split('~').map(slot).collect();
    while let Some(None) = slots.last() {
        slots.pop();
    }
    if slots.len() > SLOTS {
        return Err(CatalogError::malformed(
            facet,
            format!("at most three terms can be combined, found {} slots", slots.len()),
        ));
    }
    slots.resize(SLOTS, None);

    let mut connectives = [None, None];
    for (i, position) in [1, 3].into_iter().enumerate() {
        if let Some(word) = slots[position] {
            connectives[i] = Some(Connective::parse(word).ok_or_else(|| {
                CatalogError::malformed(facet, format!("expected and, or or not but found '{word}'"))
            })?);
        }
    }
    for position in [0, 2, 4] {
        if let Some(word) = slots[position] {
            if Connective::parse(word).is_some() {
                return Err(CatalogError::malformed(
                    facet,
                    format!("'{word}' is a connective where a term was expected"),
                ));
            }
        }
    }

    let Some(first) = slots[0] else {
        return Ok(None);
    };
    let mut expr = BoolExpr::Term(first.to_string());
    if let (Some(op), Some(term)) = (connectives[0], slots[2]) {
        expr = expr.combine(op, term.to_string());
        if let (Some(op), Some(term)) = (connectives[1], slots[4]) {
            expr = expr.combine(op, term.to_string());
        }
    }
    Ok(Some(expr))
}

/// Turns a resolved tree into membership predicates on `entity_id`.
pub fn to_predicate(expr: &BoolExpr<i64>, entity_id: Column, spec: &CompoundFacet) -> Predicate {
    match expr {
        BoolExpr::Term(id) => Predicate::In {
            column: entity_id,
            subquery: Subquery {
                table: spec.map_table,
                alias: spec.map_alias,
                key: spec.entity_key,
                joins: Vec::new(),
                filter: Box::new(Predicate::equals(
                    Column::new(spec.map_alias, spec.lookup_key),
                    *id,
                )),
            },
        },
        BoolExpr::Binary { op, left, right } => {
            let left = to_predicate(left, entity_id, spec);
            let right = to_predicate(right, entity_id, spec);
            match op {
                Connective::And => Predicate::All(vec![left, right]),
                Connective::Or => Predicate::Any(vec![left, right]),
                Connective::AndNot => Predicate::All(vec![left, right.negate()]),
            }
        }
    }
}

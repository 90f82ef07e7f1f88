//! scdcat – a personal collection kept on top of a replaceable dance and music dataset.
//!
//! The reference dataset (dances, publications, recordings, albums and everything
//! they link to) is published as a single SQLite file and replaced wholesale from
//! time to time. On top of it a user keeps two pieces of personal state per row:
//! * an *ownership mark* (`ihave`), set when the user owns a dance, book, recording or album,
//! * a free text *tag*.
//!
//! Neither column exists in the published file. They are added after every
//! installation and carried across replacements through a snapshot.
//!
//! ## Modules
//! * [`schema`] – The static catalog: read-query skeletons, facets, cascades and relations.
//! * [`predicate`] – A typed predicate tree and the renderer that binds every value.
//! * [`facet`] – The `~` separated compound facet language of `formation` and `steps`.
//! * [`search`] – Faceted search, relation traversal and single-record queries.
//! * [`ownership`] – Marks and tags, cascaded from publications to dances and albums to recordings.
//! * [`snapshot`] – Line oriented serialization of the marks.
//! * [`persist`] – The SQLite store and its result sets.
//! * [`refresh`] – Fetching, verifying and installing a new dataset.
//! * [`collection`] – The thread safe facade tying the above together.
//! * [`server`] – JSON over HTTP.
//! * [`settings`] – Defaults, settings file and environment.
//!
//! ## Searching
//! A search names an entity, a case sensitive name term and a map of facet
//! values. Facets not known for the entity are ignored:
//! ```
//! use std::collections::HashMap;
//! use scdcat::{collection::Collection, schema::Entity};
//! let collection = Collection::in_memory().unwrap();
//! let mut facets = HashMap::new();
//! facets.insert("bars".to_string(), ">16".to_string());
//! facets.insert("formation".to_string(), "*  *  *  *  *".to_string());
//! let rows = collection.search(Entity::Dance, "Reel", &facets, false).unwrap();
//! assert!(rows.is_empty());
//! ```
//!
//! ## Refreshing
//! [`collection::Collection::refresh`] saves the marks, swaps in the new file,
//! reconnects, re-adds the derived columns and restores the marks. Failures
//! before the swap leave the previous dataset in place; the outcome says whether
//! the source was unreachable, the refresh failed, or the store could not be
//! reopened at all. Marks whose replay broke off stay pending next to the
//! snapshot file and are replayed by the next refresh or when the collection opens.

pub mod collection;
pub mod error;
pub mod facet;
pub mod ownership;
pub mod persist;
pub mod predicate;
pub mod refresh;
pub mod schema;
pub mod search;
pub mod server;
pub mod settings;
pub mod snapshot;

pub use collection::Collection;
pub use error::{CatalogError, Result};
pub use refresh::RefreshOutcome;
pub use schema::{Entity, RecordKind};

//! Static description of the reference dataset.
//!
//! Everything the query builder, the ownership propagator and the refresh
//! workflow need to know about tables lives here: read-query skeletons with
//! their join graphs, the facets each entity accepts, the cascade from a
//! parent entity to its mapped children, and the relation traversals offered
//! to callers. Adding an entity, facet or relation means adding an entry to
//! one of the tables below.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{CatalogError, Result};
use crate::predicate::{Column, Join};

// ------------- Record kinds -------------
/// The four record types carrying the derived `ihave` and `tag` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Dance,
    Publication,
    Recording,
    Album,
}

impl Entity {
    /// Snapshot order.
    pub const ALL: [Entity; 4] = [
        Entity::Dance,
        Entity::Album,
        Entity::Publication,
        Entity::Recording,
    ];
    pub fn table(&self) -> &'static str {
        match self {
            Entity::Dance => "dance",
            Entity::Publication => "publication",
            Entity::Recording => "recording",
            Entity::Album => "album",
        }
    }
    pub fn descriptor(&self) -> &'static EntityDescriptor {
        match self {
            Entity::Dance => &DANCE,
            Entity::Publication => &PUBLICATION,
            Entity::Recording => &RECORDING,
            Entity::Album => &ALBUM,
        }
    }
}
impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}
impl FromStr for Entity {
    type Err = CatalogError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dance" => Ok(Entity::Dance),
            "publication" => Ok(Entity::Publication),
            "recording" => Ok(Entity::Recording),
            "album" => Ok(Entity::Album),
            _ => Err(CatalogError::UnknownEntity(s.to_string())),
        }
    }
}

/// Every kind of record that can be listed, taggable or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Dance,
    Publication,
    Recording,
    Album,
    Tune,
    Person,
    Step,
    Formation,
}

impl RecordKind {
    pub fn skeleton(&self) -> &'static Skeleton {
        match self {
            RecordKind::Dance => &DANCE_SKELETON,
            RecordKind::Publication => &PUBLICATION_SKELETON,
            RecordKind::Recording => &RECORDING_SKELETON,
            RecordKind::Album => &ALBUM_SKELETON,
            RecordKind::Tune => &TUNE_SKELETON,
            RecordKind::Person => &PERSON_SKELETON,
            RecordKind::Step => &STEP_SKELETON,
            RecordKind::Formation => &FORMATION_SKELETON,
        }
    }
    pub fn table(&self) -> &'static str {
        self.skeleton().table
    }
    /// Accepts singular or plural names, e.g. `tune` or `tunes`.
    pub fn parse(name: &str) -> Result<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        let singular = match lowered.as_str() {
            "people" => "person",
            other => other.strip_suffix('s').unwrap_or(other),
        };
        match singular {
            "dance" => Ok(RecordKind::Dance),
            "publication" => Ok(RecordKind::Publication),
            "recording" => Ok(RecordKind::Recording),
            "album" => Ok(RecordKind::Album),
            "tune" => Ok(RecordKind::Tune),
            "person" => Ok(RecordKind::Person),
            "step" => Ok(RecordKind::Step),
            "formation" => Ok(RecordKind::Formation),
            _ => Err(CatalogError::UnknownEntity(name.to_string())),
        }
    }
}
impl From<Entity> for RecordKind {
    fn from(entity: Entity) -> Self {
        match entity {
            Entity::Dance => RecordKind::Dance,
            Entity::Publication => RecordKind::Publication,
            Entity::Recording => RecordKind::Recording,
            Entity::Album => RecordKind::Album,
        }
    }
}
impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

// ------------- Skeletons -------------
/// Base table, select list and join graph of the canonical read query of a record kind.
#[derive(Debug)]
pub struct Skeleton {
    pub table: &'static str,
    pub alias: &'static str,
    pub columns: &'static [&'static str],
    pub joins: &'static [Join],
    /// Display columns used to collapse join fan-out.
    pub group_by: &'static [&'static str],
    pub order_by: &'static str,
}

impl Skeleton {
    pub const fn column(&self, name: &'static str) -> Column {
        Column::new(self.alias, name)
    }
    pub const fn id(&self) -> Column {
        self.column("id")
    }
    pub const fn name(&self) -> Column {
        self.column("name")
    }
}

const fn col(alias: &'static str, name: &'static str) -> Column {
    Column::new(alias, name)
}

pub static DANCE_SKELETON: Skeleton = Skeleton {
    table: "dance",
    alias: "d",
    columns: &[
        "d.*",
        "dt.name AS type",
        "mt.description AS medleytype",
        "s.name AS shape",
        "c.name AS couples",
        "p.name AS progression",
        "pb.name AS publication",
        "pn.name AS devisor",
    ],
    joins: &[
        Join::new("dancetype", "dt", col("d", "type_id"), col("dt", "id")),
        Join::new("medleytype", "mt", col("d", "medleytype_id"), col("mt", "id")),
        Join::new("shape", "s", col("d", "shape_id"), col("s", "id")),
        Join::new("couples", "c", col("d", "couples_id"), col("c", "id")),
        Join::new("progression", "p", col("d", "progression_id"), col("p", "id")),
        Join::new("dancespublicationsmap", "dpm", col("d", "id"), col("dpm", "dance_id")),
        Join::new("publication", "pb", col("dpm", "publication_id"), col("pb", "id")),
        Join::new("person", "pn", col("d", "devisor_id"), col("pn", "id")),
    ],
    group_by: &["d.name", "publication"],
    order_by: "d.name",
};

pub static PUBLICATION_SKELETON: Skeleton = Skeleton {
    table: "publication",
    alias: "pb",
    columns: &["pb.*", "pr.name AS devisor"],
    joins: &[Join::new("person", "pr", col("pb", "devisor_id"), col("pr", "id"))],
    group_by: &[],
    order_by: "pb.name",
};

pub static RECORDING_SKELETON: Skeleton = Skeleton {
    table: "recording",
    alias: "r",
    columns: &[
        "r.*",
        "dt.name AS type",
        "mt.description AS medleytype",
        "p.name AS phrasing",
        "pn.name AS artist",
        "al.name AS album",
    ],
    joins: &[
        Join::new("dancetype", "dt", col("r", "type_id"), col("dt", "id")),
        Join::new("medleytype", "mt", col("r", "medleytype_id"), col("mt", "id")),
        Join::new("phrasing", "p", col("r", "phrasing_id"), col("p", "id")),
        Join::new("person", "pn", col("r", "artist_id"), col("pn", "id")),
        Join::new("albumsrecordingsmap", "arm", col("r", "id"), col("arm", "recording_id")),
        Join::new("album", "al", col("arm", "album_id"), col("al", "id")),
    ],
    group_by: &["r.name", "album"],
    order_by: "r.name",
};

pub static ALBUM_SKELETON: Skeleton = Skeleton {
    table: "album",
    alias: "a",
    columns: &["a.*", "p.name AS artist"],
    joins: &[Join::new("person", "p", col("a", "artist_id"), col("p", "id"))],
    group_by: &[],
    order_by: "a.name",
};

pub static TUNE_SKELETON: Skeleton = Skeleton {
    table: "tune",
    alias: "t",
    columns: &["t.*", "p.name AS composer"],
    joins: &[Join::new("person", "p", col("t", "composer_id"), col("p", "id"))],
    group_by: &[],
    order_by: "t.name",
};

pub static PERSON_SKELETON: Skeleton = Skeleton {
    table: "person",
    alias: "pe",
    columns: &["pe.*"],
    joins: &[],
    group_by: &[],
    order_by: "pe.name",
};

pub static STEP_SKELETON: Skeleton = Skeleton {
    table: "step",
    alias: "st",
    columns: &["st.*"],
    joins: &[],
    group_by: &[],
    order_by: "st.name",
};

pub static FORMATION_SKELETON: Skeleton = Skeleton {
    table: "formation",
    alias: "f",
    columns: &["f.*"],
    joins: &[],
    group_by: &[],
    order_by: "f.name",
};

// ------------- Facets -------------
/// Many-to-many filter: entity ids mapped to a lookup row picked by name.
#[derive(Debug)]
pub struct CompoundFacet {
    pub lookup_table: &'static str,
    pub map_table: &'static str,
    pub map_alias: &'static str,
    /// Column of the map table holding the entity id.
    pub entity_key: &'static str,
    /// Column of the map table holding the lookup id.
    pub lookup_key: &'static str,
}

/// Entity ids mapped to a related row whose text column contains `needle`.
#[derive(Debug)]
pub struct MemberFacet {
    pub map_table: &'static str,
    pub map_alias: &'static str,
    pub entity_key: &'static str,
    pub related: Join,
    pub column: Column,
    pub needle: &'static str,
}

#[derive(Debug)]
pub enum FacetKind {
    Equals(Column),
    Contains(Column),
    /// Raw value carries its own operator, e.g. `>16`.
    Comparison(Column),
    Number(Column),
    /// Active only for the value `"1"`.
    Flag(Column),
    /// Active only for the value `"1"`.
    Member(MemberFacet),
    Compound(CompoundFacet),
}

#[derive(Debug)]
pub struct FacetSpec {
    pub key: &'static str,
    pub kind: FacetKind,
}

// ------------- Entities -------------
/// Parent to child propagation of ownership marks through a map table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cascade {
    pub child: Entity,
    pub map_table: &'static str,
    pub parent_key: &'static str,
    pub child_key: &'static str,
}

#[derive(Debug)]
pub struct EntityDescriptor {
    pub entity: Entity,
    pub skeleton: &'static Skeleton,
    pub facets: &'static [FacetSpec],
    pub cascade: Option<Cascade>,
}

impl EntityDescriptor {
    pub fn facet(&self, key: &str) -> Option<&'static FacetSpec> {
        self.facets.iter().find(|f| f.key == key)
    }
    pub fn facet_keys(&self) -> Vec<&'static str> {
        self.facets.iter().map(|f| f.key).collect()
    }
    pub fn owned(&self) -> Column {
        self.skeleton.column(IHAVE)
    }
}

pub static DANCE: EntityDescriptor = EntityDescriptor {
    entity: Entity::Dance,
    skeleton: &DANCE_SKELETON,
    facets: &[
        FacetSpec { key: "type", kind: FacetKind::Equals(col("dt", "name")) },
        FacetSpec { key: "couples", kind: FacetKind::Equals(col("c", "name")) },
        FacetSpec { key: "shape", kind: FacetKind::Equals(col("s", "name")) },
        FacetSpec { key: "author", kind: FacetKind::Contains(col("pn", "name")) },
        FacetSpec { key: "bars", kind: FacetKind::Comparison(col("d", "barsperrepeat")) },
        FacetSpec {
            key: "RSCDS",
            kind: FacetKind::Member(MemberFacet {
                map_table: "dancespublicationsmap",
                map_alias: "rpm",
                entity_key: "dance_id",
                related: Join::new("publication", "rpb", col("rpm", "publication_id"), col("rpb", "id")),
                column: col("rpb", "shortname"),
                needle: "RSCDS",
            }),
        },
        FacetSpec {
            key: "formation",
            kind: FacetKind::Compound(CompoundFacet {
                lookup_table: "formation",
                map_table: "dancesformationsmap",
                map_alias: "dfm",
                entity_key: "dance_id",
                lookup_key: "formation_id",
            }),
        },
        FacetSpec {
            key: "steps",
            kind: FacetKind::Compound(CompoundFacet {
                lookup_table: "step",
                map_table: "dancesstepsmap",
                map_alias: "dsm",
                entity_key: "dance_id",
                lookup_key: "step_id",
            }),
        },
    ],
    cascade: None,
};

pub static PUBLICATION: EntityDescriptor = EntityDescriptor {
    entity: Entity::Publication,
    skeleton: &PUBLICATION_SKELETON,
    facets: &[
        FacetSpec { key: "author", kind: FacetKind::Contains(col("pr", "name")) },
        FacetSpec { key: "RSCDS", kind: FacetKind::Flag(col("pb", "rscds")) },
    ],
    cascade: Some(Cascade {
        child: Entity::Dance,
        map_table: "dancespublicationsmap",
        parent_key: "publication_id",
        child_key: "dance_id",
    }),
};

pub static RECORDING: EntityDescriptor = EntityDescriptor {
    entity: Entity::Recording,
    skeleton: &RECORDING_SKELETON,
    facets: &[
        FacetSpec { key: "type", kind: FacetKind::Equals(col("dt", "name")) },
        FacetSpec { key: "medley type", kind: FacetKind::Equals(col("mt", "description")) },
        FacetSpec { key: "repetitions", kind: FacetKind::Comparison(col("r", "repetitions")) },
        FacetSpec { key: "bars", kind: FacetKind::Comparison(col("r", "barsperrepeat")) },
    ],
    cascade: None,
};

pub static ALBUM: EntityDescriptor = EntityDescriptor {
    entity: Entity::Album,
    skeleton: &ALBUM_SKELETON,
    facets: &[
        FacetSpec { key: "artist", kind: FacetKind::Contains(col("p", "name")) },
        FacetSpec { key: "productionyear", kind: FacetKind::Number(col("a", "productionyear")) },
    ],
    cascade: Some(Cascade {
        child: Entity::Recording,
        map_table: "albumsrecordingsmap",
        parent_key: "album_id",
        child_key: "recording_id",
    }),
};

/// Looks up the catalog entry of a taggable entity by name.
pub fn describe(name: &str) -> Result<&'static EntityDescriptor> {
    Ok(name.parse::<Entity>()?.descriptor())
}

// ------------- Relations -------------
/// A fixed traversal from one record to the related records of another kind.
#[derive(Debug)]
pub struct RelationSpec {
    pub source: RecordKind,
    pub target: RecordKind,
    /// Joins appended to the target skeleton.
    pub joins: &'static [Join],
    /// Column compared with the source id.
    pub key: Column,
    pub columns: &'static [&'static str],
    pub order_by: &'static str,
}

pub static RELATIONS: &[RelationSpec] = &[
    RelationSpec {
        source: RecordKind::Dance,
        target: RecordKind::Recording,
        joins: &[Join::new("dancesrecordingsmap", "drm", col("r", "id"), col("drm", "recording_id"))],
        key: col("drm", "dance_id"),
        columns: &[],
        order_by: "r.name",
    },
    RelationSpec {
        source: RecordKind::Album,
        target: RecordKind::Recording,
        joins: &[],
        key: col("arm", "album_id"),
        columns: &["arm.tracknumber AS tracknumber"],
        order_by: "arm.tracknumber",
    },
    RelationSpec {
        source: RecordKind::Person,
        target: RecordKind::Dance,
        joins: &[],
        key: col("pn", "id"),
        columns: &[],
        order_by: "d.name",
    },
    RelationSpec {
        source: RecordKind::Person,
        target: RecordKind::Recording,
        joins: &[],
        key: col("pn", "id"),
        columns: &[],
        order_by: "r.name",
    },
    RelationSpec {
        source: RecordKind::Person,
        target: RecordKind::Album,
        joins: &[],
        key: col("p", "id"),
        columns: &[],
        order_by: "a.name",
    },
    RelationSpec {
        source: RecordKind::Person,
        target: RecordKind::Publication,
        joins: &[],
        key: col("pr", "id"),
        columns: &[],
        order_by: "pb.name",
    },
    RelationSpec {
        source: RecordKind::Person,
        target: RecordKind::Tune,
        joins: &[],
        key: col("p", "id"),
        columns: &[],
        order_by: "t.name",
    },
    RelationSpec {
        source: RecordKind::Dance,
        target: RecordKind::Step,
        joins: &[Join::new("dancesstepsmap", "dsm", col("st", "id"), col("dsm", "step_id"))],
        key: col("dsm", "dance_id"),
        columns: &[],
        order_by: "st.name",
    },
    RelationSpec {
        source: RecordKind::Dance,
        target: RecordKind::Tune,
        joins: &[Join::new("dancestunesmap", "dtm", col("t", "id"), col("dtm", "tune_id"))],
        key: col("dtm", "dance_id"),
        columns: &[],
        order_by: "t.name",
    },
    RelationSpec {
        source: RecordKind::Dance,
        target: RecordKind::Formation,
        joins: &[Join::new("dancesformationsmap", "dfm", col("f", "id"), col("dfm", "formation_id"))],
        key: col("dfm", "dance_id"),
        columns: &[],
        order_by: "f.name",
    },
    RelationSpec {
        source: RecordKind::Dance,
        target: RecordKind::Publication,
        joins: &[Join::new("dancespublicationsmap", "dpm", col("pb", "id"), col("dpm", "publication_id"))],
        key: col("dpm", "dance_id"),
        columns: &[],
        order_by: "pb.name",
    },
    RelationSpec {
        source: RecordKind::Publication,
        target: RecordKind::Dance,
        joins: &[],
        key: col("dpm", "publication_id"),
        columns: &[],
        order_by: "d.name",
    },
    RelationSpec {
        source: RecordKind::Publication,
        target: RecordKind::Tune,
        joins: &[Join::new("tunespublicationsmap", "tpm", col("t", "id"), col("tpm", "tune_id"))],
        key: col("tpm", "publication_id"),
        columns: &[],
        order_by: "t.name",
    },
    RelationSpec {
        source: RecordKind::Tune,
        target: RecordKind::Dance,
        joins: &[Join::new("dancestunesmap", "dtm", col("d", "id"), col("dtm", "dance_id"))],
        key: col("dtm", "tune_id"),
        columns: &[],
        order_by: "d.name",
    },
    RelationSpec {
        source: RecordKind::Tune,
        target: RecordKind::Recording,
        joins: &[Join::new("tunesrecordingsmap", "trm", col("r", "id"), col("trm", "recording_id"))],
        key: col("trm", "tune_id"),
        columns: &[],
        order_by: "r.name",
    },
    RelationSpec {
        source: RecordKind::Recording,
        target: RecordKind::Dance,
        joins: &[Join::new("dancesrecordingsmap", "drm", col("d", "id"), col("drm", "dance_id"))],
        key: col("drm", "recording_id"),
        columns: &[],
        order_by: "d.name",
    },
    RelationSpec {
        source: RecordKind::Recording,
        target: RecordKind::Tune,
        joins: &[Join::new("tunesrecordingsmap", "trm", col("t", "id"), col("trm", "tune_id"))],
        key: col("trm", "recording_id"),
        columns: &[],
        order_by: "t.name",
    },
    RelationSpec {
        source: RecordKind::Recording,
        target: RecordKind::Album,
        joins: &[Join::new("albumsrecordingsmap", "arm", col("a", "id"), col("arm", "album_id"))],
        key: col("arm", "recording_id"),
        columns: &[],
        order_by: "a.name",
    },
];

pub fn relation(source: RecordKind, target: RecordKind) -> Result<&'static RelationSpec> {
    RELATIONS
        .iter()
        .find(|r| r.source == source && r.target == target)
        .ok_or_else(|| CatalogError::UnknownRelation(format!("{source} -> {target}")))
}

// ------------- DDL -------------
pub const IHAVE: &str = "ihave";
pub const TAG: &str = "tag";

/// Columns added to every taggable table after each dataset installation.
pub const DERIVED_COLUMNS: [(&str, &str); 2] = [
    (IHAVE, "TINYINT(1) DEFAULT 0"),
    (TAG, "VARCHAR(256) DEFAULT NULL"),
];

/// Shape of the published dataset, used to bootstrap an empty store.
pub const REFERENCE_SCHEMA: &str = "
    create table if not exists person (id integer primary key, name text);
    create table if not exists dancetype (id integer primary key, name text);
    create table if not exists medleytype (id integer primary key, description text);
    create table if not exists shape (id integer primary key, name text);
    create table if not exists couples (id integer primary key, name text);
    create table if not exists progression (id integer primary key, name text);
    create table if not exists phrasing (id integer primary key, name text);
    create table if not exists step (id integer primary key, name text);
    create table if not exists formation (id integer primary key, name text);
    create table if not exists dance (
        id integer primary key,
        name text,
        barsperrepeat integer,
        type_id integer references dancetype(id),
        medleytype_id integer references medleytype(id),
        shape_id integer references shape(id),
        couples_id integer references couples(id),
        progression_id integer references progression(id),
        devisor_id integer references person(id)
    );
    create table if not exists publication (
        id integer primary key,
        name text,
        shortname text,
        devisor_id integer references person(id),
        rscds integer default 0
    );
    create table if not exists recording (
        id integer primary key,
        name text,
        repetitions integer,
        barsperrepeat integer,
        type_id integer references dancetype(id),
        medleytype_id integer references medleytype(id),
        phrasing_id integer references phrasing(id),
        artist_id integer references person(id)
    );
    create table if not exists album (
        id integer primary key,
        name text,
        productionyear integer,
        artist_id integer references person(id)
    );
    create table if not exists tune (
        id integer primary key,
        name text,
        composer_id integer references person(id)
    );
    create table if not exists dancespublicationsmap (dance_id integer, publication_id integer);
    create table if not exists dancesformationsmap (dance_id integer, formation_id integer);
    create table if not exists dancesstepsmap (dance_id integer, step_id integer);
    create table if not exists dancestunesmap (dance_id integer, tune_id integer);
    create table if not exists dancesrecordingsmap (dance_id integer, recording_id integer);
    create table if not exists albumsrecordingsmap (album_id integer, recording_id integer, tracknumber integer);
    create table if not exists tunesrecordingsmap (tune_id integer, recording_id integer);
    create table if not exists tunespublicationsmap (tune_id integer, publication_id integer);
";

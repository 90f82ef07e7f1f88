#![allow(dead_code)]

use std::path::Path;

use rusqlite::Connection;
use scdcat::collection::Collection;
use scdcat::schema::REFERENCE_SCHEMA;

/// A small slice of the published dataset.
///
/// dances: 1 Montgomeries' Rant, 2 The Reel of the 51st Division,
/// 3 Miss Gibson's Strathspey, 4 The Jig Nobody Danced, 5 O'Brien's Fancy
/// publications: 1 RSCDS Book 13 (dances 2, 3), 2 The Bon Accord Book (dances 4, 5)
/// albums: 1 Scottish Dance Music (recordings 2, 1), 2 More Dance Music (recording 3)
pub const SEED: &str = "
    insert into person (id, name) values
        (1, 'John Drewry'), (2, 'Roy Goldring'), (3, 'Jimmy Shand'), (4, 'Muriel O''Brien');
    insert into dancetype (id, name) values (1, 'Reel'), (2, 'Jig'), (3, 'Strathspey');
    insert into medleytype (id, description) values (1, 'S+R');
    insert into shape (id, name) values (1, 'Longwise - 4');
    insert into couples (id, name) values (1, '3C/4C');
    insert into progression (id, name) values (1, '213');
    insert into phrasing (id, name) values (1, 'R32');
    insert into formation (id, name) values (1, 'Poussette'), (2, 'Allemande'), (3, 'Rights and Lefts');
    insert into step (id, name) values (1, 'Skip Change'), (2, 'Pas de Basque'), (3, 'Strathspey Travelling');
    insert into dance (id, name, barsperrepeat, type_id, shape_id, couples_id, progression_id, devisor_id) values
        (1, 'Montgomeries'' Rant', 32, 1, 1, 1, 1, 2),
        (2, 'The Reel of the 51st Division', 32, 1, 1, 1, 1, 2),
        (3, 'Miss Gibson''s Strathspey', 32, 3, 1, 1, 1, 1),
        (4, 'The Jig Nobody Danced', 48, 2, 1, 1, 1, 1),
        (5, 'O''Brien''s Fancy', 40, 2, 1, 1, 1, 4);
    insert into publication (id, name, shortname, devisor_id, rscds) values
        (1, 'RSCDS Book 13', 'RSCDS 13', null, 1),
        (2, 'The Bon Accord Book', 'Bon Accord', 1, 0);
    insert into dancespublicationsmap (dance_id, publication_id) values (2, 1), (3, 1), (4, 2), (5, 2);
    insert into dancesformationsmap (dance_id, formation_id) values (1, 3), (2, 1), (2, 2), (3, 1), (4, 2);
    insert into dancesstepsmap (dance_id, step_id) values (1, 1), (2, 1), (2, 2), (3, 3), (4, 1), (5, 2);
    insert into recording (id, name, repetitions, barsperrepeat, type_id, phrasing_id, artist_id) values
        (1, 'Montgomeries'' Rant', 8, 32, 1, 1, 3),
        (2, 'Miss Gibson''s Strathspey', 8, 32, 3, 1, 3),
        (3, 'Reel of the 51st', 4, 32, 1, 1, 3),
        (4, 'Bonnie Jig', 8, 48, 2, 1, null);
    insert into album (id, name, productionyear, artist_id) values
        (1, 'Scottish Dance Music', 1959, 3), (2, 'More Dance Music', 1972, 3);
    insert into albumsrecordingsmap (album_id, recording_id, tracknumber) values (1, 2, 1), (1, 1, 2), (2, 3, 1);
    insert into dancesrecordingsmap (dance_id, recording_id) values (1, 1), (3, 2), (2, 3);
    insert into tune (id, name, composer_id) values (1, 'Montgomeries'' Rant', null), (2, 'Miss Gibson', 1);
    insert into dancestunesmap (dance_id, tune_id) values (1, 1), (3, 2);
    insert into tunesrecordingsmap (tune_id, recording_id) values (1, 1), (2, 2);
    insert into tunespublicationsmap (tune_id, publication_id) values (2, 1);
";

pub fn seed(connection: &Connection) {
    connection.execute_batch(SEED).expect("seed");
}

/// An in-memory collection holding the seed.
pub fn seeded() -> Collection {
    let collection = Collection::in_memory().expect("collection");
    collection
        .with_connection(|c| {
            seed(c);
            Ok(())
        })
        .expect("seeded");
    collection
}

/// Writes a dataset the way it is published: the seed plus `extra`, without derived columns.
pub fn publish(path: &Path, extra: &str) {
    let connection = Connection::open(path).expect("open published");
    connection.execute_batch(REFERENCE_SCHEMA).expect("schema");
    seed(&connection);
    connection.execute_batch(extra).expect("extra");
}

pub fn names(rows: &scdcat::persist::ResultSet) -> Vec<String> {
    rows.texts("name")
}

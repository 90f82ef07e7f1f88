mod common;

use std::collections::HashMap;

use common::{names, seeded};
use scdcat::collection::Collection;
use scdcat::schema::{Entity, RecordKind};

fn owned(collection: &Collection, entity: Entity) -> Vec<String> {
    names(
        &collection
            .search(entity, "", &HashMap::new(), true)
            .expect("query ok"),
    )
}

fn tag_of(collection: &Collection, kind: RecordKind, id: i64) -> Option<String> {
    let rows = collection.record(kind, id).expect("record");
    rows.value(0, "tag").and_then(|c| c.as_str()).map(String::from)
}

#[test]
fn owning_a_publication_owns_its_dances() {
    let collection = seeded();
    let propagation = collection
        .set_owned(Entity::Publication, 1, true)
        .expect("own publication");
    assert_eq!(propagation.updated, 1);
    assert_eq!(propagation.cascaded, 2);
    assert_eq!(
        owned(&collection, Entity::Dance),
        vec!["Miss Gibson's Strathspey", "The Reel of the 51st Division"]
    );
    assert_eq!(owned(&collection, Entity::Publication), vec!["RSCDS Book 13"]);
}

#[test]
fn disowning_a_publication_clears_its_dances() {
    let collection = seeded();
    collection.set_owned(Entity::Publication, 1, true).expect("own");
    collection.set_owned(Entity::Dance, 1, true).expect("own unrelated dance");
    collection.set_owned(Entity::Publication, 1, false).expect("disown");
    assert_eq!(owned(&collection, Entity::Dance), vec!["Montgomeries' Rant"]);
    assert!(owned(&collection, Entity::Publication).is_empty());
}

#[test]
fn children_do_not_propagate_upwards() {
    let collection = seeded();
    let propagation = collection.set_owned(Entity::Dance, 2, true).expect("own dance");
    assert_eq!(propagation.cascaded, 0);
    assert!(owned(&collection, Entity::Publication).is_empty());
    collection.set_owned(Entity::Recording, 3, true).expect("own recording");
    assert!(owned(&collection, Entity::Album).is_empty());
}

#[test]
fn disowning_one_of_two_dances_keeps_the_other() {
    let collection = seeded();
    collection.set_owned(Entity::Publication, 2, true).expect("own");
    assert_eq!(
        owned(&collection, Entity::Dance),
        vec!["O'Brien's Fancy", "The Jig Nobody Danced"]
    );
    collection.set_owned(Entity::Dance, 4, false).expect("disown one dance");
    assert_eq!(owned(&collection, Entity::Dance), vec!["O'Brien's Fancy"]);
    assert_eq!(owned(&collection, Entity::Publication), vec!["The Bon Accord Book"]);
}

#[test]
fn owning_an_album_owns_its_recordings() {
    let collection = seeded();
    let propagation = collection.set_owned(Entity::Album, 1, true).expect("own album");
    assert_eq!(propagation.cascaded, 2);
    assert_eq!(
        owned(&collection, Entity::Recording),
        vec!["Miss Gibson's Strathspey", "Montgomeries' Rant"]
    );
}

#[test]
fn tags_cascade_and_can_be_removed() {
    let collection = seeded();
    collection
        .set_tag(Entity::Publication, 2, Some("Muriel's signed copy"))
        .expect("tag");
    assert_eq!(tag_of(&collection, RecordKind::Publication, 2).as_deref(), Some("Muriel's signed copy"));
    assert_eq!(tag_of(&collection, RecordKind::Dance, 4).as_deref(), Some("Muriel's signed copy"));
    assert_eq!(tag_of(&collection, RecordKind::Dance, 1), None);

    collection.remove_tag(Entity::Publication, 2).expect("remove tag");
    assert_eq!(tag_of(&collection, RecordKind::Publication, 2), None);
    assert_eq!(tag_of(&collection, RecordKind::Dance, 5), None);
}

#[test]
fn empty_tag_is_not_absent() {
    let collection = seeded();
    collection.set_tag(Entity::Dance, 1, Some("")).expect("tag");
    assert_eq!(tag_of(&collection, RecordKind::Dance, 1).as_deref(), Some(""));
}

#[test]
fn unknown_ids_touch_nothing() {
    let collection = seeded();
    let propagation = collection.set_owned(Entity::Album, 999, true).expect("no-op");
    assert_eq!(propagation.updated, 0);
    assert_eq!(propagation.cascaded, 0);
    assert!(owned(&collection, Entity::Recording).is_empty());
}

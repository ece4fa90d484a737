use oakref_core::db::open_db_in_memory;
use oakref_core::{
    DataPoint, EntityKey, Entry, EntryRepository, EntryService, Field, ReferentialError,
    RepoError, SchemaValidator, Source, SourceId, SourceRepository, SqliteEntryRepository,
    SqliteSourceRepository, SqliteTaxonRepository, Taxon, TaxonLevel, TaxonRepository,
    ViolationKind,
};
use rusqlite::Connection;

fn setup() -> (Connection, SchemaValidator) {
    (open_db_in_memory().unwrap(), SchemaValidator::builtin().unwrap())
}

fn create_source(conn: &Connection, name: &str) -> SourceId {
    let repo = SqliteSourceRepository::try_new(conn).unwrap();
    repo.create_source(&Source::new("Book", name)).unwrap()
}

fn data_point_rows(conn: &Connection, entry: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM data_points WHERE entry_name = ?1;",
        [entry],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn save_and_get_round_trips_entry_with_data_points() {
    let (conn, validator) = setup();
    let first = create_source(&conn, "Oaks of the World");
    let second = create_source(&conn, "Field notes");
    let repo = SqliteEntryRepository::try_new(&conn, &validator).unwrap();

    let mut alba = Entry::new("alba")
        .with_data_point(Field::LeafColor, DataPoint::new("green", first).with_page("p. 12"))
        .with_data_point(Field::LeafColor, DataPoint::new("green-gray", second))
        .with_data_point(Field::Habitat, DataPoint::new("dry upland woods", first));
    alba.author = Some("L.".to_string());
    alba.synonyms.insert("candida".to_string());
    alba.preferred_source = Some(first);
    repo.save_entry(&alba).unwrap();

    let loaded = repo.get_entry("alba").unwrap().unwrap();
    assert_eq!(loaded, alba);
    assert_eq!(
        loaded
            .data_point_for(Field::LeafColor, first)
            .and_then(|point| point.page.as_deref()),
        Some("p. 12")
    );
}

#[test]
fn get_missing_entry_returns_none() {
    let (conn, validator) = setup();
    let repo = SqliteEntryRepository::try_new(&conn, &validator).unwrap();
    assert!(repo.get_entry("nope").unwrap().is_none());
}

#[test]
fn save_replaces_each_field_in_full() {
    let (conn, validator) = setup();
    let first = create_source(&conn, "A");
    let second = create_source(&conn, "B");
    let repo = SqliteEntryRepository::try_new(&conn, &validator).unwrap();

    let alba = Entry::new("alba")
        .with_data_point(Field::LeafColor, DataPoint::new("green", first))
        .with_data_point(Field::LeafColor, DataPoint::new("red", second))
        .with_data_point(Field::BudShape, DataPoint::new("ovoid", first));
    repo.save_entry(&alba).unwrap();

    let replaced =
        Entry::new("alba").with_data_point(Field::LeafColor, DataPoint::new("green", second));
    repo.save_entry(&replaced).unwrap();

    let loaded = repo.get_entry("alba").unwrap().unwrap();
    assert_eq!(loaded.data_points(Field::LeafColor).len(), 1);
    assert!(loaded.data_points(Field::BudShape).is_empty());
    assert_eq!(data_point_rows(&conn, "alba"), 1);
}

#[test]
fn duplicate_source_in_one_field_is_rejected_before_writing() {
    let (conn, validator) = setup();
    let source = create_source(&conn, "A");
    let repo = SqliteEntryRepository::try_new(&conn, &validator).unwrap();

    let mut alba = Entry::new("alba");
    alba.data.insert(
        Field::Habitat,
        vec![DataPoint::new("dry", source), DataPoint::new("wet", source)],
    );

    let err = repo.save_entry(&alba).unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert!(repo.get_entry("alba").unwrap().is_none());
}

#[test]
fn unknown_source_rolls_back_the_whole_save() {
    let (conn, validator) = setup();
    let source = create_source(&conn, "A");
    let repo = SqliteEntryRepository::try_new(&conn, &validator).unwrap();

    let original = Entry::new("alba").with_data_point(Field::LeafColor, DataPoint::new("green", source));
    repo.save_entry(&original).unwrap();

    let broken = Entry::new("alba")
        .with_data_point(Field::LeafColor, DataPoint::new("red", source))
        .with_data_point(Field::Habitat, DataPoint::new("swamp", 999));
    let err = repo.save_entry(&broken).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Referential(ReferentialError::UnknownSource {
            field: Some(Field::Habitat),
            source_id: 999,
            ..
        })
    ));

    assert_eq!(repo.get_entry("alba").unwrap().unwrap(), original);
}

#[test]
fn enumeration_violations_block_persistence() {
    let (conn, validator) = setup();
    let source = create_source(&conn, "A");
    let repo = SqliteEntryRepository::try_new(&conn, &validator).unwrap();

    let alba = Entry::new("alba")
        .with_data_point(Field::LeafColor, DataPoint::new("plaid", source))
        .with_data_point(Field::BarkTexture, DataPoint::new("fuzzy", source));
    match repo.save_entry(&alba).unwrap_err() {
        RepoError::Validation(err) => {
            assert_eq!(err.violations.len(), 2);
            assert_eq!(err.violations[0].field, "leaf_color");
            assert_eq!(err.violations[1].field, "bark_texture");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(repo.get_entry("alba").unwrap().is_none());
}

#[test]
fn create_and_update_enforce_existence() {
    let (conn, validator) = setup();
    let repo = SqliteEntryRepository::try_new(&conn, &validator).unwrap();

    assert!(matches!(
        repo.update_entry(&Entry::new("alba")).unwrap_err(),
        RepoError::NotFound(EntityKey::Entry(_))
    ));
    repo.create_entry(&Entry::new("alba")).unwrap();
    assert!(matches!(
        repo.create_entry(&Entry::new("alba")).unwrap_err(),
        RepoError::AlreadyExists(EntityKey::Entry(_))
    ));

    let mut updated = Entry::new("alba");
    updated.conservation_status = Some("LC".to_string());
    repo.update_entry(&updated).unwrap();
    assert_eq!(
        repo.get_entry("alba").unwrap().unwrap().conservation_status.as_deref(),
        Some("LC")
    );
}

#[test]
fn delete_entry_cascades_data_points() {
    let (conn, validator) = setup();
    let source = create_source(&conn, "A");
    let repo = SqliteEntryRepository::try_new(&conn, &validator).unwrap();

    repo.save_entry(
        &Entry::new("alba").with_data_point(Field::LeafShape, DataPoint::new("lobed", source)),
    )
    .unwrap();
    repo.delete_entry("alba").unwrap();

    assert!(repo.get_entry("alba").unwrap().is_none());
    assert_eq!(data_point_rows(&conn, "alba"), 0);
    assert!(matches!(
        repo.delete_entry("alba").unwrap_err(),
        RepoError::NotFound(_)
    ));
}

#[test]
fn list_and_search_are_ordered_by_name() {
    let (conn, validator) = setup();
    let repo = SqliteEntryRepository::try_new(&conn, &validator).unwrap();
    for name in ["rubra", "alba", "macrocarpa", "x_wild"] {
        repo.save_entry(&Entry::new(name)).unwrap();
    }

    let names: Vec<String> = repo
        .list_entries()
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, vec!["alba", "macrocarpa", "rubra", "x_wild"]);

    assert_eq!(repo.search_entry_names("AR").unwrap(), vec!["macrocarpa"]);
    assert_eq!(repo.search_entry_names("_").unwrap(), vec!["x_wild"]);
    assert!(repo.search_entry_names("%").unwrap().is_empty());
}

#[test]
fn service_rejects_unknown_taxa_before_writing() {
    let (conn, validator) = setup();
    let taxa = SqliteTaxonRepository::try_new(&conn).unwrap();
    taxa.create_taxon(&Taxon::new("Quercus", TaxonLevel::Subgenus))
        .unwrap();
    let service = EntryService::new(
        SqliteEntryRepository::try_new(&conn, &validator).unwrap(),
        SqliteTaxonRepository::try_new(&conn).unwrap(),
    );

    let mut alba = Entry::new("alba");
    alba.subgenus = Some("Quercus".to_string());
    alba.section = Some("Nowhere".to_string());
    match service.save_entry(&alba).unwrap_err() {
        RepoError::Validation(err) => {
            assert_eq!(err.violations.len(), 1);
            assert_eq!(
                err.violations[0].kind,
                ViolationKind::UnknownTaxon {
                    level: TaxonLevel::Section
                }
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(service.get_entry("alba").unwrap().is_none());

    alba.section = None;
    service.save_entry(&alba).unwrap();
    assert_eq!(service.list_entries().unwrap().len(), 1);
}

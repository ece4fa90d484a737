use oakref_core::db::open_db_in_memory;
use oakref_core::{
    DataPoint, EntityKey, Entry, EntryRepository, Field, ReferentialError, RepoError,
    SchemaValidator, Source, SourceRepository, SqliteEntryRepository, SqliteSourceRepository,
    SqliteTaxonRepository, Taxon, TaxonLevel, TaxonLink, TaxonRepository,
};

#[test]
fn create_update_and_list_sources() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteSourceRepository::try_new(&conn).unwrap();

    let mut book = Source::new("Book", "Oaks of North America");
    book.year = Some(1992);
    book.url = Some("  ".to_string());
    let first = repo.create_source(&book).unwrap();
    let second = repo
        .create_source(&Source::new("Website", "Oaks of the World"))
        .unwrap();
    assert!(second > first);

    let stored = repo.get_source(first).unwrap().unwrap();
    assert_eq!(stored.id, first);
    assert_eq!(stored.year, Some(1992));
    assert_eq!(stored.url, None);

    let mut renamed = stored.clone();
    renamed.license = Some("CC BY 4.0".to_string());
    repo.update_source(&renamed).unwrap();
    assert_eq!(
        repo.get_source(first).unwrap().unwrap().license.as_deref(),
        Some("CC BY 4.0")
    );

    let ids: Vec<_> = repo.list_sources().unwrap().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![first, second]);
    assert!(repo.source_exists(second).unwrap());
    assert!(!repo.source_exists(second + 100).unwrap());
}

#[test]
fn source_metadata_is_required() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteSourceRepository::try_new(&conn).unwrap();

    assert!(matches!(
        repo.create_source(&Source::new("Book", " ")).unwrap_err(),
        RepoError::InvalidInput(_)
    ));
    let mut missing = Source::new("Book", "Ghost");
    missing.id = 42;
    assert!(matches!(
        repo.update_source(&missing).unwrap_err(),
        RepoError::NotFound(EntityKey::Source(42))
    ));
}

#[test]
fn referenced_source_cannot_be_deleted() {
    let conn = open_db_in_memory().unwrap();
    let validator = SchemaValidator::builtin().unwrap();
    let sources = SqliteSourceRepository::try_new(&conn).unwrap();
    let entries = SqliteEntryRepository::try_new(&conn, &validator).unwrap();

    let cited = sources.create_source(&Source::new("Book", "Cited")).unwrap();
    let preferred = sources.create_source(&Source::new("Book", "Preferred")).unwrap();
    let unused = sources.create_source(&Source::new("Book", "Unused")).unwrap();

    let mut alba =
        Entry::new("alba").with_data_point(Field::LeafColor, DataPoint::new("green", cited));
    alba.preferred_source = Some(preferred);
    entries.save_entry(&alba).unwrap();

    assert!(matches!(
        sources.delete_source(cited).unwrap_err(),
        RepoError::Referential(ReferentialError::SourceInUse {
            data_points: 1,
            preferred_by: 0,
            ..
        })
    ));
    assert!(matches!(
        sources.delete_source(preferred).unwrap_err(),
        RepoError::Referential(ReferentialError::SourceInUse {
            data_points: 0,
            preferred_by: 1,
            ..
        })
    ));
    sources.delete_source(unused).unwrap();
    assert!(sources.get_source(unused).unwrap().is_none());
    assert!(matches!(
        sources.delete_source(unused).unwrap_err(),
        RepoError::NotFound(_)
    ));

    entries.delete_entry("alba").unwrap();
    sources.delete_source(cited).unwrap();
    sources.delete_source(preferred).unwrap();
    assert!(sources.list_sources().unwrap().is_empty());
}

#[test]
fn unknown_preferred_source_is_a_referential_error() {
    let conn = open_db_in_memory().unwrap();
    let validator = SchemaValidator::builtin().unwrap();
    let entries = SqliteEntryRepository::try_new(&conn, &validator).unwrap();

    let mut alba = Entry::new("alba");
    alba.preferred_source = Some(7);
    assert!(matches!(
        entries.save_entry(&alba).unwrap_err(),
        RepoError::Referential(ReferentialError::UnknownSource {
            field: None,
            source_id: 7,
            ..
        })
    ));
}

#[test]
fn taxa_crud_and_level_listing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTaxonRepository::try_new(&conn).unwrap();

    let mut quercus = Taxon::new("Quercus", TaxonLevel::Section);
    quercus.parent = Some("Quercus".to_string());
    quercus.links.push(TaxonLink {
        label: "Wikipedia".to_string(),
        url: "https://en.wikipedia.org/wiki/Quercus_sect._Quercus".to_string(),
    });
    repo.create_taxon(&Taxon::new("Quercus", TaxonLevel::Subgenus))
        .unwrap();
    repo.create_taxon(&quercus).unwrap();
    repo.create_taxon(&Taxon::new("Lobatae", TaxonLevel::Section))
        .unwrap();

    assert!(matches!(
        repo.create_taxon(&quercus).unwrap_err(),
        RepoError::AlreadyExists(EntityKey::Taxon { .. })
    ));
    assert_eq!(
        repo.get_taxon("Quercus", TaxonLevel::Section).unwrap(),
        Some(quercus.clone())
    );

    let all: Vec<_> = repo
        .list_taxa(None)
        .unwrap()
        .into_iter()
        .map(|taxon| (taxon.level, taxon.name))
        .collect();
    assert_eq!(
        all,
        vec![
            (TaxonLevel::Subgenus, "Quercus".to_string()),
            (TaxonLevel::Section, "Lobatae".to_string()),
            (TaxonLevel::Section, "Quercus".to_string()),
        ]
    );
    assert_eq!(repo.list_taxa(Some(TaxonLevel::Section)).unwrap().len(), 2);
    assert!(repo.list_taxa(Some(TaxonLevel::Complex)).unwrap().is_empty());

    quercus.notes = Some("white oaks".to_string());
    repo.update_taxon(&quercus).unwrap();
    assert_eq!(
        repo.get_taxon("Quercus", TaxonLevel::Section)
            .unwrap()
            .unwrap()
            .notes
            .as_deref(),
        Some("white oaks")
    );

    repo.delete_taxon("Lobatae", TaxonLevel::Section).unwrap();
    assert!(!repo.taxon_exists("Lobatae", TaxonLevel::Section).unwrap());
    assert!(matches!(
        repo.delete_taxon("Lobatae", TaxonLevel::Section).unwrap_err(),
        RepoError::NotFound(_)
    ));
}

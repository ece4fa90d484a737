use oakref_core::db::open_db_in_memory;
use oakref_core::merge::{ConflictRecord, FixedChoice, Resolution};
use oakref_core::{
    Conflict, ConflictChoice, ConflictResolver, DataPoint, Entry, EntryOutcome, EntryRepository,
    Field, ImportEngine, ImportError, SchemaValidator, Source, SourceId, SourceRepository,
    SqliteEntryRepository, SqliteSourceRepository, SqliteTaxonRepository, Taxon, TaxonLevel,
    TaxonRepository, ViolationKind,
};
use rusqlite::Connection;

struct Fixture {
    conn: Connection,
    validator: SchemaValidator,
    first: SourceId,
    second: SourceId,
}

fn setup() -> Fixture {
    let conn = open_db_in_memory().unwrap();
    let validator = SchemaValidator::builtin().unwrap();
    let sources = SqliteSourceRepository::try_new(&conn).unwrap();
    let first = sources.create_source(&Source::new("Book", "First")).unwrap();
    let second = sources.create_source(&Source::new("Website", "Second")).unwrap();

    let fixture = Fixture {
        conn,
        validator,
        first,
        second,
    };
    fixture
        .entries()
        .save_entry(
            &Entry::new("alba").with_data_point(Field::LeafColor, DataPoint::new("green", first)),
        )
        .unwrap();
    fixture
}

impl Fixture {
    fn entries(&self) -> SqliteEntryRepository<'_> {
        SqliteEntryRepository::try_new(&self.conn, &self.validator).unwrap()
    }

    fn engine(&self) -> ImportEngine<'_> {
        ImportEngine::try_new(&self.conn, &self.validator).unwrap()
    }

    fn leaf_colors(&self, name: &str) -> Vec<(SourceId, String)> {
        self.entries()
            .get_entry(name)
            .unwrap()
            .unwrap()
            .data_points(Field::LeafColor)
            .iter()
            .map(|point| (point.source_id, point.value.clone()))
            .collect()
    }

    fn snapshot(&self) -> (Vec<Entry>, Vec<(String, String, String, i64)>) {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT entry_name, field, value, source_id
                 FROM data_points
                 ORDER BY entry_name, field, source_id;",
            )
            .unwrap();
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        (self.entries().list_entries().unwrap(), rows)
    }
}

/// Answers conflicts from a script and records what it saw.
#[derive(Default)]
struct ScriptedResolver {
    choices: Vec<ConflictChoice>,
    seen: Vec<Conflict>,
    cancel_at: Option<String>,
    manual: Option<Entry>,
}

impl ConflictResolver for ScriptedResolver {
    fn choose(&mut self, conflict: &Conflict) -> Result<ConflictChoice, ImportError> {
        self.seen.push(conflict.clone());
        Ok(if self.choices.is_empty() {
            ConflictChoice::Keep
        } else {
            self.choices.remove(0)
        })
    }

    fn manual_merge(&mut self, _existing: &Entry, _incoming: &Entry) -> Result<Entry, ImportError> {
        self.manual
            .take()
            .ok_or_else(|| ImportError::Resolver("no manual entry scripted".to_string()))
    }

    fn checkpoint(&mut self, entry: &str) -> bool {
        self.cancel_at.as_deref() != Some(entry)
    }
}

#[test]
fn different_source_never_conflicts_and_both_points_coexist() {
    let fx = setup();
    let incoming =
        Entry::new("alba").with_data_point(Field::LeafColor, DataPoint::new("green-gray", 0));
    let mut resolver = ScriptedResolver::default();

    let report = fx
        .engine()
        .import(fx.second, vec![incoming], &mut resolver)
        .unwrap();

    assert!(resolver.seen.is_empty());
    assert!(report.conflicts.is_empty());
    assert_eq!(report.new_points, 1);
    assert_eq!(report.outcome("alba"), Some(&EntryOutcome::Updated));
    assert_eq!(
        fx.leaf_colors("alba"),
        vec![
            (fx.first, "green".to_string()),
            (fx.second, "green-gray".to_string())
        ]
    );
}

#[test]
fn same_source_conflict_take_overwrites_only_that_value() {
    let fx = setup();
    fx.entries()
        .save_entry(
            &Entry::new("alba")
                .with_data_point(Field::LeafColor, DataPoint::new("green", fx.first))
                .with_data_point(Field::LeafColor, DataPoint::new("green-gray", fx.second)),
        )
        .unwrap();
    let incoming = Entry::new("alba").with_data_point(Field::LeafColor, DataPoint::new("red", 0));
    let mut resolver = ScriptedResolver {
        choices: vec![ConflictChoice::Take],
        ..ScriptedResolver::default()
    };

    let report = fx
        .engine()
        .import(fx.first, vec![incoming], &mut resolver)
        .unwrap();

    assert_eq!(resolver.seen.len(), 1);
    assert_eq!(resolver.seen[0].existing, "green");
    assert_eq!(resolver.seen[0].incoming, "red");
    assert_eq!(report.conflicts[0].resolution, Resolution::Taken);
    assert_eq!(
        fx.leaf_colors("alba"),
        vec![
            (fx.first, "red".to_string()),
            (fx.second, "green-gray".to_string())
        ]
    );
}

#[test]
fn same_source_conflict_keep_leaves_store_unchanged() {
    let fx = setup();
    let before = fx.snapshot();
    let incoming = Entry::new("alba").with_data_point(Field::LeafColor, DataPoint::new("red", 0));

    let report = fx
        .engine()
        .import(fx.first, vec![incoming], &mut FixedChoice(ConflictChoice::Keep))
        .unwrap();

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.outcome("alba"), Some(&EntryOutcome::Unchanged));
    assert_eq!(fx.leaf_colors("alba"), vec![(fx.first, "green".to_string())]);
    assert_eq!(fx.snapshot(), before);
}

#[test]
fn identical_value_is_unchanged_without_asking() {
    let fx = setup();
    let incoming =
        Entry::new("alba").with_data_point(Field::LeafColor, DataPoint::new("green", 0));
    let mut resolver = ScriptedResolver::default();

    let report = fx
        .engine()
        .import(fx.first, vec![incoming], &mut resolver)
        .unwrap();

    assert!(resolver.seen.is_empty());
    assert_eq!(report.unchanged_points, 1);
    assert_eq!(report.outcome("alba"), Some(&EntryOutcome::Unchanged));
}

#[test]
fn skip_excludes_the_whole_entry_but_not_the_batch() {
    let fx = setup();
    let alba = Entry::new("alba")
        .with_data_point(Field::LeafColor, DataPoint::new("red", 0))
        .with_data_point(Field::BudShape, DataPoint::new("ovoid", 0));
    let rubra = Entry::new("rubra").with_data_point(Field::LeafShape, DataPoint::new("lobed", 0));

    let report = fx
        .engine()
        .import(
            fx.first,
            vec![alba, rubra],
            &mut FixedChoice(ConflictChoice::Skip),
        )
        .unwrap();

    assert_eq!(report.outcome("alba"), Some(&EntryOutcome::Skipped));
    assert_eq!(report.outcome("rubra"), Some(&EntryOutcome::Created));
    let stored_alba = fx.entries().get_entry("alba").unwrap().unwrap();
    assert!(stored_alba.data_points(Field::BudShape).is_empty());
    assert!(fx.entries().get_entry("rubra").unwrap().is_some());
}

#[test]
fn cancelling_mid_batch_rolls_back_every_write() {
    let fx = setup();
    let before = fx.snapshot();
    let batch = vec![
        Entry::new("rubra").with_data_point(Field::LeafShape, DataPoint::new("lobed", 0)),
        Entry::new("alba").with_data_point(Field::BudShape, DataPoint::new("ovoid", 0)),
        Entry::hybrid("×bebbiana", Some("alba"), Some("macrocarpa")),
    ];
    let mut resolver = ScriptedResolver {
        cancel_at: Some("×bebbiana".to_string()),
        ..ScriptedResolver::default()
    };

    let err = fx.engine().import(fx.first, batch, &mut resolver).unwrap_err();

    assert!(matches!(err, ImportError::Cancelled { ref entry } if entry == "×bebbiana"));
    assert_eq!(fx.snapshot(), before);
}

#[test]
fn unknown_source_fails_before_classification() {
    let fx = setup();
    let mut resolver = ScriptedResolver::default();
    let err = fx
        .engine()
        .import(999, vec![Entry::new("rubra")], &mut resolver)
        .unwrap_err();

    assert!(matches!(err, ImportError::UnknownSource(999)));
    assert!(fx.entries().get_entry("rubra").unwrap().is_none());
}

#[test]
fn invalid_entries_are_reported_and_excluded() {
    let fx = setup();
    let batch = vec![
        Entry::new("rubra").with_data_point(Field::LeafColor, DataPoint::new("plaid", 0)),
        Entry::new("velutina").with_data_point(Field::LeafColor, DataPoint::new("green", 0)),
    ];

    let report = fx
        .engine()
        .import(fx.first, batch, &mut FixedChoice(ConflictChoice::Keep))
        .unwrap();

    assert!(matches!(
        report.outcome("rubra"),
        Some(EntryOutcome::Invalid(_))
    ));
    assert_eq!(report.invalid(), 1);
    assert_eq!(report.written(), 1);
    assert!(fx.entries().get_entry("rubra").unwrap().is_none());
    assert!(fx.entries().get_entry("velutina").unwrap().is_some());
}

#[test]
fn hierarchy_fields_must_name_known_taxa() {
    let fx = setup();
    let mut garryana = Entry::new("garryana");
    garryana.section = Some("NoSuchSection".to_string());

    let report = fx
        .engine()
        .import(fx.first, vec![garryana.clone()], &mut FixedChoice(ConflictChoice::Keep))
        .unwrap();

    let Some(EntryOutcome::Invalid(err)) = report.outcome("garryana") else {
        panic!("expected invalid outcome, got {:?}", report.outcome("garryana"));
    };
    assert_eq!(err.violations[0].field, "section");
    assert_eq!(
        err.violations[0].kind,
        ViolationKind::UnknownTaxon {
            level: TaxonLevel::Section
        }
    );
    assert!(fx.entries().get_entry("garryana").unwrap().is_none());

    SqliteTaxonRepository::try_new(&fx.conn)
        .unwrap()
        .create_taxon(&Taxon::new("NoSuchSection", TaxonLevel::Section))
        .unwrap();
    let report = fx
        .engine()
        .import(fx.first, vec![garryana], &mut FixedChoice(ConflictChoice::Keep))
        .unwrap();
    assert_eq!(report.outcome("garryana"), Some(&EntryOutcome::Created));
}

#[test]
fn manual_merge_result_must_name_known_taxa() {
    let fx = setup();
    let mut manual = Entry::new("alba")
        .with_data_point(Field::LeafColor, DataPoint::new("red", fx.first));
    manual.subgenus = Some("Cerris".to_string());
    let mut resolver = ScriptedResolver {
        choices: vec![ConflictChoice::ManualMerge],
        manual: Some(manual),
        ..ScriptedResolver::default()
    };
    let incoming =
        Entry::new("alba").with_data_point(Field::LeafColor, DataPoint::new("red", 0));

    let report = fx
        .engine()
        .import(fx.first, vec![incoming], &mut resolver)
        .unwrap();

    assert!(matches!(
        report.outcome("alba"),
        Some(EntryOutcome::Invalid(_))
    ));
    assert_eq!(fx.leaf_colors("alba"), vec![(fx.first, "green".to_string())]);
}

#[test]
fn manual_merge_substitutes_the_returned_entry() {
    let fx = setup();
    let manual = Entry::new("alba")
        .with_data_point(Field::LeafColor, DataPoint::new("blue-green", fx.first))
        .with_data_point(Field::Habitat, DataPoint::new("limestone", fx.first));
    let mut resolver = ScriptedResolver {
        choices: vec![ConflictChoice::ManualMerge],
        manual: Some(manual.clone()),
        ..ScriptedResolver::default()
    };
    let incoming = Entry::new("alba")
        .with_data_point(Field::CommonNames, DataPoint::new("white oak", 0))
        .with_data_point(Field::LeafColor, DataPoint::new("red", 0));

    let report = fx
        .engine()
        .import(fx.first, vec![incoming], &mut resolver)
        .unwrap();

    assert_eq!(
        report.conflicts,
        vec![ConflictRecord {
            conflict: resolver.seen[0].clone(),
            resolution: Resolution::Manual,
        }]
    );
    assert_eq!(fx.entries().get_entry("alba").unwrap().unwrap(), manual);
}

#[test]
fn intrinsic_fields_merge_conservatively_and_batch_links_hybrids() {
    let fx = setup();
    let mut alba = Entry::new("alba");
    alba.author = Some("Not L.".to_string());
    alba.synonyms.insert("ramosa".to_string());
    let batch = vec![
        Entry::hybrid("×bebbiana", Some("alba"), Some("macrocarpa")),
        alba,
        Entry::new("macrocarpa"),
    ];

    let report = fx
        .engine()
        .import(fx.second, batch, &mut FixedChoice(ConflictChoice::Keep))
        .unwrap();
    assert_eq!(report.written(), 3);

    let stored = fx.entries().get_entry("alba").unwrap().unwrap();
    assert_eq!(stored.author.as_deref(), Some("Not L."));
    assert!(stored.synonyms.contains("ramosa"));
    assert!(stored.hybrids.contains("×bebbiana"));
    assert_eq!(fx.leaf_colors("alba"), vec![(fx.first, "green".to_string())]);

    let macrocarpa = fx.entries().get_entry("macrocarpa").unwrap().unwrap();
    assert!(macrocarpa.hybrids.contains("×bebbiana"));
}

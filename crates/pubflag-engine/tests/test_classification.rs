//! End-to-end classification passes against scripted lookups.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use pubflag_common::{Mode, PubflagError};
use pubflag_engine::{ClassificationResult, Collaborators, Engine, IdKind, RuleSource};
use pubflag_test_utils::{item, items_from_json, linked, test_config, RecordingStyler, ScriptedConverter, VecSource};

fn offline_engine() -> Engine {
    Engine::new(test_config(), Arc::new(ScriptedConverter::new())).unwrap()
}

#[tokio::test]
async fn test_text_doi_confirms() {
    let engine = offline_engine();
    let report = engine
        .run_pass(vec![item("Kim S. et al. ...see doi: 10.3390/ijms22010001...")])
        .await
        .unwrap();

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].result, ClassificationResult::confirmed(RuleSource::TextDoi));
}

#[tokio::test]
async fn test_competing_doi_link_overrides_weak_journal() {
    let engine = offline_engine();
    let competing = linked("Lee K. Review. Nutrients 2021; 13:1.", "https://doi.org/10.1016/j.cell.2020.01.001")
        .with_html("Lee K. Review. <i>Nutrients</i> 2021; 13:1.");

    let report = engine.run_pass(vec![competing]).await.unwrap();

    let result = report.records[0].result;
    assert!(!result.is_target_publisher);
    assert!(!result.is_potential);
    assert_eq!(result.source, RuleSource::CompetingDoiLink);
}

#[tokio::test]
async fn test_domain_link_outranks_competing_doi() {
    let engine = offline_engine();
    let both = item("Some citation")
        .with_link("https://doi.org/10.1016/j.cell.2020.01.001")
        .with_link("https://www.mdpi.com/1422-0067/22/1/1");

    let report = engine.run_pass(vec![both]).await.unwrap();
    assert_eq!(report.records[0].result, ClassificationResult::confirmed(RuleSource::DomainLink));
}

#[tokio::test]
async fn test_same_doi_in_different_casing_collapses() {
    let engine = offline_engine();
    let items = items_from_json(
        r#"[
            {"text": "Ref 1", "links": ["https://doi.org/10.3390/NU13010001"]},
            {"text": "Cited by: same paper", "links": ["https://doi.org/10.3390/nu13010001."]},
            {"text": "Another paper", "links": ["https://doi.org/10.3390/nu13010002"]}
        ]"#,
    );

    let report = engine.run_pass(items).await.unwrap();

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].key, "doi:10.3390/nu13010001");
    assert_eq!(report.records[0].items.len(), 2);
    assert_eq!(report.records[0].representative.text, "Ref 1");
    assert_eq!(report.records[1].key, "doi:10.3390/nu13010002");
    assert_eq!(report.confirmed, 2);
}

#[tokio::test]
async fn test_repeated_passes_are_idempotent() {
    let converter = Arc::new(ScriptedConverter::new().resolves(IdKind::Pmid, "33383772", "10.3390/ijms22010001"));
    let engine = Engine::new(test_config(), converter).unwrap();
    let items = vec![
        item("Kim S. PMID: 33383772"),
        item("Doe J. Int J Mol Sci 2020;21:1"),
        item("Roe P. Published by MDPI, Basel, Switzerland"),
        item("Plain citation with no signal"),
        linked("Foo", "https://doi.org/10.1038/s41586-020-2012-7"),
    ];

    let first = engine.run_pass(items.clone()).await.unwrap();
    let second = engine.run_pass(items).await.unwrap();

    let results = |r: &pubflag_engine::PassReport| r.records.iter().map(|rec| rec.result).collect::<Vec<_>>();
    assert_eq!(results(&first), results(&second));
    assert_eq!(
        results(&first),
        vec![
            ClassificationResult::confirmed(RuleSource::ExternalResolution),
            ClassificationResult::confirmed(RuleSource::StrongJournal),
            ClassificationResult::potential(),
            ClassificationResult::no_signal(),
            ClassificationResult::rejected(RuleSource::CompetingDoiLink),
        ]
    );
    assert_eq!(first.confirmed, 2);
    assert_eq!(first.potential, 1);
}

#[tokio::test]
async fn test_markup_twins_are_classified_separately() {
    let engine = offline_engine();
    let plain = item("Kim S. Review of Cells.").with_html("Kim S. Review of Cells.");
    let emphasised = item("Kim S. Review of Cells.").with_html("Kim S. Review of <i>Cells</i>.");

    let report = engine.run_pass(vec![plain, emphasised]).await.unwrap();

    assert_eq!(report.items_classified, 2);
    assert_eq!(report.cache_reuses, 0);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].result, ClassificationResult::confirmed(RuleSource::WeakJournal));
}

#[tokio::test]
async fn test_potential_matches_can_be_disabled() {
    let mut config = test_config();
    config.potential_matches = false;
    let engine = Engine::new(config, Arc::new(ScriptedConverter::new())).unwrap();

    let report = engine.run_pass(vec![item("MDPI, Basel, Switzerland")]).await.unwrap();
    assert_eq!(report.records[0].result, ClassificationResult::no_signal());
}

#[tokio::test]
async fn test_collaborators_receive_records_and_mode() {
    let mut config = test_config();
    config.mode = Mode::Hide;
    let engine = Engine::new(config, Arc::new(ScriptedConverter::new())).unwrap();
    let styler = Arc::new(RecordingStyler::default());
    let collaborators = Collaborators::new()
        .with_item_source(Arc::new(VecSource::new(vec![linked("x", "https://mdpi.com/a")])))
        .with_styler(styler.clone());

    let report = engine.run_with(&collaborators).await.unwrap();

    let (records, mode) = styler.last().unwrap();
    assert_eq!(mode, Mode::Hide);
    assert_eq!(records, report.records);
    assert_eq!(styler.applications(), 1);
}

#[tokio::test]
async fn test_missing_item_source_aborts_before_classifying() {
    let engine = offline_engine();
    let styler = Arc::new(RecordingStyler::default());
    let collaborators = Collaborators::new().with_styler(styler.clone());

    let err = engine.run_with(&collaborators).await.unwrap_err();

    assert!(matches!(err, PubflagError::MissingCollaborator("item source")));
    assert_eq!(styler.applications(), 0);
    assert_eq!(engine.cache().item_count(), 0);
}

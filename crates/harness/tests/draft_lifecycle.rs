use gridstage_core::{FieldValue, RecordId};
use gridstage_engine::{EditPhase, EngineConfig, EngineError};
use gridstage_harness::{init_tracing, students, students_engine, GatewayCall};

fn id(n: i64) -> RecordId {
    RecordId::new(n)
}

// ============================================================================
// Edit mode & discard
// ============================================================================

#[test]
fn enter_edit_mode_mirrors_snapshot_keys() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut engine = students_engine(EngineConfig::default())?;
    assert_eq!(engine.phase(), EditPhase::Viewing);
    assert!(engine.draft().is_none());

    engine.enter_edit_mode()?;
    let draft = engine.draft().ok_or("draft missing")?;
    assert!(draft.same_keys(engine.snapshot()));
    assert_eq!(draft.ids(), engine.snapshot().ids());
    assert!(engine.ledger().is_empty());
    assert_eq!(engine.phase(), EditPhase::Editing);
    Ok(())
}

#[test]
fn enter_edit_mode_on_empty_snapshot() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = students_engine(EngineConfig::default())?;
    engine.apply_fetched(Vec::new())?;
    engine.enter_edit_mode()?;
    let draft = engine.draft().ok_or("draft missing")?;
    assert!(draft.is_empty());
    assert!(draft.same_keys(engine.snapshot()));
    Ok(())
}

#[test]
fn discard_restores_snapshot_for_any_edit_sequence() -> Result<(), Box<dyn std::error::Error>> {
    let sequences: Vec<Vec<(i64, &str, FieldValue)>> = vec![
        vec![],
        vec![(7, "nom", "Durant".into())],
        vec![(3, "age", "12".into()), (3, "age", "13".into()), (9, "actif", "true".into())],
        vec![(12, "date_naissance", "not a date".into()), (7, "moyenne", "14,5".into())],
        vec![(3, "moyenne", FieldValue::Null), (9, "classe", "5e".into())],
    ];

    for sequence in sequences {
        let mut engine = students_engine(EngineConfig::default())?;
        let before = engine.snapshot().clone();
        engine.enter_edit_mode()?;
        for (rid, field, value) in sequence {
            engine.set_field(id(rid), field, value)?;
        }
        engine.exit_edit_mode(true)?;

        assert!(engine.ledger().is_empty());
        assert_eq!(engine.snapshot(), &before);
        assert_eq!(engine.visible(), engine.snapshot());
        assert_eq!(engine.phase(), EditPhase::Viewing);
        assert!(engine.gateway().calls().is_empty());
    }
    Ok(())
}

#[test]
fn discard_all_reenters_clean() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = students_engine(EngineConfig::default())?;
    engine.enter_edit_mode()?;
    engine.set_field(id(7), "nom", "Durant")?;
    engine.discard_all()?;
    assert_eq!(engine.phase(), EditPhase::Editing);
    assert_eq!(engine.draft(), Some(engine.snapshot()));
    Ok(())
}

#[test]
fn exit_without_discard_keeps_pending_edits() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = students_engine(EngineConfig::default())?;
    engine.enter_edit_mode()?;
    engine.set_field(id(7), "nom", "Durant")?;
    engine.exit_edit_mode(false)?;

    assert_eq!(engine.phase(), EditPhase::Viewing);
    assert_eq!(engine.ledger().len(), 1);
    let shown = engine.visible().get(id(7)).ok_or("record 7 missing")?;
    assert_eq!(shown.get("nom"), Some(&FieldValue::text("Durant")));

    let err = engine.set_field(id(7), "nom", "Other").unwrap_err();
    assert!(matches!(err, EngineError::NotEditable(_)));
    assert_eq!(engine.ledger().get(id(7), "nom"), Some(&FieldValue::text("Durant")));
    Ok(())
}

#[test]
fn exit_without_discard_on_clean_grid_drops_draft() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = students_engine(EngineConfig::default())?;
    engine.enter_edit_mode()?;
    engine.exit_edit_mode(false)?;
    assert!(engine.draft().is_none());
    Ok(())
}

// ============================================================================
// Ledger invariants
// ============================================================================

#[test]
fn ledger_and_draft_agree_after_edits() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = students_engine(EngineConfig::default())?;
    engine.enter_edit_mode()?;
    engine.set_field(id(3), "age", "12")?;
    engine.set_field(id(3), "age", "14")?;
    engine.set_field(id(9), "prenom", "Léa")?;

    assert_eq!(engine.ledger().len(), 2);
    let draft = engine.draft().ok_or("draft missing")?;
    for (rid, field, raw) in engine.ledger().iter() {
        assert!(engine.registry().is_editable(field));
        let record = draft.get(rid).ok_or("record missing")?;
        assert_eq!(record.get(field), Some(raw));
    }
    assert_eq!(engine.ledger().get(id(3), "age"), Some(&FieldValue::text("14")));
    Ok(())
}

#[test]
fn rejected_edits_leave_state_untouched() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = students_engine(EngineConfig::default())?;
    engine.enter_edit_mode()?;
    let draft_before = engine.draft().cloned();

    assert!(matches!(
        engine.set_field(id(3), "matricule", "M-9999"),
        Err(EngineError::NotEditable(_))
    ));
    assert!(matches!(
        engine.set_field(id(404), "nom", "Nobody"),
        Err(EngineError::RecordNotFound(_))
    ));
    assert_eq!(engine.draft().cloned(), draft_before);
    assert!(engine.ledger().is_empty());
    Ok(())
}

#[test]
fn visible_records_follow_fetch_order() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = students_engine(EngineConfig::default())?;
    let expected: Vec<RecordId> = students().iter().map(|r| r.id).collect();
    let shown: Vec<RecordId> = engine.visible_records().map(|r| r.id).collect();
    assert_eq!(shown, expected);

    engine.enter_edit_mode()?;
    engine.set_field(id(12), "nom", "Roux")?;
    let shown: Vec<RecordId> = engine.visible_records().map(|r| r.id).collect();
    assert_eq!(shown, expected);
    Ok(())
}

#[test]
fn refresh_issues_a_single_fetch() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = students_engine(EngineConfig::default())?;
    engine.refresh()?;
    assert_eq!(engine.gateway().calls(), &[GatewayCall::FetchAll]);
    assert_eq!(engine.snapshot_generation(), 2);
    Ok(())
}

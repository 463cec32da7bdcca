use std::collections::BTreeMap;

use gridstage_core::{FieldValue, RecordId};
use gridstage_engine::{Direction, EngineError, Persistence, PresetConfig, PresetStore};
use gridstage_harness::{init_tracing, students_registry, students_view, STUDENTS_VIEW};
use gridstage_storage::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn visibility(entries: &[(&str, bool)]) -> BTreeMap<String, bool> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn key(user: &str) -> String {
    PresetConfig::default().storage_key(STUDENTS_VIEW, user)
}

fn load(kv: MemoryKeyValueStore, user: &str) -> Result<PresetStore<MemoryKeyValueStore>, EngineError> {
    PresetStore::load(kv, &key(user), &students_registry()?)
}

// ============================================================================
// Create / apply / reload
// ============================================================================

#[test]
fn apply_after_create_returns_exact_layout() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut store = load(MemoryKeyValueStore::new(), "u1")?;
    let order = fields(&["nom", "prenom"]);
    let vis = visibility(&[("nom", true), ("prenom", false)]);

    assert!(store.create_preset("compact", order.clone(), vis.clone())?.is_saved());
    let layout = store.apply_preset("compact")?;
    assert_eq!(layout.field_order, order);
    assert_eq!(layout.visibility, vis);
    assert_eq!(store.active_name(), Some("compact"));
    assert_eq!(store.visible_fields(), vec!["nom"]);
    Ok(())
}

#[test]
fn compact_preset_survives_a_reload() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = load(MemoryKeyValueStore::new(), "u1")?;
    let order = fields(&["nom", "prenom"]);
    let vis = visibility(&[("nom", true), ("prenom", false)]);
    let _ = store.create_preset("compact", order.clone(), vis.clone())?;

    let raw = store.kv().read(&key("u1"))?.ok_or("nothing written")?;
    let document: serde_json::Value = serde_json::from_str(&raw)?;
    assert_eq!(document["version"], 1);
    assert_eq!(document["presets"][0]["fieldOrder"], serde_json::json!(["nom", "prenom"]));

    let mut reloaded = load(store.kv().clone(), "u1")?;
    assert_eq!(reloaded.active_name(), None);
    let layout = reloaded.apply_preset("compact")?;
    assert_eq!(layout.field_order, order);
    assert_eq!(layout.visibility, vis);
    Ok(())
}

#[test]
fn presets_are_kept_per_user() -> Result<(), Box<dyn std::error::Error>> {
    let mut alice = load(MemoryKeyValueStore::new(), "alice")?;
    let _ = alice.create_preset("mine", fields(&["nom"]), BTreeMap::new())?;

    let bob = load(alice.kv().clone(), "bob")?;
    assert!(bob.is_empty());
    let alice_again = load(alice.kv().clone(), "alice")?;
    assert_eq!(alice_again.names().collect::<Vec<_>>(), vec!["mine"]);
    Ok(())
}

#[test]
fn stored_presets_lose_fields_no_longer_declared() -> Result<(), Box<dyn std::error::Error>> {
    let mut kv = MemoryKeyValueStore::new();
    kv.write(
        &key("u1"),
        r#"{"version":1,"presets":[{"name":"old","fieldOrder":["nom","telephone","age"],"visibility":{"telephone":false,"age":false}}]}"#,
    )?;
    let store = load(kv, "u1")?;
    let old = store.get("old").ok_or("preset missing")?;
    assert_eq!(old.layout.field_order, fields(&["nom", "age"]));
    assert_eq!(old.layout.visibility, visibility(&[("age", false)]));
    Ok(())
}

#[test]
fn corrupt_document_fails_to_load() -> Result<(), Box<dyn std::error::Error>> {
    let mut kv = MemoryKeyValueStore::new();
    kv.write(&key("u1"), "{not json")?;
    assert!(matches!(load(kv.clone(), "u1"), Err(EngineError::Serialization(_))));

    kv.write(&key("u1"), r#"{"version":2,"presets":[]}"#)?;
    assert!(matches!(load(kv, "u1"), Err(EngineError::Serialization(_))));
    Ok(())
}

// ============================================================================
// Edit buffer
// ============================================================================

#[test]
fn save_without_rename_updates_in_place() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = load(MemoryKeyValueStore::new(), "u1")?;
    let _ = store.create_preset(
        "compact",
        fields(&["nom", "prenom"]),
        visibility(&[("nom", true), ("prenom", false)]),
    )?;

    store.begin_editing("compact")?;
    assert!(store.toggle_visibility("prenom")?);
    assert!(store.save_edited_preset(None)?.is_saved());

    assert_eq!(store.len(), 1);
    assert!(store.edit_buffer().is_none());
    let compact = store.get("compact").ok_or("preset missing")?;
    assert_eq!(compact.layout.visibility.get("prenom"), Some(&true));

    let reloaded = load(store.kv().clone(), "u1")?;
    let compact = reloaded.get("compact").ok_or("preset missing after reload")?;
    assert_eq!(compact.layout.visibility.get("prenom"), Some(&true));
    Ok(())
}

#[test]
fn save_with_rename_replaces_the_original() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = load(MemoryKeyValueStore::new(), "u1")?;
    let _ = store.create_preset("draft", fields(&["nom", "prenom", "age"]), BTreeMap::new())?;
    let _ = store.create_preset("other", fields(&["nom"]), BTreeMap::new())?;
    store.apply_preset("draft")?;

    store.begin_editing("draft")?;
    assert!(store.reorder("age", Direction::Up)?);
    assert!(!store.reorder("nom", Direction::Up)?);
    assert!(matches!(
        store.save_edited_preset(Some("other")),
        Err(EngineError::DuplicateName(_))
    ));
    let _ = store.save_edited_preset(Some("par âge"))?;

    assert_eq!(store.names().collect::<Vec<_>>(), vec!["other", "par âge"]);
    assert_eq!(store.active_name(), Some("par âge"));
    assert_eq!(store.visible_fields(), vec!["nom", "age", "prenom"]);
    Ok(())
}

#[test]
fn buffer_operations_need_an_open_buffer() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = load(MemoryKeyValueStore::new(), "u1")?;
    assert!(matches!(store.toggle_visibility("nom"), Err(EngineError::NoEditBuffer)));
    assert!(matches!(store.reorder("nom", Direction::Down), Err(EngineError::NoEditBuffer)));
    assert!(matches!(store.save_edited_preset(None), Err(EngineError::NoEditBuffer)));

    let _ = store.create_preset("short", fields(&["nom"]), BTreeMap::new())?;
    store.begin_editing("short")?;
    assert!(matches!(store.toggle_visibility("age"), Err(EngineError::UnknownField(_))));
    store.toggle_visibility("nom")?;
    store.cancel_editing();
    let short = store.get("short").ok_or("preset missing")?;
    assert!(short.layout.is_visible("nom"));
    Ok(())
}

#[test]
fn save_buffer_as_new_preset_keeps_the_original() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = load(MemoryKeyValueStore::new(), "u1")?;
    let _ = store.create_preset("base", fields(&["nom", "prenom"]), BTreeMap::new())?;
    store.begin_editing("base")?;
    store.toggle_visibility("prenom")?;
    let _ = store.save_buffer_as_new_preset("base sans prénom")?;

    assert!(store.edit_buffer().is_none());
    assert_eq!(store.len(), 2);
    assert!(store.get("base").ok_or("base missing")?.layout.is_visible("prenom"));
    let copy = store.get("base sans prénom").ok_or("copy missing")?;
    assert!(!copy.layout.is_visible("prenom"));
    Ok(())
}

// ============================================================================
// CRUD errors & persistence failures
// ============================================================================

#[test]
fn invalid_presets_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = load(MemoryKeyValueStore::new(), "u1")?;
    let _ = store.create_preset("a", fields(&["nom"]), BTreeMap::new())?;

    assert!(matches!(
        store.create_preset("a", fields(&["age"]), BTreeMap::new()),
        Err(EngineError::DuplicateName(_))
    ));
    assert!(matches!(
        store.create_preset("", fields(&["nom"]), BTreeMap::new()),
        Err(EngineError::InvalidPreset(_))
    ));
    assert!(matches!(
        store.create_preset("b", fields(&["nom", "nom"]), BTreeMap::new()),
        Err(EngineError::InvalidPreset(_))
    ));
    assert!(matches!(
        store.create_preset("b", fields(&["telephone"]), BTreeMap::new()),
        Err(EngineError::InvalidPreset(_))
    ));
    assert!(matches!(
        store.create_preset("b", fields(&["nom"]), visibility(&[("age", false)])),
        Err(EngineError::InvalidPreset(_))
    ));
    assert!(matches!(store.apply_preset("b"), Err(EngineError::NotFound(_))));
    assert!(matches!(store.delete_preset("b"), Err(EngineError::NotFound(_))));
    assert_eq!(store.len(), 1);
    Ok(())
}

#[test]
fn rename_and_delete_follow_the_active_preset() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = load(MemoryKeyValueStore::new(), "u1")?;
    let _ = store.create_preset("a", fields(&["nom", "age"]), BTreeMap::new())?;
    let _ = store.create_preset("b", fields(&["prenom"]), BTreeMap::new())?;
    store.apply_preset("a")?;

    assert!(matches!(store.rename_preset("a", "b"), Err(EngineError::DuplicateName(_))));
    assert!(store.rename_preset("a", "c")?.is_saved());
    assert_eq!(store.active_name(), Some("c"));

    let _ = store.delete_preset("c")?;
    assert_eq!(store.active_name(), None);
    assert_eq!(store.active_layout().field_order, fields(&["nom", "age"]));

    store.reset_layout();
    let registry = students_registry()?;
    assert_eq!(store.active_layout().field_order.len(), registry.len());
    Ok(())
}

#[test]
fn quota_failure_keeps_memory_state_and_flags_divergence() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = load(MemoryKeyValueStore::with_quota(16), "u1")?;
    let persistence = store.create_preset("compact", fields(&["nom", "prenom"]), BTreeMap::new())?;

    let Persistence::Unsaved { reason } = persistence else {
        return Err("write should have exceeded the quota".into());
    };
    assert!(reason.contains("quota"));
    assert!(store.is_diverged());
    assert!(store.get("compact").is_some());
    assert!(store.kv().is_empty());

    store.kv_mut().set_quota(None);
    assert!(store.delete_preset("compact")?.is_saved());
    assert!(!store.is_diverged());
    Ok(())
}

#[test]
fn presets_persist_in_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("presets.db");
    let path = path.to_str().ok_or("non-utf8 path")?;
    let registry = students_registry()?;

    {
        let mut store = PresetStore::load(SqliteKeyValueStore::open(path)?, &key("u1"), &registry)?;
        let _ = store.create_preset(
            "compact",
            fields(&["nom", "prenom"]),
            visibility(&[("prenom", false)]),
        )?;
    }

    let mut store = PresetStore::load(SqliteKeyValueStore::open(path)?, &key("u1"), &registry)?;
    assert_eq!(store.apply_preset("compact")?.visible_fields().collect::<Vec<_>>(), vec!["nom"]);
    Ok(())
}

// ============================================================================
// Grid view
// ============================================================================

#[test]
fn grid_rows_use_the_active_preset() -> Result<(), Box<dyn std::error::Error>> {
    let mut view = students_view(MemoryKeyValueStore::new(), "u1")?;
    assert_eq!(view.columns().len(), students_registry()?.len());

    let _ = view.presets.create_preset(
        "compact",
        fields(&["prenom", "nom", "age"]),
        visibility(&[("age", false)]),
    )?;
    view.presets.apply_preset("compact")?;
    view.engine.enter_edit_mode()?;
    view.engine.set_field(RecordId::new(9), "nom", "Moreau-Blanc")?;

    let rows = view.rows();
    assert_eq!(rows.len(), 4);
    assert_eq!(view.columns(), vec!["prenom", "nom"]);
    let row = rows.iter().find(|r| r.id == RecordId::new(9)).ok_or("row 9 missing")?;
    assert_eq!(row.cells[1].value, Some(&FieldValue::text("Moreau-Blanc")));
    assert!(row.cells[1].pending);
    assert!(!row.cells[0].pending);
    Ok(())
}

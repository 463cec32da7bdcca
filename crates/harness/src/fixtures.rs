use gridstage_core::{CoreError, FieldKind, FieldRegistry, FieldSpec, FieldValue, Record, RecordId};
use gridstage_engine::{DraftEngine, EngineConfig, EngineError, GridView, PresetConfig, PresetStore};
use gridstage_storage::MemoryKeyValueStore;

use crate::ScriptedGateway;

pub const STUDENTS_VIEW: &str = "students";

/// Route engine logs to the test output. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn students_registry() -> Result<FieldRegistry, CoreError> {
    FieldRegistry::new(vec![
        FieldSpec::read_only("matricule", FieldKind::Text),
        FieldSpec::editable("nom", FieldKind::Text),
        FieldSpec::editable("prenom", FieldKind::Text),
        FieldSpec::editable("age", FieldKind::Integer),
        FieldSpec::editable("moyenne", FieldKind::Decimal),
        FieldSpec::editable("date_naissance", FieldKind::Date),
        FieldSpec::editable("classe", FieldKind::options(["6e", "5e", "4e", "3e"])),
        FieldSpec::editable("actif", FieldKind::boolean()),
        FieldSpec::read_only("inscrit_le", FieldKind::Date),
    ])
}

pub fn users_registry() -> Result<FieldRegistry, CoreError> {
    FieldRegistry::new(vec![
        FieldSpec::read_only("email", FieldKind::Text),
        FieldSpec::editable("nom", FieldKind::Text),
        FieldSpec::editable("prenom", FieldKind::Text),
        FieldSpec::editable("is_admin", FieldKind::role_labels("Admin", "User")),
        FieldSpec::editable("actif", FieldKind::boolean()),
        FieldSpec::read_only("derniere_connexion", FieldKind::Date),
    ])
}

pub fn student(id: i64, nom: &str, prenom: &str, age: i64) -> Record {
    Record::with_fields(
        RecordId::new(id),
        [
            ("matricule", FieldValue::text(format!("M-{id:04}"))),
            ("nom", FieldValue::text(nom)),
            ("prenom", FieldValue::text(prenom)),
            ("age", FieldValue::Integer(age)),
            ("classe", FieldValue::text("6e")),
            ("actif", FieldValue::Boolean(false)),
        ],
    )
}

/// Students 3, 7, 9 and 12, in that fetch order.
pub fn students() -> Vec<Record> {
    vec![
        student(3, "Bernard", "Lina", 11),
        student(7, "Dupont", "Hugo", 12),
        student(9, "Moreau", "Emma", 11),
        student(12, "Petit", "Noah", 13),
    ]
}

pub fn user(id: i64, email: &str, admin: bool) -> Record {
    Record::with_fields(
        RecordId::new(id),
        [
            ("email", FieldValue::text(email)),
            ("nom", FieldValue::text("")),
            ("is_admin", FieldValue::Boolean(admin)),
            ("actif", FieldValue::Boolean(true)),
        ],
    )
}

/// A students engine over a scripted gateway, already loaded.
pub fn students_engine(config: EngineConfig) -> Result<DraftEngine<ScriptedGateway>, EngineError> {
    let mut engine = DraftEngine::with_config(
        students_registry()?,
        ScriptedGateway::new(students()),
        config,
    );
    engine.refresh()?;
    engine.gateway_mut().clear_calls();
    Ok(engine)
}

pub fn students_view(
    kv: MemoryKeyValueStore,
    user: &str,
) -> Result<GridView<ScriptedGateway, MemoryKeyValueStore>, EngineError> {
    let key = PresetConfig::default().storage_key(STUDENTS_VIEW, user);
    let presets = PresetStore::load(kv, &key, &students_registry()?)?;
    let engine = students_engine(EngineConfig::default())?;
    Ok(GridView::new(engine, presets))
}

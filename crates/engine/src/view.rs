use gridstage_core::{FieldValue, RecordId};
use gridstage_storage::{CollectionGateway, KeyValueStore};

use crate::presets::PresetStore;
use crate::DraftEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell<'a> {
    pub field: &'a str,
    pub value: Option<&'a FieldValue>,
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row<'a> {
    pub id: RecordId,
    pub cells: Vec<Cell<'a>>,
}

/// One grid screen: the records being edited and the layout they are shown in.
pub struct GridView<G: CollectionGateway, K: KeyValueStore> {
    pub engine: DraftEngine<G>,
    pub presets: PresetStore<K>,
}

impl<G: CollectionGateway, K: KeyValueStore> GridView<G, K> {
    pub fn new(engine: DraftEngine<G>, presets: PresetStore<K>) -> Self {
        Self { engine, presets }
    }

    pub fn columns(&self) -> Vec<&str> {
        self.presets.visible_fields()
    }

    /// Visible records projected onto the active layout's visible fields.
    pub fn rows(&self) -> Vec<Row<'_>> {
        let columns = self.columns();
        self.engine
            .visible_records()
            .map(|record| Row {
                id: record.id,
                cells: columns
                    .iter()
                    .map(|&field| Cell {
                        field,
                        value: record.get(field),
                        pending: self.engine.is_pending(record.id, field),
                    })
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use gridstage_core::{FieldKind, FieldRegistry, FieldSpec, Record};
    use gridstage_storage::{MemoryKeyValueStore, SqliteCollection};

    fn view() -> GridView<SqliteCollection, MemoryKeyValueStore> {
        let registry = FieldRegistry::new(vec![
            FieldSpec::read_only("email", FieldKind::Text),
            FieldSpec::editable("nom", FieldKind::Text),
            FieldSpec::editable("role", FieldKind::role_labels("Admin", "User")),
        ])
        .unwrap();
        let mut users = SqliteCollection::open_in_memory("users").unwrap();
        users
            .insert(&Record::with_fields(
                RecordId::new(1),
                [("email", "a@b.fr"), ("nom", "Ada")],
            ))
            .unwrap();
        let presets = PresetStore::load(MemoryKeyValueStore::new(), "p", &registry).unwrap();
        let mut engine = DraftEngine::new(registry, users);
        engine.refresh().unwrap();
        GridView::new(engine, presets)
    }

    #[test]
    fn rows_follow_active_layout() {
        let mut view = view();
        let _ = view
            .presets
            .create_preset(
                "short",
                vec!["nom".into(), "email".into()],
                BTreeMap::from([("email".to_string(), false)]),
            )
            .unwrap();
        view.presets.apply_preset("short").unwrap();
        let rows = view.rows();
        assert_eq!(rows.len(), 1);
        let fields: Vec<&str> = rows[0].cells.iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["nom"]);
    }

    #[test]
    fn pending_cells_are_flagged() {
        let mut view = view();
        view.engine.enter_edit_mode().unwrap();
        view.engine.set_field(RecordId::new(1), "role", "Admin").unwrap();
        let rows = view.rows();
        let role = rows[0].cells.iter().find(|c| c.field == "role").unwrap();
        assert!(role.pending);
        assert_eq!(role.value, Some(&FieldValue::text("Admin")));
        let email = rows[0].cells.iter().find(|c| c.field == "email").unwrap();
        assert!(!email.pending);
    }
}

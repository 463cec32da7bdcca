use std::collections::BTreeMap;

use gridstage_core::{FieldValue, RecordId};

/// Not-yet-committed edits, keyed by record then field. Values are raw, as
/// typed by the operator. One value per (record, field); later writes win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingLedger {
    entries: BTreeMap<RecordId, BTreeMap<String, FieldValue>>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: RecordId, field: &str, raw: FieldValue) -> Option<FieldValue> {
        self.entries
            .entry(id)
            .or_default()
            .insert(field.to_string(), raw)
    }

    pub fn get(&self, id: RecordId, field: &str) -> Option<&FieldValue> {
        self.entries.get(&id).and_then(|fields| fields.get(field))
    }

    pub fn contains(&self, id: RecordId, field: &str) -> bool {
        self.get(id, field).is_some()
    }

    pub fn fields_for(&self, id: RecordId) -> Option<&BTreeMap<String, FieldValue>> {
        self.entries.get(&id)
    }

    pub fn remove_field(&mut self, id: RecordId, field: &str) -> Option<FieldValue> {
        let fields = self.entries.get_mut(&id)?;
        let removed = fields.remove(field);
        if fields.is_empty() {
            self.entries.remove(&id);
        }
        removed
    }

    pub fn remove_record(&mut self, id: RecordId) -> Option<BTreeMap<String, FieldValue>> {
        self.entries.remove(&id)
    }

    /// Drop the entries of `id` that still hold exactly the values in `sent`.
    /// Entries rewritten since `sent` was captured stay pending.
    pub fn settle(&mut self, id: RecordId, sent: &BTreeMap<String, FieldValue>) -> usize {
        let Some(fields) = self.entries.get_mut(&id) else {
            return 0;
        };
        let before = fields.len();
        fields.retain(|field, raw| sent.get(field) != Some(raw));
        let settled = before - fields.len();
        if fields.is_empty() {
            self.entries.remove(&id);
        }
        settled
    }

    /// Records with at least one pending field, ascending by id.
    pub fn record_ids(&self) -> Vec<RecordId> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &str, &FieldValue)> {
        self.entries.iter().flat_map(|(id, fields)| {
            fields
                .iter()
                .map(move |(field, raw)| (*id, field.as_str(), raw))
        })
    }

    /// Number of pending (record, field) entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn record_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn retain_records(&mut self, mut keep: impl FnMut(RecordId) -> bool) -> Vec<RecordId> {
        let dropped: Vec<RecordId> = self
            .entries
            .keys()
            .copied()
            .filter(|id| !keep(*id))
            .collect();
        for id in &dropped {
            self.entries.remove(id);
        }
        dropped
    }
}

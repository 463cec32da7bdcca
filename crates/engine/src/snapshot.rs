use std::collections::BTreeMap;

use gridstage_core::{CoreError, Record, RecordId};

/// Records keyed by id, iterated in the order the remote collection returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    order: Vec<RecordId>,
    records: BTreeMap<RecordId, Record>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Record>) -> Result<Self, CoreError> {
        let mut collection = Self::new();
        for record in records {
            let id = record.id;
            if collection.records.insert(id, record).is_some() {
                return Err(CoreError::InvalidData(format!("duplicate record id: {id}")));
            }
            collection.order.push(id);
        }
        Ok(collection)
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        self.records.get_mut(&id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn ids(&self) -> &[RecordId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Same key set, regardless of field values.
    pub fn same_keys(&self, other: &Collection) -> bool {
        self.records.len() == other.records.len()
            && self.records.keys().all(|id| other.records.contains_key(id))
    }
}

/// Last fetched authoritative collection. Only ever replaced whole.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: Collection,
    generation: u64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &Collection {
        &self.current
    }

    /// Number of fetches applied so far; zero before the first load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn replace(&mut self, collection: Collection) {
        self.current = collection;
        self.generation += 1;
    }
}

use std::collections::BTreeMap;

use serde_json::Value;

use gridstage_core::{record::patch_to_json, Patch, Record, RecordId};
use gridstage_storage::{CollectionGateway, GatewayError};

/// Identifier property of every remote row.
pub const ID_KEY: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    FetchAll,
    FetchById(RecordId),
    Update(RecordId, Patch),
    Delete(RecordId),
}

/// In-memory remote collection that records every call and fails on demand.
/// Rows are kept as the JSON objects a REST API would return, so values go
/// through the same wire rendering a real backend sees.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    rows: Vec<Value>,
    calls: Vec<GatewayCall>,
    bodies: Vec<Value>,
    update_failures: BTreeMap<RecordId, GatewayError>,
    delete_failures: BTreeMap<RecordId, GatewayError>,
    fetch_failure: Option<GatewayError>,
}

fn row_id(row: &Value) -> Option<RecordId> {
    row.get(ID_KEY).and_then(Value::as_i64).map(RecordId::new)
}

fn decode(row: &Value) -> Result<Record, GatewayError> {
    Record::from_json_object(ID_KEY, row)
        .map_err(|e| GatewayError::Network(format!("malformed row: {e}")))
}

impl ScriptedGateway {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            rows: records.iter().map(|r| r.to_json(ID_KEY)).collect(),
            ..Self::default()
        }
    }

    /// Every later `update_by_id(id, ..)` fails with `error`.
    pub fn fail_update(&mut self, id: RecordId, error: GatewayError) {
        self.update_failures.insert(id, error);
    }

    pub fn fail_delete(&mut self, id: RecordId, error: GatewayError) {
        self.delete_failures.insert(id, error);
    }

    pub fn fail_fetch(&mut self, error: GatewayError) {
        self.fetch_failure = Some(error);
    }

    pub fn clear_failures(&mut self) {
        self.update_failures.clear();
        self.delete_failures.clear();
        self.fetch_failure = None;
    }

    pub fn calls(&self) -> &[GatewayCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
        self.bodies.clear();
    }

    /// Update calls in the order they were made, failed ones included.
    pub fn updates(&self) -> Vec<(RecordId, &Patch)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::Update(id, patch) => Some((*id, patch)),
                _ => None,
            })
            .collect()
    }

    /// JSON bodies of the update requests, in call order.
    pub fn bodies(&self) -> &[Value] {
        &self.bodies
    }

    pub fn row(&self, id: RecordId) -> Option<&Value> {
        self.rows.iter().find(|row| row_id(row) == Some(id))
    }

    /// The remote record as the next fetch would return it.
    pub fn record(&self, id: RecordId) -> Option<Record> {
        self.row(id).and_then(|row| decode(row).ok())
    }

    /// Change the remote side directly, as another operator would.
    pub fn upsert_remote(&mut self, record: Record) {
        let row = record.to_json(ID_KEY);
        match self.rows.iter_mut().find(|r| row_id(r) == Some(record.id)) {
            Some(existing) => *existing = row,
            None => self.rows.push(row),
        }
    }

    pub fn remove_remote(&mut self, id: RecordId) {
        self.rows.retain(|row| row_id(row) != Some(id));
    }
}

impl CollectionGateway for ScriptedGateway {
    fn fetch_all(&mut self) -> Result<Vec<Record>, GatewayError> {
        self.calls.push(GatewayCall::FetchAll);
        if let Some(e) = &self.fetch_failure {
            return Err(e.clone());
        }
        self.rows.iter().map(decode).collect()
    }

    fn fetch_by_id(&mut self, id: RecordId) -> Result<Record, GatewayError> {
        self.calls.push(GatewayCall::FetchById(id));
        if let Some(e) = &self.fetch_failure {
            return Err(e.clone());
        }
        self.row(id).ok_or(GatewayError::NotFound(id)).and_then(decode)
    }

    fn update_by_id(&mut self, id: RecordId, patch: &Patch) -> Result<Record, GatewayError> {
        let body = patch_to_json(patch);
        self.calls.push(GatewayCall::Update(id, patch.clone()));
        self.bodies.push(body.clone());
        if let Some(e) = self.update_failures.get(&id) {
            return Err(e.clone());
        }
        let row = self
            .rows
            .iter_mut()
            .find(|row| row_id(row) == Some(id))
            .ok_or(GatewayError::NotFound(id))?;
        if let (Some(fields), Value::Object(changes)) = (row.as_object_mut(), body) {
            fields.extend(changes);
        }
        decode(row)
    }

    fn delete_by_id(&mut self, id: RecordId) -> Result<(), GatewayError> {
        self.calls.push(GatewayCall::Delete(id));
        if let Some(e) = self.delete_failures.get(&id) {
            return Err(e.clone());
        }
        let before = self.rows.len();
        self.remove_remote(id);
        if self.rows.len() == before {
            return Err(GatewayError::NotFound(id));
        }
        Ok(())
    }
}

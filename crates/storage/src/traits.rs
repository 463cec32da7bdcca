use gridstage_core::{Patch, Record, RecordId};

use crate::error::{GatewayError, StorageError};

/// Client-local durable string storage.
pub trait KeyValueStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// The remote CRUD API for one kind of record.
pub trait CollectionGateway {
    fn fetch_all(&mut self) -> Result<Vec<Record>, GatewayError>;

    fn fetch_by_id(&mut self, id: RecordId) -> Result<Record, GatewayError>;

    /// Apply `patch` and return the record as stored remotely.
    fn update_by_id(&mut self, id: RecordId, patch: &Patch) -> Result<Record, GatewayError>;

    fn delete_by_id(&mut self, id: RecordId) -> Result<(), GatewayError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).write(key, value)
    }
}

impl<T: CollectionGateway + ?Sized> CollectionGateway for Box<T> {
    fn fetch_all(&mut self) -> Result<Vec<Record>, GatewayError> {
        (**self).fetch_all()
    }

    fn fetch_by_id(&mut self, id: RecordId) -> Result<Record, GatewayError> {
        (**self).fetch_by_id(id)
    }

    fn update_by_id(&mut self, id: RecordId, patch: &Patch) -> Result<Record, GatewayError> {
        (**self).update_by_id(id, patch)
    }

    fn delete_by_id(&mut self, id: RecordId) -> Result<(), GatewayError> {
        (**self).delete_by_id(id)
    }
}

pub mod config;
pub mod error;
pub mod ledger;
pub mod presets;
pub mod snapshot;
pub mod view;

pub use config::{BatchPolicy, EngineConfig, PresetConfig, RefreshPolicy};
pub use error::{BatchAction, BatchFailure, EngineError};
pub use ledger::PendingLedger;
pub use presets::{Direction, Layout, Persistence, PresetStore, ViewPreset};
pub use snapshot::{Collection, SnapshotStore};
pub use view::{Cell, GridView, Row};

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info, warn};

use gridstage_core::{
    coerce::coerce_field, FieldRegistry, FieldValue, Patch, Record, RecordId,
};
use gridstage_storage::{CollectionGateway, GatewayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhase {
    Viewing,
    Editing,
    EditingDirty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fetched collection replaced the snapshot.
    Applied,
    /// Edits are pending; the fetched collection is held back.
    Deferred,
    /// The snapshot was replaced and pending edits re-applied. Edits on
    /// records that no longer exist were dropped.
    Rebased { dropped: Vec<RecordId> },
}

/// One record's worth of a commit: the coerced patch and the raw values it
/// was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitItem {
    pub id: RecordId,
    pub patch: Patch,
    raw: BTreeMap<String, FieldValue>,
}

/// A commit opened by [`DraftEngine::begin_commit`]. The engine holds it
/// until [`DraftEngine::finish_commit`] or [`DraftEngine::abort_commit`].
#[derive(Debug)]
pub struct CommitBatch {
    pending: VecDeque<CommitItem>,
    total: usize,
    policy: BatchPolicy,
    succeeded: Vec<RecordId>,
    failed: Vec<(RecordId, GatewayError)>,
}

impl CommitBatch {
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn remaining(&self) -> impl Iterator<Item = &CommitItem> {
        self.pending.iter()
    }

    pub fn succeeded(&self) -> &[RecordId] {
        &self.succeeded
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
            || (self.policy == BatchPolicy::FailFast && !self.failed.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub updated: Vec<RecordId>,
    pub refresh: RefreshOutcome,
}

/// Stages field edits over a fetched collection and flushes them to the
/// remote collection in one batch.
///
/// The snapshot is only ever replaced by a fetch. While editing, the draft
/// mirrors the snapshot's key set and carries every pending raw value.
pub struct DraftEngine<G: CollectionGateway> {
    registry: FieldRegistry,
    gateway: G,
    config: EngineConfig,
    snapshot: SnapshotStore,
    draft: Option<Collection>,
    ledger: PendingLedger,
    editing: bool,
    commit: Option<CommitBatch>,
    deferred_refresh: Option<Collection>,
}

impl<G: CollectionGateway> DraftEngine<G> {
    pub fn new(registry: FieldRegistry, gateway: G) -> Self {
        Self::with_config(registry, gateway, EngineConfig::default())
    }

    pub fn with_config(registry: FieldRegistry, gateway: G, config: EngineConfig) -> Self {
        Self {
            registry,
            gateway,
            config,
            snapshot: SnapshotStore::new(),
            draft: None,
            ledger: PendingLedger::new(),
            editing: false,
            commit: None,
            deferred_refresh: None,
        }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    // ========================================================================
    // Read surface
    // ========================================================================

    pub fn phase(&self) -> EditPhase {
        match (self.editing, self.ledger.is_empty()) {
            (false, _) => EditPhase::Viewing,
            (true, true) => EditPhase::Editing,
            (true, false) => EditPhase::EditingDirty,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn snapshot(&self) -> &Collection {
        self.snapshot.current()
    }

    pub fn snapshot_generation(&self) -> u64 {
        self.snapshot.generation()
    }

    pub fn draft(&self) -> Option<&Collection> {
        self.draft.as_ref()
    }

    pub fn ledger(&self) -> &PendingLedger {
        &self.ledger
    }

    pub fn is_pending(&self, id: RecordId, field: &str) -> bool {
        self.ledger.contains(id, field)
    }

    pub fn has_deferred_refresh(&self) -> bool {
        self.deferred_refresh.is_some()
    }

    pub fn is_commit_in_flight(&self) -> bool {
        self.commit.is_some()
    }

    pub fn in_flight_commit(&self) -> Option<&CommitBatch> {
        self.commit.as_ref()
    }

    /// The draft while one exists, the snapshot otherwise.
    pub fn visible(&self) -> &Collection {
        self.draft.as_ref().unwrap_or_else(|| self.snapshot.current())
    }

    pub fn visible_records(&self) -> impl Iterator<Item = &Record> {
        self.visible().iter()
    }

    // ========================================================================
    // Fetch & refresh
    // ========================================================================

    /// Fetch the whole collection and apply it.
    pub fn refresh(&mut self) -> Result<RefreshOutcome, EngineError> {
        let records = self.gateway.fetch_all()?;
        self.apply_fetched(records)
    }

    /// Apply a collection fetched outside the engine (e.g. a background poll).
    /// Never silently overwrites pending edits.
    pub fn apply_fetched(&mut self, records: Vec<Record>) -> Result<RefreshOutcome, EngineError> {
        let collection = Collection::from_records(records)?;
        if self.ledger.is_empty() && self.commit.is_none() {
            self.deferred_refresh = None;
            self.install(collection);
            return Ok(RefreshOutcome::Applied);
        }
        match self.config.refresh_policy {
            RefreshPolicy::Defer => {
                warn!(
                    pending = self.ledger.len(),
                    in_flight = self.commit.is_some(),
                    "refresh deferred while edits are pending"
                );
                self.deferred_refresh = Some(collection);
                Ok(RefreshOutcome::Deferred)
            }
            RefreshPolicy::Rebase => {
                self.deferred_refresh = None;
                Ok(self.rebase_onto(collection))
            }
        }
    }

    /// Apply a held-back refresh now, re-applying pending edits on top of it.
    pub fn apply_deferred_refresh(&mut self) -> Option<RefreshOutcome> {
        let collection = self.deferred_refresh.take()?;
        if self.ledger.is_empty() {
            self.install(collection);
            Some(RefreshOutcome::Applied)
        } else {
            Some(self.rebase_onto(collection))
        }
    }

    fn install(&mut self, collection: Collection) {
        debug!(records = collection.len(), "snapshot replaced");
        self.snapshot.replace(collection);
        if self.draft.is_some() {
            self.draft = Some(self.snapshot.current().clone());
        }
    }

    fn install_deferred(&mut self) {
        if let Some(collection) = self.deferred_refresh.take() {
            info!("applying deferred refresh");
            self.install(collection);
        }
    }

    fn rebase_onto(&mut self, collection: Collection) -> RefreshOutcome {
        self.snapshot.replace(collection);
        let snapshot = self.snapshot.current();
        let dropped = self.ledger.retain_records(|id| snapshot.contains(id));
        if !dropped.is_empty() {
            warn!(records = ?dropped, "pending edits dropped for records no longer present");
        }
        if self.draft.is_some() || !self.ledger.is_empty() {
            let mut draft = snapshot.clone();
            for (id, field, raw) in self.ledger.iter() {
                if let Some(record) = draft.get_mut(id) {
                    record.set(field, raw.clone());
                }
            }
            self.draft = Some(draft);
        }
        info!(pending = self.ledger.len(), "snapshot rebased under pending edits");
        RefreshOutcome::Rebased { dropped }
    }

    fn settle_fetched(&mut self, records: Vec<Record>) -> Result<RefreshOutcome, EngineError> {
        let collection = Collection::from_records(records)?;
        self.deferred_refresh = None;
        if self.ledger.is_empty() {
            self.install(collection);
            Ok(RefreshOutcome::Applied)
        } else {
            Ok(self.rebase_onto(collection))
        }
    }

    // ========================================================================
    // Edit mode
    // ========================================================================

    pub fn enter_edit_mode(&mut self) -> Result<(), EngineError> {
        if self.editing {
            return Err(EngineError::AlreadyEditing);
        }
        if self.commit.is_some() {
            return Err(EngineError::CommitInFlight);
        }
        self.install_deferred();
        self.ledger.clear();
        self.draft = Some(self.snapshot.current().clone());
        self.editing = true;
        info!(records = self.snapshot.current().len(), "edit mode entered");
        Ok(())
    }

    /// Leave edit mode. With `discard`, every pending edit is dropped and the
    /// view falls back to the snapshot. Without it, further edits are refused
    /// but pending ones stay staged.
    pub fn exit_edit_mode(&mut self, discard: bool) -> Result<(), EngineError> {
        if discard {
            if self.commit.is_some() {
                return Err(EngineError::CommitInFlight);
            }
            let dropped = self.ledger.len();
            self.ledger.clear();
            self.draft = None;
            self.install_deferred();
            info!(dropped, "edit mode exited, edits discarded");
        } else {
            if self.ledger.is_empty() {
                self.draft = None;
            }
            info!(
                pending = self.ledger.len(),
                records = self.ledger.record_count(),
                "edit mode exited"
            );
        }
        self.editing = false;
        Ok(())
    }

    /// Drop every pending edit and start over from the snapshot.
    pub fn discard_all(&mut self) -> Result<(), EngineError> {
        self.exit_edit_mode(true)?;
        self.enter_edit_mode()
    }

    pub fn set_field(
        &mut self,
        id: RecordId,
        field: &str,
        raw: impl Into<FieldValue>,
    ) -> Result<(), EngineError> {
        if !self.editing {
            return Err(EngineError::NotEditable("edit mode is not active".into()));
        }
        if !self.registry.is_editable(field) {
            return Err(EngineError::NotEditable(format!("field {field} is not editable")));
        }
        let record = self
            .draft
            .as_mut()
            .and_then(|draft| draft.get_mut(id))
            .ok_or(EngineError::RecordNotFound(id))?;
        let raw = raw.into();
        debug!(record = %id, field, value = %raw, "field staged");
        record.set(field, raw.clone());
        self.ledger.set(id, field, raw);
        Ok(())
    }

    /// Drop one pending edit and restore the snapshot value in the draft.
    /// Returns whether an edit was pending.
    pub fn discard_field(&mut self, id: RecordId, field: &str) -> Result<bool, EngineError> {
        if self.ledger.remove_field(id, field).is_none() {
            return Ok(false);
        }
        let original = self.snapshot.current().get(id).and_then(|r| r.get(field)).cloned();
        if let Some(record) = self.draft.as_mut().and_then(|draft| draft.get_mut(id)) {
            match original {
                Some(value) => record.set(field, value),
                None => {
                    record.fields.remove(field);
                }
            }
        }
        debug!(record = %id, field, "pending edit discarded");
        Ok(true)
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Coerce every pending edit and open a commit. Nothing is sent yet.
    /// A coercion failure rejects the whole commit and changes nothing.
    /// Returns the number of records the commit will update.
    pub fn begin_commit(&mut self) -> Result<usize, EngineError> {
        if self.commit.is_some() {
            return Err(EngineError::CommitInFlight);
        }
        let ids = self.ledger.record_ids();
        self.check_batch_size(ids.len())?;

        let mut pending = VecDeque::with_capacity(ids.len());
        for id in ids {
            let Some(raw) = self.ledger.fields_for(id) else {
                continue;
            };
            let mut patch = Patch::new();
            for (field, value) in raw {
                let spec = self
                    .registry
                    .get(field)
                    .filter(|spec| spec.editable)
                    .ok_or_else(|| EngineError::NotEditable(format!("field {field} is not editable")))?;
                let coerced = coerce_field(spec, value).map_err(EngineError::from_coercion)?;
                patch.insert(field.clone(), coerced);
            }
            pending.push_back(CommitItem {
                id,
                patch,
                raw: raw.clone(),
            });
        }

        let total = pending.len();
        info!(records = total, "commit started");
        self.commit = Some(CommitBatch {
            total,
            pending,
            policy: self.config.batch_policy,
            succeeded: Vec::new(),
            failed: Vec::new(),
        });
        Ok(total)
    }

    /// Send the next record of the open commit. Returns `false` once there
    /// is nothing more to send.
    pub fn commit_next(&mut self) -> bool {
        let Some(batch) = self.commit.as_mut() else {
            return false;
        };
        if batch.is_done() {
            return false;
        }
        let Some(item) = batch.pending.pop_front() else {
            return false;
        };
        match self.gateway.update_by_id(item.id, &item.patch) {
            Ok(_) => {
                self.ledger.settle(item.id, &item.raw);
                debug!(record = %item.id, fields = item.patch.len(), "record updated");
                batch.succeeded.push(item.id);
            }
            Err(e) => {
                warn!(record = %item.id, error = %e, "record update failed");
                batch.failed.push((item.id, e));
            }
        }
        !batch.is_done()
    }

    /// Close the open commit. Full success refetches the collection. A
    /// failure, or records left unsent, is reported as one aggregate error
    /// and leaves those edits pending.
    pub fn finish_commit(&mut self) -> Result<CommitReport, EngineError> {
        let batch = self.commit.take().ok_or(EngineError::NoCommitInFlight)?;
        if !batch.failed.is_empty() || !batch.pending.is_empty() {
            let failure = BatchFailure {
                action: BatchAction::Update,
                total: batch.total,
                succeeded: batch.succeeded,
                skipped: batch.pending.iter().map(|item| item.id).collect(),
                failed: batch.failed,
            };
            warn!(%failure, pending = self.ledger.len(), "commit partially applied");
            return Err(EngineError::PartialCommit(failure));
        }

        let records = self.gateway.fetch_all()?;
        let refresh = self.settle_fetched(records)?;
        if self.ledger.is_empty() {
            self.draft = None;
            self.editing = false;
        }
        info!(updated = batch.succeeded.len(), "commit finished");
        Ok(CommitReport {
            updated: batch.succeeded,
            refresh,
        })
    }

    /// Abandon the open commit without refetching. Records already updated
    /// stay settled; everything else stays pending.
    pub fn abort_commit(&mut self) -> Option<CommitBatch> {
        let batch = self.commit.take()?;
        info!(
            sent = batch.succeeded.len() + batch.failed.len(),
            unsent = batch.pending.len(),
            "commit aborted"
        );
        Some(batch)
    }

    /// Commit every pending edit against the owned gateway.
    pub fn commit_all(&mut self) -> Result<CommitReport, EngineError> {
        self.begin_commit()?;
        while self.commit_next() {}
        self.finish_commit()
    }

    // ========================================================================
    // Deletes
    // ========================================================================

    pub fn delete_record(&mut self, id: RecordId) -> Result<RefreshOutcome, EngineError> {
        if self.commit.is_some() {
            return Err(EngineError::CommitInFlight);
        }
        self.gateway.delete_by_id(id)?;
        self.ledger.remove_record(id);
        info!(record = %id, "record deleted");
        let records = self.gateway.fetch_all()?;
        self.settle_fetched(records)
    }

    /// Delete several records following the configured batch policy, then refetch.
    pub fn delete_records(&mut self, ids: &[RecordId]) -> Result<Vec<RecordId>, EngineError> {
        if self.commit.is_some() {
            return Err(EngineError::CommitInFlight);
        }
        self.check_batch_size(ids.len())?;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        let mut skipped = Vec::new();
        for (pos, &id) in ids.iter().enumerate() {
            match self.gateway.delete_by_id(id) {
                Ok(()) => {
                    self.ledger.remove_record(id);
                    deleted.push(id);
                }
                Err(e) => {
                    warn!(record = %id, error = %e, "record delete failed");
                    failed.push((id, e));
                    if self.config.batch_policy == BatchPolicy::FailFast {
                        skipped.extend_from_slice(&ids[pos + 1..]);
                        break;
                    }
                }
            }
        }

        let refetched = if deleted.is_empty() {
            Ok(())
        } else {
            match self.gateway.fetch_all() {
                Ok(records) => self.settle_fetched(records).map(|_| ()),
                Err(e) => Err(EngineError::from(e)),
            }
        };
        if !failed.is_empty() {
            if let Err(e) = &refetched {
                warn!(error = %e, "refetch after partial delete failed");
            }
            return Err(EngineError::PartialCommit(BatchFailure {
                action: BatchAction::Delete,
                total: ids.len(),
                succeeded: deleted,
                failed,
                skipped,
            }));
        }
        refetched?;
        info!(deleted = deleted.len(), "records deleted");
        Ok(deleted)
    }

    fn check_batch_size(&self, size: usize) -> Result<(), EngineError> {
        let max = self.config.max_batch_size;
        if max > 0 && size > max {
            return Err(EngineError::BatchTooLarge { size, max });
        }
        Ok(())
    }
}

//! Named column layouts (field order + visibility), persisted per user
//! through a key-value store.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use gridstage_core::FieldRegistry;
use gridstage_storage::KeyValueStore;

use crate::error::EngineError;

const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub field_order: Vec<String>,
    pub visibility: BTreeMap<String, bool>,
}

impl Layout {
    pub fn new(field_order: Vec<String>, visibility: BTreeMap<String, bool>) -> Self {
        Self {
            field_order,
            visibility,
        }
    }

    /// A field missing from `visibility` counts as visible.
    pub fn is_visible(&self, field: &str) -> bool {
        self.visibility.get(field).copied().unwrap_or(true)
    }

    pub fn visible_fields(&self) -> impl Iterator<Item = &str> {
        self.field_order
            .iter()
            .map(String::as_str)
            .filter(|field| self.is_visible(field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewPreset {
    pub name: String,
    #[serde(flatten)]
    pub layout: Layout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Result of the write that follows every mutation. The in-memory change is
/// kept either way.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    Saved,
    Unsaved { reason: String },
}

impl Persistence {
    pub fn is_saved(&self) -> bool {
        matches!(self, Persistence::Saved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBuffer {
    pub original_name: String,
    pub layout: Layout,
}

#[derive(Serialize, Deserialize)]
struct PresetDocument {
    version: u32,
    presets: Vec<ViewPreset>,
}

pub struct PresetStore<K: KeyValueStore> {
    kv: K,
    key: String,
    known_fields: Vec<String>,
    default_layout: Layout,
    presets: BTreeMap<String, ViewPreset>,
    active_name: Option<String>,
    active: Layout,
    buffer: Option<EditBuffer>,
    diverged: bool,
}

impl<K: KeyValueStore> PresetStore<K> {
    /// Load the presets stored under `key`. A missing key is an empty store.
    pub fn load(kv: K, key: &str, registry: &FieldRegistry) -> Result<Self, EngineError> {
        let (field_order, visibility) = registry.default_layout();
        let default_layout = Layout::new(field_order.clone(), visibility);
        let mut store = Self {
            kv,
            key: key.to_string(),
            known_fields: field_order,
            active: default_layout.clone(),
            default_layout,
            presets: BTreeMap::new(),
            active_name: None,
            buffer: None,
            diverged: false,
        };

        if let Some(raw) = store.kv.read(key)? {
            let document: PresetDocument = serde_json::from_str(&raw)
                .map_err(|e| EngineError::Serialization(format!("preset document {key}: {e}")))?;
            if document.version != DOCUMENT_VERSION {
                return Err(EngineError::Serialization(format!(
                    "preset document {key}: unsupported version {}",
                    document.version
                )));
            }
            for preset in document.presets {
                let preset = store.sanitize(preset);
                let name = preset.name.clone();
                if store.presets.insert(name.clone(), preset).is_some() {
                    warn!(preset = %name, "stored document repeats a preset name; later entry kept");
                }
            }
        }
        info!(key, presets = store.presets.len(), "presets loaded");
        Ok(store)
    }

    /// Drop fields the registry no longer declares.
    fn sanitize(&self, mut preset: ViewPreset) -> ViewPreset {
        let mut seen = BTreeSet::new();
        let before = preset.layout.field_order.len();
        preset
            .layout
            .field_order
            .retain(|field| self.known_fields.contains(field) && seen.insert(field.clone()));
        let order = &preset.layout.field_order;
        preset.layout.visibility.retain(|field, _| order.contains(field));
        if preset.layout.field_order.len() != before {
            warn!(preset = %preset.name, "stored preset referenced unknown fields");
        }
        preset
    }

    fn validate(&self, name: &str, layout: &Layout) -> Result<(), EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::InvalidPreset("preset name is empty".into()));
        }
        let mut seen = BTreeSet::new();
        for field in &layout.field_order {
            if !self.known_fields.contains(field) {
                return Err(EngineError::InvalidPreset(format!("unknown field {field}")));
            }
            if !seen.insert(field.as_str()) {
                return Err(EngineError::InvalidPreset(format!("field {field} listed twice")));
            }
        }
        if let Some(stray) = layout.visibility.keys().find(|f| !seen.contains(f.as_str())) {
            return Err(EngineError::InvalidPreset(format!(
                "visibility set for {stray}, which is not in the field order"
            )));
        }
        Ok(())
    }

    /// Serialize the whole store and write it. Failure leaves the store diverged.
    fn persist(&mut self) -> Persistence {
        let document = PresetDocument {
            version: DOCUMENT_VERSION,
            presets: self.presets.values().cloned().collect(),
        };
        let result = serde_json::to_string(&document)
            .map_err(|e| e.to_string())
            .and_then(|raw| self.kv.write(&self.key, &raw).map_err(|e| e.to_string()));
        match result {
            Ok(()) => {
                self.diverged = false;
                Persistence::Saved
            }
            Err(reason) => {
                warn!(key = %self.key, %reason, "presets not persisted; in-memory state kept");
                self.diverged = true;
                Persistence::Unsaved { reason }
            }
        }
    }

    // ========================================================================
    // Read surface
    // ========================================================================

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    pub fn kv_mut(&mut self) -> &mut K {
        &mut self.kv
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&ViewPreset> {
        self.presets.get(name)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active_name.as_deref()
    }

    pub fn active_layout(&self) -> &Layout {
        &self.active
    }

    pub fn visible_fields(&self) -> Vec<&str> {
        self.active.visible_fields().collect()
    }

    pub fn edit_buffer(&self) -> Option<&EditBuffer> {
        self.buffer.as_ref()
    }

    /// True when the last write failed and storage is behind memory.
    pub fn is_diverged(&self) -> bool {
        self.diverged
    }

    // ========================================================================
    // Preset CRUD
    // ========================================================================

    pub fn create_preset(
        &mut self,
        name: &str,
        field_order: Vec<String>,
        visibility: BTreeMap<String, bool>,
    ) -> Result<Persistence, EngineError> {
        if self.presets.contains_key(name) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        let layout = Layout::new(field_order, visibility);
        self.validate(name, &layout)?;
        self.presets.insert(
            name.to_string(),
            ViewPreset {
                name: name.to_string(),
                layout,
            },
        );
        info!(preset = name, "preset created");
        Ok(self.persist())
    }

    /// Make `name` the active layout. Does not write to storage.
    pub fn apply_preset(&mut self, name: &str) -> Result<&Layout, EngineError> {
        let preset = self
            .presets
            .get(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        self.active = preset.layout.clone();
        self.active_name = Some(name.to_string());
        Ok(&self.active)
    }

    /// Back to the registry's default layout with no active preset.
    pub fn reset_layout(&mut self) {
        self.active = self.default_layout.clone();
        self.active_name = None;
    }

    pub fn rename_preset(&mut self, old: &str, new: &str) -> Result<Persistence, EngineError> {
        if old == new {
            return if self.presets.contains_key(old) {
                Ok(Persistence::Saved)
            } else {
                Err(EngineError::NotFound(old.to_string()))
            };
        }
        if self.presets.contains_key(new) {
            return Err(EngineError::DuplicateName(new.to_string()));
        }
        let mut preset = self
            .presets
            .remove(old)
            .ok_or_else(|| EngineError::NotFound(old.to_string()))?;
        if let Err(e) = self.validate(new, &preset.layout) {
            self.presets.insert(old.to_string(), preset);
            return Err(e);
        }
        preset.name = new.to_string();
        self.presets.insert(new.to_string(), preset);
        if self.active_name.as_deref() == Some(old) {
            self.active_name = Some(new.to_string());
        }
        if let Some(buffer) = self.buffer.as_mut().filter(|b| b.original_name == old) {
            buffer.original_name = new.to_string();
        }
        info!(from = old, to = new, "preset renamed");
        Ok(self.persist())
    }

    pub fn delete_preset(&mut self, name: &str) -> Result<Persistence, EngineError> {
        if self.presets.remove(name).is_none() {
            return Err(EngineError::NotFound(name.to_string()));
        }
        if self.active_name.as_deref() == Some(name) {
            self.active_name = None;
        }
        if self.buffer.as_ref().is_some_and(|b| b.original_name == name) {
            self.buffer = None;
        }
        info!(preset = name, "preset deleted");
        Ok(self.persist())
    }

    // ========================================================================
    // Edit buffer
    // ========================================================================

    pub fn begin_editing(&mut self, name: &str) -> Result<&EditBuffer, EngineError> {
        let preset = self
            .presets
            .get(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        Ok(self.buffer.insert(EditBuffer {
            original_name: name.to_string(),
            layout: preset.layout.clone(),
        }))
    }

    pub fn cancel_editing(&mut self) {
        self.buffer = None;
    }

    /// Swap `field` with its neighbour. Returns false at either boundary.
    pub fn reorder(&mut self, field: &str, direction: Direction) -> Result<bool, EngineError> {
        let buffer = self.buffer.as_mut().ok_or(EngineError::NoEditBuffer)?;
        let order = &mut buffer.layout.field_order;
        let pos = order
            .iter()
            .position(|f| f == field)
            .ok_or_else(|| EngineError::UnknownField(field.to_string()))?;
        let target = match direction {
            Direction::Up if pos > 0 => pos - 1,
            Direction::Down if pos + 1 < order.len() => pos + 1,
            _ => return Ok(false),
        };
        order.swap(pos, target);
        Ok(true)
    }

    /// Flip the visibility of `field` in the buffer. Returns the new value.
    pub fn toggle_visibility(&mut self, field: &str) -> Result<bool, EngineError> {
        let buffer = self.buffer.as_mut().ok_or(EngineError::NoEditBuffer)?;
        if !buffer.layout.field_order.iter().any(|f| f == field) {
            return Err(EngineError::UnknownField(field.to_string()));
        }
        let visible = !buffer.layout.is_visible(field);
        buffer.layout.visibility.insert(field.to_string(), visible);
        Ok(visible)
    }

    /// Write the buffer back, under `new_name` when given (a rename), then
    /// close it.
    pub fn save_edited_preset(&mut self, new_name: Option<&str>) -> Result<Persistence, EngineError> {
        let buffer = self.buffer.as_ref().ok_or(EngineError::NoEditBuffer)?;
        let original = buffer.original_name.clone();
        let target = new_name.unwrap_or(&original).to_string();
        if target != original && self.presets.contains_key(&target) {
            return Err(EngineError::DuplicateName(target));
        }
        self.validate(&target, &buffer.layout)?;

        let layout = buffer.layout.clone();
        if target != original {
            self.presets.remove(&original);
        }
        self.presets.insert(
            target.clone(),
            ViewPreset {
                name: target.clone(),
                layout: layout.clone(),
            },
        );
        if self.active_name.as_deref() == Some(original.as_str()) {
            self.active_name = Some(target.clone());
            self.active = layout;
        }
        self.buffer = None;
        info!(preset = %target, renamed_from = %original, "preset saved");
        Ok(self.persist())
    }

    /// Store the open buffer (or, with none open, the active layout) as a new
    /// preset. Closes the buffer.
    pub fn save_buffer_as_new_preset(&mut self, name: &str) -> Result<Persistence, EngineError> {
        if self.presets.contains_key(name) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        let layout = match &self.buffer {
            Some(buffer) => buffer.layout.clone(),
            None => self.active.clone(),
        };
        self.validate(name, &layout)?;
        self.presets.insert(
            name.to_string(),
            ViewPreset {
                name: name.to_string(),
                layout,
            },
        );
        self.buffer = None;
        info!(preset = name, "preset saved as new");
        Ok(self.persist())
    }
}

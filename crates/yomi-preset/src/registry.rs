//! In-memory registry of voice presets.

use crate::error::PresetError;
use std::collections::HashMap;
use yomi_types::{Preset, PresetId};

/// Map of preset identifier to preset, keeping registration order for
/// listings.
///
/// Filled once at boot and then shared behind an `Arc`; there is no way to
/// remove or replace a preset after registration.
#[derive(Debug, Default, Clone)]
pub struct PresetRegistry {
    index: HashMap<PresetId, usize>,
    presets: Vec<Preset>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from `presets`, stopping at the first rejected one.
    pub fn from_presets(presets: impl IntoIterator<Item = Preset>) -> Result<Self, PresetError> {
        let mut registry = Self::new();
        for preset in presets {
            registry.register(preset)?;
        }
        Ok(registry)
    }

    /// Adds a preset.
    ///
    /// # Errors
    ///
    /// - `PresetError::Invalid` if the identifier or engine is empty.
    /// - `PresetError::Duplicate` if the identifier is already taken.
    pub fn register(&mut self, preset: Preset) -> Result<(), PresetError> {
        preset.validate()?;
        if self.index.contains_key(&preset.id) {
            return Err(PresetError::Duplicate(preset.id));
        }
        self.index.insert(preset.id.clone(), self.presets.len());
        self.presets.push(preset);
        Ok(())
    }

    pub fn get(&self, id: &PresetId) -> Option<&Preset> {
        self.index.get(id).map(|&i| &self.presets[i])
    }

    pub fn contains(&self, id: &PresetId) -> bool {
        self.index.contains_key(id)
    }

    /// All presets in registration order.
    pub fn list(&self) -> &[Preset] {
        &self.presets
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

use std::sync::Arc;

use dashmap::DashMap;

use hotprom_core::{MetricProvider, PluginId};

/// Plugin table: identity -> current unit.
///
/// Writes are single-key replacements, so a refresh that takes a
/// [`snapshot`](PluginTable::snapshot) sees each entry either before or after
/// a concurrent reload, never a half-built unit. Mutation is crate-private:
/// only the loader changes the table.
#[derive(Default)]
pub struct PluginTable {
    units: DashMap<PluginId, Arc<dyn MetricProvider>>,
}

impl PluginTable {
    pub fn new() -> Self {
        Self {
            units: DashMap::new(),
        }
    }

    /// Insert or replace the unit under its own identity. Returns the unit it replaced.
    pub(crate) fn upsert(&self, unit: Arc<dyn MetricProvider>) -> Option<Arc<dyn MetricProvider>> {
        self.units.insert(unit.id().clone(), unit)
    }

    pub(crate) fn remove(&self, id: &PluginId) -> Option<Arc<dyn MetricProvider>> {
        self.units.remove(id).map(|(_, unit)| unit)
    }

    pub fn get(&self, id: &PluginId) -> Option<Arc<dyn MetricProvider>> {
        self.units.get(id).map(|e| e.value().clone())
    }

    pub fn contains(&self, id: &PluginId) -> bool {
        self.units.contains_key(id)
    }

    pub fn ids(&self) -> Vec<PluginId> {
        let mut ids: Vec<PluginId> = self.units.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Current units in identity order.
    pub fn snapshot(&self) -> Vec<Arc<dyn MetricProvider>> {
        let mut units: Vec<Arc<dyn MetricProvider>> =
            self.units.iter().map(|e| e.value().clone()).collect();
        units.sort_by(|a, b| a.id().cmp(b.id()));
        units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

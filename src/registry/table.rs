//! Mapping from handle identity to record

use std::collections::HashMap;

use crate::handle::HandleId;

use super::record::BufferRecord;

/// Registry table; only mutated by the four registry operations
#[derive(Debug, Default)]
pub struct RegistryTable {
    records: HashMap<HandleId, BufferRecord>,
}

impl RegistryTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record
    pub fn get(&self, id: HandleId) -> Option<&BufferRecord> {
        self.records.get(&id)
    }

    /// Look up a record for mutation
    pub fn get_mut(&mut self, id: HandleId) -> Option<&mut BufferRecord> {
        self.records.get_mut(&id)
    }

    /// Existing record, or a new unreferenced one; the flag reports creation
    pub fn get_or_insert(&mut self, id: HandleId) -> (&mut BufferRecord, bool) {
        let mut created = false;
        let record = self.records.entry(id).or_insert_with(|| {
            created = true;
            BufferRecord::new()
        });
        (record, created)
    }

    /// Remove a record
    pub fn remove(&mut self, id: HandleId) -> Option<BufferRecord> {
        self.records.remove(&id)
    }

    /// Whether a record exists
    pub fn contains(&self, id: HandleId) -> bool {
        self.records.contains_key(&id)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over all records
    pub fn iter(&self) -> impl Iterator<Item = (&HandleId, &BufferRecord)> {
        self.records.iter()
    }
}

//! Per-output property store

use std::collections::BTreeMap;

use x11rb::protocol::xproto::Atom;

use super::record::PropertyRecord;

/// Records keyed by property name, plus the dirty flag raised by staged
/// writes that have not been committed yet
#[derive(Debug, Default)]
pub struct PropertyStore {
    records: BTreeMap<Atom, PropertyRecord>,
    pending_writes: bool,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: Atom) -> Option<&PropertyRecord> {
        self.records.get(&name)
    }

    pub(crate) fn find_mut(&mut self, name: Atom) -> Option<&mut PropertyRecord> {
        self.records.get_mut(&name)
    }

    /// Return the record for `name`, inserting a default one if absent
    pub(crate) fn create_if_absent(&mut self, name: Atom) -> &mut PropertyRecord {
        self.records
            .entry(name)
            .or_insert_with(|| PropertyRecord::new(name))
    }

    pub(crate) fn insert(&mut self, record: PropertyRecord) {
        self.records.insert(record.name(), record);
    }

    pub(crate) fn remove(&mut self, name: Atom) -> Option<PropertyRecord> {
        self.records.remove(&name)
    }

    /// Detach every record in store order
    pub(crate) fn take_all(&mut self) -> Vec<PropertyRecord> {
        std::mem::take(&mut self.records).into_values().collect()
    }

    /// Property names in store order
    pub fn names(&self) -> Vec<Atom> {
        self.records.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_pending_writes(&self) -> bool {
        self.pending_writes
    }

    pub(crate) fn mark_pending_writes(&mut self) {
        self.pending_writes = true;
    }

    /// Clear the dirty flag, returning whether it was set
    pub(crate) fn take_pending_writes(&mut self) -> bool {
        std::mem::take(&mut self.pending_writes)
    }
}

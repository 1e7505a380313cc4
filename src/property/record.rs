//! Property records
//!
//! One named property on one output: its flags, the constraint set and the
//! current and pending values.

use x11rb::protocol::xproto::Atom;

use super::flags::PropertyFlags;
use super::value::PropertyValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    name: Atom,
    flags: PropertyFlags,
    valid_values: Vec<i32>,
    current: PropertyValue,
    pending: PropertyValue,
}

impl PropertyRecord {
    /// Fresh record: no flags, unconstrained, both values empty
    pub fn new(name: Atom) -> Self {
        Self {
            name,
            flags: PropertyFlags::empty(),
            valid_values: Vec::new(),
            current: PropertyValue::default(),
            pending: PropertyValue::default(),
        }
    }

    pub fn name(&self) -> Atom {
        self.name
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    pub fn is_pending(&self) -> bool {
        self.flags.contains(PropertyFlags::PENDING)
    }

    pub fn is_range(&self) -> bool {
        self.flags.contains(PropertyFlags::RANGE)
    }

    pub fn is_immutable(&self) -> bool {
        self.flags.contains(PropertyFlags::IMMUTABLE)
    }

    pub fn valid_values(&self) -> &[i32] {
        &self.valid_values
    }

    pub fn current(&self) -> &PropertyValue {
        &self.current
    }

    pub fn pending(&self) -> &PropertyValue {
        &self.pending
    }

    /// Whether a write asking for the pending slot actually lands there
    pub fn targets_pending(&self, pending: bool) -> bool {
        pending && self.is_pending()
    }

    /// The slot a reader or writer asking for `pending` sees
    pub fn value(&self, pending: bool) -> &PropertyValue {
        if self.targets_pending(pending) {
            &self.pending
        } else {
            &self.current
        }
    }

    pub(crate) fn value_mut(&mut self, pending: bool) -> &mut PropertyValue {
        if self.targets_pending(pending) {
            &mut self.pending
        } else {
            &mut self.current
        }
    }

    /// Replace flags and constraints. A property that stops being pending
    /// loses its staged value.
    pub(crate) fn reconfigure(&mut self, flags: PropertyFlags, valid_values: Vec<i32>) {
        if self.is_pending() && !flags.contains(PropertyFlags::PENDING) {
            self.pending = PropertyValue::default();
        }
        self.flags = flags;
        self.valid_values = valid_values;
    }

    /// Check `value` against the constraint set. Callers that validate do
    /// so through this; writes are not checked inline.
    pub fn permits(&self, value: i32) -> bool {
        if self.valid_values.is_empty() {
            return true;
        }
        if self.is_range() {
            self.valid_values
                .chunks_exact(2)
                .any(|pair| (pair[0]..=pair[1]).contains(&value))
        } else {
            self.valid_values.contains(&value)
        }
    }
}

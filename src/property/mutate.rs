//! Property mutation
//!
//! Replace, append and prepend into either the current or the pending slot
//! of a record. The candidate value is built in a fresh buffer and only
//! swapped in once every check passed, so a failed change leaves the store
//! exactly as it was.

use area_randr_proto::PropertyState;
use tracing::{debug, trace};
use x11rb::protocol::xproto::Atom;

use super::record::PropertyRecord;
use super::value::{merge_buffers, Format, PropertyMode, PropertyValue};
use crate::error::{Result, RrError};
use crate::notify::Notifier;
use crate::output::{Output, OutputDriver, OutputId};

/// One change request against an output property
#[derive(Debug, Clone, Copy)]
pub struct PropertyChange<'a> {
    pub property: Atom,
    pub type_: Atom,
    pub format: Format,
    pub mode: PropertyMode,
    /// Host byte order, whole elements
    pub data: &'a [u8],
    pub notify: bool,
    /// Write the staged value when the property is pending
    pub pending: bool,
}

impl<'a> PropertyChange<'a> {
    pub fn replace(property: Atom, value: &'a PropertyValue) -> Self {
        Self {
            property,
            type_: value.type_(),
            format: value.format().unwrap_or(Format::Card32),
            mode: PropertyMode::Replace,
            data: value.data(),
            notify: false,
            pending: false,
        }
    }

    pub fn notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    pub fn pending(mut self, pending: bool) -> Self {
        self.pending = pending;
        self
    }
}

impl Output {
    /// Apply `change` to this output's store
    pub fn change_property(
        &mut self,
        change: &PropertyChange<'_>,
        notifier: &mut Notifier<'_>,
    ) -> Result<()> {
        if change.data.len() % change.format.unit_size() != 0 {
            return Err(RrError::Length);
        }

        let id = self.id;
        let to_pending = match self.properties.find_mut(change.property) {
            Some(record) => {
                stage_change(record, change, id, &mut self.driver)?;
                record.targets_pending(change.pending)
            }
            None => {
                // Nothing to append to yet
                let created = PropertyChange {
                    mode: PropertyMode::Replace,
                    ..*change
                };
                let mut record = PropertyRecord::new(change.property);
                stage_change(&mut record, &created, id, &mut self.driver)?;
                self.properties.insert(record);
                false
            }
        };

        if to_pending {
            self.properties.mark_pending_writes();
        } else {
            self.notice_property_change(change.property);
        }

        if change.notify {
            notifier.property_changed(id, self.root, change.property, PropertyState::NewValue);
        }
        Ok(())
    }
}

fn stage_change(
    record: &mut PropertyRecord,
    change: &PropertyChange<'_>,
    output: OutputId,
    driver: &mut OutputDriver,
) -> Result<()> {
    let to_pending = record.targets_pending(change.pending);
    let slot = record.value(change.pending);

    if change.mode != PropertyMode::Replace {
        if slot.format() != Some(change.format) || slot.type_() != change.type_ {
            return Err(RrError::Match);
        }
        if change.data.is_empty() {
            trace!("Empty {:?} of property {}", change.mode, change.property);
            return Ok(());
        }
    }

    let merged = merge_buffers(change.mode, slot.data(), change.data)?;
    let candidate = PropertyValue::from_parts(change.type_, change.format, merged);

    if to_pending {
        if let Some(accept) = driver.accept_pending.as_mut() {
            if !accept(output, change.property, &candidate) {
                debug!(
                    "Driver rejected pending value for property {} on output {:#x}",
                    change.property, output
                );
                return Err(RrError::Rejected(change.property));
            }
        }
    }

    *record.value_mut(change.pending) = candidate;
    Ok(())
}

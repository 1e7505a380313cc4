//! Outputs
//!
//! An output owns its property store and the optional driver capabilities
//! that back it. The output table is the resource lookup every request
//! handler goes through.

use std::collections::BTreeMap;
use std::fmt;

use area_randr_proto::PropertyState;
use tracing::{debug, info};
use x11rb::protocol::xproto::{Atom, AtomEnum, Window};

use crate::error::{Result, RrError};
use crate::notify::Notifier;
use crate::property::{PropertyFlags, PropertyStore, PropertyValue};

pub type OutputId = x11rb::protocol::randr::Output;

/// Decides whether a staged value may be accepted
pub type PendingVeto = Box<dyn FnMut(OutputId, Atom, &PropertyValue) -> bool + Send>;

/// Supplies a fresh current value before it is read
pub type PropertyRefresh = Box<dyn FnMut(OutputId, Atom) -> Option<PropertyValue> + Send>;

/// Driver callbacks; each is only invoked when present
#[derive(Default)]
pub struct OutputDriver {
    pub(crate) accept_pending: Option<PendingVeto>,
    pub(crate) refresh: Option<PropertyRefresh>,
}

impl OutputDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pending_veto(
        mut self,
        veto: impl FnMut(OutputId, Atom, &PropertyValue) -> bool + Send + 'static,
    ) -> Self {
        self.accept_pending = Some(Box::new(veto));
        self
    }

    pub fn with_refresh(
        mut self,
        refresh: impl FnMut(OutputId, Atom) -> Option<PropertyValue> + Send + 'static,
    ) -> Self {
        self.refresh = Some(Box::new(refresh));
        self
    }
}

impl fmt::Debug for OutputDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputDriver")
            .field("accept_pending", &self.accept_pending.is_some())
            .field("refresh", &self.refresh.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct Output {
    pub(crate) id: OutputId,
    name: String,
    /// Root window of the screen this output belongs to
    pub(crate) root: Window,
    leased: bool,
    read_only: bool,
    non_desktop: bool,
    /// Set when a committed property changed the output configuration
    changed: bool,
    non_desktop_atom: Atom,
    pub(crate) properties: PropertyStore,
    pub(crate) driver: OutputDriver,
}

impl Output {
    /// `non_desktop_atom` is the interned "non-desktop" name whose value
    /// drives the output's non-desktop flag
    pub fn new(id: OutputId, name: impl Into<String>, root: Window, non_desktop_atom: Atom) -> Self {
        Self {
            id,
            name: name.into(),
            root,
            leased: false,
            read_only: false,
            non_desktop: false,
            changed: false,
            non_desktop_atom,
            properties: PropertyStore::new(),
            driver: OutputDriver::default(),
        }
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> Window {
        self.root
    }

    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    pub fn set_driver(&mut self, driver: OutputDriver) {
        self.driver = driver;
    }

    pub fn is_leased(&self) -> bool {
        self.leased
    }

    pub fn set_leased(&mut self, leased: bool) {
        self.leased = leased;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_non_desktop(&self) -> bool {
        self.non_desktop
    }

    /// Clear and return the configuration-changed flag
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Create or reconfigure a property's flags and constraint set.
    ///
    /// An immutable property can only be reconfigured as immutable, and a
    /// range constraint needs an even number of values.
    pub fn configure_property(
        &mut self,
        name: Atom,
        flags: PropertyFlags,
        valid_values: &[i32],
    ) -> Result<()> {
        if let Some(record) = self.properties.find(name) {
            if record.is_immutable() && !flags.contains(PropertyFlags::IMMUTABLE) {
                return Err(RrError::Access(name));
            }
        }
        if flags.contains(PropertyFlags::RANGE) && valid_values.len() % 2 != 0 {
            return Err(RrError::Match);
        }

        let mut values = Vec::new();
        values.try_reserve_exact(valid_values.len())?;
        values.extend_from_slice(valid_values);

        self.properties
            .create_if_absent(name)
            .reconfigure(flags, values);
        debug!(
            "Configured property {} on output {:#x}: {:?}",
            name, self.id, flags
        );
        Ok(())
    }

    /// Value a reader sees. Current values are refreshed from the driver
    /// first when it offers a refresh callback.
    pub fn get_property(&mut self, name: Atom, pending: bool) -> Option<&PropertyValue> {
        let targets_pending = self.properties.find(name)?.targets_pending(pending);
        if !targets_pending {
            let fresh = self
                .driver
                .refresh
                .as_mut()
                .and_then(|refresh| refresh(self.id, name));
            if let Some(fresh) = fresh {
                if let Some(record) = self.properties.find_mut(name) {
                    *record.value_mut(false) = fresh;
                }
                self.notice_property_change(name);
            }
        }
        self.properties.find(name).map(|record| record.value(pending))
    }

    /// Remove a property, notifying interested clients before it is freed
    pub fn delete_property(&mut self, name: Atom, notifier: &mut Notifier<'_>) -> Result<()> {
        let record = self.properties.find(name).ok_or(RrError::Name(name))?;
        if record.is_immutable() {
            return Err(RrError::Access(name));
        }
        if let Some(record) = self.properties.remove(name) {
            notifier.property_changed(self.id, self.root, name, PropertyState::Delete);
            drop(record);
        }
        Ok(())
    }

    /// Teardown: delete every property, immutable ones included, each with
    /// its own notification. Returns how many were deleted.
    pub fn delete_all_properties(&mut self, notifier: &mut Notifier<'_>) -> usize {
        let records = self.properties.take_all();
        let count = records.len();
        for record in records {
            notifier.property_changed(self.id, self.root, record.name(), PropertyState::Delete);
        }
        count
    }

    /// Side effects of well-known properties once their current value changed
    pub(crate) fn notice_property_change(&mut self, name: Atom) {
        if name != self.non_desktop_atom {
            return;
        }
        let flag = self
            .properties
            .find(name)
            .map(|record| record.current())
            .filter(|value| value.type_() == u32::from(AtomEnum::INTEGER))
            .and_then(PropertyValue::first_card32);
        let Some(flag) = flag else {
            return;
        };

        let non_desktop = flag != 0;
        if non_desktop != self.non_desktop {
            self.non_desktop = non_desktop;
            self.changed = true;
            info!(
                "Output {} ({:#x}) non-desktop = {}",
                self.name, self.id, non_desktop
            );
        }
    }
}

/// Whether a handler needs to read or modify the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Maps output ids to outputs and checks access rights
#[derive(Debug, Default)]
pub struct OutputTable {
    outputs: BTreeMap<OutputId, Output>,
}

impl OutputTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, output: Output) {
        self.outputs.insert(output.id, output);
    }

    pub fn remove(&mut self, id: OutputId) -> Option<Output> {
        self.outputs.remove(&id)
    }

    pub fn get(&self, id: OutputId) -> Option<&Output> {
        self.outputs.get(&id)
    }

    pub fn get_mut(&mut self, id: OutputId) -> Option<&mut Output> {
        self.outputs.get_mut(&id)
    }

    pub fn resolve(&self, id: OutputId, access: Access) -> Result<&Output> {
        let output = self.outputs.get(&id).ok_or(RrError::Output(id))?;
        check_access(output, access)?;
        Ok(output)
    }

    pub fn resolve_mut(&mut self, id: OutputId, access: Access) -> Result<&mut Output> {
        let output = self.outputs.get_mut(&id).ok_or(RrError::Output(id))?;
        check_access(output, access)?;
        Ok(output)
    }

    pub fn ids(&self) -> Vec<OutputId> {
        self.outputs.keys().copied().collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Output> {
        self.outputs.values_mut()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

fn check_access(output: &Output, access: Access) -> Result<()> {
    if access == Access::Write && output.read_only {
        return Err(RrError::Access(output.id));
    }
    Ok(())
}

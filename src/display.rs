//! Display state
//!
//! Everything the request handlers operate on: interned atoms, outputs and
//! their property stores, the window tree, connected clients, the server
//! clock and lifecycle phase. One task owns this and processes requests
//! against it one at a time.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::Timestamp;

use crate::atoms::{AtomTable, NON_DESKTOP};
use crate::client::{ClientId, ClientTable, Outbox};
use crate::config::{Config, ExtensionConfig};
use crate::notify::{DeliveryLog, Notifier, ServerPhase};
use crate::output::{Output, OutputId, OutputTable};
use crate::property::PropertyChange;
use crate::tree::WindowTree;
use area_randr_proto::ByteOrder;

/// Millisecond server time, wrapping like an X timestamp
#[derive(Debug, Clone, Copy)]
pub struct ServerClock {
    start: Instant,
    now: Timestamp,
}

impl ServerClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            now: 0,
        }
    }

    /// Advance to the current wall time
    pub fn update(&mut self) -> Timestamp {
        self.now = self.start.elapsed().as_millis() as Timestamp;
        self.now
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct DisplayState {
    pub(crate) atoms: AtomTable,
    pub(crate) outputs: OutputTable,
    pub(crate) windows: WindowTree,
    pub(crate) clients: ClientTable,
    pub(crate) phase: ServerPhase,
    pub(crate) clock: ServerClock,
    pub(crate) extension: ExtensionConfig,
}

impl DisplayState {
    pub fn new(extension: ExtensionConfig) -> Self {
        Self {
            atoms: AtomTable::new(),
            outputs: OutputTable::new(),
            windows: WindowTree::new(),
            clients: ClientTable::new(extension.first_event),
            phase: ServerPhase::Running,
            clock: ServerClock::new(),
            extension,
        }
    }

    /// Build the display from configuration, seeding every configured
    /// property before any client can observe it
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut state = Self::new(config.extension);
        let non_desktop = state.atoms.intern(NON_DESKTOP);

        for output_config in &config.outputs {
            if state.outputs.get(output_config.id).is_some() {
                bail!("Duplicate output id {:#x}", output_config.id);
            }
            state.windows.add_root(output_config.root);
            for window in &output_config.windows {
                let parent = window.parent.unwrap_or(output_config.root);
                state
                    .windows
                    .add_child(parent, window.id)
                    .with_context(|| format!("Window {:#x} on {}", window.id, output_config.name))?;
            }

            let mut output = Output::new(
                output_config.id,
                output_config.name.clone(),
                output_config.root,
                non_desktop,
            );
            output.set_leased(output_config.leased);
            output.set_read_only(output_config.read_only);

            // Nobody is listening yet
            let mut sink = DeliveryLog::new();
            let mut notifier = Notifier::new(&state.windows, &mut sink, state.phase, 0);
            for property in &output_config.properties {
                let name = state.atoms.intern(&property.name);
                let type_ = state.atoms.intern(&property.type_);
                let value = property.value(type_)?;
                debug!("Seeding {} (atom {}) on {}", property.name, name, output_config.name);

                output
                    .configure_property(name, property.flags(), &property.valid_values)
                    .with_context(|| format!("Failed to configure {:?}", property.name))?;
                output
                    .change_property(&PropertyChange::replace(name, &value), &mut notifier)
                    .with_context(|| format!("Failed to set {:?}", property.name))?;
            }
            output.take_changed();

            info!(
                "Output {} ({:#x}) with {} properties",
                output.name(),
                output.id(),
                output.properties().len()
            );
            state.outputs.insert(output);
        }

        Ok(state)
    }

    pub fn extension(&self) -> &ExtensionConfig {
        &self.extension
    }

    pub fn atoms(&self) -> &AtomTable {
        &self.atoms
    }

    pub fn atoms_mut(&mut self) -> &mut AtomTable {
        &mut self.atoms
    }

    pub fn outputs(&self) -> &OutputTable {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut OutputTable {
        &mut self.outputs
    }

    pub fn windows_mut(&mut self) -> &mut WindowTree {
        &mut self.windows
    }

    pub fn clients(&self) -> &ClientTable {
        &self.clients
    }

    pub fn time(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn phase(&self) -> ServerPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: ServerPhase) {
        debug!("Server phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    pub fn add_client(&mut self, id: ClientId, order: ByteOrder, outbox: Outbox) {
        self.clients.add(id, order, outbox);
    }

    pub fn remove_client(&mut self, id: ClientId) {
        if self.clients.remove(id) {
            self.windows.remove_client(id);
            debug!("Client {} disconnected", id.0);
        }
    }

    /// Tear an output down, deleting every property with a notification
    /// each. Returns the number of properties deleted.
    pub fn destroy_output(&mut self, id: OutputId) -> Option<usize> {
        self.clock.update();
        let (_, outputs, mut notifier) = self.split();
        let mut output = outputs.remove(id)?;
        let deleted = output.delete_all_properties(&mut notifier);
        info!("Output {} ({:#x}) destroyed", output.name(), id);
        Some(deleted)
    }

    /// Tear down every output, as when the server resets or exits. Returns
    /// the number of properties deleted.
    pub fn destroy_outputs(&mut self) -> usize {
        self.outputs
            .ids()
            .into_iter()
            .filter_map(|id| self.destroy_output(id))
            .sum()
    }

    /// Commit staged values on every output. Returns false if any single
    /// promotion failed.
    pub fn post_pending_properties(&mut self) -> bool {
        self.clock.update();
        let (_, outputs, mut notifier) = self.split();
        let mut ok = true;
        for output in outputs.iter_mut() {
            if !output.post_pending_properties(&mut notifier) {
                warn!("Pending commit incomplete on output {:#x}", output.id());
                ok = false;
            }
            if output.take_changed() {
                info!("Output {} configuration changed", output.name());
            }
        }
        ok
    }
}

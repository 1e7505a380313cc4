//! Property change notifications
//!
//! Builds `RROutputPropertyNotify` events and delivers one copy per
//! interested selection found while walking the window tree below the
//! output's screen root.

use area_randr_proto::{OutputPropertyNotify, PropertyState};
use tracing::{debug, trace};
use x11rb::protocol::randr::{NotifyMask, Output};
use x11rb::protocol::xproto::{Atom, Timestamp, Window};

use crate::client::ClientId;
use crate::tree::WindowTree;

/// Receives events bound for a client
pub trait EventSink {
    fn deliver(&mut self, client: ClientId, event: &OutputPropertyNotify);
}

/// Deliveries in the order they were made
pub type DeliveryLog = Vec<(ClientId, OutputPropertyNotify)>;

/// Recording sink, handy for drivers and tests that inspect deliveries
impl EventSink for DeliveryLog {
    fn deliver(&mut self, client: ClientId, event: &OutputPropertyNotify) {
        self.push((client, *event));
    }
}

/// Server lifecycle phase, consulted at the point of delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerPhase {
    #[default]
    Running,
    Resetting,
    Terminating,
}

impl ServerPhase {
    pub fn delivers_events(self) -> bool {
        self == Self::Running
    }
}

/// Everything needed to fan out a notification during one request
pub struct Notifier<'a> {
    tree: &'a WindowTree,
    sink: &'a mut dyn EventSink,
    phase: ServerPhase,
    time: Timestamp,
}

impl<'a> Notifier<'a> {
    pub fn new(
        tree: &'a WindowTree,
        sink: &'a mut dyn EventSink,
        phase: ServerPhase,
        time: Timestamp,
    ) -> Self {
        Self {
            tree,
            sink,
            phase,
            time,
        }
    }

    /// Deliver a property notification; returns the number of copies sent
    pub fn property_changed(
        &mut self,
        output: Output,
        root: Window,
        property: Atom,
        state: PropertyState,
    ) -> usize {
        if !self.phase.delivers_events() {
            debug!(
                "Dropping property event for output {:#x} during {:?}",
                output, self.phase
            );
            return 0;
        }

        let mask = u16::from(NotifyMask::OUTPUT_PROPERTY);
        let mut event = OutputPropertyNotify {
            window: root,
            output,
            atom: property,
            timestamp: self.time,
            state,
        };
        let sink = &mut *self.sink;
        let mut delivered = 0;
        self.tree.walk(root, |window, selections| {
            for selection in selections.iter().filter(|s| s.mask & mask != 0) {
                event.window = window;
                sink.deliver(selection.client, &event);
                delivered += 1;
            }
        });

        trace!(
            "Property {} on output {:#x} {:?}: {} deliveries",
            property, output, state, delivered
        );
        delivered
    }
}

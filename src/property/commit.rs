//! Pending property commit
//!
//! At a flush point every staged value that differs from the current one is
//! promoted through the ordinary replace path, which notifies and runs the
//! side-effect hook. Unchanged staged values are skipped silently.

use tracing::{trace, warn};

use super::mutate::PropertyChange;
use super::value::PropertyValue;
use crate::notify::Notifier;
use crate::output::Output;

impl Output {
    /// Promote staged values. Returns false if any promotion failed; the
    /// remaining properties are still attempted.
    pub fn post_pending_properties(&mut self, notifier: &mut Notifier<'_>) -> bool {
        if !self.properties.take_pending_writes() {
            return true;
        }

        let staged: Vec<(u32, PropertyValue)> = self
            .properties
            .iter()
            .filter(|record| record.is_pending())
            // never staged since it became pending
            .filter(|record| record.pending().format().is_some())
            .filter(|record| !record.pending().same_contents(record.current()))
            .map(|record| (record.name(), record.pending().clone()))
            .collect();

        let mut ok = true;
        for (name, value) in &staged {
            let change = PropertyChange::replace(*name, value).notify(true);
            if let Err(err) = self.change_property(&change, notifier) {
                warn!(
                    "Failed to commit property {} on output {:#x}: {}",
                    name, self.id, err
                );
                ok = false;
            }
        }
        trace!("Committed {} pending properties on {:#x}", staged.len(), self.id);
        ok
    }
}

//! Output properties
//!
//! Values, records and the per-output store, plus the mutation and commit
//! operations implemented on [`crate::output::Output`].

mod commit;
mod flags;
mod mutate;
mod record;
mod store;
mod value;

pub use flags::PropertyFlags;
pub use mutate::PropertyChange;
pub use record::PropertyRecord;
pub use store::PropertyStore;
pub use value::{merge_buffers, Format, PropertyMode, PropertyValue};

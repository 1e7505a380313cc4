//! Area RandR
//!
//! The RandR output property subsystem: per-output property stores with
//! pending-value staging, the mutation and commit engine, change
//! notifications, and the request handlers that sit on top of them.

pub mod atoms;
pub mod client;
pub mod config;
mod dispatch;
pub mod display;
pub mod error;
mod handlers;
pub mod notify;
pub mod output;
pub mod property;
pub mod server;
pub mod tree;

pub use display::DisplayState;
pub use error::{Result, RrError};
pub use output::{Output, OutputDriver, OutputTable};
pub use property::{PropertyChange, PropertyFlags, PropertyRecord, PropertyStore, PropertyValue};

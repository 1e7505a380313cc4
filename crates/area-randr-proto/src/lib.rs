//! Area RandR Wire Protocol
//!
//! Request decoding and reply/event/error encoding for the RandR output
//! property requests. Every multi-byte field is read and written in the byte
//! order the client negotiated, which may differ from host order.

pub mod replies;
pub mod requests;
mod wire;

pub use replies::*;
pub use requests::*;
pub use wire::{pad_len, swap_elements, ByteOrder, WireReader, WireWriter};

/// Errors raised while decoding a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The body is shorter or longer than the request layout requires
    #[error("request length does not match its layout")]
    Length,

    /// The minor opcode does not name a request this crate decodes
    #[error("unknown RandR request {0}")]
    UnknownRequest(u8),
}

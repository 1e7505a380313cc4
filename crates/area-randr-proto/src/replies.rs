//! Replies, events and errors
//!
//! Everything here serializes to the fixed 32-byte X layout followed by any
//! variable-length payload, in the byte order of the receiving client.

use x11rb::protocol::randr::{self, Notify, Output};
use x11rb::protocol::xproto::{Atom, Property, Timestamp, Window};

use crate::wire::{ByteOrder, WireWriter};

const REPLY: u8 = 1;
const ERROR: u8 = 0;

/// Generic reply header: type tag, one data byte, sequence, extra length
fn reply_header(w: &mut WireWriter, data: u8, sequence: u16, length: u32) {
    w.u8(REPLY).u8(data).u16(sequence).u32(length);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOutputPropertiesReply {
    pub atoms: Vec<Atom>,
}

impl ListOutputPropertiesReply {
    pub fn serialize(&self, order: ByteOrder, sequence: u16) -> Vec<u8> {
        let mut w = WireWriter::new(order);
        reply_header(&mut w, 0, sequence, self.atoms.len() as u32);
        w.u16(self.atoms.len() as u16).pad(22);
        w.elements(bytemuck::cast_slice(&self.atoms), 32);
        w.into_bytes()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutputPropertyReply {
    pub pending: bool,
    pub range: bool,
    pub immutable: bool,
    pub valid_values: Vec<i32>,
}

impl QueryOutputPropertyReply {
    pub fn serialize(&self, order: ByteOrder, sequence: u16) -> Vec<u8> {
        let mut w = WireWriter::new(order);
        reply_header(&mut w, 0, sequence, self.valid_values.len() as u32);
        w.u8(self.pending.into())
            .u8(self.range.into())
            .u8(self.immutable.into())
            .pad(21);
        w.elements(bytemuck::cast_slice(&self.valid_values), 32);
        w.into_bytes()
    }
}

/// Reply to `GetOutputProperty`; `data` holds host-order elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOutputPropertyReply {
    pub format: u8,
    pub type_: Atom,
    pub bytes_after: u32,
    pub num_items: u32,
    pub data: Vec<u8>,
}

impl GetOutputPropertyReply {
    pub fn serialize(&self, order: ByteOrder, sequence: u16) -> Vec<u8> {
        let mut w = WireWriter::new(order);
        let length = self.data.len().div_ceil(4) as u32;
        reply_header(&mut w, self.format, sequence, length);
        w.u32(self.type_)
            .u32(self.bytes_after)
            .u32(self.num_items)
            .pad(12);
        w.elements(&self.data, self.format).pad_to_4();
        w.into_bytes()
    }
}

/// What happened to the property named in a notify event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyState {
    NewValue,
    Delete,
}

impl From<PropertyState> for u8 {
    fn from(state: PropertyState) -> Self {
        match state {
            PropertyState::NewValue => Property::NEW_VALUE.into(),
            PropertyState::Delete => Property::DELETE.into(),
        }
    }
}

/// `RRNotify` event with the `OutputProperty` sub-code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPropertyNotify {
    pub window: Window,
    pub output: Output,
    pub atom: Atom,
    pub timestamp: Timestamp,
    pub state: PropertyState,
}

impl OutputPropertyNotify {
    pub const SIZE: usize = 32;

    pub fn serialize(&self, order: ByteOrder, first_event: u8, sequence: u16) -> Vec<u8> {
        let mut w = WireWriter::new(order);
        w.u8(first_event.wrapping_add(randr::NOTIFY_EVENT))
            .u8(Notify::OUTPUT_PROPERTY.into())
            .u16(sequence)
            .u32(self.window)
            .u32(self.output)
            .u32(self.atom)
            .u32(self.timestamp)
            .u8(self.state.into())
            .pad(11);
        w.into_bytes()
    }
}

/// X error packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorReply {
    pub code: u8,
    pub bad_value: u32,
    pub minor_opcode: u16,
    pub major_opcode: u8,
}

impl ErrorReply {
    pub fn serialize(&self, order: ByteOrder, sequence: u16) -> Vec<u8> {
        let mut w = WireWriter::new(order);
        w.u8(ERROR)
            .u8(self.code)
            .u16(sequence)
            .u32(self.bad_value)
            .u16(self.minor_opcode)
            .u8(self.major_opcode)
            .pad(21);
        w.into_bytes()
    }
}

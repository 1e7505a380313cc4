//! RandR output property requests
//!
//! Bodies are decoded after the generic 4-byte request header. Fixed fields
//! come out in host order; property data in `ChangeOutputProperty` is left in
//! the client's byte order because its element width is only known once the
//! format has been validated.

use x11rb::protocol::randr::{self, Output};
use x11rb::protocol::xproto::{Atom, Window};

use crate::wire::{ByteOrder, WireReader};
use crate::DecodeError;

pub const SELECT_INPUT: u8 = randr::SELECT_INPUT_REQUEST;
pub const LIST_OUTPUT_PROPERTIES: u8 = randr::LIST_OUTPUT_PROPERTIES_REQUEST;
pub const QUERY_OUTPUT_PROPERTY: u8 = randr::QUERY_OUTPUT_PROPERTY_REQUEST;
pub const CONFIGURE_OUTPUT_PROPERTY: u8 = randr::CONFIGURE_OUTPUT_PROPERTY_REQUEST;
pub const CHANGE_OUTPUT_PROPERTY: u8 = randr::CHANGE_OUTPUT_PROPERTY_REQUEST;
pub const DELETE_OUTPUT_PROPERTY: u8 = randr::DELETE_OUTPUT_PROPERTY_REQUEST;
pub const GET_OUTPUT_PROPERTY: u8 = randr::GET_OUTPUT_PROPERTY_REQUEST;

/// Generic X request header: major opcode, extension minor opcode and the
/// total request length in 4-byte units (header included)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub major_opcode: u8,
    pub minor_opcode: u8,
    pub length: u16,
}

impl RequestHeader {
    pub const SIZE: usize = 4;

    pub fn parse(order: ByteOrder, bytes: [u8; 4]) -> Self {
        let raw = [bytes[2], bytes[3]];
        let length = match order {
            ByteOrder::Msb => u16::from_be_bytes(raw),
            ByteOrder::Lsb => u16::from_le_bytes(raw),
        };
        Self {
            major_opcode: bytes[0],
            minor_opcode: bytes[1],
            length,
        }
    }

    /// Total request size in bytes, header included
    pub fn byte_len(&self) -> usize {
        usize::from(self.length) * 4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectInput {
    pub window: Window,
    pub enable: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOutputProperties {
    pub output: Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOutputProperty {
    pub output: Output,
    pub property: Atom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureOutputProperty {
    pub output: Output,
    pub property: Atom,
    pub pending: bool,
    pub range: bool,
    pub values: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOutputProperty {
    pub output: Output,
    pub property: Atom,
    pub type_: Atom,
    pub format: u8,
    pub mode: u8,
    pub num_units: u32,
    /// Raw trailing bytes, client byte order, padding included
    pub data: Vec<u8>,
}

impl ChangeOutputProperty {
    /// Size of the fixed part of the request, header included
    pub const FIXED_SIZE: usize = 24;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutputProperty {
    pub output: Output,
    pub property: Atom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOutputProperty {
    pub output: Output,
    pub property: Atom,
    pub type_: Atom,
    pub long_offset: u32,
    pub long_length: u32,
    /// Kept raw; anything but 0 or 1 is a protocol error
    pub delete: u8,
    pub pending: bool,
}

/// A decoded RandR property request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    SelectInput(SelectInput),
    ListOutputProperties(ListOutputProperties),
    QueryOutputProperty(QueryOutputProperty),
    ConfigureOutputProperty(ConfigureOutputProperty),
    ChangeOutputProperty(ChangeOutputProperty),
    DeleteOutputProperty(DeleteOutputProperty),
    GetOutputProperty(GetOutputProperty),
}

impl Request {
    /// Decode the body that follows a request header
    pub fn parse(order: ByteOrder, minor_opcode: u8, body: &[u8]) -> Result<Self, DecodeError> {
        let mut r = WireReader::new(order, body);
        let request = match minor_opcode {
            SELECT_INPUT => {
                let window = r.u32()?;
                let enable = r.u16()?;
                r.skip(2)?;
                Self::SelectInput(SelectInput { window, enable })
            }
            LIST_OUTPUT_PROPERTIES => Self::ListOutputProperties(ListOutputProperties {
                output: r.u32()?,
            }),
            QUERY_OUTPUT_PROPERTY => Self::QueryOutputProperty(QueryOutputProperty {
                output: r.u32()?,
                property: r.u32()?,
            }),
            CONFIGURE_OUTPUT_PROPERTY => {
                let output = r.u32()?;
                let property = r.u32()?;
                let pending = r.u8()? != 0;
                let range = r.u8()? != 0;
                r.skip(2)?;
                if r.remaining() % 4 != 0 {
                    return Err(DecodeError::Length);
                }
                let values = (0..r.remaining() / 4)
                    .map(|_| r.i32())
                    .collect::<Result<Vec<_>, _>>()?;
                Self::ConfigureOutputProperty(ConfigureOutputProperty {
                    output,
                    property,
                    pending,
                    range,
                    values,
                })
            }
            CHANGE_OUTPUT_PROPERTY => {
                let output = r.u32()?;
                let property = r.u32()?;
                let type_ = r.u32()?;
                let format = r.u8()?;
                let mode = r.u8()?;
                r.skip(2)?;
                let num_units = r.u32()?;
                let data = r.rest().to_vec();
                Self::ChangeOutputProperty(ChangeOutputProperty {
                    output,
                    property,
                    type_,
                    format,
                    mode,
                    num_units,
                    data,
                })
            }
            DELETE_OUTPUT_PROPERTY => Self::DeleteOutputProperty(DeleteOutputProperty {
                output: r.u32()?,
                property: r.u32()?,
            }),
            GET_OUTPUT_PROPERTY => {
                let output = r.u32()?;
                let property = r.u32()?;
                let type_ = r.u32()?;
                let long_offset = r.u32()?;
                let long_length = r.u32()?;
                let delete = r.u8()?;
                let pending = r.u8()? != 0;
                r.skip(2)?;
                Self::GetOutputProperty(GetOutputProperty {
                    output,
                    property,
                    type_,
                    long_offset,
                    long_length,
                    delete,
                    pending,
                })
            }
            other => return Err(DecodeError::UnknownRequest(other)),
        };
        r.finish()?;
        Ok(request)
    }

    /// Minor opcode this request was decoded from
    pub fn minor_opcode(&self) -> u8 {
        match self {
            Self::SelectInput(_) => SELECT_INPUT,
            Self::ListOutputProperties(_) => LIST_OUTPUT_PROPERTIES,
            Self::QueryOutputProperty(_) => QUERY_OUTPUT_PROPERTY,
            Self::ConfigureOutputProperty(_) => CONFIGURE_OUTPUT_PROPERTY,
            Self::ChangeOutputProperty(_) => CHANGE_OUTPUT_PROPERTY,
            Self::DeleteOutputProperty(_) => DELETE_OUTPUT_PROPERTY,
            Self::GetOutputProperty(_) => GET_OUTPUT_PROPERTY,
        }
    }
}

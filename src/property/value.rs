//! Property values
//!
//! A value is a typed array of 8, 16 or 32-bit elements stored in host byte
//! order. The element count is derived from the buffer, so the buffer length
//! always matches `len() * format / 8`.

use std::collections::TryReserveError;

use x11rb::protocol::xproto::{Atom, PropMode};

use crate::error::{Result, RrError};

/// Element width of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Card8,
    Card16,
    Card32,
}

impl Format {
    pub fn bits(self) -> u8 {
        match self {
            Self::Card8 => 8,
            Self::Card16 => 16,
            Self::Card32 => 32,
        }
    }

    /// Bytes per element
    pub fn unit_size(self) -> usize {
        usize::from(self.bits() / 8)
    }
}

impl TryFrom<u8> for Format {
    type Error = RrError;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            8 => Ok(Self::Card8),
            16 => Ok(Self::Card16),
            32 => Ok(Self::Card32),
            other => Err(RrError::Value(u32::from(other))),
        }
    }
}

/// How new elements combine with the existing value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyMode {
    Replace,
    Prepend,
    Append,
}

impl TryFrom<u8> for PropertyMode {
    type Error = RrError;

    fn try_from(mode: u8) -> Result<Self> {
        match mode {
            m if m == u8::from(PropMode::REPLACE) => Ok(Self::Replace),
            m if m == u8::from(PropMode::PREPEND) => Ok(Self::Prepend),
            m if m == u8::from(PropMode::APPEND) => Ok(Self::Append),
            other => Err(RrError::Value(u32::from(other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyValue {
    type_: Atom,
    format: Option<Format>,
    data: Vec<u8>,
}

impl PropertyValue {
    /// Build a value from host-order bytes; the length must be a whole
    /// number of elements
    pub fn new(type_: Atom, format: Format, data: Vec<u8>) -> Result<Self> {
        if data.len() % format.unit_size() != 0 {
            return Err(RrError::Length);
        }
        Ok(Self {
            type_,
            format: Some(format),
            data,
        })
    }

    /// 32-bit value from host integers
    pub fn from_card32(type_: Atom, values: &[u32]) -> Self {
        let data = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self {
            type_,
            format: Some(Format::Card32),
            data,
        }
    }

    pub(crate) fn from_parts(type_: Atom, format: Format, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len() % format.unit_size(), 0);
        Self {
            type_,
            format: Some(format),
            data,
        }
    }

    pub fn type_(&self) -> Atom {
        self.type_
    }

    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// Format as carried on the wire; 0 for a never-set value
    pub fn format_bits(&self) -> u8 {
        self.format.map_or(0, Format::bits)
    }

    /// Element count
    pub fn len(&self) -> usize {
        self.format.map_or(0, |f| self.data.len() / f.unit_size())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// First element read as a host-order CARD32
    pub fn first_card32(&self) -> Option<u32> {
        if self.format != Some(Format::Card32) {
            return None;
        }
        let bytes = self.data.get(..4)?;
        Some(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Structural equality used to skip no-op commits.
    ///
    /// Values without elements compare equal whatever their format.
    pub fn same_contents(&self, other: &Self) -> bool {
        if self.type_ != other.type_ || self.len() != other.len() {
            return false;
        }
        self.len() == 0 || (self.format == other.format && self.data == other.data)
    }
}

/// Combine an existing buffer with incoming bytes into a fresh allocation.
///
/// The result never aliases either input.
pub fn merge_buffers(
    mode: PropertyMode,
    existing: &[u8],
    incoming: &[u8],
) -> std::result::Result<Vec<u8>, TryReserveError> {
    let total = match mode {
        PropertyMode::Replace => incoming.len(),
        PropertyMode::Append | PropertyMode::Prepend => existing.len() + incoming.len(),
    };
    let mut merged = Vec::new();
    merged.try_reserve_exact(total)?;
    match mode {
        PropertyMode::Replace => merged.extend_from_slice(incoming),
        PropertyMode::Append => {
            merged.extend_from_slice(existing);
            merged.extend_from_slice(incoming);
        }
        PropertyMode::Prepend => {
            merged.extend_from_slice(incoming);
            merged.extend_from_slice(existing);
        }
    }
    Ok(merged)
}

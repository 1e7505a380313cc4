//! Byte-order aware readers and writers

use crate::DecodeError;

/// Byte order negotiated by a client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant byte first (`'B'` marker)
    Msb,
    /// Least significant byte first (`'l'` marker)
    Lsb,
}

impl ByteOrder {
    /// Byte order of the machine running the server
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Msb
        } else {
            Self::Lsb
        }
    }

    /// Parse the connection marker byte
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            b'B' => Some(Self::Msb),
            b'l' => Some(Self::Lsb),
            _ => None,
        }
    }

    /// Marker byte a client sends to select this order
    pub fn marker(self) -> u8 {
        match self {
            Self::Msb => b'B',
            Self::Lsb => b'l',
        }
    }

    /// Whether values must be reversed between host and this order
    pub fn is_swapped(self) -> bool {
        self != Self::native()
    }
}

/// Number of pad bytes that bring `len` to a multiple of four
pub fn pad_len(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Reverse every element of a property buffer in place.
///
/// Formats other than 16 and 32 are byte arrays and are left alone.
pub fn swap_elements(data: &mut [u8], format: u8) {
    match format {
        16 => data.chunks_exact_mut(2).for_each(|unit| unit.swap(0, 1)),
        32 => data.chunks_exact_mut(4).for_each(|unit| unit.reverse()),
        _ => {}
    }
}

/// Cursor over a request body
#[derive(Debug)]
pub struct WireReader<'a> {
    order: ByteOrder,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(order: ByteOrder, buf: &'a [u8]) -> Self {
        Self { order, buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::Length)?;
        let bytes = self.buf.get(self.pos..end).ok_or(DecodeError::Length)?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        let raw = [b[0], b[1]];
        Ok(match self.order {
            ByteOrder::Msb => u16::from_be_bytes(raw),
            ByteOrder::Lsb => u16::from_le_bytes(raw),
        })
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        let raw = [b[0], b[1], b[2], b[3]];
        Ok(match self.order {
            ByteOrder::Msb => u32::from_be_bytes(raw),
            ByteOrder::Lsb => u32::from_le_bytes(raw),
        })
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.u32()? as i32)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    /// Everything not consumed yet
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Fail unless the whole body has been consumed
    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(DecodeError::Length)
        }
    }
}

/// Growable output buffer for replies, events and errors
#[derive(Debug, Clone)]
pub struct WireWriter {
    order: ByteOrder,
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new(order: ByteOrder) -> Self {
        Self { order, buf: Vec::with_capacity(32) }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        let bytes = match self.order {
            ByteOrder::Msb => value.to_be_bytes(),
            ByteOrder::Lsb => value.to_le_bytes(),
        };
        self.buf.extend_from_slice(&bytes);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        let bytes = match self.order {
            ByteOrder::Msb => value.to_be_bytes(),
            ByteOrder::Lsb => value.to_le_bytes(),
        };
        self.buf.extend_from_slice(&bytes);
        self
    }

    pub fn pad(&mut self, len: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + len, 0);
        self
    }

    /// Append host-order elements, converting them to the writer's order
    pub fn elements(&mut self, data: &[u8], format: u8) -> &mut Self {
        let start = self.buf.len();
        self.buf.extend_from_slice(data);
        if self.order.is_swapped() {
            swap_elements(&mut self.buf[start..], format);
        }
        self
    }

    pub fn pad_to_4(&mut self) -> &mut Self {
        let pad = pad_len(self.buf.len());
        self.pad(pad)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

//! Property Flags
//!
//! Bitfield describing how a property behaves, as set by
//! `RRConfigureOutputProperty`.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PropertyFlags: u8 {
        /// Writes are staged and only take effect when committed
        const PENDING   = 1 << 0;
        /// Valid values are (min, max) pairs rather than an enumeration
        const RANGE     = 1 << 1;
        /// Configuration can never be relaxed and the property never deleted
        const IMMUTABLE = 1 << 2;
    }
}

impl PropertyFlags {
    /// Build flags from the three protocol booleans
    pub fn from_bools(pending: bool, range: bool, immutable: bool) -> Self {
        let mut flags = Self::empty();
        flags.set(Self::PENDING, pending);
        flags.set(Self::RANGE, range);
        flags.set(Self::IMMUTABLE, immutable);
        flags
    }
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self::empty()
    }
}

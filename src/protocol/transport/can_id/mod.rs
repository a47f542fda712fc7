//! 29-bit CAN identifiers as carried by NMEA 2000 (SAE J1939 extended frames).
use embedded_can::ExtendedId;

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Extended CAN identifier. Always holds a value within 29 bits.
pub struct CanId(u32);

impl CanId {
    /// Largest representable identifier (29 bits set).
    pub const MAX: u32 = 0x1FFF_FFFF;

    /// Wrap a raw identifier, discarding anything above bit 28.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw & Self::MAX)
    }

    /// Raw 29-bit value.
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Priority field (3 bits, value 0-7).
    #[inline]
    pub const fn priority(&self) -> u8 {
        ((self.0 >> 26) & 0x07) as u8
    }

    /// Source address (low 8 bits).
    #[inline]
    pub const fn source_address(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl From<ExtendedId> for CanId {
    fn from(id: ExtendedId) -> Self {
        Self(id.as_raw())
    }
}

impl From<CanId> for ExtendedId {
    fn from(id: CanId) -> Self {
        // The mask applied by `CanId::new` keeps every value in range.
        ExtendedId::new(id.0).unwrap_or(ExtendedId::MAX)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;

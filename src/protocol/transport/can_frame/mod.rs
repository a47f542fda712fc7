//! In-memory representation of a CAN 2.0B extended frame, the only data
//! shape exchanged between the TWAI link and the upper stack.
use embedded_can::{Frame, Id};

use crate::protocol::transport::can_id::CanId;

/// Maximum payload of a classic CAN frame.
pub const MAX_DATA_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Raw NMEA 2000 frame as read from, or written to, the CAN bus.
pub struct CanFrame {
    /// Full 29-bit CAN identifier.
    pub id: CanId,
    /// Payload buffer. Bytes past `len` are zero.
    pub data: [u8; MAX_DATA_LEN],
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    pub len: usize,
}

impl CanFrame {
    /// Build a frame from an upstream `(id, len, payload)` triple.
    ///
    /// `len` is clamped to 8 and never reads past the end of `payload`;
    /// oversized lengths are truncated, not rejected.
    pub fn from_parts(id: u32, len: u8, payload: &[u8]) -> Self {
        let len = (len as usize).min(MAX_DATA_LEN);
        let copied = len.min(payload.len());
        let mut data = [0u8; MAX_DATA_LEN];
        data[..copied].copy_from_slice(&payload[..copied]);
        Self {
            id: CanId::new(id),
            data,
            len,
        }
    }

    /// Build a frame carrying the whole of `payload` (truncated to 8 bytes).
    pub fn with_payload(id: u32, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_DATA_LEN) as u8;
        Self::from_parts(id, len, payload)
    }

    /// Valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len.min(MAX_DATA_LEN)]
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        match id.into() {
            Id::Extended(ext) if data.len() <= MAX_DATA_LEN => {
                Some(Self::with_payload(ext.as_raw(), data))
            }
            // Standard identifiers never reach the NMEA 2000 bus.
            _ => None,
        }
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        true
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        Id::Extended(self.id.into())
    }

    fn dlc(&self) -> usize {
        self.len
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}

//! Unit tests for `CanId` masking and accessors.
use super::*;

#[test]
/// Bits above the 29-bit range are dropped.
fn test_new_masks_to_29_bits() {
    let can_id = CanId::new(0xFAE2_25D1);
    assert_eq!(can_id.raw(), 0x1AE2_25D1);
    assert_eq!(CanId::new(u32::MAX).raw(), CanId::MAX);
}

#[test]
/// Extracts the priority and source address fields.
fn test_accessors() {
    let can_id = CanId::new(0x19F8_0542);
    assert_eq!(can_id.priority(), 6);
    assert_eq!(can_id.source_address(), 0x42);
}

#[test]
/// Conversion through `embedded_can::ExtendedId` keeps the raw value.
fn test_extended_id_conversion() {
    let ext = ExtendedId::new(0x0CF0_0400).unwrap();
    let can_id = CanId::from(ext);
    assert_eq!(can_id.raw(), 0x0CF0_0400);
    assert_eq!(ExtendedId::from(can_id), ext);
}

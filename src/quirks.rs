//! Per-device behavior overrides, looked up once at session-open time and cached on
//! the session for the rest of its life (SPEC_FULL.md §4.9).
//!
//! The bitset shape is grounded on `bitflags`-based attribute flags in
//! `other_examples/4936427c_caliangroup-libvisa__src-attribute-misc.rs.rs`; the
//! `(vendor_id, product_id, firmware substring)` keying scheme is specific to this
//! backend and has no teacher precedent, since the teacher's `model.rs` keys off
//! parsed `*IDN?` strings rather than USB descriptors.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct QuirkFlags: u32 {
        /// Device must be power-cycled (USB reset) immediately after opening the
        /// interface or it will not respond to the first command.
        const NEEDS_RESET_ON_OPEN          = 1 << 0;
        /// Device rejects any SET_CONFIGURATION other than the one already active;
        /// attempting to (re)select it is itself an error.
        const ONLY_ONE_SET_CONFIGURATION   = 1 << 1;
        /// Device's USBTMC header TransferSize field cannot be trusted and must be
        /// ignored in favor of reading until a short packet or EOM bit.
        const IGNORES_TRANSFER_SIZE_IN_HEADER = 1 << 2;
        /// Device never sets END/EOM on the last fragment of a read; the engine must
        /// synthesize completion itself once no more data arrives within a read's
        /// quiet window.
        const SUPPRESS_END_ON_READ         = 1 << 3;
    }
}

/// A single entry in the static quirks table.
struct QuirkEntry {
    vendor_id: u16,
    product_id: u16,
    /// Matched case-insensitively against the end of the device's firmware revision
    /// string, if present. `None` matches any firmware.
    firmware_substring: Option<&'static str>,
    flags: QuirkFlags,
}

static TABLE: &[QuirkEntry] = &[
    // Example: a Rigol DP800-series PSU that needs a reset before its first command.
    QuirkEntry {
        vendor_id: 0x1AB1,
        product_id: 0x0E11,
        firmware_substring: None,
        flags: QuirkFlags::NEEDS_RESET_ON_OPEN,
    },
];

/// Looks up the quirk flags for a USB-identified device. `firmware` is the revision
/// string reported in the device descriptor or `*IDN?`, when available.
pub fn lookup(vendor_id: u16, product_id: u16, firmware: Option<&str>) -> QuirkFlags {
    TABLE
        .iter()
        .filter(|e| e.vendor_id == vendor_id && e.product_id == product_id)
        .filter(|e| match (e.firmware_substring, firmware) {
            (None, _) => true,
            (Some(sub), Some(fw)) => fw.to_ascii_lowercase().contains(&sub.to_ascii_lowercase()),
            (Some(_), None) => false,
        })
        .fold(QuirkFlags::empty(), |acc, e| acc | e.flags)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_device_has_no_quirks() {
        assert_eq!(lookup(0xFFFF, 0xFFFF, None), QuirkFlags::empty());
    }

    #[test]
    fn known_device_matches_regardless_of_firmware() {
        let flags = lookup(0x1AB1, 0x0E11, Some("v1.02"));
        assert!(flags.contains(QuirkFlags::NEEDS_RESET_ON_OPEN));
    }

    #[test]
    fn flags_combine_with_bitor() {
        let combined = QuirkFlags::NEEDS_RESET_ON_OPEN | QuirkFlags::SUPPRESS_END_ON_READ;
        assert!(combined.contains(QuirkFlags::NEEDS_RESET_ON_OPEN));
        assert!(combined.contains(QuirkFlags::SUPPRESS_END_ON_READ));
        assert!(!combined.contains(QuirkFlags::ONLY_ONE_SET_CONFIGURATION));
    }
}

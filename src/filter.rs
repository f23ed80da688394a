//! Packet filters.
//!
//! The original source expresses these as a `filter` virtual base with three
//! concrete subclasses (`Src/Gen/Dcc/Filter.h`). The set is closed and small,
//! so this implementation follows the redesign guidance in favor of a tagged
//! enum over a vtable.

use crate::packet::Packet;

/// A packet filter. `invalidate()` on any variant rejects every packet,
/// matching the original's `lo=1, hi=0` "impossible range" trick.
#[derive(Debug, Clone, Copy)]
pub enum Filter {
    /// Pass packets whose primary (undecoded) address byte falls in `[lo, hi]`.
    PrimaryAddress { lo: u8, hi: u8 },
    /// Pass packets whose decoded address falls in `[lo, hi]`, for any kind.
    Address { lo: u16, hi: u16, cv29: u8 },
    /// Pass only Basic/Extended accessory packets whose decoded address
    /// falls in `[lo, hi]`.
    AccessoryAddress { lo: u16, hi: u16, cv29: u8 },
}

impl Filter {
    pub const fn invalid_primary_address() -> Self {
        Filter::PrimaryAddress { lo: 1, hi: 0 }
    }

    pub const fn invalid_address(cv29: u8) -> Self {
        Filter::Address { lo: 1, hi: 0, cv29 }
    }

    pub const fn invalid_accessory_address(cv29: u8) -> Self {
        Filter::AccessoryAddress { lo: 1, hi: 0, cv29 }
    }

    /// Returns `true` if `pkt` passes this filter.
    pub fn passes<const MAX_BYTES: usize>(&self, pkt: &mut Packet<MAX_BYTES>) -> bool {
        match *self {
            Filter::PrimaryAddress { lo, hi } => {
                let addr = pkt.primary_address();
                addr >= lo && addr <= hi
            }
            Filter::Address { lo, hi, cv29 } => {
                let addr = pkt.address(cv29);
                addr >= lo && addr <= hi
            }
            Filter::AccessoryAddress { lo, hi, cv29 } => {
                use crate::packet::Kind;
                match pkt.kind() {
                    Kind::BasicAccessory | Kind::ExtendedAccessory => {
                        let addr = pkt.address(cv29);
                        addr >= lo && addr <= hi
                    }
                    _ => false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_from_bytes(bytes: &[u8]) -> Packet {
        let mut p = Packet::new();
        for &b in bytes {
            for bit in (0..8).rev() {
                p.add_bit((b >> bit) & 1);
            }
        }
        p
    }

    #[test]
    fn invalid_primary_address_rejects_everything() {
        let f = Filter::invalid_primary_address();
        let mut p = packet_from_bytes(&[0xFF]);
        assert!(!f.passes(&mut p));
    }

    #[test]
    fn primary_address_range() {
        let f = Filter::PrimaryAddress { lo: 0x80, hi: 0xBF };
        let mut p = packet_from_bytes(&[0x81, 0xF9, 0x78]);
        assert!(f.passes(&mut p));
    }

    #[test]
    fn accessory_filter_rejects_non_accessory() {
        let f = Filter::AccessoryAddress { lo: 0, hi: 2047, cv29: 0 };
        // 0x03 is a MultiFunction7 primary address, not an accessory packet.
        let mut p = packet_from_bytes(&[0x03, 0x3F, 0x3C]);
        assert!(!f.passes(&mut p));
        let mut idle = packet_from_bytes(&[0xFF]);
        assert!(!f.passes(&mut idle));
    }

    #[test]
    fn accessory_filter_passes_matching_accessory() {
        let f = Filter::AccessoryAddress { lo: 0, hi: 2047, cv29: 0 };
        let mut p = packet_from_bytes(&[0x81, 0xF9, 0x78]);
        assert!(f.passes(&mut p));
    }
}

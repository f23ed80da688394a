//! Bit-event stream to framed-packet state machine.
//!
//! Grounded on `Src/Gen/Dcc/PacketExtractor.h`: preamble counting saturates
//! at 255 and resets on every "0", and the 9th bit of each byte is the
//! byte-separator (`0`, more data follows) or end-of-packet (`1`) marker.

use crate::bitsm::Event;
use crate::packet::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Data,
}

/// Assembles [`Packet`]s from a stream of bit events.
pub struct PacketSm<const MAX_BYTES: usize = 6> {
    state: State,
    preamble_min_ones: u8,
    ones_in_preamble: u8,
    bits_in_byte: u8,
    working: Packet<MAX_BYTES>,
    /// Incremented whenever assembly overflows `MAX_BYTES` and is reset.
    pub overflow_count: u32,
}

impl<const MAX_BYTES: usize> PacketSm<MAX_BYTES> {
    pub const fn new() -> Self {
        Self::with_preamble_min_ones(10)
    }

    pub const fn with_preamble_min_ones(preamble_min_ones: u8) -> Self {
        Self {
            state: State::Preamble,
            preamble_min_ones,
            ones_in_preamble: 0,
            bits_in_byte: 0,
            working: Packet::new(),
            overflow_count: 0,
        }
    }

    fn reset(&mut self) {
        self.state = State::Preamble;
        self.ones_in_preamble = 0;
        self.bits_in_byte = 0;
        self.working.clear();
    }

    /// Drive the state machine with one bit event. Returns a completed
    /// packet when the end-of-packet bit is observed.
    pub fn execute(&mut self, event: Event) -> Option<Packet<MAX_BYTES>> {
        match event {
            Event::Invalid => {
                self.reset();
                None
            }
            Event::None => None,
            Event::One => self.on_bit(1),
            Event::Zero => self.on_bit(0),
        }
    }

    fn on_bit(&mut self, bit: u8) -> Option<Packet<MAX_BYTES>> {
        match self.state {
            State::Preamble => {
                if bit == 1 {
                    self.ones_in_preamble = self.ones_in_preamble.saturating_add(1);
                } else {
                    if self.ones_in_preamble >= self.preamble_min_ones {
                        self.state = State::Data;
                    }
                    self.ones_in_preamble = 0;
                }
                None
            }
            State::Data => self.on_data_bit(bit),
        }
    }

    fn on_data_bit(&mut self, bit: u8) -> Option<Packet<MAX_BYTES>> {
        if self.bits_in_byte < 8 {
            if !self.working.add_bit(bit) {
                self.overflow_count += 1;
                self.reset();
                return None;
            }
            self.bits_in_byte += 1;
            None
        } else {
            self.bits_in_byte = 0;
            if bit == 1 {
                self.working.preamble_ones = self.ones_in_preamble;
                let finished = self.working;
                self.working.clear();
                self.state = State::Preamble;
                self.ones_in_preamble = 0;
                Some(finished)
            } else {
                None
            }
        }
    }
}

impl<const MAX_BYTES: usize> Default for PacketSm<MAX_BYTES> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Kind;

    fn feed_bits(sm: &mut PacketSm, bits: &[u8]) -> Option<Packet> {
        let mut out = None;
        for &b in bits {
            let ev = if b == 1 { Event::One } else { Event::Zero };
            if let Some(p) = sm.execute(ev) {
                out = Some(p);
            }
        }
        out
    }

    fn bits_of(byte: u8) -> [u8; 8] {
        let mut out = [0u8; 8];
        for i in 0..8 {
            out[i] = (byte >> (7 - i)) & 1;
        }
        out
    }

    #[test]
    fn assembles_idle_packet() {
        let mut sm = PacketSm::<6>::new();
        let mut bits: Vec<u8> = core::iter::repeat(1u8).take(10).collect();
        bits.push(0); // end of preamble
        bits.extend_from_slice(&bits_of(0xFF));
        bits.push(1); // end of packet

        let pkt = feed_bits(&mut sm, &bits).expect("packet expected");
        assert_eq!(pkt.num_bytes(), 1);
        assert_eq!(pkt.byte(0), 0xFF);
        assert_eq!(pkt.preamble_ones, 10);
    }

    #[test]
    fn short_preamble_is_rejected() {
        let mut sm = PacketSm::<6>::new();
        let mut bits: Vec<u8> = core::iter::repeat(1u8).take(9).collect();
        bits.push(0);
        bits.extend_from_slice(&bits_of(0xFF));
        bits.push(1);

        assert!(feed_bits(&mut sm, &bits).is_none());
    }

    #[test]
    fn invalid_event_resets_mid_packet() {
        let mut sm = PacketSm::<6>::new();
        let mut bits: Vec<u8> = core::iter::repeat(1u8).take(10).collect();
        bits.push(0);
        bits.extend_from_slice(&bits_of(0x81));
        // corrupt the stream with an invalid event mid-byte
        sm.execute(Event::One);
        sm.execute(Event::Zero);
        sm.execute(Event::Invalid);

        let mut fresh_bits: Vec<u8> = core::iter::repeat(1u8).take(10).collect();
        fresh_bits.push(0);
        fresh_bits.extend_from_slice(&bits_of(0xFF));
        fresh_bits.push(1);

        let mut pkt = None;
        for &b in &fresh_bits {
            let ev = if b == 1 { Event::One } else { Event::Zero };
            if let Some(p) = sm.execute(ev) {
                pkt = Some(p);
            }
        }
        let mut pkt = pkt.expect("packet expected after reset");
        assert_eq!(pkt.kind(), Kind::Idle);
    }
}

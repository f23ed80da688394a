//! Half-bit pair to bit-event state machine.
//!
//! Transition table and event semantics are grounded verbatim on
//! `Src/Gen/Dcc/BitExtractor.h::execute`: the event dispatched is a function
//! of the *post-transition* state, so `Event::Invalid` fires every tick that
//! lands in `State::Invalid`, not only the first time it is entered.

use crate::halfbit::HalfBit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Invalid,
    ShortInit1,
    ShortInit2,
    LongInit1,
    LongInit2,
    Short1,
    Short2,
    Long1,
    Long2,
}

/// Event emitted for a half-bit tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// No bit completed this tick.
    None,
    /// A "1" bit completed.
    One,
    /// A "0" bit completed.
    Zero,
    /// The half-bit was outside both timing windows; state reset.
    Invalid,
}

/// Bit extraction state machine. `Default`-constructs into `State::Invalid`,
/// matching the original's "no phase acquired yet" boot state.
#[derive(Debug, Clone, Copy)]
pub struct BitSm {
    state: State,
}

impl BitSm {
    pub const fn new() -> Self {
        Self {
            state: State::Invalid,
        }
    }

    pub const fn state(&self) -> State {
        self.state
    }

    /// Advance the state machine with one classified half-bit and return the
    /// event it produced.
    pub fn execute(&mut self, half_bit: HalfBit) -> Event {
        use State::*;
        self.state = match (self.state, half_bit) {
            (_, HalfBit::Invalid) => Invalid,
            (Invalid, HalfBit::Short) => ShortInit1,
            (Invalid, HalfBit::Long) => LongInit1,
            (ShortInit1, HalfBit::Short) => ShortInit2,
            (ShortInit1, HalfBit::Long) => Long1,
            (ShortInit2, HalfBit::Short) => ShortInit1,
            (ShortInit2, HalfBit::Long) => Long1,
            (LongInit1, HalfBit::Short) => Short1,
            (LongInit1, HalfBit::Long) => LongInit2,
            (LongInit2, HalfBit::Short) => Short1,
            (LongInit2, HalfBit::Long) => LongInit1,
            (Short1, HalfBit::Short) => Short2,
            (Short1, HalfBit::Long) => Invalid,
            (Short2, HalfBit::Short) => Short1,
            (Short2, HalfBit::Long) => Long1,
            (Long1, HalfBit::Short) => Invalid,
            (Long1, HalfBit::Long) => Long2,
            (Long2, HalfBit::Short) => Short1,
            (Long2, HalfBit::Long) => Long1,
        };

        match self.state {
            State::Invalid => Event::Invalid,
            State::ShortInit2 | State::Short2 => Event::One,
            State::LongInit2 | State::Long2 => Event::Zero,
            _ => Event::None,
        }
    }
}

impl Default for BitSm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::halfbit::HalfBit::{Invalid, Long, Short};

    fn run(seq: &[crate::halfbit::HalfBit]) -> Vec<Event> {
        let mut sm = BitSm::new();
        seq.iter().map(|h| sm.execute(*h)).collect()
    }

    #[test]
    fn one_bit_from_boot() {
        let events = run(&[Short, Short]);
        assert_eq!(events, [Event::None, Event::One]);
    }

    #[test]
    fn zero_bit_from_boot() {
        let events = run(&[Long, Long]);
        assert_eq!(events, [Event::None, Event::Zero]);
    }

    #[test]
    fn invalid_resets_and_refires_while_invalid() {
        let events = run(&[Short, Invalid, Invalid]);
        assert_eq!(events, [Event::None, Event::Invalid, Event::Invalid]);
    }

    #[test]
    fn recovers_phase_after_invalid() {
        let mut sm = BitSm::new();
        sm.execute(Invalid);
        assert_eq!(sm.execute(Short), Event::None);
        assert_eq!(sm.execute(Short), Event::One);
    }

    #[test]
    fn short1_long_is_invalid() {
        let mut sm = BitSm::new();
        sm.execute(Long); // LongInit1
        sm.execute(Short); // Short1
        assert_eq!(sm.execute(Long), Event::Invalid);
    }
}

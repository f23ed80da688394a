//! EEPROM-backed calibration store.
//!
//! Grounded on `Src/Prj/App/Signal/Cal/CalM.h`'s `cal::CalM`: a flat CV byte
//! image with a manufacturer-ID validity marker, write-through-on-change
//! `set_cv`, pin reconfiguration triggered by input/output CV writes, and
//! signal-aspect/classifier-limit accessors. CV indices follow the layout in
//! this crate's own CV map; the bitfield packing style (top-bits-are-an-enum,
//! low-bits-are-a-pin-number) follows the teacher's `timer/regs.rs` use of
//! `bitbybit::bitfield`/`bitenum`.

use arbitrary_int::u6;
use bitbybit::{bitenum, bitfield};
use static_assertions::const_assert;

use crate::error::{Error, Result};
use crate::hal::{Eeprom, PinMode};

/// Typical AVR-class EEPROM size this image must fit inside (e.g. the
/// ATmega328P's 1 KiB EEPROM).
const EEPROM_SIZE: usize = 1024;

/// CV (configuration variable) indices.
pub mod cv {
    pub const DECODER_ADDRESS_LSB: u16 = 1;
    pub const AUXILIARY_ACTIVATION: u16 = 2;
    pub const TIME_ON_BASE: u16 = 3;
    pub const MANUFACTURER_VERSION_ID: u16 = 7;
    pub const MANUFACTURER_ID: u16 = 8;
    pub const DECODER_ADDRESS_MSB: u16 = 9;
    pub const CONFIGURATION: u16 = 29;
    pub const MANUFACTURER_CV_STRUCTURE_ID: u16 = 33;
    pub const DCC_ADDRESSING_METHOD: u16 = 39;
    pub const MAX_NR_SIGNALS: u16 = 40;
    pub const MAX_BUILT_IN_IDS: u16 = 41;
    pub const SIGNAL_ID_BASE: u16 = 42;
    pub const SIGNAL_FIRST_OUTPUT_BASE: u16 = 50;
    pub const SIGNAL_INPUT_BASE: u16 = 58;
    pub const SIGNAL_INPUT_CLASSIFIER_TYPE_BASE: u16 = 66;
    pub const CLASSIFIER_CAL_BASE: u16 = 112;
    pub const USER_DEFINED_SIGNAL_BASE: u16 = 200;
}

pub const NR_SIGNALS: usize = 8;
pub const NR_CLASSIFIERS: usize = 8;
pub const NR_CLASSES_PER_CLASSIFIER: usize = 5;
pub const CLASSIFIER_CAL_LENGTH: u16 = 1 + 2 * NR_CLASSES_PER_CLASSIFIER as u16;
pub const NR_USER_DEFINED_SIGNALS: usize = 4;
pub const SIGNAL_RECORD_LENGTH: u16 = 1 + 2 * 8 + 1 + 1;
pub const LAST_CV: u16 = cv::USER_DEFINED_SIGNAL_BASE
    + NR_USER_DEFINED_SIGNALS as u16 * SIGNAL_RECORD_LENGTH;

const_assert!((LAST_CV as usize) <= EEPROM_SIZE);

/// EEPROM erase value; a manufacturer-ID byte still at this value means the
/// image has never been programmed.
pub const EEPROM_ERASE_VALUE: u8 = 0xFF;

pub const FIRST_BUILT_IN_SIGNAL_ID: u8 = 1;
pub const NR_BUILT_IN_SIGNALS: u8 = 127;
pub const FIRST_USER_DEFINED_SIGNAL_ID: u8 = 128;

/// CV29, the baseline NMRA configuration register.
#[bitfield(u8, default = 0)]
pub struct Configuration {
    #[bit(7, rw)]
    pub accessory_flag: bool,
    /// `false` = decoder-address method, `true` = output-address method.
    #[bit(6, rw)]
    pub output_address_method: bool,
    #[bit(5, rw)]
    pub decoder_type: bool,
}

#[bitenum(u2, exhaustive = true)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Onboard = 0b00,
    External = 0b01,
    Reserved1 = 0b10,
    Reserved2 = 0b11,
}

#[bitenum(u2, exhaustive = true)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Dcc = 0b00,
    Adc = 0b01,
    Digital = 0b10,
    Reserved = 0b11,
}

/// `SignalFirstOutput[idx]`: top 2 bits select onboard/external, low 6 bits
/// are the pin number.
#[bitfield(u8, default = 0)]
pub struct SignalFirstOutput {
    #[bits(6..=7, rw)]
    pub kind: OutputKind,
    #[bits(0..=5, rw)]
    pub pin: u6,
}

/// `SignalInput[idx]`: top 2 bits select the input source, low 6 bits are the
/// pin number (ADC channel or digital pin, depending on `source`).
#[bitfield(u8, default = 0)]
pub struct SignalInput {
    #[bits(6..=7, rw)]
    pub source: InputSource,
    #[bits(0..=5, rw)]
    pub pin: u6,
}

/// Resolved signal aspect, as returned by [`Store::signal_aspect`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalAspect {
    pub num_outputs: u8,
    /// Bit per output, MSB-aligned to the first output pin: `1` = 100 %.
    pub aspect_mask: u8,
    /// Bit per output: `1` = blink. Stored and round-tripped, see
    /// `DESIGN.md`'s Open Question #5 for why dispatch does not yet act on it.
    pub blink_mask: u8,
    pub change_over_time_10ms: u8,
    pub change_over_time_blink_10ms: u8,
}

/// A built-in signal template, stored in ROM with the same byte layout as a
/// user-defined one.
#[derive(Debug, Clone, Copy)]
pub struct BuiltInSignal {
    pub num_outputs: u8,
    pub aspects: [(u8, u8); 8],
    pub change_over_time_10ms: u8,
    pub change_over_time_blink_10ms: u8,
}

/// ROM defaults for the base CVs (everything not signal/classifier data).
const BASE_DEFAULTS: &[(u16, u8)] = &[
    (cv::DECODER_ADDRESS_LSB, 3),
    (cv::DECODER_ADDRESS_MSB, 0),
    (cv::MANUFACTURER_VERSION_ID, 1),
    (cv::MANUFACTURER_ID, 13),
    (cv::CONFIGURATION, 0b1000_0000),
    (cv::MANUFACTURER_CV_STRUCTURE_ID, 1),
    (cv::DCC_ADDRESSING_METHOD, 1),
    (cv::MAX_NR_SIGNALS, NR_SIGNALS as u8),
    (cv::MAX_BUILT_IN_IDS, NR_BUILT_IN_SIGNALS),
];

/// A two-aspect (red/green) built-in home signal, used to seed signal 0 by
/// default so a factory-fresh decoder comes up with something sensible.
const BUILT_IN_HOME_SIGNAL: BuiltInSignal = BuiltInSignal {
    num_outputs: 2,
    // Aspect bits are MSB-aligned to the first output pin: bit 7 is output
    // 0, bit 6 is output 1.
    aspects: [
        (0b1000_0000, 0), // cmd 0: red  -> first output on, second off
        (0b0100_0000, 0), // cmd 1: green -> first output off, second on
        (0, 0),
        (0, 0),
        (0, 0),
        (0, 0),
        (0, 0),
        (0, 0),
    ],
    change_over_time_10ms: 50,
    change_over_time_blink_10ms: 50,
};

/// EEPROM-backed CV store. `E` is the concrete EEPROM backend, `P` the pin
/// configurator; both are supplied by the firmware's main().
pub struct Store<E, P> {
    image: [u8; LAST_CV as usize],
    eeprom: E,
    pins: P,
}

impl<E: Eeprom, P: PinMode> Store<E, P> {
    pub fn new(eeprom: E, pins: P) -> Self {
        Self {
            image: [0u8; LAST_CV as usize],
            eeprom,
            pins,
        }
    }

    /// Read the whole image from EEPROM; if the manufacturer-ID marker is
    /// still at the erase value, write defaults and persist them. Returns
    /// `Err(Error::CalibrationUninitialized)` when defaults had to be
    /// (re)written -- the store is fully usable either way, this is a
    /// notice for the caller to log, not a failure to initialize.
    pub fn init(&mut self) -> Result<()> {
        self.read_all();
        if self.image[cv::MANUFACTURER_ID as usize] == EEPROM_ERASE_VALUE {
            self.set_defaults();
            self.write_all();
            self.configure_pins();
            Err(Error::CalibrationUninitialized)
        } else {
            self.configure_pins();
            Ok(())
        }
    }

    pub fn is_valid(&self) -> bool {
        self.image[cv::MANUFACTURER_ID as usize] != EEPROM_ERASE_VALUE
    }

    fn read_all(&mut self) {
        for (addr, slot) in self.image.iter_mut().enumerate() {
            *slot = self.eeprom.read_byte(addr as u16);
        }
    }

    fn write_all(&mut self) {
        for (addr, value) in self.image.iter().enumerate() {
            self.eeprom.write_byte(addr as u16, *value);
        }
    }

    pub fn set_defaults(&mut self) {
        self.image = [0u8; LAST_CV as usize];
        for &(id, val) in BASE_DEFAULTS {
            self.image[id as usize] = val;
        }
        if NR_SIGNALS > 0 {
            self.image[(cv::SIGNAL_ID_BASE) as usize] = FIRST_BUILT_IN_SIGNAL_ID;
        }
    }

    pub fn is_cv_valid(&self, cv_id: u16) -> bool {
        (cv_id as usize) < self.image.len()
    }

    pub fn get_cv(&self, cv_id: u16) -> u8 {
        if self.is_cv_valid(cv_id) {
            self.image[cv_id as usize]
        } else {
            0
        }
    }

    /// Read a CV from the programming-track boundary (POM/service mode),
    /// bounds-checked -- unlike `get_cv`, used internally by accessors whose
    /// indices are already known to be in range.
    pub fn read_cv(&self, cv_id: u16) -> Result<u8> {
        if self.is_cv_valid(cv_id) {
            Ok(self.image[cv_id as usize])
        } else {
            Err(Error::OutOfRangeCv(cv_id))
        }
    }

    /// Write a CV from the programming-track boundary, bounds-checked.
    pub fn write_cv(&mut self, cv_id: u16, value: u8) -> Result<()> {
        if !self.is_cv_valid(cv_id) {
            return Err(Error::OutOfRangeCv(cv_id));
        }
        self.set_cv(cv_id, value);
        Ok(())
    }

    /// Write a CV if it changed, persist it, and reconfigure pins if it was
    /// an input/output CV.
    pub fn set_cv(&mut self, cv_id: u16, value: u8) {
        if !self.is_cv_valid(cv_id) {
            return;
        }
        if self.image[cv_id as usize] == value {
            return;
        }
        self.image[cv_id as usize] = value;
        self.eeprom.write_byte(cv_id, value);

        let is_input = cv_id >= cv::SIGNAL_INPUT_BASE
            && cv_id < cv::SIGNAL_INPUT_BASE + NR_SIGNALS as u16;
        let is_output = cv_id >= cv::SIGNAL_FIRST_OUTPUT_BASE
            && cv_id < cv::SIGNAL_FIRST_OUTPUT_BASE + NR_SIGNALS as u16;
        if is_input || is_output {
            self.configure_pins();
        }
    }

    pub fn configuration(&self) -> Configuration {
        Configuration::new_with_raw_value(self.get_cv(cv::CONFIGURATION))
    }

    pub fn dcc_addressing_method(&self) -> u8 {
        self.get_cv(cv::DCC_ADDRESSING_METHOD)
    }

    /// Decoder address, per CV29 bit 6's addressing method (see
    /// `DccDecoder.cpp::cal_calcAddress`).
    pub fn decoder_address(&self) -> u16 {
        let lsb = self.get_cv(cv::DECODER_ADDRESS_LSB);
        let msb = self.get_cv(cv::DECODER_ADDRESS_MSB);
        if self.configuration().output_address_method() {
            (lsb as u16) | ((msb as u16) << 8)
        } else {
            (lsb & 0x3F) as u16 | (((msb & 0x07) as u16) << 6)
        }
    }

    pub fn signal_id(&self, signal_idx: u8) -> u8 {
        if (signal_idx as usize) >= NR_SIGNALS {
            return 0;
        }
        self.get_cv(cv::SIGNAL_ID_BASE + signal_idx as u16)
    }

    pub fn is_built_in(&self, signal_id: u8) -> bool {
        signal_id >= FIRST_BUILT_IN_SIGNAL_ID
            && signal_id < FIRST_BUILT_IN_SIGNAL_ID + NR_BUILT_IN_SIGNALS
    }

    pub fn is_user_defined(&self, signal_id: u8) -> bool {
        signal_id >= FIRST_USER_DEFINED_SIGNAL_ID
            && (signal_id as usize)
                < FIRST_USER_DEFINED_SIGNAL_ID as usize + NR_USER_DEFINED_SIGNALS
    }

    fn built_in_signal(&self, signal_id: u8) -> Option<BuiltInSignal> {
        // Only one built-in template is modeled; a real image would hold a
        // ROM table indexed by `signal_id - FIRST_BUILT_IN_SIGNAL_ID`.
        if self.is_built_in(signal_id) {
            Some(BUILT_IN_HOME_SIGNAL)
        } else {
            None
        }
    }

    fn user_defined_record_base(&self, signal_id: u8) -> u16 {
        let idx = (signal_id - FIRST_USER_DEFINED_SIGNAL_ID) as u16;
        cv::USER_DEFINED_SIGNAL_BASE + idx * SIGNAL_RECORD_LENGTH
    }

    pub fn number_of_outputs(&self, signal_id: u8) -> u8 {
        if self.is_user_defined(signal_id) {
            let base = self.user_defined_record_base(signal_id);
            self.get_cv(base) & 0x0F
        } else if let Some(sig) = self.built_in_signal(signal_id) {
            sig.num_outputs
        } else {
            0
        }
    }

    /// Resolve the signal aspect for `signal_id` at command index `cmd`
    /// (`cmd` is clamped to the valid 0..8 aspect range; an out-of-range
    /// command never panics, matching the original's unconditional array
    /// access being backed by a fixed 8-entry table).
    pub fn signal_aspect(&self, signal_id: u8, cmd: u8) -> SignalAspect {
        let cmd = (cmd as usize).min(7);
        if self.is_user_defined(signal_id) {
            let base = self.user_defined_record_base(signal_id);
            let num_outputs = self.get_cv(base) & 0x0F;
            let aspect = self.get_cv(base + 1 + cmd as u16 * 2);
            let blink = self.get_cv(base + 1 + cmd as u16 * 2 + 1);
            let change_over_time_10ms = self.get_cv(base + 17);
            let change_over_time_blink_10ms = self.get_cv(base + 18);
            SignalAspect {
                num_outputs,
                aspect_mask: aspect,
                blink_mask: blink,
                change_over_time_10ms,
                change_over_time_blink_10ms,
            }
        } else if let Some(sig) = self.built_in_signal(signal_id) {
            let (aspect, blink) = sig.aspects[cmd];
            SignalAspect {
                num_outputs: sig.num_outputs,
                aspect_mask: aspect,
                blink_mask: blink,
                change_over_time_10ms: sig.change_over_time_10ms,
                change_over_time_blink_10ms: sig.change_over_time_blink_10ms,
            }
        } else {
            SignalAspect::default()
        }
    }

    pub fn input(&self, signal_idx: u8) -> SignalInput {
        SignalInput::new_with_raw_value(self.get_cv(cv::SIGNAL_INPUT_BASE + signal_idx as u16))
    }

    pub fn first_output(&self, signal_idx: u8) -> SignalFirstOutput {
        SignalFirstOutput::new_with_raw_value(
            self.get_cv(cv::SIGNAL_FIRST_OUTPUT_BASE + signal_idx as u16),
        )
    }

    /// Classifier calibration: `(debounce_ms, [(lo, hi); NR_CLASSES_PER_CLASSIFIER])`.
    pub fn classifier_limits(
        &self,
        classifier_idx: u8,
    ) -> (u16, [(u8, u8); NR_CLASSES_PER_CLASSIFIER]) {
        let base = cv::CLASSIFIER_CAL_BASE + classifier_idx as u16 * CLASSIFIER_CAL_LENGTH;
        let debounce_10ms = self.get_cv(base) as u16 * 10;
        let mut limits = [(0u8, 0u8); NR_CLASSES_PER_CLASSIFIER];
        for (i, slot) in limits.iter_mut().enumerate() {
            let lo = self.get_cv(base + 1 + i as u16);
            let hi = self.get_cv(base + 1 + NR_CLASSES_PER_CLASSIFIER as u16 + i as u16);
            *slot = (lo, hi);
        }
        (debounce_10ms, limits)
    }

    pub fn classifier_type(&self, classifier_idx: u8) -> u8 {
        self.get_cv(cv::SIGNAL_INPUT_CLASSIFIER_TYPE_BASE + classifier_idx as u16) & 0x03
    }

    fn configure_pins(&mut self) {
        for idx in 0..NR_SIGNALS as u8 {
            let input = self.input(idx);
            if input.source() == InputSource::Adc {
                self.pins.set_input(input.pin().value());
            }
            let output = self.first_output(idx);
            if output.kind() == OutputKind::Onboard {
                let n = self.number_of_outputs(self.signal_id(idx));
                let pin = output.pin().value();
                for step in 0..n {
                    self.pins.set_output(pin.wrapping_add(step));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[derive(Default)]
    struct MemEeprom {
        data: Vec<u8>,
    }

    impl MemEeprom {
        fn new() -> Self {
            Self {
                data: vec![EEPROM_ERASE_VALUE; LAST_CV as usize],
            }
        }
    }

    impl Eeprom for MemEeprom {
        fn read_byte(&mut self, addr: u16) -> u8 {
            self.data[addr as usize]
        }
        fn write_byte(&mut self, addr: u16, value: u8) {
            self.data[addr as usize] = value;
        }
    }

    #[derive(Default)]
    struct NullPins;

    impl PinMode for NullPins {
        fn set_input(&mut self, _pin: u8) {}
        fn set_output(&mut self, _pin: u8) {}
    }

    #[test]
    fn fresh_eeprom_loads_defaults() {
        let mut store = Store::new(MemEeprom::new(), NullPins);
        assert_eq!(store.init(), Err(Error::CalibrationUninitialized));
        assert!(store.is_valid());
        assert_eq!(store.get_cv(cv::MANUFACTURER_VERSION_ID), 1);
    }

    #[test]
    fn set_defaults_then_read_all_round_trips() {
        let mut store = Store::new(MemEeprom::new(), NullPins);
        store.set_defaults();
        let mut store2 = Store::new(MemEeprom::new(), NullPins);
        store2.set_defaults();
        assert_eq!(store.get_cv(cv::CONFIGURATION), store2.get_cv(cv::CONFIGURATION));
    }

    #[test]
    fn set_cv_round_trips() {
        let mut store = Store::new(MemEeprom::new(), NullPins);
        let _ = store.init();
        store.set_cv(cv::DECODER_ADDRESS_LSB, 42);
        assert_eq!(store.get_cv(cv::DECODER_ADDRESS_LSB), 42);
    }

    #[test]
    fn built_in_signal_zero_resolves_red_by_default() {
        let mut store = Store::new(MemEeprom::new(), NullPins);
        let _ = store.init();
        let id = store.signal_id(0);
        assert_eq!(id, FIRST_BUILT_IN_SIGNAL_ID);
        let aspect = store.signal_aspect(id, 0);
        assert_eq!(aspect.num_outputs, 2);
        assert_eq!(aspect.aspect_mask, 0b1000_0000);
    }

    #[test]
    fn read_write_cv_bounds_checked() {
        let mut store = Store::new(MemEeprom::new(), NullPins);
        let _ = store.init();
        assert_eq!(store.write_cv(cv::DECODER_ADDRESS_LSB, 7), Ok(()));
        assert_eq!(store.read_cv(cv::DECODER_ADDRESS_LSB), Ok(7));
        assert_eq!(
            store.read_cv(LAST_CV + 10),
            Err(Error::OutOfRangeCv(LAST_CV + 10))
        );
        assert_eq!(
            store.write_cv(LAST_CV + 10, 1),
            Err(Error::OutOfRangeCv(LAST_CV + 10))
        );
    }
}

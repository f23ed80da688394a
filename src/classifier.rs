//! ADC-driven debounced command classifier.
//!
//! Grounded on `Src/Gen/Util/Classifier.h`'s `classifier<NrClasses>` (interval
//! lookup plus restart-on-change debounce) and `classifier_array` (per-signal
//! dispatch: invalid pins publish class 0 / an invalid index directly,
//! without consuming an ADC sample).

use crate::calibration::{InputSource, Store};
use crate::hal::{AdcRead, DigitalRead, Eeprom, PinMode};

/// Sentinel published while a sample sits inside its debounce window.
pub const INVALID_INDEX: u8 = u8::MAX;

/// One interval-classified, debounced input channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    debounce_ms: u16,
    limits: [(u8, u8); crate::calibration::NR_CLASSES_PER_CLASSIFIER],
    pending_index: u8,
    stable_index: u8,
    debounce_deadline_ms: u32,
    debouncing: bool,
}

impl Classifier {
    pub const fn new() -> Self {
        Self {
            debounce_ms: 0,
            limits: [(0, 0); crate::calibration::NR_CLASSES_PER_CLASSIFIER],
            pending_index: INVALID_INDEX,
            stable_index: INVALID_INDEX,
            debounce_deadline_ms: 0,
            debouncing: false,
        }
    }

    pub fn configure(&mut self, debounce_ms: u16, limits: [(u8, u8); crate::calibration::NR_CLASSES_PER_CLASSIFIER]) {
        self.debounce_ms = debounce_ms;
        self.limits = limits;
    }

    /// Map a raw 10-bit ADC sample onto a class index, or [`INVALID_INDEX`]
    /// if it falls in none of the configured intervals. Mirrors the
    /// original's reduction of the 10-bit sample to an 8-bit value by
    /// dividing by 4 before comparing against the byte-sized CV limits.
    pub fn class_index_for(&self, adc_sample: u16) -> u8 {
        let reduced = (adc_sample / 4) as u8;
        for (idx, &(lo, hi)) in self.limits.iter().enumerate() {
            if reduced >= lo && reduced <= hi {
                return idx as u8;
            }
        }
        INVALID_INDEX
    }

    /// Feed one new sample, restarting the debounce timer whenever the
    /// instantaneous class differs from what's currently pending. Returns
    /// [`INVALID_INDEX`] while a sample sits inside its debounce window --
    /// the previously-committed value is not exposed again until the timer
    /// actually elapses. `now_ms` is the dispatcher's free-running
    /// millisecond clock.
    pub fn classify_debounce(&mut self, adc_sample: u16, now_ms: u32) -> u8 {
        let instantaneous = self.class_index_for(adc_sample);
        if instantaneous != self.pending_index {
            self.pending_index = instantaneous;
            self.debounce_deadline_ms = now_ms.wrapping_add(self.debounce_ms as u32);
            self.debouncing = true;
        }
        if self.debouncing {
            if now_ms.wrapping_sub(self.debounce_deadline_ms) < u32::MAX / 2 {
                self.stable_index = self.pending_index;
                self.debouncing = false;
            } else {
                return INVALID_INDEX;
            }
        }
        self.stable_index
    }

    pub fn stable_index(&self) -> u8 {
        self.stable_index
    }
}

/// Fixed-size bank of [`Classifier`]s, one per configured signal input.
/// Grounded on `classifier_array<NrClassifiers, NrClasses>::run()`.
pub struct ClassifierArray<const N: usize> {
    classifiers: [Classifier; N],
    classified_values: [u8; N],
    adc_values: [u16; N],
}

impl<const N: usize> ClassifierArray<N> {
    pub const fn new() -> Self {
        Self {
            classifiers: [Classifier::new(); N],
            classified_values: [INVALID_INDEX; N],
            adc_values: [0; N],
        }
    }

    pub fn configure_from_calibration<E: Eeprom, P: PinMode>(&mut self, cal: &Store<E, P>) {
        for (idx, c) in self.classifiers.iter_mut().enumerate() {
            let (debounce_10ms, limits) = cal.classifier_limits(idx as u8);
            c.configure(debounce_10ms, limits);
        }
    }

    /// Sample every classifier whose owning signal has an ADC input source;
    /// signals wired to a non-ADC input publish an invalid pin result
    /// directly (class 0, index [`INVALID_INDEX`]) without touching the ADC.
    pub fn run<E: Eeprom, P: PinMode, A: AdcRead>(
        &mut self,
        cal: &Store<E, P>,
        adc: &mut A,
        now_ms: u32,
    ) {
        for idx in 0..N {
            let input = cal.input(idx as u8);
            if input.source() != InputSource::Adc {
                self.adc_values[idx] = 0;
                self.classified_values[idx] = INVALID_INDEX;
                continue;
            }
            let sample = adc.read(input.pin().value());
            self.adc_values[idx] = sample;
            self.classified_values[idx] = self.classifiers[idx].classify_debounce(sample, now_ms);
        }
    }

    pub fn classified_value(&self, idx: usize) -> u8 {
        self.classified_values[idx]
    }

    pub fn adc_value(&self, idx: usize) -> u16 {
        self.adc_values[idx]
    }
}

impl<const N: usize> Default for ClassifierArray<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a digital-input-sourced signal command directly, bypassing
/// classification entirely (digital inputs are already discrete).
pub fn digital_command<D: DigitalRead>(digital: &mut D, pin: u8) -> u8 {
    u8::from(digital.read(pin))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> [(u8, u8); crate::calibration::NR_CLASSES_PER_CLASSIFIER] {
        [(0, 50), (51, 100), (101, 150), (151, 200), (201, 255)]
    }

    #[test]
    fn class_index_for_picks_matching_interval() {
        let mut c = Classifier::new();
        c.configure(0, limits());
        assert_eq!(c.class_index_for(0), 0); // 0/4 = 0
        assert_eq!(c.class_index_for(204), 1); // 204/4 = 51
        assert_eq!(c.class_index_for(1023), 4); // 1023/4 = 255
    }

    #[test]
    fn out_of_range_sample_is_invalid() {
        let mut c = Classifier::new();
        c.configure(0, [(0, 10), (0, 0), (0, 0), (0, 0), (0, 0)]);
        assert_eq!(c.class_index_for(1000), INVALID_INDEX);
    }

    #[test]
    fn debounce_holds_stable_value_until_timer_elapses() {
        let mut c = Classifier::new();
        c.configure(50, limits());
        assert_eq!(c.classify_debounce(0, 0), INVALID_INDEX); // debounce window just started
        assert_eq!(c.classify_debounce(0, 50), 0); // window elapsed, settles at class 0
        // Jump straight to class 4; must not take effect before the debounce
        // window elapses.
        assert_eq!(c.classify_debounce(900, 100), INVALID_INDEX);
        assert_eq!(c.classify_debounce(900, 140), INVALID_INDEX);
        assert_eq!(c.classify_debounce(900, 150), 4);
    }

    #[test]
    fn debounce_restarts_on_further_change_within_window() {
        let mut c = Classifier::new();
        c.configure(50, limits());
        c.classify_debounce(0, 0); // class 0 pending, deadline 50
        c.classify_debounce(900, 10); // class 4 pending, deadline restarts to 60
        c.classify_debounce(420, 20); // class 2 pending, deadline restarts to 70
        assert_eq!(
            c.classify_debounce(420, 60),
            INVALID_INDEX,
            "debounce must restart, not fire at the old deadline"
        );
        assert_eq!(c.classify_debounce(420, 75), 2);
    }
}

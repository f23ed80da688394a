//! Signal aspect resolution: command -> per-output target ramp.
//!
//! Grounded on `Src/Prj/App/Signal/Signal.cpp`'s `Signal::exec()`: fetch the
//! current command, synthesize a safe-RED command the very first cycle if
//! none has ever arrived, look up the configured aspect, start a change-over
//! timer whenever the aspect actually changes, and drive one [`crate::ramp::Ramp`]
//! per output MSB-aligned from the aspect/blink bitmasks.

use crate::calibration::{InputSource, Store};
use crate::hal::{Eeprom, PinMode};
use crate::ramp::{Ramp, INTENSITY_0, INTENSITY_100};

pub const MAX_OUTPUTS: usize = 8;

/// Command fetched for one signal this cycle, already resolved from whatever
/// input source calibration names (DCC accessory command, classified ADC
/// value, or a raw digital read) -- resolving that is the caller's job so
/// this module stays free of concrete peripheral access.
#[derive(Debug, Clone, Copy)]
pub enum Command {
    /// No command has ever arrived for this signal (e.g. no DCC packet seen
    /// yet since power-up).
    None,
    Value(u8),
}

/// Per-signal resolver state, one instance per configured signal slot.
#[derive(Clone, Copy)]
pub struct Signal {
    ramps: [Ramp; MAX_OUTPUTS],
    last_cmd: Option<u8>,
    last_aspect: u8,
    last_change_over_time_10ms: u8,
    change_over_deadline_ms: Option<u32>,
}

impl Signal {
    pub const fn new() -> Self {
        Self {
            ramps: [Ramp::new(); MAX_OUTPUTS],
            last_cmd: None,
            last_aspect: 0,
            last_change_over_time_10ms: 0,
            change_over_deadline_ms: None,
        }
    }

    pub fn ramp(&self, output_idx: usize) -> &Ramp {
        &self.ramps[output_idx]
    }

    /// Resolve this cycle's command and aspect and step every output ramp's
    /// target accordingly. `now_ms` is the dispatcher's free-running
    /// millisecond clock; `cycle_period_ms` is the caller's dispatch period
    /// (10ms in the original).
    pub fn exec<E: Eeprom, P: PinMode>(
        &mut self,
        cal: &Store<E, P>,
        signal_id: u8,
        cmd: Command,
        now_ms: u32,
    ) {
        let is_initial_state = self.last_cmd.is_none();

        // Synthesize a safe aspect (command 0, conventionally red) only on
        // the very first cycle with no real command yet -- once a real
        // command has arrived, a transient loss of it must not force red.
        let cmd_value = match cmd {
            Command::Value(v) => {
                self.last_cmd = Some(v);
                v
            }
            Command::None if is_initial_state => 0,
            Command::None => self.last_cmd.unwrap_or(0),
        };

        let aspect = cal.signal_aspect(signal_id, cmd_value);
        let mut change_over_time_10ms = aspect.change_over_time_10ms;
        if change_over_time_10ms == 0 {
            change_over_time_10ms = 1;
        }

        let aspect_changed = aspect.aspect_mask != self.last_aspect;
        if aspect_changed && !is_initial_state {
            self.change_over_deadline_ms =
                Some(now_ms.wrapping_add(change_over_time_10ms as u32 * 10));
        }

        let slope_changed = change_over_time_10ms != self.last_change_over_time_10ms;
        let in_change_over = self
            .change_over_deadline_ms
            .map(|deadline| now_ms.wrapping_sub(deadline) >= u32::MAX / 2)
            .unwrap_or(false);

        for idx in 0..(aspect.num_outputs as usize).min(MAX_OUTPUTS) {
            let bit = 0x80u8 >> idx;
            let target = if in_change_over {
                INTENSITY_0
            } else if aspect.aspect_mask & bit != 0 {
                INTENSITY_100
            } else {
                INTENSITY_0
            };

            if slope_changed {
                let slope = intensity_slope_per_ms(change_over_time_10ms);
                self.ramps[idx].init_from_slope(target, slope, 10);
            } else {
                self.ramps[idx].set_target(target);
            }
        }

        self.last_aspect = aspect.aspect_mask;
        self.last_change_over_time_10ms = change_over_time_10ms;
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

/// Units-per-ms slope that sweeps the full 0..=INTENSITY_100 range in
/// exactly `change_over_time_10ms` hundredths of a second.
fn intensity_slope_per_ms(change_over_time_10ms: u8) -> u16 {
    let total_ms = change_over_time_10ms as u32 * 10;
    (INTENSITY_100 as u32 / total_ms.max(1)).min(u16::MAX as u32) as u16
}

/// Resolve which command a signal should see this cycle, given calibration's
/// chosen input source. `dcc_command` is the last accessory command decoded
/// for this signal's address (via the packet pipeline elsewhere), `adc_class`
/// the classifier array's stable index, `digital` a raw digital level.
pub fn resolve_command<E: Eeprom, P: PinMode>(
    cal: &Store<E, P>,
    signal_idx: u8,
    dcc_command: Option<u8>,
    adc_class: u8,
    digital: Option<bool>,
) -> Command {
    match cal.input(signal_idx).source() {
        InputSource::Dcc => match dcc_command {
            Some(v) => Command::Value(v),
            None => Command::None,
        },
        InputSource::Adc => {
            if adc_class == crate::classifier::INVALID_INDEX {
                Command::None
            } else {
                Command::Value(adc_class)
            }
        }
        InputSource::Digital => match digital {
            Some(level) => Command::Value(u8::from(level)),
            None => Command::None,
        },
        InputSource::Reserved => Command::None,
    }
}

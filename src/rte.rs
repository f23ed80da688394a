//! Runtime Environment: single-writer/many-reader ports decoupling the
//! decode pipeline, classifier, signal resolver and router from each other.
//!
//! Grounded on the teacher's `src/embassy.rs` singleton pattern: port storage
//! sits behind `embassy_sync::blocking_mutex::Mutex<CriticalSectionRawMutex,
//! RefCell<T>>` the same way `TimerDriver` guards its `alarms`/`queue` state,
//! and a startup-derived value (the decoder address) is registered once into
//! a `once_cell::sync::OnceCell` the same way `ALARM_TIM`/`TIMEKEEPER_TIM`
//! are. Unlike the original's virtual `Rte_Read_*`/`Rte_Write_*` call
//! surface (one function per signal), every port here is generic so a single
//! type serves all components.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use once_cell::sync::OnceCell;
use portable_atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// A single-writer/many-reader value port: exactly one component writes it
/// per cycle, any number of components may read the last-written value.
pub struct ValuePort<T: Copy> {
    cell: Mutex<CriticalSectionRawMutex, RefCell<T>>,
}

impl<T: Copy> ValuePort<T> {
    pub const fn new(initial: T) -> Self {
        Self {
            cell: Mutex::new(RefCell::new(initial)),
        }
    }

    pub fn write(&self, value: T) {
        self.cell.lock(|cell| *cell.borrow_mut() = value);
    }

    pub fn read(&self) -> T {
        self.cell.lock(|cell| *cell.borrow())
    }
}

/// A single-writer/many-reader indexed-array port, e.g. one classified value
/// per signal input.
pub struct ArrayPort<T: Copy, const N: usize> {
    cell: Mutex<CriticalSectionRawMutex, RefCell<[T; N]>>,
}

impl<T: Copy, const N: usize> ArrayPort<T, N> {
    pub const fn new(initial: [T; N]) -> Self {
        Self {
            cell: Mutex::new(RefCell::new(initial)),
        }
    }

    pub fn write(&self, index: usize, value: T) {
        self.cell.lock(|cell| cell.borrow_mut()[index] = value);
    }

    pub fn read(&self, index: usize) -> T {
        self.cell.lock(|cell| cell.borrow()[index])
    }

    pub fn write_all(&self, values: [T; N]) {
        self.cell.lock(|cell| *cell.borrow_mut() = values);
    }

    pub fn snapshot(&self) -> [T; N] {
        self.cell.lock(|cell| *cell.borrow())
    }

    /// Bounds-checked write for callers that take an index from outside the
    /// crate (e.g. a CV-driven signal index) instead of a compile-time-fixed
    /// loop counter.
    pub fn try_write(&self, index: usize, value: T) -> Result<()> {
        if index >= N {
            return Err(Error::OutOfRangePort(index as u16));
        }
        self.write(index, value);
        Ok(())
    }

    pub fn try_read(&self, index: usize) -> Result<T> {
        if index >= N {
            return Err(Error::OutOfRangePort(index as u16));
        }
        Ok(self.read(index))
    }
}

/// Sticky error flag raised by the ISR/edge path and cleared by the
/// dispatcher once observed, matching `DccDecoder.cpp::cycle()`'s
/// `isrOverflow`/`fifoOverflow` reporting. A plain atomic is enough here --
/// unlike the value/array ports there is no multi-step read-modify-write
/// that needs a critical section, just a single bit.
pub struct StickyFlag {
    flag: AtomicBool,
}

impl StickyFlag {
    pub const fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Read and clear in one step, so an observer never misses a flag raised
    /// between its read and its clear.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}

impl Default for StickyFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoder address resolved from calibration at startup, registered once so
/// interrupt-adjacent filter rebuilding doesn't need a reference to the
/// whole calibration store. Set via [`register_decoder_address`]; reads
/// before registration fall back to `None`.
static DECODER_ADDRESS: OnceCell<u16> = OnceCell::new();

/// Register the decoder address once at startup (or whenever calibration's
/// address CVs change and the cache needs refreshing). Silently ignores a
/// second call with a different value -- callers that need to change the
/// address at runtime go through a fresh `OnceCell` of their own rather than
/// fight this one.
pub fn register_decoder_address(addr: u16) {
    let _ = DECODER_ADDRESS.set(addr);
}

pub fn decoder_address() -> Option<u16> {
    DECODER_ADDRESS.get().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_port_round_trips() {
        let port: ValuePort<u16> = ValuePort::new(0);
        port.write(42);
        assert_eq!(port.read(), 42);
    }

    #[test]
    fn array_port_indexes_independently() {
        let port: ArrayPort<u8, 4> = ArrayPort::new([0; 4]);
        port.write(2, 9);
        assert_eq!(port.read(2), 9);
        assert_eq!(port.read(0), 0);
        assert_eq!(port.snapshot(), [0, 0, 9, 0]);
    }

    #[test]
    fn array_port_try_accessors_bounds_check() {
        let port: ArrayPort<u8, 4> = ArrayPort::new([0; 4]);
        assert_eq!(port.try_write(2, 9), Ok(()));
        assert_eq!(port.try_read(2), Ok(9));
        assert_eq!(port.try_write(4, 1), Err(Error::OutOfRangePort(4)));
        assert_eq!(port.try_read(10), Err(Error::OutOfRangePort(10)));
    }

    #[test]
    fn sticky_flag_clears_on_take() {
        let flag = StickyFlag::new();
        assert!(!flag.take());
        flag.raise();
        assert!(flag.take());
        assert!(!flag.take());
    }
}

//! Crate-wide error taxonomy.

/// Errors surfaced across the decode/calibration/signal pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The edge-time queue between the ISR and the main loop is full; the
    /// new sample was dropped. Returned by [`crate::edge::EdgeProducer::on_edge`].
    #[error("edge-time queue overflow")]
    IsrOverflow,
    /// The decoded-packet FIFO is full; the new packet was dropped. Returned
    /// by [`crate::fifo::PacketFifo::push`].
    #[error("packet fifo overflow")]
    FifoOverflow,
    /// A CV index outside the calibration image was accessed. Returned by
    /// [`crate::calibration::Store::read_cv`]/`write_cv`.
    #[error("cv index {0} out of range")]
    OutOfRangeCv(u16),
    /// An RTE port index was out of range for its backing array. Returned by
    /// [`crate::rte::ArrayPort::try_read`]/`try_write`.
    #[error("port index {0} out of range")]
    OutOfRangePort(u16),
    /// The calibration image had never been written (manufacturer-ID marker
    /// still at the EEPROM erase value); defaults were loaded and persisted.
    /// Returned by [`crate::calibration::Store::init`].
    #[error("calibration uninitialized, defaults restored")]
    CalibrationUninitialized,
}

pub type Result<T> = core::result::Result<T, Error>;

use embedded_hal::can::ErrorKind;

use crate::{buffer::RxSlot, regs::ControllerMode};

pub type Result<T, SPIE, CSE> = core::result::Result<T, Error<SPIE, CSE>>;

/// Errors returned by the driver.
///
/// `SPIE` is the error type of the SPI bus and `CSE` the error type of the
/// chip-select pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<SPIE, CSE> {
    /// The SPI transfer failed.
    Spi(SPIE),
    /// Driving the chip-select pin failed.
    ChipSelect(CSE),
    /// The chip never reported the requested operating mode.
    ModeTransitionTimeout {
        requested: ControllerMode,
    },
    /// No bit timing is known for the oscillator/bitrate pair.
    UnsupportedBitrate(UnsupportedBitrate),
    /// A caller supplied frame is not valid. Nothing was written to the chip.
    InvalidFrame(FrameError),
    /// All transmit slots are pending transmission.
    BufferFull,
    /// A received frame was malformed and has been discarded.
    Framing {
        slot: RxSlot,
        error: FramingError,
    },
    /// A sequential register access longer than one buffer
    /// ([`MAX_SEQUENCE_LEN`](crate::spi::MAX_SEQUENCE_LEN) bytes). Nothing was
    /// transferred.
    SequenceTooLong(usize),
    /// The operation is only valid in another operating mode.
    WrongMode {
        required: ControllerMode,
        current: ControllerMode,
    },
}

impl<SPIE, CSE> Error<SPIE, CSE> {
    /// Whether the error originates from the SPI bus or the chip-select pin.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Spi(_) | Error::ChipSelect(_))
    }
}

impl<SPIE, CSE> From<FrameError> for Error<SPIE, CSE> {
    fn from(e: FrameError) -> Self {
        Error::InvalidFrame(e)
    }
}

impl<SPIE, CSE> From<UnsupportedBitrate> for Error<SPIE, CSE> {
    fn from(e: UnsupportedBitrate) -> Self {
        Error::UnsupportedBitrate(e)
    }
}

impl<SPIE, CSE> embedded_hal::can::Error for Error<SPIE, CSE>
where
    SPIE: core::fmt::Debug,
    CSE: core::fmt::Debug,
{
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Framing { .. } => ErrorKind::Form,
            _ => ErrorKind::Other,
        }
    }
}

/// Reasons a frame is rejected before it reaches the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum FrameError {
    /// More than 8 data bytes.
    DataTooLong(usize),
    /// Identifier does not fit in 11 bits.
    StandardIdOutOfRange(u32),
    /// Identifier does not fit in 29 bits.
    ExtendedIdOutOfRange(u32),
}

/// Reasons a receive buffer cannot be turned into a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum FramingError {
    /// The DLC nibble reported by the chip is above 8.
    DlcOutOfRange(u8),
}

/// The oscillator/bitrate pair has no entry in the bit timing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct UnsupportedBitrate {
    pub oscillator_hz: u32,
    pub bitrate: u32,
}

/// Step of [`CanController::initialize`](crate::CanController::initialize)
/// that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum InitStage {
    BitTiming,
    Reset,
    ConfigurationMode,
    Buffers,
    Filters,
    NormalMode,
}

/// Error returned by [`CanController::initialize`](crate::CanController::initialize).
///
/// The chip is left in whatever state the last successful step put it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitError<SPIE, CSE> {
    pub stage: InitStage,
    pub source: Error<SPIE, CSE>,
}

impl<SPIE, CSE> InitError<SPIE, CSE> {
    pub(crate) fn at(stage: InitStage) -> impl FnOnce(Error<SPIE, CSE>) -> Self {
        move |source| Self { stage, source }
    }
}

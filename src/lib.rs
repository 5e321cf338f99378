#![cfg_attr(not(test), no_std)]

//! # Polled driver core for MCP2515 CAN controllers
//!
//! [`CanController`] owns the SPI link to one MCP2515 and offers three
//! operations: [`initialize`](CanController::initialize),
//! [`send`](CanController::send) and
//! [`poll_receive`](CanController::poll_receive). No interrupt line is needed;
//! the buffer status is polled over SPI and neither `send` nor `poll_receive`
//! ever wait for the bus.
//!
//! ```ignore
//! let mut can = Mcp2515::new(spi, cs, Settings::default());
//! can.initialize(&mut delay, 250_000)?;
//!
//! can.send(&CanFrame::try_new(0x18FEF100, true, &[0x01, 0x02])?)?;
//! if let Some(frame) = can.poll_receive()? {
//!     // ...
//! }
//! ```
//!
//! The controller is not reentrant. When shared between tasks, wrap the
//! whole controller in a single mutex.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod filter;
pub mod frame;
pub(crate) mod macros;
pub mod mode;
pub mod regs;
pub mod spi;
pub mod stat;
pub mod timing;

#[cfg(test)]
pub(crate) mod mocks;
#[cfg(test)]
mod tests;

use core::fmt::Debug;

use embedded_hal::{
    blocking::{delay::DelayMs, spi::Transfer},
    can::{ExtendedId, Id, StandardId},
    digital::v2::OutputPin,
};
use log::{debug, trace, warn};

pub use crate::{
    error::{Error, InitError, InitStage, Result},
    frame::CanFrame,
    regs::ControllerMode,
    spi::{RegisterAccess, SpiRegisters},
    timing::{CanSpeed, McpSpeed, TimingConfig},
};
use crate::{
    buffer::{BufferArbiter, TxSlot},
    filter::{RxFilter, RxMask},
    mode::ModeController,
    regs::{
        CanCtrl, CanInte, CanIntf, ErrorFlags, RecvBufOpMode, Register, Rxb0Ctrl, Rxb1Ctrl,
        TxbCtrl,
    },
    spi::MAX_SEQUENCE_LEN,
};

/// Settings used to initialize the MCP2515.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct Settings {
    /// Device oscillator speed. Should match the clock speed of the oscillator
    /// attached to the MCP2515.
    pub oscillator: McpSpeed,
    /// Whether to enable the CLKOUT pin.
    pub clkout_en: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            oscillator: McpSpeed::MHz8,
            clkout_en: false,
        }
    }
}

/// Controller on an `embedded-hal` SPI bus.
pub type Mcp2515<SPI, CS> = CanController<SpiRegisters<SPI, CS>>;

/// MCP2515 driver.
pub struct CanController<R> {
    regs: R,
    mode: ModeController,
    settings: Settings,
}

impl<SPI, CS, SPIE, CSE> CanController<SpiRegisters<SPI, CS>>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    SPIE: Debug,
    CSE: Debug,
{
    /// Creates a new driver. The chip is not touched until
    /// [`initialize`](Self::initialize) is called.
    ///
    /// See [`SpiRegisters::new`] for the required SPI configuration.
    pub fn new(spi: SPI, cs: CS, settings: Settings) -> Self {
        Self::with_access(SpiRegisters::new(spi, cs), settings)
    }
}

impl<R: RegisterAccess> CanController<R> {
    /// Creates a driver on top of any register transport.
    pub fn with_access(regs: R, settings: Settings) -> Self {
        Self {
            regs,
            mode: ModeController::new(),
            settings,
        }
    }

    /// Releases the register transport.
    pub fn into_inner(self) -> R {
        self.regs
    }

    /// Settings the controller was created with.
    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Last operating mode confirmed by the chip.
    pub fn mode(&self) -> ControllerMode {
        self.mode.current()
    }

    /// Initializes the MCP2515 for `bitrate` bits/s and enters normal mode.
    /// This should be called once at the start of the program, and may be
    /// called again to start over after a failure.
    ///
    /// All acceptance filters and masks are cleared so that every standard
    /// and extended frame is received.
    ///
    /// # Parameters
    ///
    /// * `delay` - Delay interface from downstream HAL.
    /// * `bitrate` - Nominal bus bitrate, e.g. `250_000`.
    pub fn initialize(
        &mut self,
        delay: &mut impl DelayMs<u8>,
        bitrate: u32,
    ) -> core::result::Result<(), InitError<R::SpiError, R::PinError>> {
        let result = self.try_initialize(delay, bitrate);
        match &result {
            Ok(()) => debug!("Initialized at {} bit/s", bitrate),
            Err(e) => warn!("Initialization failed during {:?}: {:?}", e.stage, e.source),
        }
        result
    }

    fn try_initialize(
        &mut self,
        delay: &mut impl DelayMs<u8>,
        bitrate: u32,
    ) -> core::result::Result<(), InitError<R::SpiError, R::PinError>> {
        // Fail before the chip is touched if the bitrate is unknown.
        let timing = TimingConfig::compute(self.settings.oscillator.hz(), bitrate)
            .map_err(|e| InitError {
                stage: InitStage::BitTiming,
                source: e.into(),
            })?
            .with_clkout(self.settings.clkout_en);

        self.reset(delay).map_err(InitError::at(InitStage::Reset))?;
        self.mode
            .request(&mut self.regs, delay, ControllerMode::Configuration)
            .map_err(InitError::at(InitStage::ConfigurationMode))?;
        self.configure_timing(timing)
            .map_err(InitError::at(InitStage::BitTiming))?;
        self.configure_buffers()
            .map_err(InitError::at(InitStage::Buffers))?;
        self.clear_filters()
            .map_err(InitError::at(InitStage::Filters))?;
        self.mode
            .request(&mut self.regs, delay, ControllerMode::Normal)
            .map_err(InitError::at(InitStage::NormalMode))
    }

    fn configure_timing(&mut self, timing: TimingConfig) -> Result<(), R::SpiError, R::PinError> {
        timing.apply(&mut self.regs)?;
        self.regs.modify_reg(
            CanCtrl::new().with_clken(self.settings.clkout_en),
            CanCtrl::MASK_CLKEN,
        )
    }

    fn configure_buffers(&mut self) -> Result<(), R::SpiError, R::PinError> {
        // Clear Tx buffers (TXBnCTRL and the 13 registers following it)
        let zeros = [0u8; MAX_SEQUENCE_LEN];
        for slot in TxSlot::ALL {
            self.regs.write_sequence(slot.ctrl(), &zeros)?;
        }

        // Filters on, RXB0 rolls over into RXB1 when full.
        self.regs.modify_reg(
            Rxb0Ctrl::new()
                .with_rxm(RecvBufOpMode::FilterOn)
                .with_bukt(true),
            Rxb0Ctrl::MASK_RXM | Rxb0Ctrl::MASK_BUKT,
        )?;
        self.regs.modify_reg(
            Rxb1Ctrl::new().with_rxm(RecvBufOpMode::FilterOn),
            Rxb1Ctrl::MASK_RXM,
        )?;

        // Drop stale flags, then raise flags (and INT) for received frames and errors.
        self.regs.write_reg(CanIntf::new())?;
        self.regs.write_reg(
            CanInte::new()
                .with_rx0ie(true)
                .with_rx1ie(true)
                .with_errie(true)
                .with_merre(true),
        )
    }

    fn clear_filters(&mut self) -> Result<(), R::SpiError, R::PinError> {
        // A filter matches either standard or extended frames. Alternate them so
        // that both buffers accept both kinds.
        for filter in RxFilter::ALL {
            let id = if filter.index() % 2 == 0 {
                Id::Standard(StandardId::ZERO)
            } else {
                Id::Extended(ExtendedId::ZERO)
            };
            self.regs
                .write_sequence(filter.sidh(), &RxFilter::bytes(id))?;
        }

        for mask in RxMask::ALL {
            self.regs
                .write_sequence(mask.sidh(), &RxMask::bytes(Id::Extended(ExtendedId::ZERO)))?;
        }
        Ok(())
    }

    /// Resets the MCP2515. It comes back up in configuration mode.
    pub fn reset(&mut self, delay: &mut impl DelayMs<u8>) -> Result<(), R::SpiError, R::PinError> {
        self.regs.reset(delay)?;
        self.mode.reset();
        Ok(())
    }

    /// Set the operation mode of the device, waking it if necessary.
    pub fn set_mode(
        &mut self,
        delay: &mut impl DelayMs<u8>,
        mode: ControllerMode,
    ) -> Result<(), R::SpiError, R::PinError> {
        self.mode.request(&mut self.regs, delay, mode)
    }

    /// Sets a receive filter. Only possible in configuration mode.
    ///
    /// # Parameters
    ///
    /// * `filter` - The filter to action on.
    /// * `id` - The actual ID filter to apply to `filter`.
    pub fn set_filter(&mut self, filter: RxFilter, id: Id) -> Result<(), R::SpiError, R::PinError> {
        self.require_mode(ControllerMode::Configuration)?;
        self.regs.write_sequence(filter.sidh(), &RxFilter::bytes(id))
    }

    /// Sets a receive mask. Only possible in configuration mode.
    ///
    /// # Parameters
    ///
    /// * `mask` - The mask to action on.
    /// * `id` - The actual ID mask to apply to `mask`.
    pub fn set_mask(&mut self, mask: RxMask, id: Id) -> Result<(), R::SpiError, R::PinError> {
        self.require_mode(ControllerMode::Configuration)?;
        self.regs.write_sequence(mask.sidh(), &RxMask::bytes(id))
    }

    fn require_mode(&self, required: ControllerMode) -> Result<(), R::SpiError, R::PinError> {
        let current = self.mode.current();
        if current == required {
            Ok(())
        } else {
            Err(Error::WrongMode { required, current })
        }
    }

    /// Queues `frame` in a free transmit slot and requests its transmission.
    ///
    /// Returns as soon as transmission is requested, without waiting for the
    /// frame to go out on the bus. Fails with [`Error::BufferFull`] when all
    /// three slots are pending; nothing is queued in that case.
    pub fn send(&mut self, frame: &CanFrame) -> Result<(), R::SpiError, R::PinError> {
        let encoded = codec::encode(frame)?;

        let mut arbiter = BufferArbiter::new(&mut self.regs);
        let slot = match arbiter.acquire_tx_slot()? {
            Some(slot) => slot,
            None => {
                trace!("All transmit slots busy");
                return Err(Error::BufferFull);
            }
        };
        arbiter.load_tx_slot(slot, &encoded)?;
        arbiter.request_transmit(slot)?;
        trace!("Queued {:?} in {:?}", frame, slot);
        Ok(())
    }

    /// Takes a received frame from the chip, if there is one.
    ///
    /// Never waits: `Ok(None)` means both receive slots are empty. A frame the
    /// chip reports with an invalid layout is dropped, its slot freed, and
    /// [`Error::Framing`] returned.
    pub fn poll_receive(&mut self) -> Result<Option<CanFrame>, R::SpiError, R::PinError> {
        let mut arbiter = BufferArbiter::new(&mut self.regs);
        let slot = match arbiter.pending_rx_slot()? {
            Some(slot) => slot,
            None => return Ok(None),
        };

        // Read data and clear Rx interrupt flag
        let layout = arbiter.read_rx_slot(slot)?;
        arbiter.release_rx_slot(slot)?;

        match codec::decode(&layout) {
            Ok(frame) => {
                trace!("Received {:?} from {:?}", frame, slot);
                Ok(Some(frame))
            }
            Err(error) => {
                warn!("Discarding frame in {:?}: {:?}", slot, error);
                Err(Error::Framing { slot, error })
            }
        }
    }

    /// Whether either receive slot holds a frame.
    pub fn rx_pending(&mut self) -> Result<bool, R::SpiError, R::PinError> {
        Ok(self.regs.read_status()?.pending_rx_slot().is_some())
    }

    /// Control register of a transmit slot, to check whether its last
    /// transmission was aborted, lost arbitration or hit a bus error.
    pub fn tx_status(&mut self, slot: TxSlot) -> Result<TxbCtrl, R::SpiError, R::PinError> {
        BufferArbiter::new(&mut self.regs).tx_status(slot)
    }

    /// Reads the error flag register.
    pub fn error_flags(&mut self) -> Result<ErrorFlags, R::SpiError, R::PinError> {
        let eflg = self.regs.read(Register::EFLG)?;
        Ok(ErrorFlags::from_bits_truncate(eflg))
    }
}

impl<R: RegisterAccess> embedded_hal::can::nb::Can for CanController<R> {
    type Frame = CanFrame;
    type Error = Error<R::SpiError, R::PinError>;

    /// Never replaces a pending frame. Returns [`nb::Error::WouldBlock`] at
    /// once while all slots are busy.
    fn transmit(&mut self, frame: &Self::Frame) -> nb::Result<Option<Self::Frame>, Self::Error> {
        match self.send(frame) {
            Ok(()) => Ok(None),
            Err(Error::BufferFull) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(e)),
        }
    }

    fn receive(&mut self) -> nb::Result<Self::Frame, Self::Error> {
        self.poll_receive()?.ok_or(nb::Error::WouldBlock)
    }
}

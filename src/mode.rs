//! Operating mode state machine.

use embedded_hal::blocking::delay::DelayMs;
use log::{debug, warn};

use crate::{
    error::{Error, Result},
    regs::{CanCtrl, CanInte, CanIntf, CanStat, ControllerMode},
    spi::RegisterAccess,
};

/// Time between two reads of CANSTAT while waiting for a mode change.
pub const MODE_POLL_INTERVAL_MS: u8 = 10;
/// Number of CANSTAT reads before a mode change is given up.
pub const MODE_POLL_ATTEMPTS: u8 = 10;

/// Tracks and changes the operating mode of the chip.
///
/// The mode is only updated once the chip has confirmed it in CANSTAT.
#[derive(Debug)]
pub struct ModeController {
    current: ControllerMode,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeController {
    /// The chip starts in configuration mode after power-up or reset.
    pub const fn new() -> Self {
        Self {
            current: ControllerMode::Configuration,
        }
    }

    /// Last mode confirmed by the chip.
    #[inline]
    pub fn current(&self) -> ControllerMode {
        self.current
    }

    /// Must be called after the chip has been reset.
    pub(crate) fn reset(&mut self) {
        self.current = ControllerMode::Configuration;
    }

    /// Requests `mode` and waits for the chip to confirm it.
    ///
    /// The device is woken first if it is asleep.
    pub fn request<R: RegisterAccess>(
        &mut self,
        regs: &mut R,
        delay: &mut impl DelayMs<u8>,
        mode: ControllerMode,
    ) -> Result<(), R::SpiError, R::PinError> {
        if self.current == ControllerMode::Sleep && mode != ControllerMode::Sleep {
            self.wake(regs, delay)?;
        }
        self.request_no_wake(regs, delay, mode)
    }

    /// Wakes the device: a wake-up interrupt moves it into listen only mode.
    fn wake<R: RegisterAccess>(
        &mut self,
        regs: &mut R,
        delay: &mut impl DelayMs<u8>,
    ) -> Result<(), R::SpiError, R::PinError> {
        // Ensure wake interrupt is enabled
        let caninte: CanInte = regs.read_reg()?;
        let int_enabled = caninte.wakie();
        if !int_enabled {
            let data = CanInte::new().with_wakie(true);
            regs.modify_reg(data, CanInte::MASK_WAKIE)?;
        }

        let data = CanIntf::new().with_wakif(true);
        regs.modify_reg(data, CanIntf::MASK_WAKIF)?;
        self.request_no_wake(regs, delay, ControllerMode::ListenOnly)?;

        // Disable the interrupt if it was originally disabled
        if !int_enabled {
            regs.modify_reg(CanInte::new().with_wakie(false), CanInte::MASK_WAKIE)?;
        }
        regs.modify_reg(CanIntf::new().with_wakif(false), CanIntf::MASK_WAKIF)
    }

    fn request_no_wake<R: RegisterAccess>(
        &mut self,
        regs: &mut R,
        delay: &mut impl DelayMs<u8>,
        mode: ControllerMode,
    ) -> Result<(), R::SpiError, R::PinError> {
        regs.modify_reg(CanCtrl::new().with_reqop(mode), CanCtrl::MASK_REQOP)?;

        let confirmed = poll(delay, || -> Result<bool, R::SpiError, R::PinError> {
            let canstat: CanStat = regs.read_reg()?;
            Ok(matches!(canstat.opmod_or_err(), Ok(opmod) if opmod == mode))
        })?;

        if confirmed {
            debug!("Mode changed from {:?} to {:?}", self.current, mode);
            self.current = mode;
            Ok(())
        } else {
            warn!("Device did not enter {:?} within {} attempts", mode, MODE_POLL_ATTEMPTS);
            Err(Error::ModeTransitionTimeout { requested: mode })
        }
    }
}

/// Calls `probe` up to [`MODE_POLL_ATTEMPTS`] times, waiting
/// [`MODE_POLL_INTERVAL_MS`] after every negative answer.
///
/// Returns whether `probe` answered `true`.
fn poll<D, E>(
    delay: &mut D,
    mut probe: impl FnMut() -> core::result::Result<bool, E>,
) -> core::result::Result<bool, E>
where
    D: DelayMs<u8>,
{
    for _ in 0..MODE_POLL_ATTEMPTS {
        if probe()? {
            return Ok(true);
        }
        delay.delay_ms(MODE_POLL_INTERVAL_MS);
    }
    Ok(false)
}

//! Register level access to the MCP2515 over SPI.

use core::fmt::Debug;

use embedded_hal::{
    blocking::{delay::DelayMs, spi::Transfer},
    digital::v2::OutputPin,
};
use log::trace;

use crate::{
    error::{Error, Result},
    regs::{BitModifiable, Reg, Register},
    stat::Status,
};

/// Time the chip needs after a `RESET` instruction before it accepts
/// commands again.
pub const RESET_SETTLE_MS: u8 = 10;

/// Longest sequential access: a full transmit buffer including its control
/// register (CTRL, SIDH, SIDL, EID8, EID0, DLC, 8 data bytes).
pub const MAX_SEQUENCE_LEN: usize = 14;

const HEADER_LEN: usize = 2;

#[repr(u8)]
enum Instruction {
    Write = 0x02,
    Read = 0x03,
    Bitmod = 0x05,
    ReadStatus = 0xA0,
    Reset = 0xC0,
}

/// Primitive register operations of the MCP2515.
///
/// Every method is a single chip-select window on the bus. Nothing is retried.
pub trait RegisterAccess {
    type SpiError: Debug;
    type PinError: Debug;

    /// Reads a single register.
    fn read(&mut self, reg: Register) -> Result<u8, Self::SpiError, Self::PinError>;

    /// Writes a single register.
    fn write(&mut self, reg: Register, value: u8) -> Result<(), Self::SpiError, Self::PinError>;

    /// Changes the bits of `reg` selected by `mask` to the bits of `value`.
    fn bit_modify(
        &mut self,
        reg: Register,
        mask: u8,
        value: u8,
    ) -> Result<(), Self::SpiError, Self::PinError>;

    /// Reads `out.len()` sequential registers starting at `start`.
    ///
    /// At most [`MAX_SEQUENCE_LEN`] registers; longer requests fail with
    /// [`Error::SequenceTooLong`].
    fn read_sequence(
        &mut self,
        start: Register,
        out: &mut [u8],
    ) -> Result<(), Self::SpiError, Self::PinError>;

    /// Writes `data` to sequential registers starting at `start`.
    ///
    /// At most [`MAX_SEQUENCE_LEN`] registers; longer requests fail with
    /// [`Error::SequenceTooLong`].
    fn write_sequence(
        &mut self,
        start: Register,
        data: &[u8],
    ) -> Result<(), Self::SpiError, Self::PinError>;

    /// Reads the buffer status byte via the `READ STATUS` instruction.
    fn read_status(&mut self) -> Result<Status, Self::SpiError, Self::PinError>;

    /// Resets the chip and waits for its registers to return to their
    /// defaults.
    fn reset(&mut self, delay: &mut impl DelayMs<u8>)
        -> Result<(), Self::SpiError, Self::PinError>;

    /// Read a register via a register object.
    #[inline]
    fn read_reg<R: Reg>(&mut self) -> Result<R, Self::SpiError, Self::PinError> {
        self.read(R::ADDRESS).map(R::from_byte)
    }

    /// Write to a register using a register object.
    #[inline]
    fn write_reg<R: Reg>(&mut self, reg: R) -> Result<(), Self::SpiError, Self::PinError> {
        self.write(R::ADDRESS, reg.into_byte())
    }

    /// Modifies a register.
    ///
    /// * `reg` - New register content.
    /// * `mask` - Mask register. The bits must be 1 in the positions you want
    ///   to modify.
    #[inline]
    fn modify_reg<R: BitModifiable>(
        &mut self,
        reg: R,
        mask: R,
    ) -> Result<(), Self::SpiError, Self::PinError> {
        self.bit_modify(R::ADDRESS, mask.into_byte(), reg.into_byte())
    }
}

/// [`RegisterAccess`] over an `embedded-hal` SPI bus and chip-select pin.
pub struct SpiRegisters<SPI, CS> {
    /// SPI interface to interact with the MCP2515.
    spi: SPI,
    /// Chip select pin to select the MCP2515.
    cs: CS,
}

impl<SPI, CS, SPIE, CSE> SpiRegisters<SPI, CS>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    SPIE: Debug,
    CSE: Debug,
{
    /// Wraps the bus. The SPI interface must be configured by the caller:
    ///
    /// * **Data Order**: MSB first.
    /// * **Mode**: Mode 0 (or 3).
    /// * **Clock**: at most 10 MHz.
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    /// Releases the SPI interface and chip-select pin.
    pub fn free(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    /// Sends `bytes` in one chip-select window, copying what the chip clocked
    /// out after the first `skip` bytes into `rx`.
    fn transfer(&mut self, bytes: &mut [u8], skip: usize, rx: &mut [u8]) -> Result<(), SPIE, CSE> {
        self.with_cs(|spi| {
            spi.transfer(bytes).map(|received| {
                for (dst, src) in rx.iter_mut().zip(received.iter().skip(skip)) {
                    *dst = *src;
                }
            })
        })?
        .map_err(Error::Spi)
    }

    /// Calls a function `f` after bringing the chip select pin low, restoring
    /// it to high after the function has finished.
    fn with_cs<T>(&mut self, f: impl FnOnce(&mut SPI) -> T) -> Result<T, SPIE, CSE> {
        self.cs.set_low().map_err(Error::ChipSelect)?;
        let result = f(&mut self.spi);
        self.cs.set_high().map_err(Error::ChipSelect)?;
        Ok(result)
    }
}

impl<SPI, CS, SPIE, CSE> RegisterAccess for SpiRegisters<SPI, CS>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    SPIE: Debug,
    CSE: Debug,
{
    type SpiError = SPIE;
    type PinError = CSE;

    fn read(&mut self, reg: Register) -> Result<u8, SPIE, CSE> {
        let mut value = [0u8];
        self.transfer(&mut [Instruction::Read as u8, reg.addr(), 0], HEADER_LEN, &mut value)?;
        Ok(value[0])
    }

    fn write(&mut self, reg: Register, value: u8) -> Result<(), SPIE, CSE> {
        self.transfer(&mut [Instruction::Write as u8, reg.addr(), value], 0, &mut [])
    }

    fn bit_modify(&mut self, reg: Register, mask: u8, value: u8) -> Result<(), SPIE, CSE> {
        self.transfer(
            &mut [Instruction::Bitmod as u8, reg.addr(), mask, value],
            0,
            &mut [],
        )
    }

    fn read_sequence(&mut self, start: Register, out: &mut [u8]) -> Result<(), SPIE, CSE> {
        if out.len() > MAX_SEQUENCE_LEN {
            return Err(Error::SequenceTooLong(out.len()));
        }
        let len = HEADER_LEN + out.len();
        let mut bytes = [0u8; HEADER_LEN + MAX_SEQUENCE_LEN];
        bytes[0] = Instruction::Read as u8;
        bytes[1] = start.addr();
        // The chip ignores what is clocked in while it shifts register contents out.
        self.transfer(&mut bytes[..len], HEADER_LEN, out)
    }

    fn write_sequence(&mut self, start: Register, data: &[u8]) -> Result<(), SPIE, CSE> {
        if data.len() > MAX_SEQUENCE_LEN {
            return Err(Error::SequenceTooLong(data.len()));
        }
        let mut bytes = [0u8; HEADER_LEN + MAX_SEQUENCE_LEN];
        bytes[0] = Instruction::Write as u8;
        bytes[1] = start.addr();
        bytes[HEADER_LEN..HEADER_LEN + data.len()].copy_from_slice(data);
        self.transfer(&mut bytes[..HEADER_LEN + data.len()], 0, &mut [])
    }

    fn read_status(&mut self) -> Result<Status, SPIE, CSE> {
        let mut status = [0u8];
        self.transfer(&mut [Instruction::ReadStatus as u8, 0], 1, &mut status)?;
        Ok(Status::from_bytes(status))
    }

    fn reset(&mut self, delay: &mut impl DelayMs<u8>) -> Result<(), SPIE, CSE> {
        self.cs.set_high().map_err(Error::ChipSelect)?;
        self.transfer(&mut [Instruction::Reset as u8], 0, &mut [])?;
        trace!("Reset issued, waiting {} ms", RESET_SETTLE_MS);
        delay.delay_ms(RESET_SETTLE_MS);
        Ok(())
    }
}

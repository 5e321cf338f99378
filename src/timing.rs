//! Bit timing (CNF1, CNF2, CNF3) for the supported oscillator/bitrate pairs.

use crate::{
    error::{Result, UnsupportedBitrate},
    regs::{Cnf1, Cnf2, Cnf3},
    spi::RegisterAccess,
};

/// Speed the CAN bus is operating at.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum CanSpeed {
    Kbps5,
    Kbps10,
    Kbps20,
    Kbps31_25,
    Kbps33_3,
    Kbps40,
    Kbps50,
    Kbps80,
    Kbps100,
    Kbps125,
    Kbps200,
    Kbps250,
    Kbps500,
    Kbps1000,
}

impl CanSpeed {
    pub const ALL: [Self; 14] = [
        Self::Kbps5,
        Self::Kbps10,
        Self::Kbps20,
        Self::Kbps31_25,
        Self::Kbps33_3,
        Self::Kbps40,
        Self::Kbps50,
        Self::Kbps80,
        Self::Kbps100,
        Self::Kbps125,
        Self::Kbps200,
        Self::Kbps250,
        Self::Kbps500,
        Self::Kbps1000,
    ];

    /// Nominal bitrate in bits per second.
    pub const fn bitrate(self) -> u32 {
        match self {
            Self::Kbps5 => 5_000,
            Self::Kbps10 => 10_000,
            Self::Kbps20 => 20_000,
            Self::Kbps31_25 => 31_250,
            Self::Kbps33_3 => 33_333,
            Self::Kbps40 => 40_000,
            Self::Kbps50 => 50_000,
            Self::Kbps80 => 80_000,
            Self::Kbps100 => 100_000,
            Self::Kbps125 => 125_000,
            Self::Kbps200 => 200_000,
            Self::Kbps250 => 250_000,
            Self::Kbps500 => 500_000,
            Self::Kbps1000 => 1_000_000,
        }
    }

    /// Looks up the speed with exactly this nominal bitrate.
    pub fn from_bitrate(bitrate: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|speed| speed.bitrate() == bitrate)
    }
}

/// Speed the MCP2515 is operating at. Should match the crystal frequency
/// onboard.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum McpSpeed {
    MHz8,
    MHz16,
}

impl McpSpeed {
    /// Oscillator frequency in Hz.
    pub const fn hz(self) -> u32 {
        match self {
            Self::MHz8 => 8_000_000,
            Self::MHz16 => 16_000_000,
        }
    }

    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            8_000_000 => Some(Self::MHz8),
            16_000_000 => Some(Self::MHz16),
            _ => None,
        }
    }
}

/// Values of the three bit timing registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    pub cnf1: Cnf1,
    pub cnf2: Cnf2,
    pub cnf3: Cnf3,
}

impl TimingConfig {
    /// Timing for `bitrate` (bits/s) with an oscillator of `oscillator_hz`.
    ///
    /// Only pairs from the validated table are accepted.
    pub fn compute(
        oscillator_hz: u32,
        bitrate: u32,
    ) -> core::result::Result<Self, UnsupportedBitrate> {
        McpSpeed::from_hz(oscillator_hz)
            .zip(CanSpeed::from_bitrate(bitrate))
            .and_then(|(mcp_speed, can_speed)| Self::lookup(mcp_speed, can_speed))
            .ok_or(UnsupportedBitrate {
                oscillator_hz,
                bitrate,
            })
    }

    /// Table entry for the given oscillator and bus speed, if there is one.
    pub fn lookup(mcp_speed: McpSpeed, can_speed: CanSpeed) -> Option<Self> {
        // Sourced from https://github.com/coryjfowler/MCP_CAN_lib/blob/master/mcp_can_dfs.h#L251-L363
        let (cfg1, cfg2, cfg3): (u8, u8, u8) = match (mcp_speed, can_speed) {
            (McpSpeed::MHz8, CanSpeed::Kbps5) => (0xA7, 0xF6, 0x84),
            (McpSpeed::MHz8, CanSpeed::Kbps10) => (0x93, 0xF6, 0x84),
            (McpSpeed::MHz8, CanSpeed::Kbps20) => (0x89, 0xF6, 0x84),
            (McpSpeed::MHz8, CanSpeed::Kbps31_25) => (0x87, 0xE5, 0x83),
            (McpSpeed::MHz8, CanSpeed::Kbps33_3) => (0x85, 0xF6, 0x84),
            (McpSpeed::MHz8, CanSpeed::Kbps40) => (0x84, 0xF6, 0x84),
            (McpSpeed::MHz8, CanSpeed::Kbps50) => (0x84, 0xE5, 0x83),
            (McpSpeed::MHz8, CanSpeed::Kbps80) => (0x84, 0xD3, 0x81),
            (McpSpeed::MHz8, CanSpeed::Kbps100) => (0x81, 0xF6, 0x84),
            (McpSpeed::MHz8, CanSpeed::Kbps125) => (0x81, 0xE5, 0x83),
            (McpSpeed::MHz8, CanSpeed::Kbps200) => (0x80, 0xF6, 0x84),
            (McpSpeed::MHz8, CanSpeed::Kbps250) => (0x80, 0xE5, 0x83),
            (McpSpeed::MHz8, CanSpeed::Kbps500) => (0x00, 0xD1, 0x81),
            (McpSpeed::MHz8, CanSpeed::Kbps1000) => (0x00, 0xC0, 0x80),
            (McpSpeed::MHz16, CanSpeed::Kbps5) => (0x3F, 0xFF, 0x87),
            (McpSpeed::MHz16, CanSpeed::Kbps10) => (0x67, 0xF6, 0x84),
            (McpSpeed::MHz16, CanSpeed::Kbps20) => (0x53, 0xF6, 0x74),
            (McpSpeed::MHz16, CanSpeed::Kbps33_3) => (0x4E, 0xE5, 0x83),
            (McpSpeed::MHz16, CanSpeed::Kbps40) => (0x49, 0xF6, 0x84),
            (McpSpeed::MHz16, CanSpeed::Kbps50) => (0x47, 0xF6, 0x84),
            (McpSpeed::MHz16, CanSpeed::Kbps80) => (0x44, 0xF6, 0x84),
            (McpSpeed::MHz16, CanSpeed::Kbps100) => (0x44, 0xE5, 0x83),
            (McpSpeed::MHz16, CanSpeed::Kbps125) => (0x43, 0xE5, 0x83),
            (McpSpeed::MHz16, CanSpeed::Kbps200) => (0x41, 0xF6, 0x84),
            (McpSpeed::MHz16, CanSpeed::Kbps250) => (0x41, 0xE5, 0x83),
            (McpSpeed::MHz16, CanSpeed::Kbps500) => (0x40, 0xE5, 0x83),
            (McpSpeed::MHz16, CanSpeed::Kbps1000) => (0x00, 0xCA, 0x81),
            _ => return None,
        };
        Some(Self {
            cnf1: Cnf1::from_bytes([cfg1]),
            cnf2: Cnf2::from_bytes([cfg2]),
            cnf3: Cnf3::from_bytes([cfg3]),
        })
    }

    /// Variant with the CLKOUT pin free for the clock signal. SOF shares the
    /// pin, so it is turned off.
    pub fn with_clkout(self, clkout_en: bool) -> Self {
        if clkout_en {
            Self {
                cnf3: self.cnf3.with_sof(false),
                ..self
            }
        } else {
            self
        }
    }

    /// Raw register values in CNF1, CNF2, CNF3 order.
    pub fn into_bytes(self) -> [u8; 3] {
        [
            self.cnf1.into_bytes()[0],
            self.cnf2.into_bytes()[0],
            self.cnf3.into_bytes()[0],
        ]
    }

    /// Writes CNF1, CNF2 then CNF3.
    ///
    /// The chip only accepts these writes in configuration mode; that is up to
    /// the caller.
    pub fn apply<R: RegisterAccess>(&self, regs: &mut R) -> Result<(), R::SpiError, R::PinError> {
        regs.write_reg(self.cnf1)?;
        regs.write_reg(self.cnf2)?;
        regs.write_reg(self.cnf3)?;
        Ok(())
    }
}

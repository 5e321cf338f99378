use core::convert::TryFrom;

use embedded_hal::can::{ExtendedId, Frame, Id, StandardId};

use crate::error::FrameError;

/// Maximum number of data bytes in a classic CAN frame.
pub const MAX_DLC: u8 = 8;

/// CAN frame.
///
/// Bytes of `data` past `dlc` are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    /// ID of CAN frame.
    pub(crate) id: Id,
    /// Whether the frame is an RTR frame.
    pub(crate) rtr: bool,
    /// Length of data in CAN frame.
    pub(crate) dlc: u8,
    /// Data, maximum 8 bytes.
    pub(crate) data: [u8; 8],
}

impl CanFrame {
    /// Creates a data frame from a raw identifier.
    ///
    /// Fails if `identifier` does not fit in 11 bits (29 bits when `extended`
    /// is set) or `data` is longer than 8 bytes.
    pub fn try_new(identifier: u32, extended: bool, data: &[u8]) -> Result<Self, FrameError> {
        if data.len() > MAX_DLC as usize {
            return Err(FrameError::DataTooLong(data.len()));
        }
        let id = if extended {
            ExtendedId::new(identifier)
                .map(Id::Extended)
                .ok_or(FrameError::ExtendedIdOutOfRange(identifier))?
        } else {
            u16::try_from(identifier)
                .ok()
                .and_then(StandardId::new)
                .map(Id::Standard)
                .ok_or(FrameError::StandardIdOutOfRange(identifier))?
        };
        let mut frame = CanFrame {
            id,
            rtr: false,
            dlc: data.len() as u8,
            data: [0; 8],
        };
        frame.data[..data.len()].copy_from_slice(data);
        Ok(frame)
    }

    /// Raw identifier, 11 or 29 bits wide depending on [`Frame::is_extended`].
    pub fn identifier(&self) -> u32 {
        match self.id {
            Id::Standard(id) => u32::from(id.as_raw()),
            Id::Extended(id) => id.as_raw(),
        }
    }

    /// Checks the length invariant. Identifier ranges are held by [`Id`].
    pub(crate) fn validate(&self) -> Result<(), FrameError> {
        if self.dlc > MAX_DLC {
            Err(FrameError::DataTooLong(self.dlc as usize))
        } else {
            Ok(())
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CanFrame {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "CanFrame {{ id: {:#X}, extended: {}, rtr: {}, dlc: {}, data: {:#X} }}",
            self.identifier(),
            self.is_extended(),
            self.rtr,
            self.dlc,
            self.data()
        );
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_DLC as usize {
            return None;
        }
        let mut frame = CanFrame {
            id: id.into(),
            rtr: false,
            dlc: data.len() as u8, // Already asserted data.len() <= 8
            data: [0; 8],
        };
        frame.data[..data.len()].copy_from_slice(data);
        Some(frame)
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > MAX_DLC as usize {
            return None;
        }
        Some(CanFrame {
            id: id.into(),
            rtr: true,
            dlc: dlc as u8, // Already asserted dlc <= 8
            data: [0; 8],
        })
    }

    #[inline]
    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    #[inline]
    fn is_remote_frame(&self) -> bool {
        self.rtr
    }

    #[inline]
    fn id(&self) -> Id {
        self.id
    }

    #[inline]
    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    #[inline]
    fn data(&self) -> &[u8] {
        if self.rtr {
            &[]
        } else {
            &self.data[..self.dlc().min(MAX_DLC as usize)]
        }
    }
}

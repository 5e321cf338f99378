//! Conversion between [`CanFrame`] and the register layout of the transmit
//! and receive buffers.
//!
//! Both buffer kinds share the same layout starting at their `SIDH`
//! register:
//!
//! | byte | register | content                                         |
//! |------|----------|-------------------------------------------------|
//! | 0    | SIDH     | SID[10:3]                                       |
//! | 1    | SIDL     | SID[2:0], SRR, EXIDE, EID[17:16]                |
//! | 2    | EID8     | EID[15:8]                                       |
//! | 3    | EID0     | EID[7:0]                                        |
//! | 4    | DLC      | RTR, DLC[3:0]                                   |
//! | 5..  | DATA     | `dlc` data bytes                                |
//!
//! An extended identifier places its upper 11 bits in SID and its lower 18
//! bits in EID.

use embedded_hal::can::{ExtendedId, Frame, Id, StandardId};

use crate::{
    error::{FrameError, FramingError},
    frame::{CanFrame, MAX_DLC},
};

/// Bytes from `SIDH` up to and including `DLC`.
pub const HEADER_LEN: usize = 5;
/// Full buffer layout: header plus 8 data bytes.
pub const LAYOUT_LEN: usize = HEADER_LEN + MAX_DLC as usize;

const SIDL_SRR: u8 = 0b0001_0000;
const SIDL_EXIDE: u8 = 0b0000_1000;
const SIDL_EID_MASK: u8 = 0b0000_0011;
const DLC_RTR: u8 = 0b0100_0000;
const DLC_MASK: u8 = 0b0000_1111;

const EID_BITS: u32 = 18;
const EID_MASK: u32 = 0x3FFFF;

/// Transmit buffer contents for one frame, ready to be written from `SIDH`
/// onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedFrame {
    bytes: [u8; LAYOUT_LEN],
    len: usize,
}

impl EncodedFrame {
    /// Header followed by exactly `dlc` data bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Packs an identifier into `SIDH`, `SIDL`, `EID8`, `EID0`.
///
/// Filter registers share this layout, so this is also used for acceptance
/// filters and masks.
pub fn pack_id(id: Id) -> [u8; 4] {
    match id {
        Id::Standard(id) => {
            let sid = id.as_raw();
            [(sid >> 3) as u8, ((sid & 0x07) as u8) << 5, 0, 0]
        }
        Id::Extended(id) => {
            let raw = id.as_raw();
            let sid = raw >> EID_BITS;
            let eid = raw & EID_MASK;
            [
                (sid >> 3) as u8,
                (((sid & 0x07) as u8) << 5) | SIDL_EXIDE | ((eid >> 16) as u8 & SIDL_EID_MASK),
                (eid >> 8) as u8,
                eid as u8,
            ]
        }
    }
}

/// Reverse of [`pack_id`]. `EXIDE` decides which identifier kind is built.
pub fn unpack_id(bytes: [u8; 4]) -> Id {
    let [sidh, sidl, eid8, eid0] = bytes;
    let sid = (u16::from(sidh) << 3) | u16::from(sidl >> 5);
    if sidl & SIDL_EXIDE != 0 {
        let eid =
            (u32::from(sidl & SIDL_EID_MASK) << 16) | (u32::from(eid8) << 8) | u32::from(eid0);
        // SAFETY: 11 bits of SID above 18 bits of EID never exceed 29 bits.
        Id::Extended(unsafe { ExtendedId::new_unchecked((u32::from(sid) << EID_BITS) | eid) })
    } else {
        // SAFETY: SIDH and the top 3 bits of SIDL hold exactly 11 bits.
        Id::Standard(unsafe { StandardId::new_unchecked(sid) })
    }
}

/// Encodes `frame` into the transmit buffer layout.
pub fn encode(frame: &CanFrame) -> Result<EncodedFrame, FrameError> {
    frame.validate()?;

    let mut bytes = [0u8; LAYOUT_LEN];
    bytes[..4].copy_from_slice(&pack_id(frame.id()));
    bytes[4] = frame.dlc & DLC_MASK;
    if frame.is_remote_frame() {
        bytes[4] |= DLC_RTR;
    }

    let data = frame.data();
    bytes[HEADER_LEN..HEADER_LEN + data.len()].copy_from_slice(data);
    Ok(EncodedFrame {
        bytes,
        len: HEADER_LEN + data.len(),
    })
}

/// Decodes a receive buffer layout read from `SIDH` onwards.
///
/// A DLC above 8 is rejected rather than truncated.
pub fn decode(layout: &[u8; LAYOUT_LEN]) -> Result<CanFrame, FramingError> {
    let id = unpack_id([layout[0], layout[1], layout[2], layout[3]]);

    let dlc = layout[4] & DLC_MASK;
    if dlc > MAX_DLC {
        return Err(FramingError::DlcOutOfRange(dlc));
    }

    // Received standard frames flag remote requests with SRR, everything else
    // (including transmit buffer layouts) with RTR.
    let rtr = match id {
        Id::Standard(_) => layout[1] & SIDL_SRR != 0 || layout[4] & DLC_RTR != 0,
        Id::Extended(_) => layout[4] & DLC_RTR != 0,
    };

    let mut data = [0u8; 8];
    if !rtr {
        data[..dlc as usize].copy_from_slice(&layout[HEADER_LEN..HEADER_LEN + dlc as usize]);
    }
    Ok(CanFrame { id, rtr, dlc, data })
}

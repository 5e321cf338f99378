//! Acceptance filters and masks.

use embedded_hal::can::Id;

use crate::{buffer::RxSlot, codec::pack_id, regs::Register};

crate::register_set! {
    /// Receive filters.
    RxFilter => {
        /// RXF0
        F0 => Register::RXF0SIDH,
        /// RXF1
        F1 => Register::RXF1SIDH,
        /// RXF2
        F2 => Register::RXF2SIDH,
        /// RXF3
        F3 => Register::RXF3SIDH,
        /// RXF4
        F4 => Register::RXF4SIDH,
        /// RXF5
        F5 => Register::RXF5SIDH
    }
}

impl RxFilter {
    /// Receive slot the filter feeds. RXB0 has two filters, RXB1 the other
    /// four.
    pub const fn rx_slot(self) -> RxSlot {
        match self {
            RxFilter::F0 | RxFilter::F1 => RxSlot::S0,
            _ => RxSlot::S1,
        }
    }

    /// Register contents for a filter matching `id`.
    ///
    /// A standard filter only matches standard frames and an extended filter
    /// only extended frames.
    pub fn bytes(id: Id) -> [u8; 4] {
        pack_id(id)
    }
}

crate::register_set! {
    /// Receive masks.
    RxMask => {
        /// Mask 0, applies to RXB0.
        Mask0 => Register::RXM0SIDH,
        /// Mask 1, applies to RXB1.
        Mask1 => Register::RXM1SIDH
    }
}

impl RxMask {
    /// Register contents for a mask with the bits of `id` set.
    ///
    /// Mask registers have no `EXIDE` bit; a standard `id` leaves the
    /// extended bits cleared.
    pub fn bytes(id: Id) -> [u8; 4] {
        let mut bytes = pack_id(id);
        bytes[1] &= !0b0000_1000;
        bytes
    }
}

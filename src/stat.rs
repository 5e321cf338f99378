use modular_bitfield::prelude::*;

use crate::buffer::{RxSlot, TxSlot};

/// Byte returned by the `READ STATUS` instruction.
///
/// Bit mapping per the MCP2515 datasheet (table 12-9): receive flags in bits
/// 0 and 1, then a `TXREQ`/`TXnIF` pair per transmit buffer.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    #[skip(setters)]
    pub rx0if: bool,
    #[skip(setters)]
    pub rx1if: bool,
    #[skip(setters)]
    pub tx0req: bool,
    #[skip(setters)]
    pub tx0if: bool,
    #[skip(setters)]
    pub tx1req: bool,
    #[skip(setters)]
    pub tx1if: bool,
    #[skip(setters)]
    pub tx2req: bool,
    #[skip(setters)]
    pub tx2if: bool,
}

impl Status {
    /// Whether `slot` still has a transmission requested.
    pub fn tx_busy(&self, slot: TxSlot) -> bool {
        match slot {
            TxSlot::S0 => self.tx0req(),
            TxSlot::S1 => self.tx1req(),
            TxSlot::S2 => self.tx2req(),
        }
    }

    /// Whether `slot` holds a received frame.
    pub fn rx_pending(&self, slot: RxSlot) -> bool {
        match slot {
            RxSlot::S0 => self.rx0if(),
            RxSlot::S1 => self.rx1if(),
        }
    }

    /// First transmit slot, in index order, that is not busy.
    pub fn free_tx_slot(&self) -> Option<TxSlot> {
        TxSlot::ALL.iter().copied().find(|slot| !self.tx_busy(*slot))
    }

    /// First receive slot, in index order, that holds a frame.
    pub fn pending_rx_slot(&self) -> Option<RxSlot> {
        RxSlot::ALL.iter().copied().find(|slot| self.rx_pending(*slot))
    }
}

//! Transmit and receive buffer slots.

use log::trace;

use crate::{
    codec::{EncodedFrame, LAYOUT_LEN},
    error::Result,
    regs::{CanIntf, Register, TxbCtrl},
    spi::RegisterAccess,
};

crate::register_set! {
    /// Transmit buffer.
    TxSlot => {
        /// TXB0, highest priority when picking a free slot.
        S0 => Register::TXB0SIDH,
        /// TXB1.
        S1 => Register::TXB1SIDH,
        /// TXB2.
        S2 => Register::TXB2SIDH
    }
}

impl TxSlot {
    /// Returns the `CTRL` register for the selected Tx buffer.
    pub const fn ctrl(self) -> Register {
        match self {
            TxSlot::S0 => Register::TXB0CTRL,
            TxSlot::S1 => Register::TXB1CTRL,
            TxSlot::S2 => Register::TXB2CTRL,
        }
    }
}

crate::register_set! {
    /// Receive buffer.
    RxSlot => {
        /// RXB0, read first when both slots hold a frame.
        S0 => Register::RXB0SIDH,
        /// RXB1.
        S1 => Register::RXB1SIDH
    }
}

impl RxSlot {
    /// CANINTF bit raised while the slot holds a frame.
    pub const fn intf_mask(self) -> CanIntf {
        match self {
            RxSlot::S0 => CanIntf::MASK_RX0IF,
            RxSlot::S1 => CanIntf::MASK_RX1IF,
        }
    }
}

/// Picks transmit and receive slots based on the chip's buffer status and
/// moves frame layouts in and out of them.
///
/// Nothing is cached: every decision is taken on a fresh `READ STATUS`.
pub struct BufferArbiter<'a, R> {
    regs: &'a mut R,
}

impl<'a, R: RegisterAccess> BufferArbiter<'a, R> {
    pub fn new(regs: &'a mut R) -> Self {
        Self { regs }
    }

    /// First transmit slot not pending transmission, in index order.
    pub fn acquire_tx_slot(&mut self) -> Result<Option<TxSlot>, R::SpiError, R::PinError> {
        Ok(self.regs.read_status()?.free_tx_slot())
    }

    /// Writes identifier, DLC and data of a frame into `slot`.
    ///
    /// `slot` must come from [`acquire_tx_slot`](Self::acquire_tx_slot).
    pub fn load_tx_slot(
        &mut self,
        slot: TxSlot,
        frame: &EncodedFrame,
    ) -> Result<(), R::SpiError, R::PinError> {
        self.regs.write_sequence(slot.sidh(), frame.as_bytes())
    }

    /// Sets `TXREQ` of `slot`, and only of `slot`.
    pub fn request_transmit(&mut self, slot: TxSlot) -> Result<(), R::SpiError, R::PinError> {
        trace!("Requesting transmission from {:?}", slot);
        self.regs.bit_modify(
            slot.ctrl(),
            TxbCtrl::MASK_TXREQ.into_bytes()[0],
            TxbCtrl::new().with_txreq(true).into_bytes()[0],
        )
    }

    /// First receive slot holding a frame, slot 0 before slot 1.
    pub fn pending_rx_slot(&mut self) -> Result<Option<RxSlot>, R::SpiError, R::PinError> {
        Ok(self.regs.read_status()?.pending_rx_slot())
    }

    /// Reads the full buffer layout of `slot`.
    ///
    /// `slot` must come from [`pending_rx_slot`](Self::pending_rx_slot).
    pub fn read_rx_slot(
        &mut self,
        slot: RxSlot,
    ) -> Result<[u8; LAYOUT_LEN], R::SpiError, R::PinError> {
        let mut layout = [0u8; LAYOUT_LEN];
        self.regs.read_sequence(slot.sidh(), &mut layout)?;
        Ok(layout)
    }

    /// Clears the receive flag of `slot` so the chip can fill it again. The
    /// flag of the other slot is left alone.
    pub fn release_rx_slot(&mut self, slot: RxSlot) -> Result<(), R::SpiError, R::PinError> {
        self.regs.modify_reg(CanIntf::new(), slot.intf_mask())
    }

    /// Reads the control register of `slot`.
    pub fn tx_status(&mut self, slot: TxSlot) -> Result<TxbCtrl, R::SpiError, R::PinError> {
        self.regs.read(slot.ctrl()).map(|ctrl| TxbCtrl::from_bytes([ctrl]))
    }
}

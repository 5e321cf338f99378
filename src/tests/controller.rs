use embedded_hal::can::nb::Can;
use embedded_hal::can::{ExtendedId, Frame, StandardId};
use mockall::Sequence;

use crate::buffer::{RxSlot, TxSlot};
use crate::error::{Error, FrameError, FramingError, InitError, InitStage, UnsupportedBitrate};
use crate::frame::CanFrame;
use crate::mocks::{FakeChip, Mocks, NoopPin, TestDelay};
use crate::regs::{ControllerMode, Register};
use crate::spi::RESET_SETTLE_MS;
use crate::{Mcp2515, McpSpeed, Settings};

fn initialized(chip: FakeChip) -> Mcp2515<FakeChip, NoopPin> {
    let mut can = chip.controller();
    can.initialize(&mut TestDelay::default(), 250_000).unwrap();
    can
}

#[test]
fn test_initialize() {
    let mut delay = TestDelay::default();
    let mut can = FakeChip::default().controller();
    can.initialize(&mut delay, 250_000).unwrap();
    assert_eq!(ControllerMode::Normal, can.mode());
    assert_eq!(vec![RESET_SETTLE_MS], delay.calls);

    let (chip, _) = can.into_inner().free();
    assert_eq!(vec![0xC0], chip.transactions[0]);
    assert_eq!(0x80, chip.reg(Register::CNF1));
    assert_eq!(0xE5, chip.reg(Register::CNF2));
    assert_eq!(0x83, chip.reg(Register::CNF3));
    assert_eq!(0x00, chip.reg(Register::CANSTAT) & 0xE0);
    assert_eq!(0x00, chip.reg(Register::CANCTRL) & 0x04);

    // Timing is only written in configuration mode
    let configuration = chip.position(&[0x05, 0x0F, 0xE0, 0x80]).unwrap();
    let cnf1 = chip.position(&[0x02, 0x2A]).unwrap();
    let normal = chip.position(&[0x05, 0x0F, 0xE0, 0x00]).unwrap();
    assert!(configuration < cnf1);
    assert!(cnf1 < normal);

    let mut clear_tx = vec![0x02, 0x30];
    clear_tx.extend_from_slice(&[0u8; 14]);
    assert!(chip.transactions.contains(&clear_tx));

    assert_eq!(0x04, chip.reg(Register::RXB0CTRL));
    assert_eq!(0x00, chip.reg(Register::RXB1CTRL));
    assert_eq!(0xA3, chip.reg(Register::CANINTE));
    assert_eq!(0x00, chip.reg(Register::CANINTF));

    // Even filters standard, odd filters extended, masks open
    assert_eq!(0x00, chip.reg(Register::RXF0SIDL));
    assert_eq!(0x08, chip.reg(Register::RXF1SIDL));
    assert_eq!(0x08, chip.reg(Register::RXF5SIDL));
    assert_eq!(0x00, chip.reg(Register::RXM0SIDL));
    assert_eq!(0x00, chip.reg(Register::RXM1SIDL));
}

#[test]
fn test_initialize_16mhz_with_clkout() {
    let settings = Settings {
        oscillator: McpSpeed::MHz16,
        clkout_en: true,
    };
    let mut can = Mcp2515::new(FakeChip::default(), NoopPin, settings);
    can.initialize(&mut TestDelay::default(), 500_000).unwrap();
    assert_eq!(settings, can.settings());

    let (chip, _) = can.into_inner().free();
    assert_eq!(0x40, chip.reg(Register::CNF1));
    assert_eq!(0xE5, chip.reg(Register::CNF2));
    assert_eq!(0x03, chip.reg(Register::CNF3));
    assert_eq!(0x04, chip.reg(Register::CANCTRL) & 0x04);
}

#[test]
fn test_initialize_unsupported_bitrate() {
    let mut can = FakeChip::default().controller();
    assert_eq!(
        Err(InitError {
            stage: InitStage::BitTiming,
            source: Error::UnsupportedBitrate(UnsupportedBitrate {
                oscillator_hz: 8_000_000,
                bitrate: 123_456,
            }),
        }),
        can.initialize(&mut TestDelay::default(), 123_456)
    );

    let (chip, _) = can.into_inner().free();
    assert!(chip.transactions.is_empty());
}

#[test]
fn test_initialize_normal_mode_timeout() {
    let chip = FakeChip {
        stuck_mode: true,
        ..FakeChip::default()
    };
    let mut can = chip.controller();
    assert_eq!(
        Err(InitError {
            stage: InitStage::NormalMode,
            source: Error::ModeTransitionTimeout {
                requested: ControllerMode::Normal
            },
        }),
        can.initialize(&mut TestDelay::default(), 250_000)
    );
    assert_eq!(ControllerMode::Configuration, can.mode());
}

#[test]
fn test_initialize_bus_error() {
    let mut mocks = Mocks::default();
    let mut seq = Sequence::new();
    mocks
        .pin_cs
        .expect_set_high()
        .times(1)
        .return_const(Ok(()))
        .in_sequence(&mut seq);
    mocks
        .pin_cs
        .expect_set_low()
        .times(1)
        .return_const(Ok(()))
        .in_sequence(&mut seq);
    mocks
        .bus
        .expect_transfer()
        .times(1)
        .returning(|_| Err(7))
        .in_sequence(&mut seq);
    mocks
        .pin_cs
        .expect_set_high()
        .times(1)
        .return_const(Ok(()))
        .in_sequence(&mut seq);

    let mut delay = TestDelay::default();
    let result = mocks.into_controller().initialize(&mut delay, 250_000);
    assert_eq!(
        Err(InitError {
            stage: InitStage::Reset,
            source: Error::Spi(7),
        }),
        result
    );
    assert!(delay.calls.is_empty());
}

#[test]
fn test_send_standard() {
    let mut mocks = Mocks::default();
    let mut seq = Sequence::new();
    mocks.expect_status(0x00, &mut seq);
    mocks.expect_command(
        &[0x02, 0x31, 0x24, 0x60, 0x00, 0x00, 0x02, 0xAA, 0xBB],
        &mut seq,
    );
    mocks.expect_command(&[0x05, 0x30, 0x08, 0x08], &mut seq);

    let frame = CanFrame::try_new(0x123, false, &[0xAA, 0xBB]).unwrap();
    mocks.into_controller().send(&frame).unwrap();
}

#[test]
fn test_send_uses_next_free_slot() {
    let mut mocks = Mocks::default();
    let mut seq = Sequence::new();
    // TXB0 pending
    mocks.expect_status(0b0000_0100, &mut seq);
    mocks.expect_command(&[0x02, 0x41, 0x0D, 0x4B, 0xCD, 0xEF, 0x00], &mut seq);
    mocks.expect_command(&[0x05, 0x40, 0x08, 0x08], &mut seq);

    let frame = CanFrame::try_new(0x1ABCDEF, true, &[]).unwrap();
    mocks.into_controller().send(&frame).unwrap();
}

#[test]
fn test_send_buffer_full() {
    let mut mocks = Mocks::default();
    let mut seq = Sequence::new();
    mocks.expect_status(0b0101_0100, &mut seq);

    let frame = CanFrame::try_new(0x123, false, &[0x01]).unwrap();
    assert_eq!(Err(Error::BufferFull), mocks.into_controller().send(&frame));
}

#[test]
fn test_send_invalid_frame_touches_nothing() {
    let mocks = Mocks::default();
    let frame = CanFrame {
        id: StandardId::new(0x123).unwrap().into(),
        rtr: false,
        dlc: 9,
        data: [0; 8],
    };
    assert_eq!(
        Err(Error::InvalidFrame(FrameError::DataTooLong(9))),
        mocks.into_controller().send(&frame)
    );
}

#[test]
fn test_poll_receive_extended() {
    let mut mocks = Mocks::default();
    let mut seq = Sequence::new();
    mocks.expect_status(0b0000_0001, &mut seq);

    let mut request = vec![0x03, 0x61];
    request.extend_from_slice(&[0u8; 13]);
    mocks.expect_transaction(
        &request,
        &[
            0x00, 0x00, 0x0D, 0x4B, 0xCD, 0xEF, 0x03, 0x11, 0x22, 0x33, 0x00, 0x00, 0x00, 0x00,
            0x00,
        ],
        &mut seq,
    );
    // Only RX0IF is cleared
    mocks.expect_command(&[0x05, 0x2C, 0x01, 0x00], &mut seq);

    let frame = mocks.into_controller().poll_receive().unwrap().unwrap();
    assert!(frame.is_extended());
    assert_eq!(0x1ABCDEF, frame.identifier());
    assert_eq!(3, frame.dlc());
    assert_eq!(&[0x11, 0x22, 0x33], frame.data());
}

#[test]
fn test_poll_receive_nothing_pending() {
    let mut mocks = Mocks::default();
    let mut seq = Sequence::new();
    mocks.expect_status(0b0101_0100, &mut seq);

    assert_eq!(Ok(None), mocks.into_controller().poll_receive());
}

#[test]
fn test_poll_receive_drains_rxb0_first() {
    let mut chip = FakeChip::default();
    chip.inject(RxSlot::S0, &[0x24, 0x60, 0x00, 0x00, 0x01, 0x0A]);
    chip.inject(RxSlot::S1, &[0x24, 0x80, 0x00, 0x00, 0x01, 0x0B]);
    let mut can = chip.controller();

    assert!(can.rx_pending().unwrap());
    let first = can.poll_receive().unwrap().unwrap();
    assert_eq!(CanFrame::try_new(0x123, false, &[0x0A]).unwrap(), first);

    let second = can.poll_receive().unwrap().unwrap();
    assert_eq!(CanFrame::try_new(0x124, false, &[0x0B]).unwrap(), second);

    assert_eq!(None, can.poll_receive().unwrap());
    assert!(!can.rx_pending().unwrap());
}

#[test]
fn test_poll_receive_clears_only_its_flag() {
    let mut chip = FakeChip::default();
    chip.inject(RxSlot::S0, &[0x24, 0x60, 0x00, 0x00, 0x00]);
    chip.inject(RxSlot::S1, &[0x24, 0x60, 0x00, 0x00, 0x00]);
    let mut can = chip.controller();
    can.poll_receive().unwrap();

    let (chip, _) = can.into_inner().free();
    assert_eq!(0b0000_0010, chip.reg(Register::CANINTF));
}

#[test]
fn test_poll_receive_framing_error_frees_slot() {
    let mut chip = FakeChip::default();
    chip.inject(RxSlot::S0, &[0x24, 0x60, 0x00, 0x00, 0x09]);
    let mut can = chip.controller();

    assert_eq!(
        Err(Error::Framing {
            slot: RxSlot::S0,
            error: FramingError::DlcOutOfRange(9),
        }),
        can.poll_receive()
    );
    assert_eq!(None, can.poll_receive().unwrap());
}

#[test]
fn test_loopback() {
    let chip = FakeChip {
        echo: true,
        ..FakeChip::default()
    };
    let mut delay = TestDelay::default();
    let mut can = initialized(chip);
    can.set_mode(&mut delay, ControllerMode::Loopback).unwrap();
    assert_eq!(ControllerMode::Loopback, can.mode());

    let data = CanFrame::try_new(0x0CFE6C17, true, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    let remote = CanFrame::new_remote(StandardId::new(0x7DF).unwrap(), 2).unwrap();
    can.send(&data).unwrap();
    can.send(&remote).unwrap();

    assert_eq!(Some(data), can.poll_receive().unwrap());
    assert_eq!(Some(remote), can.poll_receive().unwrap());
    assert_eq!(None, can.poll_receive().unwrap());
}

#[test]
fn test_fourth_send_is_rejected() {
    let mut can = initialized(FakeChip::default());
    let frame = CanFrame::new(ExtendedId::new(0x18FEF100).unwrap(), &[0xFF]).unwrap();

    for _ in 0..3 {
        can.send(&frame).unwrap();
    }
    assert_eq!(Err(Error::BufferFull), can.send(&frame));
    assert!(can.tx_status(TxSlot::S2).unwrap().txreq());
}

#[test]
fn test_nb_can() {
    let mut can = initialized(FakeChip::default());
    let frame = CanFrame::new(StandardId::new(0x100).unwrap(), &[]).unwrap();

    assert!(matches!(can.receive(), Err(nb::Error::WouldBlock)));
    for _ in 0..3 {
        assert!(matches!(can.transmit(&frame), Ok(None)));
    }
    assert!(matches!(can.transmit(&frame), Err(nb::Error::WouldBlock)));
    // Pending frames stay queued, nothing was overwritten.
    for slot in [TxSlot::S0, TxSlot::S1, TxSlot::S2] {
        assert!(can.tx_status(slot).unwrap().txreq());
    }
}

#[test]
fn test_tx_status_reports_failure() {
    let mut chip = FakeChip::default();
    chip.set_reg(Register::TXB1CTRL, 0b0010_1000);
    let mut can = chip.controller();

    let status = can.tx_status(TxSlot::S1).unwrap();
    assert!(status.txreq());
    assert!(status.mloa());
    assert!(status.failed());
    assert!(!can.tx_status(TxSlot::S0).unwrap().failed());
}

#[test]
fn test_error_flags() {
    let mut chip = FakeChip::default();
    chip.set_reg(Register::EFLG, 0b0100_0001);
    let mut can = chip.controller();

    let flags = can.error_flags().unwrap();
    assert!(flags.overflowed());
    assert!(!flags.contains(crate::regs::ErrorFlags::TXBO));
}

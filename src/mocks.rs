use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use mockall::{mock, Sequence};

use crate::buffer::RxSlot;
use crate::regs::Register;
use crate::{Mcp2515, Settings, SpiRegisters};

mock! {
    pub SPIBus {}

    impl Transfer<u8> for SPIBus {
        type Error = u32;

        fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'static [u8], u32>;
    }
}

mock! {
    pub Pin {}

    impl OutputPin for Pin {
        type Error = u32;

        fn set_low(&mut self) -> Result<(), u32>;
        fn set_high(&mut self) -> Result<(), u32>;
    }
}

/// Records every requested delay.
#[derive(Debug, Default)]
pub struct TestDelay {
    pub calls: Vec<u8>,
}

impl TestDelay {
    pub fn total_ms(&self) -> u32 {
        self.calls.iter().map(|ms| u32::from(*ms)).sum()
    }
}

impl DelayMs<u8> for TestDelay {
    fn delay_ms(&mut self, ms: u8) {
        self.calls.push(ms);
    }
}

/// Bus and chip-select mocks expecting an exact sequence of transactions.
pub struct Mocks {
    pub bus: MockSPIBus,
    pub pin_cs: MockPin,
}

impl Default for Mocks {
    fn default() -> Self {
        Self {
            bus: MockSPIBus::new(),
            pin_cs: MockPin::new(),
        }
    }
}

impl Mocks {
    pub fn into_registers(self) -> SpiRegisters<MockSPIBus, MockPin> {
        SpiRegisters::new(self.bus, self.pin_cs)
    }

    pub fn into_controller(self) -> Mcp2515<MockSPIBus, MockPin> {
        Mcp2515::new(self.bus, self.pin_cs, Settings::default())
    }

    /// Expects one chip-select window clocking out `expected`. The chip
    /// answers with `response`.
    pub fn expect_transaction(&mut self, expected: &[u8], response: &[u8], seq: &mut Sequence) {
        let expected = expected.to_vec();
        let response = leak(response);

        self.pin_cs
            .expect_set_low()
            .times(1)
            .return_const(Ok(()))
            .in_sequence(seq);
        self.bus
            .expect_transfer()
            .times(1)
            .returning(move |data| {
                assert_eq!(expected, data);
                Ok(response)
            })
            .in_sequence(seq);
        self.pin_cs
            .expect_set_high()
            .times(1)
            .return_const(Ok(()))
            .in_sequence(seq);
    }

    /// Expects a `WRITE` or `BIT MODIFY`; the chip clocks out zeros.
    pub fn expect_command(&mut self, expected: &[u8], seq: &mut Sequence) {
        let zeros = vec![0u8; expected.len()];
        self.expect_transaction(expected, &zeros, seq);
    }

    /// Expects a single register read answered with `value`.
    pub fn expect_read(&mut self, reg: Register, value: u8, seq: &mut Sequence) {
        self.expect_transaction(&[0x03, reg.addr(), 0x00], &[0x00, 0x00, value], seq);
    }

    /// Expects a `READ STATUS` answered with `status`.
    pub fn expect_status(&mut self, status: u8, seq: &mut Sequence) {
        self.expect_transaction(&[0xA0, 0x00], &[0x00, status], seq);
    }
}

fn leak(bytes: &[u8]) -> &'static [u8] {
    Box::leak(bytes.to_vec().into_boxed_slice())
}

/// Chip-select pin that always succeeds.
#[derive(Debug, Default)]
pub struct NoopPin;

impl OutputPin for NoopPin {
    type Error = u32;

    fn set_low(&mut self) -> Result<(), u32> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), u32> {
        Ok(())
    }
}

const CANSTAT: usize = Register::CANSTAT as usize;
const CANCTRL: usize = Register::CANCTRL as usize;
const CANINTF: usize = Register::CANINTF as usize;
const TXREQ: u8 = 0b0000_1000;
const LAYOUT_LEN: usize = 13;

/// Register file model of an MCP2515 behind the SPI bus.
///
/// Understands every instruction the driver issues. A mode request is
/// confirmed in CANSTAT straight away unless `stuck_mode` is set.
#[derive(Debug)]
pub struct FakeChip {
    pub regs: [u8; 0x80],
    /// Every transfer, as clocked in by the driver.
    pub transactions: Vec<Vec<u8>>,
    /// CANSTAT ignores mode requests.
    pub stuck_mode: bool,
    /// A transmission request moves the frame into a free receive buffer
    /// instead of the bus.
    pub echo: bool,
}

impl Default for FakeChip {
    fn default() -> Self {
        let mut chip = Self {
            regs: [0; 0x80],
            transactions: Vec::new(),
            stuck_mode: false,
            echo: false,
        };
        chip.power_on();
        chip
    }
}

impl FakeChip {
    pub fn controller(self) -> Mcp2515<FakeChip, NoopPin> {
        Mcp2515::new(self, NoopPin, Settings::default())
    }

    pub fn reg(&self, reg: Register) -> u8 {
        self.regs[reg as usize]
    }

    pub fn set_reg(&mut self, reg: Register, value: u8) {
        self.regs[reg as usize] = value;
    }

    /// Places a received buffer layout (SIDH onwards) into `slot` and raises
    /// its flag.
    pub fn inject(&mut self, slot: RxSlot, layout: &[u8]) {
        let start = slot.sidh() as usize;
        self.regs[start..start + layout.len()].copy_from_slice(layout);
        self.regs[CANINTF] |= slot.intf_mask().into_bytes()[0];
    }

    /// Index of the first transaction starting with `prefix`.
    pub fn position(&self, prefix: &[u8]) -> Option<usize> {
        self.transactions.iter().position(|t| t.starts_with(prefix))
    }

    fn power_on(&mut self) {
        self.regs = [0; 0x80];
        self.regs[CANSTAT] = 0x80;
        self.regs[CANCTRL] = 0x87;
    }

    fn store(&mut self, addr: usize, value: u8) {
        let addr = addr & 0x7F;
        match addr {
            CANSTAT => {}
            CANCTRL => {
                self.regs[CANCTRL] = value;
                if !self.stuck_mode {
                    self.regs[CANSTAT] = (self.regs[CANSTAT] & 0x1F) | (value & 0xE0);
                }
            }
            _ => {
                self.regs[addr] = value;
                if self.echo && value & TXREQ != 0 {
                    if let Some(index) = [0x30, 0x40, 0x50].iter().position(|ctrl| *ctrl == addr) {
                        self.echo_tx(addr, index);
                    }
                }
            }
        }
    }

    fn echo_tx(&mut self, ctrl: usize, index: usize) {
        let mut layout = [0u8; LAYOUT_LEN];
        layout.copy_from_slice(&self.regs[ctrl + 1..ctrl + 1 + LAYOUT_LEN]);
        // Received standard frames flag remote requests with SRR.
        let extended = layout[1] & 0x08 != 0;
        if !extended && layout[4] & 0x40 != 0 {
            layout[1] |= 0x10;
        }
        let slot = if self.regs[CANINTF] & 0x01 == 0 {
            RxSlot::S0
        } else {
            RxSlot::S1
        };
        self.inject(slot, &layout);
        self.regs[ctrl] &= !TXREQ;
        self.regs[CANINTF] |= 0b0000_0100 << index;
    }

    fn status(&self) -> u8 {
        let intf = self.regs[CANINTF];
        let txreq = |ctrl: usize| u8::from(self.regs[ctrl] & TXREQ != 0);
        (intf & 0b11)
            | (txreq(0x30) << 2)
            | (((intf >> 2) & 1) << 3)
            | (txreq(0x40) << 4)
            | (((intf >> 3) & 1) << 5)
            | (txreq(0x50) << 6)
            | (((intf >> 4) & 1) << 7)
    }
}

impl Transfer<u8> for FakeChip {
    type Error = u32;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], u32> {
        self.transactions.push(words.to_vec());
        match words[0] {
            0x03 => {
                let start = words[1] as usize;
                for (i, word) in words.iter_mut().enumerate().skip(2) {
                    *word = self.regs[(start + i - 2) & 0x7F];
                }
            }
            0x02 => {
                let start = words[1] as usize;
                for i in 2..words.len() {
                    self.store(start + i - 2, words[i]);
                }
            }
            0x05 => {
                let addr = words[1] as usize & 0x7F;
                let (mask, value) = (words[2], words[3]);
                self.store(addr, (self.regs[addr] & !mask) | (value & mask));
            }
            0xA0 => words[1] = self.status(),
            0xC0 => self.power_on(),
            other => return Err(u32::from(other)),
        }
        Ok(words)
    }
}

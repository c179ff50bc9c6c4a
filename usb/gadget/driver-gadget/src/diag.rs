//! The diagnostic command set spoken over the bulk endpoints.
//!
//! Every bulk OUT transfer that is not being skipped is a command packet: an eight byte header
//! `{num: u8, cmd: u8, param1: u16, param2: i32}` (little endian, no padding) and an optional
//! payload. Each received transfer schedules one reply frame on bulk IN. The reply starts with
//! the pending reply header; `cmd == 0xBB` sub-commands can stage counters into its `param2`,
//! change the frame size or arm a run of random test data.
//!
//! The state is split between the two workers. [DiagRx] owns the receive counters and decodes
//! commands; [DiagTx] owns the transmit counters, the test transfer and the pending reply. The
//! RX half tells the TX half what to do through a bounded channel of [TxRequest]s carrying
//! snapshots of receive-side values, so no state is shared between the threads.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, info, warn};
use rand::Rng;

pub const HEADER_LEN: usize = 8;

/// Largest frame the TX half builds.
pub const TX_BUF_SIZE: usize = 0x2000;

/// Requests queued from RX to TX before new ones get dropped.
pub const TX_QUEUE_DEPTH: usize = 64;

pub const CMD_LEDS: u8 = 0x05;
pub const CMD_TEST: u8 = 0xBB;
pub const CMD_INVALIDATE: u8 = 0xFE;

pub const TEST_SET_VERBOSITY: u16 = 0x04;
pub const TEST_SET_TX_AMOUNT: u16 = 0x11;
pub const TEST_RESET_TX: u16 = 0x50;
pub const TEST_RESET_RX: u16 = 0x51;
pub const TEST_REPORT_TX_COUNTER: u16 = 0x52;
pub const TEST_REPORT_RX_COUNTER: u16 = 0x53;
pub const TEST_REPORT_TX_CHECKSUM: u16 = 0x54;
pub const TEST_REPORT_RX_CHECKSUM: u16 = 0x55;
pub const TEST_REPORT_TEST_BYTES_LEFT: u16 = 0x75;
pub const TEST_PRINT_STATISTICS: u16 = b'p' as u16;
pub const TEST_IGNORE_RX: u16 = b'r' as u16;
pub const TEST_SEND_TEST_DATA: u16 = b't' as u16;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PacketHeader {
    pub num: u8,
    pub cmd: u8,
    pub param1: u16,
    pub param2: i32,
}

impl PacketHeader {
    /// Decodes the header of a received transfer. Missing bytes read as zero.
    pub fn parse(buf: &[u8]) -> Self {
        let mut raw = [0u8; HEADER_LEN];
        let len = buf.len().min(HEADER_LEN);
        raw[..len].copy_from_slice(&buf[..len]);
        Self {
            num: raw[0],
            cmd: raw[1],
            param1: u16::from_le_bytes([raw[2], raw[3]]),
            param2: i32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let param1 = self.param1.to_le_bytes();
        let param2 = self.param2.to_le_bytes();
        [
            self.num, self.cmd, param1[0], param1[1], param2[0], param2[1], param2[2], param2[3],
        ]
    }
}

/// Wrapping byte sum, the checksum used by the test host for both directions.
pub fn checksum(acc: u32, bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(acc, |acc, &byte| acc.wrapping_add(u32::from(byte)))
}

/// Receive-side values at the time a command was decoded.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RxSnapshot {
    pub counter: u64,
    pub checksum: u32,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Statistics {
    pub tx_counter: u64,
    pub rx_counter: u64,
    pub tx_checksum: u32,
    pub rx_checksum: u32,
    pub test_bytes_left: i32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Report {
    TxCounter,
    TxChecksum,
    TestBytesLeft,
    /// A receive-side value, already captured.
    Value(i32),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxAction {
    SetAmount(i32),
    ResetCounters,
    ArmTest(i32),
    Report(Report),
    Statistics(RxSnapshot),
}

/// Header fields of a received command copied into the pending reply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Mirror {
    pub num: u8,
    pub cmd: u8,
    /// Only test commands echo their sub-command.
    pub param1: Option<u16>,
}

/// One received transfer, as seen by the TX half. Always asks for a reply frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TxRequest {
    pub mirror: Option<Mirror>,
    pub action: Option<TxAction>,
}

/// Creates the two halves of the diagnostic state.
pub fn channel(verbosity: i32, tx_amount: i32) -> (DiagRx, DiagTx) {
    let (sender, receiver) = crossbeam_channel::bounded(TX_QUEUE_DEPTH);
    let rx = DiagRx {
        sender,
        counter: 0,
        checksum: 0,
        ignore: 0,
        verbosity,
    };
    let tx = DiagTx {
        receiver,
        buffer: vec![0; TX_BUF_SIZE].into_boxed_slice(),
        reply: PacketHeader::default(),
        reply_pending: false,
        amount: tx_amount,
        counter: 0,
        checksum: 0,
        test_bytes_left: 0,
        statistics: None,
    };
    (rx, tx)
}

/// Receive half, owned by the RX worker.
#[derive(Debug)]
pub struct DiagRx {
    sender: Sender<TxRequest>,
    counter: u64,
    checksum: u32,
    ignore: i64,
    verbosity: i32,
}

impl DiagRx {
    pub fn count_rx(&mut self, len: usize) {
        self.counter = self.counter.wrapping_add(len as u64);
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn verbosity(&self) -> i32 {
        self.verbosity
    }

    /// Bytes still to be skipped as raw test payload.
    pub fn ignore_left(&self) -> i64 {
        self.ignore
    }

    /// Skips the next `len` received bytes instead of decoding them as commands.
    pub fn ignore_rx(&mut self, len: i64) {
        self.ignore = len.max(0);
    }

    fn snapshot(&self) -> RxSnapshot {
        RxSnapshot {
            counter: self.counter,
            checksum: self.checksum,
        }
    }

    /// Handles one received transfer.
    pub fn on_rx(&mut self, buf: &[u8]) {
        let request = if self.ignore > 0 {
            self.ignore = (self.ignore - buf.len() as i64).max(0);
            TxRequest {
                mirror: None,
                action: None,
            }
        } else {
            self.dispatch(PacketHeader::parse(buf))
        };

        self.checksum = checksum(self.checksum, buf);

        match self.sender.try_send(request) {
            Ok(()) => (),
            Err(TrySendError::Full(_)) => warn!("diag: reply queue full, dropping request"),
            Err(TrySendError::Disconnected(_)) => debug!("diag: no transmitter, dropping request"),
        }
    }

    fn dispatch(&mut self, packet: PacketHeader) -> TxRequest {
        let mut mirror = Mirror {
            num: packet.num,
            cmd: packet.cmd,
            param1: None,
        };
        let mut action = None;

        match packet.cmd {
            CMD_LEDS => info!(
                "LEDs green: {}, orange: {}",
                packet.param1 & 1,
                (packet.param1 & 2) >> 1
            ),
            CMD_TEST => {
                mirror.param1 = Some(packet.param1);
                action = self.test_command(packet);
            }
            CMD_INVALIDATE => (),
            other => log::trace!("diag: ignoring command {:#x}", other),
        }

        TxRequest {
            mirror: Some(mirror),
            action,
        }
    }

    fn test_command(&mut self, packet: PacketHeader) -> Option<TxAction> {
        Some(match packet.param1 {
            TEST_SET_VERBOSITY => {
                self.verbosity = packet.param2;
                log::set_max_level(common::verbosity_level(self.verbosity));
                return None;
            }
            TEST_SET_TX_AMOUNT => TxAction::SetAmount(packet.param2),
            TEST_RESET_TX => TxAction::ResetCounters,
            TEST_RESET_RX => {
                self.counter = 0;
                self.checksum = 0;
                return None;
            }
            TEST_REPORT_TX_COUNTER => TxAction::Report(Report::TxCounter),
            TEST_REPORT_RX_COUNTER => TxAction::Report(Report::Value(self.counter as i32)),
            TEST_REPORT_TX_CHECKSUM => TxAction::Report(Report::TxChecksum),
            TEST_REPORT_RX_CHECKSUM => TxAction::Report(Report::Value(self.checksum as i32)),
            TEST_REPORT_TEST_BYTES_LEFT => TxAction::Report(Report::TestBytesLeft),
            TEST_PRINT_STATISTICS => TxAction::Statistics(self.snapshot()),
            TEST_SEND_TEST_DATA => TxAction::ArmTest(packet.param2),
            TEST_IGNORE_RX => {
                self.ignore_rx(i64::from(packet.param2));
                return None;
            }
            other => {
                debug!("diag: unknown test command {:#x}", other);
                return None;
            }
        })
    }
}

/// Transmit half, owned by the TX worker.
#[derive(Debug)]
pub struct DiagTx {
    receiver: Receiver<TxRequest>,
    buffer: Box<[u8]>,
    reply: PacketHeader,
    reply_pending: bool,
    amount: i32,
    counter: u64,
    checksum: u32,
    test_bytes_left: i32,
    statistics: Option<Statistics>,
}

impl DiagTx {
    pub fn count_tx(&mut self, len: usize) {
        self.counter = self.counter.wrapping_add(len as u64);
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn test_bytes_left(&self) -> i32 {
        self.test_bytes_left
    }

    pub fn amount(&self) -> i32 {
        self.amount
    }

    /// The header the next reply frame starts with.
    pub fn pending_reply(&self) -> PacketHeader {
        self.reply
    }

    /// The last statistics dump requested by the host.
    pub fn statistics(&self) -> Option<Statistics> {
        self.statistics
    }

    /// True if a frame would be produced right now.
    pub fn has_work(&self) -> bool {
        self.reply_pending || self.test_bytes_left > 0
    }

    pub fn apply(&mut self, request: TxRequest) {
        if let Some(mirror) = request.mirror {
            self.reply.num = mirror.num;
            self.reply.cmd = mirror.cmd;
            if let Some(param1) = mirror.param1 {
                self.reply.param1 = param1;
            }
        }

        match request.action {
            None => (),
            Some(TxAction::SetAmount(amount)) => self.amount = amount,
            Some(TxAction::ResetCounters) => {
                self.counter = 0;
                self.checksum = 0;
            }
            Some(TxAction::ArmTest(len)) => self.test_bytes_left = len,
            Some(TxAction::Report(report)) => {
                self.reply.param2 = match report {
                    Report::TxCounter => self.counter as i32,
                    Report::TxChecksum => self.checksum as i32,
                    Report::TestBytesLeft => self.test_bytes_left,
                    Report::Value(value) => value,
                }
            }
            Some(TxAction::Statistics(rx)) => {
                let statistics = Statistics {
                    tx_counter: self.counter,
                    rx_counter: rx.counter,
                    tx_checksum: self.checksum,
                    rx_checksum: rx.checksum,
                    test_bytes_left: self.test_bytes_left,
                };
                info!(
                    "statistics: tx counter {}, rx counter {}, tx checksum {:08x}, rx checksum {:08x}, test bytes left {}",
                    statistics.tx_counter,
                    statistics.rx_counter,
                    statistics.tx_checksum,
                    statistics.rx_checksum,
                    statistics.test_bytes_left
                );
                self.statistics = Some(statistics);
            }
        }

        self.reply_pending = true;
    }

    /// Applies everything the RX half queued so far without blocking.
    pub fn drain(&mut self) {
        while let Ok(request) = self.receiver.try_recv() {
            self.apply(request);
        }
    }

    /// Blocks until the RX half queues something or `timeout` passes.
    ///
    /// Returns whether a frame is ready to be built.
    pub fn wait_for_work(&mut self, timeout: Duration) -> bool {
        if !self.has_work() {
            match self.receiver.recv_timeout(timeout) {
                Ok(request) => self.apply(request),
                Err(RecvTimeoutError::Timeout) => (),
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(timeout),
            }
        }
        self.drain();
        self.has_work()
    }

    /// Builds the next frame to send, at most `max_size` bytes. Empty if nothing is pending.
    ///
    /// The frame is the pending reply header padded to the configured amount. While a test
    /// transfer is armed, the space after the header carries random bytes and the countdown
    /// shrinks by that many. Every byte of the frame is added to the transmit checksum.
    pub fn on_tx_request(&mut self, max_size: usize) -> &[u8] {
        self.drain();
        if !self.has_work() {
            return &[];
        }
        self.reply_pending = false;

        let len = (self.amount.max(0) as usize)
            .min(self.buffer.len())
            .min(max_size);
        let frame = &mut self.buffer[..len];
        frame.fill(0);

        let header = self.reply.to_bytes();
        let header_len = header.len().min(len);
        frame[..header_len].copy_from_slice(&header[..header_len]);

        if self.test_bytes_left > 0 {
            let fill = (self.test_bytes_left as usize).min(len - header_len);
            if fill == 0 {
                warn!(
                    "diag: frame size {} leaves no room for test data, dropping {} test bytes",
                    len, self.test_bytes_left
                );
                self.test_bytes_left = 0;
            } else {
                rand::thread_rng().fill(&mut frame[header_len..header_len + fill]);
                self.test_bytes_left -= fill as i32;
            }
        }

        self.checksum = checksum(self.checksum, frame);
        &self.buffer[..len]
    }
}

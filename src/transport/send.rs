//! Send side: segmentation of one outgoing message under flow control.
//!
//! A transfer that does not fit a single frame runs through this state
//! machine: first frame, wait for the peer's flow control, then consecutive
//! frames paced by STmin and grouped into blocks of the peer's BS. One
//! machine exists per transport instance; arming it while a transfer is in
//! flight is rejected upstream.

use heapless::Vec;

use crate::address::{Address, AddressingMode};
use crate::callback::TransportCallback;
use crate::config::{N_BS_TIMEOUT_MS, N_CR_TIMEOUT_MS, SEQUENCE_NUMBER_MODULUS};
use crate::fmt::{debug, trace, warning};
use crate::frame::Frame;
use crate::io::{CanSink, FaultHandler};
use crate::protocol::{separation_time_micros, Fault, FlowControl, FlowStatus, PduType, TpResult};
use crate::timer::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendState {
    Idle,
    SendFirstFrame,
    ReceiveFirstFlowControl,
    SendConsecutiveFrame,
    ReceiveBsFlowControl,
    Done,
}

pub(crate) struct SendMachine<const MTU: usize> {
    state: SendState,
    target: Address,
    message: Vec<u8, MTU>,
    bytes_sent: usize,
    /// SN of the next consecutive frame, 1-based, wraps at 16.
    sequence_number: u8,
    frames_in_block: u16,
    received_block_size: u8,
    received_separation_us: u32,
    separation_timer: Timer,
    bs_cr_timer: Timer,
    wait_frames: u8,
    max_wait_frames: u8,
}

impl<const MTU: usize> SendMachine<MTU> {
    pub(crate) fn new() -> Self {
        SendMachine {
            state: SendState::Done,
            target: Address::default(),
            message: Vec::new(),
            bytes_sent: 0,
            sequence_number: 1,
            frames_in_block: 0,
            received_block_size: 0,
            received_separation_us: 0,
            separation_timer: Timer::default(),
            bs_cr_timer: Timer::default(),
            wait_frames: 0,
            max_wait_frames: 0,
        }
    }

    /// The machine is idle between transfers; `Done` is the resting state.
    pub(crate) fn is_idle(&self) -> bool {
        self.state == SendState::Done
    }

    /// Take ownership of a message and start over. The first frame goes out
    /// on a later poll.
    pub(crate) fn arm(&mut self, target: Address, payload: &[u8], max_wait_frames: u8) -> Result<(), ()> {
        self.message.clear();
        self.message.extend_from_slice(payload)?;

        self.target = target;
        self.bytes_sent = 0;
        self.sequence_number = 1;
        self.frames_in_block = 0;
        self.received_block_size = 0;
        self.received_separation_us = 0;
        self.wait_frames = 0;
        self.max_wait_frames = max_wait_frames;
        self.state = SendState::Idle;
        Ok(())
    }

    /// Advance the machine: transmit a due FF or CF, or detect a missing
    /// flow control / stalled link via the Bs/Cr timer.
    pub(crate) fn poll<Fr, S, C, E>(
        &mut self,
        now: u32,
        mode: AddressingMode,
        sink: &mut S,
        callback: &mut C,
        faults: &mut E,
    ) where
        Fr: Frame,
        S: CanSink<Fr>,
        C: TransportCallback,
        E: FaultHandler,
    {
        if self.state == SendState::Done {
            return;
        }

        if !matches!(self.state, SendState::Idle | SendState::SendFirstFrame) && self.bs_cr_timer.is_expired(now) {
            let result = match self.state {
                SendState::ReceiveFirstFlowControl | SendState::ReceiveBsFlowControl => TpResult::TimeoutBs,
                _ => TpResult::TimeoutCr,
            };

            warning!("transfer timed out waiting, state {}", self.state as u8);
            callback.confirm(&self.target, result);
            self.state = SendState::Done;
            return;
        }

        match self.state {
            SendState::Idle => self.state = SendState::SendFirstFrame,
            SendState::SendFirstFrame => self.send_first_frame(now, mode, sink, callback, faults),
            SendState::SendConsecutiveFrame => self.send_consecutive_frame(now, mode, sink, callback, faults),
            // Nothing to transmit; progress comes from an incoming FC.
            SendState::ReceiveFirstFlowControl | SendState::ReceiveBsFlowControl | SendState::Done => {}
        }
    }

    /// React to a flow control frame from the matching peer. Ignored unless
    /// the machine is actually waiting for one.
    pub(crate) fn on_flow_control<C: TransportCallback>(&mut self, now: u32, fc: &FlowControl, callback: &mut C) {
        if !matches!(
            self.state,
            SendState::ReceiveFirstFlowControl | SendState::ReceiveBsFlowControl
        ) {
            return;
        }

        let Some(status) = FlowStatus::from_nibble(fc.status) else {
            // 6.5.5.3: unassigned FS aborts the transfer.
            callback.confirm(&self.target, TpResult::InvalidFs);
            self.state = SendState::Done;
            return;
        };

        match status {
            FlowStatus::Overflow => {
                callback.confirm(&self.target, TpResult::BufferOverflow);
                self.state = SendState::Done;
            }
            FlowStatus::Wait => {
                self.bs_cr_timer.restart(now, N_BS_TIMEOUT_MS);
                self.wait_frames = self.wait_frames.saturating_add(1);

                // A cap of 0 aborts on the first WAIT, which the ISO
                // document explicitly allows.
                if self.wait_frames >= self.max_wait_frames {
                    warning!("wait frame limit reached, aborting transfer");
                    callback.confirm(&self.target, TpResult::WaitFrameOverrun);
                    self.state = SendState::Done;
                }
            }
            FlowStatus::ContinueToSend => {
                // BS and STmin are latched from the first FC of the transfer
                // only (6.5.5.4, 6.5.5.5).
                if self.state == SendState::ReceiveFirstFlowControl {
                    self.received_block_size = fc.block_size;
                    self.received_separation_us = separation_time_micros(fc.separation_time);
                    trace!(
                        "flow control: bs {}, stmin {} us",
                        fc.block_size,
                        self.received_separation_us
                    );
                }

                self.wait_frames = 0;
                self.frames_in_block = 0;
                self.separation_timer.restart(now, 0);
                self.bs_cr_timer.restart(now, N_CR_TIMEOUT_MS);
                self.state = SendState::SendConsecutiveFrame;
            }
        }
    }

    fn send_first_frame<Fr, S, C, E>(
        &mut self,
        now: u32,
        mode: AddressingMode,
        sink: &mut S,
        callback: &mut C,
        faults: &mut E,
    ) where
        Fr: Frame,
        S: CanSink<Fr>,
        C: TransportCallback,
        E: FaultHandler,
    {
        let mut frame = Fr::default();

        if mode.to_frame(&self.target, &mut frame).is_err() {
            faults.fault(Fault::AddressEncode);
            callback.confirm(&self.target, TpResult::Error);
            self.state = SendState::Done;
            return;
        }

        let offset = mode.pci_offset();
        let total = self.message.len();
        frame.set_byte(offset, PduType::FirstFrame.high_nibble() | (total >> 8) as u8);
        frame.set_byte(offset + 1, total as u8);

        let payload = 6 - offset;
        for i in 0..payload {
            frame.set_byte(offset + 2 + i, self.message[i]);
        }
        frame.set_dlc((offset + 2 + payload) as u8);

        if !sink.transmit(&frame) {
            callback.confirm(&self.target, TpResult::TimeoutA);
            self.state = SendState::Done;
            return;
        }

        debug!("first frame out, message len {}", total);
        callback.confirm(&self.target, TpResult::Ok);
        self.bytes_sent = payload;
        self.bs_cr_timer.restart(now, N_BS_TIMEOUT_MS);
        self.state = SendState::ReceiveFirstFlowControl;
    }

    fn send_consecutive_frame<Fr, S, C, E>(
        &mut self,
        now: u32,
        mode: AddressingMode,
        sink: &mut S,
        callback: &mut C,
        faults: &mut E,
    ) where
        Fr: Frame,
        S: CanSink<Fr>,
        C: TransportCallback,
        E: FaultHandler,
    {
        if !self.separation_timer.is_expired(now) {
            return;
        }

        let mut frame = Fr::default();

        if mode.to_frame(&self.target, &mut frame).is_err() {
            faults.fault(Fault::AddressEncode);
            callback.confirm(&self.target, TpResult::Error);
            self.state = SendState::Done;
            return;
        }

        let offset = mode.pci_offset();
        frame.set_byte(offset, PduType::ConsecutiveFrame.high_nibble() | self.sequence_number);

        let count = (7 - offset).min(self.message.len() - self.bytes_sent);
        for i in 0..count {
            frame.set_byte(offset + 1 + i, self.message[self.bytes_sent + i]);
        }
        frame.set_dlc((offset + 1 + count) as u8);

        if !sink.transmit(&frame) {
            callback.confirm(&self.target, TpResult::TimeoutA);
            self.state = SendState::Done;
            return;
        }

        trace!("consecutive frame out, sn {}, {} bytes", self.sequence_number, count);
        self.bytes_sent += count;
        self.sequence_number = (self.sequence_number + 1) % SEQUENCE_NUMBER_MODULUS;

        if self.bytes_sent >= self.message.len() {
            self.state = SendState::Done;
            return;
        }

        self.frames_in_block += 1;
        if self.received_block_size > 0 && self.frames_in_block >= u16::from(self.received_block_size) {
            // Block complete; the peer owes us another flow control frame.
            self.state = SendState::ReceiveBsFlowControl;
            self.bs_cr_timer.restart(now, N_BS_TIMEOUT_MS);
            return;
        }

        // STmin is decoded in microseconds but the clock ticks in
        // milliseconds; round up so sub-millisecond values still pace.
        self.separation_timer
            .restart(now, self.received_separation_us.div_ceil(1000));
        self.bs_cr_timer.restart(now, N_CR_TIMEOUT_MS);
    }
}

//! Receive side: reassembly of interleaved incoming messages.
//!
//! Receptions from different peers may interleave arbitrarily; each one is
//! tracked in a bounded table keyed by the decoded peer address. Entries are
//! created by a first frame, advanced by consecutive frames and removed on
//! completion, error or timeout.

use heapless::Vec;

use crate::address::{Address, AddressingMode};
use crate::callback::TransportCallback;
use crate::config::{MAX_MESSAGE_SIZE, N_BS_TIMEOUT_MS, N_CR_TIMEOUT_MS, SEQUENCE_NUMBER_MODULUS, TransportConfig};
use crate::fmt::{debug, trace, warning};
use crate::frame::Frame;
use crate::io::{CanSink, FaultHandler};
use crate::protocol::{first_frame_len, sequence_number, single_frame_len, Fault, FlowStatus, PduType, TpResult};
use crate::timer::Timer;
use crate::transport::TransportProtocol;

/// One in-flight reception: the assembled bytes plus the bookkeeping that
/// validates and times the consecutive frames still owed by the peer.
pub(crate) struct TransportMessage<const MTU: usize> {
    data: Vec<u8, MTU>,
    /// Bytes still missing, per the FF length header.
    remaining: usize,
    /// SN the next CF must carry, mod 16. The first CF after FF carries 1.
    expected_sn: u8,
    /// CFs taken since the last flow control we sent, for BS enforcement.
    frames_in_block: u16,
    timer: Timer,
    timeout_reason: TpResult,
}

impl<const MTU: usize> TransportMessage<MTU> {
    fn opened(remaining: usize, now: u32) -> Self {
        TransportMessage {
            data: Vec::new(),
            remaining,
            expected_sn: 1,
            frames_in_block: 0,
            timer: Timer::started(now, N_BS_TIMEOUT_MS),
            timeout_reason: TpResult::TimeoutBs,
        }
    }

    fn append<F: Frame>(&mut self, frame: &F, offset: usize, len: usize) -> Result<(), ()> {
        for i in 0..len {
            self.data.push(frame.byte(offset + i)).map_err(|_| ())?;
        }

        Ok(())
    }
}

impl<Fr, S, K, C, E, const MTU: usize, const SLOTS: usize> TransportProtocol<Fr, S, K, C, E, MTU, SLOTS>
where
    Fr: Frame,
    S: CanSink<Fr>,
    K: crate::timer::Clock,
    C: TransportCallback,
    E: FaultHandler,
{
    /// Single frame: a complete message in one shot, no flow control.
    pub(crate) fn on_single_frame(&mut self, peer: &Address, frame: &Fr) {
        let offset = self.mode.pci_offset();
        let len = single_frame_len(frame, offset);

        // 6.5.2.2: lengths outside 1..=7 (1..=6 with the extended byte) are
        // not valid single frames and the whole frame is ignored.
        if len == 0 || len > 7 - offset {
            return;
        }

        if self.rx.contains_key(peer) {
            // Table 18 in 6.7.3: an SF during a segmented reception kills
            // that reception, and the SF itself is discarded too.
            warning!("single frame from a peer with a reception in progress");
            self.callback.indication(peer, &[], TpResult::UnexpectedPdu);
            self.rx.remove(peer);
            return;
        }

        let mut data = [0u8; 7];
        for (i, byte) in data[..len].iter_mut().enumerate() {
            *byte = frame.byte(offset + 1 + i);
        }

        trace!("single frame received, {} bytes", len);
        self.callback.indication(peer, &data[..len], TpResult::Ok);
    }

    /// First frame: open a table entry and answer with flow control.
    pub(crate) fn on_first_frame(&mut self, peer: &Address, frame: &Fr) {
        let offset = self.mode.pci_offset();
        let declared = first_frame_len(frame, offset);

        // Messages short enough for a single frame must not arrive
        // segmented; such FFs are ignored outright.
        if declared < 8 - offset {
            return;
        }

        if declared > MTU.min(MAX_MESSAGE_SIZE) {
            // 6.5.3.3: announce that the message cannot be taken.
            warning!("first frame of {} bytes exceeds the receive buffer", declared);
            self.emit_flow_control(FlowStatus::Overflow);
            return;
        }

        if self.rx.contains_key(peer) {
            self.callback.indication(peer, &[], TpResult::UnexpectedPdu);
            self.rx.remove(peer);
        }

        let now = self.clock.now();
        let ff_payload = 6 - offset;
        let mut message = TransportMessage::opened(declared - ff_payload, now);

        // Cannot overflow: declared fits MTU, checked above.
        let _ = message.append(frame, offset + 2, ff_payload);

        if self.rx.insert(*peer, message).is_err() {
            warning!("receive table full, rejecting reception");
            self.callback.indication(peer, &[], TpResult::MessageNumMax);
            return;
        }

        debug!("reception of {} bytes opened", declared);
        self.callback.first_frame(peer, declared as u16);

        if !self.emit_flow_control(FlowStatus::ContinueToSend) {
            self.callback.indication(peer, &[], TpResult::Error);
            self.rx.remove(peer);
        }
    }

    /// Consecutive frame: validate the SN, take the payload, keep the block
    /// accounting and deliver once everything arrived.
    pub(crate) fn on_consecutive_frame(&mut self, peer: &Address, frame: &Fr) {
        let offset = self.mode.pci_offset();
        let now = self.clock.now();

        let Some(message) = self.rx.get_mut(peer) else {
            // Table 18: a CF without a reception in progress is ignored.
            return;
        };

        message.timer.restart(now, N_CR_TIMEOUT_MS);
        message.timeout_reason = TpResult::TimeoutCr;

        let sn = sequence_number(frame, offset);
        if sn != message.expected_sn {
            // 6.5.4.3 SN error handling; the reception cannot recover.
            warning!("sequence error: got {}, expected {}", sn, message.expected_sn);
            self.callback.indication(peer, &[], TpResult::WrongSn);
            self.rx.remove(peer);
            return;
        }

        message.expected_sn = (message.expected_sn + 1) % SEQUENCE_NUMBER_MODULUS;

        let count = (7 - offset).min(message.remaining);
        if message.append(frame, offset + 1, count).is_err() {
            self.callback.indication(peer, &[], TpResult::Error);
            self.rx.remove(peer);
            return;
        }
        message.remaining -= count;
        message.frames_in_block += 1;

        let block_full = self.config.block_size > 0 && message.frames_in_block >= u16::from(self.config.block_size);
        if block_full {
            message.frames_in_block = 0;
        }
        let remaining = message.remaining;

        if block_full && !self.emit_flow_control(FlowStatus::ContinueToSend) {
            self.callback.indication(peer, &[], TpResult::Error);
            self.rx.remove(peer);
            return;
        }

        if remaining == 0 {
            let Some(message) = self.rx.get(peer) else { return };
            self.callback.indication(peer, &message.data, TpResult::Ok);
            self.rx.remove(peer);
        }
    }

    /// Deliver timeout indications for receptions whose peer went quiet and
    /// drop them. Keys are collected first so removal cannot disturb the
    /// table walk.
    pub(crate) fn sweep_receive_timeouts(&mut self, now: u32) {
        let mut expired: Vec<(Address, TpResult), SLOTS> = Vec::new();

        for (address, message) in self.rx.iter() {
            if message.timer.is_expired(now) {
                let _ = expired.push((*address, message.timeout_reason));
            }
        }

        for (address, reason) in &expired {
            warning!("reception timed out");
            self.rx.remove(address);
            self.callback.indication(address, &[], *reason);
        }
    }

    /// Emit one flow control frame towards the peer we are receiving from,
    /// carrying our advertised BS and STmin.
    fn emit_flow_control(&mut self, status: FlowStatus) -> bool {
        Self::send_flow_control(
            &mut self.sink,
            &mut self.faults,
            self.mode,
            &self.address,
            status,
            &self.config,
        )
    }

    fn send_flow_control(
        sink: &mut S,
        faults: &mut E,
        mode: AddressingMode,
        ours: &Address,
        status: FlowStatus,
        config: &TransportConfig,
    ) -> bool {
        let mut frame = Fr::default();

        if mode.to_frame(ours, &mut frame).is_err() {
            faults.fault(Fault::AddressEncode);
            return false;
        }

        let offset = mode.pci_offset();
        frame.set_byte(offset, PduType::FlowControl.high_nibble() | status.nibble());
        frame.set_byte(offset + 1, config.block_size);
        frame.set_byte(offset + 2, config.separation_time);
        frame.set_dlc((offset + 3) as u8);

        if !sink.transmit(&frame) {
            faults.fault(Fault::SendFailed);
            return false;
        }

        true
    }
}

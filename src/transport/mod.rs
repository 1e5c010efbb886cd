//! The transport protocol engine.
//!
//! [`TransportProtocol`] ties the pieces together: incoming frames are
//! decoded, matched against our address, classified and routed to the
//! receive assembler or the send state machine; a periodic [`tick`] advances
//! timers and transmits whatever became due. All progress is driven by the
//! caller through three entry points — `on_frame`, `tick` and `send` — and
//! none of them ever blocks.
//!
//! # Threading
//!
//! The engine is single-threaded by design. The three entry points must be
//! serialized by the caller, e.g. by pinning the instance to one task or
//! loop; callbacks run synchronously inside whichever entry point triggered
//! them and must not re-enter the instance.
//!
//! # Example
//!
//! ```no_run
//! use cantp::{Address, AddressingMode, CanFrame, SimpleCallback, TransportProtocol};
//!
//! fn millis() -> u32 {
//!     0 // read your monotonic timebase here
//! }
//!
//! let mut tp: TransportProtocol<CanFrame, _, _, _, _> = TransportProtocol::new(
//!     AddressingMode::Normal11,
//!     Address::normal(0x7E8, 0x7E0),
//!     |_frame: &CanFrame| {
//!         // hand the frame to the CAN driver; false on failure
//!         true
//!     },
//!     millis,
//!     SimpleCallback(|_message: &[u8]| {
//!         // complete ISO-TP message
//!     }),
//!     |_fault: cantp::Fault| {},
//! );
//!
//! tp.send(Address::normal(0x7E8, 0x7E0), &[0x3E, 0x00]).unwrap();
//! loop {
//!     // feed incoming frames with tp.on_frame(&frame) ...
//!     tp.tick();
//! }
//! ```
//!
//! [`tick`]: TransportProtocol::tick

mod recv;
mod send;

use core::marker::PhantomData;

use heapless::LinearMap;
use thiserror::Error;

use crate::address::{Address, AddressError, AddressingMode};
use crate::callback::TransportCallback;
use crate::config::{MAX_MESSAGE_SIZE, TransportConfig};
use crate::fmt::trace;
use crate::frame::Frame;
use crate::io::{CanSink, FaultHandler};
use crate::protocol::{Fault, FlowControl, PduType, TpResult};
use crate::timer::Clock;

use recv::TransportMessage;
use send::SendMachine;

/// A message could not be accepted for transmission.
///
/// Everything here is reported synchronously from [`TransportProtocol::send`];
/// failures of a transfer already in flight arrive through the confirmation
/// callback instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
    #[error("empty messages cannot be sent")]
    Empty,
    #[error("message exceeds the maximum transmissible size")]
    TooLong,
    #[error("a multi-frame transfer is already in progress")]
    Busy,
    #[error("the link layer rejected the frame")]
    LinkLayer,
    #[error(transparent)]
    Address(#[from] AddressError),
}

/// ISO 15765-2 transport protocol instance.
///
/// Type parameters: the CAN frame type `Fr`, the output sink `S`, the clock
/// `K`, the application callback `C` and the fault handler `E`. The two
/// const parameters bound memory: `MTU` caps the size of a single transport
/// message (at most 4095) and `SLOTS` caps how many receptions from
/// different peers may be in flight at once. Everything is owned inline;
/// the engine allocates nothing.
pub struct TransportProtocol<Fr, S, K, C, E, const MTU: usize = 4095, const SLOTS: usize = 4> {
    mode: AddressingMode,
    address: Address,
    sink: S,
    clock: K,
    callback: C,
    faults: E,
    config: TransportConfig,
    rx: LinearMap<Address, TransportMessage<MTU>, SLOTS>,
    tx: SendMachine<MTU>,
    _frame: PhantomData<Fr>,
}

impl<Fr, S, K, C, E, const MTU: usize, const SLOTS: usize> TransportProtocol<Fr, S, K, C, E, MTU, SLOTS>
where
    Fr: Frame,
    S: CanSink<Fr>,
    K: Clock,
    C: TransportCallback,
    E: FaultHandler,
{
    /// Build an instance with default [`TransportConfig`].
    pub fn new(mode: AddressingMode, address: Address, sink: S, clock: K, callback: C, faults: E) -> Self {
        Self::with_config(mode, address, sink, clock, callback, faults, TransportConfig::default())
    }

    pub fn with_config(
        mode: AddressingMode,
        address: Address,
        sink: S,
        clock: K,
        callback: C,
        faults: E,
        config: TransportConfig,
    ) -> Self {
        TransportProtocol {
            mode,
            address,
            sink,
            clock,
            callback,
            faults,
            config,
            rx: LinearMap::new(),
            tx: SendMachine::new(),
            _frame: PhantomData,
        }
    }

    /// Request transmission of a message to `address` (`N_USData.request`).
    ///
    /// Messages that fit a single frame go out immediately; anything longer
    /// arms the send state machine, and subsequent [`tick`] calls plus the
    /// peer's flow control frames drive it to completion. The outcome of the
    /// transfer is reported through the confirmation callback either way.
    ///
    /// [`tick`]: TransportProtocol::tick
    pub fn send(&mut self, address: Address, payload: &[u8]) -> Result<(), SendError> {
        if payload.is_empty() {
            return Err(SendError::Empty);
        }

        if payload.len() > MTU.min(MAX_MESSAGE_SIZE) {
            return Err(SendError::TooLong);
        }

        // 6 or 7 bytes depending on the addressing scheme.
        if payload.len() <= 7 - self.mode.pci_offset() {
            return self.send_single_frame(&address, payload);
        }

        if !self.tx.is_idle() {
            return Err(SendError::Busy);
        }

        self.tx
            .arm(address, payload, self.config.max_wait_frames)
            .map_err(|()| SendError::TooLong)
    }

    /// Feed one received CAN frame into the engine.
    ///
    /// Frames that do not decode under the addressing scheme, or that are
    /// not addressed to us, are dropped without further effect.
    pub fn on_frame(&mut self, frame: &Fr) {
        #[cfg(feature = "std")]
        {
            let len = (frame.dlc() as usize).min(8);
            let mut data = [0u8; 8];
            for (i, byte) in data[..len].iter_mut().enumerate() {
                *byte = frame.byte(i);
            }
            tracing::trace!("frame in: id {:#x}, data {}", frame.id(), hex::encode(&data[..len]));
        }

        // Frames that do not decode under our scheme are foreign bus
        // traffic, not an error condition.
        let Some(peer) = self.mode.from_frame(frame) else {
            return;
        };

        if !self.mode.matches(&peer, &self.address) {
            return;
        }

        let offset = self.mode.pci_offset();
        match PduType::of_frame(frame, offset) {
            Some(PduType::SingleFrame) => self.on_single_frame(&peer, frame),
            Some(PduType::FirstFrame) => self.on_first_frame(&peer, frame),
            Some(PduType::ConsecutiveFrame) => self.on_consecutive_frame(&peer, frame),
            Some(PduType::FlowControl) => {
                let fc = FlowControl::of_frame(frame, offset);
                let now = self.clock.now();
                self.tx.on_flow_control(now, &fc, &mut self.callback);
            }
            // Unassigned N_PCI high nibble: ignore, Table 18.
            None => trace!("ignoring frame with unassigned pdu nibble"),
        }
    }

    /// Advance timers and transmit whatever became due.
    ///
    /// Does a bounded amount of work per call: expired receptions are
    /// dropped (with a timeout indication each), then the send machine may
    /// put at most one frame on the wire. Call this often enough to observe
    /// the N_Bs/N_Cr deadlines and to keep STmin pacing accurate.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        self.sweep_receive_timeouts(now);
        self.tx
            .poll::<Fr, _, _, _>(now, self.mode, &mut self.sink, &mut self.callback, &mut self.faults);
    }

    /// Whether a multi-frame transmission is in flight.
    pub fn is_sending(&self) -> bool {
        !self.tx.is_idle()
    }

    pub fn my_address(&self) -> &Address {
        &self.address
    }

    /// Replace the instance address. Used during reception to match incoming
    /// frames and to emit flow control; used during sending when `send` is
    /// given this same address.
    pub fn set_my_address(&mut self, address: Address) {
        self.address = address;
    }

    /// BS advertised in our flow control frames: how many consecutive frames
    /// the peer may send between FCs. 0 means no limit (6.5.5.4).
    pub fn set_block_size(&mut self, block_size: u8) {
        self.config.block_size = block_size;
    }

    /// STmin advertised in our flow control frames, raw wire encoding
    /// (6.5.5.5). Reserved values are stored as the 0x7F maximum, mirroring
    /// how receivers must treat them.
    pub fn set_separation_time(&mut self, separation_time: u8) {
        self.config.separation_time = match separation_time {
            0x00..=0x7F | 0xF1..=0xF9 => separation_time,
            _ => 0x7F,
        };
    }

    fn send_single_frame(&mut self, address: &Address, payload: &[u8]) -> Result<(), SendError> {
        let mut frame = Fr::default();

        if let Err(error) = self.mode.to_frame(address, &mut frame) {
            self.faults.fault(Fault::AddressEncode);
            return Err(SendError::Address(error));
        }

        let offset = self.mode.pci_offset();
        frame.set_byte(offset, PduType::SingleFrame.high_nibble() | payload.len() as u8);
        for (i, byte) in payload.iter().enumerate() {
            frame.set_byte(offset + 1 + i, *byte);
        }
        frame.set_dlc((offset + 1 + payload.len()) as u8);

        if !self.sink.transmit(&frame) {
            self.callback.confirm(address, TpResult::TimeoutA);
            return Err(SendError::LinkLayer);
        }

        self.callback.confirm(address, TpResult::Ok);
        Ok(())
    }
}

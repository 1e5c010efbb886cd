//! ISO 15765-2 transport protocol (ISO-TP) for CAN.
//!
//! CAN frames carry at most eight data bytes; ISO-TP layers messages of up
//! to 4095 bytes on top by segmenting them into single, first and
//! consecutive frames, with flow control frames pacing the other direction.
//! This crate implements the transport engine: segmentation and reassembly,
//! the flow-controlled send state machine, concurrent reception from
//! multiple peers with per-message timers, and the seven ISO addressing
//! schemes.
//!
//! The engine is platform-neutral and allocation-free. It talks to the
//! outside world through small seams supplied at construction:
//!
//! - an output sink that transmits one CAN frame ([`CanSink`], any
//!   `FnMut(&F) -> bool`),
//! - a monotonic millisecond clock ([`Clock`], any `Fn() -> u32`),
//! - an application callback for received messages and transfer outcomes
//!   ([`TransportCallback`]),
//! - a fault handler for instance-level status codes ([`FaultHandler`]).
//!
//! Progress is driven entirely by the caller: feed incoming frames to
//! [`TransportProtocol::on_frame`] and call [`TransportProtocol::tick`]
//! periodically. Nothing blocks and no threads are spawned, which makes the
//! same engine usable from an MCU main loop and from a host process bridged
//! to a CAN socket.
//!
//! # Features
//!
//! - `std` — host profile: `tracing` log output, `hex` frame dumps.
//! - `defmt` — embedded log output and `defmt::Format` derives.
//! - `serde` — serde derives on address, config and result types.
//! - `linux-socketcan` — [`linux::CanSocket`], a raw `AF_CAN` bridge.
//!
//! With no features enabled the crate is `no_std` and heap-free.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod address;
pub mod callback;
pub mod config;
pub mod frame;
pub mod io;
pub mod protocol;
pub mod timer;
pub mod transport;

#[cfg(feature = "linux-socketcan")]
pub mod linux;

pub(crate) mod fmt;

pub use address::{Address, AddressError, AddressingMode, MessageType, TargetAddressType};
pub use callback::{AdvancedCallback, SimpleCallback, TransportCallback};
pub use config::TransportConfig;
pub use frame::{CanFrame, Frame};
pub use io::{CanSink, FaultHandler};
pub use protocol::{Fault, FlowStatus, TpResult};
pub use timer::Clock;
pub use transport::{SendError, TransportProtocol};

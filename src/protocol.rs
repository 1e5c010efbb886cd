//! Protocol control information and result codes.
//!
//! Every ISO-TP frame carries an N_PCI byte at the addressing-dependent
//! offset (0, or 1 when the scheme claims the first data byte). Its high
//! nibble selects one of four PDU kinds; the low nibble and the following
//! byte encode length, sequence number or flow status depending on the kind.
//!
//! | PDU | byte 0          | byte 1         | bytes 2..7   |
//! |-----|-----------------|----------------|--------------|
//! | SF  | `0x0L`, L = len | data           | data         |
//! | FF  | `0x1H`          | low 8 len bits | data         |
//! | CF  | `0x2S`, S = SN  | data           | data         |
//! | FC  | `0x3F`, F = FS  | BS             | STmin        |

use crate::frame::Frame;

/// N_PDU kind, from the high nibble of the N_PCI byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PduType {
    SingleFrame,
    FirstFrame,
    ConsecutiveFrame,
    FlowControl,
}

impl PduType {
    /// Classify a frame. `None` for the twelve unassigned nibble values,
    /// which Table 18 of the ISO document says to ignore.
    pub fn of_frame<F: Frame>(frame: &F, pci_offset: usize) -> Option<PduType> {
        match frame.byte(pci_offset) >> 4 {
            0 => Some(PduType::SingleFrame),
            1 => Some(PduType::FirstFrame),
            2 => Some(PduType::ConsecutiveFrame),
            3 => Some(PduType::FlowControl),
            _ => None,
        }
    }

    pub(crate) fn high_nibble(self) -> u8 {
        match self {
            PduType::SingleFrame => 0x00,
            PduType::FirstFrame => 0x10,
            PduType::ConsecutiveFrame => 0x20,
            PduType::FlowControl => 0x30,
        }
    }
}

/// FS field of a flow control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlowStatus {
    ContinueToSend,
    Wait,
    Overflow,
}

impl FlowStatus {
    pub fn from_nibble(nibble: u8) -> Option<FlowStatus> {
        match nibble {
            0 => Some(FlowStatus::ContinueToSend),
            1 => Some(FlowStatus::Wait),
            2 => Some(FlowStatus::Overflow),
            _ => None,
        }
    }

    pub(crate) fn nibble(self) -> u8 {
        match self {
            FlowStatus::ContinueToSend => 0,
            FlowStatus::Wait => 1,
            FlowStatus::Overflow => 2,
        }
    }
}

/// Decoded flow control frame, as handed to the send state machine.
///
/// The status is kept raw so an unassigned FS value can be reported as
/// `InvalidFs` instead of being silently mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlowControl {
    pub status: u8,
    pub block_size: u8,
    pub separation_time: u8,
}

impl FlowControl {
    pub fn of_frame<F: Frame>(frame: &F, pci_offset: usize) -> FlowControl {
        FlowControl {
            status: frame.byte(pci_offset) & 0x0F,
            block_size: frame.byte(pci_offset + 1),
            separation_time: frame.byte(pci_offset + 2),
        }
    }
}

/// SF data length: the low N_PCI nibble.
pub fn single_frame_len<F: Frame>(frame: &F, pci_offset: usize) -> usize {
    (frame.byte(pci_offset) & 0x0F) as usize
}

/// FF declared message length: 12 bits across the N_PCI byte and the next.
pub fn first_frame_len<F: Frame>(frame: &F, pci_offset: usize) -> usize {
    ((frame.byte(pci_offset) as usize & 0x0F) << 8) | frame.byte(pci_offset + 1) as usize
}

/// CF sequence number: the low N_PCI nibble.
pub fn sequence_number<F: Frame>(frame: &F, pci_offset: usize) -> u8 {
    frame.byte(pci_offset) & 0x0F
}

/// STmin wire value to microseconds (6.5.5.5 of the ISO document).
///
/// 0x00..=0x7F encode whole milliseconds and 0xF1..=0xF9 encode 100 µs
/// steps; everything else is reserved and read as the 0x7F maximum
/// (6.5.5.6 error handling).
pub fn separation_time_micros(raw: u8) -> u32 {
    match raw {
        0x00..=0x7F => raw as u32 * 1000,
        0xF1..=0xF9 => (raw as u32 - 0xF0) * 100,
        _ => 0x7F * 1000,
    }
}

/// Result codes delivered through indication and confirmation callbacks.
///
/// These mirror the N_USData result parameters of the ISO service
/// interface, plus one implementation-defined code for receive-table
/// exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TpResult {
    /// N_OK: service completed successfully.
    Ok,
    /// N_TIMEOUT_A: a single frame could not be put on the wire within the
    /// N_As/N_Ar budget (the output sink reported failure).
    TimeoutA,
    /// N_TIMEOUT_Bs: the peer's flow control frame never arrived.
    TimeoutBs,
    /// N_TIMEOUT_Cr: the next consecutive frame never arrived.
    TimeoutCr,
    /// N_WRONG_SN: a consecutive frame carried an unexpected sequence number.
    WrongSn,
    /// N_INVALID_FS: a flow control frame carried an unassigned status.
    InvalidFs,
    /// N_UNEXP_PDU: a single or first frame arrived while a reception from
    /// the same peer was in progress.
    UnexpectedPdu,
    /// N_WFT_OVRN: too many consecutive WAIT flow control frames.
    WaitFrameOverrun,
    /// N_BUFFER_OVFLW: the peer answered the first frame with FS = OVFLW.
    BufferOverflow,
    /// N_ERROR: generic failure, e.g. a flow control frame could not be sent.
    Error,
    /// Receive table full; the reception could not be opened.
    MessageNumMax,
}

/// Instance-level status codes passed to the fault handler.
///
/// Distinct from [`TpResult`]: faults are not tied to one message and never
/// tear the instance down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Fault {
    /// An address could not be encoded into a frame identifier.
    AddressEncode,
    /// An incoming frame identifier could not be decoded. The engine treats
    /// undecodable frames as foreign bus traffic and drops them without
    /// raising this; it is available to platform bindings that want to
    /// report decode problems of their own.
    AddressDecode,
    /// The output sink rejected a frame outside of a tracked transfer.
    SendFailed,
}

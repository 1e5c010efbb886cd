// Shared constants and runtime knobs for the transport layer.

// --- Link layer ---

/// Payload bytes in a classic CAN 2.0 frame.
pub const CAN_MAX_DLEN: usize = 8;

// --- Timing parameters (6.7.1 and 6.7.2 of ISO 15765-2:2004) ---
//
// The ISO bound for all four is 1000 ms; the library budgets 1500 ms to leave
// headroom for slow links, matching the N_As/N_Ar contract of the output sink.

/// Budget for transmitting one frame (N_As / N_Ar).
pub const N_A_TIMEOUT_MS: u32 = 1500;

/// Budget for a flow control frame to arrive after FF or a full block (N_Bs).
pub const N_BS_TIMEOUT_MS: u32 = 1500;

/// Budget between consecutive frames of one message (N_Cr).
pub const N_CR_TIMEOUT_MS: u32 = 1500;

// --- Protocol limits ---

/// Hard cap of the 12-bit FF length field; no message can be longer.
pub const MAX_MESSAGE_SIZE: usize = 4095;

/// Consecutive-frame sequence numbers wrap at 16; the first CF carries 1.
pub const SEQUENCE_NUMBER_MODULUS: u8 = 16;

/// Consecutive WAIT flow-control frames tolerated before the transfer is
/// aborted with a wait-frame overrun (N_WFTmax, 6.6 of the ISO document).
pub const DEFAULT_MAX_WAIT_FRAMES: u8 = 10;

/// Runtime parameters fixed at construction.
///
/// `block_size` and `separation_time` are advertised to the peer in every
/// flow control frame this instance emits while receiving; they do not affect
/// sending (the peer's FC governs that side).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransportConfig {
    /// BS advertised to the peer: CFs accepted between FCs, 0 = no limit.
    pub block_size: u8,
    /// STmin advertised to the peer, raw wire encoding (6.5.5.5).
    pub separation_time: u8,
    /// Abort threshold for consecutive FC WAIT frames.
    pub max_wait_frames: u8,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            block_size: 0,
            separation_time: 0,
            max_wait_frames: DEFAULT_MAX_WAIT_FRAMES,
        }
    }
}

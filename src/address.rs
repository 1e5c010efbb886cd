//! ISO-TP addressing.
//!
//! An [`Address`] is the address information (N_AI) of one peer pair, kept at
//! a slightly higher level than the raw CAN identifiers: the same value
//! object serves all seven addressing schemes of the ISO document, and an
//! [`AddressingMode`] selected once at construction converts between the
//! address and concrete frame ids (plus, for some schemes, the first data
//! byte of every frame).
//!
//! Which fields are meaningful depends on the mode:
//!
//! - `Normal11` / `Normal29` — `rx_id`/`tx_id` carry plain identifiers.
//! - `NormalFixed29` — `source_address`/`target_address` are packed into a
//!   fixed 29-bit identifier layout (`0x18DAttss` physical, `0x18DBttss`
//!   functional).
//! - `Extended11` / `Extended29` — identifier plus `target_address` in the
//!   first data byte.
//! - `Mixed11` / `Mixed29` — remote diagnostics; the first data byte carries
//!   the `network_address_extension`, and the 29-bit flavour packs
//!   source/target like NormalFixed29 under the `0x18CE`/`0x18CD` prefixes.

use thiserror::Error;

use crate::frame::Frame;

const MAX_11_BIT_ID: u32 = 0x7FF;
const MAX_29_BIT_ID: u32 = 0x1FFF_FFFF;

const NORMAL_FIXED_PHYSICAL: u32 = 0x18DA;
const NORMAL_FIXED_FUNCTIONAL: u32 = 0x18DB;
const MIXED_PHYSICAL: u32 = 0x18CE;
const MIXED_FUNCTIONAL: u32 = 0x18CD;

/// Mtype from 5.3.1 of the ISO document.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageType {
    /// N_SA, N_TA and N_TAtype make up the address.
    #[default]
    Diagnostics,
    /// Additionally carries the network address extension (N_AE).
    RemoteDiagnostics,
}

/// N_TAtype from 5.3.2.4: 1:1 exchange or 1:n functional addressing.
///
/// Functional addressing is only valid for single-frame traffic; the
/// distinction is encoded in the identifier for the fixed 29-bit schemes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TargetAddressType {
    #[default]
    Physical,
    Functional,
}

/// Address information (N_AI) describing one peer pair.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    /// Identifier this node listens on (11 or 29 bit, mode dependent).
    pub rx_id: u32,
    /// Identifier this node transmits on.
    pub tx_id: u32,
    /// N_SA, the network sender address (5.3.2.2).
    pub source_address: u8,
    /// N_TA, the network target address (5.3.2.3).
    pub target_address: u8,
    /// N_AE, used by the mixed addressing schemes (5.3.2.5).
    pub network_address_extension: u8,
    pub message_type: MessageType,
    pub target_address_type: TargetAddressType,
}

impl Address {
    /// Address for the normal (plain identifier) schemes.
    pub fn normal(rx_id: u32, tx_id: u32) -> Self {
        Address {
            rx_id,
            tx_id,
            ..Default::default()
        }
    }

    /// Address for `NormalFixed29`: identifiers are derived from the
    /// source/target pair.
    pub fn normal_fixed(source_address: u8, target_address: u8) -> Self {
        Address {
            source_address,
            target_address,
            ..Default::default()
        }
    }

    /// Address for the extended schemes: identifier plus target byte.
    pub fn extended(rx_id: u32, tx_id: u32, source_address: u8, target_address: u8) -> Self {
        Address {
            rx_id,
            tx_id,
            source_address,
            target_address,
            ..Default::default()
        }
    }

    /// Address for `Mixed11` remote diagnostics.
    pub fn mixed(rx_id: u32, tx_id: u32, network_address_extension: u8) -> Self {
        Address {
            rx_id,
            tx_id,
            network_address_extension,
            message_type: MessageType::RemoteDiagnostics,
            ..Default::default()
        }
    }

    /// Address for `Mixed29` remote diagnostics.
    pub fn mixed_fixed(source_address: u8, target_address: u8, network_address_extension: u8) -> Self {
        Address {
            source_address,
            target_address,
            network_address_extension,
            message_type: MessageType::RemoteDiagnostics,
            ..Default::default()
        }
    }

    /// Same address with a different N_TAtype.
    pub fn with_target_address_type(mut self, target_address_type: TargetAddressType) -> Self {
        self.target_address_type = target_address_type;
        self
    }
}

/// The address could not be encoded into a CAN identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressError {
    #[error("identifier does not fit the addressing mode")]
    IdOutOfRange,
}

/// The seven addressing schemes of ISO 15765-2, chosen once per instance.
///
/// Every scheme provides three pure operations: encoding an [`Address`] into
/// an outgoing frame, decoding the peer address from an incoming frame
/// (`None` means the frame is not valid under the scheme and is silently
/// ignored), and deciding whether a decoded peer address targets us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressingMode {
    Normal11,
    Normal29,
    NormalFixed29,
    Extended11,
    Extended29,
    Mixed11,
    Mixed29,
}

impl AddressingMode {
    /// Whether the scheme claims the first data byte of every frame.
    pub fn uses_extended_byte(self) -> bool {
        matches!(
            self,
            AddressingMode::Extended11 | AddressingMode::Extended29 | AddressingMode::Mixed11 | AddressingMode::Mixed29
        )
    }

    /// Offset of the N_PCI byte within the frame payload: 0, or 1 when the
    /// first byte belongs to the address.
    pub fn pci_offset(self) -> usize {
        self.uses_extended_byte() as usize
    }

    /// Store the address of the remote party into an outgoing frame.
    pub fn to_frame<F: Frame>(self, address: &Address, frame: &mut F) -> Result<(), AddressError> {
        match self {
            AddressingMode::Normal11 => {
                encode_plain_id(address.tx_id, MAX_11_BIT_ID, false, frame)?;
            }
            AddressingMode::Normal29 => {
                encode_plain_id(address.tx_id, MAX_29_BIT_ID, true, frame)?;
            }
            AddressingMode::NormalFixed29 => {
                let prefix = match address.target_address_type {
                    TargetAddressType::Physical => NORMAL_FIXED_PHYSICAL,
                    TargetAddressType::Functional => NORMAL_FIXED_FUNCTIONAL,
                };
                frame.set_id(packed_29_bit_id(prefix, address));
                frame.set_extended(true);
            }
            AddressingMode::Extended11 => {
                encode_plain_id(address.tx_id, MAX_11_BIT_ID, false, frame)?;
                set_address_byte(frame, address.target_address);
            }
            AddressingMode::Extended29 => {
                encode_plain_id(address.tx_id, MAX_29_BIT_ID, true, frame)?;
                set_address_byte(frame, address.target_address);
            }
            AddressingMode::Mixed11 => {
                encode_plain_id(address.tx_id, MAX_11_BIT_ID, false, frame)?;
                set_address_byte(frame, address.network_address_extension);
            }
            AddressingMode::Mixed29 => {
                let prefix = match address.target_address_type {
                    TargetAddressType::Physical => MIXED_PHYSICAL,
                    TargetAddressType::Functional => MIXED_FUNCTIONAL,
                };
                frame.set_id(packed_29_bit_id(prefix, address));
                frame.set_extended(true);
                set_address_byte(frame, address.network_address_extension);
            }
        }

        Ok(())
    }

    /// Recover the address the remote party used to send `frame` to us.
    pub fn from_frame<F: Frame>(self, frame: &F) -> Option<Address> {
        match self {
            AddressingMode::Normal11 => {
                let id = decode_plain_id(frame, MAX_11_BIT_ID, false)?;
                Some(Address::normal(0, id))
            }
            AddressingMode::Normal29 => {
                let id = decode_plain_id(frame, MAX_29_BIT_ID, true)?;
                Some(Address::normal(0, id))
            }
            AddressingMode::NormalFixed29 => {
                let (address, tat) = unpack_29_bit_id(frame, NORMAL_FIXED_PHYSICAL, NORMAL_FIXED_FUNCTIONAL)?;
                Some(address.with_target_address_type(tat))
            }
            AddressingMode::Extended11 => {
                let id = decode_plain_id(frame, MAX_11_BIT_ID, false)?;
                let target = address_byte(frame)?;
                Some(Address::extended(0, id, 0, target))
            }
            AddressingMode::Extended29 => {
                let id = decode_plain_id(frame, MAX_29_BIT_ID, true)?;
                let target = address_byte(frame)?;
                Some(Address::extended(0, id, 0, target))
            }
            AddressingMode::Mixed11 => {
                let id = decode_plain_id(frame, MAX_11_BIT_ID, false)?;
                let extension = address_byte(frame)?;
                Some(Address::mixed(0, id, extension))
            }
            AddressingMode::Mixed29 => {
                let (address, tat) = unpack_29_bit_id(frame, MIXED_PHYSICAL, MIXED_FUNCTIONAL)?;
                let extension = address_byte(frame)?;
                Some(Address {
                    network_address_extension: extension,
                    message_type: MessageType::RemoteDiagnostics,
                    ..address.with_target_address_type(tat)
                })
            }
        }
    }

    /// Whether a frame decoded as `peer` is addressed to `ours`.
    pub fn matches(self, peer: &Address, ours: &Address) -> bool {
        match self {
            AddressingMode::Normal11 | AddressingMode::Normal29 => peer.tx_id == ours.rx_id,
            AddressingMode::NormalFixed29 => peer.target_address == ours.source_address,
            AddressingMode::Extended11 | AddressingMode::Extended29 => {
                peer.tx_id == ours.rx_id && peer.target_address == ours.source_address
            }
            AddressingMode::Mixed11 => {
                peer.tx_id == ours.rx_id && peer.network_address_extension == ours.network_address_extension
            }
            AddressingMode::Mixed29 => {
                peer.target_address == ours.source_address
                    && peer.network_address_extension == ours.network_address_extension
            }
        }
    }
}

fn encode_plain_id<F: Frame>(id: u32, max: u32, extended: bool, frame: &mut F) -> Result<(), AddressError> {
    if id > max {
        return Err(AddressError::IdOutOfRange);
    }

    frame.set_id(id);
    frame.set_extended(extended);
    Ok(())
}

fn decode_plain_id<F: Frame>(frame: &F, max: u32, extended: bool) -> Option<u32> {
    if frame.is_extended() != extended || frame.id() > max {
        return None;
    }

    Some(frame.id())
}

/// `PPPP | target << 8 | source` with the scheme prefix in the upper 13 bits.
fn packed_29_bit_id(prefix: u32, address: &Address) -> u32 {
    (prefix << 16) | (address.target_address as u32) << 8 | address.source_address as u32
}

fn unpack_29_bit_id<F: Frame>(frame: &F, physical: u32, functional: u32) -> Option<(Address, TargetAddressType)> {
    if !frame.is_extended() {
        return None;
    }

    let tat = match frame.id() >> 16 {
        p if p == physical => TargetAddressType::Physical,
        p if p == functional => TargetAddressType::Functional,
        _ => return None,
    };

    let source = frame.id() as u8;
    let target = (frame.id() >> 8) as u8;
    Some((Address::normal_fixed(source, target), tat))
}

/// First data byte, used as address material by the extended and mixed
/// schemes. Frames without it are undecodable.
fn address_byte<F: Frame>(frame: &F) -> Option<u8> {
    if frame.dlc() < 1 {
        return None;
    }

    Some(frame.byte(0))
}

fn set_address_byte<F: Frame>(frame: &mut F, value: u8) {
    if frame.dlc() < 1 {
        frame.set_dlc(1);
    }

    frame.set_byte(0, value);
}

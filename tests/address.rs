//! Encoding, decoding and matching across the seven addressing schemes.

use cantp::{Address, AddressError, AddressingMode, CanFrame, MessageType, TargetAddressType};

fn encode(mode: AddressingMode, address: &Address) -> Result<CanFrame, AddressError> {
    let mut frame = CanFrame::default();
    mode.to_frame(address, &mut frame)?;
    Ok(frame)
}

#[test]
fn normal11() {
    let mode = AddressingMode::Normal11;

    let frame = encode(mode, &Address::normal(0x7E8, 0x7E0)).unwrap();
    assert_eq!(frame.id, 0x7E0);
    assert!(!frame.extended);

    assert_eq!(
        encode(mode, &Address::normal(0, 0x800)),
        Err(AddressError::IdOutOfRange)
    );

    let peer = mode.from_frame(&CanFrame::new(0x7E8, false, &[0x01, 0x00])).unwrap();
    assert_eq!(peer.tx_id, 0x7E8);
    assert!(mode.matches(&peer, &Address::normal(0x7E8, 0x7E0)));
    assert!(!mode.matches(&peer, &Address::normal(0x7E9, 0x7E0)));

    // an extended frame never decodes under 11-bit normal addressing
    assert!(mode.from_frame(&CanFrame::new(0x7E8, true, &[0x01, 0x00])).is_none());

    assert!(!mode.uses_extended_byte());
    assert_eq!(mode.pci_offset(), 0);
}

#[test]
fn normal29() {
    let mode = AddressingMode::Normal29;

    let frame = encode(mode, &Address::normal(0x18DAF110, 0x18DA10F1)).unwrap();
    assert_eq!(frame.id, 0x18DA10F1);
    assert!(frame.extended);

    assert_eq!(
        encode(mode, &Address::normal(0, 0x2000_0000)),
        Err(AddressError::IdOutOfRange)
    );

    assert!(mode.from_frame(&CanFrame::new(0x18DAF110, false, &[0x01, 0x00])).is_none());

    let peer = mode.from_frame(&CanFrame::new(0x18DAF110, true, &[0x01, 0x00])).unwrap();
    assert!(mode.matches(&peer, &Address::normal(0x18DAF110, 0x18DA10F1)));
}

#[test]
fn normal_fixed29() {
    let mode = AddressingMode::NormalFixed29;

    let physical = encode(mode, &Address::normal_fixed(0x12, 0x89)).unwrap();
    assert_eq!(physical.id, 0x18DA8912);
    assert!(physical.extended);

    let functional = encode(
        mode,
        &Address::normal_fixed(0x12, 0x89).with_target_address_type(TargetAddressType::Functional),
    )
    .unwrap();
    assert_eq!(functional.id, 0x18DB8912);

    let peer = mode.from_frame(&CanFrame::new(0x18DA1289, true, &[0x01, 0x00])).unwrap();
    assert_eq!(peer.source_address, 0x89);
    assert_eq!(peer.target_address, 0x12);
    assert_eq!(peer.target_address_type, TargetAddressType::Physical);

    let peer = mode.from_frame(&CanFrame::new(0x18DB1289, true, &[0x01, 0x00])).unwrap();
    assert_eq!(peer.target_address_type, TargetAddressType::Functional);

    // a frame is for us when its target is our source address
    assert!(mode.matches(&peer, &Address::normal_fixed(0x12, 0x89)));
    assert!(!mode.matches(&peer, &Address::normal_fixed(0x13, 0x89)));

    // foreign prefixes and standard frames do not decode
    assert!(mode.from_frame(&CanFrame::new(0x18DC1289, true, &[0x01, 0x00])).is_none());
    assert!(mode.from_frame(&CanFrame::new(0x7E8, false, &[0x01, 0x00])).is_none());
}

#[test]
fn extended11() {
    let mode = AddressingMode::Extended11;
    assert!(mode.uses_extended_byte());
    assert_eq!(mode.pci_offset(), 1);

    let frame = encode(mode, &Address::extended(0x600, 0x601, 0x55, 0x66)).unwrap();
    assert_eq!(frame.id, 0x601);
    assert!(!frame.extended);
    assert_eq!(frame.data[0], 0x66);
    assert!(frame.dlc >= 1);

    let peer = mode
        .from_frame(&CanFrame::new(0x600, false, &[0x55, 0x02, 0x01, 0x02]))
        .unwrap();
    assert_eq!(peer.tx_id, 0x600);
    assert_eq!(peer.target_address, 0x55);

    let ours = Address::extended(0x600, 0x601, 0x55, 0x66);
    assert!(mode.matches(&peer, &ours));
    // right id, wrong node address in byte 0
    let stranger = mode
        .from_frame(&CanFrame::new(0x600, false, &[0x54, 0x02, 0x01, 0x02]))
        .unwrap();
    assert!(!mode.matches(&stranger, &ours));

    // no data byte, nothing to decode the node address from
    assert!(mode.from_frame(&CanFrame::new(0x600, false, &[])).is_none());
}

#[test]
fn extended29() {
    let mode = AddressingMode::Extended29;

    let frame = encode(mode, &Address::extended(0x18DA_0001, 0x18DA_0002, 0x55, 0x66)).unwrap();
    assert_eq!(frame.id, 0x18DA_0002);
    assert!(frame.extended);
    assert_eq!(frame.data[0], 0x66);

    assert_eq!(
        encode(mode, &Address::extended(0, 0x2000_0000, 0x55, 0x66)),
        Err(AddressError::IdOutOfRange)
    );

    let peer = mode
        .from_frame(&CanFrame::new(0x18DA_0001, true, &[0x55, 0x01, 0x00]))
        .unwrap();
    assert!(mode.matches(&peer, &Address::extended(0x18DA_0001, 0x18DA_0002, 0x55, 0x66)));
}

#[test]
fn mixed11() {
    let mode = AddressingMode::Mixed11;
    assert!(mode.uses_extended_byte());

    let address = Address::mixed(0x600, 0x601, 0x42);
    assert_eq!(address.message_type, MessageType::RemoteDiagnostics);

    let frame = encode(mode, &address).unwrap();
    assert_eq!(frame.id, 0x601);
    assert_eq!(frame.data[0], 0x42);

    let peer = mode
        .from_frame(&CanFrame::new(0x600, false, &[0x42, 0x01, 0x00]))
        .unwrap();
    assert_eq!(peer.network_address_extension, 0x42);
    assert_eq!(peer.message_type, MessageType::RemoteDiagnostics);

    assert!(mode.matches(&peer, &address));
    // same ids, different network segment
    assert!(!mode.matches(&peer, &Address::mixed(0x600, 0x601, 0x43)));
}

#[test]
fn mixed29() {
    let mode = AddressingMode::Mixed29;
    assert_eq!(mode.pci_offset(), 1);

    let physical = encode(mode, &Address::mixed_fixed(0x12, 0x89, 0x42)).unwrap();
    assert_eq!(physical.id, 0x18CE8912);
    assert!(physical.extended);
    assert_eq!(physical.data[0], 0x42);

    let functional = encode(
        mode,
        &Address::mixed_fixed(0x12, 0x89, 0x42).with_target_address_type(TargetAddressType::Functional),
    )
    .unwrap();
    assert_eq!(functional.id, 0x18CD8912);

    let peer = mode
        .from_frame(&CanFrame::new(0x18CE1289, true, &[0x42, 0x01, 0x00]))
        .unwrap();
    assert_eq!(peer.source_address, 0x89);
    assert_eq!(peer.target_address, 0x12);
    assert_eq!(peer.network_address_extension, 0x42);
    assert_eq!(peer.message_type, MessageType::RemoteDiagnostics);

    assert!(mode.matches(&peer, &Address::mixed_fixed(0x12, 0x89, 0x42)));
    assert!(!mode.matches(&peer, &Address::mixed_fixed(0x12, 0x89, 0x43)));

    // NormalFixed prefixes do not decode as mixed
    assert!(mode.from_frame(&CanFrame::new(0x18DA1289, true, &[0x42, 0x01, 0x00])).is_none());
}

#[test]
fn pci_offset_follows_the_scheme() {
    use AddressingMode::*;

    for (mode, offset) in [
        (Normal11, 0),
        (Normal29, 0),
        (NormalFixed29, 0),
        (Extended11, 1),
        (Extended29, 1),
        (Mixed11, 1),
        (Mixed29, 1),
    ] {
        assert_eq!(mode.pci_offset(), offset, "{mode:?}");
        assert_eq!(mode.uses_extended_byte(), offset == 1, "{mode:?}");
    }
}

#[test]
fn encoders_round_trip_through_a_frame() {
    let cases = [
        (AddressingMode::NormalFixed29, Address::normal_fixed(0x12, 0x89)),
        (AddressingMode::Mixed29, Address::mixed_fixed(0x12, 0x89, 0x42)),
    ];

    for (mode, address) in cases {
        let frame = encode(mode, &address).unwrap();
        let decoded = mode.from_frame(&frame).unwrap();
        // the frame carries the pair as we addressed it
        assert_eq!(decoded.source_address, address.source_address);
        assert_eq!(decoded.target_address, address.target_address);
        assert_eq!(decoded.target_address_type, address.target_address_type);
    }
}

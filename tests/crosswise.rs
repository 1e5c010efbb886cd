//! Two full transport instances wired back to back through in-memory
//! queues, exchanging segmented messages in both directions.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use cantp::{
    Address, AddressingMode, CanFrame, Fault, TpResult, TransportCallback, TransportProtocol,
};

type Wire = Rc<RefCell<VecDeque<CanFrame>>>;
type SharedClock = Rc<Cell<u32>>;

#[derive(Clone, Default)]
struct Inbox(Rc<RefCell<Vec<(Vec<u8>, TpResult)>>>);

impl TransportCallback for Inbox {
    fn indication(&mut self, _address: &Address, data: &[u8], result: TpResult) {
        self.0.borrow_mut().push((data.to_vec(), result));
    }
}

fn node(
    mode: AddressingMode,
    address: Address,
    wire_out: &Wire,
    inbox: &Inbox,
    clock: &SharedClock,
) -> TransportProtocol<CanFrame, impl FnMut(&CanFrame) -> bool, impl Fn() -> u32, Inbox, impl FnMut(Fault)> {
    let out = wire_out.clone();
    let ticks = clock.clone();

    TransportProtocol::new(
        mode,
        address,
        move |frame: &CanFrame| {
            out.borrow_mut().push_back(*frame);
            true
        },
        move || ticks.get(),
        inbox.clone(),
        |_: Fault| {},
    )
}

/// Shuttle frames between both instances until the bus goes quiet, stepping
/// the shared clock one millisecond per round.
fn pump<SA, KA, EA, SB, KB, EB>(
    a: &mut TransportProtocol<CanFrame, SA, KA, Inbox, EA>,
    a_out: &Wire,
    b: &mut TransportProtocol<CanFrame, SB, KB, Inbox, EB>,
    b_out: &Wire,
    clock: &SharedClock,
) where
    SA: cantp::CanSink<CanFrame>,
    KA: cantp::Clock,
    EA: cantp::FaultHandler,
    SB: cantp::CanSink<CanFrame>,
    KB: cantp::Clock,
    EB: cantp::FaultHandler,
{
    for _ in 0..10_000 {
        loop {
            let frame = a_out.borrow_mut().pop_front();
            match frame {
                Some(frame) => b.on_frame(&frame),
                None => break,
            }
        }

        loop {
            let frame = b_out.borrow_mut().pop_front();
            match frame {
                Some(frame) => a.on_frame(&frame),
                None => break,
            }
        }

        a.tick();
        b.tick();
        clock.set(clock.get() + 1);

        if !a.is_sending() && !b.is_sending() && a_out.borrow().is_empty() && b_out.borrow().is_empty() {
            return;
        }
    }

    panic!("exchange did not settle");
}

#[test]
fn crosswise_16b() {
    let clock = SharedClock::default();
    let (a_out, b_out) = (Wire::default(), Wire::default());
    let (a_inbox, b_inbox) = (Inbox::default(), Inbox::default());

    let a_addr = Address::normal_fixed(0x89, 0x12);
    let b_addr = Address::normal_fixed(0x12, 0x89);

    let mut a = node(AddressingMode::NormalFixed29, a_addr, &a_out, &a_inbox, &clock);
    let mut b = node(AddressingMode::NormalFixed29, b_addr, &b_out, &b_inbox, &clock);

    let message: Vec<u8> = (0..16).collect();
    b.send(b_addr, &message).unwrap();

    pump(&mut a, &a_out, &mut b, &b_out, &clock);

    let delivered = a_inbox.0.borrow();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, message);
    assert_eq!(delivered[0].1, TpResult::Ok);
    assert!(b_inbox.0.borrow().is_empty());
}

#[test]
fn crosswise_full_length_both_ways() {
    let clock = SharedClock::default();
    let (a_out, b_out) = (Wire::default(), Wire::default());
    let (a_inbox, b_inbox) = (Inbox::default(), Inbox::default());

    let a_addr = Address::normal(0x710, 0x711);
    let b_addr = Address::normal(0x711, 0x710);

    let mut a = node(AddressingMode::Normal11, a_addr, &a_out, &a_inbox, &clock);
    let mut b = node(AddressingMode::Normal11, b_addr, &b_out, &b_inbox, &clock);

    let a_message: Vec<u8> = (0..4095usize).map(|i| i as u8).collect();
    a.send(a_addr, &a_message).unwrap();
    pump(&mut a, &a_out, &mut b, &b_out, &clock);

    let b_message: Vec<u8> = (0..4095usize).map(|i| (i as u8).wrapping_mul(3)).collect();
    b.send(b_addr, &b_message).unwrap();
    pump(&mut a, &a_out, &mut b, &b_out, &clock);

    assert_eq!(b_inbox.0.borrow().as_slice(), &[(a_message, TpResult::Ok)]);
    assert_eq!(a_inbox.0.borrow().as_slice(), &[(b_message, TpResult::Ok)]);
}

#[test]
fn every_size_round_trips_across_modes() {
    let setups = [
        (
            AddressingMode::Normal11,
            Address::normal(0x710, 0x711),
            Address::normal(0x711, 0x710),
        ),
        (
            AddressingMode::Extended11,
            Address::extended(0x600, 0x601, 0x55, 0x66),
            Address::extended(0x601, 0x600, 0x66, 0x55),
        ),
        (
            AddressingMode::Mixed29,
            Address::mixed_fixed(0x89, 0x12, 0x42),
            Address::mixed_fixed(0x12, 0x89, 0x42),
        ),
    ];

    for (mode, a_addr, b_addr) in setups {
        for size in 1..=64usize {
            let clock = SharedClock::default();
            let (a_out, b_out) = (Wire::default(), Wire::default());
            let (a_inbox, b_inbox) = (Inbox::default(), Inbox::default());

            let mut a = node(mode, a_addr, &a_out, &a_inbox, &clock);
            let mut b = node(mode, b_addr, &b_out, &b_inbox, &clock);

            let message: Vec<u8> = (0..size).map(|i| (i * 7) as u8).collect();
            b.send(b_addr, &message).unwrap();
            pump(&mut a, &a_out, &mut b, &b_out, &clock);

            let delivered = a_inbox.0.borrow();
            assert_eq!(delivered.len(), 1, "size {size} under {mode:?}");
            assert_eq!(delivered[0].0, message, "size {size} under {mode:?}");
            assert_eq!(delivered[0].1, TpResult::Ok);
            assert!(b_inbox.0.borrow().is_empty());
        }
    }
}

#[test]
fn bystander_node_sees_nothing() {
    let clock = SharedClock::default();
    let (a_out, b_out, c_out) = (Wire::default(), Wire::default(), Wire::default());
    let (a_inbox, b_inbox, c_inbox) = (Inbox::default(), Inbox::default(), Inbox::default());

    let a_addr = Address::normal_fixed(0x89, 0x12);
    let b_addr = Address::normal_fixed(0x12, 0x89);
    // same bus, different node address
    let c_addr = Address::normal_fixed(0x33, 0x12);

    let mut a = node(AddressingMode::NormalFixed29, a_addr, &a_out, &a_inbox, &clock);
    let mut b = node(AddressingMode::NormalFixed29, b_addr, &b_out, &b_inbox, &clock);
    let mut c = node(AddressingMode::NormalFixed29, c_addr, &c_out, &c_inbox, &clock);

    let message: Vec<u8> = (0..24).collect();
    b.send(b_addr, &message).unwrap();

    for _ in 0..100 {
        loop {
            let frame = b_out.borrow_mut().pop_front();
            match frame {
                // C snoops every frame B puts on the bus
                Some(frame) => {
                    c.on_frame(&frame);
                    a.on_frame(&frame);
                }
                None => break,
            }
        }

        loop {
            let frame = a_out.borrow_mut().pop_front();
            match frame {
                Some(frame) => {
                    c.on_frame(&frame);
                    b.on_frame(&frame);
                }
                None => break,
            }
        }

        a.tick();
        b.tick();
        c.tick();
        clock.set(clock.get() + 1);
    }

    assert_eq!(a_inbox.0.borrow().len(), 1);
    assert!(c_inbox.0.borrow().is_empty());
    assert!(c_out.borrow().is_empty());
}

//! Two in-memory transport instances exchanging a segmented message.
//!
//! Run with `cargo run --example crosswise --features std`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use cantp::{
    Address, AddressingMode, AdvancedCallback, CanFrame, Fault, TpResult, TransportProtocol,
};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let started = Instant::now();
    let clock = move || started.elapsed().as_millis() as u32;

    let a_to_b: Rc<RefCell<VecDeque<CanFrame>>> = Rc::default();
    let b_to_a: Rc<RefCell<VecDeque<CanFrame>>> = Rc::default();

    let a_addr = Address::normal_fixed(0x89, 0x12);
    let b_addr = Address::normal_fixed(0x12, 0x89);

    let a_out = a_to_b.clone();
    let mut a = TransportProtocol::<CanFrame, _, _, _, _>::new(
        AddressingMode::NormalFixed29,
        a_addr,
        move |frame: &CanFrame| {
            a_out.borrow_mut().push_back(*frame);
            true
        },
        clock,
        AdvancedCallback(|address: &Address, data: &[u8], result: TpResult| {
            println!(
                "A <- node {:#04x}: {:?} ({} bytes: {:02x?})",
                address.source_address,
                result,
                data.len(),
                data
            );
        }),
        |fault: Fault| eprintln!("A fault: {fault:?}"),
    );

    let b_out = b_to_a.clone();
    let mut b = TransportProtocol::<CanFrame, _, _, _, _>::new(
        AddressingMode::NormalFixed29,
        b_addr,
        move |frame: &CanFrame| {
            b_out.borrow_mut().push_back(*frame);
            true
        },
        clock,
        AdvancedCallback(|_: &Address, _: &[u8], result: TpResult| {
            println!("B indication: {result:?}");
        }),
        |fault: Fault| eprintln!("B fault: {fault:?}"),
    );

    // pace B so the exchange is visible frame by frame
    a.set_block_size(4);
    a.set_separation_time(0x05);

    let message: Vec<u8> = (0..40).collect();
    b.send(b_addr, &message).expect("transfer armed");

    while b.is_sending() || !a_to_b.borrow().is_empty() || !b_to_a.borrow().is_empty() {
        loop {
            let frame = b_to_a.borrow_mut().pop_front();
            match frame {
                Some(frame) => a.on_frame(&frame),
                None => break,
            }
        }

        loop {
            let frame = a_to_b.borrow_mut().pop_front();
            match frame {
                Some(frame) => b.on_frame(&frame),
                None => break,
            }
        }

        a.tick();
        b.tick();
    }
}

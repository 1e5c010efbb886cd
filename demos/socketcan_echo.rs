//! Receive ISO-TP messages from a CAN interface and echo them back.
//!
//! Run with `cargo run --example socketcan_echo --features linux-socketcan -- vcan0`,
//! then exercise it e.g. with `isotpsend`/`isotprecv` from can-utils.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use cantp::linux::{millis, CanSocket};
use cantp::{
    Address, AddressingMode, CanFrame, Fault, SimpleCallback, TransportProtocol,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let interface = std::env::args().nth(1).unwrap_or_else(|| "vcan0".into());
    let socket = CanSocket::open(&interface)?;
    socket.set_read_timeout(Duration::from_millis(10))?;

    let tx_socket = socket.try_clone()?;
    let pending: Rc<RefCell<Vec<Vec<u8>>>> = Rc::default();
    let inbox = pending.clone();

    let mut tp: TransportProtocol<CanFrame, _, _, _, _> = TransportProtocol::new(
        AddressingMode::Normal11,
        Address::normal(0x7E0, 0x7E8),
        move |frame: &CanFrame| tx_socket.write(frame).is_ok(),
        millis,
        SimpleCallback(move |message: &[u8]| {
            println!("received {} bytes", message.len());
            inbox.borrow_mut().push(message.to_vec());
        }),
        |fault: Fault| eprintln!("fault: {fault:?}"),
    );

    println!("echoing ISO-TP on {interface} (rx 0x7E0, tx 0x7E8)");

    loop {
        if let Ok(frame) = socket.read() {
            tp.on_frame(&frame);
        }

        if !tp.is_sending() {
            let queued = pending.borrow_mut().pop();
            if let Some(message) = queued {
                tp.send(Address::normal(0x7E0, 0x7E8), &message)?;
            }
        }

        tp.tick();
    }
}

//! Seams to the platform: frame output and fault reporting.

use crate::protocol::Fault;

/// Output side of the CAN driver: transmit one fully-populated frame.
///
/// The return value reports link-layer success. A `false` must also be
/// returned when the driver internally detects that the N_As/N_Ar budget
/// (1500 ms here, 1000 ms in the ISO document) was exceeded; the transport
/// layer treats any failure as `TimeoutA` for the affected transfer.
///
/// Implemented for any `FnMut(&F) -> bool`.
pub trait CanSink<F> {
    fn transmit(&mut self, frame: &F) -> bool;
}

impl<F, T: FnMut(&F) -> bool> CanSink<F> for T {
    fn transmit(&mut self, frame: &F) -> bool {
        self(frame)
    }
}

/// Receiver for instance-level status codes.
///
/// Faults are advisory: the transport instance keeps running after every one
/// of them. Implemented for any `FnMut(Fault)`; use `|_| {}` to ignore.
pub trait FaultHandler {
    fn fault(&mut self, fault: Fault);
}

impl<T: FnMut(Fault)> FaultHandler for T {
    fn fault(&mut self, fault: Fault) {
        self(fault)
    }
}

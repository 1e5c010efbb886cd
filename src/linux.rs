//! Raw SocketCAN bridge for hosted use.
//!
//! The Linux kernel exposes CAN interfaces through a network-like API; this
//! module wraps a raw `AF_CAN` socket just far enough to shuttle frames in
//! and out of the transport engine without wrestling libc calls. Wiring it
//! up is a few lines:
//!
//! ```no_run
//! use cantp::linux::CanSocket;
//! use cantp::{Address, AddressingMode, CanFrame, SimpleCallback, TransportProtocol};
//!
//! # fn main() -> Result<(), cantp::linux::OpenError> {
//! let socket = CanSocket::open("can0")?;
//! socket.set_nonblocking()?;
//!
//! let tx = socket.try_clone()?;
//! let mut tp: TransportProtocol<CanFrame, _, _, _, _> = TransportProtocol::new(
//!     AddressingMode::Normal11,
//!     Address::normal(0x7E8, 0x7E0),
//!     move |frame: &CanFrame| tx.write(frame).is_ok(),
//!     cantp::linux::millis,
//!     SimpleCallback(|message: &[u8]| println!("{} bytes", message.len())),
//!     |_fault: cantp::Fault| {},
//! );
//!
//! loop {
//!     if let Ok(frame) = socket.read() {
//!         tp.on_frame(&frame);
//!     }
//!     tp.tick();
//! }
//! # }
//! ```

use std::mem::size_of;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use libc::{c_int, c_short, c_void};
use thiserror::Error;

use crate::frame::CanFrame;

// can.h constants not covered by libc
const AF_CAN: c_int = 29;
const PF_CAN: c_int = 29;
const CAN_RAW: c_int = 1;

/// Extended-frame-format flag in the kernel id word.
const EFF_FLAG: u32 = 0x8000_0000;
/// Remote transmission request flag.
const RTR_FLAG: u32 = 0x4000_0000;
/// Error frame flag.
const ERR_FLAG: u32 = 0x2000_0000;
/// Valid bits of a standard identifier.
const SFF_MASK: u32 = 0x0000_07FF;
/// Valid bits of an extended identifier.
const EFF_MASK: u32 = 0x1FFF_FFFF;

/// The socket could not be opened and bound to the interface.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("CAN interface could not be found")]
    Lookup(#[source] nix::Error),
    #[error("failed to set up the CAN socket")]
    Io(#[from] std::io::Error),
}

#[repr(C, align(8))]
struct CanAddr {
    af_can: c_short,
    if_index: c_int,
    rx_id: u32,
    tx_id: u32,
}

/// Kernel `can_frame` layout, kept bit-compatible so frames can be read and
/// written in one syscall each.
#[repr(C, align(8))]
#[derive(Default, Clone, Copy)]
struct KernelFrame {
    can_id: u32,
    can_dlc: u8,
    pad: u8,
    res0: u8,
    res1: u8,
    data: [u8; 8],
}

/// A raw CAN socket bound to one interface.
///
/// Reading and writing translate between the kernel frame layout (flags in
/// the id word) and [`CanFrame`]. Error and RTR frames coming off the wire
/// are surfaced as `WouldBlock`-style empty reads since the transport layer
/// has no use for them.
pub struct CanSocket {
    fd: RawFd,
}

impl CanSocket {
    pub fn open(interface: &str) -> Result<Self, OpenError> {
        let if_index = nix::net::if_::if_nametoindex(interface).map_err(OpenError::Lookup)?;
        let fd = unsafe { libc::socket(PF_CAN, libc::SOCK_RAW, CAN_RAW) };

        if fd == -1 {
            return Err(std::io::Error::last_os_error().into());
        }

        let addr = CanAddr {
            af_can: AF_CAN as c_short,
            if_index: if_index as c_int,
            rx_id: 0,
            tx_id: 0,
        };

        let bound = unsafe {
            libc::bind(
                fd,
                &addr as *const CanAddr as *const libc::sockaddr,
                size_of::<CanAddr>() as u32,
            )
        };

        if bound == -1 {
            let error = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(error.into());
        }

        Ok(CanSocket { fd })
    }

    /// A second handle to the same socket, e.g. to move into the transport
    /// engine's output sink while the original keeps reading.
    pub fn try_clone(&self) -> Result<Self, OpenError> {
        let fd = unsafe { libc::dup(self.fd) };

        if fd == -1 {
            return Err(std::io::Error::last_os_error().into());
        }

        Ok(CanSocket { fd })
    }

    pub fn set_nonblocking(&self) -> Result<(), OpenError> {
        let flags = unsafe { libc::fcntl(self.fd, libc::F_GETFL) };

        if flags == -1 {
            return Err(std::io::Error::last_os_error().into());
        }

        let result = unsafe { libc::fcntl(self.fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };

        if result == -1 {
            return Err(std::io::Error::last_os_error().into());
        }

        Ok(())
    }

    /// Bound the time one `read` may wait for a frame.
    pub fn set_read_timeout(&self, timeout: Duration) -> std::io::Result<()> {
        let tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };

        let result = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &tv as *const libc::timeval as *const c_void,
                size_of::<libc::timeval>() as u32,
            )
        };

        if result != 0 {
            return Err(std::io::Error::last_os_error());
        }

        Ok(())
    }

    pub fn read(&self) -> std::io::Result<CanFrame> {
        let mut raw = KernelFrame::default();

        let count = unsafe {
            libc::read(
                self.fd,
                &mut raw as *mut KernelFrame as *mut c_void,
                size_of::<KernelFrame>(),
            )
        };

        if count as usize != size_of::<KernelFrame>() {
            return Err(std::io::Error::last_os_error());
        }

        if raw.can_id & (ERR_FLAG | RTR_FLAG) != 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::WouldBlock));
        }

        let extended = raw.can_id & EFF_FLAG != 0;
        let id = raw.can_id & if extended { EFF_MASK } else { SFF_MASK };

        Ok(CanFrame {
            id,
            extended,
            dlc: raw.can_dlc.min(8),
            data: raw.data,
        })
    }

    pub fn write(&self, frame: &CanFrame) -> std::io::Result<()> {
        let mut can_id = frame.id & EFF_MASK;
        if frame.extended {
            can_id |= EFF_FLAG;
        } else {
            can_id &= SFF_MASK;
        }

        let raw = KernelFrame {
            can_id,
            can_dlc: frame.dlc.min(8),
            pad: 0,
            res0: 0,
            res1: 0,
            data: frame.data,
        };

        let count = unsafe {
            libc::write(
                self.fd,
                &raw as *const KernelFrame as *const c_void,
                size_of::<KernelFrame>(),
            )
        };

        if count as usize != size_of::<KernelFrame>() {
            return Err(std::io::Error::last_os_error());
        }

        Ok(())
    }
}

impl Drop for CanSocket {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

impl AsRawFd for CanSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

/// Monotonic millisecond clock for hosted use, suitable as the engine's
/// time source.
pub fn millis() -> u32 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as u32
}

//! The kernel side: gadgetfs nodes, their readiness and the events read from the control node.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::Duration;

use crate::usb::Setup;

/// `_IO('g', 3)` from `linux/usb/gadgetfs.h`.
const GADGETFS_CLEAR_HALT: libc::c_ulong = ((b'g' as libc::c_ulong) << 8) | 3;

/// Size of `struct usb_gadgetfs_event`: an eight byte union followed by the `u32` type.
pub const EVENT_SIZE: usize = 12;

/// The control loop reads at most this many events at once.
pub const MAX_EVENTS: usize = 5;

const EVENT_NOP: u32 = 0;
const EVENT_CONNECT: u32 = 1;
const EVENT_DISCONNECT: u32 = 2;
const EVENT_SETUP: u32 = 3;
const EVENT_SUSPEND: u32 = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    Nop,
    Connect,
    Disconnect,
    Setup(Setup),
    Suspend,
    Unknown(u32),
}

impl Event {
    pub fn from_bytes(bytes: &[u8; EVENT_SIZE]) -> Self {
        let kind = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        match kind {
            EVENT_NOP => Self::Nop,
            EVENT_CONNECT => Self::Connect,
            EVENT_DISCONNECT => Self::Disconnect,
            EVENT_SETUP => {
                let mut setup = [0; Setup::SIZE];
                setup.copy_from_slice(&bytes[..Setup::SIZE]);
                Self::Setup(Setup::from_bytes(&setup))
            }
            EVENT_SUSPEND => Self::Suspend,
            other => Self::Unknown(other),
        }
    }

    pub fn to_bytes(&self) -> [u8; EVENT_SIZE] {
        let mut bytes = [0; EVENT_SIZE];
        let kind = match self {
            Self::Nop => EVENT_NOP,
            Self::Connect => EVENT_CONNECT,
            Self::Disconnect => EVENT_DISCONNECT,
            Self::Setup(setup) => {
                bytes[..Setup::SIZE].copy_from_slice(&setup.to_bytes());
                EVENT_SETUP
            }
            Self::Suspend => EVENT_SUSPEND,
            Self::Unknown(other) => *other,
        };
        bytes[8..].copy_from_slice(&kind.to_le_bytes());
        bytes
    }
}

/// Splits a read from the control node into events. A trailing partial record is ignored.
pub fn parse_events(buf: &[u8]) -> Vec<Event> {
    buf.chunks_exact(EVENT_SIZE)
        .map(|chunk| {
            let mut bytes = [0; EVENT_SIZE];
            bytes.copy_from_slice(chunk);
            Event::from_bytes(&bytes)
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Interest {
    Readable,
    Writable,
}

/// One opened gadget node: the control node or a bulk endpoint.
///
/// Shared between the control path and a data-plane worker, hence `&self` everywhere.
pub trait GadgetEndpoint: Send + Sync + 'static {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Waits until the node is ready for `interest`. `None` waits forever.
    ///
    /// Returns `false` on timeout.
    fn wait(&self, interest: Interest, timeout: Option<Duration>) -> io::Result<bool>;

    fn clear_halt(&self) -> io::Result<()>;
}

/// Opens gadget nodes by path.
pub trait USBGadget {
    type Endpoint: GadgetEndpoint;

    fn open(&self, path: &Path) -> io::Result<Self::Endpoint>;
}

/// gadgetfs as mounted by `mount -t gadgetfs gadgetfs /dev/gadget`.
#[derive(Clone, Debug, Default)]
pub struct GadgetFs;

impl USBGadget for GadgetFs {
    type Endpoint = GadgetFile;

    fn open(&self, path: &Path) -> io::Result<GadgetFile> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)?;
        Ok(GadgetFile { file })
    }
}

#[derive(Debug)]
pub struct GadgetFile {
    file: File,
}

impl GadgetEndpoint for GadgetFile {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.file).read(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.file).write(buf)
    }

    fn wait(&self, interest: Interest, timeout: Option<Duration>) -> io::Result<bool> {
        let mut fd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: match interest {
                Interest::Readable => libc::POLLIN,
                Interest::Writable => libc::POLLOUT,
            },
            revents: 0,
        };
        let timeout = match timeout {
            Some(timeout) => timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1,
        };

        loop {
            // SAFETY: `fd` is a single valid pollfd for the duration of the call.
            let ret = unsafe { libc::poll(&mut fd, 1, timeout) };
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if ret > 0 && fd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("poll reported error condition {:#x}", fd.revents),
                ));
            }
            return Ok(ret > 0);
        }
    }

    fn clear_halt(&self) -> io::Result<()> {
        // SAFETY: the request takes no argument.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), GADGETFS_CLEAR_HALT as _) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

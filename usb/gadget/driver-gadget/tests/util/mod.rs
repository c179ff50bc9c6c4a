#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use driver_gadget::gadgetfs::Event;
use driver_gadget::usb::{Setup, SetupReq};
use driver_gadget::{GadgetConfig, GadgetEndpoint, Interest, USBGadget};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Op {
    Read(usize),
    Write(Vec<u8>),
    ClearHalt,
}

#[derive(Debug, Default)]
pub struct NodeState {
    pub ops: Vec<Op>,
    pub reads: VecDeque<Vec<u8>>,
    /// Every write returns at most this many bytes.
    pub short_write: Option<usize>,
    pub fail_open: bool,
    /// The next this many non-empty reads fail.
    pub fail_reads: usize,
    /// The next this many non-empty writes fail.
    pub fail_writes: usize,
    pub opens: usize,
    /// Handles currently open.
    pub live: usize,
}

/// One gadgetfs node, shared between the test and every handle opened on it.
#[derive(Clone, Debug, Default)]
pub struct MockNode(Arc<Mutex<NodeState>>);

impl MockNode {
    pub fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.0.lock().unwrap()
    }

    pub fn push_read(&self, data: impl Into<Vec<u8>>) {
        self.lock().reads.push_back(data.into());
    }

    pub fn push_events(&self, events: &[Event]) {
        let mut buf = Vec::new();
        for event in events {
            buf.extend_from_slice(&event.to_bytes());
        }
        self.push_read(buf);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.lock().ops.clone()
    }

    pub fn take_ops(&self) -> Vec<Op> {
        std::mem::take(&mut self.lock().ops)
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Write(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn live(&self) -> usize {
        self.lock().live
    }
}

#[derive(Clone, Debug, Default)]
pub struct MockGadget {
    nodes: Arc<Mutex<HashMap<PathBuf, MockNode>>>,
}

impl MockGadget {
    pub fn node(&self, path: impl AsRef<Path>) -> MockNode {
        self.nodes
            .lock()
            .unwrap()
            .entry(path.as_ref().to_owned())
            .or_default()
            .clone()
    }

    pub fn control(&self, config: &GadgetConfig) -> MockNode {
        self.node(config.control_path())
    }

    pub fn ep_in(&self, config: &GadgetConfig) -> MockNode {
        self.node(config.ep_in_path())
    }

    pub fn ep_out(&self, config: &GadgetConfig) -> MockNode {
        self.node(config.ep_out_path())
    }
}

impl USBGadget for MockGadget {
    type Endpoint = MockEndpoint;

    fn open(&self, path: &Path) -> io::Result<MockEndpoint> {
        let node = self.node(path);
        {
            let mut state = node.lock();
            if state.fail_open {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such node"));
            }
            state.opens += 1;
            state.live += 1;
        }
        Ok(MockEndpoint { node })
    }
}

pub struct MockEndpoint {
    node: MockNode,
}

impl Drop for MockEndpoint {
    fn drop(&mut self) {
        self.node.lock().live -= 1;
    }
}

impl GadgetEndpoint for MockEndpoint {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.node.lock();
        if buf.is_empty() {
            state.ops.push(Op::Read(0));
            return Ok(0);
        }
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "read failed"));
        }
        match state.reads.pop_front() {
            Some(data) => {
                let count = data.len().min(buf.len());
                buf[..count].copy_from_slice(&data[..count]);
                state.ops.push(Op::Read(count));
                Ok(count)
            }
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "unplugged",
            )),
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.node.lock();
        if !buf.is_empty() && state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "write failed"));
        }
        state.ops.push(Op::Write(buf.to_vec()));
        Ok(match state.short_write {
            Some(limit) => buf.len().min(limit),
            None => buf.len(),
        })
    }

    fn wait(&self, interest: Interest, timeout: Option<Duration>) -> io::Result<bool> {
        if interest == Interest::Writable || !self.node.lock().reads.is_empty() {
            return Ok(true);
        }
        thread::sleep(timeout.unwrap_or(Duration::from_millis(10)));
        Ok(!self.node.lock().reads.is_empty())
    }

    fn clear_halt(&self) -> io::Result<()> {
        self.node.lock().ops.push(Op::ClearHalt);
        Ok(())
    }
}

/// Polls `condition` for up to two seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

pub fn get_descriptor(kind: u8, index: u8, language: u16, length: u16) -> Setup {
    Setup {
        kind: 0b1000_0000,
        request: SetupReq::GetDescriptor as u8,
        value: (u16::from(kind) << 8) | u16::from(index),
        index: language,
        length,
    }
}

pub fn set_configuration(value: u16) -> Setup {
    Setup {
        kind: 0b0000_0000,
        request: SetupReq::SetConfiguration as u8,
        value,
        index: 0,
        length: 0,
    }
}

pub fn get_interface(interface: u16) -> Setup {
    Setup {
        kind: 0b1000_0001,
        request: SetupReq::GetInterface as u8,
        value: 0,
        index: interface,
        length: 1,
    }
}

pub fn set_interface(interface: u8, alternate_setting: u8) -> Setup {
    Setup {
        kind: 0b0000_0001,
        request: SetupReq::SetInterface as u8,
        value: u16::from(alternate_setting),
        index: u16::from(interface),
        length: 0,
    }
}

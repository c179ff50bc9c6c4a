//! The two data-plane threads and their supervision.
//!
//! Each worker owns one half of the diagnostic state for as long as it runs and hands it back
//! through its `JoinHandle`, so a restarted worker picks up the counters where the previous one
//! left them. Both workers share one stop flag and check it at least every [POLL_INTERVAL].

use std::io;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use common::Timeout;
use log::{info, trace, warn};
use thiserror::Error;

use crate::diag::{self, DiagRx, DiagTx, TX_BUF_SIZE};
use crate::endpoints::Session;
use crate::gadgetfs::{GadgetEndpoint, Interest};

/// Longest time a worker goes without looking at the stop flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub const RX_BUF_SIZE: usize = 512;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("workers did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("{0} worker panicked")]
    Panicked(&'static str),

    #[error("failed to spawn {0} worker: {1}")]
    Spawn(&'static str, #[source] io::Error),
}

/// Reads command packets from bulk OUT until stopped.
pub fn rx_worker<E: GadgetEndpoint>(
    session: Session<E>,
    mut diag: DiagRx,
    stop: Arc<AtomicBool>,
) -> DiagRx {
    let mut buf = [0u8; RX_BUF_SIZE];

    while !stop.load(Ordering::Acquire) {
        match session.endpoint().wait(Interest::Readable, Some(POLL_INTERVAL)) {
            Ok(true) => (),
            Ok(false) => continue,
            Err(err) => {
                warn!("rx: wait failed: {}", err);
                break;
            }
        }

        match session.endpoint().read(&mut buf) {
            Ok(count) => {
                trace!("rx: read {} bytes", count);
                diag.count_rx(count);
                if count > 0 {
                    diag.on_rx(&buf[..count]);
                }
            }
            Err(err) => warn!("rx: read failed: {}", err),
        }
    }

    session.close();
    diag
}

/// Sends reply frames and test data on bulk IN until stopped.
pub fn tx_worker<E: GadgetEndpoint>(
    session: Session<E>,
    mut diag: DiagTx,
    stop: Arc<AtomicBool>,
) -> DiagTx {
    'run: while !stop.load(Ordering::Acquire) {
        if !diag.wait_for_work(POLL_INTERVAL) {
            continue;
        }

        loop {
            if stop.load(Ordering::Acquire) {
                break 'run;
            }
            match session.endpoint().wait(Interest::Writable, Some(POLL_INTERVAL)) {
                Ok(true) => break,
                Ok(false) => (),
                Err(err) => {
                    warn!("tx: wait failed: {}", err);
                    break 'run;
                }
            }
        }

        let frame = diag.on_tx_request(TX_BUF_SIZE);
        if frame.is_empty() {
            continue;
        }
        match session.endpoint().write(frame) {
            Ok(count) => {
                trace!("tx: wrote {} bytes", count);
                diag.count_tx(count);
            }
            Err(err) => warn!("tx: write failed: {}", err),
        }
    }

    session.close();
    diag
}

enum Slot<T> {
    Idle(T),
    Running(JoinHandle<T>),
    /// The worker panicked and took its half of the state with it.
    Lost,
}

impl<T> Slot<T> {
    fn is_live(&self) -> bool {
        matches!(self, Slot::Running(handle) if !handle.is_finished())
    }

    fn idle(&self) -> Option<&T> {
        match self {
            Slot::Idle(value) => Some(value),
            _ => None,
        }
    }

    /// Collects a finished worker. Leaves a live one alone.
    fn reap(&mut self, name: &'static str) -> Result<(), WorkerError> {
        match mem::replace(self, Slot::Lost) {
            Slot::Running(handle) if handle.is_finished() => match handle.join() {
                Ok(value) => *self = Slot::Idle(value),
                Err(_) => return Err(WorkerError::Panicked(name)),
            },
            other => *self = other,
        }
        Ok(())
    }
}

/// The RX and TX workers, their shared stop flag and their diagnostic state.
pub struct Workers {
    stop: Arc<AtomicBool>,
    rx: Slot<DiagRx>,
    tx: Slot<DiagTx>,
    verbosity: i32,
    tx_amount: i32,
}

impl Workers {
    pub fn new(verbosity: i32, tx_amount: i32) -> Self {
        let (rx, tx) = diag::channel(verbosity, tx_amount);
        Self {
            stop: Arc::new(AtomicBool::new(true)),
            rx: Slot::Idle(rx),
            tx: Slot::Idle(tx),
            verbosity,
            tx_amount,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Number of workers that have not exited yet.
    pub fn live_count(&self) -> usize {
        usize::from(self.rx.is_live()) + usize::from(self.tx.is_live())
    }

    pub fn is_running(&self) -> bool {
        self.live_count() > 0
    }

    /// Asks both workers to exit. Does not wait for them.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Receive-side state, available while the RX worker is not running.
    pub fn rx_diag(&self) -> Option<&DiagRx> {
        self.rx.idle()
    }

    /// Transmit-side state, available while the TX worker is not running.
    pub fn tx_diag(&self) -> Option<&DiagTx> {
        self.tx.idle()
    }

    /// Stops both workers and waits up to `grace` for them to exit.
    pub fn join(&mut self, grace: Duration) -> Result<(), WorkerError> {
        self.request_stop();

        let timeout = Timeout::new(grace);
        while self.is_running() {
            if timeout.run().is_err() {
                return Err(WorkerError::StopTimeout(grace));
            }
        }

        let rx = self.rx.reap("rx");
        let tx = self.tx.reap("tx");
        rx.and(tx)
    }

    /// Starts a worker for every session given, after clearing the stop flag.
    ///
    /// Call [Workers::join] first; a worker that is still running is left alone.
    pub fn launch<E: GadgetEndpoint>(
        &mut self,
        ep_in: Option<Session<E>>,
        ep_out: Option<Session<E>>,
    ) -> Result<(), WorkerError> {
        if matches!(self.rx, Slot::Lost) || matches!(self.tx, Slot::Lost) {
            warn!("diagnostic state lost, starting over");
            let (rx, tx) = diag::channel(self.verbosity, self.tx_amount);
            self.rx = Slot::Idle(rx);
            self.tx = Slot::Idle(tx);
        }

        self.stop.store(false, Ordering::Release);

        if let Some(session) = ep_out {
            let stop = Arc::clone(&self.stop);
            spawn(&mut self.rx, "rx", move |diag| rx_worker(session, diag, stop))?;
        }
        if let Some(session) = ep_in {
            let stop = Arc::clone(&self.stop);
            spawn(&mut self.tx, "tx", move |diag| tx_worker(session, diag, stop))?;
        }

        info!("{} worker(s) running", self.live_count());
        Ok(())
    }
}

fn spawn<T, F>(slot: &mut Slot<T>, name: &'static str, f: F) -> Result<(), WorkerError>
where
    T: Send + 'static,
    F: FnOnce(T) -> T + Send + 'static,
{
    let diag = match mem::replace(slot, Slot::Lost) {
        Slot::Idle(diag) => diag,
        other => {
            warn!("{} worker still running, not restarting it", name);
            *slot = other;
            return Ok(());
        }
    };

    let handle = thread::Builder::new()
        .name(format!("gadget-{}", name))
        .spawn(move || f(diag))
        .map_err(|err| WorkerError::Spawn(name, err))?;
    *slot = Slot::Running(handle);
    Ok(())
}

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::GadgetConfig;
use crate::descriptors::DescriptorSet;
use crate::gadgetfs::{GadgetEndpoint, USBGadget};
use crate::usb::EndpointDescriptor;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("short write to {}: {written} of {expected} bytes", path.display())]
    ShortWrite {
        path: PathBuf,
        written: usize,
        expected: usize,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// An opened bulk endpoint, owned by the worker that uses it.
///
/// The session is the only lasting owner of the node, so the node is closed as soon as the worker
/// lets go of it.
pub struct Session<E> {
    endpoint: Arc<E>,
    active: Arc<AtomicBool>,
}

impl<E: GadgetEndpoint> Session<E> {
    pub fn new(endpoint: E) -> Self {
        Self {
            endpoint: Arc::new(endpoint),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Closes the node and marks the session as closed. Called by the worker on its way out.
    pub fn close(self) {
        drop(self);
    }

    fn track(&self) -> Tracked<E> {
        Tracked {
            endpoint: Arc::downgrade(&self.endpoint),
            active: Arc::clone(&self.active),
        }
    }
}

impl<E> Drop for Session<E> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// The manager's view of a session. Does not keep the node open.
struct Tracked<E> {
    endpoint: Weak<E>,
    active: Arc<AtomicBool>,
}

impl<E> Tracked<E> {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Owns the gadget and keeps track of the two bulk endpoint sessions.
pub struct EndpointManager<T: USBGadget> {
    gadget: T,
    ep_in_path: PathBuf,
    ep_out_path: PathBuf,
    ep_in_desc: EndpointDescriptor,
    ep_out_desc: EndpointDescriptor,
    tx_enable: bool,
    rx_enable: bool,
    ep_in: Option<Tracked<T::Endpoint>>,
    ep_out: Option<Tracked<T::Endpoint>>,
}

impl<T: USBGadget> EndpointManager<T> {
    pub fn new(gadget: T, config: &GadgetConfig, descriptors: &DescriptorSet) -> Self {
        Self {
            gadget,
            ep_in_path: config.ep_in_path(),
            ep_out_path: config.ep_out_path(),
            ep_in_desc: descriptors.ep_in,
            ep_out_desc: descriptors.ep_out,
            tx_enable: config.diagnostics.tx_enable,
            rx_enable: config.diagnostics.rx_enable,
            ep_in: None,
            ep_out: None,
        }
    }

    /// True while a worker still holds one of the endpoints.
    pub fn is_open(&self) -> bool {
        self.ep_in.iter().chain(&self.ep_out).any(Tracked::is_active)
    }

    /// Forgets both endpoints. A node stays open until the session that owns it is dropped.
    pub fn close(&mut self) {
        self.ep_in = None;
        self.ep_out = None;
    }

    /// Opens and configures the bulk IN endpoint (unless TX is disabled), then the bulk OUT
    /// endpoint (unless RX is disabled).
    ///
    /// On failure nothing stays open. On success the caller owns the sessions; the manager only
    /// keeps track of them.
    pub fn open_endpoints(
        &mut self,
    ) -> Result<(Option<Session<T::Endpoint>>, Option<Session<T::Endpoint>>), EndpointError> {
        self.close();

        let result = self.open_both();
        match &result {
            Ok((ep_in, ep_out)) => {
                self.ep_in = ep_in.as_ref().map(Session::track);
                self.ep_out = ep_out.as_ref().map(Session::track);
            }
            Err(err) => warn!("failed to configure bulk endpoints: {}", err),
        }
        result
    }

    fn open_both(
        &self,
    ) -> Result<(Option<Session<T::Endpoint>>, Option<Session<T::Endpoint>>), EndpointError> {
        let ep_in = if self.tx_enable {
            Some(self.configure(&self.ep_in_path, &self.ep_in_desc)?)
        } else {
            debug!("tx disabled, not opening {}", self.ep_in_path.display());
            None
        };
        let ep_out = if self.rx_enable {
            Some(self.configure(&self.ep_out_path, &self.ep_out_desc)?)
        } else {
            debug!("rx disabled, not opening {}", self.ep_out_path.display());
            None
        };
        Ok((ep_in, ep_out))
    }

    fn configure(
        &self,
        path: &Path,
        desc: &EndpointDescriptor,
    ) -> Result<Session<T::Endpoint>, EndpointError> {
        let endpoint = self.gadget.open(path).map_err(|source| EndpointError::Open {
            path: path.to_owned(),
            source,
        })?;

        let config = DescriptorSet::endpoint_config(desc);
        let written = endpoint.write(&config)?;
        if written != config.len() {
            return Err(EndpointError::ShortWrite {
                path: path.to_owned(),
                written,
                expected: config.len(),
            });
        }

        info!("{} configured", path.display());
        Ok(Session::new(endpoint))
    }

    /// Clears a halt on both bulk endpoints that are currently open.
    pub fn clear_halt(&self) {
        let open = self.ep_in.iter().chain(&self.ep_out);
        for endpoint in open.filter_map(|tracked| tracked.endpoint.upgrade()) {
            if let Err(err) = endpoint.clear_halt() {
                warn!("failed to clear halt: {}", err);
            }
        }
    }
}

//! EP0: startup and the SETUP request state machine.
//!
//! Every request is handled to completion before the next event is read. A request that cannot
//! be served is stalled with a zero-length transfer against the direction of the request: a
//! read for device-to-host requests, a write otherwise.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use thiserror::Error;

use crate::config::GadgetConfig;
use crate::descriptors::{winusb_os_string, DescriptorSet, WINUSB_EXT_COMPAT_ID};
use crate::endpoints::EndpointManager;
use crate::gadgetfs::{parse_events, Event, GadgetEndpoint, USBGadget, EVENT_SIZE, MAX_EVENTS};
use crate::strings::{StringError, StringTable, STRING_ID_WINUSB};
use crate::usb::{DescriptorKind, ReqDirection, Setup, SetupReq};
use crate::worker::Workers;

/// How long a restart waits for the previous workers to exit.
pub const STOP_GRACE: Duration = Duration::from_millis(200);

const GET_DESCRIPTOR: u8 = SetupReq::GetDescriptor as u8;
const SET_CONFIGURATION: u8 = SetupReq::SetConfiguration as u8;
const GET_INTERFACE: u8 = SetupReq::GetInterface as u8;
const SET_INTERFACE: u8 = SetupReq::SetInterface as u8;

#[derive(Debug, Error)]
pub enum StallReason {
    #[error("request has the wrong direction")]
    BadDirection,

    #[error(transparent)]
    String(#[from] StringError),

    #[error("cannot return descriptor type {0:#04x}")]
    UnsupportedDescriptor(u8),

    #[error("unknown request {0:#04x}")]
    UnknownRequest(u8),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("short write of device descriptors: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub struct GadgetDriver<T: USBGadget> {
    control: T::Endpoint,
    endpoints: EndpointManager<T>,
    workers: Workers,
    strings: StringTable,
    vendor_code: u8,
    configuration_value: u8,
}

impl<T: USBGadget> GadgetDriver<T> {
    /// Opens the control node and hands it the descriptors.
    pub fn start(gadget: T, config: &GadgetConfig) -> Result<Self, StartupError> {
        let path = config.control_path();
        let control = gadget
            .open(&path)
            .map_err(|source| StartupError::Open {
                path: path.clone(),
                source,
            })?;

        let descriptors = DescriptorSet::new(config);
        let buf = descriptors.device_config();
        let written = control.write(&buf)?;
        if written != buf.len() {
            return Err(StartupError::ShortWrite {
                written,
                expected: buf.len(),
            });
        }
        info!("{}: descriptors written", path.display());

        let diagnostics = &config.diagnostics;
        Ok(Self {
            control,
            endpoints: EndpointManager::new(gadget, config, &descriptors),
            workers: Workers::new(diagnostics.verbosity, diagnostics.tx_amount),
            strings: config.string_table(),
            vendor_code: config.winusb.vendor_code,
            configuration_value: config.device.configuration_value,
        })
    }

    pub fn workers(&self) -> &Workers {
        &self.workers
    }

    pub fn endpoints(&self) -> &EndpointManager<T> {
        &self.endpoints
    }

    /// Serves control events until reading the control node fails, then stops the workers.
    pub fn run(&mut self) {
        let mut buf = [0u8; EVENT_SIZE * MAX_EVENTS];
        loop {
            let count = match self.control.read(&mut buf) {
                Ok(count) => count,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    error!("control read failed: {}", err);
                    break;
                }
            };

            let events = parse_events(&buf[..count]);
            trace!("{} event(s)", events.len());
            for event in events {
                self.handle_event(event);
            }
        }

        self.shutdown();
    }

    /// Stops the workers, waiting at most [STOP_GRACE]. The bulk endpoints close as the workers
    /// exit.
    pub fn shutdown(&mut self) {
        if let Err(err) = self.workers.join(STOP_GRACE) {
            warn!("shutdown: {}", err);
        }
        self.endpoints.close();
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Nop => (),
            Event::Connect => info!("connect"),
            Event::Disconnect => {
                info!("disconnect");
                self.workers.request_stop();
            }
            Event::Suspend => {
                info!("suspend");
                self.workers.request_stop();
            }
            Event::Setup(setup) => self.handle_setup(&setup),
            Event::Unknown(kind) => debug!("unknown event type {}", kind),
        }
    }

    pub fn handle_setup(&mut self, setup: &Setup) {
        debug!("setup request {:#04x}", setup.request);
        if let Err(reason) = self.dispatch(setup) {
            warn!("stalled request {:#04x}: {}", setup.request, reason);
            self.stall(setup);
        }
    }

    fn dispatch(&mut self, setup: &Setup) -> Result<(), StallReason> {
        match setup.request {
            GET_DESCRIPTOR => self.get_descriptor(setup),
            SET_CONFIGURATION => self.set_configuration(setup),
            GET_INTERFACE => {
                self.reply(setup, &[0]);
                Ok(())
            }
            SET_INTERFACE => {
                self.endpoints.clear_halt();
                self.ack();
                Ok(())
            }
            request if request == self.vendor_code => {
                self.vendor_request(setup);
                Ok(())
            }
            request => Err(StallReason::UnknownRequest(request)),
        }
    }

    fn get_descriptor(&self, setup: &Setup) -> Result<(), StallReason> {
        if setup.direction() != ReqDirection::DeviceToHost {
            return Err(StallReason::BadDirection);
        }

        let kind = setup.descriptor_kind();
        if DescriptorKind::from_u8(kind) != Some(DescriptorKind::String) {
            return Err(StallReason::UnsupportedDescriptor(kind));
        }

        let index = setup.descriptor_index();
        debug!("get string {:#04x} (max length {})", index, setup.length);
        let desc = if index == STRING_ID_WINUSB {
            winusb_os_string(self.vendor_code).to_vec()
        } else {
            self.strings.encode_string(index, usize::from(setup.length))?
        };
        self.reply(setup, &desc);
        Ok(())
    }

    fn set_configuration(&mut self, setup: &Setup) -> Result<(), StallReason> {
        if setup.direction() != ReqDirection::HostToDevice {
            return Err(StallReason::BadDirection);
        }

        match setup.value {
            value if value == u16::from(self.configuration_value) => self.configure(),
            0 => {
                info!("unconfigured, stopping workers");
                self.workers.request_stop();
            }
            value => warn!("unhandled configuration value {}", value),
        }

        // The status phase completes even if the endpoints could not be set up.
        self.ack();
        Ok(())
    }

    fn configure(&mut self) {
        if let Err(err) = self.workers.join(STOP_GRACE) {
            error!("not restarting workers: {}", err);
            return;
        }

        let (ep_in, ep_out) = match self.endpoints.open_endpoints() {
            Ok(sessions) => sessions,
            Err(_) => return,
        };

        if let Err(err) = self.workers.launch(ep_in, ep_out) {
            error!("{}", err);
        }
    }

    fn vendor_request(&self, setup: &Setup) {
        debug!(
            "vendor request: value {:#06x}, index {:#06x}, length {}, dir {}, type {:?}, recipient {:?}",
            setup.value,
            setup.index,
            setup.length,
            setup.direction(),
            setup.req_ty(),
            setup.req_recipient()
        );
        self.reply(setup, &WINUSB_EXT_COMPAT_ID);
    }

    /// Data stage of a device-to-host request, cut to `wLength`.
    fn reply(&self, setup: &Setup, data: &[u8]) {
        let len = data.len().min(usize::from(setup.length));
        if let Err(err) = self.control.write(&data[..len]) {
            warn!("control write failed: {}", err);
        }
    }

    /// Status stage of a host-to-device request.
    fn ack(&self) {
        if let Err(err) = self.control.read(&mut []) {
            warn!("control ack failed: {}", err);
        }
    }

    fn stall(&self, setup: &Setup) {
        let result = match setup.direction() {
            ReqDirection::DeviceToHost => self.control.read(&mut []),
            ReqDirection::HostToDevice => self.control.write(&[]),
        };
        if let Err(err) = result {
            // gadgetfs reports the stall it just issued as EL2HLT.
            trace!("stall: {}", err);
        }
    }
}

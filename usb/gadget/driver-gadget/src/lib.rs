//! A WinUSB test gadget on top of Linux gadgetfs.
//!
//! [GadgetDriver] writes the descriptors to the control node and serves EP0. Once the host
//! selects the configuration, the bulk endpoints are configured and two workers start moving
//! diagnostic packets over them (see [diag]).

pub mod config;
pub mod control;
pub mod descriptors;
pub mod diag;
pub mod endpoints;
pub mod gadgetfs;
pub mod strings;
pub mod usb;
pub mod worker;

pub use config::{ConfigError, GadgetConfig};
pub use control::{GadgetDriver, StallReason, StartupError, STOP_GRACE};
pub use endpoints::{EndpointError, EndpointManager, Session};
pub use gadgetfs::{Event, GadgetEndpoint, GadgetFile, GadgetFs, Interest, USBGadget};
pub use strings::{StringError, StringTable};
pub use worker::{WorkerError, Workers};

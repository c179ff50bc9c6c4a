//! Wire layouts of the standard USB structures the gadget exchanges with the host.
//!
//! References point at the USB 2.0 specification, chapter 9.

pub use self::config::ConfigDescriptor;
pub use self::device::DeviceDescriptor;
pub use self::endpoint::{EndpointDescriptor, EndpointTy, ENDP_ATTR_TY_MASK};
pub use self::interface::InterfaceDescriptor;
pub use self::setup::{ReqDirection, ReqRecipient, ReqType, Setup, SetupReq};

mod config;
mod device;
mod endpoint;
mod interface;
mod setup;

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DescriptorKind {
    None = 0,
    Device = 1,
    Configuration = 2,
    String = 3,
    Interface = 4,
    Endpoint = 5,
    DeviceQualifier = 6,
    OtherSpeedConfiguration = 7,
    InterfacePower = 8,
    OnTheGo = 9,
}

impl DescriptorKind {
    pub fn from_u8(kind: u8) -> Option<Self> {
        Some(match kind {
            0 => Self::None,
            1 => Self::Device,
            2 => Self::Configuration,
            3 => Self::String,
            4 => Self::Interface,
            5 => Self::Endpoint,
            6 => Self::DeviceQualifier,
            7 => Self::OtherSpeedConfiguration,
            8 => Self::InterfacePower,
            9 => Self::OnTheGo,
            _ => return None,
        })
    }
}

/// Class code marking a device or interface as vendor specific.
pub const CLASS_VENDOR_SPEC: u8 = 0xFF;

/// Reserved bit 7 of `bmAttributes`, must always be set.
pub const CONFIG_ATT_ONE: u8 = 1 << 7;

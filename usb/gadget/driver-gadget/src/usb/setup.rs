use std::fmt;

/// The eight byte SETUP packet of a control transfer (USB2 9.3).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Setup {
    pub kind: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReqDirection {
    HostToDevice = 0,
    DeviceToHost = 1,
}

impl fmt::Display for ReqDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::HostToDevice => "out",
            Self::DeviceToHost => "in",
        })
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReqType {
    /// Standard device requests, such as GET_DESCRIPTOR and SET_CONFIGURATION.
    Standard = 0,

    /// Class specific requests.
    Class = 1,

    /// Vendor specific requests, the WinUSB feature descriptor request among them.
    Vendor = 2,

    /// Reserved
    Reserved = 3,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReqRecipient {
    Device = 0,
    Interface = 1,
    Endpoint = 2,
    Other = 3,
    // 4..=30 are reserved
    VendorSpecific = 31,
}

#[repr(u8)]
pub enum SetupReq {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
}

pub const USB_SETUP_DIR_BIT: u8 = 1 << 7;
pub const USB_SETUP_DIR_SHIFT: u8 = 7;
pub const USB_SETUP_REQ_TY_MASK: u8 = 0x60;
pub const USB_SETUP_REQ_TY_SHIFT: u8 = 5;
pub const USB_SETUP_RECIPIENT_MASK: u8 = 0x1F;
pub const USB_SETUP_RECIPIENT_SHIFT: u8 = 0;

impl Setup {
    pub const SIZE: usize = 8;

    /// Decodes a little-endian SETUP packet.
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            kind: bytes[0],
            request: bytes[1],
            value: u16::from_le_bytes([bytes[2], bytes[3]]),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
            length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let value = self.value.to_le_bytes();
        let index = self.index.to_le_bytes();
        let length = self.length.to_le_bytes();
        [
            self.kind, self.request, value[0], value[1], index[0], index[1], length[0], length[1],
        ]
    }

    pub fn direction(&self) -> ReqDirection {
        if self.kind & USB_SETUP_DIR_BIT == 0 {
            ReqDirection::HostToDevice
        } else {
            ReqDirection::DeviceToHost
        }
    }

    pub fn req_ty(&self) -> ReqType {
        match (self.kind & USB_SETUP_REQ_TY_MASK) >> USB_SETUP_REQ_TY_SHIFT {
            0 => ReqType::Standard,
            1 => ReqType::Class,
            2 => ReqType::Vendor,
            _ => ReqType::Reserved,
        }
    }

    /// `None` for the reserved recipients.
    pub fn req_recipient(&self) -> Option<ReqRecipient> {
        match (self.kind & USB_SETUP_RECIPIENT_MASK) >> USB_SETUP_RECIPIENT_SHIFT {
            0 => Some(ReqRecipient::Device),
            1 => Some(ReqRecipient::Interface),
            2 => Some(ReqRecipient::Endpoint),
            3 => Some(ReqRecipient::Other),
            31 => Some(ReqRecipient::VendorSpecific),
            _ => None,
        }
    }

    /// The descriptor type of a GET_DESCRIPTOR request.
    pub const fn descriptor_kind(&self) -> u8 {
        (self.value >> 8) as u8
    }

    /// The descriptor index of a GET_DESCRIPTOR request.
    pub const fn descriptor_index(&self) -> u8 {
        (self.value & 0xFF) as u8
    }
}

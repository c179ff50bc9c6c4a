use super::DescriptorKind;

pub const ENDP_ATTR_TY_MASK: u8 = 0x3;

/// Bit 7 of `bEndpointAddress`, set for device-to-host endpoints.
pub const ENDP_ADDR_DIR_IN: u8 = 1 << 7;

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EndpointTy {
    Ctrl = 0,
    Isoch = 1,
    Bulk = 2,
    Interrupt = 3,
}

/// Endpoint descriptor (USB2 9.6.6).
///
/// Only the seven standard bytes; the audio class extension is not used.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct EndpointDescriptor {
    pub length: u8,
    pub kind: u8,
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

unsafe impl plain::Plain for EndpointDescriptor {}

impl EndpointDescriptor {
    pub const SIZE: u8 = 7;

    pub fn bulk_in(number: u8, max_packet_size: u16) -> Self {
        Self::bulk(ENDP_ADDR_DIR_IN | number, max_packet_size)
    }

    pub fn bulk_out(number: u8, max_packet_size: u16) -> Self {
        Self::bulk(number & !ENDP_ADDR_DIR_IN, max_packet_size)
    }

    fn bulk(address: u8, max_packet_size: u16) -> Self {
        Self {
            length: Self::SIZE,
            kind: DescriptorKind::Endpoint as u8,
            address,
            attributes: EndpointTy::Bulk as u8,
            max_packet_size: max_packet_size.to_le(),
            interval: 0,
        }
    }

    pub fn ty(&self) -> EndpointTy {
        match self.attributes & ENDP_ATTR_TY_MASK {
            0 => EndpointTy::Ctrl,
            1 => EndpointTy::Isoch,
            2 => EndpointTy::Bulk,
            _ => EndpointTy::Interrupt,
        }
    }

    pub fn is_in(&self) -> bool {
        self.address & ENDP_ADDR_DIR_IN != 0
    }

    pub fn max_packet_size(&self) -> u16 {
        u16::from_le(self.max_packet_size)
    }
}

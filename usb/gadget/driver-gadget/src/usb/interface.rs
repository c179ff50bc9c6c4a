use plain::Plain;

use super::DescriptorKind;

/// Interface descriptor (USB2 9.6.5).
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct InterfaceDescriptor {
    pub length: u8,
    pub kind: u8,
    pub number: u8,
    pub alternate_setting: u8,
    pub endpoints: u8,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    pub interface_str: u8,
}

unsafe impl Plain for InterfaceDescriptor {}

impl InterfaceDescriptor {
    pub const SIZE: u8 = 9;

    pub fn new(number: u8, endpoints: u8, class: u8, interface_str: u8) -> Self {
        Self {
            length: Self::SIZE,
            kind: DescriptorKind::Interface as u8,
            number,
            alternate_setting: 0,
            endpoints,
            class,
            sub_class: 0,
            protocol: 0,
            interface_str,
        }
    }
}

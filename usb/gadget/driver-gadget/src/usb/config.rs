use super::DescriptorKind;

/// Configuration descriptor (USB2 9.6.3).
///
/// `total_length` covers this descriptor and every interface and endpoint descriptor that
/// follows it; it is filled in when the configuration bundle is assembled.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigDescriptor {
    pub length: u8,
    pub kind: u8,
    pub total_length: u16,
    pub interfaces: u8,
    pub configuration_value: u8,
    pub configuration_str: u8,
    pub attributes: u8,
    pub max_power: u8,
}

unsafe impl plain::Plain for ConfigDescriptor {}

impl ConfigDescriptor {
    pub const SIZE: u8 = 9;

    pub fn new(configuration_value: u8, configuration_str: u8, attributes: u8, max_power: u8) -> Self {
        Self {
            length: Self::SIZE,
            kind: DescriptorKind::Configuration as u8,
            total_length: 0,
            interfaces: 1,
            configuration_value,
            configuration_str,
            attributes,
            max_power,
        }
    }

    pub fn total_length(&self) -> u16 {
        u16::from_le(self.total_length)
    }
}

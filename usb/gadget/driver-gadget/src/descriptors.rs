//! Descriptor blocks handed to gadgetfs, plus the Microsoft OS descriptors answered on EP0.
//!
//! gadgetfs expects the control file to receive, in one write, a `u32` tag of `0` followed by
//! the full/low speed configuration bundle, the high speed configuration bundle and the device
//! descriptor. Each bulk endpoint file expects a `u32` tag of `1` followed by its endpoint
//! descriptor once per speed.

use crate::config::GadgetConfig;
use crate::strings::{
    STRING_ID_CONFIG_HS, STRING_ID_CONFIG_LS, STRING_ID_INTERFACE, STRING_ID_MANUFACTURER,
    STRING_ID_PRODUCT, STRING_ID_SERIAL,
};
use crate::usb::{
    ConfigDescriptor, DeviceDescriptor, EndpointDescriptor, InterfaceDescriptor,
    CLASS_VENDOR_SPEC, CONFIG_ATT_ONE,
};

pub const TAG_DEVICE_CONFIG: u32 = 0;
pub const TAG_ENDPOINT_CONFIG: u32 = 1;

pub const EP_IN_NUMBER: u8 = 1;
pub const EP_OUT_NUMBER: u8 = 2;

/// Extended Compat ID OS Feature Descriptor, version 1.0, binding interface 0 to `WINUSB`.
pub const WINUSB_EXT_COMPAT_ID: [u8; 40] = [
    0x28, 0x00, 0x00, 0x00, // dwLength
    0x00, 0x01, // bcdVersion 1.0
    0x04, 0x00, // wIndex: extended compat ID
    0x01, // bCount
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // reserved
    0x00, // bFirstInterfaceNumber
    0x01, // reserved
    b'W', b'I', b'N', b'U', b'S', b'B', 0x00, 0x00, // compatibleID
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // subCompatibleID
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // reserved
];

/// Microsoft OS String Descriptor (string index 0xEE) announcing `vendor_code`.
pub const fn winusb_os_string(vendor_code: u8) -> [u8; 18] {
    [
        0x12, 0x03, b'M', 0, b'S', 0, b'F', 0, b'T', 0, b'1', 0, b'0', 0, b'0', 0, vendor_code,
        0x00,
    ]
}

fn fetch<T: plain::Plain>(buf: &mut Vec<u8>, desc: &T) {
    // SAFETY: descriptors are packed plain-old-data.
    buf.extend_from_slice(unsafe { plain::as_bytes(desc) });
}

/// The device's descriptors, built once at startup.
#[derive(Clone, Copy, Debug)]
pub struct DescriptorSet {
    pub device: DeviceDescriptor,
    pub config_ls: ConfigDescriptor,
    pub config_hs: ConfigDescriptor,
    pub interface: InterfaceDescriptor,
    pub ep_in: EndpointDescriptor,
    pub ep_out: EndpointDescriptor,
}

impl DescriptorSet {
    pub fn new(config: &GadgetConfig) -> Self {
        let dev = &config.device;

        let mut device = DeviceDescriptor::new(
            dev.bcd_usb,
            dev.vendor_id,
            dev.product_id,
            dev.bcd_device,
        );
        device.class = CLASS_VENDOR_SPEC;
        device.packet_size = dev.max_packet_size0;
        device.manufacturer_str = STRING_ID_MANUFACTURER;
        device.product_str = STRING_ID_PRODUCT;
        device.serial_str = STRING_ID_SERIAL;

        Self {
            device,
            config_ls: ConfigDescriptor::new(
                dev.configuration_value,
                STRING_ID_CONFIG_LS,
                CONFIG_ATT_ONE,
                dev.max_power,
            ),
            config_hs: ConfigDescriptor::new(
                dev.configuration_value,
                STRING_ID_CONFIG_HS,
                CONFIG_ATT_ONE,
                dev.max_power,
            ),
            interface: InterfaceDescriptor::new(0, 2, CLASS_VENDOR_SPEC, STRING_ID_INTERFACE),
            ep_in: EndpointDescriptor::bulk_in(EP_IN_NUMBER, dev.max_packet_size),
            ep_out: EndpointDescriptor::bulk_out(EP_OUT_NUMBER, dev.max_packet_size),
        }
    }

    /// Configuration, interface and both endpoints, with `wTotalLength` covering all four.
    pub fn config_bundle(&self, config: &ConfigDescriptor) -> Vec<u8> {
        let mut config = *config;
        let mut tail = Vec::new();
        fetch(&mut tail, &self.interface);
        fetch(&mut tail, &self.ep_in);
        fetch(&mut tail, &self.ep_out);

        let total = core::mem::size_of::<ConfigDescriptor>() + tail.len();
        config.total_length = (total as u16).to_le();

        let mut bundle = Vec::with_capacity(total);
        fetch(&mut bundle, &config);
        bundle.extend_from_slice(&tail);
        bundle
    }

    /// The block written once to the control file.
    pub fn device_config(&self) -> Vec<u8> {
        let mut buf = TAG_DEVICE_CONFIG.to_le_bytes().to_vec();
        buf.extend_from_slice(&self.config_bundle(&self.config_ls));
        buf.extend_from_slice(&self.config_bundle(&self.config_hs));
        fetch(&mut buf, &self.device);
        buf
    }

    /// The block written once to an endpoint file before any transfer.
    pub fn endpoint_config(desc: &EndpointDescriptor) -> Vec<u8> {
        let mut buf = TAG_ENDPOINT_CONFIG.to_le_bytes().to_vec();
        // full/low speed, then high speed
        fetch(&mut buf, desc);
        fetch(&mut buf, desc);
        buf
    }
}

//! Implements the "Device" USB Descriptor.
//!
//! This descriptor is described in USB2 section 9.6.1

use super::DescriptorKind;

/// A USB Device Descriptor.
///
/// It "provides information that applies globally to the device and all the device's
/// configurations" (USB2 9.6.1). A gadget has exactly one.
///
/// USB2 Table 9-8 describes the packet offsets of the fields described by this structure.
/// Multi-byte fields hold their little-endian wire representation.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceDescriptor {
    /// The length of this descriptor in bytes (bLength).
    pub length: u8,
    /// The descriptor type, see [DescriptorKind] (bDescriptorType).
    pub kind: u8,
    /// The USB standard version in binary-coded decimal (bcdUSB).
    ///
    /// USB 2.0 is encoded as 200H.
    pub usb: u16,
    /// The USB Class Code (bDeviceClass).
    ///
    /// A value of FF indicates a vendor-specific class.
    pub class: u8,
    /// The USB Sub Device Class Code (bDeviceSubClass).
    pub sub_class: u8,
    /// The USB Protocol code (bDeviceProtocol).
    pub protocol: u8,
    /// The maximum packet size for endpoint 0 (bMaxPacketSize0).
    pub packet_size: u8,
    /// The USB Vendor ID (idVendor).
    pub vendor: u16,
    /// The USB Product ID (idProduct).
    pub product: u16,
    /// The device release number in binary-coded decimal (bcdDevice).
    pub release: u16,
    /// Index of the String Descriptor describing the device manufacturer (iManufacturer).
    pub manufacturer_str: u8,
    /// Index of the String Descriptor describing the product (iProduct).
    pub product_str: u8,
    /// Index of the string descriptor describing the device's serial number (iSerialNumber).
    pub serial_str: u8,
    /// The number of possible configurations (bNumConfigurations).
    pub configurations: u8,
}

unsafe impl plain::Plain for DeviceDescriptor {}

impl DeviceDescriptor {
    pub const SIZE: u8 = 18;

    pub fn new(usb: u16, vendor: u16, product: u16, release: u16) -> Self {
        Self {
            length: Self::SIZE,
            kind: DescriptorKind::Device as u8,
            usb: usb.to_le(),
            vendor: vendor.to_le(),
            product: product.to_le(),
            release: release.to_le(),
            configurations: 1,
            ..Self::default()
        }
    }

    /// Gets the USB Minor Version
    pub fn minor_usb_vers(&self) -> u8 {
        (u16::from_le(self.usb) & 0xFF) as u8
    }

    /// Gets the USB Major Version
    pub fn major_usb_vers(&self) -> u8 {
        ((u16::from_le(self.usb) >> 8) & 0xFF) as u8
    }
}

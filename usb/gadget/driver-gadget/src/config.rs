use std::path::{Path, PathBuf};
use std::{fs, io};

use serde::Deserialize;
use thiserror::Error;

use crate::strings::{
    StringTable, MAX_STRING_CHARS, STRING_ID_CONFIG_HS, STRING_ID_CONFIG_LS, STRING_ID_INTERFACE,
    STRING_ID_MANUFACTURER, STRING_ID_PRODUCT, STRING_ID_SERIAL,
};
use crate::usb::SetupReq;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Everything that identifies the gadget and tunes the daemon.
///
/// Every field has a default, so an empty file (or no file at all) yields a working gadget.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GadgetConfig {
    pub paths: PathConfig,
    pub device: DeviceConfig,
    pub strings: StringConfig,
    pub winusb: WinUsbConfig,
    pub diagnostics: DiagConfig,
}

/// Node names below the gadgetfs mount point. The controller node is named after the UDC.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathConfig {
    pub root: PathBuf,
    pub control: String,
    pub ep_in: String,
    pub ep_out: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/dev/gadget"),
            control: "2184000.usb".to_owned(),
            ep_in: "ep1in".to_owned(),
            ep_out: "ep2out".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bcd_usb: u16,
    pub bcd_device: u16,
    pub max_packet_size0: u8,
    pub configuration_value: u8,
    /// In units of 2 mA.
    pub max_power: u8,
    /// Bulk endpoint packet size, used for both speeds.
    pub max_packet_size: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x22c9,
            product_id: 0xeee7,
            bcd_usb: 0x0200,
            bcd_device: 0x0002,
            max_packet_size0: 64,
            configuration_value: 1,
            max_power: 250,
            max_packet_size: 512,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StringConfig {
    pub language: u16,
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
    pub config_hs: String,
    pub config_ls: String,
    pub interface: String,
}

impl Default for StringConfig {
    fn default() -> Self {
        Self {
            language: 0x0409,
            manufacturer: "StepOver Test".to_owned(),
            product: "beb's WinUSB Gadget Device".to_owned(),
            serial: "b00000001".to_owned(),
            config_hs: "High speed configuration".to_owned(),
            config_ls: "Low speed configuration".to_owned(),
            interface: "Custom interface".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WinUsbConfig {
    /// `bRequest` of the vendor request that fetches the compat ID descriptor.
    pub vendor_code: u8,
}

impl Default for WinUsbConfig {
    fn default() -> Self {
        Self { vendor_code: 0xcd }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagConfig {
    pub verbosity: i32,
    /// Size of every frame the TX worker sends.
    pub tx_amount: i32,
    pub tx_enable: bool,
    pub rx_enable: bool,
}

impl Default for DiagConfig {
    fn default() -> Self {
        Self {
            verbosity: 2,
            tx_amount: 100,
            tx_enable: true,
            rx_enable: true,
        }
    }
}

impl GadgetConfig {
    pub fn from_toml(data: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.winusb.vendor_code <= SetupReq::SynchFrame as u8 {
            return Err(ConfigError::Invalid(
                "winusb.vendor_code collides with a standard request",
            ));
        }
        if self.device.configuration_value == 0 {
            return Err(ConfigError::Invalid(
                "device.configuration_value 0 means unconfigured",
            ));
        }
        if self.strings.serial.chars().count() > MAX_STRING_CHARS {
            return Err(ConfigError::Invalid("strings.serial is too long"));
        }
        Ok(())
    }

    pub fn string_table(&self) -> StringTable {
        let strings = &self.strings;
        StringTable::new(strings.language)
            .with(STRING_ID_MANUFACTURER, strings.manufacturer.as_str())
            .with(STRING_ID_PRODUCT, strings.product.as_str())
            .with(STRING_ID_SERIAL, strings.serial.as_str())
            .with(STRING_ID_CONFIG_HS, strings.config_hs.as_str())
            .with(STRING_ID_CONFIG_LS, strings.config_ls.as_str())
            .with(STRING_ID_INTERFACE, strings.interface.as_str())
    }

    pub fn control_path(&self) -> PathBuf {
        self.paths.root.join(&self.paths.control)
    }

    pub fn ep_in_path(&self) -> PathBuf {
        self.paths.root.join(&self.paths.ep_in)
    }

    pub fn ep_out_path(&self) -> PathBuf {
        self.paths.root.join(&self.paths.ep_out)
    }
}

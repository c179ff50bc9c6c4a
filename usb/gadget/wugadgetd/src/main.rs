//! `wugadgetd`: a WinUSB test device on gadgetfs.
//!
//! ```text
//! wugadgetd [--config PATH] [-v VERBOSITY] [-t 0|1] [-r 0|1] [-s SERIAL] [-b BCD_DEVICE]
//! ```
//!
//! `-t 0` and `-r 0` leave the TX and RX workers out. `-b` takes the device release in hex.

use std::process;

use anyhow::{anyhow, Context, Result};

use driver_gadget::{GadgetConfig, GadgetDriver, GadgetFs, StartupError};

fn parse_args(config: &mut GadgetConfig, mut args: pico_args::Arguments) -> Result<()> {
    if let Some(verbosity) = args.opt_value_from_str::<_, i32>("-v")? {
        config.diagnostics.verbosity = verbosity;
    }
    if let Some(enable) = args.opt_value_from_str::<_, String>("-t")? {
        config.diagnostics.tx_enable = !enable.starts_with('0');
    }
    if let Some(enable) = args.opt_value_from_str::<_, String>("-r")? {
        config.diagnostics.rx_enable = !enable.starts_with('0');
    }
    if let Some(serial) = args.opt_value_from_str::<_, String>("-s")? {
        config.strings.serial = serial;
    }
    if let Some(release) = args.opt_value_from_fn("-b", |value: &str| {
        u16::from_str_radix(value.trim_start_matches("0x"), 16)
    })? {
        config.device.bcd_device = release;
    }

    let rest = args.finish();
    if !rest.is_empty() {
        return Err(anyhow!("unexpected arguments: {:?}", rest));
    }

    config.validate()?;
    Ok(())
}

fn main() -> Result<()> {
    let mut args = pico_args::Arguments::from_env();

    let config_path = args.opt_value_from_str::<_, String>("--config")?;
    let mut config = match &config_path {
        Some(path) => GadgetConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => GadgetConfig::default(),
    };
    parse_args(&mut config, args)?;

    common::setup_logging(
        "wugadgetd",
        common::verbosity_level(config.diagnostics.verbosity),
    );
    log::info!("wugadgetd {}", env!("CARGO_PKG_VERSION"));

    let mut driver = match GadgetDriver::start(GadgetFs, &config) {
        Ok(driver) => driver,
        Err(err) => {
            log::error!("{}", err);
            if let StartupError::Open { .. } = err {
                log::error!(
                    "is gadgetfs mounted? mkdir {0}; mount -t gadgetfs gadgetfs {0}",
                    config.paths.root.display()
                );
            }
            process::exit(1);
        }
    };

    driver.run();
    Ok(())
}

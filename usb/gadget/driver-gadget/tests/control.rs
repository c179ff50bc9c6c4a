mod util;

use driver_gadget::descriptors::{winusb_os_string, WINUSB_EXT_COMPAT_ID};
use driver_gadget::gadgetfs::Event;
use driver_gadget::strings::STRING_ID_MANUFACTURER;
use driver_gadget::usb::Setup;
use driver_gadget::{GadgetConfig, GadgetDriver, StartupError};

use util::{
    get_descriptor, get_interface, set_configuration, set_interface, wait_until, MockGadget, Op,
};

fn start() -> (MockGadget, GadgetConfig, GadgetDriver<MockGadget>) {
    start_with(GadgetConfig::default())
}

fn start_with(config: GadgetConfig) -> (MockGadget, GadgetConfig, GadgetDriver<MockGadget>) {
    let gadget = MockGadget::default();
    let driver = GadgetDriver::start(gadget.clone(), &config).unwrap();
    gadget.control(&config).take_ops();
    (gadget, config, driver)
}

fn vendor_request(length: u16) -> Setup {
    Setup {
        kind: 0xC0,
        request: 0xCD,
        value: 0,
        index: 4,
        length,
    }
}

#[test]
fn startup_writes_descriptors() {
    let config = GadgetConfig::default();
    let gadget = MockGadget::default();
    let _driver = GadgetDriver::start(gadget.clone(), &config).unwrap();

    let writes = gadget.control(&config).writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].len(), 86);
    assert_eq!(&writes[0][..4], &[0, 0, 0, 0]);
    // No bulk endpoint is touched before the host configures the device.
    assert_eq!(gadget.ep_in(&config).opens(), 0);
    assert_eq!(gadget.ep_out(&config).opens(), 0);
}

#[test]
fn startup_short_write_is_fatal() {
    let config = GadgetConfig::default();
    let gadget = MockGadget::default();
    gadget.control(&config).lock().short_write = Some(40);
    match GadgetDriver::start(gadget, &config) {
        Err(StartupError::ShortWrite { written, expected }) => {
            assert_eq!((written, expected), (40, 86));
        }
        _ => panic!("expected a short write error"),
    }
}

#[test]
fn startup_open_failure() {
    let config = GadgetConfig::default();
    let gadget = MockGadget::default();
    gadget.control(&config).lock().fail_open = true;
    assert!(matches!(
        GadgetDriver::start(gadget, &config),
        Err(StartupError::Open { .. })
    ));
}

#[test]
fn winusb_string() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&get_descriptor(3, 0xEE, 0, 0x12));
    assert_eq!(
        gadget.control(&config).ops(),
        [Op::Write(winusb_os_string(0xCD).to_vec())]
    );
}

#[test]
fn string_lookup() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&get_descriptor(3, STRING_ID_MANUFACTURER, 0x0409, 255));

    let mut expected = vec![2 + 2 * 13, 3];
    for unit in "StepOver Test".encode_utf16() {
        expected.extend_from_slice(&unit.to_le_bytes());
    }
    assert_eq!(gadget.control(&config).ops(), [Op::Write(expected)]);
}

#[test]
fn language_string() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&get_descriptor(3, 0, 0, 255));
    assert_eq!(
        gadget.control(&config).ops(),
        [Op::Write(vec![4, 3, 0x09, 0x04])]
    );
}

#[test]
fn missing_string_stalls() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&get_descriptor(3, 0x42, 0x0409, 255));
    // Device-to-host request: stalled with a zero-length read, no data stage.
    assert_eq!(gadget.control(&config).ops(), [Op::Read(0)]);
}

#[test]
fn other_descriptors_stall() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&get_descriptor(1, 0, 0, 18));
    driver.handle_setup(&get_descriptor(6, 0, 0, 10));
    assert_eq!(gadget.control(&config).ops(), [Op::Read(0), Op::Read(0)]);
}

#[test]
fn wrong_direction_stalls() {
    let (gadget, config, mut driver) = start();

    let mut setup = get_descriptor(3, 1, 0x0409, 255);
    setup.kind = 0x00;
    driver.handle_setup(&setup);

    let mut setup = set_configuration(1);
    setup.kind = 0x80;
    driver.handle_setup(&setup);

    assert_eq!(
        gadget.control(&config).ops(),
        [Op::Write(Vec::new()), Op::Read(0)]
    );
    assert_eq!(gadget.ep_in(&config).opens(), 0);
}

#[test]
fn unknown_request_stalls() {
    let (gadget, config, mut driver) = start();
    let mut setup = set_configuration(0);
    setup.request = 0x42;
    driver.handle_setup(&setup);
    setup.kind = 0x80;
    driver.handle_setup(&setup);
    assert_eq!(
        gadget.control(&config).ops(),
        [Op::Write(Vec::new()), Op::Read(0)]
    );
}

#[test]
fn get_interface_returns_alt_setting() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&get_interface(0));
    assert_eq!(gadget.control(&config).ops(), [Op::Write(vec![0])]);
}

#[test]
fn vendor_request_returns_compat_id() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&vendor_request(40));
    driver.handle_setup(&vendor_request(16));
    assert_eq!(
        gadget.control(&config).ops(),
        [
            Op::Write(WINUSB_EXT_COMPAT_ID.to_vec()),
            Op::Write(WINUSB_EXT_COMPAT_ID[..16].to_vec()),
        ]
    );
}

#[test]
fn set_configuration_starts_workers() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&set_configuration(1));

    assert_eq!(gadget.control(&config).ops(), [Op::Read(0)]);
    for node in [gadget.ep_in(&config), gadget.ep_out(&config)] {
        let writes = node.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 18);
        assert_eq!(&writes[0][..4], &[1, 0, 0, 0]);
    }
    assert_eq!(driver.workers().live_count(), 2);
    assert!(driver.endpoints().is_open());

    driver.shutdown();
    assert_eq!(driver.workers().live_count(), 0);
    assert_eq!(gadget.ep_in(&config).live(), 0);
    assert_eq!(gadget.ep_out(&config).live(), 0);
}

#[test]
fn reconfigure_restarts_workers_once() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&set_configuration(1));
    assert_eq!(driver.workers().live_count(), 2);

    driver.handle_setup(&set_configuration(0));
    assert!(driver.workers().is_stopped());
    assert!(wait_until(|| !driver.workers().is_running()));

    driver.handle_setup(&set_configuration(1));
    assert_eq!(driver.workers().live_count(), 2);
    assert_eq!(gadget.ep_in(&config).opens(), 2);
    assert_eq!(gadget.ep_out(&config).opens(), 2);
    assert_eq!(gadget.ep_in(&config).live(), 1);
    assert_eq!(gadget.ep_out(&config).live(), 1);

    // Configuring again while running replaces the workers instead of adding more.
    driver.handle_setup(&set_configuration(1));
    assert_eq!(driver.workers().live_count(), 2);
    assert_eq!(gadget.ep_in(&config).live(), 1);

    assert_eq!(
        gadget.control(&config).ops(),
        [Op::Read(0), Op::Read(0), Op::Read(0), Op::Read(0)]
    );
    driver.shutdown();
}

#[test]
fn unhandled_configuration_value() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&set_configuration(7));
    assert_eq!(gadget.control(&config).ops(), [Op::Read(0)]);
    assert_eq!(gadget.ep_in(&config).opens(), 0);
    assert!(!driver.workers().is_running());

    // Running workers are left alone too.
    driver.handle_setup(&set_configuration(1));
    assert_eq!(driver.workers().live_count(), 2);
    gadget.control(&config).take_ops();

    driver.handle_setup(&set_configuration(7));
    assert_eq!(gadget.control(&config).ops(), [Op::Read(0)]);
    assert!(!driver.workers().is_stopped());
    assert_eq!(driver.workers().live_count(), 2);
    assert_eq!(gadget.ep_in(&config).opens(), 1);
    assert_eq!(gadget.ep_in(&config).live(), 1);
    driver.shutdown();
}

#[test]
fn unconfigure_closes_endpoints() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&set_configuration(1));
    assert_eq!(gadget.ep_in(&config).live(), 1);
    assert_eq!(gadget.ep_out(&config).live(), 1);

    driver.handle_setup(&set_configuration(0));
    assert!(wait_until(|| !driver.workers().is_running()));
    assert!(!driver.endpoints().is_open());
    assert_eq!(gadget.ep_in(&config).live(), 0);
    assert_eq!(gadget.ep_out(&config).live(), 0);
}

#[test]
fn endpoint_failure_still_acks() {
    let config = GadgetConfig::default();
    let gadget = MockGadget::default();
    gadget.ep_out(&config).lock().short_write = Some(4);
    let mut driver = GadgetDriver::start(gadget.clone(), &config).unwrap();
    gadget.control(&config).take_ops();

    driver.handle_setup(&set_configuration(1));
    assert_eq!(gadget.control(&config).ops(), [Op::Read(0)]);
    assert!(!driver.workers().is_running());
    assert!(!driver.endpoints().is_open());
    // The IN endpoint opened before the failure is released again.
    assert_eq!(gadget.ep_in(&config).live(), 0);
    assert_eq!(gadget.ep_out(&config).live(), 0);
}

#[test]
fn tx_disabled() {
    let mut config = GadgetConfig::default();
    config.diagnostics.tx_enable = false;
    let (gadget, config, mut driver) = start_with(config);

    driver.handle_setup(&set_configuration(1));
    assert_eq!(gadget.ep_in(&config).opens(), 0);
    assert_eq!(gadget.ep_out(&config).opens(), 1);
    assert_eq!(driver.workers().live_count(), 1);
    driver.shutdown();
}

#[test]
fn set_interface_clears_halt() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&set_configuration(1));
    gadget.ep_in(&config).take_ops();
    gadget.ep_out(&config).take_ops();
    gadget.control(&config).take_ops();

    driver.handle_setup(&set_interface(0, 0));
    assert_eq!(gadget.control(&config).ops(), [Op::Read(0)]);
    assert_eq!(gadget.ep_in(&config).ops(), [Op::ClearHalt]);
    assert!(gadget.ep_out(&config).ops().contains(&Op::ClearHalt));
    driver.shutdown();
}

#[test]
fn disconnect_stops_workers() {
    let (gadget, config, mut driver) = start();
    driver.handle_setup(&set_configuration(1));
    assert!(driver.workers().is_running());

    driver.handle_event(Event::Disconnect);
    assert!(wait_until(|| !driver.workers().is_running()));
    assert!(!driver.endpoints().is_open());
    assert_eq!(gadget.ep_in(&config).live(), 0);

    driver.handle_event(Event::Connect);
    driver.handle_setup(&set_configuration(1));
    assert_eq!(driver.workers().live_count(), 2);

    driver.handle_event(Event::Suspend);
    assert!(wait_until(|| !driver.workers().is_running()));
    assert_eq!(gadget.ep_out(&config).live(), 0);
}

#[test]
fn run_until_unplugged() {
    let (gadget, config, mut driver) = start();
    gadget.control(&config).push_events(&[
        Event::Connect,
        Event::Setup(get_descriptor(3, 0xEE, 0, 0x12)),
        Event::Setup(set_configuration(1)),
    ]);
    gadget.control(&config).push_events(&[Event::Nop, Event::Setup(get_interface(0))]);

    driver.run();

    let ops = gadget.control(&config).ops();
    assert_eq!(
        ops,
        [
            Op::Read(36),
            Op::Write(winusb_os_string(0xCD).to_vec()),
            Op::Read(0),
            Op::Read(24),
            Op::Write(vec![0]),
        ]
    );
    assert!(!driver.workers().is_running());
    assert_eq!(gadget.ep_in(&config).live(), 0);
    assert_eq!(gadget.ep_out(&config).live(), 0);
}

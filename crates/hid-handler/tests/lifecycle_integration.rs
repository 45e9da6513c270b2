//! Integration tests for device registration and teardown.
//!
//! These tests drive [`HidHandler`] through its public API against the
//! in-memory USB bus.  They verify:
//!
//! - Registration is idempotent per device key.
//! - Unregistration always removes the device, even when releasing an
//!   interface fails, and surfaces the failure afterwards.
//! - A device that vanished mid-teardown is not an error.
//! - `stop()` is safe without `start()` and tears everything down after it.
//! - Notifications left over from an earlier registration of a device do
//!   not reach its current registration.

use std::collections::BTreeMap;
use std::sync::Arc;

use hid_handler::infrastructure::usb::mock::{MockUsbBus, MockUsbDevice};
use hid_handler::infrastructure::usb::{EndpointDirection, UsbDevice, UsbTransport};
use hid_handler::{HandlerConfig, HidHandler, Notification};
use hid_handler_core::{DeviceKey, DeviceType, SupportedDevice, TransportError};
use tokio::sync::broadcast::error::RecvError;
use tokio_test::{assert_err, assert_ok};

const MOUSE: (u16, u16) = (0x192f, 0x0416);
const KEYBOARD: (u16, u16) = (0x04d9, 0x1702);

fn handler_on(bus: &Arc<MockUsbBus>) -> HidHandler {
    HidHandler::new(Arc::clone(bus) as Arc<dyn UsbTransport>)
}

fn single(device_type: DeviceType) -> BTreeMap<u8, DeviceType> {
    BTreeMap::from([(0, device_type)])
}

// ── Registration ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_registering_same_key_twice_keeps_one_entry() {
    // Arrange
    let bus = Arc::new(MockUsbBus::new());
    let device = Arc::new(MockUsbDevice::hid(MOUSE.0, MOUSE.1));
    let mut handler = handler_on(&bus);

    // Act
    let first = assert_ok!(handler.register_hid(single(DeviceType::Mouse), device.clone()).await);
    let second = assert_ok!(handler.register_hid(single(DeviceType::Mouse), device.clone()).await);

    // Assert – the second attempt never touched the device
    assert!(first);
    assert!(!second);
    assert_eq!(handler.registered_hid_keys(), vec![DeviceKey::new(MOUSE.0, MOUSE.1)]);
    assert_eq!(device.calls().iter().filter(|c| *c == "open").count(), 1);
}

#[tokio::test]
async fn test_composite_device_claims_each_typed_interface() {
    let bus = Arc::new(MockUsbBus::new());
    let device = Arc::new(
        MockUsbDevice::hid(KEYBOARD.0, KEYBOARD.1)
            .with_interface(1, &[EndpointDirection::In])
            .with_interface(2, &[EndpointDirection::In]),
    );
    let mut handler = handler_on(&bus);
    let types = BTreeMap::from([(0, DeviceType::Keyboard), (1, DeviceType::Mouse)]);

    assert_ok!(handler.register_hid(types.clone(), device.clone()).await);

    assert_eq!(device.claimed_interfaces(), vec![0, 1]);
    let hid = handler.registered_hid_by_ids(KEYBOARD.0, KEYBOARD.1).unwrap();
    assert_eq!(hid.types(), types);
    assert!(!device.is_polling(2, 0));
}

#[tokio::test]
async fn test_failed_claim_rolls_back_and_leaves_no_entry() {
    let bus = Arc::new(MockUsbBus::new());
    let device = Arc::new(MockUsbDevice::hid(MOUSE.0, MOUSE.1));
    device.fail_claim_with(TransportError::Busy);
    let mut handler = handler_on(&bus);

    let err = assert_err!(handler.register_hid(single(DeviceType::Mouse), device.clone()).await);

    assert_eq!(err.code(), "TRANSPORT");
    assert!(!device.is_open());
    assert!(handler.registered_hids().is_empty());
}

#[tokio::test]
async fn test_reregistration_starts_with_fresh_decoder_state() {
    // Arrange – a press is recorded, then the device is re-registered
    let bus = Arc::new(MockUsbBus::new());
    let device = Arc::new(MockUsbDevice::hid(MOUSE.0, MOUSE.1));
    let mut handler = handler_on(&bus);
    let key = device.key();
    assert_ok!(handler.register_hid(single(DeviceType::Mouse), device.clone()).await);
    device.send_data(0, 0, &[0x01, 0, 0, 0, 0, 0]);
    handler.process_pending().await;
    assert_ok!(handler.unregister_hid(&key).await);
    assert_ok!(handler.register_hid(single(DeviceType::Mouse), device.clone()).await);
    let mut rx = handler.subscribe();

    // Act – a release without a press seen in this registration
    device.send_data(0, 0, &[0x00, 0, 0, 0, 0, 0]);
    handler.process_pending().await;

    // Assert – no click, since the previous press belongs to the old session
    let Ok(Notification::Hid { event, .. }) = rx.try_recv() else {
        panic!("expected an event notification");
    };
    assert!(event.pointer().unwrap().button.is_empty());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_end_of_polling_from_previous_registration_is_ignored() {
    // Arrange – stopping queues the poller's end of polling
    let bus = Arc::new(MockUsbBus::new());
    let mouse = Arc::new(MockUsbDevice::hid(MOUSE.0, MOUSE.1));
    bus.connect(mouse.clone());
    let mut handler = handler_on(&bus);
    let config = HandlerConfig::with_devices(vec![SupportedDevice::new(MOUSE.0, MOUSE.1, "mouse")]);
    assert_ok!(handler.start(Some(config)).await);
    let first = handler.registered_hid(&mouse.key()).unwrap().session();
    assert_ok!(handler.stop().await);
    assert_ok!(handler.start(None).await);
    let mut rx = handler.subscribe();

    // Act
    handler.process_pending().await;
    mouse.send_data(0, 0, &[0, 0, 0, 0, 0, 0]);
    handler.process_pending().await;

    // Assert – the new registration still delivers events
    let hid = handler.registered_hid(&mouse.key()).unwrap();
    assert_ne!(hid.session(), first);
    assert!(hid.interface(0).unwrap().is_polled(0));
    assert!(matches!(rx.try_recv(), Ok(Notification::Hid { .. })));
}

#[tokio::test]
async fn test_sample_queued_before_reregistration_is_dropped() {
    // Arrange – a press is read but not handled before re-registration
    let bus = Arc::new(MockUsbBus::new());
    let device = Arc::new(MockUsbDevice::hid(MOUSE.0, MOUSE.1));
    let mut handler = handler_on(&bus);
    let key = device.key();
    assert_ok!(handler.register_hid(single(DeviceType::Mouse), device.clone()).await);
    device.send_data(0, 0, &[0x01, 0, 0, 0, 0, 0]);
    assert_ok!(handler.unregister_hid(&key).await);
    assert_ok!(handler.register_hid(single(DeviceType::Mouse), device.clone()).await);
    let mut rx = handler.subscribe();

    // Act
    handler.process_pending().await;
    device.send_data(0, 0, &[0x00, 0, 0, 0, 0, 0]);
    handler.process_pending().await;

    // Assert – only the release is decoded, and it is no click
    let Ok(Notification::Hid { event, .. }) = rx.try_recv() else {
        panic!("expected an event notification");
    };
    assert_eq!(event.data, vec![0x00, 0, 0, 0, 0, 0]);
    assert!(event.pointer().unwrap().button.is_empty());
    assert!(rx.try_recv().is_err());
}

// ── Unregistration ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unregister_removes_entry_even_when_release_fails() {
    // Arrange
    let bus = Arc::new(MockUsbBus::new());
    let device = Arc::new(MockUsbDevice::hid(MOUSE.0, MOUSE.1));
    let mut handler = handler_on(&bus);
    assert_ok!(handler.register_hid(single(DeviceType::Mouse), device.clone()).await);
    device.fail_release_with(TransportError::Access);

    // Act
    let err = assert_err!(handler.unregister_hid(&device.key()).await);

    // Assert – error surfaced after cleanup, entry gone, device closed
    assert!(matches!(
        err,
        hid_handler_core::HandlerError::Transport(TransportError::Access)
    ));
    assert!(handler.registered_hid(&device.key()).is_none());
    assert!(!device.is_open());
    assert_eq!(device.calls().last().map(String::as_str), Some("close"));
}

#[tokio::test]
async fn test_release_of_removed_device_is_not_an_error() {
    let bus = Arc::new(MockUsbBus::new());
    let device = Arc::new(MockUsbDevice::hid(MOUSE.0, MOUSE.1));
    bus.connect(device.clone());
    let mut handler = handler_on(&bus);
    assert_ok!(handler.register_hid(single(DeviceType::Mouse), device.clone()).await);
    bus.unplug(MOUSE.0, MOUSE.1);

    assert_ok!(handler.unregister_hid(&device.key()).await);

    assert!(handler.registered_hids().is_empty());
}

#[tokio::test]
async fn test_unregister_closes_device_channel_with_end_signal() {
    let bus = Arc::new(MockUsbBus::new());
    let device = Arc::new(MockUsbDevice::hid(MOUSE.0, MOUSE.1));
    let mut handler = handler_on(&bus);
    assert_ok!(handler.register_hid(single(DeviceType::Mouse), device.clone()).await);
    let mut rx = handler.registered_hid(&device.key()).unwrap().subscribe();

    assert_ok!(handler.unregister_hid(&device.key()).await);

    assert!(matches!(rx.recv().await, Ok(Notification::End)));
    assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
}

// ── Start / stop ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_without_start_is_a_noop() {
    let bus = Arc::new(MockUsbBus::new());
    let mut handler = handler_on(&bus);

    assert_ok!(handler.stop().await);

    assert!(!handler.is_started());
}

#[tokio::test]
async fn test_start_registers_connected_devices_and_stop_releases_them() {
    // Arrange – one supported device connected, one supported device absent
    let bus = Arc::new(MockUsbBus::new());
    let mouse = Arc::new(MockUsbDevice::hid(MOUSE.0, MOUSE.1));
    bus.connect(mouse.clone());
    let mut handler = handler_on(&bus);
    let config = HandlerConfig::with_devices(vec![
        SupportedDevice::new(MOUSE.0, MOUSE.1, "mouse"),
        SupportedDevice::new(KEYBOARD.0, KEYBOARD.1, "keyboard"),
    ]);

    // Act
    assert_ok!(handler.start(Some(config)).await);
    let registered = handler.registered_hid_keys();
    let mut rx = handler.subscribe();
    assert_ok!(handler.stop().await);

    // Assert
    assert_eq!(registered, vec![mouse.key()]);
    assert!(handler.registered_hids().is_empty());
    assert!(!handler.is_started());
    assert!(!bus.is_subscribed());
    assert!(mouse.claimed_interfaces().is_empty());
    assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
}

#[tokio::test]
async fn test_start_twice_is_a_noop() {
    let bus = Arc::new(MockUsbBus::new());
    let mouse = Arc::new(MockUsbDevice::hid(MOUSE.0, MOUSE.1));
    bus.connect(mouse.clone());
    let mut handler = handler_on(&bus);
    let config = HandlerConfig::with_devices(vec![SupportedDevice::new(MOUSE.0, MOUSE.1, "mouse")]);

    assert_ok!(handler.start(Some(config.clone())).await);
    assert_ok!(handler.start(Some(config)).await);

    assert_eq!(mouse.calls().iter().filter(|c| *c == "open").count(), 1);
    assert!(handler.is_started());
}

//! USB transport capability surface.
//!
//! The handler never talks to libusb directly.  It consumes two traits:
//!
//! - [`UsbTransport`] – enumeration and hot-plug subscription;
//! - [`UsbDevice`] – one physical device: open/close, interface claim and
//!   release, kernel-driver handoff, endpoint polling.
//!
//! Everything asynchronous the transport observes (hot-plug attach/detach,
//! endpoint data/error/end) is delivered as a [`UsbNotification`] into a
//! single queue owned by the handler.  The handler drains that queue one
//! notification at a time, which keeps all state mutation on one task while
//! preserving per-endpoint order.
//!
//! Endpoint notifications carry the session id given to
//! [`UsbDevice::start_poll`].  Every registration uses a new session, so a
//! notification still queued from an earlier registration of the same
//! device can be told apart and dropped.
//!
//! # Testability
//!
//! [`mock::MockUsbBus`] and [`mock::MockUsbDevice`] implement both traits in
//! memory so the lifecycle can be tested without hardware.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hid_handler_core::{DeviceKey, TransportError};
use tokio::sync::mpsc;

#[cfg(feature = "libusb")]
pub mod libusb;
pub mod mock;

/// Direction of an endpoint, seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDirection {
    /// Device to host.
    In,
    /// Host to device.
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Position of the endpoint within its interface.
    pub index: u8,
    /// USB endpoint address (direction bit included).
    pub address: u8,
    pub direction: EndpointDirection,
    pub max_packet_size: u16,
}

impl EndpointInfo {
    pub fn is_in(&self) -> bool {
        self.direction == EndpointDirection::In
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub index: u8,
    pub endpoints: Vec<EndpointInfo>,
}

impl InterfaceInfo {
    /// Device-to-host endpoints of the interface.
    pub fn in_endpoints(&self) -> impl Iterator<Item = &EndpointInfo> {
        self.endpoints.iter().filter(|ep| ep.is_in())
    }
}

/// Identity and bus position of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub address: u8,
}

impl DeviceDescriptor {
    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.vendor_id, self.product_id)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (bus {:03} device {:03})",
            self.key(),
            self.bus_number,
            self.address
        )
    }
}

/// Something the transport observed.
#[derive(Debug, Clone)]
pub enum UsbNotification {
    Attached(Arc<dyn UsbDevice>),
    Detached(DeviceDescriptor),
    /// One raw sample read from a polled endpoint.
    Data {
        key: DeviceKey,
        session: u64,
        interface: u8,
        endpoint: u8,
        sample: Vec<u8>,
    },
    /// Polling of an endpoint failed.
    Error {
        key: DeviceKey,
        session: u64,
        interface: u8,
        endpoint: u8,
        error: TransportError,
    },
    /// Polling of an endpoint ended; no more data will follow.
    End {
        key: DeviceKey,
        session: u64,
        interface: u8,
        endpoint: u8,
    },
}

/// Queue into which transports deliver notifications.
pub type NotificationSink = mpsc::UnboundedSender<UsbNotification>;

/// Enumeration and hot-plug surface of a USB stack.
///
/// The production implementation is [`libusb::LibusbTransport`] (feature
/// `libusb`); tests use [`mock::MockUsbBus`].
#[cfg_attr(test, mockall::automock)]
pub trait UsbTransport: Send + Sync {
    /// First connected device with the given ids.
    fn find_by_ids(&self, vendor_id: u16, product_id: u16) -> Option<Arc<dyn UsbDevice>>;

    /// Every connected device.
    fn device_list(&self) -> Vec<Arc<dyn UsbDevice>>;

    /// Starts delivering `Attached`/`Detached` notifications into `sink`.
    fn subscribe_hotplug(&self, sink: NotificationSink) -> Result<(), TransportError>;

    /// Stops hot-plug delivery.  A no-op when not subscribed.
    fn unsubscribe_hotplug(&self);
}

/// One physical USB device.
///
/// Operations other than [`UsbDevice::descriptor`] and [`UsbDevice::close`]
/// fail with [`TransportError::NoDevice`] once the device is unplugged.
#[async_trait]
pub trait UsbDevice: Send + Sync + fmt::Debug {
    fn descriptor(&self) -> DeviceDescriptor;

    fn open(&self) -> Result<(), TransportError>;

    /// Closes the device handle.  A no-op when not open.
    fn close(&self);

    /// Performs a USB port reset.
    fn reset(&self) -> Result<(), TransportError>;

    /// Interfaces of the active configuration.
    fn interfaces(&self) -> Result<Vec<InterfaceInfo>, TransportError>;

    fn is_kernel_driver_active(&self, interface: u8) -> Result<bool, TransportError>;

    fn detach_kernel_driver(&self, interface: u8) -> Result<(), TransportError>;

    fn attach_kernel_driver(&self, interface: u8) -> Result<(), TransportError>;

    fn claim_interface(&self, interface: u8) -> Result<(), TransportError>;

    async fn release_interface(&self, interface: u8) -> Result<(), TransportError>;

    /// Starts polling `endpoint`; samples, errors and the end of polling are
    /// delivered into `sink`, tagged with `session`.
    fn start_poll(
        &self,
        interface: u8,
        endpoint: &EndpointInfo,
        session: u64,
        sink: NotificationSink,
    ) -> Result<(), TransportError>;

    /// Stops polling and waits until the poller has finished.  The poller
    /// delivers `End` on its way out.
    async fn stop_poll(&self, interface: u8, endpoint: u8) -> Result<(), TransportError>;

    fn is_polling(&self, interface: u8, endpoint: u8) -> bool;
}

//! A device the handler has opened, claimed and is polling.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use hid_handler_core::{DecoderState, DeviceKey, DeviceType};
use tokio::sync::broadcast;

use super::channel::{EventChannel, Notification};
use crate::infrastructure::usb::{DeviceDescriptor, EndpointInfo, UsbDevice};

/// One claimed interface of a registered device.
#[derive(Debug)]
pub struct ClaimedInterface {
    pub index: u8,
    pub device_type: DeviceType,
    /// Keyboard layout assigned in the configuration, if any.
    pub layout: Option<String>,
    /// Polled "in" endpoints.
    pub endpoints: Vec<EndpointInfo>,
    /// Whether registration detached a kernel driver from this interface.
    pub kernel_driver_detached: bool,
    /// Decoder state shared by every endpoint of the interface.
    pub state: DecoderState,
    /// Endpoints whose polling has ended.
    pub ended: BTreeSet<u8>,
}

impl ClaimedInterface {
    pub fn new(index: u8, device_type: DeviceType, layout: Option<String>) -> Self {
        Self {
            index,
            device_type,
            layout,
            endpoints: Vec::new(),
            kernel_driver_detached: false,
            state: DecoderState::default(),
            ended: BTreeSet::new(),
        }
    }

    pub fn is_polled(&self, endpoint: u8) -> bool {
        self.endpoints.iter().any(|ep| ep.index == endpoint) && !self.ended.contains(&endpoint)
    }
}

/// A registered device.
///
/// Created by a successful registration and dropped on unregistration.  A
/// fresh registration always starts with empty decoder state and a session
/// id no earlier registration used.
#[derive(Debug)]
pub struct RegisteredDevice {
    pub(crate) key: DeviceKey,
    pub(crate) session: u64,
    pub(crate) name: Option<String>,
    pub(crate) device: Arc<dyn UsbDevice>,
    pub(crate) interfaces: BTreeMap<u8, ClaimedInterface>,
    pub(crate) channel: EventChannel,
}

impl RegisteredDevice {
    pub(crate) fn new(device: Arc<dyn UsbDevice>, name: Option<String>, session: u64) -> Self {
        Self {
            key: device.descriptor().key(),
            session,
            name,
            device,
            interfaces: BTreeMap::new(),
            channel: EventChannel::new(),
        }
    }

    pub fn key(&self) -> DeviceKey {
        self.key
    }

    /// Session id carried by the endpoint notifications of this
    /// registration.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Display name from the configuration.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn descriptor(&self) -> DeviceDescriptor {
        self.device.descriptor()
    }

    /// The transport device handle.
    pub fn device(&self) -> &Arc<dyn UsbDevice> {
        &self.device
    }

    /// Device type per claimed interface index.
    pub fn types(&self) -> BTreeMap<u8, DeviceType> {
        self.interfaces
            .iter()
            .map(|(index, interface)| (*index, interface.device_type.clone()))
            .collect()
    }

    pub fn interface(&self, index: u8) -> Option<&ClaimedInterface> {
        self.interfaces.get(&index)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &ClaimedInterface> {
        self.interfaces.values()
    }

    /// Receiver of this device's events.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.channel.subscribe()
    }

    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }
}

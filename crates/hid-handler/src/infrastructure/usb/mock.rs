//! In-memory USB transport for testing.
//!
//! [`MockUsbBus`] holds a set of [`MockUsbDevice`]s that tests plug and unplug
//! at will.  Devices record every call made on them and let tests inject
//! endpoint data, errors and failures.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hid_handler_core::{DeviceKey, TransportError};

use super::{
    DeviceDescriptor, EndpointDirection, EndpointInfo, InterfaceInfo, NotificationSink,
    UsbDevice, UsbNotification, UsbTransport,
};

#[derive(Debug, Default)]
struct DeviceState {
    open: bool,
    unplugged: bool,
    kernel_driver_active: BTreeSet<u8>,
    claimed: BTreeSet<u8>,
    /// Session and sink per polled `(interface, endpoint)`.
    polls: BTreeMap<(u8, u8), (u64, NotificationSink)>,
    calls: Vec<String>,
    fail_claim: Option<TransportError>,
    fail_release: Option<TransportError>,
    resets: u32,
}

/// A recording fake device.
#[derive(Debug)]
pub struct MockUsbDevice {
    descriptor: DeviceDescriptor,
    interfaces: Vec<InterfaceInfo>,
    state: Mutex<DeviceState>,
}

impl MockUsbDevice {
    /// A device with no interfaces.
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            descriptor: DeviceDescriptor {
                vendor_id,
                product_id,
                bus_number: 1,
                address: 1,
            },
            interfaces: Vec::new(),
            state: Mutex::new(DeviceState::default()),
        }
    }

    /// A typical boot-protocol HID device: interface 0 with one interrupt
    /// "in" endpoint (0x81) and one "out" endpoint (0x02).
    pub fn hid(vendor_id: u16, product_id: u16) -> Self {
        Self::new(vendor_id, product_id).with_interface(
            0,
            &[EndpointDirection::In, EndpointDirection::Out],
        )
    }

    /// Adds an interface whose endpoints have the given directions.
    pub fn with_interface(mut self, index: u8, directions: &[EndpointDirection]) -> Self {
        let endpoints = directions
            .iter()
            .enumerate()
            .map(|(i, direction)| {
                let number = i as u8 + 1;
                EndpointInfo {
                    index: i as u8,
                    address: match direction {
                        EndpointDirection::In => 0x80 | number,
                        EndpointDirection::Out => number,
                    },
                    direction: *direction,
                    max_packet_size: 8,
                }
            })
            .collect();
        self.interfaces.push(InterfaceInfo { index, endpoints });
        self
    }

    /// Marks a kernel driver as bound to `interface`.
    pub fn with_kernel_driver(self, interface: u8) -> Self {
        self.lock().kernel_driver_active.insert(interface);
        self
    }

    /// Makes every subsequent `claim_interface` fail with `error`.
    pub fn fail_claim_with(&self, error: TransportError) {
        self.lock().fail_claim = Some(error);
    }

    /// Makes every subsequent `release_interface` fail with `error`.
    pub fn fail_release_with(&self, error: TransportError) {
        self.lock().fail_release = Some(error);
    }

    /// Calls recorded so far, e.g. `["open", "claim 0", "start_poll 0/0"]`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn claimed_interfaces(&self) -> Vec<u8> {
        self.lock().claimed.iter().copied().collect()
    }

    pub fn kernel_driver_bound(&self, interface: u8) -> bool {
        self.lock().kernel_driver_active.contains(&interface)
    }

    pub fn reset_count(&self) -> u32 {
        self.lock().resets
    }

    pub fn key(&self) -> DeviceKey {
        self.descriptor.key()
    }

    /// Delivers a sample as if read from a polled endpoint.
    ///
    /// Returns `false` when the endpoint is not being polled.
    pub fn send_data(&self, interface: u8, endpoint: u8, sample: &[u8]) -> bool {
        self.notify(interface, endpoint, |key, session| UsbNotification::Data {
            key,
            session,
            interface,
            endpoint,
            sample: sample.to_vec(),
        })
    }

    /// Delivers a polling error.
    pub fn send_error(&self, interface: u8, endpoint: u8, error: TransportError) -> bool {
        self.notify(interface, endpoint, |key, session| UsbNotification::Error {
            key,
            session,
            interface,
            endpoint,
            error,
        })
    }

    /// Ends polling of the endpoint, as a poller does when its transfer
    /// loop exits.
    pub fn send_end(&self, interface: u8, endpoint: u8) -> bool {
        let poll = self.lock().polls.remove(&(interface, endpoint));
        self.end_poll(interface, endpoint, poll)
    }

    fn end_poll(&self, interface: u8, endpoint: u8, poll: Option<(u64, NotificationSink)>) -> bool {
        match poll {
            Some((session, sink)) => sink
                .send(UsbNotification::End {
                    key: self.key(),
                    session,
                    interface,
                    endpoint,
                })
                .is_ok(),
            None => false,
        }
    }

    fn notify(
        &self,
        interface: u8,
        endpoint: u8,
        build: impl FnOnce(DeviceKey, u64) -> UsbNotification,
    ) -> bool {
        let key = self.key();
        let state = self.lock();
        match state.polls.get(&(interface, endpoint)) {
            Some((session, sink)) => sink.send(build(key, *session)).is_ok(),
            None => false,
        }
    }

    fn unplug(&self) {
        let mut state = self.lock();
        state.unplugged = true;
        state.open = false;
        state.claimed.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DeviceState> {
        self.state.lock().expect("lock poisoned")
    }

    /// Records `call` and fails with `NoDevice` once unplugged.
    fn record(&self, call: String) -> Result<std::sync::MutexGuard<'_, DeviceState>, TransportError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.unplugged {
            return Err(TransportError::NoDevice);
        }
        Ok(state)
    }
}

#[async_trait]
impl UsbDevice for MockUsbDevice {
    fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor
    }

    fn open(&self) -> Result<(), TransportError> {
        self.record("open".into())?.open = true;
        Ok(())
    }

    fn close(&self) {
        let mut state = self.lock();
        state.calls.push("close".into());
        state.open = false;
    }

    /// Needs an open handle, like a real port reset.
    fn reset(&self) -> Result<(), TransportError> {
        let mut state = self.record("reset".into())?;
        if !state.open {
            return Err(TransportError::Other("device is not open".into()));
        }
        state.resets += 1;
        Ok(())
    }

    fn interfaces(&self) -> Result<Vec<InterfaceInfo>, TransportError> {
        if self.lock().unplugged {
            return Err(TransportError::NoDevice);
        }
        Ok(self.interfaces.clone())
    }

    fn is_kernel_driver_active(&self, interface: u8) -> Result<bool, TransportError> {
        let state = self.lock();
        if state.unplugged {
            return Err(TransportError::NoDevice);
        }
        Ok(state.kernel_driver_active.contains(&interface))
    }

    fn detach_kernel_driver(&self, interface: u8) -> Result<(), TransportError> {
        self.record(format!("detach_kernel_driver {interface}"))?
            .kernel_driver_active
            .remove(&interface);
        Ok(())
    }

    fn attach_kernel_driver(&self, interface: u8) -> Result<(), TransportError> {
        self.record(format!("attach_kernel_driver {interface}"))?
            .kernel_driver_active
            .insert(interface);
        Ok(())
    }

    fn claim_interface(&self, interface: u8) -> Result<(), TransportError> {
        let mut state = self.record(format!("claim {interface}"))?;
        if let Some(error) = state.fail_claim.clone() {
            return Err(error);
        }
        state.claimed.insert(interface);
        Ok(())
    }

    async fn release_interface(&self, interface: u8) -> Result<(), TransportError> {
        let mut state = self.record(format!("release {interface}"))?;
        if let Some(error) = state.fail_release.clone() {
            return Err(error);
        }
        state.claimed.remove(&interface);
        Ok(())
    }

    fn start_poll(
        &self,
        interface: u8,
        endpoint: &EndpointInfo,
        session: u64,
        sink: NotificationSink,
    ) -> Result<(), TransportError> {
        let mut state = self.record(format!("start_poll {interface}/{}", endpoint.index))?;
        state
            .polls
            .insert((interface, endpoint.index), (session, sink));
        Ok(())
    }

    /// The stopped poller delivers `End` into its sink, where it stays queued
    /// until the handler gets to it.  Stopping works on an unplugged device
    /// too, since only the poller is involved.
    async fn stop_poll(&self, interface: u8, endpoint: u8) -> Result<(), TransportError> {
        let poll = {
            let mut state = self.lock();
            state.calls.push(format!("stop_poll {interface}/{endpoint}"));
            state.polls.remove(&(interface, endpoint))
        };
        self.end_poll(interface, endpoint, poll);
        Ok(())
    }

    fn is_polling(&self, interface: u8, endpoint: u8) -> bool {
        self.lock().polls.contains_key(&(interface, endpoint))
    }
}

/// A fake USB bus holding plugged [`MockUsbDevice`]s.
#[derive(Debug, Default)]
pub struct MockUsbBus {
    devices: Mutex<Vec<Arc<MockUsbDevice>>>,
    hotplug: Mutex<Option<NotificationSink>>,
}

impl MockUsbBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device that was already connected; no hot-plug notification.
    pub fn connect(&self, device: Arc<MockUsbDevice>) {
        self.devices.lock().expect("lock poisoned").push(device);
    }

    /// Plugs a device in, notifying a hot-plug subscriber if any.
    pub fn plug(&self, device: Arc<MockUsbDevice>) {
        self.connect(Arc::clone(&device));
        if let Some(sink) = self.hotplug.lock().expect("lock poisoned").as_ref() {
            let _ = sink.send(UsbNotification::Attached(device));
        }
    }

    /// Unplugs the device with the given ids, notifying a hot-plug
    /// subscriber if any.  Returns the removed device.
    pub fn unplug(&self, vendor_id: u16, product_id: u16) -> Option<Arc<MockUsbDevice>> {
        let device = {
            let mut devices = self.devices.lock().expect("lock poisoned");
            let position = devices.iter().position(|d| {
                let descriptor = d.descriptor();
                descriptor.vendor_id == vendor_id && descriptor.product_id == product_id
            })?;
            devices.remove(position)
        };
        device.unplug();
        if let Some(sink) = self.hotplug.lock().expect("lock poisoned").as_ref() {
            let _ = sink.send(UsbNotification::Detached(device.descriptor()));
        }
        Some(device)
    }

    pub fn is_subscribed(&self) -> bool {
        self.hotplug.lock().expect("lock poisoned").is_some()
    }
}

impl UsbTransport for MockUsbBus {
    fn find_by_ids(&self, vendor_id: u16, product_id: u16) -> Option<Arc<dyn UsbDevice>> {
        self.devices
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|d| {
                let descriptor = d.descriptor();
                descriptor.vendor_id == vendor_id && descriptor.product_id == product_id
            })
            .map(|d| Arc::clone(d) as Arc<dyn UsbDevice>)
    }

    fn device_list(&self) -> Vec<Arc<dyn UsbDevice>> {
        self.devices
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|d| Arc::clone(d) as Arc<dyn UsbDevice>)
            .collect()
    }

    fn subscribe_hotplug(&self, sink: NotificationSink) -> Result<(), TransportError> {
        *self.hotplug.lock().expect("lock poisoned") = Some(sink);
        Ok(())
    }

    fn unsubscribe_hotplug(&self) {
        *self.hotplug.lock().expect("lock poisoned") = None;
    }
}

//! libusb-backed transport (cargo feature `libusb`).
//!
//! Hot-plug events come from libusb's hot-plug callback, driven by a
//! dedicated event thread.  Each polled endpoint gets its own reader thread
//! performing blocking interrupt transfers with a short timeout, so a stop
//! request is honoured within one timeout period.
//!
//! # Permissions
//!
//! On Linux the process needs write access to `/dev/bus/usb/BBB/DDD`
//! (udev rule or root).  Detaching the kernel HID driver is required before
//! claiming an interface the kernel already owns.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use hid_handler_core::{DeviceKey, TransportError};
use rusb::UsbContext;
use tracing::{debug, trace, warn};

use super::{
    DeviceDescriptor, EndpointDirection, EndpointInfo, InterfaceInfo, NotificationSink,
    UsbDevice, UsbNotification, UsbTransport,
};

/// Interrupt transfer timeout; bounds the latency of `stop_poll`.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Timeout of one libusb event-handling round on the hot-plug thread.
const EVENT_TIMEOUT: Duration = Duration::from_millis(250);

fn map_error(error: rusb::Error) -> TransportError {
    match error {
        rusb::Error::NoDevice => TransportError::NoDevice,
        rusb::Error::Busy => TransportError::Busy,
        rusb::Error::Access => TransportError::Access,
        rusb::Error::NotFound => TransportError::NotFound,
        rusb::Error::Timeout => TransportError::Timeout,
        rusb::Error::NotSupported => TransportError::Unsupported,
        other => TransportError::Other(other.to_string()),
    }
}

// ── Device ────────────────────────────────────────────────────────────────────

struct Poller {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// One device seen through libusb.
pub struct LibusbDevice {
    device: rusb::Device<rusb::Context>,
    descriptor: DeviceDescriptor,
    handle: Mutex<Option<Arc<rusb::DeviceHandle<rusb::Context>>>>,
    pollers: Mutex<BTreeMap<(u8, u8), Poller>>,
}

impl std::fmt::Debug for LibusbDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibusbDevice")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl LibusbDevice {
    fn new(device: rusb::Device<rusb::Context>) -> Result<Self, TransportError> {
        let descriptor = device.device_descriptor().map_err(map_error)?;
        Ok(Self {
            descriptor: DeviceDescriptor {
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
                bus_number: device.bus_number(),
                address: device.address(),
            },
            device,
            handle: Mutex::new(None),
            pollers: Mutex::new(BTreeMap::new()),
        })
    }

    fn handle(&self) -> Result<Arc<rusb::DeviceHandle<rusb::Context>>, TransportError> {
        self.handle
            .lock()
            .map_err(|_| TransportError::Other("device handle lock poisoned".into()))?
            .clone()
            .ok_or_else(|| TransportError::Other("device is not open".into()))
    }

    fn take_poller(&self, interface: u8, endpoint: u8) -> Option<Poller> {
        self.pollers
            .lock()
            .ok()
            .and_then(|mut pollers| pollers.remove(&(interface, endpoint)))
    }
}

/// One endpoint read by a poller thread, and the labels of what it sends.
struct PollTarget {
    key: DeviceKey,
    session: u64,
    interface: u8,
    endpoint: u8,
    address: u8,
    packet_size: usize,
}

/// Reads the target endpoint until stopped, the device disappears or a
/// transfer fails.  `End` is always sent last.
fn poll_endpoint(
    handle: Arc<rusb::DeviceHandle<rusb::Context>>,
    target: PollTarget,
    stop: Arc<AtomicBool>,
    sink: NotificationSink,
) {
    let PollTarget {
        key,
        session,
        interface,
        endpoint,
        address,
        packet_size,
    } = target;
    let mut buf = vec![0u8; packet_size.max(1)];
    while !stop.load(Ordering::Relaxed) {
        match handle.read_interrupt(address, &mut buf, READ_TIMEOUT) {
            Ok(len) => {
                trace!("{key}#{interface}/{endpoint}: read {len} bytes");
                let sample = buf[..len].to_vec();
                if sink
                    .send(UsbNotification::Data {
                        key,
                        session,
                        interface,
                        endpoint,
                        sample,
                    })
                    .is_err()
                {
                    break;
                }
            }
            Err(rusb::Error::Timeout) => continue,
            Err(error) => {
                let _ = sink.send(UsbNotification::Error {
                    key,
                    session,
                    interface,
                    endpoint,
                    error: map_error(error),
                });
                break;
            }
        }
    }
    let _ = sink.send(UsbNotification::End {
        key,
        session,
        interface,
        endpoint,
    });
}

#[async_trait]
impl UsbDevice for LibusbDevice {
    fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor
    }

    fn open(&self) -> Result<(), TransportError> {
        let handle = self.device.open().map_err(map_error)?;
        let mut slot = self
            .handle
            .lock()
            .map_err(|_| TransportError::Other("device handle lock poisoned".into()))?;
        *slot = Some(Arc::new(handle));
        Ok(())
    }

    fn close(&self) {
        if let Ok(mut slot) = self.handle.lock() {
            // The handle closes once the last reader thread drops its clone.
            slot.take();
        }
    }

    fn reset(&self) -> Result<(), TransportError> {
        self.handle()?.reset().map_err(map_error)
    }

    fn interfaces(&self) -> Result<Vec<InterfaceInfo>, TransportError> {
        let config = self.device.active_config_descriptor().map_err(map_error)?;
        let mut interfaces = Vec::new();
        for interface in config.interfaces() {
            // Alternate setting 0 only.
            if let Some(setting) = interface.descriptors().next() {
                let endpoints = setting
                    .endpoint_descriptors()
                    .enumerate()
                    .map(|(index, ep)| EndpointInfo {
                        index: index as u8,
                        address: ep.address(),
                        direction: match ep.direction() {
                            rusb::Direction::In => EndpointDirection::In,
                            rusb::Direction::Out => EndpointDirection::Out,
                        },
                        max_packet_size: ep.max_packet_size(),
                    })
                    .collect();
                interfaces.push(InterfaceInfo {
                    index: interface.number(),
                    endpoints,
                });
            }
        }
        Ok(interfaces)
    }

    fn is_kernel_driver_active(&self, interface: u8) -> Result<bool, TransportError> {
        self.handle()?
            .kernel_driver_active(interface)
            .map_err(map_error)
    }

    fn detach_kernel_driver(&self, interface: u8) -> Result<(), TransportError> {
        self.handle()?
            .detach_kernel_driver(interface)
            .map_err(map_error)
    }

    fn attach_kernel_driver(&self, interface: u8) -> Result<(), TransportError> {
        self.handle()?
            .attach_kernel_driver(interface)
            .map_err(map_error)
    }

    fn claim_interface(&self, interface: u8) -> Result<(), TransportError> {
        self.handle()?.claim_interface(interface).map_err(map_error)
    }

    async fn release_interface(&self, interface: u8) -> Result<(), TransportError> {
        let handle = self.handle()?;
        tokio::task::spawn_blocking(move || handle.release_interface(interface))
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?
            .map_err(map_error)
    }

    fn start_poll(
        &self,
        interface: u8,
        endpoint: &EndpointInfo,
        session: u64,
        sink: NotificationSink,
    ) -> Result<(), TransportError> {
        let handle = self.handle()?;
        let stop = Arc::new(AtomicBool::new(false));
        let key = self.descriptor.key();
        let (index, address) = (endpoint.index, endpoint.address);
        let target = PollTarget {
            key,
            session,
            interface,
            endpoint: index,
            address,
            packet_size: endpoint.max_packet_size as usize,
        };
        let thread = {
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name(format!("usb-poll-{key}-{interface}-{index}"))
                .spawn(move || poll_endpoint(handle, target, stop, sink))
                .map_err(|e| TransportError::Other(e.to_string()))?
        };
        debug!("polling {key}#{interface}/{index} (address {address:#04x}, session {session})");
        self.pollers
            .lock()
            .map_err(|_| TransportError::Other("poller lock poisoned".into()))?
            .insert((interface, index), Poller { stop, thread });
        Ok(())
    }

    async fn stop_poll(&self, interface: u8, endpoint: u8) -> Result<(), TransportError> {
        let Some(poller) = self.take_poller(interface, endpoint) else {
            return Ok(());
        };
        poller.stop.store(true, Ordering::Relaxed);
        tokio::task::spawn_blocking(move || poller.thread.join())
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?
            .map_err(|_| TransportError::Other("poll thread panicked".into()))
    }

    fn is_polling(&self, interface: u8, endpoint: u8) -> bool {
        self.pollers
            .lock()
            .map(|pollers| {
                pollers
                    .get(&(interface, endpoint))
                    .is_some_and(|p| !p.thread.is_finished())
            })
            .unwrap_or(false)
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

struct HotplugForwarder {
    sink: NotificationSink,
}

impl rusb::Hotplug<rusb::Context> for HotplugForwarder {
    fn device_arrived(&mut self, device: rusb::Device<rusb::Context>) {
        match LibusbDevice::new(device) {
            Ok(device) => {
                let _ = self
                    .sink
                    .send(UsbNotification::Attached(Arc::new(device)));
            }
            Err(e) => warn!("cannot read descriptor of attached device: {e}"),
        }
    }

    fn device_left(&mut self, device: rusb::Device<rusb::Context>) {
        match device.device_descriptor() {
            Ok(descriptor) => {
                let _ = self.sink.send(UsbNotification::Detached(DeviceDescriptor {
                    vendor_id: descriptor.vendor_id(),
                    product_id: descriptor.product_id(),
                    bus_number: device.bus_number(),
                    address: device.address(),
                }));
            }
            Err(e) => warn!("cannot read descriptor of detached device: {e}"),
        }
    }
}

struct HotplugSubscription {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Transport over the system libusb.
pub struct LibusbTransport {
    context: rusb::Context,
    hotplug: Mutex<Option<HotplugSubscription>>,
}

impl LibusbTransport {
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self {
            context: rusb::Context::new().map_err(map_error)?,
            hotplug: Mutex::new(None),
        })
    }

    fn devices(&self) -> Vec<LibusbDevice> {
        match self.context.devices() {
            Ok(list) => list
                .iter()
                .filter_map(|device| LibusbDevice::new(device).ok())
                .collect(),
            Err(e) => {
                warn!("cannot enumerate usb devices: {e}");
                Vec::new()
            }
        }
    }
}

impl UsbTransport for LibusbTransport {
    fn find_by_ids(&self, vendor_id: u16, product_id: u16) -> Option<Arc<dyn UsbDevice>> {
        self.devices()
            .into_iter()
            .find(|d| d.descriptor.vendor_id == vendor_id && d.descriptor.product_id == product_id)
            .map(|d| Arc::new(d) as Arc<dyn UsbDevice>)
    }

    fn device_list(&self) -> Vec<Arc<dyn UsbDevice>> {
        self.devices()
            .into_iter()
            .map(|d| Arc::new(d) as Arc<dyn UsbDevice>)
            .collect()
    }

    fn subscribe_hotplug(&self, sink: NotificationSink) -> Result<(), TransportError> {
        if !rusb::has_hotplug() {
            return Err(TransportError::Unsupported);
        }
        self.unsubscribe_hotplug();

        let context = self.context.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("usb-hotplug".into())
                .spawn(move || {
                    let callback: Box<dyn rusb::Hotplug<rusb::Context>> =
                        Box::new(HotplugForwarder { sink });
                    let registration = rusb::HotplugBuilder::new()
                        .enumerate(false)
                        .register(context.clone(), callback);
                    let _registration = match registration {
                        Ok(registration) => registration,
                        Err(e) => {
                            warn!("cannot register hot-plug callback: {e}");
                            return;
                        }
                    };
                    while !stop.load(Ordering::Relaxed) {
                        if let Err(e) = context.handle_events(Some(EVENT_TIMEOUT)) {
                            warn!("usb event handling failed: {e}");
                            break;
                        }
                    }
                })
                .map_err(|e| TransportError::Other(e.to_string()))?
        };

        if let Ok(mut slot) = self.hotplug.lock() {
            *slot = Some(HotplugSubscription { stop, thread });
        }
        Ok(())
    }

    fn unsubscribe_hotplug(&self) {
        let subscription = self.hotplug.lock().ok().and_then(|mut slot| slot.take());
        if let Some(subscription) = subscription {
            subscription.stop.store(true, Ordering::Relaxed);
            if subscription.thread.join().is_err() {
                warn!("hot-plug thread panicked");
            }
        }
    }
}

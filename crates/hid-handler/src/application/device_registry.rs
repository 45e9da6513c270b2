//! Device registry and lifecycle manager.
//!
//! [`HidHandler`] is the context object owning everything the handler needs
//! at runtime: the configuration, the decoder and layout registries, the
//! registered devices and the handler-wide event channel.
//!
//! # Device lifecycle (for beginners)
//!
//! ```text
//! Unregistered ──► Opening ──► InterfacesClaimed ──► Polling
//!                                                      │
//!                     Closed (removed) ◄── Unregistering
//! ```
//!
//! - **Registration** opens the device, detaches any kernel driver from each
//!   interface with an assigned type, claims the interface and starts polling
//!   every "in" endpoint.  A failure rolls back whatever was acquired.
//! - **Unregistration** closes the device channel, stops polling, releases
//!   the interfaces, gives detached interfaces back to the kernel driver and
//!   closes the device.  All of these run even when an earlier one fails; the
//!   registry entry is always removed.
//!
//! # Event loop
//!
//! Transports deliver hot-plug and endpoint notifications into one queue.
//! The owner of the handler drains it with [`HidHandler::process_next`], so
//! notifications are handled one at a time, in arrival order.
//!
//! Each registration gets a new session id that its pollers attach to every
//! endpoint notification.  Notifications of an earlier session, such as the
//! `End` a poller sends after unregistration stopped it, are dropped when
//! they arrive after the device registered again.

use std::collections::BTreeMap;
use std::sync::Arc;

use hid_handler_core::{
    Assignment, DecoderRegistry, DeviceKey, DeviceType, HandlerError, LayoutRegistry,
    ReportDecoder, SupportedDevice, TransportError,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use super::channel::{EventChannel, Notification, UsbAction};
use super::pipeline::dispatch_sample;
use super::registered_hid::{ClaimedInterface, RegisteredDevice};
use crate::infrastructure::usb::{
    DeviceDescriptor, InterfaceInfo, NotificationSink, UsbDevice, UsbNotification, UsbTransport,
};

/// Handler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Devices to register.  `None` registers every connected device with
    /// the default type at start and ignores hot-plug.
    pub supported_devices: Option<Vec<SupportedDevice>>,
    /// Type used for a matched device without a configured type.
    pub default_device_type: DeviceType,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            supported_devices: None,
            default_device_type: DeviceType::Generic,
        }
    }
}

impl HandlerConfig {
    pub fn with_devices(supported_devices: Vec<SupportedDevice>) -> Self {
        Self {
            supported_devices: Some(supported_devices),
            ..Self::default()
        }
    }
}

/// The HID handler.
pub struct HidHandler {
    config: Option<HandlerConfig>,
    transport: Arc<dyn UsbTransport>,
    decoders: DecoderRegistry,
    layouts: LayoutRegistry,
    registered: BTreeMap<DeviceKey, RegisteredDevice>,
    events: EventChannel,
    notifications_tx: NotificationSink,
    notifications_rx: mpsc::UnboundedReceiver<UsbNotification>,
    last_session: u64,
    started: bool,
}

impl HidHandler {
    /// Handler over `transport` with the built-in decoders and the generic
    /// layout only.
    pub fn new(transport: Arc<dyn UsbTransport>) -> Self {
        let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
        Self {
            config: None,
            transport,
            decoders: DecoderRegistry::with_builtins(),
            layouts: LayoutRegistry::new(),
            registered: BTreeMap::new(),
            events: EventChannel::new(),
            notifications_tx,
            notifications_rx,
            last_session: 0,
            started: false,
        }
    }

    /// Replaces the layout registry, typically one filled from layout files.
    pub fn with_layouts(mut self, layouts: LayoutRegistry) -> Self {
        self.layouts = layouts;
        self
    }

    /// Sets the configuration used by the next [`HidHandler::start`].
    pub fn init(&mut self, config: HandlerConfig) {
        debug!(
            "init with {} supported device(s)",
            config
                .supported_devices
                .as_ref()
                .map(|devices| devices.len().to_string())
                .unwrap_or_else(|| "all".into())
        );
        self.config = Some(config);
    }

    pub fn config(&self) -> Option<&HandlerConfig> {
        self.config.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    // ── Start / stop ─────────────────────────────────────────────────────────

    /// Subscribes to hot-plug and registers the supported devices that are
    /// already connected.
    ///
    /// `config` is only used when the handler was never initialised; a
    /// configuration set by [`HidHandler::init`] is kept.  Without either,
    /// the defaults apply.  Devices that cannot be found or registered are
    /// logged and skipped.  Starting a started handler does nothing.
    pub async fn start(&mut self, config: Option<HandlerConfig>) -> Result<(), HandlerError> {
        if self.started {
            debug!("handler already started");
            return Ok(());
        }
        if self.config.is_none() {
            self.init(config.unwrap_or_default());
        }

        match self.transport.subscribe_hotplug(self.notifications_tx.clone()) {
            Ok(()) => {}
            Err(TransportError::Unsupported) => warn!("hot-plug is not supported by the transport"),
            Err(e) => return Err(e.into()),
        }

        let default_type = self.default_device_type();
        match self.config.as_ref().and_then(|c| c.supported_devices.clone()) {
            Some(supported) => {
                for entry in supported {
                    let key = entry.key();
                    let Some(device) = self.transport.find_by_ids(entry.vendor_id, entry.product_id)
                    else {
                        warn!("supported device {key} not found");
                        continue;
                    };
                    let types = entry.interface_types(&default_type);
                    self.register_or_warn(types, device).await;
                }
            }
            None => {
                for device in self.transport.device_list() {
                    let types = BTreeMap::from([(0, default_type.clone())]);
                    self.register_or_warn(types, device).await;
                }
            }
        }

        self.started = true;
        info!("handler started, {} device(s) registered", self.registered.len());
        Ok(())
    }

    /// Unregisters every device, one after the other, unsubscribes from
    /// hot-plug and drops every handler-wide subscriber.
    ///
    /// Every device is unregistered even when some fail; the last error is
    /// returned.  Stopping a handler that was never started does nothing.
    pub async fn stop(&mut self) -> Result<(), HandlerError> {
        if !self.started && self.registered.is_empty() {
            return Ok(());
        }

        let mut last_error = None;
        let keys: Vec<DeviceKey> = self.registered.keys().copied().collect();
        for key in keys {
            if let Err(e) = self.unregister_hid(&key).await {
                warn!("error while unregistering {key}: {e}");
                last_error = Some(e);
            }
        }

        if self.started {
            self.transport.unsubscribe_hotplug();
        }
        self.events.reset();
        self.started = false;
        info!("handler stopped");

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Configured entry for the given ids.
    pub fn supported_device(&self, vendor_id: u16, product_id: u16) -> Option<&SupportedDevice> {
        self.config
            .as_ref()?
            .supported_devices
            .as_ref()?
            .iter()
            .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)
    }

    pub fn registered_hid(&self, key: &DeviceKey) -> Option<&RegisteredDevice> {
        self.registered.get(key)
    }

    pub fn registered_hid_by_ids(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Option<&RegisteredDevice> {
        self.registered_hid(&DeviceKey::new(vendor_id, product_id))
    }

    pub fn registered_hids(&self) -> Vec<&RegisteredDevice> {
        self.registered.values().collect()
    }

    pub fn registered_hid_keys(&self) -> Vec<DeviceKey> {
        self.registered.keys().copied().collect()
    }

    /// Transport handles of the registered devices.
    pub fn registered_devices(&self) -> Vec<Arc<dyn UsbDevice>> {
        self.registered
            .values()
            .map(|hid| Arc::clone(&hid.device))
            .collect()
    }

    pub fn layouts(&self) -> &LayoutRegistry {
        &self.layouts
    }

    pub fn layout_names(&self) -> Vec<&str> {
        self.layouts.layout_names()
    }

    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    // ── Channels ─────────────────────────────────────────────────────────────

    /// Adds a decoder for a device type.
    ///
    /// # Errors
    ///
    /// [`HandlerError::NameCollision`] if a decoder is registered under the
    /// same name.
    pub fn register_event_handler(
        &mut self,
        decoder: Arc<dyn ReportDecoder>,
        name: Option<&str>,
    ) -> Result<(), HandlerError> {
        self.decoders.register(decoder, name)
    }

    /// Receiver of the handler-wide channel: every decoded event of every
    /// device plus `usb` attach/detach notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    /// Queue into which transports deliver notifications.
    pub fn notification_sink(&self) -> NotificationSink {
        self.notifications_tx.clone()
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Registers `device` with the given interface types.
    ///
    /// Returns `Ok(false)` without touching the device when a device with the
    /// same key is already registered.
    ///
    /// # Errors
    ///
    /// - [`HandlerError::NoInterface`] if the device has no interface with an
    ///   assigned type.
    /// - [`HandlerError::NoInEndpoint`] if such an interface has no "in"
    ///   endpoint.
    /// - [`HandlerError::Transport`] if opening, claiming or polling fails.
    pub async fn register_hid(
        &mut self,
        types: BTreeMap<u8, DeviceType>,
        device: Arc<dyn UsbDevice>,
    ) -> Result<bool, HandlerError> {
        match self.try_register(types, device).await {
            Ok(()) => Ok(true),
            Err(HandlerError::AlreadyRegistered(key)) => {
                debug!("device {key} is already registered");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn try_register(
        &mut self,
        types: BTreeMap<u8, DeviceType>,
        device: Arc<dyn UsbDevice>,
    ) -> Result<(), HandlerError> {
        let key = device.descriptor().key();
        if self.registered.contains_key(&key) {
            return Err(HandlerError::AlreadyRegistered(key));
        }
        let supported = self.supported_device(key.vendor_id, key.product_id);
        let name = supported.and_then(|s| s.name.clone());
        let layout = supported.and_then(|s| s.layout.clone());

        self.last_session += 1;
        let session = self.last_session;
        debug!("registering {} (session {session})", device.descriptor());
        device.open()?;
        let mut hid = RegisteredDevice::new(Arc::clone(&device), name, session);
        if let Err(e) = self.claim_and_poll(&mut hid, &types, layout.as_ref()) {
            // Roll back what was acquired; the registration error wins.
            if let Err(cleanup) = release_interfaces(&mut hid).await {
                debug!("rollback of {key} failed: {cleanup}");
            }
            device.close();
            return Err(e);
        }

        info!("registered {key} with types {types:?}");
        self.registered.insert(key, hid);
        Ok(())
    }

    /// Claims every interface with an assigned type, then polls their "in"
    /// endpoints.  Acquired resources are recorded on `hid` as they are
    /// taken so a failure can be rolled back.
    fn claim_and_poll(
        &self,
        hid: &mut RegisteredDevice,
        types: &BTreeMap<u8, DeviceType>,
        layout: Option<&Assignment>,
    ) -> Result<(), HandlerError> {
        let (key, session) = (hid.key, hid.session);
        let device = Arc::clone(&hid.device);
        let available: BTreeMap<u8, InterfaceInfo> = device
            .interfaces()?
            .into_iter()
            .map(|info| (info.index, info))
            .collect();

        for (index, device_type) in types {
            if !available.contains_key(index) {
                warn!("{key}: interface {index} does not exist");
                continue;
            }
            let layout = layout
                .and_then(|l| l.for_interface(*index))
                .map(str::to_owned);
            let claimed = hid
                .interfaces
                .entry(*index)
                .or_insert_with(|| ClaimedInterface::new(*index, device_type.clone(), layout));
            if kernel_driver_active(device.as_ref(), *index)? {
                debug!("{key}: detaching kernel driver from interface {index}");
                device.detach_kernel_driver(*index)?;
                claimed.kernel_driver_detached = true;
            }
            device.claim_interface(*index)?;
        }
        if hid.interfaces.is_empty() {
            return Err(HandlerError::NoInterface { key });
        }

        for claimed in hid.interfaces.values_mut() {
            let Some(info) = available.get(&claimed.index) else {
                continue;
            };
            let endpoints: Vec<_> = info.in_endpoints().cloned().collect();
            if endpoints.is_empty() {
                return Err(HandlerError::NoInEndpoint {
                    key,
                    interface: claimed.index,
                });
            }
            for endpoint in endpoints {
                device.start_poll(
                    claimed.index,
                    &endpoint,
                    session,
                    self.notifications_tx.clone(),
                )?;
                trace!("{key}#{}: polling endpoint {}", claimed.index, endpoint.index);
                claimed.endpoints.push(endpoint);
            }
        }
        Ok(())
    }

    /// Unregisters the device with `key`.
    ///
    /// The device channel is closed first.  Polling, interface release and
    /// close then run to completion even if one of them fails; the entry is
    /// removed in every case.  A release failing because the device is gone
    /// is not an error.
    ///
    /// # Errors
    ///
    /// [`HandlerError::NotRegistered`] if no such device is registered, or
    /// the last transport error seen during release.
    pub async fn unregister_hid(&mut self, key: &DeviceKey) -> Result<(), HandlerError> {
        let Some(mut hid) = self.registered.remove(key) else {
            return Err(HandlerError::NotRegistered(*key));
        };
        debug!("unregistering {key}");
        hid.channel.close();
        let released = release_interfaces(&mut hid).await;
        hid.device.close();
        info!("unregistered {key}");
        released
    }

    // ── Notifications ────────────────────────────────────────────────────────

    /// Waits for the next transport notification without handling it.
    ///
    /// Cancel safe: dropping the future loses no notification, so it can be
    /// raced in `tokio::select!`.  Pass the result to
    /// [`HidHandler::handle_notification`] outside the race.
    pub async fn next_notification(&mut self) -> Option<UsbNotification> {
        self.notifications_rx.recv().await
    }

    /// Waits for the next transport notification and handles it.
    ///
    /// Returns `false` once no notification can arrive any more.  Not cancel
    /// safe once a notification is being handled; see
    /// [`HidHandler::next_notification`].
    pub async fn process_next(&mut self) -> bool {
        match self.next_notification().await {
            Some(notification) => {
                self.handle_notification(notification).await;
                true
            }
            None => false,
        }
    }

    /// Handles every notification already queued; returns how many.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(notification) = self.notifications_rx.try_recv() {
            self.handle_notification(notification).await;
            handled += 1;
        }
        handled
    }

    pub async fn handle_notification(&mut self, notification: UsbNotification) {
        match notification {
            UsbNotification::Attached(device) => self.on_attach(device).await,
            UsbNotification::Detached(descriptor) => self.on_detach(descriptor).await,
            UsbNotification::Data {
                key,
                session,
                interface,
                endpoint,
                sample,
            } => match self.registered.get_mut(&key) {
                Some(hid) if hid.session == session => {
                    dispatch_sample(
                        &self.decoders,
                        &self.layouts,
                        &self.events,
                        hid,
                        interface,
                        endpoint,
                        sample,
                    );
                }
                _ => trace!("{key}: sample of session {session} dropped"),
            },
            UsbNotification::Error {
                key,
                session,
                interface,
                endpoint,
                error,
            } => {
                if self.is_current(&key, session) {
                    self.on_endpoint_error(key, interface, endpoint, error).await;
                } else {
                    debug!("{key}#{interface}/{endpoint}: error of session {session} ignored: {error}");
                }
            }
            UsbNotification::End {
                key,
                session,
                interface,
                endpoint,
            } => {
                debug!("{key}#{interface}/{endpoint}: polling of session {session} ended");
                if let Some(claimed) = self
                    .registered
                    .get_mut(&key)
                    .filter(|hid| hid.session == session)
                    .and_then(|hid| hid.interfaces.get_mut(&interface))
                {
                    claimed.ended.insert(endpoint);
                }
            }
        }
    }

    async fn on_attach(&mut self, device: Arc<dyn UsbDevice>) {
        let descriptor = device.descriptor();
        let Some(supported) = self.supported_device(descriptor.vendor_id, descriptor.product_id)
        else {
            trace!("ignoring attach of unsupported device {descriptor}");
            return;
        };
        let types = supported.interface_types(&self.default_device_type());
        // Only a new registration is announced; a device already registered
        // stays silent.
        match self.register_hid(types, device).await {
            Ok(true) => {
                self.events.publish(Notification::Usb {
                    action: UsbAction::Attach,
                    device: descriptor,
                });
            }
            Ok(false) => {}
            Err(e) => warn!("cannot register attached device {descriptor}: {e}"),
        }
    }

    async fn on_detach(&mut self, descriptor: DeviceDescriptor) {
        let key = descriptor.key();
        let listed = self
            .config
            .as_ref()
            .and_then(|c| c.supported_devices.as_ref())
            .is_some();
        if listed && self.supported_device(key.vendor_id, key.product_id).is_none() {
            trace!("ignoring detach of unsupported device {descriptor}");
            return;
        }
        if !self.registered.contains_key(&key) {
            return;
        }
        if let Err(e) = self.unregister_hid(&key).await {
            warn!("error while unregistering detached device {key}: {e}");
        }
        self.events.publish(Notification::Usb {
            action: UsbAction::Detach,
            device: descriptor,
        });
    }

    fn is_current(&self, key: &DeviceKey, session: u64) -> bool {
        self.registered
            .get(key)
            .is_some_and(|hid| hid.session == session)
    }

    async fn on_endpoint_error(
        &mut self,
        key: DeviceKey,
        interface: u8,
        endpoint: u8,
        error: TransportError,
    ) {
        warn!("{key}#{interface}/{endpoint}: endpoint error: {error}");
        let Some(device) = self.registered.get(&key).map(|hid| Arc::clone(&hid.device)) else {
            return;
        };
        // The reset needs the open handle, so it comes before unregistration
        // closes it.
        if let Err(e) = device.reset() {
            debug!("reset of {key} failed: {e}");
        }
        if error.is_no_device() {
            if let Err(e) = self.unregister_hid(&key).await {
                warn!("error while unregistering {key}: {e}");
            }
        }
    }

    fn default_device_type(&self) -> DeviceType {
        self.config
            .as_ref()
            .map(|c| c.default_device_type.clone())
            .unwrap_or(DeviceType::Generic)
    }

    async fn register_or_warn(
        &mut self,
        types: BTreeMap<u8, DeviceType>,
        device: Arc<dyn UsbDevice>,
    ) {
        let descriptor = device.descriptor();
        if let Err(e) = self.register_hid(types, device).await {
            warn!("cannot register {descriptor}: {e}");
        }
    }
}

/// Kernel-driver state of `interface`; platforms without kernel-driver
/// support report no driver.
fn kernel_driver_active(device: &dyn UsbDevice, interface: u8) -> Result<bool, TransportError> {
    match device.is_kernel_driver_active(interface) {
        Err(TransportError::Unsupported) => Ok(false),
        other => other,
    }
}

/// Stops polling, releases every claimed interface and hands detached
/// interfaces back to their kernel driver.
///
/// Every step runs regardless of earlier failures.  "No device" errors are
/// ignored; the last other error is returned.
async fn release_interfaces(hid: &mut RegisteredDevice) -> Result<(), HandlerError> {
    let key = hid.key;
    let device = Arc::clone(&hid.device);
    let mut last_error: Option<TransportError> = None;
    let mut note = |stage: &str, interface: u8, error: TransportError| {
        if error.is_no_device() {
            debug!("{key}#{interface}: {stage}: device already removed");
        } else {
            warn!("{key}#{interface}: {stage} failed: {error}");
            last_error = Some(error);
        }
    };

    for claimed in hid.interfaces.values() {
        let index = claimed.index;
        for endpoint in &claimed.endpoints {
            if device.is_polling(index, endpoint.index) {
                if let Err(e) = device.stop_poll(index, endpoint.index).await {
                    note("stop polling", index, e);
                }
            }
        }
        if let Err(e) = device.release_interface(index).await {
            note("release", index, e);
        }
        if claimed.kernel_driver_detached {
            match kernel_driver_active(device.as_ref(), index) {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(e) = device.attach_kernel_driver(index) {
                        note("reattach kernel driver", index, e);
                    }
                }
                Err(e) => note("kernel driver query", index, e),
            }
        }
    }
    hid.interfaces.clear();

    match last_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Application layer of the HID handler.
//!
//! # What lives here (for beginners)
//!
//! The *application* layer owns the handler's runtime state and decides what
//! happens when the USB transport reports something.  It depends on the
//! transport only through the traits in [`crate::infrastructure::usb`], so
//! the whole lifecycle runs against the in-memory mock in tests.
//!
//! # Sub-modules
//!
//! - **`device_registry`** – The [`HidHandler`](device_registry::HidHandler)
//!   context object: start/stop, hot-plug reaction, registration and
//!   unregistration of devices.
//!
//! - **`registered_hid`** – One registered device: its handle, claimed
//!   interfaces, decoder state and device-scoped channel.
//!
//! - **`pipeline`** – Routes a raw endpoint sample to its decoder and
//!   publishes the resulting event.
//!
//! - **`channel`** – Broadcast channels carrying decoded events and USB
//!   attach/detach notifications to subscribers.

pub mod channel;
pub mod device_registry;
pub mod pipeline;
pub mod registered_hid;

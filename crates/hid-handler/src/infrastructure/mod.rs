//! Infrastructure layer of the HID handler.
//!
//! Contains OS-facing adapters: the USB transport (mock and libusb) and
//! file-system storage for the configuration and layout files.

pub mod storage;
pub mod usb;

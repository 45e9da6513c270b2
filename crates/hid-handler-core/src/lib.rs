//! # hid-handler-core
//!
//! Pure domain library for the HID handler: device identity, the decoded
//! event model, the per-device-type report decoders, the decoder registry and
//! the keyboard layout resolver.
//!
//! The crate has zero dependencies on USB libraries, file systems or async
//! runtimes. Everything here operates on byte slices and in-memory tables so
//! it can be unit tested without hardware.
//!
//! # Architecture overview (for beginners)
//!
//! A USB HID device (keyboard, mouse, presenter remote...) periodically sends
//! small fixed-size byte buffers called *reports* (or *samples*) on its "in"
//! endpoints.  The bytes mean different things for different device types:
//! byte 0 of a keyboard report is a modifier bitmask, byte 0 of a mouse report
//! is a button bitmask, and so on.
//!
//! - **`domain`** – Identity of supported devices ([`DeviceKey`]), their
//!   configured per-interface types ([`DeviceType`], [`SupportedDevice`]) and
//!   the structured events produced by decoding ([`HidEvent`]).
//!
//! - **`keymap`** – The layout resolver ([`LayoutRegistry`]), translating
//!   hardware scan codes into logical key codes, with a built-in "generic"
//!   baseline table every other layout inherits from.
//!
//! - **`decode`** – One [`ReportDecoder`] per device type plus the
//!   [`DecoderRegistry`] that maps a device type to its decoder.

pub mod decode;
pub mod domain;
pub mod error;
pub mod keymap;

// Re-export the most-used types at the crate root so callers can write
// `hid_handler_core::DeviceKey` instead of the full module path.
pub use decode::registry::DecoderRegistry;
pub use decode::{DecodeContext, DecoderState, ReportDecoder};
pub use domain::device::{Assignment, DeviceKey, DeviceType, SupportedDevice};
pub use domain::event::{
    Direction, EventPayload, Flags, HidEvent, KeyStroke, KeyboardReport, Modifier, MouseButton,
    NumpadReport, PointerReport, PresenterButton, PresenterReport, Topic, WheelDirection,
};
pub use error::{HandlerError, TransportError};
pub use keymap::layout::{KeyEntry, Layout, LayoutDefinition, LayoutDescriptor, LayoutRef, LayoutRegistry};

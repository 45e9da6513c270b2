//! Scan-code to key-code translation.
//!
//! The canonical input is a USB HID usage id (page 0x07, Keyboard/Keypad) as
//! found in keyboard and numpad reports.  A [`layout::Layout`] maps its
//! two-digit uppercase hex rendering to a logical key code, optionally with a
//! shifted variant.

pub mod generic;
pub mod layout;

pub use layout::{KeyEntry, Layout, LayoutDefinition, LayoutDescriptor, LayoutRef, LayoutRegistry};

/// Name of the baseline layout every other layout inherits from.
pub const GENERIC_LAYOUT: &str = "generic";

/// Layout used by numpad interfaces without an assigned layout.
pub const NUMPAD_LAYOUT: &str = "numpad";

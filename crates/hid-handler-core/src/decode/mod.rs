//! Report decoders, one per device type.
//!
//! # How decoding works (for beginners)
//!
//! Every raw sample received on an interface is handed to the decoder selected
//! for that interface's [`DeviceType`].  The decoder parses the bytes into an
//! [`EventPayload`] and may read or update per-interface [`DecoderState`]
//! (the previous sample) to compute what *changed*.
//!
//! Behaviour shared by all decoders lives in the trait's provided methods:
//! a decoder that only implements [`ReportDecoder::decode`] gets the generic
//! rendering and publishes only the `event` topic.

use crate::domain::device::DeviceType;
use crate::domain::event::{Direction, EventPayload, Flags, HidEvent, MouseButton, Topic, WheelDirection};
use crate::keymap::layout::LayoutRegistry;

pub mod generic;
pub mod keyboard;
pub mod numpad;
pub mod pointer;
pub mod presenter;
pub mod registry;

pub use generic::GenericDecoder;
pub use keyboard::KeyboardDecoder;
pub use numpad::NumpadDecoder;
pub use pointer::{MouseDecoder, TouchpadDecoder};
pub use presenter::PresenterDecoder;

/// Absolute (non-diffed) pointer flags of one sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerSample {
    pub button: Flags<MouseButton>,
    pub movement: Flags<Direction>,
    pub wheel: Flags<WheelDirection>,
}

/// Inter-sample state of one interface.
///
/// Owned by the registered device and recreated on every fresh registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderState {
    pub last_pointer: Option<PointerSample>,
    pub last_scan_codes: Vec<u8>,
}

/// Everything a decoder may consult besides the sample itself.
pub struct DecodeContext<'a> {
    pub layouts: &'a LayoutRegistry,
    /// Layout assigned to the interface, if any.
    pub layout: Option<&'a str>,
    pub state: &'a mut DecoderState,
}

/// Decoder for the reports of one device type.
pub trait ReportDecoder: Send + Sync {
    /// Device type this decoder handles.
    fn device_type(&self) -> DeviceType;

    /// Default registration name, `{Type}Event`.
    fn name(&self) -> String {
        self.device_type().decoder_name()
    }

    /// Parses one raw sample.
    fn decode(&self, sample: &[u8], ctx: &mut DecodeContext<'_>) -> EventPayload;

    /// Sub-event topics this decoder publishes, besides `event`, when the
    /// matching payload fields are non-empty.
    fn topics(&self) -> &'static [Topic] {
        &[]
    }

    /// Diagnostic text rendering.
    fn render(&self, event: &HidEvent) -> String {
        render_generic(event)
    }
}

/// Fallback rendering: device type plus hex dump of the raw sample.
pub fn render_generic(event: &HidEvent) -> String {
    format!(
        "device type: {}, data: {}",
        event.device_type,
        event.hex_data()
    )
}

/// Byte at `index`, zero when the sample is shorter.
pub(crate) fn byte(sample: &[u8], index: usize) -> u8 {
    sample.get(index).copied().unwrap_or(0)
}

pub(crate) fn has_bit(value: u8, bit: u8) -> bool {
    value & (1 << bit) != 0
}

/// Up to six non-zero scan codes starting at byte 2.
pub(crate) fn scan_codes(sample: &[u8]) -> Vec<u8> {
    sample
        .iter()
        .skip(2)
        .take(6)
        .copied()
        .filter(|code| *code != 0)
        .collect()
}

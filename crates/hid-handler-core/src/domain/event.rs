//! Decoded HID events.
//!
//! A [`HidEvent`] is built for every raw sample received on an "in" endpoint.
//! It carries the originating device/interface/endpoint, the raw bytes and a
//! type-specific [`EventPayload`] produced by the interface's decoder.
//!
//! Flag sets ([`Flags`]) follow a "truthy" emptiness rule: a set whose values
//! are all `false` counts as empty.  A motion flag that changed from `true` to
//! `false` is therefore recorded, but on its own does not trigger a `move`
//! sub-event.

use std::collections::BTreeMap;
use std::fmt;

use super::device::{DeviceKey, DeviceType};

// ── Topics ────────────────────────────────────────────────────────────────────

/// Name under which an event is published on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Topic {
    /// Every decoded event, whatever its type.
    Event,
    Key,
    Click,
    Wheel,
    Move,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Event => "event",
            Topic::Key => "key",
            Topic::Click => "click",
            Topic::Wheel => "wheel",
            Topic::Move => "move",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Flag names ────────────────────────────────────────────────────────────────

/// Keyboard modifier, in bit order of the modifier byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modifier {
    LeftCtrl,
    LeftShift,
    LeftAlt,
    LeftSuper,
    RightCtrl,
    RightShift,
    RightAlt,
    RightSuper,
    /// Ninth name of the modifier list.  Its bit lies outside the modifier
    /// byte, so a standard boot report never sets it.
    E,
}

impl Modifier {
    /// All modifiers, indexed by bit position.
    pub const ALL: [Modifier; 9] = [
        Modifier::LeftCtrl,
        Modifier::LeftShift,
        Modifier::LeftAlt,
        Modifier::LeftSuper,
        Modifier::RightCtrl,
        Modifier::RightShift,
        Modifier::RightAlt,
        Modifier::RightSuper,
        Modifier::E,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modifier::LeftCtrl => "left-ctrl",
            Modifier::LeftShift => "left-shift",
            Modifier::LeftAlt => "left-alt",
            Modifier::LeftSuper => "left-super",
            Modifier::RightCtrl => "right-ctrl",
            Modifier::RightShift => "right-shift",
            Modifier::RightAlt => "right-alt",
            Modifier::RightSuper => "right-super",
            Modifier::E => "e",
        }
    }

    pub fn is_shift(&self) -> bool {
        matches!(self, Modifier::LeftShift | Modifier::RightShift)
    }
}

/// Mouse and touchpad buttons, in bit order of the button byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Side,
    Extra,
}

impl MouseButton {
    pub const ALL: [MouseButton; 5] = [
        MouseButton::Left,
        MouseButton::Right,
        MouseButton::Middle,
        MouseButton::Side,
        MouseButton::Extra,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
            MouseButton::Side => "side",
            MouseButton::Extra => "extra",
        }
    }
}

/// Discrete motion direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WheelDirection {
    Up,
    Down,
}

impl WheelDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            WheelDirection::Up => "up",
            WheelDirection::Down => "down",
        }
    }
}

/// Buttons of a presenter remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PresenterButton {
    Left,
    Right,
    VolToggle,
    VolUp,
    VolDown,
}

impl PresenterButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenterButton::Left => "left",
            PresenterButton::Right => "right",
            PresenterButton::VolToggle => "volToggle",
            PresenterButton::VolUp => "volUp",
            PresenterButton::VolDown => "volDown",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )+
    };
}

display_as_str!(Modifier, MouseButton, Direction, WheelDirection, PresenterButton);

// ── Flags ─────────────────────────────────────────────────────────────────────

/// A named set of boolean flags.
///
/// A flag can be present with value `false`; [`Flags::is_empty`] only looks at
/// `true` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flags<K: Ord>(BTreeMap<K, bool>);

impl<K: Ord> Default for Flags<K> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: Ord + Copy> Flags<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: K, value: bool) {
        self.0.insert(key, value);
    }

    /// Value of `key`, `false` when absent.
    pub fn get(&self, key: K) -> bool {
        self.0.get(&key).copied().unwrap_or(false)
    }

    /// Raw value of `key`, distinguishing "absent" from "set to false".
    pub fn value(&self, key: K) -> Option<bool> {
        self.0.get(&key).copied()
    }

    /// `true` when no flag is set to `true`.
    pub fn is_empty(&self) -> bool {
        !self.0.values().any(|v| *v)
    }

    /// Keys whose value is `true`, in declaration order.
    pub fn active(&self) -> impl Iterator<Item = K> + '_ {
        self.0.iter().filter(|(_, v)| **v).map(|(k, _)| *k)
    }
}

impl<K: Ord + Copy> FromIterator<(K, bool)> for Flags<K> {
    fn from_iter<I: IntoIterator<Item = (K, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<K: Ord + Copy + fmt::Display> fmt::Display for Flags<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, key) in self.active().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}")?;
        }
        f.write_str("]")
    }
}

// ── Reports ───────────────────────────────────────────────────────────────────

/// A scan code and the key code it resolved to through the layout, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStroke {
    pub scan_code: u8,
    pub key_code: Option<String>,
}

impl fmt::Display for KeyStroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key_code {
            Some(code) => write!(f, "{:02x}={code}", self.scan_code),
            None => write!(f, "{:02x}", self.scan_code),
        }
    }
}

fn write_keys(f: &mut fmt::Formatter<'_>, keys: &[KeyStroke]) -> fmt::Result {
    f.write_str("keys: [")?;
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{key}")?;
    }
    f.write_str("]")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyboardReport {
    /// Raw modifier byte.
    pub modifier_bits: u8,
    pub modifiers: Vec<Modifier>,
    /// Non-zero scan codes of the sample, in slot order.
    pub keys: Vec<KeyStroke>,
}

impl KeyboardReport {
    pub fn shift_held(&self) -> bool {
        self.modifiers.iter().any(Modifier::is_shift)
    }
}

impl fmt::Display for KeyboardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "modifiers: {:b}, ", self.modifier_bits)?;
        write_keys(f, &self.keys)
    }
}

/// Mouse or touchpad report.  Touchpads never set `wheel`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerReport {
    pub button: Flags<MouseButton>,
    pub wheel: Flags<WheelDirection>,
    pub movement: Flags<Direction>,
}

impl fmt::Display for PointerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "button: {}, wheel: {}, move: {}",
            self.button, self.wheel, self.movement
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumpadReport {
    /// Keys that appeared since the previous sample.
    pub keys: Vec<KeyStroke>,
}

impl fmt::Display for NumpadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_keys(f, &self.keys)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenterReport {
    pub mode: u8,
    pub button: Flags<PresenterButton>,
    pub movement: Flags<Direction>,
}

impl fmt::Display for PresenterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "button: {}, move: {}", self.button, self.movement)
    }
}

// ── Event ─────────────────────────────────────────────────────────────────────

/// Type-specific decoded fields of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// No semantic decoding; only the raw sample is meaningful.
    Generic,
    Keyboard(KeyboardReport),
    Mouse(PointerReport),
    Touchpad(PointerReport),
    Numpad(NumpadReport),
    Presenter(PresenterReport),
}

impl EventPayload {
    /// Whether the decoded field set behind `topic` is non-empty.
    ///
    /// [`Topic::Event`] always holds.
    pub fn has(&self, topic: Topic) -> bool {
        match (topic, self) {
            (Topic::Event, _) => true,
            (Topic::Key, EventPayload::Keyboard(report)) => !report.keys.is_empty(),
            (Topic::Key, EventPayload::Numpad(report)) => !report.keys.is_empty(),
            (Topic::Click, EventPayload::Mouse(report) | EventPayload::Touchpad(report)) => {
                !report.button.is_empty()
            }
            (Topic::Click, EventPayload::Presenter(report)) => !report.button.is_empty(),
            (Topic::Wheel, EventPayload::Mouse(report)) => !report.wheel.is_empty(),
            (Topic::Move, EventPayload::Mouse(report) | EventPayload::Touchpad(report)) => {
                !report.movement.is_empty()
            }
            (Topic::Move, EventPayload::Presenter(report)) => !report.movement.is_empty(),
            _ => false,
        }
    }
}

/// One decoded sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidEvent {
    pub device: DeviceKey,
    pub device_type: DeviceType,
    pub interface: u8,
    pub endpoint: u8,
    /// The raw sample.
    pub data: Vec<u8>,
    pub payload: EventPayload,
}

impl HidEvent {
    pub fn keyboard(&self) -> Option<&KeyboardReport> {
        match &self.payload {
            EventPayload::Keyboard(report) => Some(report),
            _ => None,
        }
    }

    /// Pointer report of a mouse or touchpad event.
    pub fn pointer(&self) -> Option<&PointerReport> {
        match &self.payload {
            EventPayload::Mouse(report) | EventPayload::Touchpad(report) => Some(report),
            _ => None,
        }
    }

    pub fn numpad(&self) -> Option<&NumpadReport> {
        match &self.payload {
            EventPayload::Numpad(report) => Some(report),
            _ => None,
        }
    }

    pub fn presenter(&self) -> Option<&PresenterReport> {
        match &self.payload {
            EventPayload::Presenter(report) => Some(report),
            _ => None,
        }
    }

    /// Hex dump of the raw sample, e.g. `[01, 00, ff]`.
    pub fn hex_data(&self) -> String {
        let bytes: Vec<String> = self.data.iter().map(|b| format!("{b:02x}")).collect();
        format!("[{}]", bytes.join(", "))
    }
}

impl fmt::Display for HidEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}#{}/{}: ",
            self.device_type, self.device, self.interface, self.endpoint
        )?;
        match &self.payload {
            EventPayload::Generic => write!(f, "data: {}", self.hex_data()),
            EventPayload::Keyboard(report) => write!(f, "{report}"),
            EventPayload::Mouse(report) | EventPayload::Touchpad(report) => write!(f, "{report}"),
            EventPayload::Numpad(report) => write!(f, "{report}"),
            EventPayload::Presenter(report) => write!(f, "{report}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

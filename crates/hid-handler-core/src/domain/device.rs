//! Device identity and supported-device configuration.
//!
//! A supported device is matched purely by its USB vendor/product id pair,
//! canonicalised as a [`DeviceKey`].  Each interface of the device is then
//! assigned a [`DeviceType`] that selects the report decoder used for the
//! samples it produces.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Canonical identifier of a device model: `vendor:product`, each rendered as
/// four lowercase hex digits (e.g. `192f:0416`).
///
/// Equal keys mean the same physical device model; the handler never holds two
/// registrations with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceKey {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceKey {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Error returned when a string is not a valid `vvvv:pppp` device key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device key \"{0}\" (expected vendor:product in hex)")]
pub struct ParseDeviceKeyError(pub String);

impl FromStr for DeviceKey {
    type Err = ParseDeviceKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (vendor, product) = s
            .split_once(':')
            .ok_or_else(|| ParseDeviceKeyError(s.to_string()))?;
        let parse = |part: &str| {
            u16::from_str_radix(part.trim(), 16).map_err(|_| ParseDeviceKeyError(s.to_string()))
        };
        Ok(DeviceKey::new(parse(vendor)?, parse(product)?))
    }
}

/// Semantic type assigned to one interface of a device.
///
/// The built-in types each have a decoder; [`DeviceType::Other`] names a type
/// whose decoder is registered by the caller at runtime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceType {
    Generic,
    Keyboard,
    Mouse,
    Touchpad,
    Numpad,
    Presenter,
    Other(String),
}

impl DeviceType {
    pub fn as_str(&self) -> &str {
        match self {
            DeviceType::Generic => "generic",
            DeviceType::Keyboard => "keyboard",
            DeviceType::Mouse => "mouse",
            DeviceType::Touchpad => "touchpad",
            DeviceType::Numpad => "numpad",
            DeviceType::Presenter => "presenter",
            DeviceType::Other(name) => name,
        }
    }

    /// Name under which the decoder for this type is registered:
    /// the capitalised camel-case type followed by `Event`.
    ///
    /// `mouse` gives `MouseEvent`, `game-pad` gives `GamePadEvent`.
    pub fn decoder_name(&self) -> String {
        let mut name = String::new();
        for word in self
            .as_str()
            .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
            .filter(|w| !w.is_empty())
        {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                name.extend(first.to_uppercase());
                name.push_str(chars.as_str());
            }
        }
        name.push_str("Event");
        name
    }
}

impl From<&str> for DeviceType {
    fn from(s: &str) -> Self {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "generic" | "" => DeviceType::Generic,
            "keyboard" => DeviceType::Keyboard,
            "mouse" => DeviceType::Mouse,
            "touchpad" => DeviceType::Touchpad,
            "numpad" => DeviceType::Numpad,
            "presenter" => DeviceType::Presenter,
            _ => DeviceType::Other(normalized),
        }
    }
}

impl FromStr for DeviceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DeviceType::from(s))
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Either one value for the whole device or one value per interface index.
///
/// In TOML:
///
/// ```toml
/// type = "mouse"
/// type = { "0" = "keyboard", "1" = "mouse" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Assignment {
    All(String),
    PerInterface(BTreeMap<String, String>),
}

impl Assignment {
    /// Normalises the assignment into an interface-index map.
    ///
    /// A bare value is assigned to interface 0.  Keys that are not interface
    /// indices are skipped with a warning.
    pub fn to_interface_map(&self) -> BTreeMap<u8, String> {
        match self {
            Assignment::All(value) => BTreeMap::from([(0, value.clone())]),
            Assignment::PerInterface(map) => map
                .iter()
                .filter_map(|(index, value)| match index.trim().parse::<u8>() {
                    Ok(index) => Some((index, value.clone())),
                    Err(_) => {
                        warn!("ignoring non-numeric interface index \"{index}\"");
                        None
                    }
                })
                .collect(),
        }
    }

    /// The value that applies to `interface`.  A bare value applies to every
    /// interface.
    pub fn for_interface(&self, interface: u8) -> Option<&str> {
        match self {
            Assignment::All(value) => Some(value),
            Assignment::PerInterface(map) => map
                .iter()
                .find(|(index, _)| index.trim().parse::<u8>().ok() == Some(interface))
                .map(|(_, value)| value.as_str()),
        }
    }
}

impl From<&str> for Assignment {
    fn from(value: &str) -> Self {
        Assignment::All(value.to_string())
    }
}

fn default_enabled() -> bool {
    true
}

/// One entry of the supported-device list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Device type, for the whole device or per interface.  Falls back to the
    /// handler's default device type when absent.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<Assignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Keyboard layout, for the whole device or per interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Assignment>,
}

impl SupportedDevice {
    pub fn new(vendor_id: u16, product_id: u16, device_type: impl Into<Assignment>) -> Self {
        Self {
            vendor_id,
            product_id,
            device_type: Some(device_type.into()),
            name: None,
            enabled: true,
            layout: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_layout(mut self, layout: impl Into<Assignment>) -> Self {
        self.layout = Some(layout.into());
        self
    }

    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.vendor_id, self.product_id)
    }

    /// Resolves the per-interface type mapping, using `default` when no type
    /// is configured.
    pub fn interface_types(&self, default: &DeviceType) -> BTreeMap<u8, DeviceType> {
        match &self.device_type {
            Some(assignment) => assignment
                .to_interface_map()
                .into_iter()
                .map(|(index, name)| (index, DeviceType::from(name.as_str())))
                .collect(),
            None => BTreeMap::from([(0, default.clone())]),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_key_renders_four_hex_digits_each() {
        assert_eq!(DeviceKey::new(0x5ac, 0x21).to_string(), "05ac:0021");
    }

    #[test]
    fn test_device_key_parses_back() {
        let key: DeviceKey = "192f:0416".parse().unwrap();

        assert_eq!(key, DeviceKey::new(0x192f, 0x0416));
        assert!("192f".parse::<DeviceKey>().is_err());
        assert!("zzzz:0416".parse::<DeviceKey>().is_err());
    }

    #[test]
    fn test_decoder_name_is_capitalised_camel_case() {
        assert_eq!(DeviceType::Mouse.decoder_name(), "MouseEvent");
        assert_eq!(DeviceType::Generic.decoder_name(), "GenericEvent");
        assert_eq!(
            DeviceType::from("game-pad").decoder_name(),
            "GamePadEvent"
        );
    }

    #[test]
    fn test_device_type_parsing_is_case_insensitive() {
        assert_eq!(DeviceType::from("Keyboard"), DeviceType::Keyboard);
        assert_eq!(DeviceType::from("TOUCHPAD"), DeviceType::Touchpad);
        assert_eq!(DeviceType::from("joystick"), DeviceType::Other("joystick".into()));
    }

    #[test]
    fn test_bare_type_is_normalised_to_interface_zero() {
        let device = SupportedDevice::new(0x192f, 0x0416, "mouse");

        let types = device.interface_types(&DeviceType::Generic);

        assert_eq!(types, BTreeMap::from([(0, DeviceType::Mouse)]));
    }

    #[test]
    fn test_per_interface_types_skip_invalid_indices() {
        let assignment = Assignment::PerInterface(BTreeMap::from([
            ("0".to_string(), "keyboard".to_string()),
            ("1".to_string(), "mouse".to_string()),
            ("left".to_string(), "mouse".to_string()),
        ]));

        let map = assignment.to_interface_map();

        assert_eq!(map.len(), 2);
        assert_eq!(map[&0], "keyboard");
        assert_eq!(map[&1], "mouse");
    }

    #[test]
    fn test_missing_type_uses_default() {
        let mut device = SupportedDevice::new(1, 2, "mouse");
        device.device_type = None;

        let types = device.interface_types(&DeviceType::Keyboard);

        assert_eq!(types, BTreeMap::from([(0, DeviceType::Keyboard)]));
    }

    #[test]
    fn test_bare_layout_applies_to_every_interface() {
        let layout = Assignment::from("fr-azerty");

        assert_eq!(layout.for_interface(0), Some("fr-azerty"));
        assert_eq!(layout.for_interface(3), Some("fr-azerty"));
    }
}

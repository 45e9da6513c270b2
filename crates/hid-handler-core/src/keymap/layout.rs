//! Layout resolver: named scan-code tables with shift variants and fallback
//! inheritance.
//!
//! # How inheritance works (for beginners)
//!
//! Layout files only list the keys that differ from a US keyboard.  When a
//! layout is registered, every scan code it does not define is copied from the
//! "generic" layout (defaults only, never overriding).  A layout named
//! `family-variant` (e.g. `fr-azerty`) additionally provides the bare family
//! (`fr`) if nothing registered that name yet, so a lookup for `fr` or for an
//! unknown `fr-bepo` still lands on a French table.
//!
//! Lookups resolve `family-variant`, then `family`, then `generic`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{generic, GENERIC_LAYOUT};
use crate::domain::event::Modifier;

/// Value stored for one scan code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEntry {
    Single(String),
    Shifted { unshifted: String, shifted: String },
}

impl KeyEntry {
    /// Parses a layout-file value: two or more space-separated tokens give a
    /// shifted pair, anything else a single key code.
    pub fn parse(value: &str) -> Self {
        let mut parts = value.split(' ').filter(|p| !p.is_empty());
        match (parts.next(), parts.next()) {
            (Some(unshifted), Some(shifted)) => KeyEntry::Shifted {
                unshifted: unshifted.to_string(),
                shifted: shifted.to_string(),
            },
            _ => KeyEntry::Single(value.trim().to_string()),
        }
    }

    pub fn resolve(&self, shift: bool) -> &str {
        match self {
            KeyEntry::Single(code) => code,
            KeyEntry::Shifted { unshifted, shifted } => {
                if shift {
                    shifted
                } else {
                    unshifted
                }
            }
        }
    }
}

/// A registered layout table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub name: String,
    /// Keyed by two-digit uppercase hex scan code.
    pub entries: BTreeMap<String, KeyEntry>,
}

impl Layout {
    pub fn get(&self, scan_code: &str) -> Option<&KeyEntry> {
        self.entries.get(scan_code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed layout file or inline layout from the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: BTreeMap<String, String>,
}

impl LayoutDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            value: BTreeMap::new(),
        }
    }

    pub fn with_key(mut self, scan_code: impl Into<String>, key_code: impl Into<String>) -> Self {
        self.value.insert(scan_code.into(), key_code.into());
        self
    }
}

/// Layout given as separate layout and variant names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDescriptor {
    pub layout: String,
    #[serde(default)]
    pub variant: Option<String>,
}

/// Reference to a layout: a `family-variant`/`family` name or a descriptor.
#[derive(Debug, Clone, Copy)]
pub enum LayoutRef<'a> {
    Name(&'a str),
    Descriptor(&'a LayoutDescriptor),
}

impl<'a> LayoutRef<'a> {
    /// Family and variant: the first two `-` separated segments of a name.
    /// Further segments are not part of the variant, so "en-us-intl" is
    /// family "en", variant "us".
    fn parts(&self) -> (&'a str, Option<&'a str>) {
        match *self {
            LayoutRef::Name(name) => {
                let mut segments = name.split('-');
                let family = segments.next().unwrap_or(name);
                (family, segments.next())
            }
            LayoutRef::Descriptor(d) => (d.layout.as_str(), d.variant.as_deref()),
        }
    }
}

impl<'a> From<&'a str> for LayoutRef<'a> {
    fn from(name: &'a str) -> Self {
        LayoutRef::Name(name)
    }
}

impl<'a> From<&'a String> for LayoutRef<'a> {
    fn from(name: &'a String) -> Self {
        LayoutRef::Name(name)
    }
}

impl<'a> From<&'a LayoutDescriptor> for LayoutRef<'a> {
    fn from(descriptor: &'a LayoutDescriptor) -> Self {
        LayoutRef::Descriptor(descriptor)
    }
}

impl fmt::Display for LayoutRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.parts()) {
            (LayoutRef::Name(name), _) => f.write_str(name),
            (_, (family, Some(variant))) => write!(f, "{family}-{variant}"),
            (_, (family, None)) => f.write_str(family),
        }
    }
}

/// A scan code given as a number or as a hex string.
#[derive(Debug, Clone, Copy)]
pub enum ScanCode<'a> {
    Numeric(u8),
    Text(&'a str),
}

impl ScanCode<'_> {
    /// Two-digit uppercase hex rendering used as table key.
    pub fn normalize(&self) -> String {
        match self {
            ScanCode::Numeric(code) => format!("{code:02X}"),
            ScanCode::Text(text) => format!("{:0>2}", text.trim().to_ascii_uppercase()),
        }
    }
}

impl From<u8> for ScanCode<'_> {
    fn from(code: u8) -> Self {
        ScanCode::Numeric(code)
    }
}

impl<'a> From<&'a str> for ScanCode<'a> {
    fn from(text: &'a str) -> Self {
        ScanCode::Text(text)
    }
}

/// Normalises a layout-file key: uppercase hex, left-padded to two digits.
fn normalize_key(key: &str) -> String {
    ScanCode::Text(key).normalize()
}

/// All registered layouts.
///
/// A fresh registry always contains the built-in "generic" layout.
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    layouts: BTreeMap<String, Layout>,
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutRegistry {
    /// Creates a registry holding only the generic layout.
    pub fn new() -> Self {
        let mut registry = Self {
            layouts: BTreeMap::new(),
        };
        registry.register_layout(generic::definition());
        registry
    }

    /// Registers (or replaces) a layout.
    ///
    /// Returns `false` when the layout has no name; it is then ignored.
    pub fn register_layout(&mut self, definition: LayoutDefinition) -> bool {
        let name = match definition.name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => {
                warn!("cannot register unnamed layout: ignored");
                return false;
            }
        };
        debug!("register layout \"{name}\"");

        let mut entries: BTreeMap<String, KeyEntry> = definition
            .value
            .iter()
            .map(|(key, value)| (normalize_key(key), KeyEntry::parse(value)))
            .collect();

        if name != GENERIC_LAYOUT {
            if let Some(generic) = self.layouts.get(GENERIC_LAYOUT) {
                for (key, entry) in &generic.entries {
                    entries.entry(key.clone()).or_insert_with(|| entry.clone());
                }
            }
        }

        if let Some((family, _)) = name.split_once('-') {
            if !family.is_empty() && !self.layouts.contains_key(family) {
                debug!("derive layout \"{family}\" from \"{name}\"");
                self.layouts.insert(
                    family.to_string(),
                    Layout {
                        name: family.to_string(),
                        entries: entries.clone(),
                    },
                );
            }
        }

        self.layouts.insert(name.clone(), Layout { name, entries });
        true
    }

    /// Resolves a layout: the exact name, then `family-variant`, then
    /// `family`, then `generic`.
    pub fn get_layout<'r>(&self, layout: impl Into<LayoutRef<'r>>) -> Option<&Layout> {
        let layout = layout.into();
        if let LayoutRef::Name(name) = layout {
            if let Some(exact) = self.layouts.get(name) {
                return Some(exact);
            }
        }
        let (family, variant) = layout.parts();
        variant
            .and_then(|variant| self.layouts.get(&format!("{family}-{variant}")))
            .or_else(|| self.layouts.get(family))
            .or_else(|| self.layouts.get(GENERIC_LAYOUT))
    }

    /// Translates a scan code to a key code.
    ///
    /// Returns the shifted variant when `modifiers` holds either shift key.
    /// An unknown scan code is logged and yields `None`.
    pub fn get_layout_keycode<'r, 's>(
        &self,
        layout: impl Into<LayoutRef<'r>>,
        scan_code: impl Into<ScanCode<'s>>,
        modifiers: &[Modifier],
    ) -> Option<&str> {
        let layout = layout.into();
        let scan_code = scan_code.into().normalize();
        let table = self.get_layout(layout)?;
        match table.get(&scan_code) {
            Some(entry) => Some(entry.resolve(modifiers.iter().any(Modifier::is_shift))),
            None => {
                warn!(
                    "scancode \"{scan_code}\" not found for layout \"{}\"",
                    table.name
                );
                None
            }
        }
    }

    /// Names of every registered layout, sorted.
    pub fn layout_names(&self) -> Vec<&str> {
        self.layouts.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layouts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

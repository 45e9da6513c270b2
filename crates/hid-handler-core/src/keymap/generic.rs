//! Built-in "generic" layout: US QWERTY key codes for the HID Keyboard/Keypad
//! usage page.
//!
//! Values follow the layout-file convention: one token for keys without a
//! shifted variant, two space-separated tokens (`unshifted shifted`) otherwise.

use std::collections::BTreeMap;

use super::layout::LayoutDefinition;
use super::GENERIC_LAYOUT;

/// `(scan code, key code)` pairs of the generic layout.
pub const GENERIC_KEYS: &[(&str, &str)] = &[
    ("04", "a A"),
    ("05", "b B"),
    ("06", "c C"),
    ("07", "d D"),
    ("08", "e E"),
    ("09", "f F"),
    ("0A", "g G"),
    ("0B", "h H"),
    ("0C", "i I"),
    ("0D", "j J"),
    ("0E", "k K"),
    ("0F", "l L"),
    ("10", "m M"),
    ("11", "n N"),
    ("12", "o O"),
    ("13", "p P"),
    ("14", "q Q"),
    ("15", "r R"),
    ("16", "s S"),
    ("17", "t T"),
    ("18", "u U"),
    ("19", "v V"),
    ("1A", "w W"),
    ("1B", "x X"),
    ("1C", "y Y"),
    ("1D", "z Z"),
    ("1E", "1 !"),
    ("1F", "2 @"),
    ("20", "3 #"),
    ("21", "4 $"),
    ("22", "5 %"),
    ("23", "6 ^"),
    ("24", "7 &"),
    ("25", "8 *"),
    ("26", "9 ("),
    ("27", "0 )"),
    ("28", "enter"),
    ("29", "escape"),
    ("2A", "backspace"),
    ("2B", "tab"),
    ("2C", "space"),
    ("2D", "- _"),
    ("2E", "= +"),
    ("2F", "[ {"),
    ("30", "] }"),
    ("31", "\\ |"),
    ("32", "# ~"),
    ("33", "; :"),
    ("34", "' \""),
    ("35", "` ~"),
    ("36", ", <"),
    ("37", ". >"),
    ("38", "/ ?"),
    ("39", "caps-lock"),
    ("3A", "f1"),
    ("3B", "f2"),
    ("3C", "f3"),
    ("3D", "f4"),
    ("3E", "f5"),
    ("3F", "f6"),
    ("40", "f7"),
    ("41", "f8"),
    ("42", "f9"),
    ("43", "f10"),
    ("44", "f11"),
    ("45", "f12"),
    ("46", "print-screen"),
    ("47", "scroll-lock"),
    ("48", "pause"),
    ("49", "insert"),
    ("4A", "home"),
    ("4B", "page-up"),
    ("4C", "delete"),
    ("4D", "end"),
    ("4E", "page-down"),
    ("4F", "right"),
    ("50", "left"),
    ("51", "down"),
    ("52", "up"),
    ("53", "num-lock"),
    ("54", "kp-divide"),
    ("55", "kp-multiply"),
    ("56", "kp-subtract"),
    ("57", "kp-add"),
    ("58", "kp-enter"),
    ("59", "kp-1 kp-end"),
    ("5A", "kp-2 kp-down"),
    ("5B", "kp-3 kp-page-down"),
    ("5C", "kp-4 kp-left"),
    ("5D", "kp-5"),
    ("5E", "kp-6 kp-right"),
    ("5F", "kp-7 kp-home"),
    ("60", "kp-8 kp-up"),
    ("61", "kp-9 kp-page-up"),
    ("62", "kp-0 kp-insert"),
    ("63", "kp-decimal kp-delete"),
    ("64", "\\ |"),
    ("65", "menu"),
    ("67", "kp-equal"),
];

/// The generic layout as a registrable definition.
pub fn definition() -> LayoutDefinition {
    LayoutDefinition {
        name: Some(GENERIC_LAYOUT.to_string()),
        value: GENERIC_KEYS
            .iter()
            .map(|(scan, key)| (scan.to_string(), key.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

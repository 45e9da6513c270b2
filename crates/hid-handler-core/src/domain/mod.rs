//! Domain entities for the HID handler.
//!
//! Pure data types with no infrastructure dependencies: who a device is
//! ([`device`]) and what it said ([`event`]).

/// Device identity and supported-device configuration.
pub mod device;

/// Decoded events and their typed fields.
pub mod event;

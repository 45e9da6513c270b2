//! Error vocabulary shared by the decoders, the registry and the lifecycle
//! manager.

use thiserror::Error;

use crate::domain::device::DeviceKey;

/// Failure reported by the USB transport.
///
/// Only [`TransportError::NoDevice`] carries lifecycle meaning: it tells the
/// handler the physical device is gone, which triggers an automatic
/// unregistration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("device is no longer present")]
    NoDevice,

    #[error("resource busy")]
    Busy,

    #[error("access denied (insufficient permissions)")]
    Access,

    #[error("entity not found")]
    NotFound,

    #[error("operation timed out")]
    Timeout,

    #[error("operation not supported on this platform")]
    Unsupported,

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` when the error means the device was unplugged.
    pub fn is_no_device(&self) -> bool {
        matches!(self, TransportError::NoDevice)
    }
}

/// Errors raised by the HID handler.
///
/// Every variant exposes a stable string code through [`HandlerError::code`].
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The device has no interface with an assigned type.
    #[error("no interface found for device {key}")]
    NoInterface { key: DeviceKey },

    /// A claimed interface exposes no device-to-host endpoint.
    #[error("no in endpoint found for device {key} interface {interface}")]
    NoInEndpoint { key: DeviceKey, interface: u8 },

    /// A device with the same key is already registered. Swallowed by the
    /// lifecycle manager; a second registration is a no-op.
    #[error("device {0} is already registered")]
    AlreadyRegistered(DeviceKey),

    /// A decoder with the same name is already registered.
    #[error("event decoder \"{0}\" is already registered")]
    NameCollision(String),

    #[error("device {0} is not registered")]
    NotRegistered(DeviceKey),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl HandlerError {
    /// Stable machine-readable code of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::NoInterface { .. } => "NO_INTERFACE",
            HandlerError::NoInEndpoint { .. } => "NO_IN_ENDPOINT",
            HandlerError::AlreadyRegistered(_) => "ALREADY_REGISTERED",
            HandlerError::NameCollision(_) => "NAME_COLLISION",
            HandlerError::NotRegistered(_) => "NOT_REGISTERED",
            HandlerError::Transport(_) => "TRANSPORT",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let key = DeviceKey::new(0x192f, 0x0416);

        assert_eq!(HandlerError::NoInterface { key }.code(), "NO_INTERFACE");
        assert_eq!(
            HandlerError::NoInEndpoint { key, interface: 1 }.code(),
            "NO_IN_ENDPOINT"
        );
        assert_eq!(HandlerError::AlreadyRegistered(key).code(), "ALREADY_REGISTERED");
        assert_eq!(
            HandlerError::NameCollision("MouseEvent".into()).code(),
            "NAME_COLLISION"
        );
        assert_eq!(HandlerError::NotRegistered(key).code(), "NOT_REGISTERED");
        assert_eq!(
            HandlerError::from(TransportError::Busy).code(),
            "TRANSPORT"
        );
    }

    #[test]
    fn test_display_includes_device_key() {
        let err = HandlerError::NoInEndpoint {
            key: DeviceKey::new(0x05ac, 0x0221),
            interface: 2,
        };

        assert_eq!(
            err.to_string(),
            "no in endpoint found for device 05ac:0221 interface 2"
        );
    }

    #[test]
    fn test_only_no_device_means_unplugged() {
        assert!(TransportError::NoDevice.is_no_device());
        assert!(!TransportError::Timeout.is_no_device());
        assert!(!TransportError::Other("pipe".into()).is_no_device());
    }
}

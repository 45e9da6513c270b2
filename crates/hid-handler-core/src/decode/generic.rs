use super::{DecodeContext, ReportDecoder};
use crate::domain::device::DeviceType;
use crate::domain::event::EventPayload;

/// Keeps the raw sample without any semantic decoding.
///
/// Also the fallback for interfaces whose type has no registered decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDecoder;

impl ReportDecoder for GenericDecoder {
    fn device_type(&self) -> DeviceType {
        DeviceType::Generic
    }

    fn decode(&self, _sample: &[u8], _ctx: &mut DecodeContext<'_>) -> EventPayload {
        EventPayload::Generic
    }
}

//! Endpoint data pipeline.
//!
//! Every raw sample read from a polled endpoint goes through
//! [`dispatch_sample`]:
//!
//! ```text
//! sample ─► interface type ─► decoder ("{Type}Event") ─► HidEvent
//!                                                         │
//!                    device channel ◄─────────────────────┤
//!                    handler channel ◄────────────────────┘
//! ```
//!
//! Each event is published under `event` and then under every topic the
//! decoder declares whose decoded field set is non-empty.

use std::sync::Arc;

use hid_handler_core::{DecodeContext, DecoderRegistry, HidEvent, LayoutRegistry, Topic};
use tracing::{debug, trace};

use super::channel::{EventChannel, Notification};
use super::registered_hid::RegisteredDevice;

/// Decodes `sample` from `interface`/`endpoint` of `device` and publishes
/// the event on the device channel and on `handler_channel`.
///
/// Returns `None`, publishing nothing, when the interface is not claimed or
/// the endpoint is no longer polled.
pub fn dispatch_sample(
    decoders: &DecoderRegistry,
    layouts: &LayoutRegistry,
    handler_channel: &EventChannel,
    device: &mut RegisteredDevice,
    interface: u8,
    endpoint: u8,
    sample: Vec<u8>,
) -> Option<Arc<HidEvent>> {
    let key = device.key;
    let Some(claimed) = device.interfaces.get_mut(&interface) else {
        debug!("{key}: sample for unclaimed interface {interface} dropped");
        return None;
    };
    if !claimed.is_polled(endpoint) {
        debug!("{key}#{interface}: sample for inactive endpoint {endpoint} dropped");
        return None;
    }

    let decoder = decoders.resolve(&claimed.device_type);
    let mut ctx = DecodeContext {
        layouts,
        layout: claimed.layout.as_deref(),
        state: &mut claimed.state,
    };
    let payload = decoder.decode(&sample, &mut ctx);
    let event = Arc::new(HidEvent {
        device: key,
        device_type: claimed.device_type.clone(),
        interface,
        endpoint,
        data: sample,
        payload,
    });
    trace!("{key}#{interface}/{endpoint}: {}", decoder.render(&event));

    publish_event(
        &[handler_channel, &device.channel],
        decoder.topics(),
        &event,
    );
    Some(event)
}

/// Publishes `event` under `event`, then under each of `topics` that the
/// payload fills, on every channel in order.
pub fn publish_event(channels: &[&EventChannel], topics: &[Topic], event: &Arc<HidEvent>) {
    let topics = std::iter::once(Topic::Event)
        .chain(topics.iter().copied())
        .filter(|topic| event.payload.has(*topic));
    for topic in topics {
        for channel in channels {
            channel.publish(Notification::Hid {
                topic,
                event: Arc::clone(event),
            });
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Broadcast channels for decoded events and USB notifications.
//!
//! The handler owns one handler-wide [`EventChannel`] and every registered
//! device owns its own.  Subscribers get a `tokio::sync::broadcast`
//! receiver; a slow subscriber lags (and is told so by the receiver) rather
//! than blocking the pipeline.
//!
//! A device channel is closed exactly once, at unregistration: subscribers
//! receive [`Notification::End`] and then observe the channel closing.

use std::sync::Arc;

use hid_handler_core::{HidEvent, Topic};
use tokio::sync::broadcast;
use tracing::trace;

use crate::infrastructure::usb::DeviceDescriptor;

/// Capacity of every channel before slow subscribers start lagging.
pub const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbAction {
    Attach,
    Detach,
}

impl UsbAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsbAction::Attach => "attach",
            UsbAction::Detach => "detach",
        }
    }
}

/// One message published on an [`EventChannel`].
#[derive(Debug, Clone)]
pub enum Notification {
    /// A decoded event under `topic` (`event`, `key`, `click`, `wheel` or
    /// `move`).
    Hid { topic: Topic, event: Arc<HidEvent> },
    /// A supported device was attached or detached.
    Usb {
        action: UsbAction,
        device: DeviceDescriptor,
    },
    /// The channel is closing; nothing follows.
    End,
}

impl Notification {
    /// Name of the channel topic this notification is published under.
    pub fn topic_name(&self) -> &'static str {
        match self {
            Notification::Hid { topic, .. } => topic.as_str(),
            Notification::Usb { .. } => "usb",
            Notification::End => "end",
        }
    }
}

#[derive(Debug)]
pub struct EventChannel {
    sender: Option<broadcast::Sender<Notification>>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender: Some(sender),
        }
    }

    /// New receiver.  On a closed channel the receiver reports closure on
    /// its first `recv`.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        match &self.sender {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Publishes `notification`; returns how many subscribers received it.
    pub fn publish(&self, notification: Notification) -> usize {
        let Some(sender) = &self.sender else {
            return 0;
        };
        let topic = notification.topic_name();
        // An error only means nobody is subscribed.
        let delivered = sender.send(notification).unwrap_or(0);
        trace!("published \"{topic}\" to {delivered} subscriber(s)");
        delivered
    }

    /// Publishes [`Notification::End`] and detaches every subscriber.
    /// Subsequent calls do nothing.
    pub fn close(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Notification::End);
        }
    }

    /// Drops every current subscriber without an end signal and reopens the
    /// channel.
    pub fn reset(&mut self) {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        self.sender = Some(sender);
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender
            .as_ref()
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

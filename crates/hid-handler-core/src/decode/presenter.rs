//! Presenter remote reports.
//!
//! Byte 0 selects the sub-format:
//!
//! ```text
//! mode 4   byte 1 bits 0/1 = left/right button
//!          byte 2 = 0xFF left, 0x01 right
//!          byte 3 = 0xFF up,   0x01 down
//! mode 2   byte 2 bits 2/3/4 = volume toggle/up/down
//! ```
//!
//! Any other mode decodes to empty flag sets.  No state is kept between
//! samples.

use super::{byte, has_bit, DecodeContext, ReportDecoder};
use crate::domain::device::DeviceType;
use crate::domain::event::{Direction, EventPayload, HidEvent, PresenterButton, PresenterReport, Topic};

pub const MODE_POINTER: u8 = 4;
pub const MODE_VOLUME: u8 = 2;

#[derive(Debug, Default, Clone, Copy)]
pub struct PresenterDecoder;

impl ReportDecoder for PresenterDecoder {
    fn device_type(&self) -> DeviceType {
        DeviceType::Presenter
    }

    fn decode(&self, sample: &[u8], _ctx: &mut DecodeContext<'_>) -> EventPayload {
        let mut report = PresenterReport {
            mode: byte(sample, 0),
            ..PresenterReport::default()
        };

        match report.mode {
            MODE_POINTER => {
                let buttons = byte(sample, 1);
                report.button.set(PresenterButton::Left, has_bit(buttons, 0));
                report.button.set(PresenterButton::Right, has_bit(buttons, 1));

                let (x, y) = (byte(sample, 2), byte(sample, 3));
                report.movement.set(Direction::Left, x == 0xFF);
                report.movement.set(Direction::Right, x == 0x01);
                report.movement.set(Direction::Up, y == 0xFF);
                report.movement.set(Direction::Down, y == 0x01);
            }
            MODE_VOLUME => {
                let buttons = byte(sample, 2);
                report.button.set(PresenterButton::VolToggle, has_bit(buttons, 2));
                report.button.set(PresenterButton::VolUp, has_bit(buttons, 3));
                report.button.set(PresenterButton::VolDown, has_bit(buttons, 4));
            }
            _ => {}
        }

        EventPayload::Presenter(report)
    }

    fn topics(&self) -> &'static [Topic] {
        &[Topic::Click, Topic::Move]
    }

    fn render(&self, event: &HidEvent) -> String {
        match event.presenter() {
            Some(report) => report.to_string(),
            None => super::render_generic(event),
        }
    }
}

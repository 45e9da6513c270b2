//! Mouse and touchpad reports.
//!
//! Both share the same diffing policy against the previous sample of the
//! interface:
//!
//! - a button flag is set only when the button was held in the previous sample
//!   and is released now (release edge);
//! - a motion flag is recorded, with its current value, whenever it differs
//!   from the previous sample;
//! - nothing is diffed for the very first sample after registration.
//!
//! Mouse wheel flags are taken from the current sample as is.

use super::{byte, has_bit, DecodeContext, PointerSample, ReportDecoder};
use crate::domain::device::DeviceType;
use crate::domain::event::{
    Direction, EventPayload, Flags, HidEvent, MouseButton, PointerReport, Topic, WheelDirection,
};

/// Motion magnitude (in counts) above which a mouse axis counts as moved.
pub const MOUSE_MOVE_THRESHOLD: i8 = 10;

/// Motion magnitude above which a touchpad axis counts as moved.
pub const TOUCHPAD_MOVE_THRESHOLD: i8 = 3;

fn movement(x: i8, y: i8, threshold: i8) -> Flags<Direction> {
    [
        (Direction::Left, x < -threshold),
        (Direction::Right, x > threshold),
        (Direction::Up, y < -threshold),
        (Direction::Down, y > threshold),
    ]
    .into_iter()
    .collect()
}

/// Diffs `current` against the previous sample, then stores `current`.
fn diff_with_previous(current: PointerSample, previous: &mut Option<PointerSample>) -> PointerReport {
    let mut report = PointerReport::default();

    if let Some(last) = previous.as_ref() {
        for button in MouseButton::ALL {
            if last.button.get(button) && !current.button.get(button) {
                report.button.set(button, true);
            }
        }
        for direction in Direction::ALL {
            let now = current.movement.get(direction);
            if last.movement.get(direction) != now {
                report.movement.set(direction, now);
            }
        }
    }
    for direction in [WheelDirection::Down, WheelDirection::Up] {
        if current.wheel.get(direction) {
            report.wheel.set(direction, true);
        }
    }

    *previous = Some(current);
    report
}

fn render_pointer(event: &HidEvent) -> String {
    match event.pointer() {
        Some(report) => report.to_string(),
        None => super::render_generic(event),
    }
}

/// Five-button mouse with wheel.
///
/// ```text
/// byte 0   button bitmask (left, right, middle, side, extra)
/// byte 1   signed relative X
/// byte 2   signed relative Y
/// byte 4   wheel: 0 = none, 0xFF = down, anything else = up
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct MouseDecoder;

impl ReportDecoder for MouseDecoder {
    fn device_type(&self) -> DeviceType {
        DeviceType::Mouse
    }

    fn decode(&self, sample: &[u8], ctx: &mut DecodeContext<'_>) -> EventPayload {
        let buttons = byte(sample, 0);
        let x = byte(sample, 1) as i8;
        let y = byte(sample, 2) as i8;

        let mut wheel = Flags::new();
        match byte(sample, 4) {
            0 => {}
            0xFF => wheel.set(WheelDirection::Down, true),
            _ => wheel.set(WheelDirection::Up, true),
        }

        let current = PointerSample {
            button: MouseButton::ALL
                .iter()
                .enumerate()
                .map(|(bit, button)| (*button, has_bit(buttons, bit as u8)))
                .collect(),
            movement: movement(x, y, MOUSE_MOVE_THRESHOLD),
            wheel,
        };

        EventPayload::Mouse(diff_with_previous(current, &mut ctx.state.last_pointer))
    }

    fn topics(&self) -> &'static [Topic] {
        &[Topic::Click, Topic::Wheel, Topic::Move]
    }

    fn render(&self, event: &HidEvent) -> String {
        render_pointer(event)
    }
}

/// Two-button touchpad.
///
/// ```text
/// byte 1   button bitmask (left, right)
/// byte 2   signed relative X
/// byte 3   signed relative Y
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct TouchpadDecoder;

impl ReportDecoder for TouchpadDecoder {
    fn device_type(&self) -> DeviceType {
        DeviceType::Touchpad
    }

    fn decode(&self, sample: &[u8], ctx: &mut DecodeContext<'_>) -> EventPayload {
        let buttons = byte(sample, 1);
        let x = byte(sample, 2) as i8;
        let y = byte(sample, 3) as i8;

        let current = PointerSample {
            button: [
                (MouseButton::Left, has_bit(buttons, 0)),
                (MouseButton::Right, has_bit(buttons, 1)),
            ]
            .into_iter()
            .collect(),
            movement: movement(x, y, TOUCHPAD_MOVE_THRESHOLD),
            wheel: Flags::new(),
        };

        EventPayload::Touchpad(diff_with_previous(current, &mut ctx.state.last_pointer))
    }

    fn topics(&self) -> &'static [Topic] {
        &[Topic::Click, Topic::Move]
    }

    fn render(&self, event: &HidEvent) -> String {
        render_pointer(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecoderState;
    use crate::keymap::layout::LayoutRegistry;

    fn decode_all(decoder: &dyn ReportDecoder, samples: &[&[u8]]) -> Vec<PointerReport> {
        let layouts = LayoutRegistry::new();
        let mut state = DecoderState::default();
        samples
            .iter()
            .map(|sample| {
                let mut ctx = DecodeContext {
                    layouts: &layouts,
                    layout: None,
                    state: &mut state,
                };
                match decoder.decode(sample, &mut ctx) {
                    EventPayload::Mouse(report) | EventPayload::Touchpad(report) => report,
                    other => panic!("unexpected payload {other:?}"),
                }
            })
            .collect()
    }

    #[test]
    fn test_first_sample_sets_no_button_or_move() {
        let reports = decode_all(&MouseDecoder, &[&[0x01, 20, 0, 0, 0]]);

        assert!(reports[0].button.is_empty());
        assert_eq!(reports[0].movement, Flags::new());
    }

    #[test]
    fn test_click_is_reported_on_release_edge() {
        let reports = decode_all(&MouseDecoder, &[&[0x01, 0, 0, 0, 0], &[0x00, 0, 0, 0, 0]]);

        assert!(reports[1].button.get(MouseButton::Left));
        assert!(!reports[1].button.get(MouseButton::Right));
    }

    #[test]
    fn test_held_button_is_not_a_click() {
        let reports = decode_all(&MouseDecoder, &[&[0x02, 0, 0, 0, 0], &[0x02, 0, 0, 0, 0]]);

        assert!(reports[1].button.is_empty());
    }

    #[test]
    fn test_motion_change_is_recorded_with_current_value() {
        // Arrange – right (x = 11), then stop (x = 0)
        let samples: [&[u8]; 3] = [&[0, 0, 0, 0, 0], &[0, 11, 0, 0, 0], &[0, 0, 0, 0, 0]];

        // Act
        let reports = decode_all(&MouseDecoder, &samples);

        // Assert
        assert_eq!(reports[1].movement.value(Direction::Right), Some(true));
        assert_eq!(reports[2].movement.value(Direction::Right), Some(false));
        assert!(reports[2].movement.is_empty());
    }

    #[test]
    fn test_mouse_threshold_is_exclusive() {
        let reports = decode_all(&MouseDecoder, &[&[0, 0, 0, 0, 0], &[0, 10, (-10i8) as u8, 0, 0]]);

        assert!(reports[1].movement.is_empty());
    }

    #[test]
    fn test_wheel_is_not_diffed() {
        let reports = decode_all(
            &MouseDecoder,
            &[&[0, 0, 0, 0, 0xFF], &[0, 0, 0, 0, 0xFF], &[0, 0, 0, 0, 0x01]],
        );

        assert!(reports[0].wheel.get(WheelDirection::Down));
        assert!(reports[1].wheel.get(WheelDirection::Down));
        assert!(reports[2].wheel.get(WheelDirection::Up));
    }

    #[test]
    fn test_touchpad_reads_buttons_from_byte_one() {
        let reports = decode_all(&TouchpadDecoder, &[&[0, 0x02, 0, 0], &[0, 0x00, 0, 0]]);

        assert!(reports[1].button.get(MouseButton::Right));
        assert!(reports[1].wheel.is_empty());
    }

    #[test]
    fn test_touchpad_threshold_is_three() {
        let reports = decode_all(&TouchpadDecoder, &[&[0, 0, 0, 0], &[0, 0, 4, (-4i8) as u8]]);

        assert!(reports[1].movement.get(Direction::Right));
        assert!(reports[1].movement.get(Direction::Up));
    }
}

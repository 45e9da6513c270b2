//! Numeric keypad reports: keyboard layout without modifiers, reporting only
//! keys that appeared since the previous sample.

use super::{scan_codes, DecodeContext, ReportDecoder};
use crate::domain::device::DeviceType;
use crate::domain::event::{EventPayload, HidEvent, KeyStroke, NumpadReport, Topic};
use crate::keymap::NUMPAD_LAYOUT;

#[derive(Debug, Default, Clone, Copy)]
pub struct NumpadDecoder;

impl ReportDecoder for NumpadDecoder {
    fn device_type(&self) -> DeviceType {
        DeviceType::Numpad
    }

    fn decode(&self, sample: &[u8], ctx: &mut DecodeContext<'_>) -> EventPayload {
        let current = scan_codes(sample);
        let previous = std::mem::replace(&mut ctx.state.last_scan_codes, current.clone());

        let appeared: Vec<u8> = if previous.is_empty() {
            current
        } else {
            current
                .into_iter()
                .filter(|code| !previous.contains(code))
                .collect()
        };

        let layout = ctx.layout.unwrap_or(NUMPAD_LAYOUT);
        let keys = appeared
            .into_iter()
            .map(|scan_code| KeyStroke {
                scan_code,
                key_code: ctx
                    .layouts
                    .get_layout_keycode(layout, scan_code, &[])
                    .map(str::to_owned),
            })
            .collect();

        EventPayload::Numpad(NumpadReport { keys })
    }

    fn topics(&self) -> &'static [Topic] {
        &[Topic::Key]
    }

    fn render(&self, event: &HidEvent) -> String {
        match event.numpad() {
            Some(report) => report.to_string(),
            None => super::render_generic(event),
        }
    }
}

//! Boot-protocol keyboard reports.
//!
//! ```text
//! byte 0      modifier bitmask (bit 0 = left-ctrl ... bit 7 = right-super)
//! byte 1      reserved
//! bytes 2..8  up to six pressed scan codes, 0 = empty slot
//! ```

use super::{byte, has_bit, scan_codes, DecodeContext, ReportDecoder};
use crate::domain::device::DeviceType;
use crate::domain::event::{EventPayload, HidEvent, KeyStroke, KeyboardReport, Modifier, Topic};
use crate::keymap::GENERIC_LAYOUT;

#[derive(Debug, Default, Clone, Copy)]
pub struct KeyboardDecoder;

/// Modifiers whose bit is set in `bits`.
pub fn modifiers(bits: u8) -> Vec<Modifier> {
    Modifier::ALL
        .iter()
        .enumerate()
        .filter(|(bit, _)| *bit < 8 && has_bit(bits, *bit as u8))
        .map(|(_, modifier)| *modifier)
        .collect()
}

impl ReportDecoder for KeyboardDecoder {
    fn device_type(&self) -> DeviceType {
        DeviceType::Keyboard
    }

    fn decode(&self, sample: &[u8], ctx: &mut DecodeContext<'_>) -> EventPayload {
        let modifier_bits = byte(sample, 0);
        let modifiers = modifiers(modifier_bits);
        let layout = ctx.layout.unwrap_or(GENERIC_LAYOUT);
        let keys = scan_codes(sample)
            .into_iter()
            .map(|scan_code| KeyStroke {
                scan_code,
                key_code: ctx
                    .layouts
                    .get_layout_keycode(layout, scan_code, &modifiers)
                    .map(str::to_owned),
            })
            .collect();

        EventPayload::Keyboard(KeyboardReport {
            modifier_bits,
            modifiers,
            keys,
        })
    }

    fn topics(&self) -> &'static [Topic] {
        &[Topic::Key]
    }

    fn render(&self, event: &HidEvent) -> String {
        match event.keyboard() {
            Some(report) => report.to_string(),
            None => super::render_generic(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecoderState;
    use crate::keymap::layout::LayoutRegistry;

    fn decode(sample: &[u8]) -> KeyboardReport {
        let layouts = LayoutRegistry::new();
        let mut state = DecoderState::default();
        let mut ctx = DecodeContext {
            layouts: &layouts,
            layout: None,
            state: &mut state,
        };
        match KeyboardDecoder.decode(sample, &mut ctx) {
            EventPayload::Keyboard(report) => report,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_modifier_bit_zero_is_left_ctrl() {
        let report = decode(&[0b0000_0001, 0, 0, 0, 0, 0, 0, 0]);

        assert_eq!(report.modifiers, vec![Modifier::LeftCtrl]);
    }

    #[test]
    fn test_all_modifier_bits_map_in_order() {
        assert_eq!(modifiers(0xFF), Modifier::ALL[..8].to_vec());
    }

    #[test]
    fn test_zero_slots_are_dropped() {
        let report = decode(&[0, 0, 0x04, 0, 0x05, 0, 0, 0]);

        let codes: Vec<u8> = report.keys.iter().map(|k| k.scan_code).collect();
        assert_eq!(codes, vec![0x04, 0x05]);
    }

    #[test]
    fn test_shift_selects_uppercase_key_code() {
        let report = decode(&[0b0010_0000, 0, 0x04, 0, 0, 0, 0, 0]);

        assert_eq!(report.keys[0].key_code.as_deref(), Some("A"));
    }
}

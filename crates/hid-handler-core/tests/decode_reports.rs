//! Integration tests for the report decoders.
//!
//! Samples go through the public [`DecoderRegistry`] exactly as the handler
//! does it: resolve the decoder by device type, decode with the interface's
//! state and layout, then inspect the payload and the topics it triggers.

use hid_handler_core::{
    decode::DecoderState, DecodeContext, DecoderRegistry, DeviceKey, DeviceType, Direction,
    EventPayload, HidEvent, LayoutDefinition, LayoutRegistry, Modifier, MouseButton,
    PresenterButton, Topic, WheelDirection,
};

/// Decodes a sequence of samples for one interface, sharing its state.
struct Interface {
    device_type: DeviceType,
    layout: Option<String>,
    layouts: LayoutRegistry,
    registry: DecoderRegistry,
    state: DecoderState,
}

impl Interface {
    fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            layout: None,
            layouts: LayoutRegistry::new(),
            registry: DecoderRegistry::with_builtins(),
            state: DecoderState::default(),
        }
    }

    fn with_layout(mut self, layout: &str) -> Self {
        self.layout = Some(layout.to_string());
        self
    }

    fn decode(&mut self, sample: &[u8]) -> HidEvent {
        let decoder = self.registry.resolve(&self.device_type);
        let mut ctx = DecodeContext {
            layouts: &self.layouts,
            layout: self.layout.as_deref(),
            state: &mut self.state,
        };
        let payload = decoder.decode(sample, &mut ctx);
        HidEvent {
            device: DeviceKey::new(0x1234, 0x5678),
            device_type: self.device_type.clone(),
            interface: 0,
            endpoint: 1,
            data: sample.to_vec(),
            payload,
        }
    }

    /// Topics the pipeline would publish for `event`, `event` first.
    fn topics(&self, event: &HidEvent) -> Vec<Topic> {
        let decoder = self.registry.resolve(&self.device_type);
        std::iter::once(Topic::Event)
            .chain(decoder.topics().iter().copied())
            .filter(|topic| event.payload.has(*topic))
            .collect()
    }
}

// ── Keyboard ──────────────────────────────────────────────────────────────────

#[test]
fn test_keyboard_left_ctrl_only() {
    let mut keyboard = Interface::new(DeviceType::Keyboard);

    let event = keyboard.decode(&[0b0000_0001, 0, 0, 0, 0, 0, 0, 0]);

    assert_eq!(event.keyboard().unwrap().modifiers, vec![Modifier::LeftCtrl]);
}

#[test]
fn test_keyboard_key_topic_only_with_keys() {
    let mut keyboard = Interface::new(DeviceType::Keyboard);

    let idle = keyboard.decode(&[0x02, 0, 0, 0, 0, 0, 0, 0]);
    let typed = keyboard.decode(&[0x00, 0, 0x0B, 0x0C, 0, 0, 0, 0]);

    assert_eq!(keyboard.topics(&idle), vec![Topic::Event]);
    assert_eq!(keyboard.topics(&typed), vec![Topic::Event, Topic::Key]);
    let codes: Vec<_> = typed
        .keyboard()
        .unwrap()
        .keys
        .iter()
        .map(|k| k.key_code.clone().unwrap())
        .collect();
    assert_eq!(codes, vec!["h", "i"]);
}

#[test]
fn test_keyboard_uses_assigned_layout() {
    // Arrange
    let mut keyboard = Interface::new(DeviceType::Keyboard).with_layout("fr-azerty");
    keyboard
        .layouts
        .register_layout(LayoutDefinition::new("fr-azerty").with_key("04", "q Q"));

    // Act – right shift held, scan code 0x04
    let event = keyboard.decode(&[0b0010_0000, 0, 0x04, 0, 0, 0, 0, 0]);

    // Assert
    let key = &event.keyboard().unwrap().keys[0];
    assert_eq!(key.scan_code, 0x04);
    assert_eq!(key.key_code.as_deref(), Some("Q"));
}

#[test]
fn test_keyboard_unknown_scan_code_keeps_stroke_without_key_code() {
    let mut keyboard = Interface::new(DeviceType::Keyboard);

    let event = keyboard.decode(&[0, 0, 0xF0, 0, 0, 0, 0, 0]);

    let keys = &event.keyboard().unwrap().keys;
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].key_code, None);
    assert!(event.payload.has(Topic::Key));
}

// ── Numpad ────────────────────────────────────────────────────────────────────

#[test]
fn test_numpad_reports_only_new_scan_codes() {
    let mut numpad = Interface::new(DeviceType::Numpad);

    numpad.decode(&[0, 0, 4, 5, 0, 0, 0, 0]);
    let second = numpad.decode(&[0, 0, 4, 6, 0, 0, 0, 0]);

    let keys = &second.numpad().unwrap().keys;
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].scan_code, 6);
    assert_eq!(keys[0].key_code.as_deref(), Some("c"));
}

#[test]
fn test_numpad_release_yields_no_key_topic() {
    let mut numpad = Interface::new(DeviceType::Numpad);

    numpad.decode(&[0, 0, 0x59, 0, 0, 0, 0, 0]);
    let release = numpad.decode(&[0, 0, 0, 0, 0, 0, 0, 0]);
    let again = numpad.decode(&[0, 0, 0x59, 0, 0, 0, 0, 0]);

    assert_eq!(numpad.topics(&release), vec![Topic::Event]);
    assert_eq!(
        again.numpad().unwrap().keys[0].key_code.as_deref(),
        Some("kp-1")
    );
}

#[test]
fn test_numpad_prefers_numpad_layout() {
    let mut numpad = Interface::new(DeviceType::Numpad);
    numpad
        .layouts
        .register_layout(LayoutDefinition::new("numpad").with_key("59", "1"));

    let event = numpad.decode(&[0, 0, 0x59, 0, 0, 0, 0, 0]);

    assert_eq!(
        event.numpad().unwrap().keys[0].key_code.as_deref(),
        Some("1")
    );
}

// ── Mouse ─────────────────────────────────────────────────────────────────────

#[test]
fn test_mouse_release_after_press_sets_left_click() {
    let mut mouse = Interface::new(DeviceType::Mouse);

    let press = mouse.decode(&[0x01, 0, 0, 0, 0, 0]);
    let release = mouse.decode(&[0x00, 0, 0, 0, 0, 0]);

    assert!(!press.pointer().unwrap().button.get(MouseButton::Left));
    assert!(release.pointer().unwrap().button.get(MouseButton::Left));
    assert_eq!(mouse.topics(&release), vec![Topic::Event, Topic::Click]);
}

#[test]
fn test_mouse_wheel_down_and_move_left() {
    let mut mouse = Interface::new(DeviceType::Mouse);
    mouse.decode(&[0, 0, 0, 0, 0, 0]);

    let event = mouse.decode(&[0, (-20i8) as u8, 0, 0, 0xFF, 0]);

    let report = event.pointer().unwrap();
    assert!(report.wheel.get(WheelDirection::Down));
    assert!(report.movement.get(Direction::Left));
    assert_eq!(
        mouse.topics(&event),
        vec![Topic::Event, Topic::Wheel, Topic::Move]
    );
    assert_eq!(
        mouse.registry.resolve(&DeviceType::Mouse).render(&event),
        "button: [], wheel: [down], move: [left]"
    );
}

// ── Touchpad ──────────────────────────────────────────────────────────────────

#[test]
fn test_touchpad_never_publishes_wheel() {
    let mut touchpad = Interface::new(DeviceType::Touchpad);
    touchpad.decode(&[0, 0, 0, 0, 0xFF]);

    let event = touchpad.decode(&[0, 0, 0, 5, 0xFF]);

    assert!(event.pointer().unwrap().movement.get(Direction::Down));
    assert_eq!(touchpad.topics(&event), vec![Topic::Event, Topic::Move]);
}

// ── Presenter ─────────────────────────────────────────────────────────────────

#[test]
fn test_presenter_pointer_mode() {
    let mut presenter = Interface::new(DeviceType::Presenter);

    let event = presenter.decode(&[4, 0b01, 0xFF, 0x01]);

    let report = event.presenter().unwrap();
    assert!(report.button.get(PresenterButton::Left));
    assert!(report.movement.get(Direction::Left));
    assert!(report.movement.get(Direction::Down));
    assert!(!report.movement.get(Direction::Up));
    assert_eq!(
        presenter.topics(&event),
        vec![Topic::Event, Topic::Click, Topic::Move]
    );
}

#[test]
fn test_presenter_volume_mode() {
    let mut presenter = Interface::new(DeviceType::Presenter);

    let event = presenter.decode(&[2, 0, 0b0000_1000, 0]);

    let report = event.presenter().unwrap();
    assert!(report.button.get(PresenterButton::VolUp));
    assert!(!report.button.get(PresenterButton::VolToggle));
    assert!(report.movement.is_empty());
}

#[test]
fn test_presenter_unknown_mode_is_empty() {
    let mut presenter = Interface::new(DeviceType::Presenter);

    let event = presenter.decode(&[7, 0xFF, 0xFF, 0xFF]);

    assert_eq!(presenter.topics(&event), vec![Topic::Event]);
}

// ── Generic ───────────────────────────────────────────────────────────────────

#[test]
fn test_unmapped_type_decodes_as_generic() {
    let mut gamepad = Interface::new(DeviceType::from("gamepad"));

    let event = gamepad.decode(&[1, 2, 3]);

    assert_eq!(event.payload, EventPayload::Generic);
    assert_eq!(gamepad.topics(&event), vec![Topic::Event]);
    assert_eq!(
        gamepad.registry.resolve(&event.device_type).render(&event),
        "device type: gamepad, data: [01, 02, 03]"
    );
}

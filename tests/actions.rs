use gesture_daemon::actions::keys::{clear_mods, set_mod_state, ModifierKey, Modifiers};
use gesture_daemon::actions::Action;
use gesture_daemon::grabber::{GrabCall, MockGrabber};
use gesture_daemon::session::Session;

#[test]
fn modifier_changes_press_and_release_only_changed_keys() {
    let (mut grabber, handle) = MockGrabber::new(3);
    let mut session = Session::new();

    set_mod_state(&mut session, &mut grabber, Modifiers::SHIFT | Modifiers::CONTROL);
    set_mod_state(&mut session, &mut grabber, Modifiers::CONTROL | Modifiers::MOD4);
    clear_mods(&mut session, &mut grabber);

    assert_eq!(
        handle.calls(),
        vec![
            GrabCall::Modifier {
                key: ModifierKey::ShiftL,
                press: true
            },
            GrabCall::Modifier {
                key: ModifierKey::ControlL,
                press: true
            },
            GrabCall::Modifier {
                key: ModifierKey::ShiftL,
                press: false
            },
            GrabCall::Modifier {
                key: ModifierKey::ControlL,
                press: false
            },
        ]
    );
    assert!(session.mod_state.is_empty());
}

#[test]
fn xtest_key_is_injected_with_modifiers() {
    let (mut grabber, handle) = MockGrabber::new(3);
    let mut session = Session::new();
    let action = Action::SendKey {
        key: 0x74,
        code: 28,
        mods: Modifiers::SHIFT,
        xtest: true,
    };
    action.run(&mut session, &mut grabber);

    assert_eq!(
        handle.calls(),
        vec![
            GrabCall::Modifier {
                key: ModifierKey::ShiftL,
                press: true
            },
            GrabCall::Key {
                code: 28,
                press: true
            },
            GrabCall::Key {
                code: 28,
                press: false
            },
        ]
    );
    assert_eq!(session.mod_state, Modifiers::SHIFT);
}

#[test]
fn window_key_needs_a_current_window() {
    let (mut grabber, handle) = MockGrabber::new(3);
    let mut session = Session::new();
    let action = Action::SendKey {
        key: 0xff1b,
        code: 9,
        mods: Modifiers::CONTROL,
        xtest: false,
    };

    action.run(&mut session, &mut grabber);
    assert!(handle.calls().is_empty());

    session.current = Some(77);
    action.run(&mut session, &mut grabber);
    assert_eq!(
        handle.calls(),
        vec![GrabCall::SendKey {
            window: 77,
            code: 9,
            mods: Modifiers::CONTROL
        }]
    );
}

#[test]
fn mode_actions_only_set_session_flags() {
    let (mut grabber, handle) = MockGrabber::new(3);
    let mut session = Session::new();

    Action::Scroll {
        mods: Modifiers::NONE,
    }
    .run(&mut session, &mut grabber);
    Action::Ignore {
        mods: Modifiers::NONE,
    }
    .run(&mut session, &mut grabber);
    Action::Button {
        mods: Modifiers::NONE,
        button: 2,
    }
    .run(&mut session, &mut grabber);

    assert!(session.scroll);
    assert!(session.ignore);
    assert_eq!(session.press_button, Some(2));
    assert!(handle.calls().is_empty());
}

#[test]
fn command_spawn_does_not_touch_grabber() {
    let (mut grabber, handle) = MockGrabber::new(3);
    let mut session = Session::new();
    Action::command("true").run(&mut session, &mut grabber);
    assert!(handle.calls().is_empty());
}

#[test]
fn labels_for_list_display() {
    let key = Action::SendKey {
        key: 0x74,
        code: 28,
        mods: Modifiers::CONTROL | Modifiers::SHIFT,
        xtest: true,
    };
    assert_eq!(key.label(), "Shift+Ctrl+t");
    assert_eq!(
        Action::Button {
            mods: Modifiers::NONE,
            button: 2
        }
        .label(),
        "Button 2"
    );
    assert_eq!(
        Action::Scroll {
            mods: Modifiers::MOD1
        }
        .label(),
        "Alt+Scroll"
    );
    assert_eq!(Action::command("firefox").label(), "firefox");
}

#[test]
fn actions_serialize_with_type_tag() {
    let action = Action::Button {
        mods: Modifiers::SHIFT,
        button: 2,
    };
    let json = serde_json::to_value(&action).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "type": "button", "mods": 1, "button": 2 })
    );

    let parsed: Action = serde_json::from_str(r#"{ "type": "send_key", "key": 65, "code": 38 }"#)
        .unwrap();
    assert_eq!(
        parsed,
        Action::SendKey {
            key: 65,
            code: 38,
            mods: Modifiers::NONE,
            xtest: false
        }
    );
}

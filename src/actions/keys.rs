use crate::grabber::Grabber;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Modifier bitmask, bit-compatible with the X11/GDK modifier state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifiers(pub u32);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const SHIFT: Modifiers = Modifiers(1 << 0);
    pub const CONTROL: Modifiers = Modifiers(1 << 2);
    pub const MOD1: Modifiers = Modifiers(1 << 3);
    pub const MOD2: Modifiers = Modifiers(1 << 4);
    pub const MOD3: Modifiers = Modifiers(1 << 5);
    pub const MOD4: Modifiers = Modifiers(1 << 6);
    pub const MOD5: Modifiers = Modifiers(1 << 7);
    pub const SUPER: Modifiers = Modifiers(1 << 26);
    pub const HYPER: Modifiers = Modifiers(1 << 27);
    pub const META: Modifiers = Modifiers(1 << 28);

    pub fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

/// Physical modifier key used to synthesize a modifier bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierKey {
    ShiftL,
    ControlL,
    AltL,
    SuperL,
    HyperL,
    MetaL,
}

/// Modifier bits in synthesis order. Bits without a key are tracked but
/// never injected.
const MODKEYS: [(Modifiers, Option<ModifierKey>, &str); 10] = [
    (Modifiers::SHIFT, Some(ModifierKey::ShiftL), "Shift"),
    (Modifiers::CONTROL, Some(ModifierKey::ControlL), "Ctrl"),
    (Modifiers::MOD1, Some(ModifierKey::AltL), "Alt"),
    (Modifiers::MOD2, None, "Mod2"),
    (Modifiers::MOD3, None, "Mod3"),
    (Modifiers::MOD4, None, "Mod4"),
    (Modifiers::MOD5, None, "Mod5"),
    (Modifiers::SUPER, Some(ModifierKey::SuperL), "Super"),
    (Modifiers::HYPER, Some(ModifierKey::HyperL), "Hyper"),
    (Modifiers::META, Some(ModifierKey::MetaL), "Meta"),
];

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = MODKEYS
            .iter()
            .filter(|(mask, _, _)| self.contains(*mask))
            .map(|(_, _, name)| *name)
            .collect();
        write!(f, "{}", names.join("+"))
    }
}

/// Bring the synthesized modifier keys in line with `new_state`, pressing or
/// releasing only the keys whose bit changed.
pub fn set_mod_state(session: &mut Session, grabber: &mut dyn Grabber, new_state: Modifiers) {
    for (mask, key, _) in MODKEYS {
        let was = session.mod_state.contains(mask);
        let now = new_state.contains(mask);
        if was != now {
            if let Some(key) = key {
                grabber.fake_modifier(key, now);
            }
        }
    }
    session.mod_state = new_state;
}

pub fn clear_mods(session: &mut Session, grabber: &mut dyn Grabber) {
    set_mod_state(session, grabber, Modifiers::NONE);
}

/// Display name for an X keysym; printable Latin-1 keysyms map to their
/// character.
pub fn keysym_label(keysym: u32) -> String {
    match keysym {
        0x20 => "space".to_string(),
        0x21..=0x7e => char::from_u32(keysym)
            .map(|c| c.to_string())
            .unwrap_or_default(),
        0xff08 => "BackSpace".to_string(),
        0xff09 => "Tab".to_string(),
        0xff0d => "Return".to_string(),
        0xff1b => "Escape".to_string(),
        0xff50 => "Home".to_string(),
        0xff51 => "Left".to_string(),
        0xff52 => "Up".to_string(),
        0xff53 => "Right".to_string(),
        0xff54 => "Down".to_string(),
        0xff55 => "Page_Up".to_string(),
        0xff56 => "Page_Down".to_string(),
        0xff57 => "End".to_string(),
        0xffff => "Delete".to_string(),
        0xffbe..=0xffc9 => format!("F{}", keysym - 0xffbe + 1),
        other => format!("0x{other:x}"),
    }
}

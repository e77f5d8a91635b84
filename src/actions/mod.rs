pub mod keys;
pub mod shell;

use crate::grabber::Grabber;
use crate::session::Session;
use keys::{keysym_label, set_mod_state, Modifiers};
use serde::{Deserialize, Serialize};

/// Effect bound to a learned gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Shell command line, run through `/bin/sh -c`.
    Command { cmd: String },
    /// Synthetic key press and release. `key` is the keysym shown to the
    /// user, `code` the keycode that gets injected.
    SendKey {
        key: u32,
        code: u32,
        #[serde(default)]
        mods: Modifiers,
        #[serde(default)]
        xtest: bool,
    },
    Scroll {
        #[serde(default)]
        mods: Modifiers,
    },
    Ignore {
        #[serde(default)]
        mods: Modifiers,
    },
    /// Replays `button` once the trigger button is released.
    Button {
        #[serde(default)]
        mods: Modifiers,
        button: u32,
    },
}

impl Action {
    pub fn command(cmd: impl Into<String>) -> Self {
        Action::Command { cmd: cmd.into() }
    }

    pub fn run(&self, session: &mut Session, grabber: &mut dyn Grabber) {
        match self {
            Action::Command { cmd } => {
                tracing::info!(cmd = %cmd, "running command");
                if let Err(err) = shell::spawn(cmd) {
                    tracing::error!(?err, "failed to run gesture command");
                }
            }
            Action::SendKey {
                code, mods, xtest, ..
            } => {
                if *xtest {
                    set_mod_state(session, grabber, *mods);
                    grabber.fake_key(*code, true);
                    grabber.fake_key(*code, false);
                    return;
                }
                match session.current {
                    Some(window) => grabber.send_key(window, *code, *mods, session.origin),
                    None => tracing::debug!("no current window; key not sent"),
                }
            }
            Action::Scroll { mods } => {
                set_mod_state(session, grabber, *mods);
                session.scroll = true;
            }
            Action::Ignore { mods } => {
                set_mod_state(session, grabber, *mods);
                session.ignore = true;
            }
            Action::Button { mods, button } => {
                set_mod_state(session, grabber, *mods);
                session.press_button = Some(*button);
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            Action::Command { cmd } => cmd.clone(),
            Action::SendKey { key, mods, .. } => with_mods(*mods, &keysym_label(*key)),
            Action::Scroll { mods } => with_mods(*mods, "Scroll"),
            Action::Ignore { mods } => with_mods(*mods, "Ignore"),
            Action::Button { mods, button } => with_mods(*mods, &format!("Button {button}")),
        }
    }
}

fn with_mods(mods: Modifiers, rest: &str) -> String {
    if mods.is_empty() {
        rest.to_string()
    } else {
        format!("{mods}+{rest}")
    }
}

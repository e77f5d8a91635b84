use crate::actions::keys::Modifiers;
use crate::gestures::db::{write_atomically, DEFAULT_ACCEPTANCE};
use crate::locking::Lock;
use crate::trace::TraceStyle;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const PREFERENCES_FILE: &str = "preferences.json";
pub const PREFERENCES_VERSION: u32 = 3;

pub const DEFAULT_BUTTON: u32 = 3;
pub const DEFAULT_RADIUS: i32 = 16;
pub const DEFAULT_SCROLL_STEP: i32 = 10;
pub const DEFAULT_SCROLL_RESET: i32 = 100;
/// Upper bound for every pixel distance read from the file.
pub const MAX_DISTANCE: i32 = 10_000;

/// Trigger button plus the modifiers that must accompany it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonInfo {
    pub button: u32,
    #[serde(default)]
    pub state: Modifiers,
}

impl Default for ButtonInfo {
    fn default() -> Self {
        Self {
            button: DEFAULT_BUTTON,
            state: Modifiers::NONE,
        }
    }
}

impl ButtonInfo {
    pub fn label(&self) -> String {
        if self.state.is_empty() {
            format!("Button {}", self.button)
        } else {
            format!("{}+Button {}", self.state, self.button)
        }
    }
}

/// On-disk form. Fields added after version 1 fall back to their defaults
/// when missing; fields dropped since (`help`, `delay`) are ignored.
#[derive(Debug, Serialize, Deserialize)]
struct PreferencesFile {
    #[serde(default)]
    schema_version: u32,
    #[serde(default)]
    exceptions: BTreeSet<String>,
    #[serde(default = "default_p")]
    p: f64,
    #[serde(default)]
    button: ButtonInfo,
    #[serde(default)]
    trace: TraceStyle,
    #[serde(default)]
    advanced_ignore: bool,
    #[serde(default = "default_radius")]
    radius: i32,
    #[serde(default = "default_scroll_step")]
    scroll_step: i32,
    #[serde(default = "default_scroll_reset")]
    scroll_reset: i32,
}

fn default_p() -> f64 {
    DEFAULT_ACCEPTANCE
}

fn default_radius() -> i32 {
    DEFAULT_RADIUS
}

fn default_scroll_step() -> i32 {
    DEFAULT_SCROLL_STEP
}

fn default_scroll_reset() -> i32 {
    DEFAULT_SCROLL_RESET
}

impl Default for PreferencesFile {
    fn default() -> Self {
        Self {
            schema_version: PREFERENCES_VERSION,
            exceptions: BTreeSet::new(),
            p: DEFAULT_ACCEPTANCE,
            button: ButtonInfo::default(),
            trace: TraceStyle::default(),
            advanced_ignore: false,
            radius: DEFAULT_RADIUS,
            scroll_step: DEFAULT_SCROLL_STEP,
            scroll_reset: DEFAULT_SCROLL_RESET,
        }
    }
}

/// Preference set shared by the UI and the dispatch loop. Every field is
/// guarded on its own so readers never hold more than the one they need.
#[derive(Debug)]
pub struct Preferences {
    path: PathBuf,
    /// Window classes where the trigger button is not grabbed.
    pub exceptions: Lock<BTreeSet<String>>,
    /// Acceptance threshold for a gesture match.
    pub p: Lock<f64>,
    pub button: Lock<ButtonInfo>,
    pub trace: Lock<TraceStyle>,
    /// Discard the stroke when another button ends the gesture.
    pub advanced_ignore: Lock<bool>,
    /// Pointer travel in pixels before a press counts as a gesture.
    pub radius: Lock<i32>,
    /// Vertical travel in pixels per synthesized wheel click.
    pub scroll_step: Lock<i32>,
    /// Vertical jump in pixels that re-bases scrolling without a click.
    pub scroll_reset: Lock<i32>,
}

impl Preferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let prefs = Self {
            path: path.into(),
            exceptions: Lock::default(),
            p: Lock::default(),
            button: Lock::default(),
            trace: Lock::default(),
            advanced_ignore: Lock::default(),
            radius: Lock::default(),
            scroll_step: Lock::default(),
            scroll_reset: Lock::default(),
        };
        prefs.apply(PreferencesFile::default());
        prefs
    }

    pub fn in_dir(config_dir: &Path) -> Self {
        Self::new(config_dir.join(PREFERENCES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file, falling back to defaults for anything it lacks.
    ///
    /// A missing or blank file leaves every field at its default. A corrupt
    /// file or one written by a newer version resets to defaults and
    /// returns the error.
    pub fn read(&self) -> anyhow::Result<()> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.apply(PreferencesFile::default());
                return Ok(());
            }
            Err(err) => {
                self.apply(PreferencesFile::default());
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        if content.trim().is_empty() {
            self.apply(PreferencesFile::default());
            return Ok(());
        }
        let file = match serde_json::from_str::<PreferencesFile>(&content) {
            Ok(file) => file,
            Err(err) => {
                self.apply(PreferencesFile::default());
                return Err(err)
                    .with_context(|| format!("failed to parse {}", self.path.display()));
            }
        };
        if file.schema_version > PREFERENCES_VERSION {
            self.apply(PreferencesFile::default());
            return Err(anyhow::anyhow!(
                "Unsupported preferences schema version {}",
                file.schema_version
            ));
        }
        self.apply(file);
        Ok(())
    }

    pub fn write(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        write_atomically(&self.path, json.as_bytes())
    }

    fn snapshot(&self) -> PreferencesFile {
        PreferencesFile {
            schema_version: PREFERENCES_VERSION,
            exceptions: self.exceptions.get(),
            p: self.p.get(),
            button: self.button.get(),
            trace: self.trace.get(),
            advanced_ignore: self.advanced_ignore.get(),
            radius: self.radius.get(),
            scroll_step: self.scroll_step.get(),
            scroll_reset: self.scroll_reset.get(),
        }
    }

    fn apply(&self, file: PreferencesFile) {
        self.exceptions.set(file.exceptions);
        self.p.set(file.p);
        self.button.set(file.button);
        self.trace.set(file.trace);
        self.advanced_ignore.set(file.advanced_ignore);
        self.radius.set(file.radius.clamp(0, MAX_DISTANCE));
        self.scroll_step.set(file.scroll_step.clamp(1, MAX_DISTANCE));
        self.scroll_reset.set(file.scroll_reset.clamp(0, MAX_DISTANCE));
    }
}

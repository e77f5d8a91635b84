use crate::actions::keys::Modifiers;
use crate::gestures::engine::Point;

pub type WindowId = u64;

/// Mutable state of one daemon run, shared by the dispatch loop, the
/// handlers and the actions they execute.
#[derive(Debug, Default)]
pub struct Session {
    /// Window under the pointer, as last reported by an enter event.
    pub current: Option<WindowId>,
    /// Set by an `Ignore` action; the next click is swallowed.
    pub ignore: bool,
    /// Set by a `Scroll` action; the stroke handler enters scroll mode.
    pub scroll: bool,
    /// Button a `Button` action wants replayed after the trigger release.
    pub press_button: Option<u32>,
    /// Modifier keys currently held down by synthetic events.
    pub mod_state: Modifiers,
    /// Whether the trigger button is down according to the extended input
    /// stream.
    pub xinput_pressed: bool,
    /// Where the current gesture started.
    pub origin: Point,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }
}

//! Boundary to the windowing system: device grabs, synthetic input and the
//! stream of display events feeding the dispatch loop.

use crate::actions::keys::{ModifierKey, Modifiers};
use crate::gestures::engine::Point;
use crate::locking::Lock;
use crate::service::LoopEvent;
use crate::session::WindowId;
use anyhow::anyhow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Wheel buttons synthesized in scroll mode.
pub const WHEEL_UP: u32 = 4;
pub const WHEEL_DOWN: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabScope {
    /// Every button on every device.
    All,
    /// Pointer motion only.
    Pointer,
    /// The configured trigger button.
    Button,
    /// The extended-input device that started the gesture.
    Device,
    /// Every extended-input device.
    AllDevices,
}

/// Event delivered by the display connection.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    Motion {
        x: i32,
        y: i32,
        time: u64,
    },
    ButtonPress {
        button: u32,
        x: i32,
        y: i32,
        time: u64,
    },
    ButtonRelease {
        button: u32,
        x: i32,
        y: i32,
        time: u64,
    },
    /// Extended-input device event; `code` is classified with
    /// [`Grabber::is_button_down`], [`Grabber::is_button_up`] and
    /// [`Grabber::is_motion`]. `button` is 0 for motion.
    Extended {
        code: i32,
        button: u32,
        x: i32,
        y: i32,
        time: u64,
    },
    Enter {
        window: WindowId,
        /// Crossing caused by a grab.
        grab: bool,
        /// Pointer came from an inferior window.
        inferior: bool,
    },
    Create {
        window: WindowId,
    },
    ScreenChange,
    /// A protocol request was rejected by the server.
    ProtocolError {
        request_code: u8,
        description: String,
    },
}

pub trait Grabber: Send {
    /// Open the display connection and start forwarding [`DisplayEvent`]s
    /// into `events`.
    fn connect(&mut self, events: Sender<LoopEvent>) -> anyhow::Result<()>;
    fn disconnect(&mut self) -> anyhow::Result<()>;
    fn is_connected(&self) -> bool;

    fn grab(&mut self, scope: GrabScope);
    /// Let the next click of `button` reach the application untouched.
    fn ignore(&mut self, button: u32);
    /// Temporarily release the current grab.
    fn suspend(&mut self);
    /// Reacquire the grab released by [`Grabber::suspend`].
    fn resume(&mut self);
    /// Drop every grab and grab again with the current trigger button.
    fn regrab(&mut self);
    /// The pointer moved into `window`.
    fn update(&mut self, window: Option<WindowId>);
    fn create(&mut self, window: WindowId);

    /// Replay a full click of `button` to the window under the pointer.
    fn fake_button(&mut self, button: u32);
    fn fake_button_event(&mut self, button: u32, press: bool);
    fn fake_key(&mut self, code: u32, press: bool);
    fn fake_modifier(&mut self, key: ModifierKey, press: bool);
    /// Deliver a key press and release directly to `window`.
    fn send_key(&mut self, window: WindowId, code: u32, mods: Modifiers, at: Point);
    fn set_input_focus(&mut self, window: WindowId, time: u64);

    fn trigger_button(&self) -> u32;
    /// Takes effect on the next [`Grabber::regrab`].
    fn set_trigger_button(&mut self, button: u32);
    fn has_extended_input(&self) -> bool;
    fn is_button_down(&self, code: i32) -> bool;
    fn is_button_up(&self, code: i32) -> bool;
    fn is_motion(&self, code: i32) -> bool;
}

/// Backend used when no display integration is compiled in; connecting
/// always fails.
#[derive(Debug, Default)]
pub struct DefaultGrabber {
    trigger: u32,
}

impl DefaultGrabber {
    pub fn new(trigger: u32) -> Self {
        Self { trigger }
    }
}

impl Grabber for DefaultGrabber {
    fn connect(&mut self, _events: Sender<LoopEvent>) -> anyhow::Result<()> {
        Err(anyhow!("no display backend is available in this build"))
    }

    fn disconnect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn grab(&mut self, _scope: GrabScope) {}
    fn ignore(&mut self, _button: u32) {}
    fn suspend(&mut self) {}
    fn resume(&mut self) {}
    fn regrab(&mut self) {}
    fn update(&mut self, _window: Option<WindowId>) {}
    fn create(&mut self, _window: WindowId) {}
    fn fake_button(&mut self, _button: u32) {}
    fn fake_button_event(&mut self, _button: u32, _press: bool) {}
    fn fake_key(&mut self, _code: u32, _press: bool) {}
    fn fake_modifier(&mut self, _key: ModifierKey, _press: bool) {}
    fn send_key(&mut self, _window: WindowId, _code: u32, _mods: Modifiers, _at: Point) {}
    fn set_input_focus(&mut self, _window: WindowId, _time: u64) {}

    fn trigger_button(&self) -> u32 {
        self.trigger
    }

    fn set_trigger_button(&mut self, button: u32) {
        self.trigger = button;
    }

    fn has_extended_input(&self) -> bool {
        false
    }

    fn is_button_down(&self, _code: i32) -> bool {
        false
    }

    fn is_button_up(&self, _code: i32) -> bool {
        false
    }

    fn is_motion(&self, _code: i32) -> bool {
        false
    }
}

/// Request recorded by [`MockGrabber`].
#[derive(Debug, Clone, PartialEq)]
pub enum GrabCall {
    Grab(GrabScope),
    Ignore(u32),
    Suspend,
    Resume,
    Regrab,
    Update(Option<WindowId>),
    Create(WindowId),
    FakeButton(u32),
    ButtonEvent { button: u32, press: bool },
    Key { code: u32, press: bool },
    Modifier { key: ModifierKey, press: bool },
    SendKey { window: WindowId, code: u32, mods: Modifiers },
    Focus { window: WindowId, time: u64 },
}

/// Extended-input event codes understood by [`MockGrabber`].
pub const MOCK_XI_BUTTON_DOWN: i32 = 100;
pub const MOCK_XI_BUTTON_UP: i32 = 101;
pub const MOCK_XI_MOTION: i32 = 102;

#[derive(Default)]
struct MockGrabberState {
    connect_count: AtomicUsize,
    disconnect_count: AtomicUsize,
    sender: Lock<Option<Sender<LoopEvent>>>,
    calls: Lock<Vec<GrabCall>>,
}

/// In-memory grabber that records every request.
#[derive(Clone)]
pub struct MockGrabber {
    state: Arc<MockGrabberState>,
    trigger: u32,
    xinput: bool,
}

impl MockGrabber {
    pub fn new(trigger: u32) -> (Self, MockGrabberHandle) {
        let state = Arc::new(MockGrabberState::default());
        (
            Self {
                state: Arc::clone(&state),
                trigger,
                xinput: true,
            },
            MockGrabberHandle { state },
        )
    }

    /// Pretend the server lacks the extended input extension.
    pub fn without_extended_input(mut self) -> Self {
        self.xinput = false;
        self
    }

    fn record(&self, call: GrabCall) {
        self.state.calls.lock().push(call);
    }
}

impl Grabber for MockGrabber {
    fn connect(&mut self, events: Sender<LoopEvent>) -> anyhow::Result<()> {
        let mut sender = self.state.sender.lock();
        if sender.is_none() {
            self.state.connect_count.fetch_add(1, Ordering::SeqCst);
            *sender = Some(events);
        }
        Ok(())
    }

    fn disconnect(&mut self) -> anyhow::Result<()> {
        let mut sender = self.state.sender.lock();
        if sender.is_some() {
            self.state.disconnect_count.fetch_add(1, Ordering::SeqCst);
        }
        *sender = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.sender.lock().is_some()
    }

    fn grab(&mut self, scope: GrabScope) {
        self.record(GrabCall::Grab(scope));
    }

    fn ignore(&mut self, button: u32) {
        self.record(GrabCall::Ignore(button));
    }

    fn suspend(&mut self) {
        self.record(GrabCall::Suspend);
    }

    fn resume(&mut self) {
        self.record(GrabCall::Resume);
    }

    fn regrab(&mut self) {
        self.record(GrabCall::Regrab);
    }

    fn update(&mut self, window: Option<WindowId>) {
        self.record(GrabCall::Update(window));
    }

    fn create(&mut self, window: WindowId) {
        self.record(GrabCall::Create(window));
    }

    fn fake_button(&mut self, button: u32) {
        self.record(GrabCall::FakeButton(button));
    }

    fn fake_button_event(&mut self, button: u32, press: bool) {
        self.record(GrabCall::ButtonEvent { button, press });
    }

    fn fake_key(&mut self, code: u32, press: bool) {
        self.record(GrabCall::Key { code, press });
    }

    fn fake_modifier(&mut self, key: ModifierKey, press: bool) {
        self.record(GrabCall::Modifier { key, press });
    }

    fn send_key(&mut self, window: WindowId, code: u32, mods: Modifiers, _at: Point) {
        self.record(GrabCall::SendKey { window, code, mods });
    }

    fn set_input_focus(&mut self, window: WindowId, time: u64) {
        self.record(GrabCall::Focus { window, time });
    }

    fn trigger_button(&self) -> u32 {
        self.trigger
    }

    fn set_trigger_button(&mut self, button: u32) {
        self.trigger = button;
    }

    fn has_extended_input(&self) -> bool {
        self.xinput
    }

    fn is_button_down(&self, code: i32) -> bool {
        code == MOCK_XI_BUTTON_DOWN
    }

    fn is_button_up(&self, code: i32) -> bool {
        code == MOCK_XI_BUTTON_UP
    }

    fn is_motion(&self, code: i32) -> bool {
        code == MOCK_XI_MOTION
    }
}

pub struct MockGrabberHandle {
    state: Arc<MockGrabberState>,
}

impl MockGrabberHandle {
    pub fn connect_count(&self) -> usize {
        self.state.connect_count.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.disconnect_count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<GrabCall> {
        self.state.calls.get()
    }

    /// Return and forget the calls recorded so far.
    pub fn take_calls(&self) -> Vec<GrabCall> {
        std::mem::take(&mut *self.state.calls.lock())
    }

    /// Push a display event as if it came from the server.
    pub fn emit(&self, event: DisplayEvent) -> bool {
        self.state
            .sender
            .lock()
            .as_ref()
            .map(|sender| sender.send(LoopEvent::Display(event)).is_ok())
            .unwrap_or(false)
    }
}

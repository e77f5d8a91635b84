//! Input handlers and the stack that owns them.
//!
//! The stack is innermost-last: the last handler receives every event and
//! the ones below it are suspended. A handler reacts by returning a
//! [`Transition`] that replaces the child of itself or of one of its
//! ancestors. Removed handlers get [`Handler::exit`]; a parent whose child
//! was popped gets [`Handler::resume`], which reacquires its grab.

use crate::actions::keys;
use crate::gestures::db::GestureDb;
use crate::gestures::engine::{Point, PreStroke, Stroke};
use crate::grabber::{GrabScope, Grabber, WHEEL_DOWN, WHEEL_UP};
use crate::locking::Lock;
use crate::service::StrokeObserver;
use crate::session::Session;
use crate::settings::Preferences;
use crate::trace::Trace;
use std::sync::Arc;

/// Everything a handler may touch while processing one event.
pub struct HandlerCtx<'a> {
    pub grabber: &'a mut dyn Grabber,
    pub session: &'a mut Session,
    pub prefs: &'a Preferences,
    pub db: &'a Lock<GestureDb>,
    pub trace: &'a mut dyn Trace,
    pub observer: &'a dyn StrokeObserver,
}

impl HandlerCtx<'_> {
    fn trigger(&self) -> u32 {
        self.grabber.trigger_button()
    }

    /// Match a finished stroke and run the winning action. When nothing
    /// matches, the trigger click is replayed so it is not lost.
    pub fn handle_stroke(&mut self, stroke: Arc<Stroke>, button: u32) {
        let stroke = if stroke.button() == button {
            stroke
        } else {
            Arc::new(stroke.with_button(button))
        };
        tracing::trace!(button, points = ?stroke.points(), "stroke finished");
        if self.observer.capture(&stroke) {
            return;
        }

        let threshold = self.prefs.p.get();
        let ranking = {
            let mut db = self.db.lock();
            db.set_threshold(threshold);
            db.handle(stroke)
        };
        match &ranking.action {
            Some(action) if ranking.is_match() => action.run(self.session, self.grabber),
            _ => {
                let trigger = self.trigger();
                self.grabber.fake_button(trigger);
            }
        }
        self.observer.ranked(&ranking);
    }

    pub fn clear_mods(&mut self) {
        keys::clear_mods(self.session, self.grabber);
    }

    fn release_button(&mut self, button: u32) {
        self.grabber.fake_button_event(button, false);
    }

    fn press_button(&mut self, button: u32) {
        self.grabber.fake_button_event(button, true);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Stay,
    /// Replace the child of the handler `up` levels above the one that
    /// returned this. `with: None` pops.
    ReplaceChild { up: usize, with: Option<Handler> },
}

impl Transition {
    pub fn push(handler: Handler) -> Self {
        Transition::ReplaceChild {
            up: 0,
            with: Some(handler),
        }
    }

    pub fn replace(handler: Handler) -> Self {
        Transition::ReplaceChild {
            up: 1,
            with: Some(handler),
        }
    }

    pub fn pop() -> Self {
        Transition::ReplaceChild { up: 1, with: None }
    }

    /// Remove this handler and its parent.
    pub fn pop_parent() -> Self {
        Transition::ReplaceChild { up: 2, with: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Handler {
    /// Waits for the trigger button.
    Idle,
    /// Records the pointer path while the trigger is held.
    Stroke(StrokeHandler),
    /// Runs the gesture's action for every further button press.
    Action(ActionHandler),
    /// Like `Action`, fed only by the extended input stream.
    ActionXi(ActionXiHandler),
    /// Turns vertical motion into wheel clicks.
    Scroll(ScrollHandler),
    /// Swallows the next click.
    Ignore,
    /// Pops on the next press of `button`.
    WaitForClick { button: u32 },
}

impl Handler {
    pub fn name(&self) -> &'static str {
        match self {
            Handler::Idle => "Idle",
            Handler::Stroke(_) => "Stroke",
            Handler::Action(_) => "Action",
            Handler::ActionXi(_) => "ActionXi",
            Handler::Scroll(_) => "Scroll",
            Handler::Ignore => "Ignore",
            Handler::WaitForClick { .. } => "WaitForClick",
        }
    }

    /// Only events from the extended input stream reach this handler.
    pub fn only_xi(&self) -> bool {
        matches!(self, Handler::ActionXi(_))
    }

    fn init(&mut self, ctx: &mut HandlerCtx) -> Transition {
        match self {
            Handler::Action(h) => h.init(ctx),
            Handler::ActionXi(h) => h.init(ctx),
            Handler::Scroll(h) => h.init(ctx),
            _ => {
                self.resume(ctx);
                Transition::Stay
            }
        }
    }

    fn resume(&mut self, ctx: &mut HandlerCtx) {
        match self {
            Handler::Idle | Handler::Action(_) => ctx.grabber.grab(GrabScope::Button),
            Handler::ActionXi(h) => h.resume(ctx),
            Handler::Ignore => ctx.grabber.grab(GrabScope::All),
            Handler::Stroke(_) | Handler::Scroll(_) | Handler::WaitForClick { .. } => {}
        }
    }

    fn press(&mut self, ctx: &mut HandlerCtx, button: u32, x: i32, y: i32, time: u64) -> Transition {
        match self {
            Handler::Idle => {
                if button != ctx.trigger() {
                    return Transition::Stay;
                }
                if let Some(window) = ctx.session.current {
                    ctx.grabber.set_input_focus(window, time);
                }
                Transition::push(Handler::Stroke(StrokeHandler::new(x, y, time)))
            }
            Handler::Stroke(h) => h.press(ctx, button),
            Handler::Action(h) => {
                h.button = button;
                h.do_press(ctx)
            }
            Handler::ActionXi(h) => h.press(ctx, button),
            Handler::Scroll(h) => {
                if button != WHEEL_UP && button != WHEEL_DOWN && h.pressed.is_none() {
                    h.pressed = Some(button);
                }
                Transition::Stay
            }
            Handler::Ignore => {
                ctx.grabber.ignore(button);
                Transition::pop()
            }
            Handler::WaitForClick { button: expected } => {
                if button == *expected {
                    Transition::pop()
                } else {
                    Transition::Stay
                }
            }
        }
    }

    fn release(&mut self, ctx: &mut HandlerCtx, button: u32) -> Transition {
        match self {
            Handler::Stroke(h) => h.release(ctx),
            Handler::Action(_) => {
                if button != ctx.trigger() {
                    return Transition::Stay;
                }
                ctx.clear_mods();
                Transition::pop()
            }
            Handler::ActionXi(h) => h.release(ctx, button),
            Handler::Scroll(h) => h.release(ctx, button),
            Handler::Idle | Handler::Ignore | Handler::WaitForClick { .. } => Transition::Stay,
        }
    }

    fn motion(&mut self, ctx: &mut HandlerCtx, x: i32, y: i32, time: u64) -> Transition {
        match self {
            Handler::Stroke(h) => {
                h.motion(ctx, x, y, time);
                Transition::Stay
            }
            Handler::Scroll(h) => h.motion(ctx, y),
            _ => Transition::Stay,
        }
    }

    /// Leave no synthesized modifier or emulated button held.
    fn exit(&mut self, ctx: &mut HandlerCtx) {
        match self {
            Handler::ActionXi(h) => h.exit(ctx),
            Handler::Action(_) | Handler::Scroll(_) | Handler::Ignore => ctx.clear_mods(),
            Handler::Idle | Handler::Stroke(_) | Handler::WaitForClick { .. } => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeHandler {
    cur: PreStroke,
    is_gesture: bool,
    orig_x: i32,
    orig_y: i32,
}

impl StrokeHandler {
    pub fn new(x: i32, y: i32, time: u64) -> Self {
        let mut cur = PreStroke::new();
        cur.add(f64::from(x), f64::from(y), time);
        Self {
            cur,
            is_gesture: false,
            orig_x: x,
            orig_y: y,
        }
    }

    fn finish(&mut self, ctx: &mut HandlerCtx, button: u32, discard: bool) -> Arc<Stroke> {
        ctx.trace.end();
        if !self.is_gesture || discard {
            self.cur.clear();
        }
        Arc::new(Stroke::new(&self.cur, button))
    }

    fn motion(&mut self, ctx: &mut HandlerCtx, x: i32, y: i32, time: u64) {
        self.cur.add(f64::from(x), f64::from(y), time);
        if !self.is_gesture {
            let radius = i64::from(ctx.prefs.radius.get());
            let dx = i64::from(x) - i64::from(self.orig_x);
            let dy = i64::from(y) - i64::from(self.orig_y);
            if dx * dx + dy * dy > radius * radius {
                self.is_gesture = true;
                let origin = Point::new(f64::from(self.orig_x), f64::from(self.orig_y), 0);
                ctx.session.origin = origin;
                ctx.trace.start(origin);
            }
        }
        if self.is_gesture {
            ctx.trace.draw(Point::new(f64::from(x), f64::from(y), time));
        }
    }

    /// Another button went down while the trigger is held.
    fn press(&mut self, ctx: &mut HandlerCtx, button: u32) -> Transition {
        if button == ctx.trigger() {
            return Transition::Stay;
        }
        let discard = ctx.prefs.advanced_ignore.get();
        let stroke = self.finish(ctx, button, discard);

        if ctx.observer.wants_stroke() {
            ctx.handle_stroke(stroke, button);
            return Transition::pop();
        }

        if ctx.session.xinput_pressed {
            Transition::replace(Handler::ActionXi(ActionXiHandler::new(ctx, stroke, button)))
        } else {
            tracing::warn!("extended input is not reporting the trigger button");
            Transition::replace(Handler::Action(ActionHandler::new(stroke, button)))
        }
    }

    fn release(&mut self, ctx: &mut HandlerCtx) -> Transition {
        let stroke = self.finish(ctx, 0, false);
        ctx.handle_stroke(stroke, 0);

        if ctx.session.ignore {
            ctx.session.ignore = false;
            return Transition::replace(Handler::Ignore);
        }
        if ctx.session.scroll {
            ctx.session.scroll = false;
            return Transition::replace(Handler::Scroll(ScrollHandler::new()));
        }
        if let Some(button) = ctx.session.press_button.take() {
            ctx.grabber.fake_button(button);
        }
        ctx.clear_mods();
        Transition::pop()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionHandler {
    stroke: Arc<Stroke>,
    button: u32,
}

impl ActionHandler {
    pub fn new(stroke: Arc<Stroke>, button: u32) -> Self {
        Self { stroke, button }
    }

    fn init(&mut self, ctx: &mut HandlerCtx) -> Transition {
        ctx.grabber.grab(GrabScope::Button);
        self.do_press(ctx)
    }

    fn do_press(&mut self, ctx: &mut HandlerCtx) -> Transition {
        ctx.handle_stroke(Arc::clone(&self.stroke), self.button);
        ctx.session.ignore = false;
        if ctx.session.scroll {
            ctx.session.scroll = false;
            let trigger = ctx.trigger();
            return Transition::push(Handler::Scroll(ScrollHandler::with_buttons(
                self.button,
                trigger,
            )));
        }
        let Some(press_button) = ctx.session.press_button.take() else {
            return Transition::Stay;
        };
        let trigger = ctx.trigger();
        ctx.release_button(self.button);
        ctx.release_button(trigger);
        ctx.grabber.fake_button(press_button);
        ctx.clear_mods();
        Transition::pop()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionXiHandler {
    stroke: Arc<Stroke>,
    button: u32,
    /// Button held down on behalf of a `Button` action.
    emulated: Option<u32>,
}

impl ActionXiHandler {
    /// Both physical buttons are released towards the applications before
    /// the action takes over.
    pub fn new(ctx: &mut HandlerCtx, stroke: Arc<Stroke>, button: u32) -> Self {
        let trigger = ctx.trigger();
        ctx.release_button(button);
        ctx.release_button(trigger);
        Self {
            stroke,
            button,
            emulated: None,
        }
    }

    fn init(&mut self, ctx: &mut HandlerCtx) -> Transition {
        let button = self.button;
        self.run_action(ctx, button)
    }

    fn press(&mut self, ctx: &mut HandlerCtx, button: u32) -> Transition {
        ctx.release_button(button);
        self.run_action(ctx, button)
    }

    fn run_action(&mut self, ctx: &mut HandlerCtx, button: u32) -> Transition {
        ctx.handle_stroke(Arc::clone(&self.stroke), button);
        ctx.session.ignore = false;
        if ctx.session.scroll {
            ctx.session.scroll = false;
            ctx.grabber.grab(GrabScope::Device);
            self.button = button;
            let trigger = ctx.trigger();
            return Transition::push(Handler::Scroll(ScrollHandler::with_buttons(
                button, trigger,
            )));
        }
        let Some(press_button) = ctx.session.press_button.take() else {
            ctx.grabber.grab(GrabScope::AllDevices);
            return Transition::Stay;
        };
        self.release_emulated(ctx);
        ctx.grabber.grab(GrabScope::Device);
        ctx.press_button(press_button);
        ctx.grabber.grab(GrabScope::AllDevices);
        self.emulated = Some(press_button);
        Transition::Stay
    }

    fn resume(&mut self, ctx: &mut HandlerCtx) {
        let trigger = ctx.trigger();
        ctx.release_button(self.button);
        ctx.release_button(trigger);
        ctx.grabber.grab(GrabScope::AllDevices);
    }

    fn release(&mut self, ctx: &mut HandlerCtx, button: u32) -> Transition {
        self.release_emulated(ctx);
        if button == ctx.trigger() {
            Transition::pop()
        } else {
            Transition::Stay
        }
    }

    fn release_emulated(&mut self, ctx: &mut HandlerCtx) {
        if let Some(button) = self.emulated.take() {
            ctx.release_button(button);
        }
    }

    fn exit(&mut self, ctx: &mut HandlerCtx) {
        self.release_emulated(ctx);
        ctx.clear_mods();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollHandler {
    /// Vertical position of the last synthesized click.
    lasty: Option<i32>,
    pressed: Option<u32>,
    /// Trigger button when scrolling was started by a button chord.
    pressed2: Option<u32>,
}

impl ScrollHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scrolling entered while `button` and `trigger` are both held.
    pub fn with_buttons(button: u32, trigger: u32) -> Self {
        Self {
            lasty: None,
            pressed: Some(button),
            pressed2: Some(trigger),
        }
    }

    fn init(&mut self, ctx: &mut HandlerCtx) -> Transition {
        let chord = self.pressed2.is_some();
        if chord {
            self.release_held(ctx);
        }
        ctx.grabber.grab(GrabScope::Pointer);
        if chord {
            return self.press_held(ctx);
        }
        Transition::Stay
    }

    fn motion(&mut self, ctx: &mut HandlerCtx, y: i32) -> Transition {
        let Some(mut lasty) = self.lasty else {
            self.lasty = Some(y);
            return Transition::Stay;
        };
        let step = ctx.prefs.scroll_step.get();
        let reset = ctx.prefs.scroll_reset.get();

        let mut wheel = None;
        if y > lasty.saturating_add(reset) {
            lasty = y;
        }
        if y > lasty.saturating_add(step) {
            wheel = Some(WHEEL_DOWN);
        }
        if y < lasty.saturating_sub(reset) {
            lasty = y;
        }
        if y < lasty.saturating_sub(step) {
            wheel = Some(WHEEL_UP);
        }
        self.lasty = Some(lasty);

        let Some(wheel) = wheel else {
            return Transition::Stay;
        };
        self.lasty = Some(y);
        self.release_held(ctx);
        ctx.grabber.suspend();
        ctx.press_button(wheel);
        ctx.release_button(wheel);
        ctx.grabber.resume();
        self.press_held(ctx)
    }

    fn release(&mut self, ctx: &mut HandlerCtx, button: u32) -> Transition {
        if Some(button) != self.pressed && Some(button) != self.pressed2 {
            return Transition::Stay;
        }
        let Some(trigger) = self.pressed2 else {
            ctx.clear_mods();
            return Transition::pop();
        };
        self.release_held(ctx);
        if Some(button) == self.pressed {
            // The trigger is still down; hand it back to the action.
            ctx.press_button(trigger);
            Transition::replace(Handler::WaitForClick { button: trigger })
        } else {
            Transition::pop_parent()
        }
    }

    fn release_held(&mut self, ctx: &mut HandlerCtx) {
        if let Some(button) = self.pressed {
            ctx.release_button(button);
        }
        if let Some(button) = self.pressed2 {
            ctx.release_button(button);
        }
    }

    /// Press the held buttons again and wait for the replayed click of the
    /// scroll button to come back.
    fn press_held(&mut self, ctx: &mut HandlerCtx) -> Transition {
        if let Some(button) = self.pressed2 {
            ctx.press_button(button);
        }
        match self.pressed {
            Some(button) => {
                ctx.press_button(button);
                Transition::push(Handler::WaitForClick { button })
            }
            None => Transition::Stay,
        }
    }
}

/// Owning stack of handlers, innermost last. The root is always `Idle`.
#[derive(Debug)]
pub struct HandlerStack {
    handlers: Vec<Handler>,
}

impl Default for HandlerStack {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerStack {
    pub fn new() -> Self {
        Self {
            handlers: vec![Handler::Idle],
        }
    }

    pub fn init(&mut self, ctx: &mut HandlerCtx) {
        let transition = self.handlers[0].init(ctx);
        self.apply(ctx, 0, transition);
    }

    pub fn press(&mut self, ctx: &mut HandlerCtx, button: u32, x: i32, y: i32, time: u64) {
        let index = self.top_index();
        let transition = self.handlers[index].press(ctx, button, x, y, time);
        self.apply(ctx, index, transition);
    }

    pub fn release(&mut self, ctx: &mut HandlerCtx, button: u32, _x: i32, _y: i32) {
        let index = self.top_index();
        let transition = self.handlers[index].release(ctx, button);
        self.apply(ctx, index, transition);
    }

    pub fn motion(&mut self, ctx: &mut HandlerCtx, x: i32, y: i32, time: u64) {
        let index = self.top_index();
        let transition = self.handlers[index].motion(ctx, x, y, time);
        self.apply(ctx, index, transition);
    }

    pub fn top(&self) -> &Handler {
        &self.handlers[self.top_index()]
    }

    pub fn depth(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_idle(&self) -> bool {
        self.handlers.len() == 1
    }

    pub fn only_xi(&self) -> bool {
        self.top().only_xi()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(Handler::name).collect()
    }

    /// Drop every handler above the root and grab again as `Idle`.
    pub fn reset(&mut self, ctx: &mut HandlerCtx) {
        self.truncate(ctx, 1);
        self.log_stack();
        self.handlers[0].resume(ctx);
    }

    fn top_index(&self) -> usize {
        self.handlers.len().saturating_sub(1)
    }

    fn apply(&mut self, ctx: &mut HandlerCtx, mut index: usize, mut transition: Transition) {
        while let Transition::ReplaceChild { up, with } = transition {
            let Some(parent) = index.checked_sub(up) else {
                tracing::warn!(index, up, "transition reaches above the root handler");
                return;
            };
            let had_child = self.handlers.len() > parent + 1;
            self.truncate(ctx, parent + 1);

            let Some(child) = with else {
                self.log_stack();
                if had_child {
                    self.handlers[parent].resume(ctx);
                } else {
                    tracing::warn!(handler = self.handlers[parent].name(), "no child handler to remove");
                }
                return;
            };
            self.handlers.push(child);
            self.log_stack();
            index = parent + 1;
            transition = self.handlers[index].init(ctx);
        }
    }

    fn truncate(&mut self, ctx: &mut HandlerCtx, len: usize) {
        while self.handlers.len() > len {
            if let Some(mut handler) = self.handlers.pop() {
                handler.exit(ctx);
            }
        }
    }

    fn log_stack(&self) {
        tracing::debug!(stack = %self.names().join(" "), "new event handling stack");
    }
}

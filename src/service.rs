use crate::gestures::db::{Ranking, SharedGestureDb};
use crate::gestures::engine::Stroke;
use crate::grabber::{DisplayEvent, Grabber};
use crate::handlers::{HandlerCtx, HandlerStack};
use crate::session::Session;
use crate::settings::Preferences;
use crate::trace::{Trace, TraceFactory};
use anyhow::anyhow;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Requests the UI side sends to the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Quit = 1,
    Regrab = 2,
    SuspendGrab = 3,
    RestoreGrab = 4,
    UpdateCurrent = 5,
    UpdateTrace = 6,
}

impl Command {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Command::Quit),
            2 => Some(Command::Regrab),
            3 => Some(Command::SuspendGrab),
            4 => Some(Command::RestoreGrab),
            5 => Some(Command::UpdateCurrent),
            6 => Some(Command::UpdateTrace),
            _ => None,
        }
    }
}

/// Everything the dispatch loop waits on.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    Display(DisplayEvent),
    Command(Command),
}

/// Cloneable handle for sending [`Command`]s to a running loop.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<LoopEvent>,
}

impl CommandSender {
    pub fn new(tx: Sender<LoopEvent>) -> Self {
        Self { tx }
    }

    /// Returns `false` once the loop has gone away.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(LoopEvent::Command(command)).is_ok()
    }

    pub fn send_byte(&self, byte: u8) -> bool {
        match Command::from_byte(byte) {
            Some(command) => self.send(command),
            None => {
                tracing::warn!(byte, "ignoring unknown command code");
                false
            }
        }
    }
}

/// Hooks for whoever wants to see finished strokes, such as a gesture
/// editor.
pub trait StrokeObserver: Send + Sync {
    /// The next stroke should be consumed instead of matched.
    fn wants_stroke(&self) -> bool {
        false
    }

    /// Offered every finished stroke before matching; returning `true`
    /// consumes it.
    fn capture(&self, _stroke: &Arc<Stroke>) -> bool {
        false
    }

    /// Result of every match attempt.
    fn ranked(&self, _ranking: &Ranking) {}
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl StrokeObserver for NoopObserver {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Motion,
    Press,
    Release,
}

/// Single-threaded event pump feeding the handler stack.
pub struct Dispatcher {
    grabber: Box<dyn Grabber>,
    session: Session,
    stack: HandlerStack,
    prefs: Arc<Preferences>,
    db: SharedGestureDb,
    trace_factory: Arc<dyn TraceFactory>,
    trace: Box<dyn Trace>,
    observer: Arc<dyn StrokeObserver>,
    alive: bool,
    last: Option<(EventKind, u64)>,
}

impl Dispatcher {
    pub fn new(
        grabber: Box<dyn Grabber>,
        prefs: Arc<Preferences>,
        db: SharedGestureDb,
        trace_factory: Arc<dyn TraceFactory>,
        observer: Arc<dyn StrokeObserver>,
    ) -> Self {
        let trace = trace_factory.create(prefs.trace.get());
        Self {
            grabber,
            session: Session::new(),
            stack: HandlerStack::new(),
            prefs,
            db,
            trace_factory,
            trace,
            observer,
            alive: true,
            last: None,
        }
    }

    /// Grab the trigger button as the idle handler.
    pub fn init(&mut self) {
        self.with_stack(|stack, ctx| stack.init(ctx));
    }

    /// Process events until a quit was requested and no gesture is in
    /// flight, or until every sender is gone.
    pub fn run(&mut self, events: Receiver<LoopEvent>) {
        tracing::debug!("entering main loop");
        while self.alive || !self.stack.is_idle() {
            match events.recv() {
                Ok(event) => self.dispatch(event),
                Err(_) => {
                    tracing::debug!("event channel closed");
                    break;
                }
            }
        }
        tracing::debug!("leaving main loop");
    }

    pub fn dispatch(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Command(command) => self.command(command),
            LoopEvent::Display(event) => self.display(event),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stack(&self) -> &HandlerStack {
        &self.stack
    }

    pub fn into_grabber(self) -> Box<dyn Grabber> {
        self.grabber
    }

    fn command(&mut self, command: Command) {
        tracing::debug!(?command, "command received");
        match command {
            Command::Quit => {
                if self.alive {
                    self.alive = false;
                } else {
                    tracing::info!("forcing the dispatch loop to quit");
                    self.with_stack(|stack, ctx| stack.reset(ctx));
                }
            }
            Command::Regrab => {
                let button = self.prefs.button.get().button;
                if button != self.grabber.trigger_button() {
                    tracing::info!(button, "trigger button changed");
                    self.grabber.set_trigger_button(button);
                }
                self.grabber.regrab();
            }
            Command::SuspendGrab => self.grabber.suspend(),
            Command::RestoreGrab => self.grabber.resume(),
            Command::UpdateCurrent => {
                if let Err(err) = self.prefs.write() {
                    tracing::error!(?err, "failed to save preferences");
                }
                self.grabber.update(self.session.current);
            }
            Command::UpdateTrace => self.rebuild_trace(),
        }
    }

    fn display(&mut self, event: DisplayEvent) {
        match event {
            DisplayEvent::Motion { x, y, time } => {
                if self.stack.only_xi() || self.is_repeat(EventKind::Motion, time) {
                    return;
                }
                self.with_stack(|stack, ctx| stack.motion(ctx, x, y, time));
            }
            DisplayEvent::ButtonPress { button, x, y, time } => {
                if self.stack.only_xi() || self.is_repeat(EventKind::Press, time) {
                    return;
                }
                self.with_stack(|stack, ctx| stack.press(ctx, button, x, y, time));
            }
            DisplayEvent::ButtonRelease { button, x, y, time } => {
                if self.stack.only_xi() {
                    return;
                }
                if button == self.grabber.trigger_button() {
                    self.session.xinput_pressed = false;
                }
                if self.is_repeat(EventKind::Release, time) {
                    return;
                }
                self.with_stack(|stack, ctx| stack.release(ctx, button, x, y));
            }
            DisplayEvent::Extended {
                code,
                button,
                x,
                y,
                time,
            } => self.extended(code, button, x, y, time),
            DisplayEvent::Enter {
                window,
                grab,
                inferior,
            } => {
                if grab || inferior {
                    return;
                }
                self.session.current = Some(window);
                self.grabber.update(self.session.current);
            }
            DisplayEvent::Create { window } => self.grabber.create(window),
            DisplayEvent::ScreenChange => self.rebuild_trace(),
            DisplayEvent::ProtocolError {
                request_code,
                description,
            } => {
                tracing::warn!(request_code, %description, "protocol request failed");
            }
        }
    }

    fn extended(&mut self, code: i32, button: u32, x: i32, y: i32, time: u64) {
        if !self.grabber.has_extended_input() {
            return;
        }
        if self.grabber.is_button_down(code) {
            if button == self.grabber.trigger_button() {
                self.session.xinput_pressed = true;
            }
            if !self.is_repeat(EventKind::Press, time) {
                self.with_stack(|stack, ctx| stack.press(ctx, button, x, y, time));
            }
        } else if self.grabber.is_button_up(code) {
            if button == self.grabber.trigger_button() {
                self.session.xinput_pressed = false;
            }
            if !self.is_repeat(EventKind::Release, time) {
                self.with_stack(|stack, ctx| stack.release(ctx, button, x, y));
            }
        } else if self.grabber.is_motion(code) && !self.is_repeat(EventKind::Motion, time) {
            self.with_stack(|stack, ctx| stack.motion(ctx, x, y, time));
        }
    }

    /// The same physical event may arrive on both the core and the extended
    /// stream; only the first one with a given kind and timestamp counts.
    fn is_repeat(&mut self, kind: EventKind, time: u64) -> bool {
        if self.last == Some((kind, time)) {
            return true;
        }
        self.last = Some((kind, time));
        false
    }

    fn rebuild_trace(&mut self) {
        self.trace = self.trace_factory.create(self.prefs.trace.get());
    }

    fn with_stack(&mut self, f: impl FnOnce(&mut HandlerStack, &mut HandlerCtx)) {
        let mut ctx = HandlerCtx {
            grabber: self.grabber.as_mut(),
            session: &mut self.session,
            prefs: &self.prefs,
            db: &self.db,
            trace: self.trace.as_mut(),
            observer: self.observer.as_ref(),
        };
        f(&mut self.stack, &mut ctx);
    }
}

struct WorkerHandle {
    commands: CommandSender,
    join: JoinHandle<Box<dyn Grabber>>,
}

/// Owns the grab backend and runs the [`Dispatcher`] on its own thread.
pub struct GestureService {
    backend: Option<Box<dyn Grabber>>,
    prefs: Arc<Preferences>,
    db: SharedGestureDb,
    trace_factory: Arc<dyn TraceFactory>,
    observer: Arc<dyn StrokeObserver>,
    worker: Option<WorkerHandle>,
}

impl GestureService {
    pub fn new(
        backend: Box<dyn Grabber>,
        prefs: Arc<Preferences>,
        db: SharedGestureDb,
        trace_factory: Arc<dyn TraceFactory>,
        observer: Arc<dyn StrokeObserver>,
    ) -> Self {
        Self {
            backend: Some(backend),
            prefs,
            db,
            trace_factory,
            observer,
            worker: None,
        }
    }

    /// Connect the backend and start the dispatch thread. Does nothing if
    /// already running.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let mut grabber = self
            .backend
            .take()
            .ok_or_else(|| anyhow!("grab backend is unavailable"))?;

        let (event_tx, event_rx) = mpsc::channel();
        if let Err(err) = grabber.connect(event_tx.clone()) {
            self.backend = Some(grabber);
            return Err(err.context("failed to connect the grab backend"));
        }

        let mut dispatcher = Dispatcher::new(
            grabber,
            Arc::clone(&self.prefs),
            Arc::clone(&self.db),
            Arc::clone(&self.trace_factory),
            Arc::clone(&self.observer),
        );
        let join = thread::spawn(move || {
            dispatcher.init();
            dispatcher.run(event_rx);
            dispatcher.into_grabber()
        });
        self.worker = Some(WorkerHandle {
            commands: CommandSender::new(event_tx),
            join,
        });
        Ok(())
    }

    /// Ask the loop to quit, forcing it back to idle if a gesture is in
    /// flight, and wait for it.
    pub fn stop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.commands.send(Command::Quit);
            worker.commands.send(Command::Quit);
        }
        self.wait();
    }

    /// Block until the loop exits on its own.
    pub fn wait(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        drop(worker.commands);
        match worker.join.join() {
            Ok(mut grabber) => {
                if let Err(err) = grabber.disconnect() {
                    tracing::error!(?err, "failed to disconnect the grab backend");
                }
                self.backend = Some(grabber);
            }
            Err(_) => tracing::error!("dispatch thread panicked"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn commands(&self) -> Option<CommandSender> {
        self.worker.as_ref().map(|worker| worker.commands.clone())
    }
}

impl Drop for GestureService {
    fn drop(&mut self) {
        self.stop();
    }
}

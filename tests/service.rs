use gesture_daemon::gestures::{GestureDb, Ranking, NO_MATCH};
use gesture_daemon::grabber::{
    DefaultGrabber, DisplayEvent, GrabCall, GrabScope, MockGrabber, MOCK_XI_BUTTON_DOWN,
};
use gesture_daemon::locking::Lock;
use gesture_daemon::service::{
    Command, CommandSender, Dispatcher, GestureService, LoopEvent, NoopObserver, StrokeObserver,
};
use gesture_daemon::settings::{ButtonInfo, Preferences};
use gesture_daemon::trace::{NullTrace, Trace, TraceFactory, TraceStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

const TRIGGER: u32 = 3;

#[derive(Default)]
struct CountingTraceFactory {
    created: AtomicUsize,
}

impl TraceFactory for CountingTraceFactory {
    fn create(&self, _style: TraceStyle) -> Box<dyn Trace> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(NullTrace)
    }
}

struct RankingObserver {
    ids: Mutex<Sender<i32>>,
}

impl StrokeObserver for RankingObserver {
    fn ranked(&self, ranking: &Ranking) {
        if let Ok(tx) = self.ids.lock() {
            let _ = tx.send(ranking.id);
        }
    }
}

fn empty_db() -> Arc<Lock<GestureDb>> {
    Arc::new(Lock::new(GestureDb::new("unused.json")))
}

fn dispatcher_with(
    prefs: Arc<Preferences>,
    factory: Arc<dyn TraceFactory>,
) -> (Dispatcher, gesture_daemon::grabber::MockGrabberHandle) {
    let (grabber, handle) = MockGrabber::new(TRIGGER);
    let mut dispatcher = Dispatcher::new(
        Box::new(grabber),
        prefs,
        empty_db(),
        factory,
        Arc::new(NoopObserver),
    );
    dispatcher.init();
    handle.take_calls();
    (dispatcher, handle)
}

fn dispatcher() -> (Dispatcher, gesture_daemon::grabber::MockGrabberHandle) {
    dispatcher_with(
        Arc::new(Preferences::new("unused-prefs.json")),
        Arc::new(CountingTraceFactory::default()),
    )
}

fn press(button: u32, time: u64) -> LoopEvent {
    LoopEvent::Display(DisplayEvent::ButtonPress {
        button,
        x: 0,
        y: 0,
        time,
    })
}

#[test]
fn command_bytes_round_trip() {
    for byte in 1..=6u8 {
        let command = Command::from_byte(byte).unwrap();
        assert_eq!(command.as_byte(), byte);
    }
    assert_eq!(Command::from_byte(0), None);
    assert_eq!(Command::from_byte(42), None);
}

#[test]
fn unknown_command_byte_is_not_sent() {
    let (tx, rx) = mpsc::channel();
    let sender = CommandSender::new(tx);
    assert!(!sender.send_byte(99));
    assert!(sender.send_byte(Command::Regrab.as_byte()));
    assert_eq!(rx.try_recv().unwrap(), LoopEvent::Command(Command::Regrab));
    assert!(rx.try_recv().is_err());
}

#[test]
fn same_kind_and_time_is_handled_once() {
    let (mut dispatcher, _handle) = dispatcher();
    dispatcher.dispatch(press(TRIGGER, 5));
    dispatcher.dispatch(LoopEvent::Display(DisplayEvent::Extended {
        code: MOCK_XI_BUTTON_DOWN,
        button: 1,
        x: 0,
        y: 0,
        time: 5,
    }));
    assert_eq!(dispatcher.stack().names(), vec!["Idle", "Stroke"]);

    dispatcher.dispatch(press(1, 6));
    assert_eq!(dispatcher.stack().names(), vec!["Idle", "Action"]);
}

#[test]
fn first_quit_waits_for_gesture_second_forces_idle() {
    let (mut dispatcher, handle) = dispatcher();
    dispatcher.dispatch(press(TRIGGER, 1));

    dispatcher.dispatch(LoopEvent::Command(Command::Quit));
    assert!(!dispatcher.is_alive());
    assert_eq!(dispatcher.stack().names(), vec!["Idle", "Stroke"]);

    dispatcher.dispatch(LoopEvent::Command(Command::Quit));
    assert!(dispatcher.stack().is_idle());
    assert_eq!(handle.calls(), vec![GrabCall::Grab(GrabScope::Button)]);
}

#[test]
fn run_returns_after_quit_once_idle() {
    let (mut dispatcher, _handle) = dispatcher();
    let (tx, rx) = mpsc::channel();
    tx.send(press(TRIGGER, 1)).unwrap();
    tx.send(LoopEvent::Command(Command::Quit)).unwrap();
    tx.send(LoopEvent::Display(DisplayEvent::ButtonRelease {
        button: TRIGGER,
        x: 0,
        y: 0,
        time: 2,
    }))
    .unwrap();
    tx.send(press(TRIGGER, 3)).unwrap();

    dispatcher.run(rx);
    assert!(dispatcher.stack().is_idle());
}

#[test]
fn grab_commands_reach_grabber() {
    let (mut dispatcher, handle) = dispatcher();
    for command in [Command::Regrab, Command::SuspendGrab, Command::RestoreGrab] {
        dispatcher.dispatch(LoopEvent::Command(command));
    }
    assert_eq!(
        handle.calls(),
        vec![GrabCall::Regrab, GrabCall::Suspend, GrabCall::Resume]
    );
}

#[test]
fn regrab_picks_up_new_trigger_button() {
    let prefs = Arc::new(Preferences::new("unused-prefs.json"));
    let (mut dispatcher, handle) = dispatcher_with(
        Arc::clone(&prefs),
        Arc::new(CountingTraceFactory::default()),
    );
    prefs.button.set(ButtonInfo {
        button: 2,
        ..ButtonInfo::default()
    });

    dispatcher.dispatch(press(2, 1));
    assert!(dispatcher.stack().is_idle());

    dispatcher.dispatch(LoopEvent::Command(Command::Regrab));
    assert_eq!(handle.take_calls(), vec![GrabCall::Regrab]);

    dispatcher.dispatch(press(2, 2));
    assert_eq!(dispatcher.stack().names(), vec!["Idle", "Stroke"]);
}

#[test]
fn update_current_saves_preferences() {
    let dir = tempdir().unwrap();
    let prefs = Arc::new(Preferences::in_dir(dir.path()));
    let (mut dispatcher, handle) =
        dispatcher_with(Arc::clone(&prefs), Arc::new(CountingTraceFactory::default()));
    dispatcher.dispatch(LoopEvent::Display(DisplayEvent::Enter {
        window: 9,
        grab: false,
        inferior: false,
    }));
    dispatcher.dispatch(LoopEvent::Command(Command::UpdateCurrent));

    assert!(prefs.path().exists());
    assert_eq!(
        handle.calls(),
        vec![GrabCall::Update(Some(9)), GrabCall::Update(Some(9))]
    );
}

#[test]
fn grab_and_inferior_crossings_are_ignored() {
    let (mut dispatcher, handle) = dispatcher();
    dispatcher.dispatch(LoopEvent::Display(DisplayEvent::Enter {
        window: 4,
        grab: true,
        inferior: false,
    }));
    dispatcher.dispatch(LoopEvent::Display(DisplayEvent::Enter {
        window: 5,
        grab: false,
        inferior: true,
    }));
    dispatcher.dispatch(LoopEvent::Display(DisplayEvent::Create { window: 6 }));
    assert_eq!(dispatcher.session().current, None);
    assert_eq!(handle.calls(), vec![GrabCall::Create(6)]);
}

#[test]
fn trace_is_rebuilt_on_screen_change_and_command() {
    let factory = Arc::new(CountingTraceFactory::default());
    let (mut dispatcher, _handle) = dispatcher_with(
        Arc::new(Preferences::new("unused-prefs.json")),
        Arc::clone(&factory) as Arc<dyn TraceFactory>,
    );
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);

    dispatcher.dispatch(LoopEvent::Display(DisplayEvent::ScreenChange));
    dispatcher.dispatch(LoopEvent::Command(Command::UpdateTrace));
    assert_eq!(factory.created.load(Ordering::SeqCst), 3);
}

#[test]
fn protocol_error_keeps_loop_alive() {
    let (mut dispatcher, _handle) = dispatcher();
    dispatcher.dispatch(LoopEvent::Display(DisplayEvent::ProtocolError {
        request_code: 33,
        description: "BadAccess".into(),
    }));
    assert!(dispatcher.is_alive());
    assert!(dispatcher.stack().is_idle());
}

#[test]
fn service_start_stop_idempotent() {
    let (grabber, handle) = MockGrabber::new(TRIGGER);
    let mut service = GestureService::new(
        Box::new(grabber),
        Arc::new(Preferences::new("unused-prefs.json")),
        empty_db(),
        Arc::new(CountingTraceFactory::default()),
        Arc::new(NoopObserver),
    );

    service.start().unwrap();
    service.start().unwrap();
    assert!(service.is_running());
    assert_eq!(handle.connect_count(), 1);

    service.stop();
    service.stop();
    assert!(!service.is_running());
    assert_eq!(handle.disconnect_count(), 1);

    service.start().unwrap();
    assert_eq!(handle.connect_count(), 2);
}

#[test]
fn service_routes_backend_events_to_handlers() {
    let (grabber, handle) = MockGrabber::new(TRIGGER);
    let (tx, rx) = mpsc::channel();
    let mut service = GestureService::new(
        Box::new(grabber),
        Arc::new(Preferences::new("unused-prefs.json")),
        empty_db(),
        Arc::new(CountingTraceFactory::default()),
        Arc::new(RankingObserver { ids: Mutex::new(tx) }),
    );
    service.start().unwrap();

    assert!(handle.emit(DisplayEvent::ButtonPress {
        button: TRIGGER,
        x: 0,
        y: 0,
        time: 1,
    }));
    for i in 1..=5 {
        handle.emit(DisplayEvent::Motion {
            x: i * 20,
            y: 0,
            time: 1 + i as u64,
        });
    }
    handle.emit(DisplayEvent::ButtonRelease {
        button: TRIGGER,
        x: 100,
        y: 0,
        time: 10,
    });

    let id = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(id, NO_MATCH);

    service.stop();
    assert!(handle.calls().contains(&GrabCall::FakeButton(TRIGGER)));
}

#[test]
fn quit_command_ends_service() {
    let (grabber, _handle) = MockGrabber::new(TRIGGER);
    let mut service = GestureService::new(
        Box::new(grabber),
        Arc::new(Preferences::new("unused-prefs.json")),
        empty_db(),
        Arc::new(CountingTraceFactory::default()),
        Arc::new(NoopObserver),
    );
    service.start().unwrap();
    let commands = service.commands().unwrap();
    assert!(commands.send(Command::Quit));
    service.wait();
    assert!(!service.is_running());
}

#[test]
fn missing_display_backend_fails_to_start() {
    let mut service = GestureService::new(
        Box::new(DefaultGrabber::new(TRIGGER)),
        Arc::new(Preferences::new("unused-prefs.json")),
        empty_db(),
        Arc::new(CountingTraceFactory::default()),
        Arc::new(NoopObserver),
    );
    assert!(service.start().is_err());
    assert!(!service.is_running());
}

use anyhow::Context;
use gesture_daemon::config_dir::resolve_config_dir;
use gesture_daemon::gestures::{GestureDb, QuickLearn};
use gesture_daemon::grabber::DefaultGrabber;
use gesture_daemon::locking::Lock;
use gesture_daemon::logging;
use gesture_daemon::service::GestureService;
use gesture_daemon::settings::Preferences;
use gesture_daemon::trace::DefaultTraceFactory;
use std::sync::Arc;

/// Set to enable debug logging.
const DEBUG_ENV: &str = "GESTURE_DAEMON_DEBUG";

fn main() -> anyhow::Result<()> {
    logging::init(std::env::var_os(DEBUG_ENV).is_some(), None);

    let config_dir = resolve_config_dir(None)?;
    let prefs = Arc::new(Preferences::in_dir(&config_dir));
    if let Err(err) = prefs.read() {
        tracing::warn!(?err, "failed to load preferences; using defaults");
    }
    let db = Arc::new(Lock::new(GestureDb::in_dir(&config_dir)));
    if let Err(err) = db.read() {
        tracing::warn!(?err, "failed to load gestures; starting empty");
    }

    let trigger = prefs.button.get().button;
    let mut service = GestureService::new(
        Box::new(DefaultGrabber::new(trigger)),
        Arc::clone(&prefs),
        Arc::clone(&db),
        Arc::new(DefaultTraceFactory),
        Arc::new(QuickLearn::new(Arc::clone(&db))),
    );
    service
        .start()
        .context("couldn't open the display connection")?;
    service.wait();

    if let Err(err) = db.write() {
        tracing::error!(?err, "failed to save gestures");
    }
    if let Err(err) = prefs.write() {
        tracing::error!(?err, "failed to save preferences");
    }
    Ok(())
}

use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialise logging. With `debug` set the default level is `debug` and
/// `RUST_LOG` may override it; otherwise the level is `info`.
///
/// When `file` is given, output goes to that file through a background
/// writer instead of stderr. Only the first call has any effect.
pub fn init(debug: bool, file: Option<PathBuf>) {
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::new("info")
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let Some(path) = file else {
        let _ = builder.try_init();
        return;
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let Some(name) = path.file_name() else {
        let _ = builder.try_init();
        tracing::warn!(path = %path.display(), "log path has no file name; logging to stderr");
        return;
    };
    let appender = tracing_appender::rolling::never(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    if builder.with_writer(writer).with_ansi(false).try_init().is_ok() {
        let _ = FILE_GUARD.set(guard);
    }
}

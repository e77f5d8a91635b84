use anyhow::{bail, Context};
use std::path::PathBuf;

/// Overrides the default configuration directory.
pub const CONFIG_DIR_ENV: &str = "GESTURE_DAEMON_CONFIG_DIR";

const DEFAULT_DIR_NAME: &str = ".gesture_daemon";

/// Pick the configuration directory and make sure it exists.
///
/// `explicit` wins over [`CONFIG_DIR_ENV`], which wins over
/// `~/.gesture_daemon`. A missing directory is created; a path that exists
/// but is not a directory is an error.
pub fn resolve_config_dir(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let dir = match explicit {
        Some(dir) => dir,
        None => match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs_next::home_dir()
                .context("cannot determine the home directory")?
                .join(DEFAULT_DIR_NAME),
        },
    };

    match std::fs::metadata(&dir) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => bail!("\"{}\" is not a directory", dir.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::create_dir_all(&dir).with_context(|| {
                format!("couldn't create configuration directory \"{}\"", dir.display())
            })?;
            tracing::info!(dir = %dir.display(), "created configuration directory");
        }
        Err(err) => {
            return Err(err).with_context(|| format!("cannot inspect \"{}\"", dir.display()))
        }
    }
    Ok(dir)
}

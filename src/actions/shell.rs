use anyhow::Context;
use std::process::{Command, Stdio};

/// Start `cmd` through `/bin/sh -c` without waiting for it. The child is
/// reaped on a detached thread.
pub fn spawn(cmd: &str) -> anyhow::Result<()> {
    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to spawn `{cmd}`"))?;
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

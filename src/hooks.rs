use std::io::Write;
use std::process::Command;
use tracing::{debug, warn};

/// Run a configured hook detached through `sh -c`.
pub fn execute_hook(hook: Option<&str>) {
    let Some(command) = hook else {
        debug!("No hook configured");
        return;
    };

    match hook_command(command) {
        Some(command) => {
            if let Err(e) = spawn_detached(command) {
                warn!("Failed to run hook `{command}`: {e}");
            }
        }
        None => debug!("Hook is empty or commented out: {command}"),
    }
}

fn spawn_detached(command: &str) -> std::io::Result<()> {
    let child = Command::new("sh").arg("-c").arg(command).spawn()?;
    // Not waited on: hooks such as background music outlive the session.
    drop(child);
    Ok(())
}

/// The command to run, or `None` when the hook is empty or starts with `#`.
fn hook_command(command: &str) -> Option<&str> {
    let trimmed = command.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        None
    } else {
        Some(trimmed)
    }
}

pub fn bell() {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "\x07");
    let _ = stdout.flush();
}

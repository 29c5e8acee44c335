use log::debug;
use std::io::{Error, ErrorKind, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Spawns `cmd` through the shell, feeds it one line per entry of `lines` on
/// stdin, and waits for completion with a hard deadline. The child is killed
/// on expiry and a TimedOut error is returned.
pub fn fork_and_feed_stdin(cmd: &str, timeout_secs: u64, lines: &[String]) -> Result<(), Error> {
    let mut child = Command::new("sh").arg("-c").arg(cmd).stdin(Stdio::piped()).spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        for line in lines {
            stdin.write_all(format!("{}\n", line).as_bytes())?;
        }
        // Dropping stdin closes the pipe so the child sees EOF.
    }

    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        if let Some(status) = child.try_wait()? {
            debug!("Command {} exited with {}", cmd, status);
            return Ok(());
        }
        if Instant::now() >= deadline {
            child.kill().ok();
            child.wait().ok();
            return Err(Error::new(ErrorKind::TimedOut, format!("command {} timed out after {}s", cmd, timeout_secs)));
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Replaces the value following `key` in a job message, e.g. `R=12` or
/// `W=1:00:00`. The value is the maximal run of digits and colons after the
/// key. Returns the message unchanged when the key is absent.
fn rewrite_message_field(message: &str, key: &str, value: &str) -> String {
    if let Some(pos) = message.find(key) {
        let start = pos + key.len();
        let end = message[start..]
            .find(|c: char| !(c.is_ascii_digit() || c == ':'))
            .map(|i| start + i)
            .unwrap_or(message.len());
        if end > start {
            return format!("{}{}{}", &message[..start], value, &message[end..]);
        }
    }
    message.to_string()
}

/// Rewrites the `R=<n>` resource count of a reservation message after a shrink.
pub fn rewrite_resource_count(message: &str, resource_count: u32) -> String {
    rewrite_message_field(message, "R=", &resource_count.to_string())
}

/// Rewrites the `W=H:MM:SS` walltime of a reservation message after a shrink.
pub fn rewrite_walltime(message: &str, walltime_sql: &str) -> String {
    rewrite_message_field(message, "W=", walltime_sql)
}

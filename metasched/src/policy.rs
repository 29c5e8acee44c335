/*
 * Copyright (c) 2025 Clément GRENNERAT
 *
 * This program is free software: you can redistribute it and/or modify it under the terms of the
 * GNU General Public License as published by the Free Software Foundation, version 3.
 * This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
 * even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
 * See the GNU General Public License for more details.
 * You should have received a copy of the GNU General Public License along with this program.
 * If not, see https://www.gnu.org/licenses/.
 *
 */

use log::{debug, warn};
use metasched_core::model::configuration::Configuration;
use metasched_db::model::queues::Queue;
use std::fmt::{Display, Formatter};
use std::io::{BufRead, BufReader};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

const DEFAULT_POLICY_DIR: &str = "/usr/local/lib/oar";

/// Why a policy subprocess is considered failed. Any failure deactivates the queue.
pub enum PolicyFailure {
    /// The process could not be spawned.
    Spawn(std::io::Error),
    /// The process exited with a non-zero code.
    Exit(i32),
    /// The process was terminated by a signal.
    Signal(i32),
}

impl Display for PolicyFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyFailure::Spawn(e) => write!(f, "cannot run the policy: {}", e),
            PolicyFailure::Exit(code) => write!(f, "policy returned a bad value: {}", code),
            PolicyFailure::Signal(signal) => write!(f, "policy terminated by signal {}", signal),
        }
    }
}

/// Invokes the per-queue scheduling policy as an external process:
/// `<policy_dir>/schedulers/<policy> <queue_name> <now_epoch> <now_sql>`.
/// The policy reads and writes the database directly; its stdout is drained
/// line by line into the debug log and its exit status decides the queue fate.
pub fn invoke_queue_policy(config: &Configuration, queue: &Queue, now: i64, now_sql: &str) -> Result<(), PolicyFailure> {
    let policy_dir = std::env::var("OARDIR")
        .ok()
        .or_else(|| config.policy_dir.clone())
        .unwrap_or_else(|| {
            warn!("OARDIR env variable must be defined, {} is used by default", DEFAULT_POLICY_DIR);
            DEFAULT_POLICY_DIR.to_string()
        });
    let program = PathBuf::from(policy_dir).join("schedulers").join(&queue.scheduler_policy);

    let mut child = Command::new(&program)
        .arg(&queue.queue_name)
        .arg(now.to_string())
        .arg(now_sql)
        .stdout(Stdio::piped())
        .spawn()
        .map_err(PolicyFailure::Spawn)?;

    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            match line {
                Ok(line) => debug!("Read on the policy output: {}", line),
                Err(_) => break,
            }
        }
    }

    let status = child.wait().map_err(PolicyFailure::Spawn)?;
    if let Some(signal) = status.signal() {
        return Err(PolicyFailure::Signal(signal));
    }
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(PolicyFailure::Exit(code)),
        None => Err(PolicyFailure::Signal(0)),
    }
}

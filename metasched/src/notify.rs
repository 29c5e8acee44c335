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
use std::collections::HashSet;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// Message delivery to the execution agent and to interactive clients.
///
/// The execution agent listens on a local stream socket and understands one
/// ASCII command per line: `OARRUNJOB_<jid>`, `ChState`, `Qsub`, `Term`.
/// Interactive clients are reached over one TCP connection per message.
/// Delivery is fire and forget: failures are logged and reported to the
/// caller, never retried within the iteration.
pub struct NotifyGateway {
    almighty_socket: Option<String>,
    timeout: Duration,
    /// Job ids already announced to the execution agent in this process
    /// lifetime. Only populated on successful delivery, so a failed
    /// notification is retried on a later iteration.
    to_launch_jobs_already_treated: HashSet<i64>,
}

impl NotifyGateway {
    pub fn new(config: &Configuration) -> Self {
        NotifyGateway {
            almighty_socket: config.almighty_socket.clone(),
            timeout: Duration::from_secs(config.scheduler_timeout),
            to_launch_jobs_already_treated: HashSet::new(),
        }
    }

    /// Sends one command line to the execution agent. Returns false on socket failure.
    pub fn notify_almighty(&self, message: &str) -> bool {
        let Some(path) = &self.almighty_socket
        else {
            warn!("No execution agent socket configured, dropping command {}", message);
            return false;
        };
        let result = UnixStream::connect(path).and_then(|mut stream| {
            stream.set_write_timeout(Some(self.timeout))?;
            stream.write_all(format!("{}\n", message).as_bytes())
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to notify the execution agent ({}): {}", message, e);
                false
            }
        }
    }

    /// Tells the execution agent to run a job, exactly once per process lifetime.
    pub fn notify_to_run_job(&mut self, job_id: i64) {
        if self.to_launch_jobs_already_treated.contains(&job_id) {
            return;
        }
        if self.notify_almighty(&format!("OARRUNJOB_{}", job_id)) {
            self.to_launch_jobs_already_treated.insert(job_id);
            debug!("Notified the execution agent to launch the job {}", job_id);
        } else {
            warn!("Not able to notify the execution agent to launch the job {} (socket error)", job_id);
        }
    }

    /// Delivers one ASCII line to an interactive client, one connection per
    /// message, with the configured deadline on connect and write.
    /// Returns false on any failure.
    pub fn notify_tcp_socket(&self, host: &str, port: &str, message: &str) -> bool {
        let addr = match format!("{}:{}", host, port).to_socket_addrs().map(|mut it| it.next()) {
            Ok(Some(addr)) => addr,
            _ => {
                warn!("Invalid client address {}:{}", host, port);
                return false;
            }
        };
        let result = TcpStream::connect_timeout(&addr, self.timeout).and_then(|mut stream| {
            stream.set_write_timeout(Some(self.timeout))?;
            stream.write_all(format!("{}\n", message).as_bytes())
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot open connection to the client {}:{}: {}", host, port, e);
                false
            }
        }
    }
}

/// Splits a job `info_type` of the form `host:port`.
pub fn split_info_type(info_type: &str) -> Option<(&str, &str)> {
    info_type.split_once(':').filter(|(host, port)| !host.is_empty() && !port.is_empty())
}

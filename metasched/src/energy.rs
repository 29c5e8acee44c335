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

use crate::platform::Platform;
use crate::tools::fork_and_feed_stdin;
use log::{debug, error};
use metasched_core::model::configuration::Configuration;
use metasched_db::model::events::{add_new_event_with_hosts, get_last_wake_up_date_of_node};
use metasched_db::model::gantt::get_gantt_hostname_to_wake_up;
use metasched_db::model::resources::{get_next_job_date_on_node, search_idle_nodes};
use metasched_db::Error;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// Decides which nodes to power off or wake up and dispatches the commands,
/// either through the built-in energy-saving agent (line protocol on its
/// control socket) or by feeding an external command on stdin.
///
/// Halt candidates are nodes idle for longer than the configured idle time,
/// with no job scheduled within the sleep window, and not woken up recently.
/// Wake candidates are Absent nodes needed by the gantt within the wake-up window.
pub fn node_energy_saving(platform: &Platform, now: i64) -> Result<(), Error> {
    let session = platform.session();
    let config = &platform.get_platform_config().config;
    let timeout = config.scheduler_timeout;
    let internal = config.energy_saving_internal();
    let sleep_managed = internal || config.scheduler_node_manager_sleep_cmd.is_some();

    let mut agent_contacted = false;

    if sleep_managed {
        if let (Some(idle_time), Some(sleep_time)) = (config.scheduler_node_manager_idle_time, config.scheduler_node_manager_sleep_time) {
            let idle_limit = now - idle_time;
            let mut nodes_to_halt: Vec<String> = Vec::new();

            for (node, last_job_date) in search_idle_nodes(session, now)? {
                if last_job_date < idle_limit {
                    // The node must have enough time to sleep before its next job.
                    let next_job_date = get_next_job_date_on_node(session, &node)?;
                    if next_job_date.map_or(true, |date| date - sleep_time > now) {
                        // And must not have been woken up within the idle window.
                        let wake_up_date = get_last_wake_up_date_of_node(session, &node)?;
                        if wake_up_date.map_or(true, |date| date < idle_limit) {
                            nodes_to_halt.push(node);
                        }
                    }
                }
            }

            if !nodes_to_halt.is_empty() {
                debug!("Powering off some nodes (energy saving): {:?}", nodes_to_halt);
                if internal {
                    if agent_send(config, &format!("HALT:{}", nodes_to_halt.join(" "))).is_err() {
                        error!("Communication problem with the energy saving module");
                    }
                    agent_contacted = true;
                } else if let Some(cmd) = &config.scheduler_node_manager_sleep_cmd {
                    if let Err(e) = fork_and_feed_stdin(cmd, timeout, &nodes_to_halt) {
                        error!("Command {} failed ({}) while trying to poweroff some nodes", cmd, e);
                    }
                }
            }
        }
    }

    if sleep_managed {
        let wakeup_time = config.scheduler_node_manager_wakeup_time;
        let nodes_to_wake_up = get_gantt_hostname_to_wake_up(session, now, wakeup_time)?;

        if !nodes_to_wake_up.is_empty() {
            debug!("Awaking some nodes: {:?}", nodes_to_wake_up);
            add_new_event_with_hosts(
                session,
                "WAKE_UP_NODE",
                0,
                &format!("Node wake-up requested: {}", nodes_to_wake_up.join(" ")),
                &nodes_to_wake_up,
            )?;
            if internal {
                if agent_send(config, &format!("WAKEUP:{}", nodes_to_wake_up.join(" "))).is_err() {
                    error!("Communication problem with the energy saving module");
                }
                agent_contacted = true;
            } else if let Some(cmd) = &config.scheduler_node_manager_wake_up_cmd {
                if let Err(e) = fork_and_feed_stdin(cmd, timeout, &nodes_to_wake_up) {
                    error!("Command {} failed ({}) while trying to wake up some nodes", cmd, e);
                }
            }
        }
    }

    // Periodic heartbeat so the agent can time out its own pending operations.
    if internal && !agent_contacted {
        if agent_send(config, "CHECK").is_err() {
            error!("Communication problem with the energy saving module");
        }
    }

    Ok(())
}

/// One ASCII command line to the built-in energy-saving agent.
fn agent_send(config: &Configuration, message: &str) -> std::io::Result<()> {
    let path = config
        .energy_saving_socket
        .as_deref()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "ENERGY_SAVING_SOCKET is not configured"))?;
    let mut stream = UnixStream::connect(path)?;
    stream.set_write_timeout(Some(Duration::from_secs(config.scheduler_timeout)))?;
    stream.write_all(format!("{}\n", message).as_bytes())
}

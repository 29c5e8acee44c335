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

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "/etc/metasched/metasched.conf";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Configuration {
    pub database_url: Option<String>,
    pub scheduler_job_security_time: i64,
    // --- Resources configuration ---
    pub scheduler_resource_order: Option<String>,
    pub scheduler_available_suspended_resource_type: Option<String>,
    pub hierarchy_labels: Option<String>,
    // --- Reservations ---
    pub reservation_waiting_resources_timeout: i64,
    // --- Policy subprocesses ---
    pub policy_dir: Option<String>,
    // --- Notifications ---
    pub almighty_socket: Option<String>,
    pub scheduler_timeout: u64,
    // --- Energy saving ---
    pub energy_saving_internal: Option<String>,
    pub energy_saving_socket: Option<String>,
    pub scheduler_node_manager_idle_time: Option<i64>,
    pub scheduler_node_manager_sleep_time: Option<i64>,
    pub scheduler_node_manager_wakeup_time: i64,
    pub scheduler_node_manager_sleep_cmd: Option<String>,
    pub scheduler_node_manager_wake_up_cmd: Option<String>,
}

impl Configuration {
    /// Load configuration from a file, in a .conf format (key=value).
    /// The path is taken from the `METASCHED_CONF` env var, with a
    /// system-wide fallback. A missing or unparsable file yields the defaults.
    pub fn load() -> Self {
        let path = if let Ok(path) = std::env::var("METASCHED_CONF") {
            path
        } else {
            DEFAULT_CONFIG_FILE.to_string()
        };

        let contents = std::fs::read_to_string(&path).ok();
        if let Some(contents) = contents {
            serde_envfile::from_str(&contents).unwrap_or_else(|e| {
                eprintln!(
                    "Warning: could not parse configuration file '{}': {}, using default configuration.",
                    path, e
                );
                Configuration::default()
            })
        } else {
            Configuration::default()
        }
    }

    pub fn resource_order(&self) -> &str {
        self.scheduler_resource_order.as_deref().unwrap_or("resource_id ASC")
    }

    pub fn hierarchy_label_list(&self) -> Vec<Box<str>> {
        self.hierarchy_labels
            .as_deref()
            .unwrap_or("resource_id,network_address")
            .split(',')
            .map(|s| s.trim().to_string().into_boxed_str())
            .collect()
    }

    pub fn energy_saving_internal(&self) -> bool {
        self.energy_saving_internal.as_deref().map(|v| v.eq_ignore_ascii_case("yes")).unwrap_or(false)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            database_url: None,
            scheduler_job_security_time: 60, // 1 minute
            // --- Resources configuration ---
            scheduler_resource_order: Some("resource_id ASC".to_string()),
            scheduler_available_suspended_resource_type: Some("default".to_string()),
            hierarchy_labels: Some("resource_id,network_address".to_string()),
            // --- Reservations ---
            reservation_waiting_resources_timeout: 300,
            // --- Policy subprocesses ---
            policy_dir: None,
            // --- Notifications ---
            almighty_socket: None,
            scheduler_timeout: 10,
            // --- Energy saving ---
            energy_saving_internal: None,
            energy_saving_socket: None,
            scheduler_node_manager_idle_time: None,
            scheduler_node_manager_sleep_time: None,
            scheduler_node_manager_wakeup_time: 1,
            scheduler_node_manager_sleep_cmd: None,
            scheduler_node_manager_wake_up_cmd: None,
        }
    }
}

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

#![cfg(test)]

mod energy_test;
mod launch_test;
mod notify_test;
mod platform_test;
mod reservation_test;

use dotenvy::dotenv;
use indexmap::IndexMap;
use log::LevelFilter;
use metasched_core::model::configuration::Configuration;
use metasched_db::model::resources::NewResource;
use metasched_db::Session;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

pub(crate) fn setup_for_tests() -> (Session, Configuration) {
    // Load .env file if present
    dotenv().ok();

    // Initialize logging
    env_logger::Builder::new()
        .is_test(true)
        .filter(None, LevelFilter::Debug)
        .try_init()
        .ok();

    let mut config = Configuration::default();
    config.scheduler_timeout = 2;

    // Initialize database connection
    let session = Session::new("sqlite::memory:");

    // Create schema
    session.create_schema();

    (session, config)
}

/// Inserts `count` Alive default resources spread over hosts of `per_host` resources.
pub(crate) fn insert_resources(session: &Session, count: u32, per_host: u32) {
    for i in 0..count {
        NewResource {
            network_address: format!("node{}", i / per_host + 1),
            r#type: "default".to_string(),
            state: "Alive".to_string(),
            available_upto: None,
            labels: IndexMap::new(),
        }
        .insert(session)
        .unwrap();
    }
}

/// Writes an executable policy script under `<dir>/schedulers/<name>`.
pub(crate) fn write_policy(dir: &Path, name: &str, script: &str) {
    let schedulers_dir = dir.join("schedulers");
    std::fs::create_dir_all(&schedulers_dir).unwrap();
    let path = schedulers_dir.join(name);
    std::fs::write(&path, script).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
}

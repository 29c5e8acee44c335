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

mod energy;
mod launch;
mod meta_schedule;
mod notify;
mod platform;
mod policy;
mod reservation;
mod test;
mod tools;

use dotenvy::dotenv;
use log::LevelFilter;
use metasched_core::model::configuration::Configuration;
use metasched_db::Session;
use platform::Platform;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    // Load .env file if present
    dotenv().ok();

    // Initialize logging
    env_logger::Builder::new().filter(None, LevelFilter::Info).init();

    // Load configuration
    let config = Configuration::load();
    let database_url = config
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .expect("DATABASE_URL must be set in the configuration file or environment");

    // Initialize database connection
    let session = Session::new(&database_url);

    // Create the platform instance
    let platform = Platform::from_database(session, config);

    // A signal lets the current per-queue step complete before the iteration stops.
    let shutdown = install_signal_listener();

    // Meta scheduling, one pass
    let exit_code = meta_schedule::meta_schedule(&platform, &shutdown);
    std::process::exit(exit_code);
}

fn install_signal_listener() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let listener_flag = Arc::clone(&flag);
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to build the signal listener runtime");
        runtime.block_on(async {
            let mut terminate =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("Failed to register SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        });
        listener_flag.store(true, Ordering::Relaxed);
    });
    flag
}

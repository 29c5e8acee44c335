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

use crate::meta_schedule::notify_interactive_predictions;
use crate::notify::NotifyGateway;
use crate::platform::Platform;
use crate::test::{insert_resources, setup_for_tests};
use metasched_core::interval::RidSet;
use metasched_core::model::configuration::Configuration;
use metasched_core::times::local_to_sql;
use metasched_db::model::gantt::save_assigns;
use metasched_db::model::jobs::NewJob;
use std::io::Read;
use std::net::TcpListener;
use std::os::unix::net::UnixListener;

#[test]
fn test_interactive_start_prediction_is_delivered() {
    let (session, config) = setup_for_tests();
    insert_resources(&session, 10, 5);

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let (_jid, moldable_ids) = NewJob {
        queue_name: "default".to_string(),
        kind: "INTERACTIVE".to_string(),
        info_type: Some(format!("127.0.0.1:{}", port)),
        message: "R=1,W=0:10:00".to_string(),
        res: vec![(600, vec![("resource_id=1".to_string(), "".to_string())])],
        ..Default::default()
    }
    .insert(&session)
    .unwrap();

    let platform = Platform::from_database(session, config);
    let now = platform.get_now();
    save_assigns(platform.session(), vec![(moldable_ids[0], now + 120, RidSet::from_iter([1u32..=1]))]).unwrap();

    let reader = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut line = String::new();
        stream.read_to_string(&mut line).unwrap();
        line
    });

    let gateway = NotifyGateway::new(&platform.get_platform_config().config);
    let now_sql = local_to_sql(now);
    notify_interactive_predictions(&platform, &gateway, &now_sql).unwrap();

    let line = reader.join().unwrap();
    assert!(line.starts_with(&format!("[{}] Start prediction: ", now_sql)), "unexpected line: {}", line);
    assert!(line.ends_with("(R=1,W=0:10:00)\n"), "unexpected line: {}", line);
    assert!(line.contains(&local_to_sql(now + 120)), "unexpected line: {}", line);
}

#[test]
fn test_run_job_notification_is_idempotent() {
    let socket_dir = tempfile::tempdir().unwrap();
    let socket_path = socket_dir.path().join("almighty.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let mut config = Configuration::default();
    config.scheduler_timeout = 2;
    config.almighty_socket = Some(socket_path.to_string_lossy().to_string());
    let mut gateway = NotifyGateway::new(&config);

    let reader = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut line = String::new();
        stream.read_to_string(&mut line).unwrap();
        (listener, line)
    });

    gateway.notify_to_run_job(42);
    let (listener, line) = reader.join().unwrap();
    assert_eq!(line, "OARRUNJOB_42\n");

    // A second notification for the same job does not reach the agent.
    listener.set_nonblocking(true).unwrap();
    gateway.notify_to_run_job(42);
    assert_eq!(listener.accept().unwrap_err().kind(), std::io::ErrorKind::WouldBlock);

    // But another job does.
    listener.set_nonblocking(false).unwrap();
    let reader = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut line = String::new();
        stream.read_to_string(&mut line).unwrap();
        line
    });
    gateway.notify_to_run_job(43);
    assert_eq!(reader.join().unwrap(), "OARRUNJOB_43\n");
}

#[test]
fn test_notification_failure_is_reported() {
    let mut config = Configuration::default();
    config.scheduler_timeout = 1;
    config.almighty_socket = Some("/nonexistent/almighty.sock".to_string());
    let gateway = NotifyGateway::new(&config);

    assert!(!gateway.notify_almighty("ChState"));
    assert!(!gateway.notify_tcp_socket("127.0.0.1", "1", "GOOD RESERVATION"));
}

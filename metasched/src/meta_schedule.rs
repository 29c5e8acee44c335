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

use crate::energy::node_energy_saving;
use crate::launch::{check_besteffort_jobs_to_kill, handle_jobs_to_launch};
use crate::notify::{split_info_type, NotifyGateway};
use crate::platform::{add_scheduled_jobs_to_slot_sets, gantt_init_with_running_jobs, Platform};
use crate::policy::invoke_queue_policy;
use crate::reservation::{check_reservation_jobs, handle_waiting_reservation_jobs};
use log::{debug, error, info, warn};
use metasched_core::model::job::{JobKind, ReservationState};
use metasched_core::times::local_to_sql;
use metasched_db::model::events::add_new_event;
use metasched_db::model::gantt::{get_gantt_waiting_interactive_prediction_date, update_gantt_visualization};
use metasched_db::model::jobs::{
    frag_job, get_gantt_jobs_to_launch, get_jobs_in_multiple_states, get_jobs_on_resuming_job_resources, resume_job_action, set_job_state,
};
use metasched_db::model::queues::Queue;
use metasched_db::Error;
use std::sync::atomic::{AtomicBool, Ordering};

/// One scheduling iteration over all active queues.
///
/// Returns the iteration exit code: 0 on a normal pass, 1 when an interactive
/// reservation was acknowledged with a reached start time (the caller should
/// re-invoke immediately), 2 when a besteffort kill or a notification failure
/// occurred (the caller should re-invoke soon).
pub fn meta_schedule(platform: &Platform, shutdown: &AtomicBool) -> i32 {
    match run(platform, shutdown) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            // Transient database failures surface through the exit code only:
            // the next invocation re-reads the whole state.
            error!("Database error during the scheduling iteration: {}", e);
            2
        }
    }
}

fn run(platform: &Platform, shutdown: &AtomicBool) -> Result<i32, Error> {
    let mut exit_code = 0;
    let session = platform.session();
    let config = &platform.get_platform_config().config;
    let security_time = platform.security_time();
    let now = platform.get_now();
    let now_sql = local_to_sql(now);

    let mut gateway = NotifyGateway::new(config);

    // Gantt and calendar initialization from the persistent state.
    let (mut slot_sets, besteffort_rid_to_job) = gantt_init_with_running_jobs(platform)?;

    // Queues are processed strictly in descending priority: higher priority
    // assignments constrain the slot sets seen by lower priority queues.
    for queue in Queue::get_all_ordered_by_priority(session)?.iter().filter(|q| q.is_active()) {
        if shutdown.load(Ordering::Relaxed) {
            info!("Termination requested, stopping the iteration before queue {}", queue.queue_name);
            return Ok(exit_code);
        }

        info!("Queue {}: launching policy {} at {}", queue.queue_name, queue.scheduler_policy, now_sql);
        if let Err(failure) = invoke_queue_policy(config, queue, now, &now_sql) {
            error!(
                "Execution of {} failed for queue {} ({}), inactivating queue (see `oarnotify`)",
                queue.scheduler_policy, queue.queue_name, failure
            );
            Queue::set_queue_state(session, &queue.queue_name, "notActive")?;
            continue;
        }

        // Retrieve the assignment decisions of the policy and fold them into
        // the slot sets seen by the following queues.
        let scheduled_jobs = get_gantt_scheduled_jobs_for_queue(platform, &queue.queue_name, security_time)?;
        let filter_besteffort = queue.queue_name != "besteffort";
        add_scheduled_jobs_to_slot_sets(&mut slot_sets, platform, &scheduled_jobs, filter_besteffort);

        // Reservation management for this queue.
        handle_waiting_reservation_jobs(platform, &queue.queue_name, now)?;
        check_reservation_jobs(platform, &mut slot_sets, &queue.queue_name, now)?;
    }

    // Global launch/kill decision.
    let (jobs_to_launch, rid_to_jid) = get_gantt_jobs_to_launch(session, now, security_time)?;
    if check_besteffort_jobs_to_kill(platform, &jobs_to_launch, &rid_to_jid, &besteffort_rid_to_job, now)? {
        // Some besteffort jobs must leave first: the launches are deferred to a
        // later iteration and the execution agent rechecks the job states.
        gateway.notify_almighty("ChState");
        exit_code = 2;
    } else {
        handle_jobs_to_launch(platform, &mut gateway, &jobs_to_launch, now, &now_sql)?;
    }

    update_gantt_visualization(session)?;

    node_energy_saving(platform, now)?;

    handle_resuming_jobs(platform, security_time)?;

    notify_interactive_predictions(platform, &gateway, &now_sql)?;

    process_to_error_jobs(platform, &gateway, security_time)?;

    exit_code = process_to_ack_reservation_jobs(platform, &gateway, now, security_time, exit_code)?;

    // Announce again the jobs stuck in toLaunch; the already-notified set makes
    // this idempotent within one process lifetime.
    for job in get_jobs_in_multiple_states(session, &["toLaunch"], security_time)? {
        gateway.notify_to_run_job(job.id);
    }

    debug!("End of Meta Scheduler");
    Ok(exit_code)
}

fn get_gantt_scheduled_jobs_for_queue(
    platform: &Platform,
    queue_name: &str,
    security_time: i64,
) -> Result<Vec<metasched_core::model::job::Job>, Error> {
    metasched_db::model::jobs::get_gantt_scheduled_jobs(
        platform.session(),
        Some(vec![queue_name.to_string()]),
        Some("None"),
        None,
        security_time,
    )
}

/// Resuming jobs whose resources are free again: noop jobs resume in place,
/// real ones are resumed by the execution agent.
fn handle_resuming_jobs(platform: &Platform, security_time: i64) -> Result<(), Error> {
    let session = platform.session();
    for job in get_jobs_in_multiple_states(session, &["Resuming"], security_time)? {
        let other_jobs = get_jobs_on_resuming_job_resources(session, job.id)?;
        if other_jobs.is_empty() {
            debug!("[{}] Resuming job", job.id);
            if job.types.contains_key("noop") {
                resume_job_action(session, job.id)?;
                debug!("[{}] Resume NOOP job OK", job.id);
            }
        } else {
            debug!("[{}] Cannot resume the job, resources are held by {:?}", job.id, other_jobs);
        }
    }
    Ok(())
}

/// Tells the waiting interactive clients when their job is predicted to start.
pub(crate) fn notify_interactive_predictions(platform: &Platform, gateway: &NotifyGateway, now_sql: &str) -> Result<(), Error> {
    for (jid, info_type, start_time, message) in get_gantt_waiting_interactive_prediction_date(platform.session())? {
        let Some((host, port)) = split_info_type(&info_type) else {
            continue;
        };
        let prediction = local_to_sql(start_time);
        debug!("[{}] Notifying user of the start prediction: {} ({})", jid, prediction, message);
        gateway.notify_tcp_socket(host, port, &format!("[{}] Start prediction: {} ({})", now_sql, prediction, message));
    }
    Ok(())
}

/// Moves toError jobs to Error, telling their client first when there is one.
pub(crate) fn process_to_error_jobs(platform: &Platform, gateway: &NotifyGateway, security_time: i64) -> Result<(), Error> {
    let session = platform.session();
    for job in get_jobs_in_multiple_states(session, &["toError"], security_time)? {
        if let Some((host, port)) = job.info_type.as_deref().and_then(split_info_type) {
            if job.kind == JobKind::Interactive || (job.kind == JobKind::Passive && job.reservation == ReservationState::Scheduled) {
                debug!("Notify the client of job {} in error; info_type={}:{}", job.id, host, port);
                let sent_message = gateway.notify_tcp_socket(host, port, &job.message);
                let sent_verdict = gateway.notify_tcp_socket(host, port, "BAD JOB");
                if !sent_message || !sent_verdict {
                    warn!("Cannot open connection to the client of job {}", job.id);
                }
            }
        }
        debug!("Set job {} to state Error", job.id);
        set_job_state(session, job.id, "Error")?;
    }
    Ok(())
}

/// Acknowledges validated reservations to their client. A client that cannot
/// be reached gets its job fragged; an acknowledged reservation whose start
/// time is reached asks the caller for an immediate re-invocation.
pub(crate) fn process_to_ack_reservation_jobs(
    platform: &Platform,
    gateway: &NotifyGateway,
    now: i64,
    security_time: i64,
    mut exit_code: i32,
) -> Result<i32, Error> {
    let session = platform.session();
    for job in get_jobs_in_multiple_states(session, &["toAckReservation"], security_time)? {
        match job.info_type.as_deref().and_then(split_info_type) {
            None => {
                // Nothing to acknowledge over the wire, the submission
                // front-end confirms the reservation on its own.
                debug!("[{}] reservation validated without an interactive client", job.id);
            }
            Some((host, port)) => {
                debug!("Treating job {} in toAckReservation state", job.id);
                if gateway.notify_tcp_socket(host, port, "GOOD RESERVATION") {
                    debug!("Notified the client for the reservation {} --> OK", job.id);
                    set_job_state(session, job.id, "Waiting")?;
                    if (job.start_time - 1) <= now && exit_code == 0 {
                        exit_code = 1;
                    }
                } else {
                    warn!("Frag job {}, cannot notify the client for the reservation", job.id);
                    add_new_event(
                        session,
                        "CANNOT_NOTIFY_OARSUB",
                        job.id,
                        &format!("Can not notify the client for the job {}", job.id),
                    )?;
                    frag_job(session, job.id)?;
                    exit_code = 2;
                }
            }
        }
    }
    Ok(exit_code)
}

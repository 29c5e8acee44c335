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
use crate::tools::rewrite_resource_count;
use log::{debug, warn};
use metasched_core::interval::{RidSet, RidSetOps};
use metasched_core::scheduler::slotset::SlotSet;
use metasched_db::model::events::add_new_event;
use metasched_db::model::gantt::{remove_gantt_resource_job, save_assigns, set_gantt_job_start_time};
use metasched_db::model::jobs::{
    get_waiting_reservations_to_schedule, get_waiting_scheduled_ar_jobs, occupancy_end, set_job_message, set_job_resa_state, set_job_state,
};
use metasched_db::Error;
use std::collections::HashMap;

/// Reconciles the accepted advance reservations of a queue with the current
/// resource state: expired reservations turn into errors, reservations whose
/// resources are missing are delayed within the waiting window, then shrunk to
/// the resources still alive.
pub fn handle_waiting_reservation_jobs(platform: &Platform, queue_name: &str, now: i64) -> Result<(), Error> {
    let session = platform.session();
    let config = &platform.get_platform_config().config;
    let alive_itvs = &platform.get_platform_config().resource_set.alive_itvs;
    let waiting_timeout = config.reservation_waiting_resources_timeout;

    debug!("Queue {}: begin processing of accepted advance reservations", queue_name);

    let ar_jobs = get_waiting_scheduled_ar_jobs(session, queue_name, config.scheduler_job_security_time)?;
    for job in ar_jobs {
        let Some(assignment) = &job.assignment else {
            continue;
        };
        let moldable = &job.moldables[assignment.moldable_index];
        let walltime = moldable.walltime;

        if now > job.start_time + walltime {
            warn!("[{}] set job state to Error: advance reservation expired and couldn't be started", job.id);
            set_job_state(session, job.id, "Error")?;
            set_job_message(session, job.id, "Reservation expired and couldn't be started.")?;
            continue;
        }

        let available = alive_itvs & &assignment.resources;
        if available.is_empty() && job.start_time < now {
            // No resource is present yet, delay the launching time.
            warn!("[{}] advance reservation is waiting because no resource is present", job.id);
            set_gantt_job_start_time(session, moldable.id, now + 1)?;
        } else if job.start_time < now {
            if now <= job.start_time + waiting_timeout {
                if available != assignment.resources {
                    // Some expected resources are not available yet, wait for them
                    // until the waiting window closes.
                    warn!("[{}] advance reservation is waiting because not all resources are available yet", job.id);
                    set_gantt_job_start_time(session, moldable.id, now + 1)?;
                }
            } else {
                // The waiting window elapsed: start without the missing resources.
                let missing_itvs = &assignment.resources - &available;
                remove_gantt_resource_job(session, moldable.id, &missing_itvs)?;
                warn!("[{}] remove some resources assigned to this advance reservation, because they are not Alive", job.id);

                add_new_event(
                    session,
                    "SCHEDULER_REDUCE_NB_RESSOURCES_FOR_ADVANCE_RESERVATION",
                    job.id,
                    &format!("[MetaSched] Reduce the number of resources for the job {}", job.id),
                )?;

                let resource_count = assignment.resources.rid_count() - missing_itvs.rid_count();
                let new_message = rewrite_resource_count(&job.message, resource_count);
                if new_message != job.message {
                    set_job_message(session, job.id, &new_message)?;
                }
            }
        }
    }

    debug!("Queue {}: end processing of reservations with missing resources", queue_name);
    Ok(())
}

/// Validates the new advance reservations of a queue against the live slot
/// set: too-old requests are refused, feasible ones get their resources
/// reserved in the gantt and move to the acknowledgment step.
pub fn check_reservation_jobs(
    platform: &Platform,
    slot_sets: &mut HashMap<Box<str>, SlotSet>,
    queue_name: &str,
    now: i64,
) -> Result<(), Error> {
    let session = platform.session();
    let config = &platform.get_platform_config().config;
    let hierarchy = &platform.get_platform_config().resource_set.hierarchy;
    let security_time = config.scheduler_job_security_time;

    debug!("Queue {}: begin processing of new reservations", queue_name);

    let ar_jobs = get_waiting_reservations_to_schedule(session, queue_name)?;
    let mut scheduled_assignments: Vec<(i64, i64, RidSet)> = Vec::new();

    for (jid, job) in ar_jobs.iter() {
        debug!("Find resources for the advance reservation job {}", jid);

        // A reservation only considers its first moldable alternative.
        let Some(moldable) = job.moldables.first() else {
            warn!("[{}] advance reservation without moldable description, canceling it", jid);
            set_job_state(session, *jid, "toError")?;
            set_job_message(session, *jid, "This advance reservation cannot run")?;
            continue;
        };
        let walltime = moldable.walltime;

        if now >= job.start_time + walltime {
            warn!("[{}] canceling job: reservation is too old", jid);
            set_job_message(session, *jid, "Reservation too old")?;
            set_job_state(session, *jid, "toError")?;
            continue;
        }
        let start_time = job.start_time.max(now);

        let slot_set_name = job.slot_set_name();
        let Some(slot_set) = slot_sets.get(&slot_set_name) else {
            warn!("[{}] advance reservation cannot be validated, slot set {} is missing", jid, slot_set_name);
            set_job_state(session, *jid, "toError")?;
            set_job_message(session, *jid, "This advance reservation cannot run")?;
            continue;
        };

        let end_time = occupancy_end(start_time, walltime, security_time);
        let available_itvs = slot_set.free_itvs_for_job(job, start_time, end_time);
        let itvs = hierarchy.find_resource_hierarchies_job(&available_itvs, &moldable.requests);

        match itvs {
            Some(itvs) if !itvs.is_empty() => {
                debug!("[{}] advance reservation is validated", jid);
                scheduled_assignments.push((moldable.id, start_time, itvs));
                set_job_state(session, *jid, "toAckReservation")?;
                set_job_resa_state(session, *jid, "Scheduled")?;
            }
            _ => {
                warn!("[{}] advance reservation cannot be validated, not enough resources", jid);
                set_job_state(session, *jid, "toError")?;
                set_job_message(session, *jid, "This advance reservation cannot run")?;
            }
        }
    }

    if !scheduled_assignments.is_empty() {
        debug!("Save the reservations' assignments in the database");
        save_assigns(session, scheduled_assignments)?;
    }

    debug!("Queue {}: end processing of new reservations", queue_name);
    Ok(())
}

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

use crate::notify::NotifyGateway;
use crate::platform::Platform;
use crate::tools::rewrite_walltime;
use indexmap::IndexMap;
use log::{debug, warn};
use metasched_core::model::job::{timesharing_compatible, Job, ReservationState};
use metasched_core::times::duration_to_sql;
use metasched_db::model::events::{add_new_event, get_job_events};
use metasched_db::model::gantt::set_gantt_job_start_time;
use metasched_db::model::jobs::{frag_job, prepare_job_to_be_launched, set_job_message};
use metasched_db::model::moldable::set_moldable_job_max_time;
use metasched_db::Error;
use std::collections::{HashMap, HashSet};

/// Resolves the conflicts between the jobs to launch and the besteffort jobs
/// occupying their resources. Timesharing-compatible pairs coexist; otherwise
/// the besteffort job is given a checkpoint grace or a termination request.
/// Returns true if at least one besteffort job was signaled: the caller must
/// then defer the launches to a later iteration.
pub fn check_besteffort_jobs_to_kill(
    platform: &Platform,
    jobs_to_launch: &IndexMap<i64, Job>,
    rid_to_launch_jid: &HashMap<u32, i64>,
    besteffort_rid_to_job: &HashMap<u32, Job>,
    now: i64,
) -> Result<bool, Error> {
    let session = platform.session();
    let mut conflict = false;
    let mut treated_jobs: HashSet<i64> = HashSet::new();

    debug!("Begin processing of besteffort jobs to kill");

    // Sorted iteration keeps the event order reproducible.
    let mut required_rids: Vec<u32> = rid_to_launch_jid.keys().copied().collect();
    required_rids.sort_unstable();
    for rid in required_rids {
        let Some(besteffort_job) = besteffort_rid_to_job.get(&rid) else {
            continue;
        };
        let jid = &rid_to_launch_jid[&rid];
        let job_to_launch = &jobs_to_launch[jid];

        if timesharing_compatible(besteffort_job, job_to_launch) {
            debug!(
                "Resource {} is needed for job {}, but besteffort job {} can live, because timesharing compatible",
                rid, jid, besteffort_job.id
            );
            continue;
        }
        if !treated_jobs.insert(besteffort_job.id) {
            continue;
        }
        conflict = true;

        // A besteffort job with checkpointing enabled gets a checkpoint signal
        // first, unless it was already signaled within its grace window.
        let mut skip_kill = false;
        if besteffort_job.checkpoint > 0 {
            let last_checkpoint_date = get_job_events(session, besteffort_job.id)?
                .iter()
                .filter(|event| event.ev_type == "CHECKPOINT")
                .map(|event| event.date)
                .max();
            skip_kill = match last_checkpoint_date {
                None => true,
                Some(date) => now - date > besteffort_job.checkpoint,
            };
        }

        if skip_kill {
            debug!("Send checkpoint signal to the job {}", besteffort_job.id);
            send_checkpoint_signal(platform, besteffort_job)?;
        } else {
            debug!(
                "Resource {} needs to be freed for job {}: killing besteffort job {}",
                rid, jid, besteffort_job.id
            );
            add_new_event(
                session,
                "BESTEFFORT_KILL",
                besteffort_job.id,
                &format!("kill the besteffort job {}", besteffort_job.id),
            )?;
            frag_job(session, besteffort_job.id)?;
        }
    }

    debug!("End processing of besteffort jobs to kill");
    Ok(conflict)
}

/// Records the checkpoint request; the execution agent delivers the signal.
fn send_checkpoint_signal(platform: &Platform, job: &Job) -> Result<(), Error> {
    add_new_event(
        platform.session(),
        "CHECKPOINT",
        job.id,
        &format!("Checkpoint signal was sent to the job {}", job.id),
    )
}

/// Launches the jobs whose predicted start time is reached: fixes their start
/// time and resources, moves them to toLaunch, and announces them to the
/// execution agent. An advance reservation starting late first loses the
/// elapsed part of its walltime.
pub fn handle_jobs_to_launch(
    platform: &Platform,
    gateway: &mut NotifyGateway,
    jobs_to_launch: &IndexMap<i64, Job>,
    now: i64,
    now_sql: &str,
) -> Result<bool, Error> {
    let session = platform.session();
    debug!("Begin processing of jobs to launch (start time <= {})", now_sql);

    for (jid, job) in jobs_to_launch.iter() {
        debug!("Set job {} state to toLaunch at {}", jid, now_sql);
        let Some(assignment) = &job.assignment else {
            continue;
        };
        let moldable = &job.moldables[assignment.moldable_index];

        // An advance reservation started late runs on a shrunk walltime.
        if job.reservation == ReservationState::Scheduled && job.start_time < now {
            let walltime = moldable.walltime;
            let max_time = walltime - (now - job.start_time);

            set_moldable_job_max_time(session, moldable.id, max_time)?;
            set_gantt_job_start_time(session, moldable.id, now)?;
            warn!("Reduce walltime of job {} to {} (was {})", jid, max_time, walltime);

            add_new_event(
                session,
                "REDUCE_RESERVATION_WALLTIME",
                *jid,
                &format!("Change walltime from {} to {}", walltime, max_time),
            )?;

            let new_message = rewrite_walltime(&job.message, &duration_to_sql(max_time));
            if new_message != job.message {
                set_job_message(session, *jid, &new_message)?;
            }
        }

        prepare_job_to_be_launched(session, *jid, moldable.id, now)?;
        gateway.notify_to_run_job(*jid);
    }

    debug!("End processing of jobs to launch");
    Ok(!jobs_to_launch.is_empty())
}

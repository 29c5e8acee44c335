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

use log::{debug, error};
use metasched_core::interval::RidSet;
use metasched_core::model::configuration::Configuration;
use metasched_core::model::job::{Job, JobAssignment};
use metasched_core::platform::PlatformConfig;
use metasched_core::scheduler::slotset::{feed_container_slot_set, SlotSet};
use metasched_db::model::gantt::{gantt_flush_tables, save_assigns};
use metasched_db::model::jobs::{get_gantt_scheduled_jobs, get_jobs_in_multiple_states};
use metasched_db::{Error, Session};
use std::collections::HashMap;
use std::rc::Rc;

pub struct Platform {
    now: i64,
    max_time: i64,
    session: Session,
    platform_config: Rc<PlatformConfig>,
}

impl Platform {
    pub fn from_database(mut session: Session, config: Configuration) -> Self {
        let now = session.get_now();
        let resource_set = session.get_resource_set(&config);
        Platform {
            now,
            max_time: 2i64.pow(31),
            session,
            platform_config: Rc::new(PlatformConfig { resource_set, config }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
    pub fn get_now(&self) -> i64 {
        self.now
    }
    pub fn get_max_time(&self) -> i64 {
        self.max_time
    }
    pub fn get_platform_config(&self) -> &Rc<PlatformConfig> {
        &self.platform_config
    }
    pub fn security_time(&self) -> i64 {
        self.platform_config.config.scheduler_job_security_time
    }
}

/// Initializes the gantt tables and the slot-set calendar for one iteration:
/// flushes stale gantt entries (accepted reservations survive), re-saves the
/// assignments of currently running and launching jobs, and builds the default
/// slot set covering `[now, max_time]` with resource availability windows and
/// already-placed jobs integrated.
/// Returns the slot sets and the map of rids held by scheduled besteffort jobs.
pub fn gantt_init_with_running_jobs(platform: &Platform) -> Result<(HashMap<Box<str>, SlotSet>, HashMap<u32, Job>), Error> {
    let session = platform.session();
    let security_time = platform.security_time();
    let resource_set = &platform.get_platform_config().resource_set;

    debug!("Gantt initialization: keep accepted reservations, re-save current jobs");
    gantt_flush_tables(session)?;

    let current_jobs = get_jobs_in_multiple_states(
        session,
        &["Running", "toLaunch", "Launching", "Finishing", "Suspended", "Resuming"],
        security_time,
    )?;
    let assignments = current_jobs
        .iter()
        .filter_map(|job| {
            job.assignment
                .as_ref()
                .map(|a| (job.moldables[a.moldable_index].id, a.begin, a.resources.clone()))
        })
        .collect::<Vec<(i64, i64, RidSet)>>();
    save_assigns(session, assignments)?;

    // Initial slot: all usable resources over [now, max_time], minus the
    // windows where resources become unavailable.
    let mut initial_slot_set = SlotSet::new(resource_set.default_itvs.clone(), platform.get_now(), platform.get_max_time());
    apply_availability_windows(platform.get_max_time(), &resource_set.available_upto, &mut initial_slot_set);

    let mut slot_sets: HashMap<Box<str>, SlotSet> = HashMap::from([(Box::from("default"), initial_slot_set)]);

    // Jobs already holding a gantt entry: running jobs just re-saved, accepted
    // reservations, and jobs placed by higher priority queues in past iterations.
    let scheduled_jobs = get_gantt_scheduled_jobs(session, None, None, None, security_time)?;

    // Rids held by scheduled besteffort jobs: candidates for preemption.
    let mut besteffort_rid_to_job: HashMap<u32, Job> = HashMap::new();
    for job in &scheduled_jobs {
        if job.is_besteffort() {
            if let Some(assignment) = &job.assignment {
                for rid in assignment.resources.iter() {
                    besteffort_rid_to_job.insert(rid, job.clone());
                }
            }
        }
    }

    add_scheduled_jobs_to_slot_sets(&mut slot_sets, platform, &scheduled_jobs, true);

    Ok((slot_sets, besteffort_rid_to_job))
}

/// Resources with an `available_upto` bound stop being offered after it:
/// each bound becomes an occupied window running to the end of the calendar.
fn apply_availability_windows(max_time: i64, available_upto: &[(i64, RidSet)], slot_set: &mut SlotSet) {
    let mut windows: Vec<&(i64, RidSet)> = available_upto.iter().filter(|(time, _)| *time < max_time).collect();
    windows.sort_by_key(|(time, _)| *time);
    for (time, itvs) in windows {
        slot_set.occupy_window(time + 1, max_time, itvs);
    }
}

/// Places the scheduled jobs' assignments on their slot sets, in start time
/// order. Besteffort jobs are left out when `filter_besteffort` is set: they
/// are invisible to the placement of regular jobs and killed on conflict.
/// Suspended jobs only hold their non-suspendable resources. Container jobs
/// additionally feed their derived slot set.
pub fn add_scheduled_jobs_to_slot_sets(
    slot_sets: &mut HashMap<Box<str>, SlotSet>,
    platform: &Platform,
    jobs: &Vec<Job>,
    filter_besteffort: bool,
) {
    let security_time = platform.security_time();
    let suspendable_itvs = &platform.get_platform_config().resource_set.suspendable_itvs;

    let mut scheduled: Vec<&Job> = jobs.iter().filter(|j| j.assignment.is_some()).collect();
    if filter_besteffort {
        scheduled.retain(|j| !j.is_besteffort());
    }
    scheduled.sort_by_key(|j| j.begin().unwrap());

    for job in &scheduled {
        let slot_set_name = job.slot_set_name();
        let Some(slot_set) = slot_sets.get_mut(&slot_set_name) else {
            error!("Job {} can't be placed, slot set {} is missing. Skip it for this round.", job.id, slot_set_name);
            continue;
        };
        if job.state.as_ref() == "Suspended" && !suspendable_itvs.is_empty() {
            // A suspended job releases the resources of the suspendable types.
            let assignment = job.assignment.as_ref().unwrap();
            let shrunk = Job {
                assignment: Some(JobAssignment::new(
                    assignment.begin,
                    assignment.end,
                    assignment.resources.clone() - suspendable_itvs,
                    assignment.moldable_index,
                )),
                ..(*job).clone()
            };
            slot_set.place_job(&shrunk, None);
        } else {
            slot_set.place_job(job, None);
        }
    }

    for job in &scheduled {
        if job.is_container() {
            feed_container_slot_set(slot_sets, job, security_time);
        }
    }
}

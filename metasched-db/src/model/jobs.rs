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

use crate::model::gantt::{GanttJobsPredictions, GanttJobsResources};
use crate::model::job_types::{AllJobTypes, JobTypes};
use crate::model::moldable::{AssignedResources, JobResourceDescriptions, JobResourceGroups, MoldableJobDescriptions};
use crate::model::moldable::AllJobMoldables;
use crate::{Session, SessionDeleteStatement, SessionInsertStatement, SessionSelectStatement, SessionUpdateStatement};
use indexmap::IndexMap;
use metasched_core::interval::RidSet;
use metasched_core::model::job::{Job, JobAssignment, JobBuilder, JobKind, ReservationState};
use sea_query::{Alias, Expr, ExprTrait, Iden, Query};
use sqlx::any::AnyRow;
use sqlx::{Error, Row};
use std::collections::HashMap;

/// States of jobs holding resources on their assigned moldable.
pub const RUNNING_STATES: [&str; 6] = ["toLaunch", "Launching", "Running", "Resuming", "Finishing", "Suspended"];

// jobs and related tables
#[derive(Iden)]
pub enum Jobs {
    #[iden = "jobs"]
    Table,
    #[iden = "job_id"]
    Id,
    #[iden = "job_name"]
    Name,
    #[iden = "job_type"]
    Type,
    #[iden = "info_type"]
    InfoType,
    #[iden = "state"]
    State,
    #[iden = "reservation"]
    Reservation,
    #[iden = "message"]
    Message,
    #[iden = "job_user"]
    User,
    #[iden = "project"]
    Project,
    #[iden = "queue_name"]
    QueueName,
    #[iden = "properties"]
    Properties,
    #[iden = "launching_directory"]
    LaunchingDirectory,
    #[iden = "submission_time"]
    SubmissionTime,
    #[iden = "start_time"]
    StartTime,
    #[iden = "stop_time"]
    StopTime,
    #[iden = "checkpoint"]
    Checkpoint,
    #[iden = "checkpoint_signal"]
    CheckpointSignal,
    #[iden = "assigned_moldable_job"]
    AssignedMoldableJob,
    #[iden = "suspended"]
    Suspended,
}

#[derive(Iden)]
pub enum JobStateLogs {
    #[iden = "job_state_logs"]
    Table,
    #[iden = "job_state_log_id"]
    Id,
    #[iden = "job_id"]
    JobId,
    #[iden = "job_state"]
    JobState,
    #[iden = "date_start"]
    DateStart,
    #[iden = "date_stop"]
    DateStop,
}

#[derive(Iden)]
pub enum FragJobs {
    #[iden = "frag_jobs"]
    Table,
    #[iden = "frag_id_job"]
    FragIdJob,
    #[iden = "frag_date"]
    FragDate,
    #[iden = "frag_state"]
    FragState,
}

#[derive(Iden)]
pub enum Challenges {
    #[iden = "challenges"]
    Table,
    #[iden = "job_id"]
    JobId,
    #[iden = "challenge"]
    Challenge,
    #[iden = "ssh_private_key"]
    SshPrivateKey,
    #[iden = "ssh_public_key"]
    SshPublicKey,
}

/// Where a job assignment is read from.
#[derive(Clone, Copy)]
enum AssignmentSource {
    /// No assignment is loaded (new reservations, decision phases).
    None,
    /// From the gantt pair: predicted start time and gantt resources.
    Gantt,
    /// From the jobs relation and the `assigned_resources` pairs (launched jobs).
    Assigned,
}

fn base_columns() -> Vec<(Jobs, Jobs)> {
    // (Table, Column) pairs for the shared part of every job load.
    vec![
        (Jobs::Table, Jobs::Id),
        (Jobs::Table, Jobs::Name),
        (Jobs::Table, Jobs::Type),
        (Jobs::Table, Jobs::InfoType),
        (Jobs::Table, Jobs::State),
        (Jobs::Table, Jobs::Reservation),
        (Jobs::Table, Jobs::Message),
        (Jobs::Table, Jobs::User),
        (Jobs::Table, Jobs::Project),
        (Jobs::Table, Jobs::QueueName),
        (Jobs::Table, Jobs::SubmissionTime),
        (Jobs::Table, Jobs::StartTime),
        (Jobs::Table, Jobs::Checkpoint),
        (Jobs::Table, Jobs::AssignedMoldableJob),
    ]
}

/// The inclusive end of a job occupancy window: the security time is removed
/// from the walltime so that adjacent jobs never overlap at the boundary.
pub fn occupancy_end(begin: i64, walltime: i64, security_time: i64) -> i64 {
    begin + Ord::max(walltime - security_time, 1) - 1
}

fn rows_to_moldable_resources(session: &Session, rows: Vec<AnyRow>) -> Result<HashMap<i64, RidSet>, Error> {
    let mut map: HashMap<i64, RidSet> = HashMap::new();
    for row in rows {
        let moldable_id: i64 = row.try_get(0)?;
        let resource_id: i64 = row.try_get(1)?;
        if let Some(rid) = session.rid_for_resource_id(resource_id) {
            map.entry(moldable_id).or_insert_with(RidSet::new).insert(rid);
        }
    }
    Ok(map)
}

/// Batch-loads the gantt resources of the given moldables.
async fn load_gantt_resources(session: &Session, moldable_ids: Vec<i64>) -> Result<HashMap<i64, RidSet>, Error> {
    if moldable_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = Query::select()
        .column(GanttJobsResources::MoldableId)
        .column(GanttJobsResources::ResourceId)
        .from(GanttJobsResources::Table)
        .and_where(Expr::col(GanttJobsResources::MoldableId).is_in(moldable_ids))
        .fetch_all(session)
        .await?;
    rows_to_moldable_resources(session, rows)
}

/// Batch-loads the fixed `assigned_resources` pairs of the given moldables.
async fn load_assigned_resources(session: &Session, moldable_ids: Vec<i64>) -> Result<HashMap<i64, RidSet>, Error> {
    if moldable_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = Query::select()
        .column(AssignedResources::MoldableId)
        .column(AssignedResources::ResourceId)
        .from(AssignedResources::Table)
        .and_where(Expr::col(AssignedResources::MoldableId).is_in(moldable_ids))
        .fetch_all(session)
        .await?;
    rows_to_moldable_resources(session, rows)
}

async fn build_jobs_from_rows(
    session: &Session,
    rows: Vec<AnyRow>,
    source: AssignmentSource,
    security_time: i64,
) -> Result<IndexMap<i64, Job>, Error> {
    let job_ids = rows.iter().map(|r| r.get::<i64, &str>("job_id")).collect::<Vec<i64>>();

    let jobs_types = AllJobTypes::load_types_for_jobs(session, job_ids.clone()).await?;
    let jobs_moldables = AllJobMoldables::load_moldables_for_jobs(session, job_ids).await?;

    // Batch-load the resources of the moldables involved in assignments.
    let assigned_moldable_ids = rows
        .iter()
        .filter_map(|r| {
            let id: i64 = match source {
                AssignmentSource::None => return None,
                AssignmentSource::Gantt => r.try_get("gantt_moldable_id").ok()?,
                AssignmentSource::Assigned => r.try_get("assigned_moldable_job").ok()?,
            };
            (id != 0).then_some(id)
        })
        .collect::<Vec<i64>>();
    let moldable_resources = match source {
        AssignmentSource::None => HashMap::new(),
        AssignmentSource::Gantt => load_gantt_resources(session, assigned_moldable_ids).await?,
        AssignmentSource::Assigned => load_assigned_resources(session, assigned_moldable_ids).await?,
    };

    let mut jobs = IndexMap::new();
    for row in rows {
        let id: i64 = row.get("job_id");
        let types = jobs_types.get_job_types(id);
        let moldables = jobs_moldables.get_job_moldables(id);

        let (assignment, start_time) = match source {
            AssignmentSource::None => (None, row.get::<i64, &str>("start_time")),
            AssignmentSource::Gantt => {
                let moldable_id: i64 = row.get("gantt_moldable_id");
                let begin: i64 = row.get("gantt_start_time");
                let assignment = moldables.iter().position(|m| m.id == moldable_id).map(|index| {
                    let end = occupancy_end(begin, moldables[index].walltime, security_time);
                    let resources = moldable_resources.get(&moldable_id).cloned().unwrap_or_default();
                    JobAssignment::new(begin, end, resources, index)
                });
                (assignment, begin)
            }
            AssignmentSource::Assigned => {
                let moldable_id: i64 = row.try_get("assigned_moldable_job").unwrap_or(0);
                let begin: i64 = row.get("start_time");
                let assignment = (moldable_id != 0)
                    .then(|| {
                        moldables.iter().position(|m| m.id == moldable_id).map(|index| {
                            let end = occupancy_end(begin, moldables[index].walltime, security_time);
                            let resources = moldable_resources.get(&moldable_id).cloned().unwrap_or_default();
                            JobAssignment::new(begin, end, resources, index)
                        })
                    })
                    .flatten();
                (assignment, begin)
            }
        };

        let info_type = row
            .try_get::<String, _>("info_type")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_boxed_str());
        let job = JobBuilder::new(id)
            .name_opt(row.try_get("job_name").ok().filter(|s: &String| !s.is_empty()).map(|s| s.into_boxed_str()))
            .user_opt(row.try_get("job_user").map(|s: String| s.into_boxed_str()).ok())
            .project_opt(row.try_get("project").map(|s: String| s.into_boxed_str()).ok())
            .kind(JobKind::from_db(row.get::<String, &str>("job_type").as_str()))
            .state(row.get::<String, &str>("state").into_boxed_str())
            .reservation(ReservationState::from_db(row.get::<String, &str>("reservation").as_str()))
            .queue(row.get::<String, &str>("queue_name").into_boxed_str())
            .types(types)
            .moldables(moldables)
            .assign_opt(assignment)
            .start_time(start_time)
            .submission_time(row.try_get("submission_time").unwrap_or(0))
            .checkpoint(row.try_get("checkpoint").unwrap_or(0))
            .info_type_opt(info_type)
            .message(row.try_get("message").unwrap_or_default())
            .build();
        jobs.insert(id, job);
    }
    Ok(jobs)
}

/// Jobs in any of the given states, with their assignment read from the
/// `assigned_resources` pairs when present.
pub fn get_jobs_in_multiple_states(session: &Session, states: &[&str], security_time: i64) -> Result<Vec<Job>, Error> {
    let jobs = session.runtime.block_on(async {
        let rows = Query::select()
            .columns(base_columns())
            .from(Jobs::Table)
            .and_where(Expr::col(Jobs::State).is_in(states.iter().map(|s| *s)))
            .order_by(Jobs::Id, sea_query::Order::Asc)
            .fetch_all(session)
            .await?;
        build_jobs_from_rows(session, rows, AssignmentSource::Assigned, security_time).await
    })?;
    Ok(jobs.into_values().collect())
}

fn gantt_join_select(queues: Option<Vec<String>>, reservation: Option<&str>, states: Option<Vec<&str>>) -> sea_query::SelectStatement {
    Query::select()
        .columns(base_columns())
        .expr_as(
            Expr::col((GanttJobsPredictions::Table, GanttJobsPredictions::StartTime)),
            Alias::new("gantt_start_time"),
        )
        .expr_as(
            Expr::col((MoldableJobDescriptions::Table, MoldableJobDescriptions::Id)),
            Alias::new("gantt_moldable_id"),
        )
        .from(Jobs::Table)
        .inner_join(
            MoldableJobDescriptions::Table,
            Expr::col((MoldableJobDescriptions::Table, MoldableJobDescriptions::JobId)).equals((Jobs::Table, Jobs::Id)),
        )
        .inner_join(
            GanttJobsPredictions::Table,
            Expr::col((GanttJobsPredictions::Table, GanttJobsPredictions::MoldableId))
                .equals((MoldableJobDescriptions::Table, MoldableJobDescriptions::Id)),
        )
        .apply_if(queues, |req, queues| {
            req.and_where(Expr::col((Jobs::Table, Jobs::QueueName)).is_in(queues));
        })
        .apply_if(reservation, |req, reservation| {
            req.and_where(Expr::col((Jobs::Table, Jobs::Reservation)).eq(reservation));
        })
        .apply_if(states, |req, states| {
            req.and_where(Expr::col((Jobs::Table, Jobs::State)).is_in(states));
        })
        .order_by(Alias::new("gantt_start_time"), sea_query::Order::Asc)
        .order_by((Jobs::Table, Jobs::Id), sea_query::Order::Asc)
        .take()
}

/// All jobs holding a gantt entry: running and launching jobs re-saved at
/// initialization, accepted reservations, and jobs placed by the policies.
pub fn get_gantt_scheduled_jobs(
    session: &Session,
    queues: Option<Vec<String>>,
    reservation: Option<&str>,
    states: Option<Vec<&str>>,
    security_time: i64,
) -> Result<Vec<Job>, Error> {
    let jobs = session.runtime.block_on(async {
        let rows = gantt_join_select(queues, reservation, states).fetch_all(session).await?;
        build_jobs_from_rows(session, rows, AssignmentSource::Gantt, security_time).await
    })?;
    Ok(jobs.into_values().collect())
}

/// Accepted advance reservations of one queue still waiting to start.
pub fn get_waiting_scheduled_ar_jobs(session: &Session, queue: &str, security_time: i64) -> Result<Vec<Job>, Error> {
    get_gantt_scheduled_jobs(
        session,
        Some(vec![queue.to_string()]),
        Some("Scheduled"),
        Some(vec!["Waiting", "toAckReservation"]),
        security_time,
    )
}

/// New advance reservations of one queue awaiting validation.
pub fn get_waiting_reservations_to_schedule(session: &Session, queue: &str) -> Result<IndexMap<i64, Job>, Error> {
    session.runtime.block_on(async {
        let rows = Query::select()
            .columns(base_columns())
            .from(Jobs::Table)
            .and_where(Expr::col(Jobs::QueueName).eq(queue))
            .and_where(Expr::col(Jobs::State).eq("Waiting"))
            .and_where(Expr::col(Jobs::Reservation).eq("toSchedule"))
            .order_by(Jobs::Id, sea_query::Order::Asc)
            .fetch_all(session)
            .await?;
        build_jobs_from_rows(session, rows, AssignmentSource::None, 0).await
    })
}

/// Gantt-scheduled jobs that must start now (`start_time <= now`, still in the
/// Waiting state), and the map of each required rid to its job id. The cutoff
/// is `now` so that a reservation delayed to `now + 1` waits for the next
/// iteration instead of starting without its resources.
pub fn get_gantt_jobs_to_launch(
    session: &Session,
    now: i64,
    security_time: i64,
) -> Result<(IndexMap<i64, Job>, HashMap<u32, i64>), Error> {
    let jobs = session.runtime.block_on(async {
        let rows = gantt_join_select(None, None, Some(vec!["Waiting"]))
            .and_where(Expr::col((GanttJobsPredictions::Table, GanttJobsPredictions::StartTime)).lte(now))
            .fetch_all(session)
            .await?;
        build_jobs_from_rows(session, rows, AssignmentSource::Gantt, security_time).await
    })?;

    let mut rid_to_jid = HashMap::new();
    for (jid, job) in jobs.iter() {
        if let Some(assignment) = &job.assignment {
            for rid in assignment.resources.iter() {
                rid_to_jid.insert(rid, *jid);
            }
        }
    }
    Ok((jobs, rid_to_jid))
}

/// Updates a job state and maintains the `job_state_logs` bookkeeping.
pub fn set_job_state(session: &Session, job_id: i64, state: &str) -> Result<(), Error> {
    let now = session.get_now();
    session.runtime.block_on(async {
        let mut tx = session.begin().await?;
        Query::update()
            .table(Jobs::Table)
            .value(Jobs::State, state)
            .and_where(Expr::col(Jobs::Id).eq(job_id))
            .execute_tx(session, &mut tx)
            .await?;
        Query::update()
            .table(JobStateLogs::Table)
            .value(JobStateLogs::DateStop, now)
            .and_where(Expr::col(JobStateLogs::JobId).eq(job_id))
            .and_where(Expr::col(JobStateLogs::DateStop).eq(0))
            .execute_tx(session, &mut tx)
            .await?;
        Query::insert()
            .into_table(JobStateLogs::Table)
            .columns(vec![JobStateLogs::JobId, JobStateLogs::JobState, JobStateLogs::DateStart])
            .values_panic(vec![job_id.into(), state.into(), now.into()])
            .execute_tx(session, &mut tx)
            .await?;
        tx.commit().await
    })
}

pub fn set_job_message(session: &Session, job_id: i64, message: &str) -> Result<(), Error> {
    session.runtime.block_on(async {
        Query::update()
            .table(Jobs::Table)
            .value(Jobs::Message, message)
            .and_where(Expr::col(Jobs::Id).eq(job_id))
            .execute(session)
            .await
    })?;
    Ok(())
}

pub fn set_job_resa_state(session: &Session, job_id: i64, reservation: &str) -> Result<(), Error> {
    session.runtime.block_on(async {
        Query::update()
            .table(Jobs::Table)
            .value(Jobs::Reservation, reservation)
            .and_where(Expr::col(Jobs::Id).eq(job_id))
            .execute(session)
            .await
    })?;
    Ok(())
}

/// Current `(state, reservation, message)` of a job.
pub fn get_job_state_info(session: &Session, job_id: i64) -> Result<(String, String, String), Error> {
    let row = session.runtime.block_on(async {
        Query::select()
            .columns(vec![Jobs::State, Jobs::Reservation, Jobs::Message])
            .from(Jobs::Table)
            .and_where(Expr::col(Jobs::Id).eq(job_id))
            .fetch_one(session)
            .await
    })?;
    Ok((row.try_get("state")?, row.try_get("reservation")?, row.try_get("message")?))
}

/// Date of the termination request of a job, if one was issued.
pub fn get_frag_date(session: &Session, job_id: i64) -> Result<Option<i64>, Error> {
    let row = session.runtime.block_on(async {
        Query::select()
            .column(FragJobs::FragDate)
            .from(FragJobs::Table)
            .and_where(Expr::col(FragJobs::FragIdJob).eq(job_id))
            .fetch_optional(session)
            .await
    })?;
    row.map(|r| r.try_get("frag_date")).transpose()
}

/// Durable request that a job terminate, picked up by the execution agent.
/// A job already requested to terminate is left untouched.
pub fn frag_job(session: &Session, job_id: i64) -> Result<(), Error> {
    if get_frag_date(session, job_id)?.is_some() {
        return Ok(());
    }
    let now = session.get_now();
    session.runtime.block_on(async {
        Query::insert()
            .into_table(FragJobs::Table)
            .columns(vec![FragJobs::FragIdJob, FragJobs::FragDate, FragJobs::FragState])
            .values_panic(vec![job_id.into(), now.into(), "LEON".into()])
            .execute(session)
            .await
    })?;
    Ok(())
}

/// Launch transition, one transaction: fixes the start time and the chosen
/// moldable, copies the gantt resources into `assigned_resources`, and moves
/// the job to the toLaunch state.
pub fn prepare_job_to_be_launched(session: &Session, job_id: i64, moldable_id: i64, now: i64) -> Result<(), Error> {
    session.runtime.block_on(async {
        // The resource decision comes from the gantt, read before opening the
        // transaction (the pool holds a single connection).
        let gantt_rows = Query::select()
            .column(GanttJobsResources::ResourceId)
            .from(GanttJobsResources::Table)
            .and_where(Expr::col(GanttJobsResources::MoldableId).eq(moldable_id))
            .fetch_all(session)
            .await?;

        let mut tx = session.begin().await?;
        Query::update()
            .table(Jobs::Table)
            .value(Jobs::StartTime, now)
            .value(Jobs::AssignedMoldableJob, moldable_id)
            .value(Jobs::State, "toLaunch")
            .and_where(Expr::col(Jobs::Id).eq(job_id))
            .execute_tx(session, &mut tx)
            .await?;

        // Fix the resource assignment from the gantt decision.
        for row in gantt_rows {
            let resource_id: i64 = row.try_get(0)?;
            Query::insert()
                .into_table(AssignedResources::Table)
                .columns(vec![AssignedResources::MoldableId, AssignedResources::ResourceId])
                .values_panic(vec![moldable_id.into(), resource_id.into()])
                .execute_tx(session, &mut tx)
                .await?;
        }

        Query::update()
            .table(JobStateLogs::Table)
            .value(JobStateLogs::DateStop, now)
            .and_where(Expr::col(JobStateLogs::JobId).eq(job_id))
            .and_where(Expr::col(JobStateLogs::DateStop).eq(0))
            .execute_tx(session, &mut tx)
            .await?;
        Query::insert()
            .into_table(JobStateLogs::Table)
            .columns(vec![JobStateLogs::JobId, JobStateLogs::JobState, JobStateLogs::DateStart])
            .values_panic(vec![job_id.into(), "toLaunch".into(), now.into()])
            .execute_tx(session, &mut tx)
            .await?;
        tx.commit().await
    })
}

/// Resumes a noop job in place: `Resuming -> Running`.
pub fn resume_job_action(session: &Session, job_id: i64) -> Result<(), Error> {
    set_job_state(session, job_id, "Running")?;
    session.runtime.block_on(async {
        Query::update()
            .table(Jobs::Table)
            .value(Jobs::Suspended, "NO")
            .and_where(Expr::col(Jobs::Id).eq(job_id))
            .execute(session)
            .await
    })?;
    Ok(())
}

/// Ids of the active jobs holding resources of the given resuming job.
pub fn get_jobs_on_resuming_job_resources(session: &Session, job_id: i64) -> Result<Vec<i64>, Error> {
    session.runtime.block_on(async {
        let resource_rows = Query::select()
            .column((AssignedResources::Table, AssignedResources::ResourceId))
            .from(AssignedResources::Table)
            .inner_join(
                Jobs::Table,
                Expr::col((Jobs::Table, Jobs::AssignedMoldableJob)).equals((AssignedResources::Table, AssignedResources::MoldableId)),
            )
            .and_where(Expr::col((Jobs::Table, Jobs::Id)).eq(job_id))
            .fetch_all(session)
            .await?;
        let resource_ids: Vec<i64> = resource_rows
            .iter()
            .map(|row| row.try_get(0))
            .collect::<Result<Vec<i64>, Error>>()?;
        if resource_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = Query::select()
            .distinct()
            .column((Jobs::Table, Jobs::Id))
            .from(Jobs::Table)
            .inner_join(
                AssignedResources::Table,
                Expr::col((AssignedResources::Table, AssignedResources::MoldableId)).equals((Jobs::Table, Jobs::AssignedMoldableJob)),
            )
            .and_where(Expr::col((AssignedResources::Table, AssignedResources::ResourceId)).is_in(resource_ids))
            .and_where(Expr::col((Jobs::Table, Jobs::Id)).ne(job_id))
            .and_where(Expr::col((Jobs::Table, Jobs::State)).is_in(["toLaunch", "Launching", "Running", "Finishing"]))
            .fetch_all(session)
            .await?;
        rows.iter().map(|row| row.try_get(0)).collect()
    })
}

pub struct NewJob {
    pub user: Option<String>, // jobs.job_user
    pub name: Option<String>,
    pub queue_name: String,
    /// res = [(walltime, [("res_hierarchy", "properties_sql"), ...]), ...]
    pub res: Vec<(i64, Vec<(String, String)>)>,
    pub types: Vec<String>,
    pub kind: String,
    pub state: String,
    pub reservation: String,
    pub start_time: i64,
    pub checkpoint: i64,
    pub info_type: Option<String>,
    pub message: String,
}

impl Default for NewJob {
    fn default() -> Self {
        NewJob {
            user: None,
            name: None,
            queue_name: "default".to_string(),
            res: vec![],
            types: vec![],
            kind: "PASSIVE".to_string(),
            state: "Waiting".to_string(),
            reservation: "None".to_string(),
            start_time: 0,
            checkpoint: 0,
            info_type: None,
            message: String::new(),
        }
    }
}

impl NewJob {
    pub fn insert(&self, session: &Session) -> Result<(i64, Vec<i64>), Error> {
        session.runtime.block_on(async { self.insert_async(session).await })
    }
    /// Big unstructured piece of code since it should only be used by tests and tools.
    /// Returns the job id and the created moldable ids.
    async fn insert_async(&self, session: &Session) -> Result<(i64, Vec<i64>), Error> {
        let job_user = self.user.clone().unwrap_or_else(|| "".to_string());

        // Insert job
        let row = Query::insert()
            .into_table(Jobs::Table)
            .columns(vec![
                Jobs::Name,
                Jobs::User,
                Jobs::QueueName,
                Jobs::Type,
                Jobs::State,
                Jobs::Reservation,
                Jobs::StartTime,
                Jobs::Checkpoint,
                Jobs::InfoType,
                Jobs::Message,
            ])
            .values_panic(vec![
                Expr::val(self.name.clone()),
                Expr::val(&job_user),
                Expr::val(&self.queue_name),
                Expr::val(&self.kind),
                Expr::val(&self.state),
                Expr::val(&self.reservation),
                Expr::val(self.start_time),
                Expr::val(self.checkpoint),
                Expr::val(self.info_type.clone()),
                Expr::val(&self.message),
            ])
            .returning_col(Jobs::Id)
            .fetch_one(session)
            .await?;
        let job_id: i64 = row.try_get(0)?;

        // For each moldable description
        let mut created_moldable_ids: Vec<i64> = Vec::new();
        for (walltime, groups) in self.res.iter() {
            // Insert moldable_job_descriptions
            let mld_row = Query::insert()
                .into_table(MoldableJobDescriptions::Table)
                .columns(vec![MoldableJobDescriptions::JobId, MoldableJobDescriptions::Walltime])
                .values_panic(vec![Expr::val(job_id), Expr::val(*walltime)])
                .returning_col(MoldableJobDescriptions::Id)
                .fetch_one(session)
                .await?;
            let moldable_id: i64 = mld_row.try_get(0)?;
            created_moldable_ids.push(moldable_id);

            // Insert job_resource_groups for each group
            for (res_hierarchy, prop_sql) in groups.iter() {
                let grp_row = Query::insert()
                    .into_table(JobResourceGroups::Table)
                    .columns(vec![JobResourceGroups::MoldableId, JobResourceGroups::Property])
                    .values_panic(vec![Expr::val(moldable_id), Expr::val(prop_sql)])
                    .returning_col(JobResourceGroups::Id)
                    .fetch_one(session)
                    .await?;
                let group_id: i64 = grp_row.try_get(0)?;

                // job_resource_descriptions for each k=v in order
                for (idx, kv) in res_hierarchy.split('/').enumerate() {
                    if kv.trim().is_empty() {
                        continue;
                    }
                    let mut it = kv.splitn(2, '=');
                    let k = it.next().unwrap_or("");
                    let v = it.next().unwrap_or("");
                    Query::insert()
                        .into_table(JobResourceDescriptions::Table)
                        .columns(vec![
                            JobResourceDescriptions::GroupId,
                            JobResourceDescriptions::ResourceType,
                            JobResourceDescriptions::Value,
                            JobResourceDescriptions::Order,
                        ])
                        .values_panic(vec![
                            Expr::val(group_id),
                            Expr::val(k),
                            match v.parse::<i64>() {
                                Ok(i) => Expr::val(i),
                                Err(_) => Expr::val(0),
                            },
                            Expr::val(idx as i64),
                        ])
                        .execute(session)
                        .await?;
                }
            }
        }

        // job_types
        for typ in self.types.iter() {
            Query::insert()
                .into_table(JobTypes::Table)
                .columns(vec![JobTypes::JobId, JobTypes::Type])
                .values_panic(vec![Expr::val(job_id), Expr::val(typ)])
                .execute(session)
                .await?;
        }

        Ok((job_id, created_moldable_ids))
    }
}

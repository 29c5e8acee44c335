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

use crate::model::jobs::Jobs;
use crate::model::moldable::MoldableJobDescriptions;
use crate::{Session, SessionDeleteStatement, SessionInsertStatement, SessionSelectStatement, SessionUpdateStatement};
use metasched_core::interval::RidSet;
use sea_query::{Expr, ExprTrait, Iden, Query};
use sqlx::{Error, Row};

#[derive(Iden)]
pub enum GanttJobsResources {
    #[iden = "gantt_jobs_resources"]
    Table,
    #[iden = "moldable_job_id"]
    MoldableId,
    #[iden = "resource_id"]
    ResourceId,
}

#[derive(Iden)]
pub enum GanttJobsPredictions {
    #[iden = "gantt_jobs_predictions"]
    Table,
    #[iden = "moldable_job_id"]
    MoldableId,
    #[iden = "start_time"]
    StartTime,
}

#[derive(Iden)]
enum GanttJobsResourcesVisu {
    #[iden = "gantt_jobs_resources_visu"]
    Table,
}

#[derive(Iden)]
enum GanttJobsPredictionsVisu {
    #[iden = "gantt_jobs_predictions_visu"]
    Table,
}

/// Removes all entries of the gantt tables except the moldables of accepted
/// advance reservations (reservation `Scheduled`, job state `Waiting` or
/// `toAckReservation`), whose assignment must survive between iterations.
pub fn gantt_flush_tables(session: &Session) -> Result<(), Error> {
    session.runtime.block_on(async {
        let to_keep_moldable_ids = Query::select()
            .column((MoldableJobDescriptions::Table, MoldableJobDescriptions::Id))
            .from(MoldableJobDescriptions::Table)
            .inner_join(
                Jobs::Table,
                Expr::col((Jobs::Table, Jobs::Id)).equals((MoldableJobDescriptions::Table, MoldableJobDescriptions::JobId)),
            )
            .and_where(Expr::col((Jobs::Table, Jobs::State)).is_in(["Waiting", "toAckReservation"]))
            .and_where(Expr::col((Jobs::Table, Jobs::Reservation)).eq("Scheduled"))
            .take();

        Query::delete()
            .from_table(GanttJobsPredictions::Table)
            .cond_where(Expr::col(GanttJobsPredictions::MoldableId).not_in_subquery(to_keep_moldable_ids.clone()))
            .to_owned()
            .execute(session)
            .await?;

        Query::delete()
            .from_table(GanttJobsResources::Table)
            .cond_where(Expr::col(GanttJobsResources::MoldableId).not_in_subquery(to_keep_moldable_ids))
            .to_owned()
            .execute(session)
            .await?;
        Ok(())
    })
}

/// Persists assignments in the gantt tables, one transaction for the whole batch:
/// `(moldable_id, start_time, resources)` triples become a prediction row and
/// one resource row per assigned rid.
pub fn save_assigns(session: &Session, assignments: Vec<(i64, i64, RidSet)>) -> Result<(), Error> {
    if assignments.is_empty() {
        return Ok(());
    }
    session.runtime.block_on(async {
        let mut tx = session.begin().await?;
        for (moldable_id, start_time, resources) in assignments {
            Query::delete()
                .from_table(GanttJobsPredictions::Table)
                .and_where(Expr::col(GanttJobsPredictions::MoldableId).eq(moldable_id))
                .to_owned()
                .execute_tx(session, &mut tx)
                .await?;
            Query::delete()
                .from_table(GanttJobsResources::Table)
                .and_where(Expr::col(GanttJobsResources::MoldableId).eq(moldable_id))
                .to_owned()
                .execute_tx(session, &mut tx)
                .await?;
            Query::insert()
                .into_table(GanttJobsPredictions::Table)
                .columns(vec![GanttJobsPredictions::MoldableId, GanttJobsPredictions::StartTime])
                .values_panic(vec![moldable_id.into(), start_time.into()])
                .execute_tx(session, &mut tx)
                .await?;
            for resource_id in session.rids_to_resource_ids(&resources) {
                Query::insert()
                    .into_table(GanttJobsResources::Table)
                    .columns(vec![GanttJobsResources::MoldableId, GanttJobsResources::ResourceId])
                    .values_panic(vec![moldable_id.into(), resource_id.into()])
                    .execute_tx(session, &mut tx)
                    .await?;
            }
        }
        tx.commit().await
    })
}

/// Database resource ids held by a scheduled moldable in the gantt.
pub fn get_gantt_moldable_resources(session: &Session, moldable_id: i64) -> Result<Vec<i64>, Error> {
    let rows = session.runtime.block_on(async {
        Query::select()
            .column(GanttJobsResources::ResourceId)
            .from(GanttJobsResources::Table)
            .and_where(Expr::col(GanttJobsResources::MoldableId).eq(moldable_id))
            .order_by(GanttJobsResources::ResourceId, sea_query::Order::Asc)
            .fetch_all(session)
            .await
    })?;
    rows.iter().map(|row| row.try_get(0)).collect()
}

/// Predicted start time of a scheduled moldable, if present in the gantt.
pub fn get_gantt_job_start_time(session: &Session, moldable_id: i64) -> Result<Option<i64>, Error> {
    let row = session.runtime.block_on(async {
        Query::select()
            .column(GanttJobsPredictions::StartTime)
            .from(GanttJobsPredictions::Table)
            .and_where(Expr::col(GanttJobsPredictions::MoldableId).eq(moldable_id))
            .fetch_optional(session)
            .await
    })?;
    row.map(|r| r.try_get("start_time")).transpose()
}

/// Moves the predicted start time of a scheduled moldable (reservation delays).
pub fn set_gantt_job_start_time(session: &Session, moldable_id: i64, start_time: i64) -> Result<(), Error> {
    session.runtime.block_on(async {
        Query::update()
            .table(GanttJobsPredictions::Table)
            .value(GanttJobsPredictions::StartTime, start_time)
            .and_where(Expr::col(GanttJobsPredictions::MoldableId).eq(moldable_id))
            .execute(session)
            .await
    })?;
    Ok(())
}

/// Removes the given rids from a scheduled moldable (reservation shrink).
pub fn remove_gantt_resource_job(session: &Session, moldable_id: i64, itvs: &RidSet) -> Result<(), Error> {
    let resource_ids = session.rids_to_resource_ids(itvs);
    if resource_ids.is_empty() {
        return Ok(());
    }
    session.runtime.block_on(async {
        Query::delete()
            .from_table(GanttJobsResources::Table)
            .and_where(Expr::col(GanttJobsResources::MoldableId).eq(moldable_id))
            .and_where(Expr::col(GanttJobsResources::ResourceId).is_in(resource_ids))
            .to_owned()
            .execute(session)
            .await
    })?;
    Ok(())
}

/// Waiting interactive jobs (no reservation) with a gantt prediction:
/// `(job_id, info_type, predicted_start_time, message)`.
pub fn get_gantt_waiting_interactive_prediction_date(session: &Session) -> Result<Vec<(i64, String, i64, String)>, Error> {
    let rows = session.runtime.block_on(async {
        Query::select()
            .columns(vec![(Jobs::Table, Jobs::Id), (Jobs::Table, Jobs::InfoType), (Jobs::Table, Jobs::Message)])
            .column((GanttJobsPredictions::Table, GanttJobsPredictions::StartTime))
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
            .and_where(Expr::col((Jobs::Table, Jobs::State)).eq("Waiting"))
            .and_where(Expr::col((Jobs::Table, Jobs::Type)).eq("INTERACTIVE"))
            .and_where(Expr::col((Jobs::Table, Jobs::Reservation)).eq("None"))
            .order_by((Jobs::Table, Jobs::Id), sea_query::Order::Asc)
            .fetch_all(session)
            .await
    })?;
    let mut predictions = Vec::new();
    for row in rows {
        let info_type: Option<String> = row.try_get("info_type").ok();
        if let Some(info_type) = info_type {
            predictions.push((
                row.try_get("job_id")?,
                info_type,
                row.try_get("start_time")?,
                row.try_get("message")?,
            ));
        }
    }
    Ok(predictions)
}

/// Hostnames scheduled to run a job within the next `wakeup_time` seconds while
/// their resources are still Absent: those nodes must be woken up.
pub fn get_gantt_hostname_to_wake_up(session: &Session, now: i64, wakeup_time: i64) -> Result<Vec<String>, Error> {
    use crate::model::resources::Resources;
    let rows = session.runtime.block_on(async {
        Query::select()
            .distinct()
            .column((Resources::Table, Resources::NetworkAddress))
            .from(GanttJobsPredictions::Table)
            .inner_join(
                GanttJobsResources::Table,
                Expr::col((GanttJobsResources::Table, GanttJobsResources::MoldableId))
                    .equals((GanttJobsPredictions::Table, GanttJobsPredictions::MoldableId)),
            )
            .inner_join(
                Resources::Table,
                Expr::col((Resources::Table, Resources::ResourceId)).equals((GanttJobsResources::Table, GanttJobsResources::ResourceId)),
            )
            .and_where(Expr::col((GanttJobsPredictions::Table, GanttJobsPredictions::StartTime)).lte(now + wakeup_time))
            .and_where(Expr::col((Resources::Table, Resources::State)).eq("Absent"))
            .and_where(Expr::col((Resources::Table, Resources::AvailableUpto)).gt(now))
            .fetch_all(session)
            .await
    })?;
    rows.iter().map(|row| row.try_get("network_address")).collect()
}

/// Copies the gantt tables into their `_visu` counterparts for monitoring tools.
pub fn update_gantt_visualization(session: &Session) -> Result<(), Error> {
    session.runtime.block_on(async {
        Query::delete()
            .from_table(GanttJobsPredictionsVisu::Table)
            .to_owned()
            .execute(session)
            .await?;
        Query::delete()
            .from_table(GanttJobsResourcesVisu::Table)
            .to_owned()
            .execute(session)
            .await?;
        let copies = [
            "INSERT INTO gantt_jobs_predictions_visu SELECT * FROM gantt_jobs_predictions",
            "INSERT INTO gantt_jobs_resources_visu SELECT * FROM gantt_jobs_resources",
        ];
        for sql in copies {
            sqlx::query(sql).execute(session.pool()).await?;
        }
        Ok(())
    })
}

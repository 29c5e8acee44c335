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

use crate::{Session, SessionSelectStatement, SessionUpdateStatement};
use metasched_core::interval::RidSet;
use metasched_core::model::job::Moldable;
use metasched_core::scheduler::hierarchy::{HierarchyRequest, HierarchyRequests};
use sea_query::{Expr, ExprTrait, Iden, Query};
use sqlx::{Error, Row};
use std::collections::HashMap;

#[derive(Iden)]
pub enum MoldableJobDescriptions {
    #[iden = "moldable_job_descriptions"]
    Table,
    #[iden = "moldable_id"]
    Id,
    #[iden = "moldable_job_id"]
    JobId,
    #[iden = "moldable_walltime"]
    Walltime,
    #[iden = "moldable_index"]
    Index,
}
#[derive(Iden)]
pub enum JobResourceDescriptions {
    #[iden = "job_resource_descriptions"]
    Table,
    #[iden = "res_job_group_id"]
    GroupId,
    #[iden = "res_job_resource_type"]
    ResourceType,
    #[iden = "res_job_value"]
    Value,
    #[iden = "res_job_order"]
    Order,
    #[iden = "res_job_index"]
    Index,
}
#[derive(Iden)]
pub enum JobResourceGroups {
    #[iden = "job_resource_groups"]
    Table,
    #[iden = "res_group_id"]
    Id,
    #[iden = "res_group_moldable_id"]
    MoldableId,
    #[iden = "res_group_property"]
    Property,
    #[iden = "res_group_index"]
    Index,
}
#[derive(Iden)]
pub enum AssignedResources {
    #[iden = "assigned_resources"]
    Table,
    #[iden = "moldable_job_id"]
    MoldableId,
    #[iden = "resource_id"]
    ResourceId,
    #[iden = "assigned_resource_index"]
    Index,
}

pub struct AllJobMoldables {
    moldables: HashMap<i64, Vec<Moldable>>,
}
impl AllJobMoldables {
    /// Batch-loads the moldable descriptions of the given jobs, with their
    /// hierarchical requests built from the resource groups and descriptions
    /// (one request per group, levels ordered outermost first).
    pub(crate) async fn load_moldables_for_jobs(session: &Session, jobs: Vec<i64>) -> Result<Self, Error> {
        if jobs.is_empty() {
            return Ok(Self { moldables: HashMap::new() });
        }
        let rows = Query::select()
            .columns(vec![
                (MoldableJobDescriptions::Table, MoldableJobDescriptions::Id),
                (MoldableJobDescriptions::Table, MoldableJobDescriptions::JobId),
                (MoldableJobDescriptions::Table, MoldableJobDescriptions::Walltime),
            ])
            .columns(vec![(JobResourceGroups::Table, JobResourceGroups::Id)])
            .columns(vec![
                (JobResourceDescriptions::Table, JobResourceDescriptions::ResourceType),
                (JobResourceDescriptions::Table, JobResourceDescriptions::Value),
            ])
            .from(MoldableJobDescriptions::Table)
            .left_join(
                JobResourceGroups::Table,
                Expr::col((JobResourceGroups::Table, JobResourceGroups::MoldableId))
                    .equals((MoldableJobDescriptions::Table, MoldableJobDescriptions::Id)),
            )
            .left_join(
                JobResourceDescriptions::Table,
                Expr::col((JobResourceDescriptions::Table, JobResourceDescriptions::GroupId))
                    .equals((JobResourceGroups::Table, JobResourceGroups::Id)),
            )
            .and_where(Expr::col((MoldableJobDescriptions::Table, MoldableJobDescriptions::JobId)).is_in(jobs))
            .and_where(Expr::col((MoldableJobDescriptions::Table, MoldableJobDescriptions::Index)).eq("CURRENT"))
            .order_by((MoldableJobDescriptions::Table, MoldableJobDescriptions::Id), sea_query::Order::Asc)
            .order_by((JobResourceGroups::Table, JobResourceGroups::Id), sea_query::Order::Asc)
            .order_by((JobResourceDescriptions::Table, JobResourceDescriptions::Order), sea_query::Order::Asc)
            .fetch_all(session)
            .await?;

        // job_id -> moldable_id -> (walltime, group_id -> levels)
        let mut acc: HashMap<i64, Vec<(i64, i64, Vec<(i64, Vec<(Box<str>, u32)>)>)>> = HashMap::new();
        for row in rows.iter() {
            let job_id: i64 = row.get("moldable_job_id");
            let mld_id: i64 = row.get("moldable_id");
            let walltime: i64 = row.get("moldable_walltime");
            let moldables = acc.entry(job_id).or_insert_with(Vec::new);
            if moldables.last().map(|(id, _, _)| *id) != Some(mld_id) {
                moldables.push((mld_id, walltime, Vec::new()));
            }
            let groups = &mut moldables.last_mut().unwrap().2;
            if let Ok(group_id) = row.try_get::<i64, _>("res_group_id") {
                if groups.last().map(|(id, _)| *id) != Some(group_id) {
                    groups.push((group_id, Vec::new()));
                }
                if let Ok(rtype) = row.try_get::<String, _>("res_job_resource_type") {
                    let rvalue: i64 = row.try_get("res_job_value").unwrap_or(0);
                    groups.last_mut().unwrap().1.push((rtype.into_boxed_str(), rvalue as u32));
                }
            }
        }

        let moldables = acc
            .into_iter()
            .map(|(job_id, molds)| {
                let molds = molds
                    .into_iter()
                    .map(|(mld_id, walltime, groups)| {
                        let reqs: Vec<HierarchyRequest> = groups
                            .into_iter()
                            .map(|(_gid, levels)| HierarchyRequest::new(!RidSet::new(), levels))
                            .collect();
                        Moldable::new(mld_id, walltime, HierarchyRequests::from_requests(reqs))
                    })
                    .collect::<Vec<Moldable>>();
                (job_id, molds)
            })
            .collect::<HashMap<i64, Vec<Moldable>>>();

        Ok(Self { moldables })
    }

    pub fn get_job_moldables(&self, job_id: i64) -> Vec<Moldable> {
        self.moldables.get(&job_id).unwrap_or(&Vec::new()).clone()
    }
}

/// Shrinks the walltime of a moldable, used when an advance reservation starts late.
pub fn set_moldable_job_max_time(session: &Session, moldable_id: i64, walltime: i64) -> Result<(), Error> {
    session.runtime.block_on(async {
        Query::update()
            .table(MoldableJobDescriptions::Table)
            .value(MoldableJobDescriptions::Walltime, walltime)
            .and_where(Expr::col(MoldableJobDescriptions::Id).eq(moldable_id))
            .execute(session)
            .await
    })?;
    Ok(())
}


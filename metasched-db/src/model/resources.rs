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
use crate::model::jobs::{Jobs, RUNNING_STATES};
use crate::model::moldable::AssignedResources;
use crate::{Session, SessionInsertStatement, SessionSelectStatement};
use indexmap::IndexMap;
use sea_query::{Alias, Expr, ExprTrait, Iden, Query};
use sqlx::{Error, Row};
use std::collections::HashMap;

/// Upper bound of the `available_upto` column: the resource is always available
/// and must not be halted by the energy-saving module.
pub const AVAILABLE_UPTO_ALWAYS: i64 = 2147483647;

#[derive(Iden)]
pub enum Resources {
    #[iden = "resources"]
    Table,
    #[iden = "resource_id"]
    ResourceId,
    #[iden = "network_address"]
    NetworkAddress,
    #[iden = "type"]
    Type,
    #[iden = "state"]
    State,
    #[iden = "next_state"]
    NextState,
    #[iden = "available_upto"]
    AvailableUpto,
    #[iden = "suspended_jobs"]
    SuspendedJobs,
    #[iden = "last_job_date"]
    LastJobDate,
    #[iden = "scheduler_priority"]
    SchedulerPriority,
    #[iden = "besteffort"]
    BestEffort,
    #[iden = "drain"]
    Drain,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceLabelValue {
    Integer(i64),
    Varchar(String),
}

pub struct Resource {
    pub id: i64,
    pub r#type: String,
    pub state: String,
    pub available_upto: Option<i64>,
    pub labels: HashMap<Box<str>, ResourceLabelValue>,
}

impl Resource {
    /// Get all resources, sorted by the given order_by_clause (e.g., "resource_id ASC").
    pub fn get_all_sorted(session: &Session, order_by_clause: &str, labels: &Vec<Box<str>>) -> Result<Vec<Resource>, Error> {
        let rows = session.runtime.block_on(async {
            Query::select()
                .columns(vec![Resources::ResourceId, Resources::Type, Resources::State, Resources::AvailableUpto])
                .columns(labels.iter().map(|s| Alias::new(s.as_ref())).collect::<Vec<Alias>>())
                .from(Resources::Table)
                .order_by_expr(sea_query::SimpleExpr::Custom(order_by_clause.to_string().into()), sea_query::Order::Asc)
                .fetch_all(session)
                .await
        })?;

        let mut results = Vec::new();
        for row in rows {
            let mut map = HashMap::new();
            labels.iter().for_each(|label| {
                let value: Result<i64, _> = row.try_get(label.as_ref());
                if let Ok(v) = value {
                    map.insert(label.clone(), ResourceLabelValue::Integer(v));
                } else if let Ok(v) = row.try_get::<String, _>(label.as_ref()) {
                    map.insert(label.clone(), ResourceLabelValue::Varchar(v));
                }
            });
            results.push(Resource {
                id: row.get("resource_id"),
                r#type: row.get("type"),
                state: row.get("state"),
                available_upto: row.try_get("available_upto").ok(),
                labels: map,
            });
        }
        Ok(results)
    }
}

/// Hostnames of Alive, energy-manageable nodes with no job currently assigned,
/// mapped to the date of their last job. Nodes with `available_upto` at 0 or at
/// the always-available bound are not managed by the energy-saving module.
pub fn search_idle_nodes(session: &Session, now: i64) -> Result<IndexMap<String, i64>, Error> {
    session.runtime.block_on(async {
        let busy_rows = Query::select()
            .distinct()
            .column((Resources::Table, Resources::NetworkAddress))
            .from(Resources::Table)
            .inner_join(
                AssignedResources::Table,
                Expr::col((AssignedResources::Table, AssignedResources::ResourceId)).equals((Resources::Table, Resources::ResourceId)),
            )
            .inner_join(
                Jobs::Table,
                Expr::col((Jobs::Table, Jobs::AssignedMoldableJob)).equals((AssignedResources::Table, AssignedResources::MoldableId)),
            )
            .and_where(Expr::col((Jobs::Table, Jobs::State)).is_in(RUNNING_STATES))
            .fetch_all(session)
            .await?;
        let busy: Vec<String> = busy_rows
            .iter()
            .map(|row| row.try_get("network_address"))
            .collect::<Result<Vec<String>, Error>>()?;

        let rows = Query::select()
            .column(Resources::NetworkAddress)
            .expr_as(Expr::col(Resources::LastJobDate).max(), Alias::new("last_job_date"))
            .from(Resources::Table)
            .and_where(Expr::col(Resources::State).eq("Alive"))
            .and_where(Expr::col(Resources::NetworkAddress).is_not_in(busy))
            .and_where(Expr::col(Resources::AvailableUpto).gt(now))
            .and_where(Expr::col(Resources::AvailableUpto).lt(AVAILABLE_UPTO_ALWAYS))
            .group_by_col(Resources::NetworkAddress)
            .fetch_all(session)
            .await?;

        let mut idle = IndexMap::new();
        for row in rows {
            idle.insert(row.try_get::<String, _>("network_address")?, row.try_get::<i64, _>("last_job_date")?);
        }
        Ok(idle)
    })
}

/// Start time of the next job scheduled on the given node, if any.
pub fn get_next_job_date_on_node(session: &Session, hostname: &str) -> Result<Option<i64>, Error> {
    let row = session.runtime.block_on(async {
        Query::select()
            .expr_as(Expr::col((GanttJobsPredictions::Table, GanttJobsPredictions::StartTime)).min(), Alias::new("next_date"))
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
            .and_where(Expr::col((Resources::Table, Resources::NetworkAddress)).eq(hostname))
            .fetch_one(session)
            .await
    })?;
    Ok(row.try_get::<i64, _>("next_date").ok())
}

pub struct NewResource {
    pub network_address: String,
    pub r#type: String,
    pub state: String,
    pub available_upto: Option<i64>,
    pub labels: IndexMap<String, ResourceLabelValue>,
}
impl NewResource {
    pub fn insert(&self, session: &Session) -> Result<i64, Error> {
        let columns = vec![
            Alias::new(Resources::NetworkAddress.to_string()),
            Alias::new(Resources::Type.to_string()),
            Alias::new(Resources::State.to_string()),
            Alias::new(Resources::AvailableUpto.to_string()),
        ]
        .into_iter()
        .chain(self.labels.keys().map(|k| Alias::new(k)))
        .collect::<Vec<Alias>>();
        let values = vec![
            Expr::val(&self.network_address),
            Expr::val(&self.r#type),
            Expr::val(&self.state),
            Expr::val(self.available_upto.unwrap_or(AVAILABLE_UPTO_ALWAYS)),
        ]
        .into_iter()
        .chain(self.labels.values().map(|v| match v {
            ResourceLabelValue::Integer(i) => Expr::val(*i),
            ResourceLabelValue::Varchar(s) => Expr::val(s),
        }))
        .collect::<Vec<Expr>>();

        let row = session.runtime.block_on(async {
            Query::insert()
                .into_table(Resources::Table)
                .columns(columns)
                .values_panic(values)
                .returning_col(Resources::ResourceId)
                .fetch_one(session)
                .await
        })?;
        Ok(row.try_get::<i64, _>(0)?)
    }
}


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

use crate::{Session, SessionInsertStatement, SessionSelectStatement};
use sea_query::{Expr, ExprTrait, Iden, Query};
use sqlx::{Error, Row};

#[derive(Iden)]
pub enum EventLogs {
    #[iden = "event_logs"]
    Table,
    #[iden = "event_id"]
    EventId,
    #[iden = "type"]
    Type,
    #[iden = "job_id"]
    JobId,
    #[iden = "date"]
    Date,
    #[iden = "description"]
    Description,
    #[iden = "to_check"]
    ToCheck,
}

#[derive(Iden)]
pub enum EventLogHostnames {
    #[iden = "event_log_hostnames"]
    Table,
    #[iden = "event_id"]
    EventId,
    #[iden = "hostname"]
    Hostname,
}

#[derive(Debug, Clone)]
pub struct EventLog {
    pub event_id: i64,
    pub ev_type: String,
    pub job_id: i64,
    pub date: i64,
    pub description: String,
}

/// Appends an event to the log. The description column is capped at 255 chars.
pub fn add_new_event(session: &Session, ev_type: &str, job_id: i64, description: &str) -> Result<(), Error> {
    let now = session.get_now();
    let description: String = description.chars().take(255).collect();
    session.runtime.block_on(async {
        Query::insert()
            .into_table(EventLogs::Table)
            .columns(vec![EventLogs::Type, EventLogs::JobId, EventLogs::Date, EventLogs::Description, EventLogs::ToCheck])
            .values_panic(vec![
                ev_type.into(),
                job_id.into(),
                now.into(),
                description.as_str().into(),
                "YES".into(),
            ])
            .execute(session)
            .await
    })?;
    Ok(())
}

/// Appends an event attached to hostnames (e.g. node wake-up requests).
pub fn add_new_event_with_hosts(session: &Session, ev_type: &str, job_id: i64, description: &str, hostnames: &[String]) -> Result<(), Error> {
    let now = session.get_now();
    let description: String = description.chars().take(255).collect();
    session.runtime.block_on(async {
        let row = Query::insert()
            .into_table(EventLogs::Table)
            .columns(vec![EventLogs::Type, EventLogs::JobId, EventLogs::Date, EventLogs::Description, EventLogs::ToCheck])
            .values_panic(vec![
                ev_type.into(),
                job_id.into(),
                now.into(),
                description.as_str().into(),
                "YES".into(),
            ])
            .returning_col(EventLogs::EventId)
            .fetch_one(session)
            .await?;
        let event_id: i64 = row.try_get(0)?;
        for hostname in hostnames {
            Query::insert()
                .into_table(EventLogHostnames::Table)
                .columns(vec![EventLogHostnames::EventId, EventLogHostnames::Hostname])
                .values_panic(vec![event_id.into(), hostname.as_str().into()])
                .execute(session)
                .await?;
        }
        Ok(())
    })
}

/// Returns the events of a job, most recent last.
pub fn get_job_events(session: &Session, job_id: i64) -> Result<Vec<EventLog>, Error> {
    let rows = session.runtime.block_on(async {
        Query::select()
            .columns(vec![EventLogs::EventId, EventLogs::Type, EventLogs::JobId, EventLogs::Date, EventLogs::Description])
            .from(EventLogs::Table)
            .and_where(Expr::col(EventLogs::JobId).eq(job_id))
            .order_by(EventLogs::Date, sea_query::Order::Asc)
            .order_by(EventLogs::EventId, sea_query::Order::Asc)
            .fetch_all(session)
            .await
    })?;
    let mut events = Vec::new();
    for row in rows {
        events.push(EventLog {
            event_id: row.try_get("event_id")?,
            ev_type: row.try_get("type")?,
            job_id: row.try_get("job_id")?,
            date: row.try_get("date")?,
            description: row.try_get("description")?,
        });
    }
    Ok(events)
}

/// Date of the last wake-up request sent for the given node, if any.
pub fn get_last_wake_up_date_of_node(session: &Session, hostname: &str) -> Result<Option<i64>, Error> {
    let row = session.runtime.block_on(async {
        Query::select()
            .column((EventLogs::Table, EventLogs::Date))
            .from(EventLogs::Table)
            .inner_join(
                EventLogHostnames::Table,
                Expr::col((EventLogHostnames::Table, EventLogHostnames::EventId)).equals((EventLogs::Table, EventLogs::EventId)),
            )
            .and_where(Expr::col((EventLogs::Table, EventLogs::Type)).eq("WAKE_UP_NODE"))
            .and_where(Expr::col((EventLogHostnames::Table, EventLogHostnames::Hostname)).eq(hostname))
            .order_by((EventLogs::Table, EventLogs::Date), sea_query::Order::Desc)
            .limit(1)
            .fetch_optional(session)
            .await
    })?;
    row.map(|r| r.try_get::<i64, _>("date")).transpose()
}

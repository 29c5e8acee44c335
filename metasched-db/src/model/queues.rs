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

use crate::{Session, SessionInsertStatement, SessionSelectStatement, SessionUpdateStatement};
use sea_query::{Expr, ExprTrait, Iden, Query};
use sqlx::{Error, Row};

#[derive(Iden)]
enum Queues {
    #[iden = "queues"]
    Table,
    #[iden = "queue_name"]
    QueueName,
    #[iden = "priority"]
    Priority,
    #[iden = "scheduler_policy"]
    SchedulerPolicy,
    #[iden = "state"]
    State,
}

#[derive(Debug, Clone)]
pub struct Queue {
    pub queue_name: String,
    pub priority: i64,
    pub scheduler_policy: String,
    pub state: String,
}
impl Queue {
    pub fn is_active(&self) -> bool {
        self.state.to_lowercase() == "active"
    }

    pub fn insert(&self, session: &Session) -> Result<(), Error> {
        session.runtime.block_on(async {
            Query::insert()
                .into_table(Queues::Table)
                .columns(vec![Queues::QueueName, Queues::Priority, Queues::SchedulerPolicy, Queues::State])
                .values_panic(vec![
                    Expr::val(&self.queue_name),
                    Expr::val(self.priority),
                    Expr::val(&self.scheduler_policy),
                    Expr::val(&self.state),
                ])
                .execute(session)
                .await
        })?;
        Ok(())
    }

    /// Gets all queues ordered by priority (highest priority first).
    pub fn get_all_ordered_by_priority(session: &Session) -> Result<Vec<Queue>, Error> {
        let rows = session.runtime.block_on(async {
            Query::select()
                .columns(vec![Queues::QueueName, Queues::Priority, Queues::SchedulerPolicy, Queues::State])
                .from(Queues::Table)
                .order_by(Queues::Priority, sea_query::Order::Desc)
                .order_by(Queues::QueueName, sea_query::Order::Asc)
                .fetch_all(session)
                .await
        })?;

        let mut queues = Vec::new();
        for row in rows {
            let queue = Queue {
                queue_name: row.try_get("queue_name")?,
                priority: row.try_get("priority")?,
                scheduler_policy: row.try_get("scheduler_policy")?,
                state: row.try_get("state")?,
            };
            queues.push(queue);
        }
        Ok(queues)
    }

    /// Changes the state of a queue. A queue deactivated after a policy failure
    /// stays `notActive` until an operator re-enables it.
    pub fn set_queue_state(session: &Session, queue_name: &str, state: &str) -> Result<(), Error> {
        session.runtime.block_on(async {
            Query::update()
                .table(Queues::Table)
                .value(Queues::State, state)
                .and_where(Expr::col(Queues::QueueName).eq(queue_name))
                .execute(session)
                .await
        })?;
        Ok(())
    }
}

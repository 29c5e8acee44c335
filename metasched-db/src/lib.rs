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

use crate::model::resources::{Resource, ResourceLabelValue};
use indexmap::IndexMap;
use log::{debug, info};
use metasched_core::interval::RidSet;
use metasched_core::model::configuration::Configuration;
use metasched_core::platform::ResourceSet;
use metasched_core::scheduler::hierarchy::Hierarchy;
use sea_query::{DeleteStatement, InsertStatement, PostgresQueryBuilder, SelectStatement, SqliteQueryBuilder, UpdateStatement};
use sea_query_sqlx::{SqlxBinder, SqlxValues};
use sqlx::any::{install_default_drivers, AnyRow};
use sqlx::pool::PoolOptions;
use sqlx::{Any, AnyPool, Transaction};
pub use sqlx::Error;
use std::collections::HashMap;
use tokio::runtime::Runtime;

pub mod model;

pub(crate) enum Backend {
    Postgres,
    Sqlite,
}
impl From<&str> for Backend {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Backend::Postgres,
            "sqlite" | "sqlite3" => Backend::Sqlite,
            _ => panic!("Unsupported database backend {}", s),
        }
    }
}
impl Backend {
    fn build_insert(&self, query: &InsertStatement) -> (String, SqlxValues) {
        match self {
            Backend::Postgres => query.build_sqlx(PostgresQueryBuilder),
            Backend::Sqlite => query.build_sqlx(SqliteQueryBuilder),
        }
    }
    fn build_select(&self, query: &SelectStatement) -> (String, SqlxValues) {
        match self {
            Backend::Postgres => query.build_sqlx(PostgresQueryBuilder),
            Backend::Sqlite => query.build_sqlx(SqliteQueryBuilder),
        }
    }
    fn build_update(&self, query: &UpdateStatement) -> (String, SqlxValues) {
        match self {
            Backend::Postgres => query.build_sqlx(PostgresQueryBuilder),
            Backend::Sqlite => query.build_sqlx(SqliteQueryBuilder),
        }
    }
    fn build_delete(&self, query: &DeleteStatement) -> (String, SqlxValues) {
        match self {
            Backend::Postgres => query.build_sqlx(PostgresQueryBuilder),
            Backend::Sqlite => query.build_sqlx(SqliteQueryBuilder),
        }
    }
}

pub struct Session {
    /// sqlx connection pool.
    pool: AnyPool,
    /// Database backend type (Postgres or Sqlite).
    backend: Backend,
    /// Tokio runtime used to run async database operations in a sync context.
    pub(crate) runtime: Runtime,
    /// Maps the database resource id to the enumerated rid used in RidSets.
    resource_id_to_rid: HashMap<i64, u32>,
    /// Maps the enumerated rid (1-based) back to the database resource id.
    rid_to_resource_id: Vec<i64>,
}

impl Session {
    pub fn new(database_url: &str) -> Session {
        let max_connections = 1; // Only one connection is needed since we are using a single-threaded runtime.
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

        let (pool, backend) = runtime.block_on(async {
            install_default_drivers();

            let pool = PoolOptions::<Any>::new()
                .max_connections(max_connections)
                .connect(database_url)
                .await
                .expect("Failed to create connection pool");

            let conn = pool.acquire().await.expect("Failed to acquire connection");
            let backend = conn.backend_name().into();
            conn.close().await.unwrap();
            (pool, backend)
        });
        Session {
            pool,
            backend,
            runtime,
            resource_id_to_rid: HashMap::new(),
            rid_to_resource_id: Vec::new(),
        }
    }

    pub fn get_now(&self) -> i64 {
        match self.backend {
            Backend::Postgres => {
                let row: (i64,) = self.runtime.block_on(async {
                    sqlx::query_as("SELECT EXTRACT(EPOCH FROM current_timestamp)::BIGINT")
                        .fetch_one(&self.pool)
                        .await
                        .expect("Failed to fetch current time")
                });
                row.0
            }
            Backend::Sqlite => {
                let row: (i64,) = self.runtime.block_on(async {
                    sqlx::query_as("SELECT CAST(strftime('%s','now') AS INTEGER)")
                        .fetch_one(&self.pool)
                        .await
                        .expect("Failed to fetch current time")
                });
                row.0
            }
        }
    }

    pub fn create_schema(&self) {
        let sql = match self.backend {
            Backend::Postgres => unimplemented!("schema creation is only supported for SQLite test databases"),
            Backend::Sqlite => include_str!("sql/up-sqlite.sql"),
        };
        self.runtime.block_on(async {
            for statement in sql.split(';').map(|s| s.trim()).filter(|s| !s.is_empty()) {
                sqlx::query(statement).execute(&self.pool).await.expect("Failed to create schema");
            }
        });
    }

    /// Loads the resources relation and derives the static [`ResourceSet`] used
    /// for one scheduling iteration: the usable id set, the hierarchy index and
    /// the availability windows. Resources are enumerated in the configured
    /// order so that matcher assignments are reproducible; the mapping between
    /// enumerated rids (1-based) and database resource ids is kept in the session.
    pub fn get_resource_set(&mut self, config: &Configuration) -> ResourceSet {
        let labels = config.hierarchy_label_list();
        let order_by = config.resource_order();
        let resources = Resource::get_all_sorted(self, order_by, &labels).unwrap();
        info!("Loaded {} resources from database", resources.len());
        debug!("Resource labels considered: {:?}", labels);

        let suspended_types: Vec<String> = config
            .scheduler_available_suspended_resource_type
            .clone()
            .unwrap_or("".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let mut resource_id_to_rid = HashMap::new();
        let mut rid_to_resource_id = Vec::new();
        let mut default_rids = Vec::new();
        let mut alive_rids = Vec::new();
        let mut suspendable_rids = Vec::new();
        let mut available_upto_map: IndexMap<i64, Vec<u32>> = IndexMap::new();
        // Mapping: resource label name -> (resource label value -> [enumerated rid])
        // IndexMaps keep the configured resource order, which makes assignments reproducible.
        let mut hierarchy_resources: IndexMap<Box<str>, IndexMap<ResourceLabelValue, Vec<u32>>> = IndexMap::new();

        for (index, resource) in resources.iter().enumerate() {
            let rid = index as u32 + 1;
            resource_id_to_rid.insert(resource.id, rid);
            rid_to_resource_id.push(resource.id);
            debug!(
                "Resource {}: id={} type={}, state={} labels={:?}",
                rid, resource.id, resource.r#type, resource.state, resource.labels
            );
            let state = resource.state.to_lowercase();
            if state == "alive" || state == "absent" {
                if resource.r#type.to_lowercase() == "default" {
                    default_rids.push(rid);
                }
                if state == "alive" {
                    alive_rids.push(rid);
                }
                for label in labels.iter() {
                    if let Some(value) = resource.labels.get(label) {
                        let entry = hierarchy_resources.entry(label.clone()).or_insert_with(IndexMap::new);
                        entry.entry(value.clone()).or_insert_with(Vec::new).push(rid);
                    }
                }
                // 0 means never available, the upper bound means always available:
                // neither needs an availability window in the calendar.
                if let Some(time) = resource.available_upto {
                    if time > 0 && time < crate::model::resources::AVAILABLE_UPTO_ALWAYS {
                        available_upto_map.entry(time).or_insert_with(Vec::new).push(rid);
                    }
                }
                if suspended_types.contains(&resource.r#type) {
                    suspendable_rids.push(rid);
                }
            }
        }

        let mut hierarchy = Hierarchy::new();
        for (label, map) in hierarchy_resources.into_iter() {
            let mut partitions = Vec::new();
            let mut is_unit = true;
            for (_value, rids) in map.into_iter() {
                if rids.len() > 1 {
                    is_unit = false;
                }
                partitions.push(RidSet::from_iter(rids.iter()));
            }
            hierarchy = if is_unit {
                hierarchy.with_unit_level(label)
            } else {
                hierarchy.with_level(label, partitions.into_boxed_slice())
            };
        }

        self.resource_id_to_rid = resource_id_to_rid;
        self.rid_to_resource_id = rid_to_resource_id;
        ResourceSet {
            default_itvs: RidSet::from_iter(default_rids.iter()),
            alive_itvs: RidSet::from_iter(alive_rids.iter()),
            suspendable_itvs: RidSet::from_iter(suspendable_rids.iter()),
            available_upto: available_upto_map
                .into_iter()
                .map(|(time, rids)| (time, RidSet::from_iter(rids.iter())))
                .collect(),
            hierarchy,
        }
    }

    pub fn rid_for_resource_id(&self, resource_id: i64) -> Option<u32> {
        self.resource_id_to_rid.get(&resource_id).cloned()
    }
    pub fn resource_id_for_rid(&self, rid: u32) -> Option<i64> {
        self.rid_to_resource_id.get(rid as usize - 1).cloned()
    }
    pub fn rids_to_resource_ids(&self, itvs: &RidSet) -> Vec<i64> {
        itvs.iter()
            .filter_map(|rid| self.resource_id_for_rid(rid))
            .collect()
    }
}

pub(crate) trait SessionInsertStatement {
    async fn fetch_one<'q>(&'q self, session: &Session) -> Result<AnyRow, Error>;
    async fn execute<'q>(&'q self, session: &Session) -> Result<u64, Error>;
    async fn execute_tx<'q, 't>(&'q self, session: &Session, tx: &mut Transaction<'t, Any>) -> Result<u64, Error>;
}
impl SessionInsertStatement for InsertStatement {
    async fn fetch_one<'q>(&'q self, session: &Session) -> Result<AnyRow, Error> {
        let (sql, values) = session.backend.build_insert(&self);
        debug!("SQL: {}   VALUES: {:?}", sql, values);
        sqlx::query_with(sql.as_str(), values).fetch_one(&session.pool).await
    }
    async fn execute<'q>(&'q self, session: &Session) -> Result<u64, Error> {
        let (sql, values) = session.backend.build_insert(&self);
        debug!("SQL: {}   VALUES: {:?}", sql, values);
        let result = sqlx::query_with(sql.as_str(), values).execute(&session.pool).await?;
        Ok(result.rows_affected())
    }
    async fn execute_tx<'q, 't>(&'q self, session: &Session, tx: &mut Transaction<'t, Any>) -> Result<u64, Error> {
        let (sql, values) = session.backend.build_insert(&self);
        debug!("SQL (tx): {}   VALUES: {:?}", sql, values);
        let result = sqlx::query_with(sql.as_str(), values).execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

pub(crate) trait SessionSelectStatement {
    async fn fetch_one<'q>(&'q self, session: &Session) -> Result<AnyRow, Error>;
    async fn fetch_optional<'q>(&'q self, session: &Session) -> Result<Option<AnyRow>, Error>;
    async fn fetch_all<'q>(&'q self, session: &Session) -> Result<Vec<AnyRow>, Error>;
}
impl SessionSelectStatement for SelectStatement {
    async fn fetch_one<'q>(&'q self, session: &Session) -> Result<AnyRow, Error> {
        let (sql, values) = session.backend.build_select(&self);
        sqlx::query_with(sql.as_str(), values).fetch_one(&session.pool).await
    }
    async fn fetch_optional<'q>(&'q self, session: &Session) -> Result<Option<AnyRow>, Error> {
        let (sql, values) = session.backend.build_select(&self);
        sqlx::query_with(sql.as_str(), values).fetch_optional(&session.pool).await
    }
    async fn fetch_all<'q>(&'q self, session: &Session) -> Result<Vec<AnyRow>, Error> {
        let (sql, values) = session.backend.build_select(&self);
        debug!("SQL: {}   VALUES: {:?}", sql, values);
        sqlx::query_with(sql.as_str(), values).fetch_all(&session.pool).await
    }
}

pub(crate) trait SessionUpdateStatement {
    async fn execute<'q>(&'q self, session: &Session) -> Result<u64, Error>;
    async fn execute_tx<'q, 't>(&'q self, session: &Session, tx: &mut Transaction<'t, Any>) -> Result<u64, Error>;
}
impl SessionUpdateStatement for UpdateStatement {
    async fn execute<'q>(&'q self, session: &Session) -> Result<u64, Error> {
        let (sql, values) = session.backend.build_update(&self);
        debug!("SQL: {}   VALUES: {:?}", sql, values);
        let result = sqlx::query_with(sql.as_str(), values).execute(&session.pool).await?;
        Ok(result.rows_affected())
    }
    async fn execute_tx<'q, 't>(&'q self, session: &Session, tx: &mut Transaction<'t, Any>) -> Result<u64, Error> {
        let (sql, values) = session.backend.build_update(&self);
        debug!("SQL (tx): {}   VALUES: {:?}", sql, values);
        let result = sqlx::query_with(sql.as_str(), values).execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

pub(crate) trait SessionDeleteStatement {
    async fn execute<'q>(&'q self, session: &Session) -> Result<u64, Error>;
    async fn execute_tx<'q, 't>(&'q self, session: &Session, tx: &mut Transaction<'t, Any>) -> Result<u64, Error>;
}
impl SessionDeleteStatement for DeleteStatement {
    async fn execute<'q>(&'q self, session: &Session) -> Result<u64, Error> {
        let (sql, values) = session.backend.build_delete(&self);
        debug!("SQL: {}   VALUES: {:?}", sql, values);
        let result = sqlx::query_with(sql.as_str(), values).execute(&session.pool).await?;
        Ok(result.rows_affected())
    }
    async fn execute_tx<'q, 't>(&'q self, session: &Session, tx: &mut Transaction<'t, Any>) -> Result<u64, Error> {
        let (sql, values) = session.backend.build_delete(&self);
        debug!("SQL (tx): {}   VALUES: {:?}", sql, values);
        let result = sqlx::query_with(sql.as_str(), values).execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

impl Session {
    pub(crate) async fn begin(&self) -> Result<Transaction<'_, Any>, Error> {
        self.pool.begin().await
    }
    pub(crate) fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

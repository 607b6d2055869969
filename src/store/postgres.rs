//! PostgreSQL coordination store
//!
//! The only backend shared between processes. Every primitive is one SQL
//! statement: conditional `UPDATE ... WHERE flag = FALSE` for transitions,
//! `ON CONFLICT DO NOTHING` for per-row idempotent inserts and a single
//! `INSERT ... SELECT FROM UNNEST` for vote batches.

use crate::common::{Error, Iteration, Probability, Result, Vertex};
use crate::store::{CoordinationStore, IterationState, RankRecord, VoteRecord};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS iteration (
        iteration INTEGER PRIMARY KEY,
        ready BOOLEAN NOT NULL DEFAULT FALSE,
        mapped BOOLEAN NOT NULL DEFAULT FALSE,
        reduced BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS map_vote (
        source_id BIGINT NOT NULL,
        target_id BIGINT NOT NULL,
        iteration INTEGER NOT NULL,
        vote NUMERIC(40, 30) NOT NULL,
        PRIMARY KEY (iteration, source_id, target_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS page_rank (
        vertex_id BIGINT NOT NULL,
        iteration INTEGER NOT NULL,
        rank NUMERIC(40, 30) NOT NULL,
        PRIMARY KEY (iteration, vertex_id)
    )
    "#,
];

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and create the tables if they do not exist yet
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            if let Err(e) = sqlx::query(statement).execute(&self.pool).await {
                // Racing `CREATE TABLE IF NOT EXISTS` can still trip the catalog's unique index.
                if !is_unique_violation(&e) {
                    return Err(e.into());
                }
            }
        }
        info!("PostgreSQL schema ready");
        Ok(())
    }

    async fn transition(&self, column: &str, iteration: Iteration) -> Result<bool> {
        let statement = format!(
            "UPDATE iteration SET {column} = TRUE WHERE iteration = $1 AND {column} = FALSE"
        );
        let result = sqlx::query(&statement)
            .bind(as_db_iteration(iteration)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn flag(&self, column: &str, iteration: Iteration) -> Result<bool> {
        let statement = format!("SELECT {column} FROM iteration WHERE iteration = $1");
        sqlx::query_scalar::<_, bool>(&statement)
            .bind(as_db_iteration(iteration)?)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::UnknownIteration(iteration))
    }

    async fn none_unset(&self, column: &str) -> Result<bool> {
        let statement = format!("SELECT COUNT(1) FROM iteration WHERE {column} = FALSE");
        let count: i64 = sqlx::query_scalar(&statement).fetch_one(&self.pool).await?;
        Ok(count == 0)
    }

    async fn first_iteration(&self, mapped: bool) -> Result<Option<Iteration>> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT iteration FROM iteration \
             WHERE ready = TRUE AND mapped = $1 AND reduced = FALSE \
             ORDER BY iteration LIMIT 1",
        )
        .bind(mapped)
        .fetch_optional(&self.pool)
        .await?;
        found.map(from_db_iteration).transpose()
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn as_db_iteration(iteration: Iteration) -> Result<i32> {
    i32::try_from(iteration)
        .map_err(|_| Error::InvalidConfig(format!("iteration {} exceeds INTEGER", iteration)))
}

fn from_db_iteration(iteration: i32) -> Result<Iteration> {
    Iteration::try_from(iteration)
        .map_err(|_| Error::Corrupted(format!("negative iteration {}", iteration)))
}

#[async_trait]
impl CoordinationStore for PostgresStore {
    async fn count_iteration_rows(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM iteration")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn insert_iteration_slots(&self, limit: Iteration) -> Result<u64> {
        let result = sqlx::query(
            "INSERT INTO iteration (iteration) SELECT generate_series(1, $1) ON CONFLICT DO NOTHING",
        )
        .bind(as_db_iteration(limit)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_ready(&self, iteration: Iteration) -> Result<bool> {
        self.transition("ready", iteration).await
    }

    async fn set_mapped(&self, iteration: Iteration) -> Result<bool> {
        self.transition("mapped", iteration).await
    }

    async fn set_reduced(&self, iteration: Iteration) -> Result<bool> {
        self.transition("reduced", iteration).await
    }

    async fn is_mapped(&self, iteration: Iteration) -> Result<bool> {
        self.flag("mapped", iteration).await
    }

    async fn is_reduced(&self, iteration: Iteration) -> Result<bool> {
        self.flag("reduced", iteration).await
    }

    async fn all_mapped(&self) -> Result<bool> {
        self.none_unset("mapped").await
    }

    async fn all_reduced(&self) -> Result<bool> {
        self.none_unset("reduced").await
    }

    async fn next_ready(&self) -> Result<Option<Iteration>> {
        self.first_iteration(false).await
    }

    async fn next_mapped(&self) -> Result<Option<Iteration>> {
        self.first_iteration(true).await
    }

    async fn list_iterations(&self) -> Result<Vec<IterationState>> {
        let rows: Vec<(i32, bool, bool, bool)> = sqlx::query_as(
            "SELECT iteration, ready, mapped, reduced FROM iteration ORDER BY iteration",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(iteration, ready, mapped, reduced)| {
                Ok(IterationState {
                    iteration: from_db_iteration(iteration)?,
                    ready,
                    mapped,
                    reduced,
                })
            })
            .collect()
    }

    async fn count_rank_rows(&self, iteration: Iteration) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM page_rank WHERE iteration = $1")
            .bind(as_db_iteration(iteration)?)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn insert_initial_ranks(&self, vertices: &[Vertex], value: &Probability) -> Result<u64> {
        let result = sqlx::query(
            "INSERT INTO page_rank (vertex_id, iteration, rank) \
             SELECT v, 0, $2 FROM UNNEST($1::BIGINT[]) AS v \
             ON CONFLICT DO NOTHING",
        )
        .bind(vertices)
        .bind(value.as_decimal().clone())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_ranks(&self, iteration: Iteration) -> Result<Vec<RankRecord>> {
        let rows: Vec<(i64, BigDecimal)> =
            sqlx::query_as("SELECT vertex_id, rank FROM page_rank WHERE iteration = $1")
                .bind(as_db_iteration(iteration)?)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(vertex, value)| RankRecord {
                vertex,
                value: Probability::from_decimal(value),
            })
            .collect())
    }

    async fn get_ranked_vertices(&self, iteration: Iteration) -> Result<HashSet<Vertex>> {
        let rows: Vec<i64> =
            sqlx::query_scalar("SELECT DISTINCT vertex_id FROM page_rank WHERE iteration = $1")
                .bind(as_db_iteration(iteration)?)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn insert_rank(
        &self,
        vertex: Vertex,
        iteration: Iteration,
        value: &Probability,
    ) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO page_rank (vertex_id, iteration, rank) VALUES ($1, $2, $3) \
             ON CONFLICT DO NOTHING",
        )
        .bind(vertex)
        .bind(as_db_iteration(iteration)?)
        .bind(value.as_decimal().clone())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::AlreadyExists(format!(
                "rank of vertex {} at iteration {}",
                vertex, iteration
            )));
        }
        Ok(())
    }

    async fn get_votes(&self, iteration: Iteration) -> Result<Vec<VoteRecord>> {
        let rows: Vec<(i64, i64, BigDecimal)> = sqlx::query_as(
            "SELECT source_id, target_id, vote FROM map_vote WHERE iteration = $1",
        )
        .bind(as_db_iteration(iteration)?)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(source, target, value)| VoteRecord {
                source,
                target,
                value: Probability::from_decimal(value),
            })
            .collect())
    }

    async fn get_vote_sources(&self, iteration: Iteration) -> Result<HashSet<Vertex>> {
        let rows: Vec<i64> =
            sqlx::query_scalar("SELECT DISTINCT source_id FROM map_vote WHERE iteration = $1")
                .bind(as_db_iteration(iteration)?)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn insert_votes(
        &self,
        source: Vertex,
        targets: &[Vertex],
        iteration: Iteration,
        value: &Probability,
    ) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        // One array parameter keeps hub vertices under the bind-parameter limit.
        let result = sqlx::query(
            "INSERT INTO map_vote (source_id, target_id, iteration, vote) \
             SELECT $1, t, $3, $4 FROM UNNEST($2::BIGINT[]) AS t",
        )
        .bind(source)
        .bind(targets)
        .bind(as_db_iteration(iteration)?)
        .bind(value.as_decimal().clone())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::AlreadyExists(format!(
                "votes of vertex {} at iteration {}",
                source, iteration
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

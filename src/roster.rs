use anyhow::Result;
use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DbPool;

/// One monitored patient with its ordinal position in the active roster.
///
/// The index and population size jointly determine health-group membership,
/// so they are assigned in one place and carried together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entity {
    pub id: Uuid,
    pub index: usize,
    pub population: usize,
}

/// Assign stable ordinal indices to a roster snapshot.
///
/// Roster providers do not guarantee ordering across calls, so indices are
/// derived from the sorted id list on every fetch. Identical rosters always
/// yield identical assignments.
pub fn assign_indices(mut ids: Vec<Uuid>) -> Vec<Entity> {
    ids.sort_unstable();
    ids.dedup();
    let population = ids.len();
    ids.into_iter()
        .enumerate()
        .map(|(index, id)| Entity {
            id,
            index,
            population,
        })
        .collect()
}

/// Source of the active patient and supervisor rosters.
#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn active_entities(&self) -> Result<Vec<Uuid>>;
    async fn active_supervisors(&self) -> Result<Vec<Uuid>>;
}

/// Fixed in-memory roster, used by the DSN-less demo mode and the test suite.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    patients: Vec<Uuid>,
    supervisors: Vec<Uuid>,
}

impl StaticRoster {
    pub fn new(patients: Vec<Uuid>, supervisors: Vec<Uuid>) -> Self {
        Self {
            patients,
            supervisors,
        }
    }

    /// Generate a synthetic roster of the requested size.
    pub fn synthetic(patients: usize, supervisors: usize) -> Self {
        Self {
            patients: (0..patients).map(|_| Uuid::new_v4()).collect(),
            supervisors: (0..supervisors).map(|_| Uuid::new_v4()).collect(),
        }
    }
}

#[async_trait]
impl RosterProvider for StaticRoster {
    async fn active_entities(&self) -> Result<Vec<Uuid>> {
        Ok(self.patients.clone())
    }

    async fn active_supervisors(&self) -> Result<Vec<Uuid>> {
        Ok(self.supervisors.clone())
    }
}

/// Roster backed by the upstream platform's Postgres tables.
#[derive(Clone)]
pub struct PgRoster {
    pool: DbPool,
}

impl PgRoster {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RosterProvider for PgRoster {
    async fn active_entities(&self) -> Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM patients WHERE active")
            .fetch_all(&self.pool)
            .await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(row.try_get("id")?);
        }
        Ok(ids)
    }

    async fn active_supervisors(&self) -> Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM care_team WHERE active")
            .fetch_all(&self.pool)
            .await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(row.try_get("id")?);
        }
        Ok(ids)
    }
}

//! Persistence for projects and the bids and milestones they embed.
//!
//! Writes are optimistic: a mutation reads the project, applies a lifecycle
//! transition in memory, then opens a transaction whose first statement is a
//! compare-and-set on `projects.version`. If another writer got there first
//! the transition is discarded and replayed against the fresh project, so a
//! caller only sees a conflict when the transition itself no longer holds.

use chrono::Utc;
use skillswap_core::{lifecycle::Payout, new_id, Bid, Earning, Milestone, Project, ProjectStatus};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::error::{AppError, Result};

const PROJECT_COLUMNS: &str = "id, title, description, budget, owner_id, status, freelancer_id, \
     accepted_bid_id, version, created_at, updated_at";

const BID_COLUMNS: &str = "id, project_id, freelancer_id, amount, message, status, \
     counter_amount, counter_message, created_at, updated_at";

const MILESTONE_COLUMNS: &str =
    "id, project_id, description, amount, due_date, status, created_at, updated_at";

/// Replays of a transition after losing the version race. Every lost round
/// means another writer committed, so this bounds the contention a single
/// request absorbs.
const WRITE_ATTEMPTS: u32 = 8;

#[derive(Debug, Default, Clone)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub owner_id: Option<String>,
    pub freelancer_id: Option<String>,
}

#[derive(Clone)]
pub struct ProjectStore {
    pool: SqlitePool,
}

impl ProjectStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let mut sql = format!("SELECT {PROJECT_COLUMNS} FROM projects p WHERE 1 = 1");
        if filter.status.is_some() {
            sql.push_str(" AND p.status = ?");
        }
        if filter.owner_id.is_some() {
            sql.push_str(" AND p.owner_id = ?");
        }
        if filter.freelancer_id.is_some() {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM bids b WHERE b.project_id = p.id AND b.freelancer_id = ?)",
            );
        }
        sql.push_str(" ORDER BY p.created_at DESC");

        let mut query = sqlx::query_as::<_, Project>(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status);
        }
        if let Some(owner_id) = &filter.owner_id {
            query = query.bind(owner_id);
        }
        if let Some(freelancer_id) = &filter.freelancer_id {
            query = query.bind(freelancer_id);
        }

        let mut projects = query.fetch_all(&self.pool).await?;
        for project in &mut projects {
            load_children(&self.pool, project).await?;
        }
        Ok(projects)
    }

    pub async fn fetch(&self, id: &str) -> Result<Project> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?");
        let mut project = sqlx::query_as::<_, Project>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

        load_children(&self.pool, &mut project).await?;
        Ok(project)
    }

    pub async fn create(
        &self,
        owner_id: &str,
        title: &str,
        description: &str,
        budget: f64,
    ) -> Result<Project> {
        let now = Utc::now();
        let project = Project {
            id: new_id(),
            title: title.to_string(),
            description: description.to_string(),
            budget,
            owner_id: owner_id.to_string(),
            status: ProjectStatus::Open,
            freelancer_id: None,
            accepted_bid_id: None,
            bids: Vec::new(),
            milestones: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO projects (id, title, description, budget, owner_id, status, version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&project.id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(project.budget)
        .bind(&project.owner_id)
        .bind(project.status)
        .bind(project.version)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(project_id = %project.id, owner_id, "project created");
        Ok(project)
    }

    /// Deletes the project together with its bids and milestones. A project
    /// that is in progress is kept, even if it got there after the caller
    /// last looked.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM projects WHERE id = ? AND status != ?")
            .bind(id)
            .bind(ProjectStatus::InProgress)
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            let mut conn = self.pool.acquire().await?;
            let current = current_status(&mut *conn, id).await?;
            return Err(AppError::Conflict {
                message: format!("Cannot delete a project that is {current}"),
                current_status: Some(current.to_string()),
            });
        }
        Ok(())
    }

    /// Applies `apply` to the current project and persists the outcome
    /// atomically. `apply` may run more than once.
    pub async fn mutate<T, F>(&self, id: &str, apply: F) -> Result<(Project, T)>
    where
        F: FnMut(&mut Project) -> Result<T>,
    {
        let (tx, after, out) = self.apply_versioned(id, apply).await?;
        tx.commit().await?;
        Ok((after, out))
    }

    /// Like [`ProjectStore::mutate`] for transitions that may complete the
    /// project. The payout is booked in the earnings ledger inside the same
    /// transaction as the status change.
    pub async fn settle<F>(&self, id: &str, apply: F) -> Result<(Project, Option<Earning>)>
    where
        F: FnMut(&mut Project) -> Result<Option<Payout>>,
    {
        let (mut tx, after, payout) = self.apply_versioned(id, apply).await?;
        let earning = match payout {
            Some(payout) => Some(record_earning(&mut *tx, &after, payout).await?),
            None => None,
        };
        tx.commit().await?;

        if let Some(earning) = &earning {
            tracing::info!(
                project_id = %earning.project_id,
                freelancer_id = %earning.user_id,
                amount = earning.amount,
                "project completed"
            );
        }
        Ok((after, earning))
    }

    /// Runs the read, apply, compare-and-set cycle until a write lands, and
    /// hands back the open transaction holding it.
    async fn apply_versioned<T, F>(
        &self,
        id: &str,
        mut apply: F,
    ) -> Result<(Transaction<'static, Sqlite>, Project, T)>
    where
        F: FnMut(&mut Project) -> Result<T>,
    {
        for attempt in 1..=WRITE_ATTEMPTS {
            let before = self.fetch(id).await?;
            let mut after = before.clone();
            let out = apply(&mut after)?;
            after.version = before.version + 1;

            let mut tx = self.pool.begin().await?;
            if write(&mut *tx, &before, &after).await? {
                return Ok((tx, after, out));
            }
            tracing::debug!(project_id = id, attempt, "project changed underneath, replaying");
        }

        let mut conn = self.pool.acquire().await?;
        let current = current_status(&mut *conn, id).await?;
        tracing::warn!(
            project_id = id,
            current_status = %current,
            attempts = WRITE_ATTEMPTS,
            "gave up on contended project update"
        );
        Err(AppError::Conflict {
            message: format!("Project is under heavy contention and is now {current}"),
            current_status: Some(current.to_string()),
        })
    }
}

/// Writes `after` if the stored version still matches `before`. Returns
/// false, having written nothing, when another writer got there first.
async fn write(conn: &mut SqliteConnection, before: &Project, after: &Project) -> Result<bool> {
    // The version check must be the first statement so the transaction
    // takes the write lock before anything else happens.
    let updated = sqlx::query(
        r#"
        UPDATE projects
        SET title = ?, description = ?, budget = ?, status = ?, freelancer_id = ?,
            accepted_bid_id = ?, version = ?, updated_at = ?
        WHERE id = ? AND version = ?
        "#,
    )
    .bind(&after.title)
    .bind(&after.description)
    .bind(after.budget)
    .bind(after.status)
    .bind(&after.freelancer_id)
    .bind(&after.accepted_bid_id)
    .bind(after.version)
    .bind(after.updated_at)
    .bind(&after.id)
    .bind(before.version)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Ok(false);
    }

    for (position, bid) in after.bids.iter().enumerate() {
        match before.bid(&bid.id) {
            None => insert_bid(conn, bid, position as i64).await?,
            Some(old) if old != bid => update_bid(conn, bid).await?,
            Some(_) => {}
        }
    }

    for (position, milestone) in after.milestones.iter().enumerate() {
        match before.milestone(&milestone.id) {
            None => insert_milestone(conn, milestone, position as i64).await?,
            Some(old) if old != milestone => update_milestone(conn, milestone).await?,
            Some(_) => {}
        }
    }

    Ok(true)
}

async fn current_status(conn: &mut SqliteConnection, id: &str) -> Result<ProjectStatus> {
    sqlx::query_scalar::<_, ProjectStatus>("SELECT status FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

async fn load_children(pool: &SqlitePool, project: &mut Project) -> Result<()> {
    project.bids = sqlx::query_as::<_, Bid>(&format!(
        "SELECT {BID_COLUMNS} FROM bids WHERE project_id = ? ORDER BY position ASC"
    ))
    .bind(&project.id)
    .fetch_all(pool)
    .await?;

    project.milestones = sqlx::query_as::<_, Milestone>(&format!(
        "SELECT {MILESTONE_COLUMNS} FROM milestones WHERE project_id = ? ORDER BY position ASC"
    ))
    .bind(&project.id)
    .fetch_all(pool)
    .await?;

    Ok(())
}

async fn insert_bid(conn: &mut SqliteConnection, bid: &Bid, position: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO bids (id, project_id, position, freelancer_id, amount, message, status, counter_amount, counter_message, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&bid.id)
    .bind(&bid.project_id)
    .bind(position)
    .bind(&bid.freelancer_id)
    .bind(bid.amount)
    .bind(&bid.message)
    .bind(bid.status)
    .bind(bid.counter_amount)
    .bind(&bid.counter_message)
    .bind(bid.created_at)
    .bind(bid.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_bid(conn: &mut SqliteConnection, bid: &Bid) -> Result<()> {
    sqlx::query(
        "UPDATE bids SET amount = ?, message = ?, status = ?, counter_amount = ?, counter_message = ?, updated_at = ? WHERE id = ?",
    )
    .bind(bid.amount)
    .bind(&bid.message)
    .bind(bid.status)
    .bind(bid.counter_amount)
    .bind(&bid.counter_message)
    .bind(bid.updated_at)
    .bind(&bid.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_milestone(
    conn: &mut SqliteConnection,
    milestone: &Milestone,
    position: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO milestones (id, project_id, position, description, amount, due_date, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&milestone.id)
    .bind(&milestone.project_id)
    .bind(position)
    .bind(&milestone.description)
    .bind(milestone.amount)
    .bind(milestone.due_date)
    .bind(milestone.status)
    .bind(milestone.created_at)
    .bind(milestone.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_milestone(conn: &mut SqliteConnection, milestone: &Milestone) -> Result<()> {
    sqlx::query(
        "UPDATE milestones SET description = ?, amount = ?, due_date = ?, status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&milestone.description)
    .bind(milestone.amount)
    .bind(milestone.due_date)
    .bind(milestone.status)
    .bind(milestone.updated_at)
    .bind(&milestone.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn record_earning(
    conn: &mut SqliteConnection,
    project: &Project,
    payout: Payout,
) -> Result<Earning> {
    let earning = Earning {
        id: new_id(),
        user_id: payout.freelancer_id,
        project_id: payout.project_id,
        project_title: project.title.clone(),
        amount: payout.amount,
        earned_at: project.updated_at,
    };

    sqlx::query(
        "INSERT INTO earnings (id, user_id, project_id, project_title, amount, earned_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&earning.id)
    .bind(&earning.user_id)
    .bind(&earning.project_id)
    .bind(&earning.project_title)
    .bind(earning.amount)
    .bind(earning.earned_at)
    .execute(&mut *conn)
    .await?;

    Ok(earning)
}

/// Owner-only guard shared by the lifecycle routes.
pub fn require_owner(project: &Project, user_id: &str, action: &str) -> Result<()> {
    if project.owner_id == user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("Only the project owner can {action}")))
    }
}


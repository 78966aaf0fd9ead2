use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use skillswap_core::{
    new_id, validate_id, validate_user_id, Earning, EarningsSummary, Experience, FreelancerProfile,
    Role, User,
};
use sqlx::SqlitePool;

use crate::{
    db::models::ProfileRow,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    AppState,
};

const EXPERIENCE_COLUMNS: &str =
    "id, user_id, title, company, start_date, end_date, description";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/skills", get(list_skills))
        .route("/earnings", get(earnings))
        .route("/freelancer/profile", put(update_profile))
        .route("/freelancer/experience", post(add_experience))
        .route(
            "/freelancer/experience/:id",
            put(update_experience).delete(delete_experience),
        )
        .route("/freelancer/:id", get(freelancer_profile))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub title: Option<String>,
    pub bio: Option<String>,
    pub hourly_rate: Option<f64>,
    pub skills: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceRequest {
    pub title: String,
    pub company: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
}

impl ExperienceRequest {
    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() || self.company.trim().is_empty() {
            return Err(AppError::Validation(
                "Experience title and company are required".to_string(),
            ));
        }
        if matches!(self.end_date, Some(end) if end < self.start_date) {
            return Err(AppError::Validation(
                "End date cannot be before start date".to_string(),
            ));
        }
        Ok(())
    }
}

async fn load_profile(pool: &SqlitePool, user_id: &str) -> Result<FreelancerProfile> {
    let row = sqlx::query_as::<_, ProfileRow>(
        r#"
        SELECT u.id, u.email, u.name, u.role, fp.title, fp.bio, fp.hourly_rate, fp.skills
        FROM users u
        LEFT JOIN freelancer_profiles fp ON fp.user_id = u.id
        WHERE u.id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .filter(|row| row.role == Role::Freelancer)
    .ok_or_else(|| AppError::NotFound("Freelancer not found".to_string()))?;

    let experience = sqlx::query_as::<_, Experience>(&format!(
        "SELECT {EXPERIENCE_COLUMNS} FROM experiences WHERE user_id = ? ORDER BY start_date DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(row.into_profile(experience))
}

async fn fetch_experience(pool: &SqlitePool, id: &str, user_id: &str) -> Result<Experience> {
    let experience = sqlx::query_as::<_, Experience>(&format!(
        "SELECT {EXPERIENCE_COLUMNS} FROM experiences WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Experience not found".to_string()))?;

    if experience.user_id != user_id {
        return Err(AppError::Forbidden(
            "Cannot modify another user's experience".to_string(),
        ));
    }
    Ok(experience)
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, name, role, created_at FROM users WHERE id = ?",
    )
    .bind(&user.id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}

async fn freelancer_profile(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<FreelancerProfile>> {
    validate_user_id("Freelancer", &id)?;
    Ok(Json(load_profile(&state.db.pool, &id).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<FreelancerProfile>> {
    user.require_role(Role::Freelancer, "Only freelancers have a profile")?;
    if matches!(body.hourly_rate, Some(rate) if !rate.is_finite() || rate < 0.0) {
        return Err(AppError::Validation(
            "Hourly rate must be a non-negative number".to_string(),
        ));
    }

    let current = load_profile(&state.db.pool, &user.id).await?;
    let skills = match body.skills {
        Some(skills) => normalize_skills(skills),
        None => current.skills,
    };
    let skills = serde_json::to_string(&skills)
        .map_err(|err| AppError::Internal(err.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO freelancer_profiles (user_id, title, bio, hourly_rate, skills, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id) DO UPDATE SET
            title = excluded.title,
            bio = excluded.bio,
            hourly_rate = excluded.hourly_rate,
            skills = excluded.skills,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&user.id)
    .bind(body.title.unwrap_or(current.title))
    .bind(body.bio.unwrap_or(current.bio))
    .bind(body.hourly_rate.or(current.hourly_rate))
    .bind(&skills)
    .bind(Utc::now())
    .execute(&state.db.pool)
    .await?;

    Ok(Json(load_profile(&state.db.pool, &user.id).await?))
}

/// Trims, drops blanks and de-duplicates case-insensitively, keeping the
/// first spelling seen.
fn normalize_skills(skills: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    skills
        .into_iter()
        .map(|skill| skill.trim().to_string())
        .filter(|skill| !skill.is_empty() && seen.insert(skill.to_lowercase()))
        .collect()
}

async fn add_experience(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ExperienceRequest>,
) -> Result<Json<Experience>> {
    user.require_role(Role::Freelancer, "Only freelancers can add experience")?;
    body.validate()?;

    let experience = Experience {
        id: new_id(),
        user_id: user.id,
        title: body.title.trim().to_string(),
        company: body.company.trim().to_string(),
        start_date: body.start_date,
        end_date: body.end_date,
        description: body.description,
    };

    sqlx::query(
        "INSERT INTO experiences (id, user_id, title, company, start_date, end_date, description) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&experience.id)
    .bind(&experience.user_id)
    .bind(&experience.title)
    .bind(&experience.company)
    .bind(experience.start_date)
    .bind(experience.end_date)
    .bind(&experience.description)
    .execute(&state.db.pool)
    .await?;

    Ok(Json(experience))
}

async fn update_experience(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<ExperienceRequest>,
) -> Result<Json<Experience>> {
    validate_id("Experience", &id)?;
    body.validate()?;
    let mut experience = fetch_experience(&state.db.pool, &id, &user.id).await?;

    experience.title = body.title.trim().to_string();
    experience.company = body.company.trim().to_string();
    experience.start_date = body.start_date;
    experience.end_date = body.end_date;
    experience.description = body.description;

    sqlx::query(
        "UPDATE experiences SET title = ?, company = ?, start_date = ?, end_date = ?, description = ? WHERE id = ?",
    )
    .bind(&experience.title)
    .bind(&experience.company)
    .bind(experience.start_date)
    .bind(experience.end_date)
    .bind(&experience.description)
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    Ok(Json(experience))
}

async fn delete_experience(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    validate_id("Experience", &id)?;
    fetch_experience(&state.db.pool, &id, &user.id).await?;

    sqlx::query("DELETE FROM experiences WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;
    Ok(Json(()))
}

async fn earnings(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<EarningsSummary>> {
    user.require_role(Role::Freelancer, "Only freelancers have earnings")?;

    let history = sqlx::query_as::<_, Earning>(
        r#"
        SELECT id, user_id, project_id, project_title, amount, earned_at
        FROM earnings
        WHERE user_id = ?
        ORDER BY earned_at DESC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(EarningsSummary::from_history(history, Utc::now())))
}

/// Every skill any freelancer lists, sorted and de-duplicated.
async fn list_skills(State(state): State<AppState>, _user: AuthUser) -> Result<Json<Vec<String>>> {
    let rows: Vec<String> = sqlx::query_scalar("SELECT skills FROM freelancer_profiles")
        .fetch_all(&state.db.pool)
        .await?;

    let mut skills = BTreeSet::new();
    for raw in rows {
        let parsed: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
        skills.extend(parsed.into_iter().map(|skill| skill.trim().to_string()));
    }
    skills.remove("");
    Ok(Json(skills.into_iter().collect()))
}

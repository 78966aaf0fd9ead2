use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use skillswap_core::{
    new_id, validate_id, validate_user_id, FreelancerReviews, ProjectStatus, Review,
};

use crate::{
    error::{AppError, Result},
    middleware::auth::AuthUser,
    AppState,
};

const REVIEW_COLUMNS: &str =
    "id, project_id, reviewer_id, reviewee_id, rating, comment, response, created_at";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_review))
        .route("/project/:project_id", get(list_project_reviews))
        .route("/user/:reviewer_id", get(list_reviews_by_reviewer))
        .route("/freelancer/:freelancer_id", get(freelancer_reviews))
        .route("/:id", delete(delete_review))
        .route("/:id/response", put(respond_to_review))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub project_id: String,
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct ResponseRequest {
    pub response: String,
}

async fn fetch_review(pool: &sqlx::SqlitePool, id: &str) -> Result<Review> {
    sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Review not found".to_string()))
}

async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateReviewRequest>,
) -> Result<Json<Review>> {
    validate_id("Project", &body.project_id)?;
    if !(1..=5).contains(&body.rating) {
        return Err(AppError::Validation(
            "Rating must be between 1 and 5".to_string(),
        ));
    }

    let project = state.projects.fetch(&body.project_id).await?;
    if project.status != ProjectStatus::Completed {
        return Err(AppError::Conflict {
            message: "Only completed projects can be reviewed".to_string(),
            current_status: Some(project.status.to_string()),
        });
    }

    // The owner reviews the hired freelancer and vice versa.
    let reviewee_id = if project.owner_id == user.id {
        project.freelancer_id.clone()
    } else if project.is_hired_freelancer(&user.id) {
        Some(project.owner_id.clone())
    } else {
        None
    }
    .ok_or_else(|| {
        AppError::Forbidden("Only project participants can leave a review".to_string())
    })?;

    let review = Review {
        id: new_id(),
        project_id: project.id,
        reviewer_id: user.id,
        reviewee_id,
        rating: body.rating,
        comment: body.comment.trim().to_string(),
        response: None,
        created_at: Utc::now(),
    };

    let inserted = sqlx::query(
        r#"
        INSERT INTO reviews (id, project_id, reviewer_id, reviewee_id, rating, comment, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (project_id, reviewer_id) DO NOTHING
        "#,
    )
    .bind(&review.id)
    .bind(&review.project_id)
    .bind(&review.reviewer_id)
    .bind(&review.reviewee_id)
    .bind(review.rating)
    .bind(&review.comment)
    .bind(review.created_at)
    .execute(&state.db.pool)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(AppError::Conflict {
            message: "You have already reviewed this project".to_string(),
            current_status: None,
        });
    }

    tracing::info!(review_id = %review.id, project_id = %review.project_id, "review created");
    Ok(Json(review))
}

async fn list_project_reviews(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<Review>>> {
    validate_id("Project", &project_id)?;
    let reviews = sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE project_id = ? ORDER BY created_at DESC"
    ))
    .bind(&project_id)
    .fetch_all(&state.db.pool)
    .await?;
    Ok(Json(reviews))
}

async fn list_reviews_by_reviewer(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(reviewer_id): Path<String>,
) -> Result<Json<Vec<Review>>> {
    validate_user_id("User", &reviewer_id)?;
    let reviews = sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE reviewer_id = ? ORDER BY created_at DESC"
    ))
    .bind(&reviewer_id)
    .fetch_all(&state.db.pool)
    .await?;
    Ok(Json(reviews))
}

async fn freelancer_reviews(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(freelancer_id): Path<String>,
) -> Result<Json<FreelancerReviews>> {
    validate_user_id("Freelancer", &freelancer_id)?;
    let reviews = sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE reviewee_id = ? ORDER BY created_at DESC"
    ))
    .bind(&freelancer_id)
    .fetch_all(&state.db.pool)
    .await?;
    Ok(Json(FreelancerReviews::new(reviews)))
}

async fn respond_to_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<ResponseRequest>,
) -> Result<Json<Review>> {
    validate_id("Review", &id)?;
    let response = body.response.trim();
    if response.is_empty() {
        return Err(AppError::Validation("Response text is required".to_string()));
    }

    let mut review = fetch_review(&state.db.pool, &id).await?;
    if review.reviewee_id != user.id {
        return Err(AppError::Forbidden(
            "Only the reviewed user can respond".to_string(),
        ));
    }

    let updated = sqlx::query("UPDATE reviews SET response = ? WHERE id = ? AND response IS NULL")
        .bind(response)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::Conflict {
            message: "Review already has a response".to_string(),
            current_status: None,
        });
    }

    review.response = Some(response.to_string());
    Ok(Json(review))
}

async fn delete_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    validate_id("Review", &id)?;
    let review = fetch_review(&state.db.pool, &id).await?;
    if review.reviewer_id != user.id {
        return Err(AppError::Forbidden(
            "Only the reviewer can delete a review".to_string(),
        ));
    }

    sqlx::query("DELETE FROM reviews WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;
    Ok(Json(()))
}

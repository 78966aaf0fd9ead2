use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use skillswap_core::{
    lifecycle, validate_id, Earning, MilestoneStatus, Project, ProjectStatus, Role,
};

use crate::{
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::projects::{require_owner, ProjectFilter},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/:id/status", put(update_project_status))
        .route("/:id/complete", put(complete_project))
        .route("/:id/bids", post(submit_bid))
        .route("/:id/bids/:bid_id/accept", put(accept_bid))
        .route("/:id/bids/:bid_id/reject", put(reject_bid))
        .route("/:id/bids/:bid_id/counter", put(counter_bid))
        .route("/:id/milestones", post(add_milestone))
        .route(
            "/:id/milestones/:milestone_id/status",
            put(update_milestone_status),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub status: Option<ProjectStatus>,
    /// Only projects owned by, or bid on by, the caller.
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub budget: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub budget: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ProjectStatus,
}

#[derive(Debug, Deserialize)]
pub struct BidRequest {
    pub amount: f64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneRequest {
    pub description: String,
    pub amount: Option<f64>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct MilestoneStatusRequest {
    pub status: MilestoneStatus,
}

#[derive(Debug, Deserialize)]
pub struct BidPathParams {
    pub id: String,
    pub bid_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MilestonePathParams {
    pub id: String,
    pub milestone_id: String,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub project: Project,
    pub earnings: Option<Earning>,
}

fn validate_budget(budget: f64) -> Result<()> {
    if budget.is_finite() && budget > 0.0 {
        Ok(())
    } else {
        Err(AppError::Validation(
            "Budget must be a positive number".to_string(),
        ))
    }
}

async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Project>>> {
    let mut filter = ProjectFilter {
        status: query.status,
        ..Default::default()
    };
    if query.mine {
        match user.role {
            Role::Client => filter.owner_id = Some(user.id),
            Role::Freelancer => filter.freelancer_id = Some(user.id),
        }
    }

    Ok(Json(state.projects.list(&filter).await?))
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<Project>> {
    user.require_role(Role::Client, "Only clients can post projects")?;
    if body.title.trim().is_empty() {
        return Err(AppError::Validation("Project title is required".to_string()));
    }
    validate_budget(body.budget)?;

    let project = state
        .projects
        .create(&user.id, body.title.trim(), &body.description, body.budget)
        .await?;
    Ok(Json(project))
}

async fn get_project(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Project>> {
    validate_id("Project", &id)?;
    Ok(Json(state.projects.fetch(&id).await?))
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<Project>> {
    validate_id("Project", &id)?;
    if let Some(budget) = body.budget {
        validate_budget(budget)?;
    }

    let (project, ()) = state
        .projects
        .mutate(&id, |project| {
            require_owner(project, &user.id, "edit this project")?;
            if project.status != ProjectStatus::Open {
                return Err(AppError::Conflict {
                    message: format!("Cannot edit a project that is {}", project.status),
                    current_status: Some(project.status.to_string()),
                });
            }
            if let Some(title) = &body.title {
                if title.trim().is_empty() {
                    return Err(AppError::Validation("Project title is required".to_string()));
                }
                project.title = title.trim().to_string();
            }
            if let Some(description) = &body.description {
                project.description = description.clone();
            }
            if let Some(budget) = body.budget {
                project.budget = budget;
            }
            project.updated_at = Utc::now();
            Ok(())
        })
        .await?;

    Ok(Json(project))
}

async fn update_project_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Project>> {
    validate_id("Project", &id)?;
    let (project, _) = state
        .projects
        .settle(&id, |project| {
            require_owner(project, &user.id, "change the project status")?;
            Ok(lifecycle::update_status(project, body.status, Utc::now())?)
        })
        .await?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    validate_id("Project", &id)?;
    let project = state.projects.fetch(&id).await?;

    // Only owner can delete project
    require_owner(&project, &user.id, "delete this project")?;

    // The status guard lives in the DELETE itself, so an accept landing
    // after the fetch above still wins.
    state.projects.delete(&id).await?;
    tracing::info!(project_id = %id, "project deleted");
    Ok(Json(()))
}

async fn submit_bid(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<BidRequest>,
) -> Result<Json<Project>> {
    validate_id("Project", &id)?;
    user.require_role(Role::Freelancer, "Only freelancers can submit bids")?;

    let (project, bid_id) = state
        .projects
        .mutate(&id, |project| {
            if project.owner_id == user.id {
                return Err(AppError::Forbidden(
                    "Cannot bid on your own project".to_string(),
                ));
            }
            let bid =
                lifecycle::submit_bid(project, &user.id, body.amount, &body.message, Utc::now())?;
            Ok(bid.id.clone())
        })
        .await?;

    tracing::info!(project_id = %id, %bid_id, freelancer_id = %user.id, "bid submitted");
    Ok(Json(project))
}

async fn accept_bid(
    State(state): State<AppState>,
    user: AuthUser,
    Path(params): Path<BidPathParams>,
) -> Result<Json<Project>> {
    validate_id("Project", &params.id)?;
    validate_id("Bid", &params.bid_id)?;

    let (project, ()) = state
        .projects
        .mutate(&params.id, |project| {
            require_owner(project, &user.id, "accept bids")?;
            Ok(lifecycle::accept_bid(project, &params.bid_id, Utc::now())?)
        })
        .await?;

    tracing::info!(project_id = %params.id, bid_id = %params.bid_id, "bid accepted");
    Ok(Json(project))
}

async fn reject_bid(
    State(state): State<AppState>,
    user: AuthUser,
    Path(params): Path<BidPathParams>,
) -> Result<Json<Project>> {
    validate_id("Project", &params.id)?;
    validate_id("Bid", &params.bid_id)?;

    let (project, ()) = state
        .projects
        .mutate(&params.id, |project| {
            require_owner(project, &user.id, "reject bids")?;
            Ok(lifecycle::reject_bid(project, &params.bid_id, Utc::now())?)
        })
        .await?;
    Ok(Json(project))
}

async fn counter_bid(
    State(state): State<AppState>,
    user: AuthUser,
    Path(params): Path<BidPathParams>,
    Json(body): Json<BidRequest>,
) -> Result<Json<Project>> {
    validate_id("Project", &params.id)?;
    validate_id("Bid", &params.bid_id)?;

    let (project, ()) = state
        .projects
        .mutate(&params.id, |project| {
            require_owner(project, &user.id, "counter bids")?;
            Ok(lifecycle::send_counter_offer(
                project,
                &params.bid_id,
                body.amount,
                &body.message,
                Utc::now(),
            )?)
        })
        .await?;
    Ok(Json(project))
}

async fn complete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<CompleteResponse>> {
    validate_id("Project", &id)?;
    let (project, earnings) = state
        .projects
        .settle(&id, |project| {
            require_owner(project, &user.id, "complete this project")?;
            Ok(Some(lifecycle::complete_project(project, Utc::now())?))
        })
        .await?;
    Ok(Json(CompleteResponse { project, earnings }))
}

async fn add_milestone(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<MilestoneRequest>,
) -> Result<Json<Project>> {
    validate_id("Project", &id)?;
    if body.description.trim().is_empty() {
        return Err(AppError::Validation(
            "Milestone description is required".to_string(),
        ));
    }

    let (project, _) = state
        .projects
        .mutate(&id, |project| {
            require_owner(project, &user.id, "add milestones")?;
            let milestone = lifecycle::add_milestone(
                project,
                body.description.trim(),
                body.amount,
                body.due_date,
                Utc::now(),
            )?;
            Ok(milestone.id.clone())
        })
        .await?;
    Ok(Json(project))
}

async fn update_milestone_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(params): Path<MilestonePathParams>,
    Json(body): Json<MilestoneStatusRequest>,
) -> Result<Json<Project>> {
    validate_id("Project", &params.id)?;
    validate_id("Milestone", &params.milestone_id)?;

    let (project, ()) = state
        .projects
        .mutate(&params.id, |project| {
            if project.owner_id != user.id && !project.is_hired_freelancer(&user.id) {
                return Err(AppError::Forbidden(
                    "Only the owner or the hired freelancer can update milestones".to_string(),
                ));
            }
            Ok(lifecycle::update_milestone_status(
                project,
                &params.milestone_id,
                body.status,
                Utc::now(),
            )?)
        })
        .await?;
    Ok(Json(project))
}

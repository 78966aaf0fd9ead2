//! Project, bid and milestone state transitions.
//!
//! Every function here takes the project by mutable reference and either
//! applies the whole transition or returns an error leaving the project
//! untouched. Persistence decides how the resulting state is written.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Bid, BidStatus, Milestone, MilestoneStatus, Project, ProjectStatus};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LifecycleError {
    #[error("Cannot {action}: project is {current}")]
    ProjectStatus {
        action: &'static str,
        current: ProjectStatus,
    },

    #[error("Bid is not pending (currently {current})")]
    BidNotPending { bid_id: String, current: BidStatus },

    #[error("Cannot {action}: bid is {current}")]
    BidStatus {
        action: &'static str,
        bid_id: String,
        current: BidStatus,
    },

    #[error("Bid not found")]
    BidNotFound(String),

    #[error("Milestone not found")]
    MilestoneNotFound(String),

    #[error("Milestone cannot move from {from} to {to}")]
    MilestoneTransition {
        from: MilestoneStatus,
        to: MilestoneStatus,
    },

    #[error("You already have an active bid on this project")]
    DuplicateBid,

    #[error("Amount must be a positive number")]
    InvalidAmount,

    #[error("Project has no accepted bid")]
    NoAcceptedBid,

    #[error("Project cannot be moved to {0} directly")]
    UnsupportedTransition(ProjectStatus),
}

impl LifecycleError {
    /// The status that made the transition invalid, for callers that need to
    /// tell a stale read apart from a bad request.
    pub fn current_status(&self) -> Option<String> {
        match self {
            Self::ProjectStatus { current, .. } => Some(current.to_string()),
            Self::BidNotPending { current, .. } | Self::BidStatus { current, .. } => {
                Some(current.to_string())
            }
            Self::MilestoneTransition { from, .. } => Some(from.to_string()),
            _ => None,
        }
    }

    /// Errors caused by the current state rather than by the request itself.
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            Self::ProjectStatus { .. }
                | Self::BidNotPending { .. }
                | Self::BidStatus { .. }
                | Self::MilestoneTransition { .. }
                | Self::DuplicateBid
                | Self::NoAcceptedBid
        )
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Money owed to the hired freelancer once a project completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Payout {
    pub project_id: String,
    pub freelancer_id: String,
    pub amount: f64,
}

fn require_status(
    project: &Project,
    action: &'static str,
    allowed: &[ProjectStatus],
) -> Result<()> {
    if allowed.contains(&project.status) {
        Ok(())
    } else {
        Err(LifecycleError::ProjectStatus {
            action,
            current: project.status,
        })
    }
}

fn validate_amount(amount: f64) -> Result<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(LifecycleError::InvalidAmount)
    }
}

fn bid_index(project: &Project, bid_id: &str) -> Result<usize> {
    project
        .bids
        .iter()
        .position(|b| b.id == bid_id)
        .ok_or_else(|| LifecycleError::BidNotFound(bid_id.to_string()))
}

fn touch(project: &mut Project, now: DateTime<Utc>) {
    project.updated_at = now;
}

pub fn submit_bid<'a>(
    project: &'a mut Project,
    freelancer_id: &str,
    amount: f64,
    message: &str,
    now: DateTime<Utc>,
) -> Result<&'a Bid> {
    require_status(project, "submit a bid", &[ProjectStatus::Open])?;
    validate_amount(amount)?;

    if project
        .bids
        .iter()
        .any(|b| b.freelancer_id == freelancer_id && b.status.is_live())
    {
        return Err(LifecycleError::DuplicateBid);
    }

    project.bids.push(Bid {
        id: Uuid::new_v4().to_string(),
        project_id: project.id.clone(),
        freelancer_id: freelancer_id.to_string(),
        amount,
        message: message.to_string(),
        status: BidStatus::Pending,
        counter_amount: None,
        counter_message: None,
        created_at: now,
        updated_at: now,
    });
    touch(project, now);

    let last = project.bids.len() - 1;
    Ok(&project.bids[last])
}

/// Selects the winning bid. Every other bid is rejected and the project
/// moves to `in_progress` in the same step.
pub fn accept_bid(project: &mut Project, bid_id: &str, now: DateTime<Utc>) -> Result<()> {
    let idx = bid_index(project, bid_id)?;
    let current = project.bids[idx].status;
    if current != BidStatus::Pending {
        return Err(LifecycleError::BidNotPending {
            bid_id: bid_id.to_string(),
            current,
        });
    }
    require_status(project, "accept a bid", &[ProjectStatus::Open])?;

    for (i, bid) in project.bids.iter_mut().enumerate() {
        let next = if i == idx {
            BidStatus::Accepted
        } else {
            BidStatus::Rejected
        };
        if bid.status != next {
            bid.status = next;
            bid.updated_at = now;
        }
    }

    let winner = &project.bids[idx];
    project.freelancer_id = Some(winner.freelancer_id.clone());
    project.accepted_bid_id = Some(winner.id.clone());
    project.status = ProjectStatus::InProgress;
    touch(project, now);
    Ok(())
}

pub fn reject_bid(project: &mut Project, bid_id: &str, now: DateTime<Utc>) -> Result<()> {
    let idx = bid_index(project, bid_id)?;
    let bid = &mut project.bids[idx];
    if !bid.status.is_live() {
        return Err(LifecycleError::BidStatus {
            action: "reject bid",
            bid_id: bid_id.to_string(),
            current: bid.status,
        });
    }
    bid.status = BidStatus::Rejected;
    bid.updated_at = now;
    touch(project, now);
    Ok(())
}

pub fn send_counter_offer(
    project: &mut Project,
    bid_id: &str,
    amount: f64,
    message: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    require_status(project, "counter a bid", &[ProjectStatus::Open])?;
    validate_amount(amount)?;
    let idx = bid_index(project, bid_id)?;

    let bid = &mut project.bids[idx];
    if !bid.status.is_live() {
        return Err(LifecycleError::BidStatus {
            action: "counter bid",
            bid_id: bid_id.to_string(),
            current: bid.status,
        });
    }
    bid.status = BidStatus::Countered;
    bid.counter_amount = Some(amount);
    bid.counter_message = Some(message.to_string());
    bid.updated_at = now;
    touch(project, now);
    Ok(())
}

pub fn complete_project(project: &mut Project, now: DateTime<Utc>) -> Result<Payout> {
    require_status(project, "complete project", &[ProjectStatus::InProgress])?;
    let winner = project.accepted_bid().ok_or(LifecycleError::NoAcceptedBid)?;

    let payout = Payout {
        project_id: project.id.clone(),
        freelancer_id: winner.freelancer_id.clone(),
        amount: winner.amount,
    };
    project.status = ProjectStatus::Completed;
    touch(project, now);
    Ok(payout)
}

/// Cancellation is terminal. Bids still under negotiation are rejected.
pub fn cancel_project(project: &mut Project, now: DateTime<Utc>) -> Result<()> {
    require_status(
        project,
        "cancel project",
        &[ProjectStatus::Open, ProjectStatus::InProgress],
    )?;
    for bid in project.bids.iter_mut().filter(|b| b.status.is_live()) {
        bid.status = BidStatus::Rejected;
        bid.updated_at = now;
    }
    project.status = ProjectStatus::Cancelled;
    touch(project, now);
    Ok(())
}

/// Entry point for the generic status route. `in_progress` can only be
/// reached by accepting a bid.
pub fn update_status(
    project: &mut Project,
    target: ProjectStatus,
    now: DateTime<Utc>,
) -> Result<Option<Payout>> {
    match target {
        ProjectStatus::Cancelled => cancel_project(project, now).map(|_| None),
        ProjectStatus::Completed => complete_project(project, now).map(Some),
        other => Err(LifecycleError::UnsupportedTransition(other)),
    }
}

pub fn add_milestone<'a>(
    project: &'a mut Project,
    description: &str,
    amount: Option<f64>,
    due_date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<&'a Milestone> {
    require_status(
        project,
        "add a milestone",
        &[ProjectStatus::Open, ProjectStatus::InProgress],
    )?;
    if let Some(amount) = amount {
        validate_amount(amount)?;
    }

    project.milestones.push(Milestone {
        id: Uuid::new_v4().to_string(),
        project_id: project.id.clone(),
        description: description.to_string(),
        amount,
        due_date,
        status: MilestoneStatus::Pending,
        created_at: now,
        updated_at: now,
    });
    touch(project, now);

    let last = project.milestones.len() - 1;
    Ok(&project.milestones[last])
}

/// Milestones only move forward: pending, in_progress, completed.
pub fn update_milestone_status(
    project: &mut Project,
    milestone_id: &str,
    target: MilestoneStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    require_status(project, "update a milestone", &[ProjectStatus::InProgress])?;
    let milestone = project
        .milestones
        .iter_mut()
        .find(|m| m.id == milestone_id)
        .ok_or_else(|| LifecycleError::MilestoneNotFound(milestone_id.to_string()))?;

    if target <= milestone.status {
        return Err(LifecycleError::MilestoneTransition {
            from: milestone.status,
            to: target,
        });
    }
    milestone.status = target;
    milestone.updated_at = now;
    touch(project, now);
    Ok(())
}

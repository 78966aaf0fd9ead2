use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::integrity::verify_metadata_hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Freelancer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled projects accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Messaging is only allowed while the project is live.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
    Countered,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Countered => "countered",
        }
    }

    /// A live bid is still under negotiation.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Countered)
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Completed,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    pub project_id: String,
    pub freelancer_id: String,
    pub amount: f64,
    pub message: String,
    pub status: BidStatus,
    pub counter_amount: Option<f64>,
    pub counter_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    pub project_id: String,
    pub description: String,
    pub amount: Option<f64>,
    pub due_date: Option<NaiveDate>,
    pub status: MilestoneStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A project together with the bids and milestones it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    pub description: String,
    pub budget: f64,
    pub owner_id: String,
    pub status: ProjectStatus,
    pub freelancer_id: Option<String>,
    pub accepted_bid_id: Option<String>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub bids: Vec<Bid>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn bid(&self, bid_id: &str) -> Option<&Bid> {
        self.bids.iter().find(|b| b.id == bid_id)
    }

    pub fn milestone(&self, milestone_id: &str) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.id == milestone_id)
    }

    pub fn accepted_bid(&self) -> Option<&Bid> {
        self.bids.iter().find(|b| b.status == BidStatus::Accepted)
    }

    /// The owner, and every freelancer who has bid, take part in the
    /// project's conversation.
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.owner_id == user_id || self.bids.iter().any(|b| b.freelancer_id == user_id)
    }

    pub fn is_hired_freelancer(&self, user_id: &str) -> bool {
        self.freelancer_id.as_deref() == Some(user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub project_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    /// The sender's envelope timestamp in epoch milliseconds. Together with
    /// the ids it lets a receiver recompute `metadata_hash`.
    pub timestamp: i64,
    pub metadata_hash: String,
    pub read: bool,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Recomputes the envelope hash from the delivered fields.
    pub fn envelope_intact(&self) -> bool {
        verify_metadata_hash(
            &self.metadata_hash,
            &self.sender_id,
            &self.recipient_id,
            self.timestamp,
            &self.project_id,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub project_id: String,
    pub reviewer_id: String,
    pub reviewee_id: String,
    pub rating: i64,
    pub comment: String,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreelancerReviews {
    pub reviews: Vec<Review>,
    pub average_rating: f64,
    pub total_reviews: usize,
}

impl FreelancerReviews {
    pub fn new(reviews: Vec<Review>) -> Self {
        let total_reviews = reviews.len();
        let average_rating = if total_reviews == 0 {
            0.0
        } else {
            reviews.iter().map(|r| r.rating as f64).sum::<f64>() / total_reviews as f64
        };
        Self {
            reviews,
            average_rating,
            total_reviews,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub company: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreelancerProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub title: String,
    pub bio: String,
    pub hourly_rate: Option<f64>,
    pub skills: Vec<String>,
    pub experience: Vec<Experience>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Earning {
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    pub project_title: String,
    pub amount: f64,
    pub earned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyEarning {
    pub month: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsSummary {
    pub total: f64,
    pub monthly: f64,
    pub history: Vec<Earning>,
    pub monthly_data: Vec<MonthlyEarning>,
}

impl EarningsSummary {
    /// Totals the history, the current calendar month, and per-month sums
    /// sorted by `YYYY-MM`.
    pub fn from_history(history: Vec<Earning>, now: DateTime<Utc>) -> Self {
        let total = history.iter().map(|e| e.amount).sum();
        let monthly = history
            .iter()
            .filter(|e| e.earned_at.year() == now.year() && e.earned_at.month() == now.month())
            .map(|e| e.amount)
            .sum();

        let mut monthly_data: Vec<MonthlyEarning> = Vec::new();
        for earning in &history {
            let month = earning.earned_at.format("%Y-%m").to_string();
            match monthly_data.iter_mut().find(|m| m.month == month) {
                Some(entry) => entry.amount += earning.amount,
                None => monthly_data.push(MonthlyEarning {
                    month,
                    amount: earning.amount,
                }),
            }
        }
        monthly_data.sort_by(|a, b| a.month.cmp(&b.month));

        Self {
            total,
            monthly,
            history,
            monthly_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct NotificationTemplate {
    pub key: String,
    pub title: String,
    pub body: String,
}

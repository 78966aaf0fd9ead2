//! Typed access to the REST surface.
//!
//! Every method validates its identifiers and required fields first, so a
//! malformed request fails with [`ClientError::Validation`] without touching
//! the network.

use chrono::{NaiveDate, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use skillswap_core::{
    metadata_hash, validate_id, validate_user_id, Earning, EarningsSummary, Experience,
    FreelancerProfile, FreelancerReviews, Message, MilestoneStatus, NotificationTemplate, Project,
    ProjectStatus, Review, User,
};

use crate::{
    config::ClientConfig,
    error::{ClientError, Result},
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub budget: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectQuery {
    pub status: Option<ProjectStatus>,
    pub mine: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMilestone {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceInput {
    pub title: String,
    pub company: String,
    pub start_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub project_id: String,
    pub rating: i64,
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletedProject {
    pub project: Project,
    pub earnings: Option<Earning>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: String,
    current_status: Option<String>,
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(ClientError::Validation(format!("{what} is required")))
    } else {
        Ok(())
    }
}

fn require_amount(amount: f64, what: &str) -> Result<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(ClientError::Validation(format!(
            "{what} must be a positive number"
        )))
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        require(&token, "Token")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.api_url.clone(),
            token,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        parse(response).await
    }

    // Projects

    pub async fn list_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>> {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(status) = query.status {
            params.push(("status", status.as_str()));
        }
        if query.mine {
            params.push(("mine", "true"));
        }
        self.send(self.request(Method::GET, "/projects").query(&params))
            .await
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project> {
        validate_id("Project", project_id)?;
        self.send(self.request(Method::GET, &format!("/projects/{project_id}")))
            .await
    }

    pub async fn create_project(&self, project: &NewProject) -> Result<Project> {
        require(&project.title, "Project title")?;
        require_amount(project.budget, "Budget")?;
        self.send(self.request(Method::POST, "/projects").json(project))
            .await
    }

    pub async fn update_project(
        &self,
        project_id: &str,
        update: &ProjectUpdate,
    ) -> Result<Project> {
        validate_id("Project", project_id)?;
        if let Some(budget) = update.budget {
            require_amount(budget, "Budget")?;
        }
        self.send(
            self.request(Method::PUT, &format!("/projects/{project_id}"))
                .json(update),
        )
        .await
    }

    pub async fn update_project_status(
        &self,
        project_id: &str,
        status: ProjectStatus,
    ) -> Result<Project> {
        validate_id("Project", project_id)?;
        self.send(
            self.request(Method::PUT, &format!("/projects/{project_id}/status"))
                .json(&serde_json::json!({ "status": status })),
        )
        .await
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        validate_id("Project", project_id)?;
        self.send(self.request(Method::DELETE, &format!("/projects/{project_id}")))
            .await
    }

    pub async fn submit_bid(
        &self,
        project_id: &str,
        amount: f64,
        message: &str,
    ) -> Result<Project> {
        validate_id("Project", project_id)?;
        require_amount(amount, "Amount")?;
        self.send(
            self.request(Method::POST, &format!("/projects/{project_id}/bids"))
                .json(&serde_json::json!({ "amount": amount, "message": message })),
        )
        .await
    }

    pub async fn accept_bid(&self, project_id: &str, bid_id: &str) -> Result<Project> {
        self.bid_action(project_id, bid_id, "accept").await
    }

    pub async fn reject_bid(&self, project_id: &str, bid_id: &str) -> Result<Project> {
        self.bid_action(project_id, bid_id, "reject").await
    }

    pub async fn counter_bid(
        &self,
        project_id: &str,
        bid_id: &str,
        amount: f64,
        message: &str,
    ) -> Result<Project> {
        validate_id("Project", project_id)?;
        validate_id("Bid", bid_id)?;
        require_amount(amount, "Amount")?;
        self.send(
            self.request(
                Method::PUT,
                &format!("/projects/{project_id}/bids/{bid_id}/counter"),
            )
            .json(&serde_json::json!({ "amount": amount, "message": message })),
        )
        .await
    }

    async fn bid_action(&self, project_id: &str, bid_id: &str, action: &str) -> Result<Project> {
        validate_id("Project", project_id)?;
        validate_id("Bid", bid_id)?;
        self.send(self.request(
            Method::PUT,
            &format!("/projects/{project_id}/bids/{bid_id}/{action}"),
        ))
        .await
    }

    pub async fn complete_project(&self, project_id: &str) -> Result<CompletedProject> {
        validate_id("Project", project_id)?;
        self.send(self.request(Method::PUT, &format!("/projects/{project_id}/complete")))
            .await
    }

    pub async fn add_milestone(
        &self,
        project_id: &str,
        milestone: &NewMilestone,
    ) -> Result<Project> {
        validate_id("Project", project_id)?;
        require(&milestone.description, "Milestone description")?;
        self.send(
            self.request(Method::POST, &format!("/projects/{project_id}/milestones"))
                .json(milestone),
        )
        .await
    }

    pub async fn update_milestone_status(
        &self,
        project_id: &str,
        milestone_id: &str,
        status: MilestoneStatus,
    ) -> Result<Project> {
        validate_id("Project", project_id)?;
        validate_id("Milestone", milestone_id)?;
        self.send(
            self.request(
                Method::PUT,
                &format!("/projects/{project_id}/milestones/{milestone_id}/status"),
            )
            .json(&serde_json::json!({ "status": status })),
        )
        .await
    }

    // Reviews

    pub async fn create_review(&self, review: &NewReview) -> Result<Review> {
        validate_id("Project", &review.project_id)?;
        if !(1..=5).contains(&review.rating) {
            return Err(ClientError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ));
        }
        self.send(self.request(Method::POST, "/reviews").json(review))
            .await
    }

    pub async fn project_reviews(&self, project_id: &str) -> Result<Vec<Review>> {
        validate_id("Project", project_id)?;
        self.send(self.request(Method::GET, &format!("/reviews/project/{project_id}")))
            .await
    }

    pub async fn reviews_by(&self, reviewer_id: &str) -> Result<Vec<Review>> {
        validate_user_id("User", reviewer_id)?;
        self.send(self.request(Method::GET, &format!("/reviews/user/{reviewer_id}")))
            .await
    }

    pub async fn freelancer_reviews(&self, freelancer_id: &str) -> Result<FreelancerReviews> {
        validate_user_id("Freelancer", freelancer_id)?;
        self.send(self.request(
            Method::GET,
            &format!("/reviews/freelancer/{freelancer_id}"),
        ))
        .await
    }

    pub async fn respond_to_review(&self, review_id: &str, response: &str) -> Result<Review> {
        validate_id("Review", review_id)?;
        require(response, "Response text")?;
        self.send(
            self.request(Method::PUT, &format!("/reviews/{review_id}/response"))
                .json(&serde_json::json!({ "response": response })),
        )
        .await
    }

    pub async fn delete_review(&self, review_id: &str) -> Result<()> {
        validate_id("Review", review_id)?;
        self.send(self.request(Method::DELETE, &format!("/reviews/{review_id}")))
            .await
    }

    // Users

    pub async fn me(&self) -> Result<User> {
        self.send(self.request(Method::GET, "/users/me")).await
    }

    pub async fn freelancer_profile(&self, freelancer_id: &str) -> Result<FreelancerProfile> {
        validate_user_id("Freelancer", freelancer_id)?;
        self.send(self.request(
            Method::GET,
            &format!("/users/freelancer/{freelancer_id}"),
        ))
        .await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<FreelancerProfile> {
        self.send(
            self.request(Method::PUT, "/users/freelancer/profile")
                .json(update),
        )
        .await
    }

    pub async fn add_experience(&self, experience: &ExperienceInput) -> Result<Experience> {
        require(&experience.title, "Experience title")?;
        require(&experience.company, "Company")?;
        self.send(
            self.request(Method::POST, "/users/freelancer/experience")
                .json(experience),
        )
        .await
    }

    pub async fn update_experience(
        &self,
        experience_id: &str,
        experience: &ExperienceInput,
    ) -> Result<Experience> {
        validate_id("Experience", experience_id)?;
        require(&experience.title, "Experience title")?;
        require(&experience.company, "Company")?;
        self.send(
            self.request(
                Method::PUT,
                &format!("/users/freelancer/experience/{experience_id}"),
            )
            .json(experience),
        )
        .await
    }

    pub async fn delete_experience(&self, experience_id: &str) -> Result<()> {
        validate_id("Experience", experience_id)?;
        self.send(self.request(
            Method::DELETE,
            &format!("/users/freelancer/experience/{experience_id}"),
        ))
        .await
    }

    pub async fn earnings(&self) -> Result<EarningsSummary> {
        self.send(self.request(Method::GET, "/users/earnings")).await
    }

    pub async fn skills(&self) -> Result<Vec<String>> {
        self.send(self.request(Method::GET, "/users/skills")).await
    }

    // Messages

    pub async fn conversation(&self, project_id: &str, recipient_id: &str) -> Result<Vec<Message>> {
        validate_id("Project", project_id)?;
        validate_user_id("Recipient", recipient_id)?;
        self.send(self.request(
            Method::GET,
            &format!("/messages/{project_id}/{recipient_id}"),
        ))
        .await
    }

    /// Sends over REST. `sender_id` must be the token's user; the server
    /// recomputes the integrity hash with it.
    pub async fn send_message(
        &self,
        sender_id: &str,
        project_id: &str,
        recipient_id: &str,
        text: &str,
    ) -> Result<Message> {
        validate_id("Project", project_id)?;
        validate_user_id("Recipient", recipient_id)?;
        require(text, "Message text")?;

        let timestamp = Utc::now().timestamp_millis();
        self.send(self.request(Method::POST, "/messages").json(&serde_json::json!({
            "projectId": project_id,
            "recipientId": recipient_id,
            "text": text,
            "timestamp": timestamp,
            "metadataHash": metadata_hash(sender_id, recipient_id, timestamp, project_id),
        })))
        .await
    }

    pub async fn mark_message_read(&self, message_id: &str) -> Result<Message> {
        validate_id("Message", message_id)?;
        self.send(self.request(Method::PUT, &format!("/messages/{message_id}/read")))
            .await
    }

    pub async fn notification_templates(&self) -> Result<Vec<NotificationTemplate>> {
        self.send(self.request(Method::GET, "/notification-templates"))
            .await
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.json::<ErrorBody>().await.unwrap_or_else(|_| ErrorBody {
        message: status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string(),
        current_status: None,
    });
    tracing::debug!(status = status.as_u16(), message = %body.message, "request failed");

    Err(match status {
        StatusCode::BAD_REQUEST => ClientError::Validation(body.message),
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        StatusCode::FORBIDDEN => ClientError::Forbidden(body.message),
        StatusCode::NOT_FOUND => ClientError::NotFound(body.message),
        StatusCode::CONFLICT => ClientError::Conflict {
            message: body.message,
            current_status: body.current_status,
        },
        other => ClientError::Api {
            status: other.as_u16(),
            message: body.message,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        // Nothing listens here; validation must fail before any request.
        let config = ClientConfig::new("http://127.0.0.1:9/api", "ws://127.0.0.1:9/ws");
        ApiClient::new(&config, "token").unwrap()
    }

    #[tokio::test]
    async fn malformed_ids_fail_locally() {
        let err = client().get_project("nope").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(ref m) if m == "Invalid Project ID format"));

        let err = client().accept_bid("", "").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(ref m) if m == "Project ID is required"));
    }

    #[tokio::test]
    async fn missing_fields_fail_locally() {
        let err = client()
            .create_project(&NewProject {
                title: " ".to_string(),
                description: String::new(),
                budget: 10.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));

        let project_id = skillswap_core::new_id();
        let err = client().submit_bid(&project_id, 0.0, "").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[test]
    fn empty_token_is_rejected() {
        let config = ClientConfig::new("http://localhost/api", "ws://localhost/ws");
        assert!(matches!(
            ApiClient::new(&config, ""),
            Err(ClientError::Validation(_))
        ));
    }
}

//! Async operations against the API that record their progress in a
//! [`Store`]. Each dispatches `Started`, then either the outcome or
//! `Failed` with the error message, and hands the result back to the caller.

use std::future::Future;

use skillswap_core::{
    protocol::ServerEvent, Experience, Message, MilestoneStatus, Project, ProjectStatus, Review,
};
use tokio::task::JoinHandle;

use super::{Action, Slice, Store};
use crate::{
    api::{
        ApiClient, CompletedProject, ExperienceInput, NewMilestone, NewProject, NewReview,
        ProfileUpdate, ProjectQuery, ProjectUpdate,
    },
    connection::Connection,
    error::Result,
};

async fn track<T, Fut, A>(store: &Store, slice: Slice, request: Fut, action: A) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
    A: FnOnce(&T) -> Action,
{
    store.dispatch(Action::Started(slice));
    match request.await {
        Ok(value) => {
            store.dispatch(action(&value));
            Ok(value)
        }
        Err(err) => {
            store.dispatch(Action::Failed(slice, err.to_string()));
            Err(err)
        }
    }
}

// Projects

pub async fn fetch_projects(
    store: &Store,
    api: &ApiClient,
    query: &ProjectQuery,
) -> Result<Vec<Project>> {
    track(store, Slice::Projects, api.list_projects(query), |projects| {
        Action::ProjectsLoaded(projects.clone())
    })
    .await
}

pub async fn fetch_project(store: &Store, api: &ApiClient, project_id: &str) -> Result<Project> {
    track(store, Slice::Projects, api.get_project(project_id), |project| {
        Action::ProjectUpserted(project.clone())
    })
    .await
}

pub async fn create_project(
    store: &Store,
    api: &ApiClient,
    project: &NewProject,
) -> Result<Project> {
    track(store, Slice::Projects, api.create_project(project), |project| {
        Action::ProjectUpserted(project.clone())
    })
    .await
}

pub async fn update_project(
    store: &Store,
    api: &ApiClient,
    project_id: &str,
    update: &ProjectUpdate,
) -> Result<Project> {
    track(
        store,
        Slice::Projects,
        api.update_project(project_id, update),
        |project| Action::ProjectUpserted(project.clone()),
    )
    .await
}

pub async fn update_project_status(
    store: &Store,
    api: &ApiClient,
    project_id: &str,
    status: ProjectStatus,
) -> Result<Project> {
    track(
        store,
        Slice::Projects,
        api.update_project_status(project_id, status),
        |project| Action::ProjectUpserted(project.clone()),
    )
    .await
}

pub async fn delete_project(store: &Store, api: &ApiClient, project_id: &str) -> Result<()> {
    track(store, Slice::Projects, api.delete_project(project_id), |_| {
        Action::ProjectRemoved(project_id.to_string())
    })
    .await
}

pub async fn submit_bid(
    store: &Store,
    api: &ApiClient,
    project_id: &str,
    amount: f64,
    message: &str,
) -> Result<Project> {
    track(
        store,
        Slice::Projects,
        api.submit_bid(project_id, amount, message),
        |project| Action::ProjectUpserted(project.clone()),
    )
    .await
}

pub async fn accept_bid(
    store: &Store,
    api: &ApiClient,
    project_id: &str,
    bid_id: &str,
) -> Result<Project> {
    track(
        store,
        Slice::Projects,
        api.accept_bid(project_id, bid_id),
        |project| Action::ProjectUpserted(project.clone()),
    )
    .await
}

pub async fn reject_bid(
    store: &Store,
    api: &ApiClient,
    project_id: &str,
    bid_id: &str,
) -> Result<Project> {
    track(
        store,
        Slice::Projects,
        api.reject_bid(project_id, bid_id),
        |project| Action::ProjectUpserted(project.clone()),
    )
    .await
}

pub async fn counter_bid(
    store: &Store,
    api: &ApiClient,
    project_id: &str,
    bid_id: &str,
    amount: f64,
    message: &str,
) -> Result<Project> {
    track(
        store,
        Slice::Projects,
        api.counter_bid(project_id, bid_id, amount, message),
        |project| Action::ProjectUpserted(project.clone()),
    )
    .await
}

pub async fn complete_project(
    store: &Store,
    api: &ApiClient,
    project_id: &str,
) -> Result<CompletedProject> {
    track(
        store,
        Slice::Projects,
        api.complete_project(project_id),
        |completed| Action::ProjectUpserted(completed.project.clone()),
    )
    .await
}

pub async fn add_milestone(
    store: &Store,
    api: &ApiClient,
    project_id: &str,
    milestone: &NewMilestone,
) -> Result<Project> {
    track(
        store,
        Slice::Projects,
        api.add_milestone(project_id, milestone),
        |project| Action::ProjectUpserted(project.clone()),
    )
    .await
}

pub async fn update_milestone_status(
    store: &Store,
    api: &ApiClient,
    project_id: &str,
    milestone_id: &str,
    status: MilestoneStatus,
) -> Result<Project> {
    track(
        store,
        Slice::Projects,
        api.update_milestone_status(project_id, milestone_id, status),
        |project| Action::ProjectUpserted(project.clone()),
    )
    .await
}

// Reviews

pub async fn create_review(store: &Store, api: &ApiClient, review: &NewReview) -> Result<Review> {
    track(store, Slice::Reviews, api.create_review(review), |review| {
        Action::ReviewUpserted(review.clone())
    })
    .await
}

pub async fn fetch_project_reviews(
    store: &Store,
    api: &ApiClient,
    project_id: &str,
) -> Result<Vec<Review>> {
    track(store, Slice::Reviews, api.project_reviews(project_id), |reviews| {
        Action::ReviewsLoaded(reviews.clone())
    })
    .await
}

/// Reviews written by `reviewer_id`.
pub async fn fetch_reviews_by_reviewer(
    store: &Store,
    api: &ApiClient,
    reviewer_id: &str,
) -> Result<Vec<Review>> {
    track(store, Slice::Reviews, api.reviews_by(reviewer_id), |reviews| {
        Action::ReviewsLoaded(reviews.clone())
    })
    .await
}

pub async fn fetch_freelancer_reviews(
    store: &Store,
    api: &ApiClient,
    freelancer_id: &str,
) -> Result<()> {
    track(
        store,
        Slice::Reviews,
        api.freelancer_reviews(freelancer_id),
        |summary| Action::FreelancerReviewsLoaded(summary.clone()),
    )
    .await
    .map(|_| ())
}

pub async fn respond_to_review(
    store: &Store,
    api: &ApiClient,
    review_id: &str,
    response: &str,
) -> Result<Review> {
    track(
        store,
        Slice::Reviews,
        api.respond_to_review(review_id, response),
        |review| Action::ReviewUpserted(review.clone()),
    )
    .await
}

pub async fn delete_review(store: &Store, api: &ApiClient, review_id: &str) -> Result<()> {
    track(store, Slice::Reviews, api.delete_review(review_id), |_| {
        Action::ReviewRemoved(review_id.to_string())
    })
    .await
}

// Users

pub async fn fetch_me(store: &Store, api: &ApiClient) -> Result<()> {
    track(store, Slice::Users, api.me(), |user| {
        Action::CurrentUserLoaded(user.clone())
    })
    .await
    .map(|_| ())
}

pub async fn fetch_freelancer_profile(
    store: &Store,
    api: &ApiClient,
    freelancer_id: &str,
) -> Result<()> {
    track(
        store,
        Slice::Users,
        api.freelancer_profile(freelancer_id),
        |profile| Action::FreelancerLoaded(profile.clone()),
    )
    .await
    .map(|_| ())
}

pub async fn update_profile(store: &Store, api: &ApiClient, update: &ProfileUpdate) -> Result<()> {
    track(store, Slice::Users, api.update_profile(update), |profile| {
        Action::FreelancerLoaded(profile.clone())
    })
    .await
    .map(|_| ())
}

pub async fn add_experience(
    store: &Store,
    api: &ApiClient,
    experience: &ExperienceInput,
) -> Result<Experience> {
    track(store, Slice::Users, api.add_experience(experience), |experience| {
        Action::ExperienceUpserted(experience.clone())
    })
    .await
}

pub async fn update_experience(
    store: &Store,
    api: &ApiClient,
    experience_id: &str,
    experience: &ExperienceInput,
) -> Result<Experience> {
    track(
        store,
        Slice::Users,
        api.update_experience(experience_id, experience),
        |experience| Action::ExperienceUpserted(experience.clone()),
    )
    .await
}

pub async fn delete_experience(store: &Store, api: &ApiClient, experience_id: &str) -> Result<()> {
    track(store, Slice::Users, api.delete_experience(experience_id), |_| {
        Action::ExperienceRemoved(experience_id.to_string())
    })
    .await
}

pub async fn fetch_earnings(store: &Store, api: &ApiClient) -> Result<()> {
    track(store, Slice::Users, api.earnings(), |summary| {
        Action::EarningsLoaded(summary.clone())
    })
    .await
    .map(|_| ())
}

pub async fn fetch_skills(store: &Store, api: &ApiClient) -> Result<Vec<String>> {
    track(store, Slice::Users, api.skills(), |skills| {
        Action::SkillsLoaded(skills.clone())
    })
    .await
}

// Messages

pub async fn fetch_conversation(
    store: &Store,
    api: &ApiClient,
    project_id: &str,
    recipient_id: &str,
) -> Result<Vec<Message>> {
    track(
        store,
        Slice::Messages,
        api.conversation(project_id, recipient_id),
        |messages| Action::MessagesLoaded(messages.clone()),
    )
    .await
}

/// Sends over the socket and stores the acknowledged message.
pub async fn send_message(
    store: &Store,
    connection: &Connection,
    project_id: &str,
    recipient_id: &str,
    text: &str,
) -> Result<Message> {
    track(
        store,
        Slice::Messages,
        connection.send_message(project_id, recipient_id, text),
        |message| Action::MessageReceived(message.clone()),
    )
    .await
}

pub fn mark_message_as_read(
    store: &Store,
    connection: &Connection,
    message_id: &str,
) -> Result<()> {
    match connection.mark_message_as_read(message_id) {
        Ok(()) => Ok(()),
        Err(err) => {
            store.dispatch(Action::Failed(Slice::Messages, err.to_string()));
            Err(err)
        }
    }
}

/// Feeds incoming messages and read receipts into the store until the
/// connection goes away.
pub fn follow_messages(store: &Store, connection: &Connection) -> Result<JoinHandle<()>> {
    let mut events = connection.subscribe()?;
    let store = store.clone();
    Ok(tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;

        loop {
            match events.recv().await {
                Ok(ServerEvent::NewMessage(message)) => {
                    store.dispatch(Action::MessageReceived(message))
                }
                Ok(ServerEvent::MessageRead(receipt)) => {
                    store.dispatch(Action::MessageRead(receipt.message_id))
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "message follower lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }))
}

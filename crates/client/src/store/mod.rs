//! Client-side state container.
//!
//! State lives in four slices. Every change goes through [`reduce`], a pure
//! function from the previous state and an [`Action`] to the next state;
//! [`Store`] holds the current value and publishes it on a watch channel.

pub mod ops;

use std::sync::Arc;

use skillswap_core::{
    EarningsSummary, Experience, FreelancerProfile, FreelancerReviews, Message, Project, Review,
    User,
};
use tokio::sync::watch;

/// Request bookkeeping shared by every slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestStatus {
    pub loading: bool,
    pub error: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectsState {
    pub items: Vec<Project>,
    pub current: Option<Project>,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewsState {
    pub items: Vec<Review>,
    pub freelancer: Option<FreelancerReviews>,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsersState {
    pub me: Option<User>,
    pub freelancer: Option<FreelancerProfile>,
    pub earnings: Option<EarningsSummary>,
    pub skills: Vec<String>,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagesState {
    pub items: Vec<Message>,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub projects: ProjectsState,
    pub reviews: ReviewsState,
    pub users: UsersState,
    pub messages: MessagesState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slice {
    Projects,
    Reviews,
    Users,
    Messages,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Started(Slice),
    Failed(Slice, String),
    /// Clears loading, error and success flags.
    Reset(Slice),

    ProjectsLoaded(Vec<Project>),
    /// Inserts or replaces a project and makes it the current one.
    ProjectUpserted(Project),
    ProjectRemoved(String),

    ReviewsLoaded(Vec<Review>),
    FreelancerReviewsLoaded(FreelancerReviews),
    ReviewUpserted(Review),
    ReviewRemoved(String),
    ReviewsCleared,

    CurrentUserLoaded(User),
    FreelancerLoaded(FreelancerProfile),
    ExperienceUpserted(Experience),
    ExperienceRemoved(String),
    EarningsLoaded(EarningsSummary),
    SkillsLoaded(Vec<String>),

    MessagesLoaded(Vec<Message>),
    /// A message from the socket or a send acknowledgement; duplicates by
    /// id are ignored.
    MessageReceived(Message),
    MessageRead(String),
    MessagesCleared,
}

fn status_mut(state: &mut StoreState, slice: Slice) -> &mut RequestStatus {
    match slice {
        Slice::Projects => &mut state.projects.status,
        Slice::Reviews => &mut state.reviews.status,
        Slice::Users => &mut state.users.status,
        Slice::Messages => &mut state.messages.status,
    }
}

fn succeeded(status: &mut RequestStatus) {
    status.loading = false;
    status.error = None;
    status.success = true;
}

fn upsert<T, F>(items: &mut Vec<T>, item: T, same: F)
where
    F: Fn(&T, &T) -> bool,
{
    match items.iter_mut().find(|existing| same(existing, &item)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

pub fn reduce(mut state: StoreState, action: Action) -> StoreState {
    match action {
        Action::Started(slice) => {
            let status = status_mut(&mut state, slice);
            status.loading = true;
            status.error = None;
            status.success = false;
        }
        Action::Failed(slice, message) => {
            let status = status_mut(&mut state, slice);
            status.loading = false;
            status.error = Some(message);
            status.success = false;
        }
        Action::Reset(slice) => *status_mut(&mut state, slice) = RequestStatus::default(),

        Action::ProjectsLoaded(projects) => {
            state.projects.items = projects;
            succeeded(&mut state.projects.status);
        }
        Action::ProjectUpserted(project) => {
            upsert(&mut state.projects.items, project.clone(), |a, b| a.id == b.id);
            state.projects.current = Some(project);
            succeeded(&mut state.projects.status);
        }
        Action::ProjectRemoved(id) => {
            state.projects.items.retain(|project| project.id != id);
            if state.projects.current.as_ref().is_some_and(|p| p.id == id) {
                state.projects.current = None;
            }
            succeeded(&mut state.projects.status);
        }

        Action::ReviewsLoaded(reviews) => {
            state.reviews.items = reviews;
            succeeded(&mut state.reviews.status);
        }
        Action::FreelancerReviewsLoaded(summary) => {
            state.reviews.items = summary.reviews.clone();
            state.reviews.freelancer = Some(summary);
            succeeded(&mut state.reviews.status);
        }
        Action::ReviewUpserted(review) => {
            upsert(&mut state.reviews.items, review, |a, b| a.id == b.id);
            succeeded(&mut state.reviews.status);
        }
        Action::ReviewRemoved(id) => {
            state.reviews.items.retain(|review| review.id != id);
            succeeded(&mut state.reviews.status);
        }
        Action::ReviewsCleared => state.reviews = ReviewsState::default(),

        Action::CurrentUserLoaded(user) => {
            state.users.me = Some(user);
            succeeded(&mut state.users.status);
        }
        Action::FreelancerLoaded(profile) => {
            state.users.freelancer = Some(profile);
            succeeded(&mut state.users.status);
        }
        Action::ExperienceUpserted(experience) => {
            if let Some(profile) = state
                .users
                .freelancer
                .as_mut()
                .filter(|profile| profile.id == experience.user_id)
            {
                upsert(&mut profile.experience, experience, |a, b| a.id == b.id);
            }
            succeeded(&mut state.users.status);
        }
        Action::ExperienceRemoved(id) => {
            if let Some(profile) = state.users.freelancer.as_mut() {
                profile.experience.retain(|experience| experience.id != id);
            }
            succeeded(&mut state.users.status);
        }
        Action::EarningsLoaded(summary) => {
            state.users.earnings = Some(summary);
            succeeded(&mut state.users.status);
        }
        Action::SkillsLoaded(skills) => {
            state.users.skills = skills;
            succeeded(&mut state.users.status);
        }

        Action::MessagesLoaded(messages) => {
            state.messages.items = messages;
            succeeded(&mut state.messages.status);
        }
        Action::MessageReceived(message) => {
            if !state.messages.items.iter().any(|m| m.id == message.id) {
                state.messages.items.push(message);
            }
        }
        Action::MessageRead(id) => {
            if let Some(message) = state.messages.items.iter_mut().find(|m| m.id == id) {
                message.read = true;
            }
        }
        Action::MessagesCleared => state.messages = MessagesState::default(),
    }
    state
}

/// Shared handle to the state. Clones see the same state.
#[derive(Clone)]
pub struct Store {
    state: Arc<watch::Sender<StoreState>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_state(StoreState::default())
    }

    pub fn with_state(state: StoreState) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn dispatch(&self, action: Action) {
        tracing::trace!(?action, "dispatch");
        self.state
            .send_modify(|state| *state = reduce(std::mem::take(state), action));
    }

    pub fn snapshot(&self) -> StoreState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }
}

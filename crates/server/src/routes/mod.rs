pub mod messages;
pub mod projects;
pub mod reviews;
pub mod templates;
pub mod users;

pub mod messaging;
pub mod projects;

//! Client library for the SkillSwap marketplace: a typed REST client, the
//! real-time connection and a state container.

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod session;
pub mod store;

pub use api::ApiClient;
pub use config::{ClientConfig, ConnectOptions};
pub use connection::{Connection, ConnectionState};
pub use error::{ClientError, Result};
pub use session::Session;
pub use store::{reduce, Action, Store, StoreState};

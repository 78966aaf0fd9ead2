//! HTTP and WebSocket service for the SkillSwap marketplace.

use axum::{middleware as axum_middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;

use handlers::ws::{create_room_registry, RoomRegistry};
use services::{messaging::MessageService, projects::ProjectStore};

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
    pub rooms: RoomRegistry,
    pub projects: ProjectStore,
    pub messages: MessageService,
}

impl AppState {
    pub fn new(db: db::Database, config: config::Config) -> Self {
        let projects = ProjectStore::new(db.pool.clone());
        let messages = MessageService::new(db.pool.clone(), projects.clone());
        Self {
            db,
            config,
            rooms: create_room_registry(),
            projects,
            messages,
        }
    }
}

pub fn router(state: AppState) -> Router {
    // Everything under /api requires a bearer token
    let api_router = Router::new()
        .nest("/projects", routes::projects::router())
        .nest("/reviews", routes::reviews::router())
        .nest("/users", routes::users::router())
        .nest("/messages", routes::messages::router())
        .nest("/notification-templates", routes::templates::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(handlers::ws::ws_handler))
        .nest("/api", api_router)
        .with_state(state)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
}

async fn health_check() -> &'static str {
    "OK"
}
